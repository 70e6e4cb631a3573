//! Store facade and transactions.

use crate::backend::{FileBackend, MemoryBackend, PersistenceBackend};
use crate::crypto::{random_salt, CryptoManager, EncryptionKey, SALT_SIZE};
use crate::error::{StoreError, StoreResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;

/// Magic bytes at the start of every persistence file.
const MAGIC: &[u8; 4] = b"CLG1";

/// Tuning options for a store.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Maximum number of entries the store will hold, if set.
    ///
    /// A `put` of a new key that would exceed the cap fails with
    /// [`StoreError::CapacityExceeded`]. Overwrites and deletes are always
    /// allowed. The working set is fully memory-resident, so the cap
    /// bounds the process footprint.
    pub max_entries: Option<usize>,
}

impl StoreOptions {
    /// Sets the maximum number of entries.
    #[must_use]
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }
}

struct StoreInner {
    map: HashMap<String, Vec<u8>>,
    backend: Box<dyn PersistenceBackend>,
    salt: [u8; SALT_SIZE],
}

/// The embedded encrypted key-value store.
///
/// All access goes through [`Store::run`]. The store holds one mutex for
/// the entire duration of each transaction closure, which serializes every
/// transaction against every other: this is the isolation guarantee the
/// rest of cipherlog relies on for check-then-write atomicity and for
/// consistent enumeration snapshots.
///
/// # Opening a store
///
/// ```rust,no_run
/// use cipherlog_store::{Store, StoreOptions};
/// use std::path::Path;
///
/// let store = Store::open(Path::new("cipherlog.db"), "passphrase", StoreOptions::default())?;
/// # Ok::<(), cipherlog_store::StoreError>(())
/// ```
///
/// For tests, use [`Store::open_in_memory`].
pub struct Store {
    inner: Mutex<StoreInner>,
    crypto: CryptoManager,
    options: StoreOptions,
    is_open: RwLock<bool>,
}

impl Store {
    /// Opens or creates an encrypted store persisted at `path`.
    ///
    /// The encryption key is derived from the opaque `passphrase` with
    /// HKDF-SHA256 and a per-file random salt stored in the file header.
    /// An exclusive file lock is held until the store is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process holds the lock (`Locked`)
    /// - The file header is unrecognized (`InvalidFormat`)
    /// - The passphrase is wrong or the file was tampered with (`Decryption`)
    /// - I/O errors occur
    pub fn open(path: &Path, passphrase: &str, options: StoreOptions) -> StoreResult<Self> {
        let backend = FileBackend::open(path)?;
        Self::open_with_backend(Box::new(backend), passphrase, options)
    }

    /// Opens an ephemeral in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if key derivation fails.
    pub fn open_in_memory(passphrase: &str, options: StoreOptions) -> StoreResult<Self> {
        Self::open_with_backend(Box::new(MemoryBackend::new()), passphrase, options)
    }

    /// Opens a store over an explicit persistence backend.
    ///
    /// This is the seam used by tests that need to inspect or pre-seed the
    /// raw snapshot blob.
    ///
    /// # Errors
    ///
    /// Same as [`Store::open`], minus the lock acquisition.
    pub fn open_with_backend(
        backend: Box<dyn PersistenceBackend>,
        passphrase: &str,
        options: StoreOptions,
    ) -> StoreResult<Self> {
        let (map, salt, crypto) = match backend.load()? {
            Some(blob) => {
                let (salt, ciphertext) = parse_header(&blob)?;
                let key = EncryptionKey::derive_from_passphrase(passphrase.as_bytes(), &salt)?;
                let crypto = CryptoManager::new(&key);
                let snapshot = crypto.decrypt(ciphertext)?;
                let map = decode_snapshot(&snapshot)?;
                (map, salt, crypto)
            }
            None => {
                let salt = random_salt();
                let key = EncryptionKey::derive_from_passphrase(passphrase.as_bytes(), &salt)?;
                let crypto = CryptoManager::new(&key);
                (HashMap::new(), salt, crypto)
            }
        };

        let store = Self {
            inner: Mutex::new(StoreInner {
                map,
                backend,
                salt,
            }),
            crypto,
            options,
            is_open: RwLock::new(true),
        };

        // Write the initial snapshot for new stores so the passphrase is
        // bound to the file from the start.
        {
            let inner = store.inner.lock();
            if inner.map.is_empty() {
                store.persist(&inner)?;
            }
        }

        Ok(store)
    }

    /// Executes a function within a transaction.
    ///
    /// The store mutex is held for the whole closure, so the transaction
    /// is fully serialized against all others. If the closure performed
    /// any mutation, the snapshot is persisted after the closure returns -
    /// whether it returned `Ok` or `Err`. Mutations are **not** rolled
    /// back automatically when the closure errors; callers needing
    /// all-or-nothing semantics must delete their own writes before
    /// returning the error.
    ///
    /// If the closure succeeds but the snapshot cannot be persisted, the
    /// transaction's mutations are undone before the error is returned,
    /// so the live map never diverges from the snapshot on disk.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a store error if the store is
    /// closed or the snapshot cannot be persisted.
    pub fn run<T, E>(&self, f: impl FnOnce(&mut StoreTxn<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        self.ensure_open().map_err(E::from)?;

        let mut inner = self.inner.lock();
        let max_entries = self.options.max_entries;

        let mut txn = StoreTxn {
            map: &mut inner.map,
            max_entries,
            dirty: false,
            undo: Vec::new(),
        };
        let result = f(&mut txn);
        let dirty = txn.dirty;
        let undo = std::mem::take(&mut txn.undo);

        if dirty {
            let persisted = self.persist(&inner);
            // A failed closure already carries the more meaningful error;
            // the map still holds whatever state the closure left behind.
            if result.is_ok() {
                if let Err(e) = persisted {
                    undo_mutations(&mut inner.map, undo);
                    return Err(E::from(e));
                }
            }
        }

        result
    }

    /// Returns the number of entries in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed.
    pub fn len(&self) -> StoreResult<usize> {
        self.ensure_open()?;
        Ok(self.inner.lock().map.len())
    }

    /// Returns `true` if the store holds no entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns whether the store is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    /// Closes the store.
    ///
    /// Every snapshot is persisted at transaction end, so closing only
    /// marks the store unusable; subsequent operations fail with
    /// [`StoreError::Closed`]. Closing twice is a no-op.
    pub fn close(&self) {
        *self.is_open.write() = false;
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }

    fn persist(&self, inner: &StoreInner) -> StoreResult<()> {
        let snapshot = encode_snapshot(&inner.map)?;
        let ciphertext = self.crypto.encrypt(&snapshot)?;

        let mut blob = Vec::with_capacity(MAGIC.len() + SALT_SIZE + ciphertext.len());
        blob.extend_from_slice(MAGIC);
        blob.extend_from_slice(&inner.salt);
        blob.extend_from_slice(&ciphertext);

        inner.backend.save(&blob)
    }
}

/// Replays a transaction's undo entries, newest first, restoring the map
/// to its pre-transaction state.
fn undo_mutations(map: &mut HashMap<String, Vec<u8>>, undo: Vec<(String, Option<Vec<u8>>)>) {
    for (key, prev) in undo.into_iter().rev() {
        match prev {
            Some(value) => {
                map.insert(key, value);
            }
            None => {
                map.remove(&key);
            }
        }
    }
}

fn parse_header(blob: &[u8]) -> StoreResult<([u8; SALT_SIZE], &[u8])> {
    if blob.len() < MAGIC.len() + SALT_SIZE {
        return Err(StoreError::invalid_format("file too short"));
    }
    if &blob[..MAGIC.len()] != MAGIC {
        return Err(StoreError::invalid_format("bad magic"));
    }

    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&blob[MAGIC.len()..MAGIC.len() + SALT_SIZE]);
    Ok((salt, &blob[MAGIC.len() + SALT_SIZE..]))
}

fn encode_snapshot(map: &HashMap<String, Vec<u8>>) -> StoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(map, &mut buf).map_err(StoreError::codec)?;
    Ok(buf)
}

fn decode_snapshot(snapshot: &[u8]) -> StoreResult<HashMap<String, Vec<u8>>> {
    ciborium::de::from_reader(snapshot).map_err(StoreError::codec)
}

/// A transaction handle over the store's map.
///
/// Obtained through [`Store::run`]. All mutations are visible to later
/// operations within the same closure immediately.
pub struct StoreTxn<'a> {
    map: &'a mut HashMap<String, Vec<u8>>,
    max_entries: Option<usize>,
    dirty: bool,
    // Displaced value per mutation, replayed in reverse when the
    // snapshot cannot be persisted after a successful closure.
    undo: Vec<(String, Option<Vec<u8>>)>,
}

impl StoreTxn<'_> {
    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Returns the value stored under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.map.get(key).map(Vec::as_slice)
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CapacityExceeded`] if inserting a new key
    /// would exceed the configured entry cap.
    pub fn put(&mut self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        if let Some(limit) = self.max_entries {
            if !self.map.contains_key(key) && self.map.len() >= limit {
                return Err(StoreError::CapacityExceeded { limit });
            }
        }

        let prev = self.map.insert(key.to_string(), value);
        self.undo.push((key.to_string(), prev));
        self.dirty = true;
        Ok(())
    }

    /// Removes `key`, returning `true` if it was present.
    pub fn delete(&mut self, key: &str) -> bool {
        match self.map.remove(key) {
            Some(prev) => {
                self.undo.push((key.to_string(), Some(prev)));
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Returns every key currently in the store, in arbitrary order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.map.keys().cloned().collect()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
