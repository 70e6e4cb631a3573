//! Atomic batch ingestion.

use crate::error::{CoreError, CoreResult};
use crate::id::{IdGenerator, RandomIdGenerator, SurrogateId};
use crate::record::{Base64Bytes, Record};
use cipherlog_store::{Store, StoreTxn};
use std::collections::BTreeMap;
use std::io::Read;

/// Cap on surrogate-id regeneration attempts per record.
///
/// The id space is effectively unbounded, so hitting this cap indicates a
/// broken random source rather than a full store; it exists to keep the
/// collision loop from spinning forever.
pub const MAX_ID_ATTEMPTS: usize = 64;

/// Ingests a stream of key/value objects as one atomic batch.
///
/// The stream is a sequence of JSON objects, back to back with no outer
/// array, each mapping one or more logical keys to base64 payloads:
///
/// ```text
/// {"key1":"SGVsbG8="}{"key2":"V29ybGQ=","key3":"ISE="}
/// ```
///
/// Every entry from every object is flattened into one batch and written
/// in a single store transaction, each under a fresh surrogate id. Either
/// the whole batch commits or none of it does: a decode error aborts
/// before the transaction opens, and a failed write deletes every record
/// written earlier in the transaction before the error propagates.
///
/// An empty stream is a successful no-op and returns an empty batch.
///
/// # Errors
///
/// - [`CoreError::MalformedInput`] if the stream is not valid JSON or a
///   payload is not valid base64 (nothing is persisted)
/// - [`CoreError::Store`] if a write fails (the batch is rolled back)
/// - [`CoreError::IdSpaceExhausted`] if id generation keeps colliding
pub fn ingest<R: Read>(store: &Store, stream: R) -> CoreResult<Vec<Record>> {
    ingest_with(store, stream, &mut RandomIdGenerator)
}

/// [`ingest`] with an explicit surrogate-id source.
///
/// # Errors
///
/// Same as [`ingest`].
pub fn ingest_with<R, G>(store: &Store, stream: R, ids: &mut G) -> CoreResult<Vec<Record>>
where
    R: Read,
    G: IdGenerator,
{
    let batch = decode_batch(stream)?;

    store.run(|txn| {
        let mut written: Vec<SurrogateId> = Vec::with_capacity(batch.len());

        for record in &batch {
            let id = match unused_id(txn, ids) {
                Ok(id) => id,
                Err(e) => {
                    roll_back(txn, &written);
                    return Err(e);
                }
            };

            let mut value = Vec::new();
            if let Err(e) = ciborium::ser::into_writer(record, &mut value) {
                roll_back(txn, &written);
                return Err(CoreError::codec(e));
            }

            if let Err(e) = txn.put(id.as_str(), value) {
                roll_back(txn, &written);
                return Err(e.into());
            }

            written.push(id);
        }

        Ok(())
    })?;

    tracing::debug!(records = batch.len(), "batch committed");
    Ok(batch)
}

/// Decodes the stream into an ordered batch. Nothing touches the store.
fn decode_batch<R: Read>(stream: R) -> CoreResult<Vec<Record>> {
    let mut batch = Vec::new();

    let objects =
        serde_json::Deserializer::from_reader(stream).into_iter::<BTreeMap<String, Base64Bytes>>();
    for object in objects {
        let object = object.map_err(CoreError::malformed_input)?;
        for (logical_key, payload) in object {
            batch.push(Record {
                logical_key,
                payload: payload.0,
            });
        }
    }

    Ok(batch)
}

/// Generates an id not currently present in the store, regenerating on
/// collision up to [`MAX_ID_ATTEMPTS`] times.
fn unused_id<G: IdGenerator>(txn: &StoreTxn<'_>, ids: &mut G) -> CoreResult<SurrogateId> {
    for attempt in 0..MAX_ID_ATTEMPTS {
        let id = ids.next_id();
        if !txn.has_key(id.as_str()) {
            if attempt > 0 {
                tracing::debug!(attempt, "surrogate id collision, regenerated");
            }
            return Ok(id);
        }
    }

    Err(CoreError::IdSpaceExhausted {
        attempts: MAX_ID_ATTEMPTS,
    })
}

/// Deletes every record written so far in this transaction.
fn roll_back(txn: &mut StoreTxn<'_>, written: &[SurrogateId]) {
    for id in written {
        txn.delete(id.as_str());
    }
    if !written.is_empty() {
        tracing::warn!(
            rolled_back = written.len(),
            "batch write failed, earlier records deleted"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipherlog_store::{StoreError, StoreOptions};

    fn memory_store() -> Store {
        Store::open_in_memory("test", StoreOptions::default()).unwrap()
    }

    /// Id source that replays a fixed script, then falls back to random.
    struct Scripted(Vec<SurrogateId>);

    impl IdGenerator for Scripted {
        fn next_id(&mut self) -> SurrogateId {
            if self.0.is_empty() {
                SurrogateId::generate()
            } else {
                self.0.remove(0)
            }
        }
    }

    #[test]
    fn single_pair_is_persisted() {
        let store = memory_store();
        let batch = ingest(&store, &b"{\"test\":\"SGVsbG8=\"}"[..]).unwrap();

        assert_eq!(batch, vec![Record::new("test", b"Hello".to_vec())]);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn stream_of_objects_is_flattened() {
        let store = memory_store();
        let body = b"{\"key1\":\"YQ==\"}{\"key2\":\"Yg==\",\"key3\":\"Yw==\"}";
        let batch = ingest(&store, &body[..]).unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(store.len().unwrap(), 3);

        let keys: Vec<_> = batch.iter().map(|r| r.logical_key.as_str()).collect();
        assert!(keys.contains(&"key1"));
        assert!(keys.contains(&"key2"));
        assert!(keys.contains(&"key3"));
    }

    #[test]
    fn empty_stream_is_a_noop_success() {
        let store = memory_store();
        let batch = ingest(&store, &b""[..]).unwrap();
        assert!(batch.is_empty());
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn malformed_json_persists_nothing() {
        let store = memory_store();
        // First object is fine; the stream breaks afterwards.
        let result = ingest(&store, &b"{\"a\":\"YQ==\"}{broken"[..]);

        assert!(matches!(result, Err(CoreError::MalformedInput { .. })));
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn invalid_base64_payload_persists_nothing() {
        let store = memory_store();
        let result = ingest(&store, &b"{\"a\":\"not base64!!\"}"[..]);

        assert!(matches!(result, Err(CoreError::MalformedInput { .. })));
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn failed_write_rolls_back_whole_batch() {
        // Force the k-th write to fail for every k by shrinking the cap.
        let body = b"{\"k1\":\"YQ==\"}{\"k2\":\"Yg==\"}{\"k3\":\"Yw==\"}";
        for cap in 0..3 {
            let store =
                Store::open_in_memory("test", StoreOptions::default().with_max_entries(cap))
                    .unwrap();

            let result = ingest(&store, &body[..]);
            assert!(matches!(
                result,
                Err(CoreError::Store(StoreError::CapacityExceeded { .. }))
            ));
            assert_eq!(store.len().unwrap(), 0, "cap {cap} left partial batch");
        }
    }

    #[test]
    fn id_collision_regenerates_instead_of_overwriting() {
        let store = memory_store();
        let colliding = SurrogateId::generate();
        let fresh = SurrogateId::generate();

        // First ingest claims the colliding id.
        let mut ids = Scripted(vec![colliding.clone()]);
        ingest_with(&store, &b"{\"first\":\"YQ==\"}"[..], &mut ids).unwrap();

        // Second ingest is handed the same id first; it must regenerate.
        let mut ids = Scripted(vec![colliding.clone(), fresh.clone()]);
        ingest_with(&store, &b"{\"second\":\"Yg==\"}"[..], &mut ids).unwrap();

        assert_eq!(store.len().unwrap(), 2);
        store
            .run(|txn| {
                // The first record was not overwritten.
                let raw = txn.get(colliding.as_str()).unwrap();
                let record: Record = ciborium::de::from_reader(raw).unwrap();
                assert_eq!(record.logical_key, "first");

                let raw = txn.get(fresh.as_str()).unwrap();
                let record: Record = ciborium::de::from_reader(raw).unwrap();
                assert_eq!(record.logical_key, "second");
                Ok::<_, StoreError>(())
            })
            .unwrap();
    }

    #[test]
    fn exhausted_id_retries_roll_back() {
        let store = memory_store();
        let stuck = SurrogateId::generate();

        let mut ids = Scripted(vec![stuck.clone()]);
        ingest_with(&store, &b"{\"first\":\"YQ==\"}"[..], &mut ids).unwrap();

        // A generator that only ever repeats the taken id.
        struct Stuck(SurrogateId);
        impl IdGenerator for Stuck {
            fn next_id(&mut self) -> SurrogateId {
                self.0.clone()
            }
        }

        let mut ids = Stuck(stuck);
        let result = ingest_with(&store, &b"{\"a\":\"YQ==\"}{\"b\":\"Yg==\"}"[..], &mut ids);
        assert!(matches!(result, Err(CoreError::IdSpaceExhausted { .. })));
        // Only the original record remains.
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn same_logical_key_twice_in_one_batch_stores_two_records() {
        let store = memory_store();
        let body = b"{\"k\":\"djE=\"}{\"k\":\"djI=\"}";
        let batch = ingest(&store, &body[..]).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(store.len().unwrap(), 2);
    }
}
