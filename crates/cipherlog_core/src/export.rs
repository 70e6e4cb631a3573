//! Full enumeration of committed records.

use crate::error::{CoreError, CoreResult};
use crate::record::{Base64Bytes, Record};
use cipherlog_store::Store;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Reserved logical key signaling an enumeration failure in-stream.
///
/// Once an export response has begun, transport status has already
/// committed to success, so failures are appended as data instead (see
/// [`write_sentinel`]). Stored records whose logical key literally equals
/// this string are remapped on emission so real data can never be
/// mistaken for the error signal.
pub const SERVER_ERROR_KEY: &str = "SERVER_ERROR";

/// Replacement key emitted for stored records that collide with
/// [`SERVER_ERROR_KEY`].
const SENTINEL_REMAP: &str = "server_error";

/// Writes every committed record to `sink`, one JSON object per line.
///
/// The whole enumeration runs inside one store transaction, so it sees a
/// consistent snapshot: no partially-committed batch is ever partially
/// visible. Lines are `{"logical_key":"base64_payload"}` in whatever
/// order the store yields its keys.
///
/// # Errors
///
/// Returns an error if the store transaction fails, a stored record is
/// undecodable, or the sink rejects a write. Lines already written to the
/// sink are not retracted; the caller appends the sentinel object.
pub fn export<W: Write>(store: &Store, mut sink: W) -> CoreResult<()> {
    store.run(|txn| {
        for key in txn.keys() {
            // Keys were listed under the same lock, so every one resolves.
            let Some(raw) = txn.get(&key) else {
                continue;
            };
            let record: Record = ciborium::de::from_reader(raw).map_err(CoreError::codec)?;

            let logical_key = if record.logical_key == SERVER_ERROR_KEY {
                SENTINEL_REMAP
            } else {
                record.logical_key.as_str()
            };

            let object = BTreeMap::from([(logical_key, Base64Bytes(record.payload))]);
            serde_json::to_writer(&mut sink, &object)
                .map_err(|e| CoreError::Io(io::Error::from(e)))?;
            sink.write_all(b"\n").map_err(CoreError::Io)?;
        }

        Ok(())
    })
}

/// Appends the sentinel error object to an export stream.
///
/// Produces `{"SERVER_ERROR":"<message>"}` followed by a newline. This is
/// the only place the reserved key is ever emitted; callers must detect
/// it by key, not by transport status. Kept as a separate, documented
/// seam so a future redesign of in-stream error signaling stays local.
///
/// # Errors
///
/// Returns an error if the sink rejects the write.
pub fn write_sentinel<W: Write>(mut sink: W, message: &str) -> io::Result<()> {
    let object = BTreeMap::from([(SERVER_ERROR_KEY, message)]);
    serde_json::to_writer(&mut sink, &object).map_err(io::Error::from)?;
    sink.write_all(b"\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ingest;
    use cipherlog_store::StoreOptions;
    use std::collections::HashMap;

    fn memory_store() -> Store {
        Store::open_in_memory("test", StoreOptions::default()).unwrap()
    }

    fn export_lines(store: &Store) -> Vec<HashMap<String, String>> {
        let mut buf = Vec::new();
        export(store, &mut buf).unwrap();
        String::from_utf8(buf)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn empty_store_exports_nothing() {
        let store = memory_store();
        let mut buf = Vec::new();
        export(&store, &mut buf).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn exports_one_line_per_record() {
        let store = memory_store();
        ingest(&store, &b"{\"test\":\"SGVsbG8=\"}"[..]).unwrap();

        let lines = export_lines(&store);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["test"], "SGVsbG8=");
    }

    #[test]
    fn payload_base64_round_trips_exactly() {
        let store = memory_store();
        // Binary payload including NUL and high bytes.
        ingest(&store, &b"{\"bin\":\"AAEC/w==\"}"[..]).unwrap();

        let lines = export_lines(&store);
        assert_eq!(lines[0]["bin"], "AAEC/w==");
    }

    #[test]
    fn sentinel_logical_key_is_remapped() {
        let store = memory_store();
        ingest(&store, &b"{\"SERVER_ERROR\":\"aGk=\"}"[..]).unwrap();

        let lines = export_lines(&store);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains_key("server_error"));
        assert!(!lines[0].contains_key(SERVER_ERROR_KEY));
    }

    #[test]
    fn sentinel_object_is_distinguishable() {
        let mut buf = Vec::new();
        write_sentinel(&mut buf, "store exploded").unwrap();

        let text = String::from_utf8(buf).unwrap();
        let line: HashMap<String, String> = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(line[SERVER_ERROR_KEY], "store exploded");
    }

    #[test]
    fn closed_store_export_fails() {
        let store = memory_store();
        store.close();

        let mut buf = Vec::new();
        let result = export(&store, &mut buf);
        assert!(result.is_err());
        assert!(buf.is_empty());
    }
}
