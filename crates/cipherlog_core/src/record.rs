//! The unit of persistence and its wire representation.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One persisted logical key/payload pair.
///
/// The logical key is supplied by the caller and is not required to be
/// unique; the storage index is a system-generated [surrogate
/// id](crate::SurrogateId) assigned at commit time. The payload is an
/// opaque ciphertext byte sequence - cipherlog never decrypts it.
///
/// Records are encoded with CBOR when stored and as
/// `{"logical_key":"base64_payload"}` JSON objects on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Caller-supplied key. Duplicates across records are expected.
    pub logical_key: String,
    /// Opaque payload bytes, stored verbatim.
    pub payload: Vec<u8>,
}

impl Record {
    /// Creates a record.
    #[must_use]
    pub fn new(logical_key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            logical_key: logical_key.into(),
            payload,
        }
    }
}

/// Byte payload carried as a standard-alphabet base64 string in JSON.
///
/// Matches the wire format clients already speak: every payload value in
/// an ingestion object or export line is base64 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes(pub Vec<u8>);

impl Serialize for Base64Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Base64Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map(Base64Bytes)
            .map_err(|e| D::Error::custom(format_args!("invalid base64 payload: {e}")))
    }
}

impl From<Vec<u8>> for Base64Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}
