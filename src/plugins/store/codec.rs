//! Serialized shape of a persisted collection.
//!
//! Current saves are `{"version": 1, "items": [...]}`. Older saves are a bare
//! JSON array and are read as-is; they are rewritten in the envelope on the
//! next save.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::PersistError;

pub(crate) const COLLECTION_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    items: &'a [T],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredCollection<T> {
    Versioned { version: u32, items: Vec<T> },
    Legacy(Vec<T>),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum DecodeError {
    #[error("malformed collection: {0}")]
    Malformed(String),
    #[error("unsupported collection version {0}")]
    UnsupportedVersion(u32),
}

pub(crate) fn encode_collection<T: Serialize>(items: &[T]) -> Result<String, PersistError> {
    Ok(serde_json::to_string(&EnvelopeRef {
        version: COLLECTION_VERSION,
        items,
    })?)
}

/// Decode a stored collection. Absent or blank input is an empty collection.
pub(crate) fn decode_collection<T: DeserializeOwned>(
    raw: Option<&str>,
) -> Result<Vec<T>, DecodeError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<StoredCollection<T>>(raw) {
        Ok(StoredCollection::Versioned { version, items }) => {
            if version != COLLECTION_VERSION {
                return Err(DecodeError::UnsupportedVersion(version));
            }
            Ok(items)
        }
        Ok(StoredCollection::Legacy(items)) => Ok(items),
        Err(err) => Err(DecodeError::Malformed(err.to_string())),
    }
}

/// Stored active ids are plain strings; blank means unset.
pub(crate) fn decode_active_id(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
