//! Archive wire format.
//!
//! Each archived record is one self-contained JSON object holding the full
//! record envelope (`id`, `partitionKey`, `timestamp`, `payload`), stored
//! under the blob name `"<id>.json"`.

use crate::error::StorageError;
use crate::record::Record;

/// File extension naming the serialization used for archive blobs.
pub const EXTENSION: &str = "json";

/// Errors from encoding or decoding an archive blob.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode record {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode archive blob: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Deterministic blob name for a record id.
pub fn blob_name(id: &str) -> String {
    format!("{id}.{EXTENSION}")
}

/// Reject ids that cannot be used as a single blob or file name.
pub fn validate_id(id: &str) -> Result<(), StorageError> {
    let reason = if id.is_empty() {
        "id is empty"
    } else if id == "." || id == ".." {
        "id is a relative path component"
    } else if id.contains(['/', '\\', '\0']) {
        "id contains a path separator or NUL"
    } else {
        return Ok(());
    };
    Err(StorageError::InvalidId {
        id: id.to_string(),
        reason: reason.to_string(),
    })
}

pub fn encode(record: &Record) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(record).map_err(|source| CodecError::Encode {
        id: record.id.clone(),
        source,
    })
}

pub fn decode(bytes: &[u8]) -> Result<Record, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::PrefixPolicy;
    use time::macros::datetime;

    fn record(payload: serde_json::Value) -> Record {
        Record::new(
            "R100",
            datetime!(2024-03-01 12:00:00.123456789 UTC),
            payload,
            &PrefixPolicy::default(),
        )
        .unwrap()
    }

    #[test]
    fn blob_name_uses_extension() {
        assert_eq!(blob_name("R100"), "R100.json");
    }

    #[test]
    fn nested_payload_survives_archive_round_trip() {
        let original = record(serde_json::json!({
            "amount": 42,
            "currency": "EUR",
            "lines": [{"sku": "A-1", "qty": 3, "unit": 9.75}, {"sku": "B-2", "qty": 1, "unit": null}],
            "tags": [],
            "meta": {"nested": {"deep": true}, "note": "ünïcödé \"quoted\""}
        }));
        let decoded = decode(&encode(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.payload, original.payload);
        assert_eq!(decoded.timestamp, original.timestamp);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode(b"not json"), Err(CodecError::Decode(_))));
        assert!(matches!(
            decode(br#"{"amount": 42}"#),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn validate_id_rejects_path_like_ids() {
        assert!(validate_id("R100").is_ok());
        assert!(validate_id("inv-2024.01").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b", "a\0b"] {
            assert!(
                matches!(validate_id(bad), Err(StorageError::InvalidId { .. })),
                "{bad:?} should be rejected"
            );
        }
    }
}
