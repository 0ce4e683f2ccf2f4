use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::key::{KeyError, PartitionKeyPolicy, RecordKey};

/// A single record as held by either tier.
///
/// `id` never changes once the record exists, and `partition_key` is always
/// the configured policy applied to `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub partition_key: String,
    /// RFC 3339 on the wire.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub payload: serde_json::Value,
}

impl Record {
    /// Create a record, deriving its partition key from `id`.
    pub fn new(
        id: impl Into<String>,
        timestamp: OffsetDateTime,
        payload: serde_json::Value,
        policy: &dyn PartitionKeyPolicy,
    ) -> Result<Self, KeyError> {
        let id = id.into();
        let key = RecordKey::derive(&id, policy)?;
        Ok(Self {
            id,
            partition_key: key.partition_key,
            timestamp,
            payload,
        })
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.id.clone(), self.partition_key.clone())
    }

    /// True when the record is old enough to leave the primary tier.
    pub fn is_eligible(&self, cutoff: OffsetDateTime) -> bool {
        self.timestamp < cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::PrefixPolicy;
    use time::macros::datetime;

    #[test]
    fn serializes_with_camel_case_fields() {
        let r = Record::new(
            "R100",
            datetime!(2024-01-15 10:30:00 UTC),
            serde_json::json!({"amount": 42}),
            &PrefixPolicy::default(),
        )
        .unwrap();
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["partitionKey"], "R1");
        assert_eq!(json["timestamp"], "2024-01-15T10:30:00Z");
        assert_eq!(json["payload"]["amount"], 42);
    }

    #[test]
    fn eligibility_is_strictly_before_cutoff() {
        let ts = datetime!(2024-01-15 00:00:00 UTC);
        let r = Record::new("R1", ts, serde_json::Value::Null, &PrefixPolicy::default()).unwrap();
        assert!(!r.is_eligible(ts));
        assert!(r.is_eligible(ts + time::Duration::nanoseconds(1)));
    }
}
