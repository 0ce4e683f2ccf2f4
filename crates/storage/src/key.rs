//! Record addressing: ids, partition keys, and the policies that derive one
//! from the other.
//!
//! The primary tier needs both the id and the partition key for any point
//! operation. Every party that addresses a record (the migration sweep, the
//! lookup path, external clients) must derive the same partition key from the
//! same id, so a policy must be deterministic, total over non-empty ids, and
//! stable across processes and implementations.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default prefix length for [`PrefixPolicy`] (`"R100"` -> `"R1"`).
pub const DEFAULT_PREFIX_LEN: usize = 2;

/// Default bucket count for [`HashPolicy`].
pub const DEFAULT_HASH_BUCKETS: u32 = 64;

/// Errors from building a [`RecordKey`] or a partition policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("record id must not be empty")]
    EmptyId,

    #[error("invalid partition policy: {0}")]
    InvalidPolicy(String),
}

/// The `(id, partition_key)` pair that addresses a record in the primary tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordKey {
    pub id: String,
    pub partition_key: String,
}

impl RecordKey {
    /// Build a key from a record that already carries its partition key.
    pub fn new(id: impl Into<String>, partition_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            partition_key: partition_key.into(),
        }
    }

    /// Derive the key for `id` under `policy`.
    pub fn derive(id: &str, policy: &dyn PartitionKeyPolicy) -> Result<Self, KeyError> {
        if id.is_empty() {
            return Err(KeyError::EmptyId);
        }
        Ok(Self::new(id, policy.partition_key(id)))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition_key, self.id)
    }
}

/// Pure mapping from record id to partition key.
///
/// Implementations are only ever called with non-empty ids and must return
/// a non-empty key for each of them.
pub trait PartitionKeyPolicy: Send + Sync + fmt::Debug {
    fn partition_key(&self, id: &str) -> String;

    /// Short name used in logs and configuration.
    fn name(&self) -> &'static str;
}

/// Fixed-length prefix of the id, counted in Unicode scalar values.
/// Ids shorter than the prefix map to themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixPolicy {
    len: usize,
}

impl PrefixPolicy {
    pub fn new(len: usize) -> Result<Self, KeyError> {
        if len == 0 {
            return Err(KeyError::InvalidPolicy(
                "prefix length must be at least 1".into(),
            ));
        }
        Ok(Self { len })
    }
}

impl Default for PrefixPolicy {
    fn default() -> Self {
        Self {
            len: DEFAULT_PREFIX_LEN,
        }
    }
}

impl PartitionKeyPolicy for PrefixPolicy {
    fn partition_key(&self, id: &str) -> String {
        id.chars().take(self.len).collect()
    }

    fn name(&self) -> &'static str {
        "prefix"
    }
}

/// SHA-256 of the id, first 8 bytes big-endian, modulo `buckets`,
/// rendered as `p0000`.
///
/// Spreads ids evenly regardless of how they are minted, at the cost of
/// partition keys that carry no meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashPolicy {
    buckets: u32,
}

impl HashPolicy {
    pub fn new(buckets: u32) -> Result<Self, KeyError> {
        if buckets == 0 {
            return Err(KeyError::InvalidPolicy(
                "hash bucket count must be at least 1".into(),
            ));
        }
        Ok(Self { buckets })
    }
}

impl PartitionKeyPolicy for HashPolicy {
    fn partition_key(&self, id: &str) -> String {
        let digest = Sha256::digest(id.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let bucket = u64::from_be_bytes(head) % u64::from(self.buckets);
        format!("p{bucket:04}")
    }

    fn name(&self) -> &'static str {
        "hash"
    }
}

/// Configuration form of a partition policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PartitionScheme {
    Prefix {
        #[serde(default = "default_prefix_len")]
        len: usize,
    },
    Hash {
        #[serde(default = "default_hash_buckets")]
        buckets: u32,
    },
}

fn default_prefix_len() -> usize {
    DEFAULT_PREFIX_LEN
}

fn default_hash_buckets() -> u32 {
    DEFAULT_HASH_BUCKETS
}

impl Default for PartitionScheme {
    fn default() -> Self {
        PartitionScheme::Prefix {
            len: DEFAULT_PREFIX_LEN,
        }
    }
}

impl PartitionScheme {
    pub fn build(&self) -> Result<Arc<dyn PartitionKeyPolicy>, KeyError> {
        Ok(match *self {
            PartitionScheme::Prefix { len } => Arc::new(PrefixPolicy::new(len)?),
            PartitionScheme::Hash { buckets } => Arc::new(HashPolicy::new(buckets)?),
        })
    }
}
