use tierstore_storage::StorageError;

use crate::Tier;

/// Errors surfaced by the migration sweep and the lookup path.
///
/// Absence of a record is never an error: lookups return `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum TieringError {
    /// The id cannot address any record.
    #[error("invalid record id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    /// A tier could not be reached or a call to it timed out.
    #[error("{tier} tier unavailable: {reason}")]
    BackendUnavailable { tier: Tier, reason: String },

    /// Any other failure reported by a tier.
    #[error("{tier} tier error: {source}")]
    Storage {
        tier: Tier,
        #[source]
        source: StorageError,
    },

    /// An archived blob that does not decode to the record it is named for.
    #[error("archived record {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },
}

impl TieringError {
    pub(crate) fn from_storage(tier: Tier, err: StorageError) -> Self {
        match err {
            StorageError::Unavailable(reason) => TieringError::BackendUnavailable { tier, reason },
            StorageError::InvalidId { id, reason } => TieringError::InvalidId { id, reason },
            source => TieringError::Storage { tier, source },
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, TieringError::BackendUnavailable { .. })
    }
}
