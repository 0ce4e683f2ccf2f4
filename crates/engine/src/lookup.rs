//! Tier-transparent point lookups.

use std::sync::Arc;
use std::time::Duration;

use tierstore_storage::{codec, ArchiveStore, PartitionKeyPolicy, PrimaryStore, Record, RecordKey};
use tracing::{debug, instrument};

use crate::error::TieringError;
use crate::{bounded, Tier};

/// A record together with the tier that served it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub record: Record,
    pub tier: Tier,
}

/// Resolves a record id to its current copy, wherever it lives.
///
/// The primary tier is probed first and wins whenever it holds the record:
/// a record still present there has not finished migrating, or was written
/// after the archived copy. The archive is consulted only when the primary
/// reports a genuine miss; any other primary failure is returned as is, so
/// an outage is never mistaken for absence.
///
/// Stateless: concurrent lookups share nothing but the store handles.
pub struct LookupResolver<P, A> {
    primary: Arc<P>,
    archive: Arc<A>,
    policy: Arc<dyn PartitionKeyPolicy>,
    timeout: Option<Duration>,
}

impl<P: PrimaryStore, A: ArchiveStore> LookupResolver<P, A> {
    pub fn new(primary: Arc<P>, archive: Arc<A>, policy: Arc<dyn PartitionKeyPolicy>) -> Self {
        Self {
            primary,
            archive,
            policy,
            timeout: None,
        }
    }

    /// Bound every store call; an expired call counts as an unavailable tier.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// `Ok(None)` means neither tier has the record.
    pub async fn get(&self, id: &str) -> Result<Option<Record>, TieringError> {
        Ok(self.resolve(id).await?.map(|r| r.record))
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, id: &str) -> Result<Option<Resolved>, TieringError> {
        codec::validate_id(id).map_err(|e| TieringError::from_storage(Tier::Primary, e))?;
        let key = RecordKey::derive(id, self.policy.as_ref()).map_err(|e| {
            TieringError::InvalidId {
                id: id.to_string(),
                reason: e.to_string(),
            }
        })?;

        match bounded(self.timeout, self.primary.get(&key)).await {
            Ok(record) => {
                return Ok(Some(Resolved {
                    record,
                    tier: Tier::Primary,
                }))
            }
            Err(e) if e.is_not_found() => debug!("primary miss; trying archive"),
            Err(e) => return Err(TieringError::from_storage(Tier::Primary, e)),
        }

        let bytes = match bounded(self.timeout, self.archive.get(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(TieringError::from_storage(Tier::Archive, e)),
        };

        let record = codec::decode(&bytes).map_err(|e| TieringError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        if record.id != id {
            return Err(TieringError::Corrupt {
                id: id.to_string(),
                reason: format!("blob holds record {:?}", record.id),
            });
        }
        Ok(Some(Resolved {
            record,
            tier: Tier::Archive,
        }))
    }
}
