//! Migration sweep.
//!
//! Moves every record older than the cutoff from the primary tier to the
//! archive tier. Per record the order is fixed:
//!
//! 1. re-read the record from the primary tier
//! 2. encode it to the archive wire format
//! 3. write it to the archive (bounded retries allowed)
//! 4. delete it from the primary tier, only after step 3 succeeded
//!
//! A crash or failure anywhere leaves the record in at least one tier.
//! Archive writes are overwrite-safe and primary deletes tolerate
//! `NotFound`, so re-running a cycle after a partial failure converges on
//! the same end state.
//!
//! Records are independent of each other: the sweep processes up to
//! `concurrency_limit` of them at once, and one record's failure never stops
//! the others.

use std::fmt;
use std::sync::Arc;

use futures::future;
use futures::StreamExt;
use serde::Serialize;
use tierstore_storage::{codec, ArchiveStore, PrimaryStore, PutStatus, Record, StorageError};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::MigrationSettings;
use crate::error::TieringError;
use crate::{bounded, Tier};

/// What happened to one record during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Archived and removed from the primary tier.
    Migrated,
    /// Identical content was already archived; the primary copy is gone now.
    AlreadyArchived,
    /// The record left the primary tier (or stopped being eligible) before
    /// it could be archived. Nothing was written.
    SourceMissing,
    /// The archive write did not succeed. The record stays in the primary
    /// tier and is picked up again next cycle.
    WriteFailed,
    /// Archived, but the primary delete failed. The record is in both tiers,
    /// which lookups handle; the next cycle finishes the delete.
    DeleteFailed,
}

impl OutcomeKind {
    pub fn is_failure(self) -> bool {
        matches!(self, OutcomeKind::WriteFailed | OutcomeKind::DeleteFailed)
    }

    /// The record's authoritative copy now lives in the archive.
    pub fn is_archived(self) -> bool {
        matches!(self, OutcomeKind::Migrated | OutcomeKind::AlreadyArchived)
    }
}

/// Per-record entry in a [`MigrationReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationOutcome {
    pub id: String,
    pub kind: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl MigrationOutcome {
    fn new(id: &str, kind: OutcomeKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            detail: None,
        }
    }

    fn failed(id: &str, kind: OutcomeKind, detail: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            kind,
            detail: Some(detail.into()),
        }
    }
}

/// Why the eligible sequence stopped part-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltKind {
    /// The primary tier became unreachable or timed out.
    Unavailable,
    /// Any other storage error.
    Failed,
}

/// The eligible query error that stopped a cycle early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryHalt {
    pub kind: HaltKind,
    pub message: String,
}

impl QueryHalt {
    fn from_storage(err: &StorageError) -> Self {
        let kind = if err.is_unavailable() {
            HaltKind::Unavailable
        } else {
            HaltKind::Failed
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for QueryHalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of one migration cycle.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    #[serde(with = "time::serde::rfc3339")]
    pub cutoff: OffsetDateTime,
    /// One entry per attempted record, sorted by id.
    pub outcomes: Vec<MigrationOutcome>,
    /// The cycle was cancelled before the eligible sequence was exhausted.
    pub cancelled: bool,
    /// The eligible sequence failed part-way; later records were not seen.
    pub halted: Option<QueryHalt>,
}

impl MigrationReport {
    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.outcomes.iter().filter(|o| o.kind == kind).count()
    }

    /// Records whose authoritative copy is now archived.
    pub fn archived(&self) -> usize {
        self.outcomes.iter().filter(|o| o.kind.is_archived()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &MigrationOutcome> {
        self.outcomes.iter().filter(|o| o.kind.is_failure())
    }

    /// Ids whose record is still in the primary tier after a failure.
    /// An id that shows up here cycle after cycle is stuck.
    pub fn stuck_ids(&self) -> Vec<&str> {
        self.failures().map(|o| o.id.as_str()).collect()
    }

    pub fn outcome(&self, id: &str) -> Option<&MigrationOutcome> {
        self.outcomes.iter().find(|o| o.id == id)
    }

    /// The cycle stopped early because the primary tier went away.
    pub fn halted_unavailable(&self) -> bool {
        matches!(&self.halted, Some(h) if h.kind == HaltKind::Unavailable)
    }

    /// Every eligible record was seen and none failed.
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.halted.is_none() && self.failures().next().is_none()
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Archived {} records (migrated {}, already archived {}, source missing {}, write failed {}, delete failed {})",
            self.archived(),
            self.count(OutcomeKind::Migrated),
            self.count(OutcomeKind::AlreadyArchived),
            self.count(OutcomeKind::SourceMissing),
            self.count(OutcomeKind::WriteFailed),
            self.count(OutcomeKind::DeleteFailed),
        )?;
        for o in self.failures() {
            writeln!(
                f,
                "  {:?} {}: {}",
                o.kind,
                o.id,
                o.detail.as_deref().unwrap_or("(no detail)")
            )?;
        }
        if self.cancelled {
            writeln!(f, "  cycle cancelled before all eligible records were seen")?;
        }
        if let Some(reason) = &self.halted {
            writeln!(f, "  eligible query failed part-way: {reason}")?;
        }
        Ok(())
    }
}

/// `now - retention`, clamped to the Unix epoch.
pub fn cutoff_for(now: OffsetDateTime, retention: time::Duration) -> OffsetDateTime {
    now.checked_sub(retention)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Drives migration cycles over a primary and an archive store.
pub struct MigrationEngine<P, A> {
    primary: Arc<P>,
    archive: Arc<A>,
    settings: MigrationSettings,
}

impl<P: PrimaryStore, A: ArchiveStore> MigrationEngine<P, A> {
    pub fn new(primary: Arc<P>, archive: Arc<A>, settings: MigrationSettings) -> Self {
        Self {
            primary,
            archive,
            settings,
        }
    }

    pub fn settings(&self) -> &MigrationSettings {
        &self.settings
    }

    /// Run a cycle with `cutoff = now - retention`.
    pub async fn run_cycle_now(
        &self,
        cancel: &CancellationToken,
    ) -> Result<MigrationReport, TieringError> {
        let cutoff = cutoff_for(OffsetDateTime::now_utc(), self.settings.retention);
        self.run_cycle_with_cancel(cutoff, cancel).await
    }

    /// Migrate every record with `timestamp < cutoff`.
    pub async fn run_cycle(&self, cutoff: OffsetDateTime) -> Result<MigrationReport, TieringError> {
        self.run_cycle_with_cancel(cutoff, &CancellationToken::new())
            .await
    }

    /// Migrate every record with `timestamp < cutoff`, stopping early if
    /// `cancel` fires.
    ///
    /// Cancellation is checked before each record is taken from the eligible
    /// sequence; records already started run to completion.
    ///
    /// Returns `Err` only when the eligible query cannot be opened. Every
    /// per-record failure is captured in the report instead.
    #[instrument(skip(self, cancel), fields(cutoff = %cutoff))]
    pub async fn run_cycle_with_cancel(
        &self,
        cutoff: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> Result<MigrationReport, TieringError> {
        info!(
            concurrency_limit = self.settings.concurrency_limit,
            "starting migration cycle"
        );

        let eligible = bounded(
            self.settings.store_timeout,
            self.primary.query_eligible(cutoff),
        )
        .await
        .map_err(|e| TieringError::from_storage(Tier::Primary, e))?;

        let mut cancelled = false;
        let mut halted: Option<QueryHalt> = None;

        let mut outcomes: Vec<MigrationOutcome> = eligible
            .take_while(|item| {
                let keep_going = if cancel.is_cancelled() {
                    cancelled = true;
                    false
                } else if let Err(e) = item {
                    halted = Some(QueryHalt::from_storage(e));
                    false
                } else {
                    true
                };
                future::ready(keep_going)
            })
            .filter_map(|item| future::ready(item.ok()))
            .map(|record| self.migrate_record(record, cutoff))
            .buffer_unordered(self.settings.concurrency_limit.max(1))
            .collect()
            .await;
        outcomes.sort_by(|a, b| a.id.cmp(&b.id));

        let report = MigrationReport {
            cutoff,
            outcomes,
            cancelled,
            halted,
        };

        if let Some(halt) = &report.halted {
            warn!(kind = ?halt.kind, reason = %halt, "eligible query failed part-way; cycle stopped early");
        }
        info!(
            archived = report.archived(),
            source_missing = report.count(OutcomeKind::SourceMissing),
            write_failed = report.count(OutcomeKind::WriteFailed),
            delete_failed = report.count(OutcomeKind::DeleteFailed),
            cancelled = report.cancelled,
            "migration cycle finished"
        );
        Ok(report)
    }

    /// Move one record. Never deletes unless the archive write succeeded.
    #[instrument(skip(self, queued, cutoff), fields(id = %queued.id))]
    async fn migrate_record(&self, queued: Record, cutoff: OffsetDateTime) -> MigrationOutcome {
        let key = queued.key();
        let timeout = self.settings.store_timeout;

        let record = match bounded(timeout, self.primary.get(&key)).await {
            Ok(record) if record.is_eligible(cutoff) => record,
            Ok(_) => {
                debug!("record was rewritten and is no longer eligible");
                return MigrationOutcome::failed(
                    &key.id,
                    OutcomeKind::SourceMissing,
                    "no longer eligible",
                );
            }
            Err(e) if e.is_not_found() => {
                debug!("record left the primary tier before it was archived");
                return MigrationOutcome::new(&key.id, OutcomeKind::SourceMissing);
            }
            Err(e) => {
                warn!(error = %e, "re-reading source failed; record left in place");
                return MigrationOutcome::failed(
                    &key.id,
                    OutcomeKind::WriteFailed,
                    format!("re-reading source: {e}"),
                );
            }
        };

        let bytes = match codec::encode(&record) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "encoding failed; record left in place");
                return MigrationOutcome::failed(&key.id, OutcomeKind::WriteFailed, e.to_string());
            }
        };

        let archived = match self.write_with_retries(&record.id, &bytes).await {
            Ok(PutStatus::Written) => OutcomeKind::Migrated,
            Ok(PutStatus::Unchanged) => OutcomeKind::AlreadyArchived,
            Err(e) => {
                warn!(error = %e, "archive write failed; record left in place");
                return MigrationOutcome::failed(&key.id, OutcomeKind::WriteFailed, e.to_string());
            }
        };

        match bounded(timeout, self.primary.delete(&key)).await {
            Ok(()) => MigrationOutcome::new(&key.id, archived),
            Err(e) if e.is_not_found() => {
                debug!("primary copy already removed");
                MigrationOutcome::new(&key.id, archived)
            }
            Err(e) => {
                warn!(error = %e, "primary delete failed; record is in both tiers");
                MigrationOutcome::failed(&key.id, OutcomeKind::DeleteFailed, e.to_string())
            }
        }
    }

    async fn write_with_retries(&self, id: &str, bytes: &[u8]) -> Result<PutStatus, StorageError> {
        let mut attempt = 0u32;
        loop {
            let result = bounded(
                self.settings.store_timeout,
                self.archive
                    .put(id, bytes, self.settings.overwrite_on_archive),
            )
            .await;
            match result {
                Ok(status) => return Ok(status),
                Err(e @ (StorageError::AlreadyExists { .. } | StorageError::InvalidId { .. })) => {
                    return Err(e)
                }
                Err(e) if attempt >= self.settings.write_retries => return Err(e),
                Err(e) => {
                    attempt += 1;
                    debug!(attempt, error = %e, "retrying archive write");
                    tokio::time::sleep(self.settings.retry_backoff * attempt).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn report(kinds: &[(&str, OutcomeKind)]) -> MigrationReport {
        MigrationReport {
            cutoff: datetime!(2024-01-01 00:00 UTC),
            outcomes: kinds
                .iter()
                .map(|(id, kind)| MigrationOutcome::new(id, *kind))
                .collect(),
            cancelled: false,
            halted: None,
        }
    }

    #[test]
    fn cutoff_subtracts_retention() {
        let now = datetime!(2024-04-10 12:00 UTC);
        assert_eq!(
            cutoff_for(now, time::Duration::days(90)),
            datetime!(2024-01-11 12:00 UTC)
        );
    }

    #[test]
    fn cutoff_clamps_to_epoch() {
        let now = datetime!(1970-01-02 00:00 UTC);
        assert_eq!(
            cutoff_for(now, time::Duration::days(365 * 1_000_000)),
            OffsetDateTime::UNIX_EPOCH
        );
    }

    #[test]
    fn report_counts_and_cleanliness() {
        let r = report(&[
            ("a", OutcomeKind::Migrated),
            ("b", OutcomeKind::AlreadyArchived),
            ("c", OutcomeKind::SourceMissing),
        ]);
        assert_eq!(r.archived(), 2);
        assert!(r.is_clean());

        let r = report(&[("a", OutcomeKind::Migrated), ("b", OutcomeKind::WriteFailed)]);
        assert!(!r.is_clean());
        assert_eq!(r.stuck_ids(), ["b"]);
    }

    #[test]
    fn report_display_summarizes() {
        let r = report(&[("a", OutcomeKind::Migrated), ("b", OutcomeKind::DeleteFailed)]);
        let text = r.to_string();
        assert!(text.starts_with("Archived 1 records"));
        assert!(text.contains("DeleteFailed b"));
    }

    #[test]
    fn unavailable_halt_is_distinguishable() {
        let mut r = report(&[("a", OutcomeKind::Migrated)]);
        r.halted = Some(QueryHalt::from_storage(&StorageError::Unavailable("gone".into())));
        assert!(r.halted_unavailable());
        assert!(!r.is_clean());
        assert_eq!(
            serde_json::to_value(&r.halted).unwrap()["kind"],
            serde_json::json!("unavailable")
        );

        r.halted = Some(QueryHalt::from_storage(&StorageError::Backend("bad page".into())));
        assert!(!r.halted_unavailable());
        assert!(r.to_string().contains("bad page"));
    }

    #[test]
    fn outcome_serializes_snake_case() {
        let json = serde_json::to_value(MigrationOutcome::new("R1", OutcomeKind::AlreadyArchived))
            .unwrap();
        assert_eq!(json, serde_json::json!({"id": "R1", "kind": "already_archived"}));
    }
}
