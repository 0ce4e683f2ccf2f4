#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use tierstore_engine::{LookupResolver, MigrationEngine, MigrationSettings};
use tierstore_storage::memory::{MemoryArchive, MemoryPrimary};
use tierstore_storage::{
    PrefixPolicy, PrimaryStore, Record, RecordKey, RecordStream, StorageError,
};
use time::macros::datetime;
use time::OffsetDateTime;

/// Fixed "now" so tests never depend on the wall clock.
pub const NOW: OffsetDateTime = datetime!(2024-06-01 00:00 UTC);

pub fn days_ago(days: i64) -> OffsetDateTime {
    NOW - time::Duration::days(days)
}

/// `now - 90 days`, the default retention.
pub fn cutoff() -> OffsetDateTime {
    days_ago(90)
}

pub fn record(id: &str, age_days: i64, payload: serde_json::Value) -> Record {
    Record::new(id, days_ago(age_days), payload, &PrefixPolicy::default()).unwrap()
}

pub fn settings() -> MigrationSettings {
    MigrationSettings {
        retry_backoff: Duration::from_millis(1),
        ..MigrationSettings::default()
    }
}

pub fn stores() -> (Arc<MemoryPrimary>, Arc<MemoryArchive>) {
    (Arc::new(MemoryPrimary::new()), Arc::new(MemoryArchive::new()))
}

pub fn engine<P: PrimaryStore>(
    primary: &Arc<P>,
    archive: &Arc<MemoryArchive>,
    settings: MigrationSettings,
) -> MigrationEngine<P, MemoryArchive> {
    MigrationEngine::new(primary.clone(), archive.clone(), settings)
}

pub fn resolver<P: PrimaryStore>(
    primary: &Arc<P>,
    archive: &Arc<MemoryArchive>,
) -> LookupResolver<P, MemoryArchive> {
    LookupResolver::new(
        primary.clone(),
        archive.clone(),
        Arc::new(PrefixPolicy::default()),
    )
}

/// Primary store whose eligible query yields scripted items ahead of the
/// real contents, to model a query that raced a concurrent writer or failed
/// part-way.
pub struct ScriptedPrimary {
    pub inner: MemoryPrimary,
    pub script: Vec<Result<Record, StorageError>>,
    /// Stop after the script instead of continuing with the real contents.
    pub script_only: bool,
}

#[async_trait]
impl PrimaryStore for ScriptedPrimary {
    async fn query_eligible(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<RecordStream<'_>, StorageError> {
        let mut items = self.script.clone();
        if !self.script_only {
            use futures::StreamExt;
            let real: Vec<_> = self.inner.query_eligible(cutoff).await?.collect().await;
            items.extend(real);
        }
        Ok(Box::pin(stream::iter(items)))
    }

    async fn get(&self, key: &RecordKey) -> Result<Record, StorageError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &RecordKey) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }

    async fn upsert(&self, record: Record) -> Result<(), StorageError> {
        self.inner.upsert(record).await
    }
}
