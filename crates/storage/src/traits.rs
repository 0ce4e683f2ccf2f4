use async_trait::async_trait;
use futures::stream::BoxStream;
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::key::RecordKey;
use crate::record::Record;

/// Lazy sequence of records produced by [`PrimaryStore::query_eligible`].
pub type RecordStream<'a> = BoxStream<'a, Result<Record, StorageError>>;

/// Outcome of a successful [`ArchiveStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutStatus {
    /// The blob was created or its content replaced.
    Written,
    /// Byte-identical content was already stored; nothing changed.
    Unchanged,
}

/// The hot tier: low-latency storage for recently written records.
///
/// ## Addressing
///
/// Every point operation takes a [`RecordKey`], the `(id, partition_key)`
/// pair. Using the wrong partition key for an id is indistinguishable from
/// the record not existing.
///
/// ## Eligible query
///
/// `query_eligible(cutoff)` yields every record with `timestamp < cutoff`.
/// The sequence is finite and can be reopened by calling the method again,
/// but it is not a snapshot: records written or deleted by concurrent
/// writers while it is being consumed may or may not appear.
///
/// ## Idempotent delete
///
/// Deleting a record that does not exist (never created, or already deleted
/// by an earlier or concurrent sweep) returns `Err(StorageError::NotFound)`.
/// Callers treat that as success.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so one handle can be
/// shared by the migration sweep, the lookup path, and axum handlers.
#[async_trait]
pub trait PrimaryStore: Send + Sync + 'static {
    /// Open a lazy sequence of all records with `timestamp < cutoff`.
    async fn query_eligible(&self, cutoff: OffsetDateTime)
        -> Result<RecordStream<'_>, StorageError>;

    /// Point read.
    ///
    /// Returns `Err(StorageError::NotFound)` if no record exists at `key`.
    async fn get(&self, key: &RecordKey) -> Result<Record, StorageError>;

    /// Point delete.
    ///
    /// Returns `Err(StorageError::NotFound)` if no record exists at `key`.
    async fn delete(&self, key: &RecordKey) -> Result<(), StorageError>;

    /// Insert or replace a record. Used by writers; the migration sweep never
    /// writes to the primary tier.
    async fn upsert(&self, record: Record) -> Result<(), StorageError>;
}

/// The cold tier: cheap blob storage for aged records, addressed by id alone.
///
/// One blob per id, named deterministically from the id
/// (see [`crate::codec::blob_name`]).
#[async_trait]
pub trait ArchiveStore: Send + Sync + 'static {
    /// Store `bytes` under `id`.
    ///
    /// With `overwrite = true`, writing the same id again always succeeds;
    /// writing identical bytes reports [`PutStatus::Unchanged`].
    /// With `overwrite = false`, identical bytes still report `Unchanged`,
    /// but different existing content returns `Err(StorageError::AlreadyExists)`.
    async fn put(&self, id: &str, bytes: &[u8], overwrite: bool)
        -> Result<PutStatus, StorageError>;

    /// Fetch the blob stored under `id`.
    ///
    /// Returns `Err(StorageError::NotFound)` if no blob exists.
    async fn get(&self, id: &str) -> Result<Vec<u8>, StorageError>;
}
