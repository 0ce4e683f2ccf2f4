//! In-memory tier stores.
//!
//! For tests and local runs. Both stores are cheap cloneable handles over
//! shared state, and both carry a [`Faults`] switchboard so tests can make
//! individual calls fail, slow every call down, or take the whole backend
//! offline.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use time::OffsetDateTime;
use tracing::instrument;

use crate::codec;
use crate::error::StorageError;
use crate::key::RecordKey;
use crate::record::Record;
use crate::traits::{ArchiveStore, PrimaryStore, PutStatus, RecordStream};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Which call a fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOp {
    Query,
    Get,
    Put,
    Delete,
}

#[derive(Debug, Default)]
struct FaultState {
    unavailable: bool,
    delay: Option<Duration>,
    failing: HashSet<(FaultOp, String)>,
    fail_query: bool,
}

/// Fault injection shared by a store and the test driving it.
#[derive(Debug, Default)]
pub struct Faults {
    state: Mutex<FaultState>,
}

impl Faults {
    /// Make every call return `StorageError::Unavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.state).unavailable = unavailable;
    }

    /// Sleep this long at the start of every call.
    pub fn set_delay(&self, delay: Option<Duration>) {
        lock(&self.state).delay = delay;
    }

    /// Make `op` fail with a backend error for this id.
    pub fn fail(&self, op: FaultOp, id: &str) {
        let mut state = lock(&self.state);
        if op == FaultOp::Query {
            state.fail_query = true;
        } else {
            state.failing.insert((op, id.to_string()));
        }
    }

    pub fn clear(&self, op: FaultOp, id: &str) {
        let mut state = lock(&self.state);
        if op == FaultOp::Query {
            state.fail_query = false;
        } else {
            state.failing.remove(&(op, id.to_string()));
        }
    }

    pub fn clear_all(&self) {
        *lock(&self.state) = FaultState::default();
    }

    async fn check(&self, op: FaultOp, id: &str) -> Result<(), StorageError> {
        let delay = lock(&self.state).delay;
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let state = lock(&self.state);
        if state.unavailable {
            return Err(StorageError::Unavailable("injected outage".into()));
        }
        let failing = match op {
            FaultOp::Query => state.fail_query,
            _ => state.failing.contains(&(op, id.to_string())),
        };
        if failing {
            return Err(StorageError::Backend(format!(
                "injected {op:?} fault for {id}"
            )));
        }
        Ok(())
    }
}

// ── Primary ──────────────────────────────────────────────────────────────────

/// In-memory primary tier.
#[derive(Clone, Default)]
pub struct MemoryPrimary {
    records: Arc<Mutex<HashMap<RecordKey, Record>>>,
    faults: Arc<Faults>,
}

impl MemoryPrimary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Insert without going through fault injection.
    pub fn seed(&self, records: impl IntoIterator<Item = Record>) {
        let mut map = lock(&self.records);
        for r in records {
            map.insert(r.key(), r);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.records).keys().any(|k| k.id == id)
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PrimaryStore for MemoryPrimary {
    #[instrument(skip(self), fields(cutoff = %cutoff))]
    async fn query_eligible(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<RecordStream<'_>, StorageError> {
        self.faults.check(FaultOp::Query, "").await?;
        let mut eligible: Vec<Record> = lock(&self.records)
            .values()
            .filter(|r| r.is_eligible(cutoff))
            .cloned()
            .collect();
        eligible.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(Box::pin(stream::iter(eligible.into_iter().map(Ok))))
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &RecordKey) -> Result<Record, StorageError> {
        self.faults.check(FaultOp::Get, &key.id).await?;
        lock(&self.records)
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(&key.id))
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete(&self, key: &RecordKey) -> Result<(), StorageError> {
        self.faults.check(FaultOp::Delete, &key.id).await?;
        lock(&self.records)
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(&key.id))
    }

    #[instrument(skip(self, record), fields(id = %record.id))]
    async fn upsert(&self, record: Record) -> Result<(), StorageError> {
        codec::validate_id(&record.id)?;
        self.faults.check(FaultOp::Put, &record.id).await?;
        lock(&self.records).insert(record.key(), record);
        Ok(())
    }
}

// ── Archive ──────────────────────────────────────────────────────────────────

/// In-memory archive tier, keyed by blob name.
#[derive(Clone, Default)]
pub struct MemoryArchive {
    blobs: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    faults: Arc<Faults>,
    writes: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Blob content stored for `id`, if any.
    pub fn blob(&self, id: &str) -> Option<Vec<u8>> {
        lock(&self.blobs).get(&codec::blob_name(id)).cloned()
    }

    /// Blob names currently stored, sorted.
    pub fn blob_names(&self) -> Vec<String> {
        lock(&self.blobs).keys().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.blobs).contains_key(&codec::blob_name(id))
    }

    pub fn len(&self) -> usize {
        lock(&self.blobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of puts that created or replaced content.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Highest number of puts observed running at the same time.
    pub fn max_concurrent_puts(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn store(&self, id: &str, bytes: &[u8], overwrite: bool) -> Result<PutStatus, StorageError> {
        let mut blobs = lock(&self.blobs);
        let name = codec::blob_name(id);
        match blobs.get(&name) {
            Some(existing) if existing.as_slice() == bytes => return Ok(PutStatus::Unchanged),
            Some(_) if !overwrite => {
                return Err(StorageError::AlreadyExists { id: id.to_string() })
            }
            _ => {}
        }
        blobs.insert(name, bytes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(PutStatus::Written)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchive {
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn put(
        &self,
        id: &str,
        bytes: &[u8],
        overwrite: bool,
    ) -> Result<PutStatus, StorageError> {
        codec::validate_id(id)?;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.faults.check(FaultOp::Put, id).await?;
        self.store(id, bytes, overwrite)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> Result<Vec<u8>, StorageError> {
        codec::validate_id(id)?;
        self.faults.check(FaultOp::Get, id).await?;
        self.blob(id).ok_or_else(|| StorageError::not_found(id))
    }
}
