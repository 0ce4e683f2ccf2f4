use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;

use super::{day, make_record, TestResult};
use crate::{ArchiveStore, PrimaryStore, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 16;

pub(super) async fn run_primary_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "parallel_deletes_of_disjoint_records",
            parallel_deletes_of_disjoint_records(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "racing_deletes_exactly_one_succeeds",
            racing_deletes_exactly_one_succeeds(factory).await,
        ),
    ]
}

pub(super) async fn run_archive_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ArchiveStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![TestResult::from_result(
        "concurrent",
        "parallel_puts_of_disjoint_ids",
        parallel_puts_of_disjoint_ids(factory).await,
    )]
}

// ── Primary ──────────────────────────────────────────────────────────────────

async fn parallel_deletes_of_disjoint_records<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let mut keys = Vec::new();
    for i in 0..N {
        let r = make_record(&format!("R{i:03}"), i as i64)?;
        keys.push(r.key());
        storage
            .upsert(r)
            .await
            .map_err(|e| format!("upsert: {e}"))?;
    }

    let mut handles = Vec::new();
    for key in keys {
        let s = storage.clone();
        handles.push(tokio::spawn(async move { s.delete(&key).await }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("delete: {e}"))?;
    }

    let mut stream = storage
        .query_eligible(day(10_000))
        .await
        .map_err(|e| format!("query: {e}"))?;
    if let Some(left) = stream.next().await {
        return Err(format!("expected empty store, found {:?}", left));
    }
    Ok(())
}

/// N tasks delete the same record. One sees success, the rest NotFound.
async fn racing_deletes_exactly_one_succeeds<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let r = make_record("R100", 0)?;
    let key = r.key();
    storage
        .upsert(r)
        .await
        .map_err(|e| format!("upsert: {e}"))?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move { s.delete(&key).await }));
    }

    let mut ok = 0usize;
    let mut not_found = 0usize;
    for handle in handles {
        match handle.await.map_err(|e| format!("task panic: {e}"))? {
            Ok(()) => ok += 1,
            Err(StorageError::NotFound { .. }) => not_found += 1,
            Err(e) => return Err(format!("unexpected delete error: {e}")),
        }
    }
    if ok != 1 || not_found != N - 1 {
        return Err(format!(
            "expected 1 success and {} NotFound, got {ok} and {not_found}",
            N - 1
        ));
    }
    Ok(())
}

// ── Archive ──────────────────────────────────────────────────────────────────

async fn parallel_puts_of_disjoint_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ArchiveStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let id = format!("R{i:03}");
            s.put(&id, id.as_bytes(), true).await
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("put: {e}"))?;
    }
    for i in 0..N {
        let id = format!("R{i:03}");
        let bytes = storage
            .get(&id)
            .await
            .map_err(|e| format!("get {id}: {e}"))?;
        if bytes != id.as_bytes() {
            return Err(format!("content mismatch for {id}"));
        }
    }
    Ok(())
}
