use std::future::Future;

use futures::StreamExt;

use super::{day, make_record, TestResult};
use crate::{PrimaryStore, RecordKey, StorageError};

pub(super) async fn run_primary_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "primary",
        "get_missing_returns_not_found",
        get_missing_returns_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "primary",
        "upsert_then_get_returns_record",
        upsert_then_get_returns_record(factory).await,
    ));
    results.push(TestResult::from_result(
        "primary",
        "upsert_replaces_existing",
        upsert_replaces_existing(factory).await,
    ));
    results.push(TestResult::from_result(
        "primary",
        "wrong_partition_key_is_not_found",
        wrong_partition_key_is_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "primary",
        "dot_prefixed_id_is_an_ordinary_record",
        dot_prefixed_id_is_an_ordinary_record(factory).await,
    ));
    results.push(TestResult::from_result(
        "primary",
        "delete_removes_record",
        delete_removes_record(factory).await,
    ));
    results.push(TestResult::from_result(
        "primary",
        "delete_missing_returns_not_found",
        delete_missing_returns_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "primary",
        "query_eligible_is_strictly_before_cutoff",
        query_eligible_is_strictly_before_cutoff(factory).await,
    ));
    results.push(TestResult::from_result(
        "primary",
        "query_eligible_is_restartable",
        query_eligible_is_restartable(factory).await,
    ));
    results.push(TestResult::from_result(
        "primary",
        "query_eligible_on_empty_store",
        query_eligible_on_empty_store(factory).await,
    ));

    results
}

async fn collect_ids<S: PrimaryStore>(
    s: &S,
    cutoff: time::OffsetDateTime,
) -> Result<Vec<String>, String> {
    let mut stream = s
        .query_eligible(cutoff)
        .await
        .map_err(|e| format!("query_eligible: {e}"))?;
    let mut ids = Vec::new();
    while let Some(item) = stream.next().await {
        ids.push(item.map_err(|e| format!("stream item: {e}"))?.id);
    }
    ids.sort();
    Ok(ids)
}

// ── Point reads ──────────────────────────────────────────────────────────────

async fn get_missing_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get(&RecordKey::new("R999", "R9")).await {
        Err(StorageError::NotFound { id }) if id == "R999" => Ok(()),
        other => Err(format!("expected NotFound for R999, got {:?}", other)),
    }
}

async fn upsert_then_get_returns_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let r = make_record("R100", 0)?;
    s.upsert(r.clone()).await.map_err(|e| format!("upsert: {e}"))?;
    let got = s.get(&r.key()).await.map_err(|e| format!("get: {e}"))?;
    if got != r {
        return Err(format!("round trip mismatch: wrote {:?}, read {:?}", r, got));
    }
    Ok(())
}

async fn upsert_replaces_existing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut r = make_record("R100", 0)?;
    s.upsert(r.clone()).await.map_err(|e| format!("upsert 1: {e}"))?;
    r.payload = serde_json::json!({"amount": 7});
    s.upsert(r.clone()).await.map_err(|e| format!("upsert 2: {e}"))?;
    let got = s.get(&r.key()).await.map_err(|e| format!("get: {e}"))?;
    if got.payload != r.payload {
        return Err(format!("expected replaced payload, got {}", got.payload));
    }
    Ok(())
}

async fn wrong_partition_key_is_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let r = make_record("R100", 0)?;
    s.upsert(r).await.map_err(|e| format!("upsert: {e}"))?;
    match s.get(&RecordKey::new("R100", "ZZ")).await {
        Err(StorageError::NotFound { .. }) => Ok(()),
        other => Err(format!(
            "expected NotFound under wrong partition key, got {:?}",
            other
        )),
    }
}

/// `"..x"` derives the partition key `".."`; it is still just a record.
async fn dot_prefixed_id_is_an_ordinary_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let r = make_record("..x", 1)?;
    if r.partition_key != ".." {
        return Err(format!("expected partition key \"..\", got {:?}", r.partition_key));
    }
    s.upsert(r.clone()).await.map_err(|e| format!("upsert: {e}"))?;
    let got = s.get(&r.key()).await.map_err(|e| format!("get: {e}"))?;
    if got != r {
        return Err(format!("round trip mismatch: wrote {:?}, read {:?}", r, got));
    }
    let ids = collect_ids(&s, day(5)).await?;
    if ids != ["..x"] {
        return Err(format!("expected [..x] to be eligible, got {:?}", ids));
    }
    s.delete(&r.key()).await.map_err(|e| format!("delete: {e}"))?;
    match s.get(&r.key()).await {
        Err(StorageError::NotFound { id }) if id == "..x" => Ok(()),
        other => Err(format!("expected NotFound after delete, got {:?}", other)),
    }
}

// ── Deletes ──────────────────────────────────────────────────────────────────

async fn delete_removes_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let r = make_record("R100", 0)?;
    s.upsert(r.clone()).await.map_err(|e| format!("upsert: {e}"))?;
    s.delete(&r.key()).await.map_err(|e| format!("delete: {e}"))?;
    match s.get(&r.key()).await {
        Err(StorageError::NotFound { .. }) => Ok(()),
        other => Err(format!("expected NotFound after delete, got {:?}", other)),
    }
}

/// Deleting twice: the second delete reports NotFound, nothing else.
async fn delete_missing_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let r = make_record("R100", 0)?;
    s.upsert(r.clone()).await.map_err(|e| format!("upsert: {e}"))?;
    s.delete(&r.key()).await.map_err(|e| format!("delete 1: {e}"))?;
    match s.delete(&r.key()).await {
        Err(StorageError::NotFound { id }) if id == "R100" => Ok(()),
        other => Err(format!("expected NotFound on second delete, got {:?}", other)),
    }
}

// ── Eligible query ───────────────────────────────────────────────────────────

async fn query_eligible_is_strictly_before_cutoff<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for (id, d) in [("A1", 0), ("B1", 5), ("C1", 10), ("D1", 20)] {
        s.upsert(make_record(id, d)?)
            .await
            .map_err(|e| format!("upsert {id}: {e}"))?;
    }
    // C1 sits exactly on the cutoff and must not be returned.
    let ids = collect_ids(&s, day(10)).await?;
    if ids != ["A1", "B1"] {
        return Err(format!("expected [A1, B1], got {:?}", ids));
    }
    Ok(())
}

async fn query_eligible_is_restartable<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for (id, d) in [("A1", 0), ("B1", 1), ("C1", 2)] {
        s.upsert(make_record(id, d)?)
            .await
            .map_err(|e| format!("upsert {id}: {e}"))?;
    }
    // Abandon the first sequence after one item.
    {
        let mut stream = s
            .query_eligible(day(100))
            .await
            .map_err(|e| format!("query 1: {e}"))?;
        stream
            .next()
            .await
            .ok_or("first query yielded nothing")?
            .map_err(|e| format!("first item: {e}"))?;
    }
    let ids = collect_ids(&s, day(100)).await?;
    if ids != ["A1", "B1", "C1"] {
        return Err(format!("expected all three ids on reopen, got {:?}", ids));
    }
    Ok(())
}

async fn query_eligible_on_empty_store<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let ids = collect_ids(&s, day(100)).await?;
    if !ids.is_empty() {
        return Err(format!("expected no records, got {:?}", ids));
    }
    Ok(())
}
