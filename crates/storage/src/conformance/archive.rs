use std::future::Future;

use super::TestResult;
use crate::{ArchiveStore, PutStatus, StorageError};

pub(super) async fn run_archive_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ArchiveStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "archive",
        "get_missing_returns_not_found",
        get_missing_returns_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "archive",
        "put_then_get_returns_bytes",
        put_then_get_returns_bytes(factory).await,
    ));
    results.push(TestResult::from_result(
        "archive",
        "repeat_put_reports_unchanged",
        repeat_put_reports_unchanged(factory).await,
    ));
    results.push(TestResult::from_result(
        "archive",
        "overwrite_replaces_content",
        overwrite_replaces_content(factory).await,
    ));
    results.push(TestResult::from_result(
        "archive",
        "no_overwrite_rejects_different_content",
        no_overwrite_rejects_different_content(factory).await,
    ));
    results.push(TestResult::from_result(
        "archive",
        "no_overwrite_accepts_identical_content",
        no_overwrite_accepts_identical_content(factory).await,
    ));
    results.push(TestResult::from_result(
        "archive",
        "blobs_are_independent_per_id",
        blobs_are_independent_per_id(factory).await,
    ));
    results.push(TestResult::from_result(
        "archive",
        "path_like_id_rejected",
        path_like_id_rejected(factory).await,
    ));

    results
}

async fn get_missing_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ArchiveStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get("R999").await {
        Err(StorageError::NotFound { id }) if id == "R999" => Ok(()),
        other => Err(format!("expected NotFound for R999, got {:?}", other)),
    }
}

async fn put_then_get_returns_bytes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ArchiveStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let status = s
        .put("R100", br#"{"amount":42}"#, true)
        .await
        .map_err(|e| format!("put: {e}"))?;
    if status != PutStatus::Written {
        return Err(format!("expected Written on first put, got {:?}", status));
    }
    let bytes = s.get("R100").await.map_err(|e| format!("get: {e}"))?;
    if bytes != br#"{"amount":42}"# {
        return Err(format!(
            "unexpected content: {}",
            String::from_utf8_lossy(&bytes)
        ));
    }
    Ok(())
}

/// Same id, same bytes, overwrite on: second put succeeds and changes nothing.
async fn repeat_put_reports_unchanged<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ArchiveStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put("R100", b"v1", true)
        .await
        .map_err(|e| format!("put 1: {e}"))?;
    match s.put("R100", b"v1", true).await {
        Ok(PutStatus::Unchanged) => Ok(()),
        other => Err(format!("expected Unchanged on repeat put, got {:?}", other)),
    }
}

async fn overwrite_replaces_content<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ArchiveStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put("R100", b"v1", true)
        .await
        .map_err(|e| format!("put 1: {e}"))?;
    match s.put("R100", b"v2", true).await {
        Ok(PutStatus::Written) => {}
        other => return Err(format!("expected Written on overwrite, got {:?}", other)),
    }
    let bytes = s.get("R100").await.map_err(|e| format!("get: {e}"))?;
    if bytes != b"v2" {
        return Err("overwrite did not replace content".into());
    }
    Ok(())
}

async fn no_overwrite_rejects_different_content<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ArchiveStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put("R100", b"v1", true)
        .await
        .map_err(|e| format!("put 1: {e}"))?;
    match s.put("R100", b"v2", false).await {
        Err(StorageError::AlreadyExists { id }) if id == "R100" => {}
        other => return Err(format!("expected AlreadyExists, got {:?}", other)),
    }
    let bytes = s.get("R100").await.map_err(|e| format!("get: {e}"))?;
    if bytes != b"v1" {
        return Err("refused put still changed content".into());
    }
    Ok(())
}

async fn no_overwrite_accepts_identical_content<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ArchiveStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put("R100", b"v1", false)
        .await
        .map_err(|e| format!("put 1: {e}"))?;
    match s.put("R100", b"v1", false).await {
        Ok(PutStatus::Unchanged) => Ok(()),
        other => Err(format!("expected Unchanged, got {:?}", other)),
    }
}

async fn blobs_are_independent_per_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ArchiveStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put("R100", b"one", true)
        .await
        .map_err(|e| format!("put R100: {e}"))?;
    s.put("R1000", b"two", true)
        .await
        .map_err(|e| format!("put R1000: {e}"))?;
    let a = s.get("R100").await.map_err(|e| format!("get R100: {e}"))?;
    let b = s.get("R1000").await.map_err(|e| format!("get R1000: {e}"))?;
    if a != b"one" || b != b"two" {
        return Err("blobs for distinct ids interfered".into());
    }
    Ok(())
}

async fn path_like_id_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ArchiveStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for id in ["../escape", "a/b", ""] {
        match s.put(id, b"x", true).await {
            Err(StorageError::InvalidId { .. }) => {}
            other => return Err(format!("expected InvalidId for {id:?}, got {:?}", other)),
        }
    }
    Ok(())
}
