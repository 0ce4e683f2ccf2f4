//! Conformance test suite for `PrimaryStore` and `ArchiveStore`
//! implementations.
//!
//! Backend-agnostic checks that any tier backend can run to verify it honors
//! the contracts the migration sweep and lookup path rely on:
//!
//! - **Primary point operations**: partition-keyed get/delete, `NotFound`
//!   on absent records, idempotent delete
//! - **Eligible query**: strict `timestamp < cutoff`, restartable
//! - **Archive writes**: overwrite-safe puts, `Unchanged` on identical
//!   content, `AlreadyExists` when overwrite is refused
//! - **Concurrency**: parallel puts and deletes over disjoint records
//!
//! # Usage
//!
//! Backend crates call the runners with a factory that creates a fresh,
//! empty store for each test:
//!
//! ```ignore
//! use tierstore_storage::conformance::run_archive_suite;
//!
//! #[tokio::test]
//! async fn blob_conformance() {
//!     let report = run_archive_suite(|| async { create_test_archive().await }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod archive;
mod concurrent;
mod primary;

use std::fmt;
use std::future::Future;

use time::OffsetDateTime;

use crate::key::PrefixPolicy;
use crate::record::Record;
use crate::traits::{ArchiveStore, PrimaryStore};

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "primary", "archive", "concurrent").
    pub category: String,
    /// Test name (e.g. "delete_missing_returns_not_found").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a conformance run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl ConformanceReport {
    fn from_results(results: Vec<TestResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        let total = results.len();
        ConformanceReport {
            results,
            passed,
            failed: total - passed,
            total,
        }
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the primary-tier suite. `factory` is called once per test.
pub async fn run_primary_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = primary::run_primary_tests(&factory).await;
    results.extend(concurrent::run_primary_concurrent_tests(&factory).await);
    ConformanceReport::from_results(results)
}

/// Run the archive-tier suite. `factory` is called once per test.
pub async fn run_archive_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: ArchiveStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = archive::run_archive_tests(&factory).await;
    results.extend(concurrent::run_archive_concurrent_tests(&factory).await);
    ConformanceReport::from_results(results)
}

// ── Helpers ──────────────────────────────────────────────────────────────────

const BASE_UNIX: i64 = 1_700_000_000;

/// A fixed instant `days` days after a 2023 base, so tests never depend on
/// the wall clock.
fn day(days: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(BASE_UNIX + days * 86_400)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

fn make_record(id: &str, days: i64) -> Result<Record, String> {
    Record::new(
        id,
        day(days),
        serde_json::json!({"id": id, "amount": days * 10, "lines": [1, 2, 3]}),
        &PrefixPolicy::default(),
    )
    .map_err(|e| format!("make_record({id}): {e}"))
}
