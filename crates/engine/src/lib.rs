//! Two-tier record storage: migration of aged records from the primary tier
//! to the archive tier, and lookups that do not care which tier holds a
//! record.
//!
//! The one invariant everything here protects: a record is always present
//! in at least one tier. The migration sweep writes to the archive and
//! deletes from the primary only after the write is confirmed; the lookup
//! path probes the primary first and falls back to the archive only on a
//! genuine miss.

pub mod config;
mod error;
pub mod lookup;
pub mod migration;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tierstore_storage::StorageError;

pub use config::{ConfigError, MigrationSettings, TieringConfig};
pub use error::TieringError;
pub use lookup::{LookupResolver, Resolved};
pub use migration::{
    cutoff_for, HaltKind, MigrationEngine, MigrationOutcome, MigrationReport, OutcomeKind,
    QueryHalt,
};

/// The two storage tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Primary,
    Archive,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Primary => "primary",
            Tier::Archive => "archive",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run a store call, turning an expired deadline into `Unavailable`.
pub(crate) async fn bounded<T>(
    limit: Option<Duration>,
    call: impl Future<Output = Result<T, StorageError>>,
) -> Result<T, StorageError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
            Err(StorageError::Unavailable(format!(
                "store call timed out after {limit:?}"
            )))
        }),
        None => call.await,
    }
}
