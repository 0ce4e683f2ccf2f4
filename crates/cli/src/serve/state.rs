//! Application state shared across request handlers.

use tierstore_engine::{LookupResolver, MigrationEngine};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub(crate) struct AppState<P, A> {
    pub(crate) resolver: LookupResolver<P, A>,
    pub(crate) engine: MigrationEngine<P, A>,
    /// Held for the duration of a migration cycle; one cycle at a time.
    pub(crate) migration: Mutex<()>,
    /// Fired on shutdown so a running cycle stops between records.
    pub(crate) shutdown: CancellationToken,
}

impl<P, A> AppState<P, A> {
    pub(crate) fn new(
        resolver: LookupResolver<P, A>,
        engine: MigrationEngine<P, A>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            resolver,
            engine,
            migration: Mutex::new(()),
            shutdown,
        }
    }
}
