//! Opening the configured filesystem tiers.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use tierstore_engine::{LookupResolver, MigrationEngine, TieringConfig};
use tierstore_storage::fs::{FsArchive, FsPrimary};
use tierstore_storage::PartitionKeyPolicy;
use tracing::debug;

/// Both tiers plus the configuration they were opened with.
pub(crate) struct Tiers {
    pub(crate) config: TieringConfig,
    pub(crate) policy: Arc<dyn PartitionKeyPolicy>,
    pub(crate) primary: Arc<FsPrimary>,
    pub(crate) archive: Arc<FsArchive>,
}

impl Tiers {
    /// Load configuration (file, then environment) and open both tiers.
    pub(crate) async fn open(config_path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let config = TieringConfig::load(config_path)?;
        let policy = config.partition.build()?;
        let primary = FsPrimary::open(config.primary.dir.clone()).await?;
        let archive = FsArchive::open(&config.archive.dir, &config.archive.container).await?;
        debug!(
            primary = %primary.root().display(),
            archive = %archive.dir().display(),
            policy = policy.name(),
            "opened tiers"
        );
        Ok(Self {
            config,
            policy,
            primary: Arc::new(primary),
            archive: Arc::new(archive),
        })
    }

    pub(crate) fn engine(&self) -> MigrationEngine<FsPrimary, FsArchive> {
        MigrationEngine::new(
            self.primary.clone(),
            self.archive.clone(),
            self.config.migration_settings(),
        )
    }

    pub(crate) fn resolver(&self) -> LookupResolver<FsPrimary, FsArchive> {
        LookupResolver::new(
            self.primary.clone(),
            self.archive.clone(),
            self.policy.clone(),
        )
        .with_timeout(self.config.store_timeout())
    }
}
