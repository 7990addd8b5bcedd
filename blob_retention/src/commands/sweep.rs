//! Connect to the configured container and delete its expired objects.

use blob_retention_clap_blocks::storage::StorageConfig;
use retention_sweep::{ConfigurationError, ObjectStoreContainer, SweepSummary, Sweeper, sweep};
use std::{io, sync::Arc};
use sweep_time::{SystemProvider, TimeProvider};
use tracing::info;

/// Printed before a [`ConfigurationError`] so the operator knows what to fix.
pub(crate) const CONFIGURATION_HINT: &str = "Invalid storage account information provided. \
     Please confirm the AccountName and AccountKey are valid in the \
     StorageConnectionString setting - then restart the sweep.";

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("Invalid storage configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Sweep(#[from] sweep::Error),
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, clap::Parser)]
pub(crate) struct SweepConfig {
    #[clap(flatten)]
    storage: StorageConfig,
}

pub(crate) async fn command(config: SweepConfig) -> Result<SweepSummary> {
    println!("Skycast Analytics Deletion Task Runner \n");
    let time_provider = Arc::new(SystemProvider::new());
    let start_time = time_provider.now();

    println!("1. Connect to Container\n ------------------------------");
    let store = config.storage.make_object_store().inspect_err(|_| {
        println!("{CONFIGURATION_HINT}");
    })?;
    info!(container = %config.storage.container, "Connected");

    println!("2. Delete old Blobs in Container\n ------------------------------");
    let sweeper = Sweeper::new(Arc::new(ObjectStoreContainer::new(store)), time_provider);
    let summary = sweeper.run_since(start_time, &mut io::stdout()).await?;

    Ok(summary)
}
