//! CLI handling for the storage account and container (via CLI arguments and
//! environment variables).

use object_store::DynObjectStore;
use retention_sweep::{ConfigurationError, StorageAccount};
use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;

/// Container swept when none is configured.
pub const DEFAULT_CONTAINER: &str = "skycast-ife-analytics-device-outputs";

/// Where the sweep connects to.
#[derive(Debug, clap::Parser)]
pub struct StorageConfig {
    /// Azure storage connection string, e.g.
    /// `DefaultEndpointsProtocol=https;AccountName=...;AccountKey=...`, or
    /// `UseDevelopmentStorage=true` for the local storage emulator.
    ///
    /// Read from a `.env` file in the working directory when not set in the
    /// environment.
    #[clap(
        long = "connection-string",
        env = "StorageConnectionString",
        hide_env_values = true,
        action
    )]
    pub connection_string: Option<Secret<String>>,

    /// Name of the container whose expired objects are deleted.
    #[clap(
        long = "container",
        env = "STORAGE_CONTAINER",
        default_value = DEFAULT_CONTAINER,
        action
    )]
    pub container: String,
}

impl StorageConfig {
    /// Parse the connection string. A missing one is reported like an empty
    /// one.
    pub fn make_account(&self) -> Result<StorageAccount, ConfigurationError> {
        match &self.connection_string {
            Some(connection_string) => StorageAccount::parse(connection_string.expose_secret()),
            None => Err(ConfigurationError::EmptyConnectionString),
        }
    }

    /// Client for the configured container. No request is made.
    pub fn make_object_store(&self) -> Result<Arc<DynObjectStore>, ConfigurationError> {
        self.make_account()?.container(&self.container)
    }
}
