//! Storage account handles built from connection strings.
//!
//! A connection string is a `;` separated list of `Key=Value` settings, as
//! issued by the Azure portal:
//!
//! ```text
//! DefaultEndpointsProtocol=https;AccountName=myaccount;AccountKey=<base64>;EndpointSuffix=core.windows.net
//! ```
//!
//! `UseDevelopmentStorage=true` on its own selects the local storage emulator.

use base64::{Engine, engine::general_purpose::STANDARD};
use object_store::{
    DynObjectStore,
    azure::{AzureConfigKey, MicrosoftAzureBuilder},
};
use secrecy::{ExposeSecret, SecretString};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use std::{collections::BTreeMap, sync::Arc};
use tracing::info;
use url::Url;

/// Endpoint suffix used when the connection string does not name one.
pub const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Account name the storage emulator serves.
pub const DEVELOPMENT_STORAGE_ACCOUNT: &str = "devstoreaccount1";

const DEVELOPMENT_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// The connection configuration is structurally invalid.
///
/// Messages never include credential values.
#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum ConfigurationError {
    #[snafu(display("The storage connection string is empty"))]
    EmptyConnectionString,

    #[snafu(display("Setting #{position} of the connection string is not of the form Key=Value"))]
    MalformedSetting { position: usize },

    #[snafu(display("Unknown connection string setting '{key}'"))]
    UnknownSetting { key: String },

    #[snafu(display("Connection string setting '{key}' has an empty value"))]
    EmptyValue { key: String },

    #[snafu(display("Connection string setting '{key}' is specified more than once"))]
    DuplicateSetting { key: String },

    #[snafu(display("Missing required connection string setting '{key}'"))]
    MissingSetting { key: String },

    #[snafu(display("Either AccountKey or SharedAccessSignature must be set"))]
    MissingCredentials,

    #[snafu(display("AccountKey and SharedAccessSignature cannot both be set"))]
    ConflictingCredentials,

    #[snafu(display("AccountKey is not valid base64"))]
    InvalidAccountKey { source: base64::DecodeError },

    #[snafu(display("DefaultEndpointsProtocol must be 'http' or 'https', got '{value}'"))]
    InvalidProtocol { value: String },

    #[snafu(display("Invalid blob endpoint '{endpoint}': {source}"))]
    InvalidEndpoint {
        endpoint: String,
        source: url::ParseError,
    },

    #[snafu(display("UseDevelopmentStorage only accepts 'true', got '{value}'"))]
    InvalidDevelopmentStorage { value: String },

    #[snafu(display("UseDevelopmentStorage cannot be combined with '{key}'"))]
    DevelopmentStorageConflict { key: String },

    #[snafu(display("Container name must not be empty"))]
    EmptyContainerName,

    #[snafu(display("Error configuring Microsoft Azure: {source}"))]
    InvalidAzureConfig { source: object_store::Error },
}

/// Settings recognised in a connection string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Setting {
    DefaultEndpointsProtocol,
    AccountName,
    AccountKey,
    SharedAccessSignature,
    EndpointSuffix,
    BlobEndpoint,
    UseDevelopmentStorage,
    // accepted so portal strings parse, otherwise unused
    QueueEndpoint,
    TableEndpoint,
    FileEndpoint,
}

impl Setting {
    const ALL: [Self; 10] = [
        Self::DefaultEndpointsProtocol,
        Self::AccountName,
        Self::AccountKey,
        Self::SharedAccessSignature,
        Self::EndpointSuffix,
        Self::BlobEndpoint,
        Self::UseDevelopmentStorage,
        Self::QueueEndpoint,
        Self::TableEndpoint,
        Self::FileEndpoint,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::DefaultEndpointsProtocol => "DefaultEndpointsProtocol",
            Self::AccountName => "AccountName",
            Self::AccountKey => "AccountKey",
            Self::SharedAccessSignature => "SharedAccessSignature",
            Self::EndpointSuffix => "EndpointSuffix",
            Self::BlobEndpoint => "BlobEndpoint",
            Self::UseDevelopmentStorage => "UseDevelopmentStorage",
            Self::QueueEndpoint => "QueueEndpoint",
            Self::TableEndpoint => "TableEndpoint",
            Self::FileEndpoint => "FileEndpoint",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|setting| setting.name().eq_ignore_ascii_case(key))
    }
}

/// Scheme used to reach the derived blob endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    Http,
    #[default]
    Https,
}

impl std::str::FromStr for Protocol {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            _ => InvalidProtocolSnafu { value: s }.fail(),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Https => write!(f, "https"),
        }
    }
}

/// How requests against the account are authorized.
#[derive(Debug)]
pub enum Credential {
    /// Shared key signing with the base64 account key.
    AccountKey(SecretString),
    /// A shared access signature query string.
    SharedAccessSignature(SecretString),
    /// The well-known key of the storage emulator.
    DevelopmentStorage,
}

/// A parsed storage account: where the blob service lives and how to
/// authenticate against it.
#[derive(Debug)]
pub struct StorageAccount {
    account_name: String,
    blob_endpoint: Url,
    credential: Credential,
}

impl StorageAccount {
    /// Parse a connection string into an account handle.
    pub fn parse(connection_string: &str) -> Result<Self, ConfigurationError> {
        let mut settings = BTreeMap::new();

        for (position, segment) in connection_string
            .split(';')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .enumerate()
        {
            let (key, value) = segment.split_once('=').context(MalformedSettingSnafu {
                position: position + 1,
            })?;
            let (key, value) = (key.trim(), value.trim());

            let setting = Setting::from_key(key).context(UnknownSettingSnafu { key })?;
            ensure!(!value.is_empty(), EmptyValueSnafu { key: setting.name() });

            let previous = settings.insert(setting, value.to_string());
            ensure!(
                previous.is_none(),
                DuplicateSettingSnafu { key: setting.name() }
            );
        }

        ensure!(!settings.is_empty(), EmptyConnectionStringSnafu);

        if let Some(value) = settings.remove(&Setting::UseDevelopmentStorage) {
            ensure!(
                value.eq_ignore_ascii_case("true"),
                InvalidDevelopmentStorageSnafu { value }
            );
            if let Some(other) = settings.keys().next() {
                return DevelopmentStorageConflictSnafu { key: other.name() }.fail();
            }
            return Self::development_storage();
        }

        let account_name = settings
            .remove(&Setting::AccountName)
            .context(MissingSettingSnafu {
                key: Setting::AccountName.name(),
            })?;

        let protocol = match settings.remove(&Setting::DefaultEndpointsProtocol) {
            Some(value) => value.parse::<Protocol>()?,
            None => Protocol::default(),
        };

        let credential = match (
            settings.remove(&Setting::AccountKey),
            settings.remove(&Setting::SharedAccessSignature),
        ) {
            (Some(key), None) => {
                STANDARD.decode(&key).context(InvalidAccountKeySnafu)?;
                Credential::AccountKey(SecretString::new(key))
            }
            (None, Some(sas)) => Credential::SharedAccessSignature(SecretString::new(
                sas.trim_start_matches('?').to_string(),
            )),
            (Some(_), Some(_)) => return ConflictingCredentialsSnafu.fail(),
            (None, None) => return MissingCredentialsSnafu.fail(),
        };

        let endpoint = match settings.remove(&Setting::BlobEndpoint) {
            Some(endpoint) => endpoint,
            None => {
                let suffix = settings
                    .remove(&Setting::EndpointSuffix)
                    .unwrap_or_else(|| DEFAULT_ENDPOINT_SUFFIX.to_string());
                format!("{protocol}://{account_name}.blob.{suffix}")
            }
        };
        let blob_endpoint =
            Url::parse(&endpoint).context(InvalidEndpointSnafu { endpoint: &endpoint })?;

        Ok(Self {
            account_name,
            blob_endpoint,
            credential,
        })
    }

    fn development_storage() -> Result<Self, ConfigurationError> {
        Ok(Self {
            account_name: DEVELOPMENT_STORAGE_ACCOUNT.to_string(),
            blob_endpoint: Url::parse(DEVELOPMENT_BLOB_ENDPOINT).context(InvalidEndpointSnafu {
                endpoint: DEVELOPMENT_BLOB_ENDPOINT,
            })?,
            credential: Credential::DevelopmentStorage,
        })
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn blob_endpoint(&self) -> &Url {
        &self.blob_endpoint
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn is_development_storage(&self) -> bool {
        matches!(self.credential, Credential::DevelopmentStorage)
    }

    /// Build a client for the named container.
    ///
    /// This is local construction only: no request is made and the container
    /// is not checked for existence.
    pub fn container(&self, name: &str) -> Result<Arc<DynObjectStore>, ConfigurationError> {
        ensure!(!name.trim().is_empty(), EmptyContainerNameSnafu);

        info!(
            account = %self.account_name,
            container = name,
            endpoint = %self.blob_endpoint,
            object_store_type = "Azure",
            "Object Store"
        );

        let builder = MicrosoftAzureBuilder::new().with_container_name(name);
        let builder = match &self.credential {
            Credential::DevelopmentStorage => builder.with_use_emulator(true),
            Credential::AccountKey(key) => self
                .with_account_endpoint(builder)
                .with_access_key(key.expose_secret()),
            Credential::SharedAccessSignature(sas) => self
                .with_account_endpoint(builder)
                .with_config(AzureConfigKey::SasKey, sas.expose_secret()),
        };

        Ok(Arc::new(builder.build().context(InvalidAzureConfigSnafu)?))
    }

    fn with_account_endpoint(&self, builder: MicrosoftAzureBuilder) -> MicrosoftAzureBuilder {
        builder
            .with_account(&self.account_name)
            .with_endpoint(self.blob_endpoint.as_str().trim_end_matches('/').to_string())
            .with_allow_http(self.blob_endpoint.scheme() == "http")
    }
}
