//! Client configuration

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser};

use crate::{
    identity::{DEFAULT_NAMESPACE, KeyResolver},
    storage::{
        ConfiguredBackend, FileStorage, MemoryStorage, Persistence, PersistenceError,
        PersistencePolicy,
    },
};

/// Larder client configuration.
#[derive(Debug, Parser)]
#[command(name = "larder", about = "Larder order cart client", long_about = None)]
pub struct ClientConfig {
    /// Order API settings.
    #[command(flatten)]
    pub api: ApiConfig,

    /// Cart storage settings.
    #[command(flatten)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[command(flatten)]
    pub logging: LoggingConfig,
}

impl ClientConfig {
    /// Load configuration from the environment (and `.env`, if present).
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn load() -> Result<Self, clap::Error> {
        // Load .env file if present (ignore if missing)
        _ = dotenvy::dotenv();

        Self::try_parse_from([env!("CARGO_PKG_NAME")])
    }
}

/// Order API settings.
#[derive(Debug, Clone, Args)]
pub struct ApiConfig {
    /// Base URL of the order API
    #[arg(long, env = "LARDER_API_BASE_URL", default_value = "http://localhost:3001")]
    pub api_base_url: String,

    /// Request timeout in seconds
    #[arg(long, env = "LARDER_REQUEST_TIMEOUT_SECONDS", default_value_t = 10_u64)]
    pub request_timeout_seconds: u64,
}

impl ApiConfig {
    /// The base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    /// The request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Cart storage settings.
#[derive(Debug, Clone, Args)]
pub struct StorageConfig {
    /// Namespace prefixed to every cart key
    #[arg(long, env = "LARDER_STORAGE_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub storage_namespace: String,

    /// What to do when cart storage fails (swallow, surface)
    #[arg(
        long,
        env = "LARDER_PERSISTENCE_POLICY",
        value_enum,
        default_value_t = PersistencePolicy::Swallow
    )]
    pub persistence_policy: PersistencePolicy,

    /// Directory for file-backed carts; in-memory storage when unset
    #[arg(long, env = "LARDER_CART_DIR")]
    pub cart_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Open the configured backend: files under `cart_dir`, else memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart directory cannot be created.
    pub fn open_backend(&self) -> Result<ConfiguredBackend, PersistenceError> {
        match &self.cart_dir {
            Some(dir) => FileStorage::open(dir).map(ConfiguredBackend::File),
            None => Ok(ConfiguredBackend::Memory(MemoryStorage::new())),
        }
    }

    /// Open the configured backend behind the configured failure policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart directory cannot be created.
    pub fn persistence(&self) -> Result<Persistence<ConfiguredBackend>, PersistenceError> {
        Ok(Persistence::new(self.open_backend()?, self.persistence_policy))
    }

    /// Key resolver for the configured namespace.
    #[must_use]
    pub fn key_resolver(&self) -> KeyResolver {
        KeyResolver::new(self.storage_namespace.clone())
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Compact, human-readable logs.
    Compact,

    /// Structured JSON logs.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Args)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Log format (compact, json)
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn flags_override_defaults() -> TestResult {
        let config = ClientConfig::try_parse_from([
            "larder",
            "--api-base-url",
            "https://orders.example/",
            "--request-timeout-seconds",
            "3",
            "--storage-namespace",
            "shop",
            "--persistence-policy",
            "surface",
            "--cart-dir",
            "/tmp/carts",
            "--log-format",
            "json",
        ])?;

        assert_eq!(config.api.base_url(), "https://orders.example");
        assert_eq!(config.api.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.storage.storage_namespace, "shop");
        assert_eq!(config.storage.persistence_policy, PersistencePolicy::Surface);
        assert_eq!(config.storage.cart_dir, Some(PathBuf::from("/tmp/carts")));
        assert_eq!(config.logging.log_format, LogFormat::Json);

        Ok(())
    }

    #[test]
    fn cart_dir_selects_file_storage() -> TestResult {
        let dir = tempfile::TempDir::new()?;
        let config = ClientConfig::try_parse_from([
            "larder".into(),
            "--cart-dir".into(),
            dir.path().join("carts").into_os_string(),
        ])?;

        let backend = config.storage.open_backend()?;

        assert!(matches!(backend, ConfiguredBackend::File(_)));
        assert!(dir.path().join("carts").is_dir());

        Ok(())
    }

    #[test]
    fn no_cart_dir_means_memory_storage() -> TestResult {
        let config = ClientConfig::try_parse_from(["larder", "--storage-namespace", "shop"])?;

        assert!(matches!(
            config.storage.open_backend()?,
            ConfiguredBackend::Memory(_)
        ));
        assert_eq!(config.storage.key_resolver().namespace(), "shop");

        Ok(())
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let result = ClientConfig::try_parse_from(["larder", "--persistence-policy", "ignore"]);

        assert!(result.is_err(), "expected an invalid policy to fail parsing");
    }
}
