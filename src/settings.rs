//! Unit settings
//!
//! The order store publishes the list of valid unit codes and the default
//! unit applied to cart lines added without one.

use async_trait::async_trait;
use mockall::automock;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::config::ApiConfig;

/// Unit used when the settings provider has nothing better.
pub const FALLBACK_UNIT: &str = "KG";

/// Valid unit codes and the default among them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSettings {
    units: Vec<String>,
    default_unit: String,
}

impl UnitSettings {
    /// Normalise raw settings.
    ///
    /// Units are trimmed, blanks and duplicates dropped. A blank default
    /// falls back to the first unit, then to [`FALLBACK_UNIT`]. The default
    /// is always part of the unit list.
    pub fn new<I, S>(units: I, default_unit: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();

        for unit in units {
            let unit = unit.as_ref().trim();

            if !unit.is_empty() && !normalized.iter().any(|known| known == unit) {
                normalized.push(unit.to_string());
            }
        }

        let default_unit = default_unit
            .map(str::trim)
            .filter(|unit| !unit.is_empty())
            .or_else(|| normalized.first().map(String::as_str))
            .unwrap_or(FALLBACK_UNIT)
            .to_string();

        if !normalized.contains(&default_unit) {
            normalized.insert(0, default_unit.clone());
        }

        Self {
            units: normalized,
            default_unit,
        }
    }

    /// Valid unit codes, in provider order.
    pub fn units(&self) -> &[String] {
        &self.units
    }

    /// Unit applied to lines added without one.
    pub fn default_unit(&self) -> &str {
        &self.default_unit
    }

    /// Whether `unit` is one of the valid codes.
    pub fn contains(&self, unit: &str) -> bool {
        self.units.iter().any(|known| known == unit.trim())
    }
}

impl Default for UnitSettings {
    fn default() -> Self {
        Self::new([FALLBACK_UNIT], None)
    }
}

/// Errors fetching settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// An HTTP transport or serialization error occurred.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider returned a non-2xx response.
    #[error("unexpected response from settings provider: {0}")]
    UnexpectedResponse(String),
}

/// Source of unit settings.
#[automock]
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Fetch the current unit settings.
    async fn unit_settings(&self) -> Result<UnitSettings, SettingsError>;
}

/// Fetch unit settings, falling back to the defaults on failure.
pub async fn fetch_or_default<P: SettingsProvider + ?Sized>(provider: &P) -> UnitSettings {
    match provider.unit_settings().await {
        Ok(settings) => settings,
        Err(error) => {
            warn!(error = %error, "unit settings unavailable; using defaults");
            UnitSettings::default()
        }
    }
}

/// Fixed settings, for tests and offline use.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(UnitSettings);

impl StaticSettings {
    /// Always serve `settings`.
    #[must_use]
    pub fn new(settings: UnitSettings) -> Self {
        Self(settings)
    }
}

#[async_trait]
impl SettingsProvider for StaticSettings {
    async fn unit_settings(&self) -> Result<UnitSettings, SettingsError> {
        Ok(self.0.clone())
    }
}

/// Settings served by the order API at `GET /api/settings`.
#[derive(Debug, Clone)]
pub struct HttpSettingsProvider {
    base_url: String,
    http: Client,
}

impl HttpSettingsProvider {
    /// Create a provider for the configured API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, SettingsError> {
        let http = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            base_url: config.base_url().to_string(),
            http,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SettingsResponse {
    #[serde(default)]
    units: Vec<String>,

    #[serde(default)]
    default_unit: Option<String>,
}

#[async_trait]
impl SettingsProvider for HttpSettingsProvider {
    async fn unit_settings(&self) -> Result<UnitSettings, SettingsError> {
        let url = format!("{}/api/settings", self.base_url);

        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(SettingsError::UnexpectedResponse(format!(
                "settings request failed with status {status}: {text}"
            )));
        }

        let parsed: SettingsResponse = response.json().await?;

        Ok(UnitSettings::new(&parsed.units, parsed.default_unit.as_deref()))
    }
}
