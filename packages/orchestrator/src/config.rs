//! Process-wide configuration.
//!
//! Read once at startup from an optional TOML file, then overridden by
//! `OSM_QUALITY_*` environment variables; immutable afterwards.

use serde::{Deserialize, Serialize};

use crate::OrchestratorError;

/// Default aggregation service.
pub const DEFAULT_BASE_URL: &str = "https://api.ohsome.org/v1";

/// Default width of the per-feature fan-out.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Runtime configuration for indicator runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the aggregation service.
    pub base_url: String,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Maximum number of features processed concurrently.
    pub concurrency: usize,
    /// Maximum AOI size in km² per feature. `0` disables the check
    /// (embedded use); hosted deployments typically set e.g. `100`.
    pub area_limit_km2: f64,
    /// Log filter passed to the logger at startup, e.g. `info`.
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: concat!("osm-quality/", env!("CARGO_PKG_VERSION")).to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            area_limit_km2: 0.0,
            log_level: None,
        }
    }
}

impl Config {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Config`] when the text is not valid
    /// TOML or contains unknown fields.
    pub fn from_toml(text: &str) -> Result<Self, OrchestratorError> {
        toml::from_str(text).map_err(|e| OrchestratorError::Config {
            message: e.to_string(),
        })
    }

    /// Loads the configuration from an optional TOML file, then applies
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Config`] when the file cannot be
    /// read or parsed, or an override has the wrong shape.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, OrchestratorError> {
        let mut config = match path {
            Some(path) => {
                let text =
                    std::fs::read_to_string(path).map_err(|e| OrchestratorError::Config {
                        message: format!("cannot read {}: {e}", path.display()),
                    })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Applies `OSM_QUALITY_*` environment-variable overrides.
    fn apply_env(&mut self) -> Result<(), OrchestratorError> {
        if let Ok(value) = std::env::var("OSM_QUALITY_BASE_URL") {
            self.base_url = value;
        }
        if let Ok(value) = std::env::var("OSM_QUALITY_USER_AGENT") {
            self.user_agent = value;
        }
        if let Ok(value) = std::env::var("OSM_QUALITY_CONCURRENCY") {
            self.concurrency = value.parse().map_err(|_| OrchestratorError::Config {
                message: format!("OSM_QUALITY_CONCURRENCY is not a number: '{value}'"),
            })?;
        }
        if let Ok(value) = std::env::var("OSM_QUALITY_AREA_LIMIT_KM2") {
            self.area_limit_km2 = value.parse().map_err(|_| OrchestratorError::Config {
                message: format!("OSM_QUALITY_AREA_LIMIT_KM2 is not a number: '{value}'"),
            })?;
        }
        if let Ok(value) = std::env::var("OSM_QUALITY_LOG_LEVEL") {
            self.log_level = Some(value);
        }
        Ok(())
    }
}
