use super::error::ConfigurationError;
use super::portfolio::Portfolio;
use crate::providers::alpha_vantage::DEFAULT_BASE_URL;
use anyhow::{Context, Result};
use chrono::TimeDelta;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const API_KEY_ENV: &str = "AV_API_KEY";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AlphaVantageConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub alphavantage: Option<AlphaVantageConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            alphavantage: Some(AlphaVantageConfig {
                base_url: default_base_url(),
                api_key: None,
            }),
        }
    }
}

/// Price cache tuning. Durations are in whole seconds.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries older than this are fetched again.
    pub staleness_secs: u64,
    /// Spacing between outbound quote requests; the free AlphaVantage
    /// tier allows 5 per minute.
    pub fetch_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub persist_interval_secs: u64,
    pub sweep_interval_secs: u64,
    pub file_name: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            staleness_secs: 24 * 60 * 60,
            fetch_interval_secs: 13,
            request_timeout_secs: 5,
            persist_interval_secs: 60,
            sweep_interval_secs: 10 * 60,
            file_name: "price_cache.json".to_string(),
        }
    }
}

fn seconds_delta(secs: u64) -> Option<TimeDelta> {
    i64::try_from(secs).ok().and_then(TimeDelta::try_seconds)
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let positive = [
            ("staleness_secs", self.staleness_secs),
            ("request_timeout_secs", self.request_timeout_secs),
            ("persist_interval_secs", self.persist_interval_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigurationError::InvalidSetting {
                    name,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        let bounded = [
            ("staleness_secs", self.staleness_secs),
            ("fetch_interval_secs", self.fetch_interval_secs),
            ("request_timeout_secs", self.request_timeout_secs),
            ("persist_interval_secs", self.persist_interval_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ];
        for (name, value) in bounded {
            if seconds_delta(value).is_none() {
                return Err(ConfigurationError::InvalidSetting {
                    name,
                    reason: format!("{value} seconds is out of range"),
                });
            }
        }
        if self.file_name.trim().is_empty() {
            return Err(ConfigurationError::InvalidSetting {
                name: "file_name",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Saturates at `TimeDelta::MAX`; `validate` rejects values that would.
    pub fn staleness(&self) -> TimeDelta {
        seconds_delta(self.staleness_secs).unwrap_or(TimeDelta::MAX)
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub portfolios: Vec<Portfolio>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "balancer", "balancer")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("io", "balancer", "balancer")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn cache_file_path(&self) -> Result<PathBuf> {
        Ok(self.default_data_path()?.join(&self.cache.file_name))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.cache.validate()?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn alphavantage_base_url(&self) -> &str {
        self.providers
            .alphavantage
            .as_ref()
            .map_or(DEFAULT_BASE_URL, |p| &p.base_url)
    }

    /// API key from the config file, else from `AV_API_KEY`.
    pub fn api_key(&self) -> Result<String, ConfigurationError> {
        self.api_key_or(std::env::var(API_KEY_ENV).ok())
    }

    fn api_key_or(&self, from_env: Option<String>) -> Result<String, ConfigurationError> {
        self.providers
            .alphavantage
            .as_ref()
            .and_then(|p| p.api_key.clone())
            .or(from_env)
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigurationError::MissingApiKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
portfolios:
  - name: "World"
    reinvest: 500.0
    positions:
      - symbol: "VT"
        isin: "US9220427424"
        shares: 12
        goal_ratio: 0.7
      - symbol: "BND"
        wkn: "A0M8NZ"
        shares: 30
        goal_ratio: 0.3
  - name: "Single"
    positions:
      - symbol: "IBM"
        shares: 1
        goal_ratio: 1.0
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.portfolios.len(), 2);
        let world = &config.portfolios[0];
        assert_eq!(world.name, "World");
        assert_eq!(world.reinvest, 500.0);
        assert_eq!(world.positions[0].symbol, "VT");
        assert_eq!(world.positions[0].isin.as_deref(), Some("US9220427424"));
        assert_eq!(world.positions[1].wkn.as_deref(), Some("A0M8NZ"));
        assert_eq!(world.positions[1].shares, 30);
        assert!(world.validate().is_ok());
        assert_eq!(config.portfolios[1].name, "Single");
        assert_eq!(config.portfolios[1].reinvest, 0.0);

        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(config.cache.staleness(), chrono::Duration::hours(24));
        assert_eq!(config.cache.fetch_interval(), Duration::from_secs(13));
        assert_eq!(config.alphavantage_base_url(), "https://www.alphavantage.co");
    }

    #[test]
    fn test_cache_and_provider_overrides() {
        let yaml_str = r#"
providers:
  alphavantage:
    base_url: "http://example.com/av"
    api_key: "secret"
cache:
  fetch_interval_secs: 0
  persist_interval_secs: 5
data_path: "/tmp/balancer-test"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();

        assert!(config.portfolios.is_empty());
        assert_eq!(config.alphavantage_base_url(), "http://example.com/av");
        assert_eq!(config.api_key_or(Some("env".to_string())).unwrap(), "secret");
        assert_eq!(config.cache.fetch_interval(), Duration::ZERO);
        assert_eq!(config.cache.persist_interval(), Duration::from_secs(5));
        assert_eq!(config.cache.staleness_secs, 24 * 60 * 60);
        assert!(config.cache.validate().is_ok());
        assert_eq!(
            config.cache_file_path().unwrap(),
            PathBuf::from("/tmp/balancer-test/price_cache.json")
        );
    }

    #[test]
    fn test_api_key_falls_back_to_environment() {
        let config: AppConfig = serde_yaml::from_str("portfolios: []").unwrap();

        assert_eq!(config.api_key_or(Some("env".to_string())).unwrap(), "env");
        assert_eq!(
            config.api_key_or(None),
            Err(ConfigurationError::MissingApiKey)
        );
        assert_eq!(
            config.api_key_or(Some("  ".to_string())),
            Err(ConfigurationError::MissingApiKey)
        );
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let cache = CacheConfig {
            persist_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(
            cache.validate(),
            Err(ConfigurationError::InvalidSetting {
                name: "persist_interval_secs",
                reason: "must be greater than zero".to_string()
            })
        );
    }

    #[test]
    fn test_out_of_range_staleness_is_rejected() {
        let cache: CacheConfig =
            serde_yaml::from_str("staleness_secs: 100000000000000000").unwrap();

        assert_eq!(
            cache.validate(),
            Err(ConfigurationError::InvalidSetting {
                name: "staleness_secs",
                reason: "100000000000000000 seconds is out of range".to_string()
            })
        );
        assert_eq!(cache.staleness(), TimeDelta::MAX);

        let largest = CacheConfig {
            staleness_secs: (i64::MAX / 1000) as u64,
            ..Default::default()
        };
        assert!(largest.validate().is_ok());
    }
}
