use std::env;
use std::net::SocketAddr;

use ::config::{ConfigError, Environment, File};
use serde::Deserialize;

use crate::sources::SourceCategory;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Location of the snapshot file.
    pub path: String,
    pub ttl_secs: u64,
    /// When false the snapshot lives in process memory only.
    pub persist: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: ".cache/news.json".into(),
            ttl_secs: 24 * 60 * 60,
            persist: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Upper bound for a single attempt, connect through parse.
    pub timeout_secs: u64,
    /// Attempts made after the first one fails.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 2,
            retry_delay_ms: 1500,
            user_agent: "Mozilla/5.0 (compatible; NewsScraper/1.0)".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub per_feed: usize,
    pub per_category: usize,
    pub max_age_days: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            per_feed: 5,
            per_category: 8,
            max_age_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Six-field cron expression (seconds first).
    pub cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: "0 0 6 * * *".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
    pub fetcher: FetcherConfig,
    pub limits: LimitsConfig,
    pub scheduler: SchedulerConfig,
    /// Replaces the built-in registry when non-empty.
    pub sources: Vec<SourceCategory>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let environment = env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        let config_file = match environment.as_str() {
            "production" => "prod",
            _ => "dev",
        };

        let s = ::config::Config::builder()
            .add_source(File::with_name("config/default.yaml").required(false))
            .add_source(File::with_name(&format!("config/{}.yaml", config_file)).required(false))
            .add_source(File::with_name("config/local.yaml").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
