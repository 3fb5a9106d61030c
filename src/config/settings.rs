use ::config::{Config, ConfigError, File};
use serde_derive::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct LoggerConfig {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub database_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TickerConfig {
    pub base_uri: String,
}

/// Token TTLs are issued and enforced by the transport layer; the core only
/// carries them through.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub access_ttl_s: u64,
    pub refresh_ttl_s: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub shutdown_grace_s: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub logger: LoggerConfig,
    pub storage: StorageConfig,
    pub ticker: TickerConfig,
    pub auth: AuthConfig,
    pub scheduler: Option<SchedulerConfig>,
}

impl Settings {
    pub fn new(config_filename: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(config_filename))
            .build()?;
        s.try_deserialize()
    }
}
