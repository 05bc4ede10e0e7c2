use camino::Utf8Path;
use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};

pub use zrt::config::{RuntimeConfig, RuntimeServer};

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct BridgeConfig {
    /// Name used for the coordinator device record.
    pub coordinator_name: String,
    /// Fallback reconnect interval for servers that do not set one.
    pub reconnect_interval_secs: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl AppConfig {
    #[must_use]
    pub fn has_servers(&self) -> bool {
        !self.runtime.servers.is_empty()
    }
}

pub fn parse(filename: &Utf8Path) -> Result<AppConfig, ConfigError> {
    let settings = Config::builder()
        .set_default("bridge.coordinator_name", "Zigbee Coordinator")?
        .set_default("bridge.reconnect_interval_secs", 10)?
        .add_source(config::File::with_name(filename.as_str()))
        .build()?;

    settings.try_deserialize()
}
