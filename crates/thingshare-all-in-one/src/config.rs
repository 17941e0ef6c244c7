use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Broker the consumer-facing observation topics are published to
    #[serde(default = "default_consumer_mqtt_url")]
    pub consumer_mqtt_url: String,

    /// Delay between reconciliation ticks of one provisioning batch, seconds
    #[serde(default = "default_batch_retry_delay_secs")]
    pub batch_retry_delay_secs: u64,

    /// Retry budget granted to each provisioning batch
    #[serde(default = "default_batch_retries")]
    pub batch_retries: u32,

    /// Optional startup load: name of the provisioning batch
    #[serde(default = "default_load_name")]
    pub load_name: String,

    /// Optional startup load: SensorThings endpoint to provision against
    #[serde(default)]
    pub load_target_url: String,

    /// Optional startup load: entity files (comma-separated)
    #[serde(default)]
    pub load_files: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_consumer_mqtt_url() -> String {
    "mqtt://thingshare-mqtt:1883".to_string()
}

fn default_batch_retry_delay_secs() -> u64 {
    30
}

fn default_batch_retries() -> u32 {
    5
}

fn default_load_name() -> String {
    "startup-load".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("THINGSHARE"))
            .build()?
            .try_deserialize()
    }

    /// Startup load files, when configured.
    pub fn load_file_list(&self) -> Vec<std::path::PathBuf> {
        self.load_files
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(std::path::PathBuf::from)
            .collect()
    }
}
