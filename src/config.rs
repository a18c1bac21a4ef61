//! Bridge configuration
//!
//! Loaded from a TOML file. Broker credentials are never stored in the file;
//! the config names environment variables that are resolved at connect time.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Broker name reserved for messages that do not come from a configured broker
pub const RESERVED_BROKER_NAME: &str = "internal";

/// Main bridge configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub publisher: PublisherSection,
    #[serde(default)]
    pub brokers: Vec<BrokerSection>,
}

/// Application meta settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppSection {
    /// "production" or "dev"
    #[serde(default = "default_app_env")]
    pub env: String,
    /// Seed the data store at startup (development only)
    #[serde(default)]
    pub prepare_data: bool,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            env: default_app_env(),
            prepare_data: false,
        }
    }
}

fn default_app_env() -> String {
    "production".to_string()
}

/// HTTP API listener
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_server_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageDriver {
    Memory,
    File,
}

/// Storage section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSection {
    #[serde(default = "default_storage_driver")]
    pub driver: StorageDriver,
    /// Path of the JSON document used by the file driver
    #[serde(default = "default_storage_file")]
    pub file: String,
    /// How often the file driver reloads the document from disk
    #[serde(default = "default_reload_interval")]
    pub reload_interval_secs: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            driver: default_storage_driver(),
            file: default_storage_file(),
            reload_interval_secs: default_reload_interval(),
        }
    }
}

fn default_storage_driver() -> StorageDriver {
    StorageDriver::Memory
}

fn default_storage_file() -> String {
    "storage.json".to_string()
}

fn default_reload_interval() -> u64 {
    5
}

impl StorageSection {
    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs.max(1))
    }
}

/// Webhook publisher worker pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublisherSection {
    /// Number of concurrent dispatch workers (default: 10)
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Capacity of the job queue before `publish` applies back-pressure (default: 100)
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Optional per-request timeout. Unset means the HTTP client default (no timeout).
    pub request_timeout_ms: Option<u64>,
}

impl Default for PublisherSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_size: default_queue_size(),
            request_timeout_ms: None,
        }
    }
}

fn default_workers() -> usize {
    10
}

fn default_queue_size() -> usize {
    100
}

impl PublisherSection {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// External MQTT broker the bridge listens on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Name used as the client identity of messages received from this broker
    pub name: String,
    /// MQTT broker URL with protocol and port
    pub broker_url: String,
    /// Client ID presented to the broker (default: `mqtt-http-bridge-{name}`)
    pub client_id: Option<String>,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Topic filters to subscribe to
    #[serde(default)]
    pub topics: Vec<String>,
}

impl BrokerSection {
    pub fn client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("mqtt-http-bridge-{}", self.name))
    }

    /// Get MQTT username from environment variable
    pub fn username(&self) -> Option<String> {
        BridgeConfig::get_env_var_optional(self.username_env.as_ref())
    }

    /// Get MQTT password from environment variable
    pub fn password(&self) -> Option<String> {
        BridgeConfig::get_env_var_optional(self.password_env.as_ref())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid broker configuration: {0}")]
    InvalidBroker(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Load configuration from TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.driver == StorageDriver::File && self.storage.file.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "file storage driver requires [storage] file".to_string(),
            ));
        }

        if self.publisher.workers == 0 {
            return Err(ConfigError::InvalidConfig(
                "publisher.workers must be greater than 0".to_string(),
            ));
        }

        if self.publisher.queue_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "publisher.queue_size must be greater than 0".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for broker in &self.brokers {
            validate_broker(broker)?;

            if !names.insert(broker.name.as_str()) {
                return Err(ConfigError::InvalidBroker(format!(
                    "broker name '{}' is used more than once",
                    broker.name
                )));
            }
        }

        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.app.env == "dev"
    }

    /// Helper method to get environment variable with consistent error handling
    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r##"
[storage]
driver = "memory"

[publisher]
workers = 2
queue_size = 10

[[brokers]]
name = "main"
broker_url = "mqtt://localhost:1883"
topics = ["#"]
"##;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

fn validate_broker(broker: &BrokerSection) -> Result<(), ConfigError> {
    if broker.name.trim().is_empty() {
        return Err(ConfigError::InvalidBroker(
            "broker name cannot be blank".to_string(),
        ));
    }

    if broker.name == RESERVED_BROKER_NAME {
        return Err(ConfigError::InvalidBroker(format!(
            "the name {RESERVED_BROKER_NAME} cannot be used for an external broker"
        )));
    }

    let url = Url::parse(&broker.broker_url).map_err(|_| {
        ConfigError::InvalidBroker(format!(
            "broker '{}' has an invalid URL: {}",
            broker.name, broker.broker_url
        ))
    })?;

    if !matches!(url.scheme(), "mqtt" | "mqtts") {
        return Err(ConfigError::InvalidBroker(format!(
            "broker '{}' must use mqtt:// or mqtts://",
            broker.name
        )));
    }

    if broker.topics.is_empty() {
        return Err(ConfigError::InvalidBroker(format!(
            "broker '{}' does not subscribe to any topic",
            broker.name
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[app]
env = "dev"
prepare_data = true

[server]
bind_address = "127.0.0.1"
port = 9090

[storage]
driver = "file"
file = "/tmp/bridge.json"
reload_interval_secs = 10

[publisher]
workers = 4
queue_size = 50
request_timeout_ms = 2500

[[brokers]]
name = "home"
broker_url = "mqtt://broker.local:1883"
client_id = "bridge-home"
username_env = "MQTT_USERNAME"
password_env = "MQTT_PASSWORD"
topics = ["zigbee2mqtt/#", "sensors/+/state"]
"#;

        let config = BridgeConfig::from_toml(toml_content).unwrap();
        assert!(config.is_development());
        assert!(config.app.prepare_data);
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.storage.driver, StorageDriver::File);
        assert_eq!(config.storage.reload_interval(), Duration::from_secs(10));
        assert_eq!(config.publisher.workers, 4);
        assert_eq!(
            config.publisher.request_timeout(),
            Some(Duration::from_millis(2500))
        );
        assert_eq!(config.brokers.len(), 1);
        assert_eq!(config.brokers[0].client_id(), "bridge-home");
        assert_eq!(config.brokers[0].topics.len(), 2);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = BridgeConfig::from_toml("").unwrap();
        assert_eq!(config.app.env, "production");
        assert!(!config.is_development());
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.driver, StorageDriver::Memory);
        assert_eq!(config.publisher.workers, 10);
        assert_eq!(config.publisher.queue_size, 100);
        assert_eq!(config.publisher.request_timeout(), None);
        assert!(config.brokers.is_empty());
    }

    #[test]
    fn test_default_client_id() {
        let config = BridgeConfig::test_config();
        assert_eq!(config.brokers[0].client_id(), "mqtt-http-bridge-main");
    }

    #[test]
    fn test_unknown_storage_driver_rejected() {
        let result = BridgeConfig::from_toml("[storage]\ndriver = \"redis\"\n");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_reserved_broker_name_rejected() {
        let toml_content = r##"
[[brokers]]
name = "internal"
broker_url = "mqtt://localhost:1883"
topics = ["#"]
"##;
        let result = BridgeConfig::from_toml(toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidBroker(_))));
    }

    #[test]
    fn test_duplicate_broker_names_rejected() {
        let toml_content = r##"
[[brokers]]
name = "a"
broker_url = "mqtt://localhost:1883"
topics = ["#"]

[[brokers]]
name = "a"
broker_url = "mqtt://localhost:1884"
topics = ["#"]
"##;
        let result = BridgeConfig::from_toml(toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidBroker(_))));
    }

    #[test]
    fn test_broker_without_topics_rejected() {
        let toml_content = r#"
[[brokers]]
name = "a"
broker_url = "mqtt://localhost:1883"
"#;
        assert!(BridgeConfig::from_toml(toml_content).is_err());
    }

    #[test]
    fn test_broker_with_http_url_rejected() {
        let toml_content = r##"
[[brokers]]
name = "a"
broker_url = "http://localhost:1883"
topics = ["#"]
"##;
        assert!(BridgeConfig::from_toml(toml_content).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = BridgeConfig::from_toml("[publisher]\nworkers = 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_storage_file_rejected_for_file_driver() {
        let result = BridgeConfig::from_toml("[storage]\ndriver = \"file\"\nfile = \" \"\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_credentials_resolved_from_environment() {
        std::env::set_var("BRIDGE_TEST_MQTT_USER", "alice");
        let broker = BrokerSection {
            name: "a".to_string(),
            broker_url: "mqtt://localhost:1883".to_string(),
            client_id: None,
            username_env: Some("BRIDGE_TEST_MQTT_USER".to_string()),
            password_env: Some("BRIDGE_TEST_MQTT_PASS_UNSET".to_string()),
            topics: vec!["#".to_string()],
        };

        assert_eq!(broker.username().as_deref(), Some("alice"));
        assert_eq!(broker.password(), None);
    }
}
