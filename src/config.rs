//! Configuration for the colonymon gateway
//!
//! Loads configuration from config.toml with environment variable
//! overrides for the two secrets (`WIFI_PASSWORD`, `MQTT_PASSWORD`).

use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::gateway::GatewaySettings;
use crate::link::{BrokerCredentials, NetworkCredentials};

/// Complete gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub broker: BrokerConfig,
    pub gateway: GatewayConfig,
    pub radio: RadioConfig,
}

/// Link-layer network attachment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub ssid: String,
    pub password: String,
    /// Attachment window before the gateway gives up and restarts.
    pub attach_timeout_ms: u64,
    /// Grace delay between a fatal attachment failure and process exit.
    pub restart_grace_ms: u64,
}

/// MQTT broker session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub url: String,
    pub client_id: String,
    /// Topic namespace prefix the five field topics hang off.
    pub namespace: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Minimum spacing between session connect attempts.
    pub retry_interval_ms: u64,
}

/// Orchestrator timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub health_check_interval_ms: u64,
    pub poll_delay_ms: u64,
}

/// Radio profile handed to the modem bridge on spawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    pub bridge_command: String,
    #[serde(default)]
    pub bridge_args: Vec<String>,
    pub frequency_mhz: f64,
    pub tx_power_dbm: i8,
    pub bandwidth_hz: u32,
    pub spreading_factor: u8,
    pub coding_rate: u8,
    pub preamble_length: u16,
    pub sync_word: u8,
}

impl Config {
    /// Load configuration from file.
    ///
    /// Environment variables override config file values:
    /// - WIFI_PASSWORD: network attachment password
    /// - MQTT_PASSWORD: broker session password
    pub fn load(path: &str) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        if let Ok(password) = std::env::var("WIFI_PASSWORD") {
            tracing::info!("Using WIFI_PASSWORD from environment");
            config.network.password = password;
        }
        if let Ok(password) = std::env::var("MQTT_PASSWORD") {
            tracing::info!("Using MQTT_PASSWORD from environment");
            config.broker.password = Some(password);
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if !self.broker.url.starts_with("mqtt://") && !self.broker.url.starts_with("mqtts://") {
            anyhow::bail!(
                "Invalid broker URL: {} (must start with mqtt:// or mqtts://)",
                self.broker.url
            );
        }
        if self.broker.client_id.is_empty() {
            anyhow::bail!("Broker client_id must not be empty");
        }
        if self.broker.namespace.is_empty() || self.broker.namespace.ends_with('/') {
            anyhow::bail!(
                "Invalid topic namespace: {:?} (must be non-empty, no trailing slash)",
                self.broker.namespace
            );
        }
        if self.network.attach_timeout_ms == 0 {
            anyhow::bail!("network.attach_timeout_ms must be greater than 0");
        }
        if self.broker.retry_interval_ms == 0 {
            anyhow::bail!("broker.retry_interval_ms must be greater than 0");
        }
        if self.gateway.health_check_interval_ms == 0 {
            anyhow::bail!("gateway.health_check_interval_ms must be greater than 0");
        }
        if self.radio.bridge_command.is_empty() {
            anyhow::bail!("radio.bridge_command must not be empty");
        }
        if !(6..=12).contains(&self.radio.spreading_factor) {
            anyhow::bail!(
                "Invalid spreading factor: {} (must be 6..=12)",
                self.radio.spreading_factor
            );
        }
        if !(5..=8).contains(&self.radio.coding_rate) {
            anyhow::bail!(
                "Invalid coding rate denominator: {} (must be 5..=8)",
                self.radio.coding_rate
            );
        }

        Ok(())
    }

    pub fn network_credentials(&self) -> NetworkCredentials {
        NetworkCredentials {
            ssid: self.network.ssid.clone(),
            password: self.network.password.clone(),
        }
    }

    /// Broker credentials, only when both username and password are
    /// configured; anonymous sessions otherwise.
    pub fn broker_credentials(&self) -> Option<BrokerCredentials> {
        match (&self.broker.username, &self.broker.password) {
            (Some(username), Some(password)) => Some(BrokerCredentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.network.attach_timeout_ms)
    }

    pub fn restart_grace(&self) -> Duration {
        Duration::from_millis(self.network.restart_grace_ms)
    }

    pub fn broker_retry_interval(&self) -> Duration {
        Duration::from_millis(self.broker.retry_interval_ms)
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            namespace: self.broker.namespace.clone(),
            health_check_interval: Duration::from_millis(self.gateway.health_check_interval_ms),
            poll_delay: Duration::from_millis(self.gateway.poll_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            network: NetworkConfig {
                ssid: "WIFI111D".to_string(),
                password: "secret".to_string(),
                attach_timeout_ms: 30_000,
                restart_grace_ms: 10_000,
            },
            broker: BrokerConfig {
                url: "mqtt://192.168.1.104:1883".to_string(),
                client_id: "LilygoGateway".to_string(),
                namespace: "colonymon".to_string(),
                username: None,
                password: None,
                retry_interval_ms: 5_000,
            },
            gateway: GatewayConfig {
                health_check_interval_ms: 60_000,
                poll_delay_ms: 10,
            },
            radio: RadioConfig {
                bridge_command: "lora-bridge".to_string(),
                bridge_args: vec!["--device".to_string(), "/dev/ttyACM0".to_string()],
                frequency_mhz: 915.0,
                tx_power_dbm: 20,
                bandwidth_hz: 62_500,
                spreading_factor: 12,
                coding_rate: 8,
                preamble_length: 16,
                sync_word: 0xAB,
            },
        }
    }

    #[test]
    fn test_config_validation() {
        let mut c = config();

        // Valid config should pass
        assert!(c.validate().is_ok());

        // Invalid broker URL should fail
        c.broker.url = "invalid://localhost".to_string();
        assert!(c.validate().is_err());
        c.broker.url = "mqtt://localhost:1883".to_string();

        // Empty namespace should fail
        c.broker.namespace = String::new();
        assert!(c.validate().is_err());
        c.broker.namespace = "colonymon/".to_string();
        assert!(c.validate().is_err());
        c.broker.namespace = "colonymon".to_string();

        // Zero intervals should fail
        c.network.attach_timeout_ms = 0;
        assert!(c.validate().is_err());
        c.network.attach_timeout_ms = 30_000;

        c.broker.retry_interval_ms = 0;
        assert!(c.validate().is_err());
        c.broker.retry_interval_ms = 5_000;

        // Out-of-range radio profile should fail
        c.radio.spreading_factor = 13;
        assert!(c.validate().is_err());
        c.radio.spreading_factor = 12;

        c.radio.coding_rate = 4;
        assert!(c.validate().is_err());
    }

    #[test]
    fn broker_credentials_need_both_halves() {
        let mut c = config();
        assert!(c.broker_credentials().is_none());

        c.broker.username = Some("gateway".to_string());
        assert!(c.broker_credentials().is_none());

        c.broker.password = Some("hunter2".to_string());
        let creds = c.broker_credentials().unwrap();
        assert_eq!(creds.username, "gateway");
        assert_eq!(creds.password, "hunter2");
    }

    #[test]
    fn gateway_settings_carry_configured_intervals() {
        let settings = config().gateway_settings();
        assert_eq!(settings.namespace, "colonymon");
        assert_eq!(settings.health_check_interval, Duration::from_secs(60));
        assert_eq!(settings.poll_delay, Duration::from_millis(10));
    }
}
