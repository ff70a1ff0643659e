//! colonymon gateway service
//!
//! This service:
//! - Spawns the LoRa modem bridge as a subprocess and parses its frames
//! - Validates incoming telemetry telegrams from the sensor node
//! - Republishes validated readings onto the MQTT topic set
//! - Supervises the network attachment and the broker session

use anyhow::{Context, Result};
use tracing::{error, info};

use colonymon_gateway::config::Config;
use colonymon_gateway::gateway::Gateway;
use colonymon_gateway::link::MonotonicClock;
use colonymon_gateway::mqtt::{parse_broker_url, MqttBroker};
use colonymon_gateway::net::TcpProbeNetwork;
use colonymon_gateway::radio::BridgeRadio;
use colonymon_gateway::supervisor::{BrokerSupervisor, NetworkSupervisor};

// Single-threaded runtime: the ingestion loop is cooperative and the
// only other task is the bridge stdout reader.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("colonymon gateway starting");

    let config = Config::load("config.toml").context("Failed to load config.toml")?;
    info!("Configuration loaded successfully");

    let (broker_host, broker_port) = parse_broker_url(&config.broker.url)?;
    let network = TcpProbeNetwork::new(format!("{broker_host}:{broker_port}"));
    let broker = MqttBroker::new(&config.broker.url).context("Failed to create MQTT client")?;
    let radio = BridgeRadio::spawn(&config.radio).context("Failed to start radio bridge")?;

    let network_sup =
        NetworkSupervisor::new(config.network_credentials(), config.attach_timeout());
    let broker_sup = BrokerSupervisor::new(
        config.broker.client_id.clone(),
        config.broker_credentials(),
        config.broker_retry_interval(),
    );

    let gateway = Gateway::new(
        radio,
        network,
        broker,
        MonotonicClock::new(),
        network_sup,
        broker_sup,
        config.gateway_settings(),
    );

    info!("Service running. Press Ctrl+C to stop.");
    tokio::select! {
        result = gateway.run() => {
            // The loop only ends on a fatal connection failure. Hold for
            // the grace delay, then exit non-zero so the service manager
            // restarts the gateway.
            match result {
                Ok(()) => Ok(()),
                Err(err) => {
                    error!(error = %err, grace = ?config.restart_grace(), "fatal connection failure");
                    tokio::time::sleep(config.restart_grace()).await;
                    Err(err.into())
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully");
            Ok(())
        }
    }
}
