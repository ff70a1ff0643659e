//! LoRa-to-MQTT telemetry gateway for hive environmental monitoring
//!
//! A remote sensor node samples temperature, humidity and air quality
//! and radios a compact text telegram; this gateway validates it and
//! republishes the fields on the message broker.
//!
//! Architecture: radio bridge → frame → telegram codec → validator →
//! MQTT topics, all driven by one cooperative ingestion loop.

pub mod config;
pub mod gateway;
pub mod link;
pub mod mqtt;
pub mod net;
pub mod radio;
pub mod reading;
pub mod sampler;
pub mod supervisor;
pub mod telegram;
