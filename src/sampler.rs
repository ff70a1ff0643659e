//! Sender-side sampling loop
//!
//! The remote node half of the link: sample the environment on a fixed
//! cadence, encode a telegram, transmit it fire-and-forget. When a sensor
//! has no fresh data the previous good values are reused, so a flaky gas
//! sensor degrades the readings rather than silencing the node.

#![allow(async_fn_in_trait)]

use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::link::{Clock, RadioChannel};
use crate::reading::SensorReading;
use crate::telegram;

/// Default transmit cadence for the sensor node.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// One sampling pass over the node's sensors. Either half may be absent
/// when that sensor had nothing fresh to report.
#[derive(Debug, Clone, Default)]
pub struct SampleUpdate {
    /// Temperature (°C) and humidity (%) from the climate sensor.
    pub climate: Option<(f32, f32)>,
    /// Equivalent CO₂ (ppm) and TVOC (ppb) from the gas sensor.
    pub air_quality: Option<(u16, u16)>,
}

/// Environmental sensor hardware behind a trait so the loop is testable
/// off-device.
pub trait SensorSource {
    async fn sample(&mut self) -> SampleUpdate;
}

/// Periodic encode-and-transmit loop for the sensor node.
pub struct Sampler<S, R, C> {
    source: S,
    radio: R,
    clock: C,
    node_id: String,
    interval: Duration,
    temperature_c: f32,
    humidity_pct: f32,
    equivalent_co2_ppm: u16,
    total_voc_ppb: u16,
}

impl<S, R, C> Sampler<S, R, C>
where
    S: SensorSource,
    R: RadioChannel,
    C: Clock,
{
    pub fn new(source: S, radio: R, clock: C, node_id: String, interval: Duration) -> Self {
        Self {
            source,
            radio,
            clock,
            node_id,
            interval,
            temperature_c: 0.0,
            humidity_pct: 0.0,
            equivalent_co2_ppm: 0,
            total_voc_ppb: 0,
        }
    }

    /// One sampling turn: read sensors, fold fresh values over the last
    /// good ones, encode and transmit. Returns the telegram that went out.
    pub async fn sample_and_transmit(&mut self) -> Result<String> {
        let update = self.source.sample().await;

        match update.climate {
            Some((temp, hum)) => {
                self.temperature_c = temp;
                self.humidity_pct = hum;
            }
            None => warn!("climate sensor read failed, reusing last values"),
        }
        match update.air_quality {
            Some((eco2, tvoc)) => {
                self.equivalent_co2_ppm = eco2;
                self.total_voc_ppb = tvoc;
            }
            None => warn!("gas sensor has no fresh data, reusing last values"),
        }

        let reading = SensorReading {
            source_id: self.node_id.clone(),
            temperature_c: self.temperature_c,
            humidity_pct: self.humidity_pct,
            equivalent_co2_ppm: self.equivalent_co2_ppm,
            total_voc_ppb: self.total_voc_ppb,
        };
        let payload = telegram::encode(&reading);

        self.radio.begin_transmit().await?;
        self.radio.write_bytes(payload.as_bytes()).await?;
        self.radio.end_transmit().await?;

        info!(telegram = %payload, "telegram transmitted");
        Ok(payload)
    }

    /// Run the sampling loop forever. Transmit failures are logged and
    /// the cadence continues; telegrams are at-most-once by design.
    pub async fn run(mut self) -> Result<()> {
        loop {
            if let Err(e) = self.sample_and_transmit().await {
                warn!(error = %e, "transmit failed, skipping this cycle");
            }
            self.clock.sleep(self.interval).await;
        }
    }
}
