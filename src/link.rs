//! Collaborator interfaces for the gateway's two network legs and the radio
//!
//! These traits are the seams between the ingestion pipeline and its
//! external collaborators (LoRa modem bridge, link-layer network, MQTT
//! broker, wall clock). The production adapters live in [`crate::radio`]
//! and [`crate::mqtt`]. Tests substitute in-memory fakes and a manually
//! advanced clock, so no test depends on real elapsed time.

// The pipeline is generic over these traits, never dyn, so the future
// types staying unnameable is fine.
#![allow(async_fn_in_trait)]

use std::time::Duration;

use anyhow::Result;

/// Hard cap on an accepted radio payload, in characters. Excess bytes of
/// an oversized frame are discarded silently.
pub const MAX_PAYLOAD_LEN: usize = 256;

/// One received radio transmission: payload plus signal-quality metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct RadioFrame {
    /// Raw text payload as reported by the modem.
    pub payload: String,
    /// Received signal strength in dBm.
    pub signal_strength: i16,
    /// Signal-to-noise ratio in dB.
    pub signal_to_noise: f32,
}

/// Credentials for the link-layer network attachment.
#[derive(Debug, Clone)]
pub struct NetworkCredentials {
    pub ssid: String,
    pub password: String,
}

/// Username/password pair for the broker session. Only attempted when
/// both halves are configured.
#[derive(Debug, Clone)]
pub struct BrokerCredentials {
    pub username: String,
    pub password: String,
}

/// The LoRa radio channel.
pub trait RadioChannel {
    /// Non-blocking poll for a complete received frame.
    fn try_receive_frame(&mut self) -> Option<RadioFrame>;

    /// Open an outgoing transmission.
    async fn begin_transmit(&mut self) -> Result<()>;

    /// Append payload bytes to the open transmission.
    async fn write_bytes(&mut self, payload: &[u8]) -> Result<()>;

    /// Close and send the open transmission.
    async fn end_transmit(&mut self) -> Result<()>;

    /// Return the modem to receive mode after handling a frame.
    fn rearm_receive(&mut self);
}

/// The link-layer network attachment underneath the broker session.
pub trait NetworkLink {
    /// Initiate attachment. Completion is observed via [`is_attached`],
    /// not awaited here.
    ///
    /// [`is_attached`]: NetworkLink::is_attached
    async fn attach(&mut self, credentials: &NetworkCredentials);

    /// Whether the link currently reports itself attached.
    async fn is_attached(&mut self) -> bool;
}

/// The publish/subscribe broker session.
pub trait BrokerLink {
    /// Attempt one session connect. Returns whether the broker accepted.
    async fn connect(
        &mut self,
        client_id: &str,
        credentials: Option<&BrokerCredentials>,
    ) -> bool;

    /// Whether a live session is established.
    fn is_connected(&self) -> bool;

    /// Best-effort publish of one topic/value pair.
    async fn publish(&mut self, topic: &str, payload: &str) -> bool;

    /// Drain inbound messages and service keep-alive obligations.
    async fn service(&mut self);
}

/// Injected time source so interval logic is testable without real
/// elapsed wall-clock time.
pub trait Clock {
    /// Monotonic time elapsed since the clock was created.
    fn now(&self) -> Duration;

    /// Suspend the cooperative loop for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by the tokio timer.
pub struct MonotonicClock {
    start: tokio::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Truncate a received payload to [`MAX_PAYLOAD_LEN`] characters,
/// silently dropping the excess.
pub fn cap_payload(payload: &str) -> &str {
    match payload.char_indices().nth(MAX_PAYLOAD_LEN) {
        Some((idx, _)) => &payload[..idx],
        None => payload,
    }
}
