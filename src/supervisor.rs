//! Connection supervision for the gateway's two network legs
//!
//! The network attachment and the broker session fail independently and
//! recover differently. Losing the broker is routine and retried on a
//! throttle. Losing the network makes the gateway useless, so attachment
//! gets one bounded window and the process restarts if it closes without
//! success.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::link::{BrokerCredentials, BrokerLink, Clock, NetworkCredentials, NetworkLink};

/// Interval between attachment polls while waiting for the network.
pub const ATTACH_POLL_INCREMENT: Duration = Duration::from_millis(500);

/// Connection-level failure.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Network attachment did not complete within the configured window.
    /// Fatal: the caller restarts the whole gateway.
    #[error("network attachment not achieved within {0:?}")]
    AttachTimeout(Duration),
}

/// Retry bookkeeping for one supervised connection.
///
/// Attempts are never issued more frequently than `min_retry_interval`
/// after the previous attempt, whether or not that attempt succeeded.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    is_connected: bool,
    last_attempt: Option<Duration>,
    min_retry_interval: Duration,
}

impl ConnectionState {
    pub fn new(min_retry_interval: Duration) -> Self {
        Self {
            is_connected: false,
            last_attempt: None,
            min_retry_interval,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.is_connected = connected;
    }

    /// Whether enough time has passed since the last attempt to try again.
    pub fn may_attempt(&self, now: Duration) -> bool {
        match self.last_attempt {
            Some(last) => now.saturating_sub(last) >= self.min_retry_interval,
            None => true,
        }
    }

    pub fn record_attempt(&mut self, now: Duration) {
        self.last_attempt = Some(now);
    }
}

/// Supervises the link-layer network attachment.
///
/// `ensure_attached` blocks the cooperative loop in bounded polling
/// increments up to the attach timeout; a timeout is returned as a fatal
/// [`ConnectionError`] rather than retried here.
pub struct NetworkSupervisor {
    credentials: NetworkCredentials,
    attach_timeout: Duration,
    state: ConnectionState,
}

impl NetworkSupervisor {
    pub fn new(credentials: NetworkCredentials, attach_timeout: Duration) -> Self {
        Self {
            credentials,
            attach_timeout,
            state: ConnectionState::new(ATTACH_POLL_INCREMENT),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Verify the attachment, initiating it if lost, and wait for it to
    /// come up within the timeout window.
    pub async fn ensure_attached<N, C>(
        &mut self,
        link: &mut N,
        clock: &C,
    ) -> Result<(), ConnectionError>
    where
        N: NetworkLink,
        C: Clock,
    {
        if link.is_attached().await {
            self.state.set_connected(true);
            return Ok(());
        }

        info!(ssid = %self.credentials.ssid, "attaching to network");
        self.state.set_connected(false);
        self.state.record_attempt(clock.now());
        link.attach(&self.credentials).await;

        let deadline = clock.now() + self.attach_timeout;
        while clock.now() < deadline {
            clock.sleep(ATTACH_POLL_INCREMENT).await;
            if link.is_attached().await {
                info!("network attached");
                self.state.set_connected(true);
                return Ok(());
            }
        }

        warn!(timeout = ?self.attach_timeout, "network attachment timed out");
        Err(ConnectionError::AttachTimeout(self.attach_timeout))
    }
}

/// Supervises the broker session with throttled reconnect attempts.
pub struct BrokerSupervisor {
    client_id: String,
    credentials: Option<BrokerCredentials>,
    state: ConnectionState,
}

impl BrokerSupervisor {
    pub fn new(
        client_id: String,
        credentials: Option<BrokerCredentials>,
        retry_interval: Duration,
    ) -> Self {
        Self {
            client_id,
            credentials,
            state: ConnectionState::new(retry_interval),
        }
    }

    /// Attempt one throttled reconnect. A call inside the retry interval
    /// is a no-op; otherwise one connect is issued regardless of the
    /// previous attempt's outcome. Returns whether a session is now up.
    pub async fn maybe_reconnect<B, C>(&mut self, broker: &mut B, clock: &C) -> bool
    where
        B: BrokerLink,
        C: Clock,
    {
        let now = clock.now();
        if !self.state.may_attempt(now) {
            return false;
        }
        self.state.record_attempt(now);

        info!(client_id = %self.client_id, "attempting broker connection");
        let connected = broker.connect(&self.client_id, self.credentials.as_ref()).await;
        self.state.set_connected(connected);

        if connected {
            info!("broker session established");
        } else {
            warn!("broker connection failed, retrying later");
        }
        connected
    }
}
