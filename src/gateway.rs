//! Ingestion orchestrator
//!
//! One cooperative loop owns the whole pipeline: broker session upkeep,
//! periodic network health check, radio polling, decode → validate →
//! publish. Each turn runs the duties in strict sequence and then yields
//! for a fixed delay, which is the only throttle on loop rate.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::link::{cap_payload, BrokerLink, Clock, NetworkLink, RadioChannel, RadioFrame};
use crate::reading::{self, SensorReading};
use crate::supervisor::{BrokerSupervisor, ConnectionError, NetworkSupervisor};
use crate::telegram;

/// Topic names for the five published fields, derived from one namespace.
#[derive(Debug, Clone)]
pub struct Topics {
    pub id: String,
    pub temperature: String,
    pub humidity: String,
    pub gas: String,
    pub tvoc: String,
}

impl Topics {
    pub fn new(namespace: &str) -> Self {
        Self {
            id: format!("{namespace}/id"),
            temperature: format!("{namespace}/temperature"),
            humidity: format!("{namespace}/humidity"),
            gas: format!("{namespace}/gas"),
            tvoc: format!("{namespace}/tvoc"),
        }
    }
}

/// Orchestrator tuning knobs, all static per run.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Topic namespace prefix, e.g. `colonymon`.
    pub namespace: String,
    /// How often the network attachment is re-verified.
    pub health_check_interval: Duration,
    /// Per-turn yield bounding the loop rate.
    pub poll_delay: Duration,
}

/// The gateway ingestion pipeline.
pub struct Gateway<R, N, B, C> {
    radio: R,
    network: N,
    broker: B,
    clock: C,
    network_sup: NetworkSupervisor,
    broker_sup: BrokerSupervisor,
    topics: Topics,
    health_check_interval: Duration,
    poll_delay: Duration,
    last_health_check: Duration,
}

impl<R, N, B, C> Gateway<R, N, B, C>
where
    R: RadioChannel,
    N: NetworkLink,
    B: BrokerLink,
    C: Clock,
{
    pub fn new(
        radio: R,
        network: N,
        broker: B,
        clock: C,
        network_sup: NetworkSupervisor,
        broker_sup: BrokerSupervisor,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            radio,
            network,
            broker,
            clock,
            network_sup,
            broker_sup,
            topics: Topics::new(&settings.namespace),
            health_check_interval: settings.health_check_interval,
            poll_delay: settings.poll_delay,
            last_health_check: Duration::ZERO,
        }
    }

    /// Attach to the network and run the ingestion loop until a fatal
    /// connection error. Broker and telemetry failures never end the
    /// loop; only losing the network for good does.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        self.network_sup
            .ensure_attached(&mut self.network, &self.clock)
            .await?;
        info!("gateway ingestion loop starting");

        loop {
            self.run_turn().await?;
            self.clock.sleep(self.poll_delay).await;
        }
    }

    /// One scheduling turn of the cooperative loop.
    pub async fn run_turn(&mut self) -> Result<(), ConnectionError> {
        // 1. Throttled broker reconnect when the session is down.
        if !self.broker.is_connected() {
            self.broker_sup
                .maybe_reconnect(&mut self.broker, &self.clock)
                .await;
        }

        // 2. Keep-alive and inbound drain for the broker session.
        self.broker.service().await;

        // 3. Periodic network health check.
        let now = self.clock.now();
        if now.saturating_sub(self.last_health_check) >= self.health_check_interval {
            self.last_health_check = now;
            debug!(
                attached = self.network_sup.is_connected(),
                "running periodic network health check"
            );
            self.network_sup
                .ensure_attached(&mut self.network, &self.clock)
                .await?;
        }

        // 4. Radio poll; the receiver is re-armed no matter how the
        //    frame turns out.
        if let Some(frame) = self.radio.try_receive_frame() {
            self.handle_frame(frame).await;
            self.radio.rearm_receive();
        }

        Ok(())
    }

    async fn handle_frame(&mut self, frame: RadioFrame) {
        let payload = cap_payload(&frame.payload).to_string();
        if payload.is_empty() {
            return;
        }

        info!(
            payload = %payload,
            rssi_dbm = frame.signal_strength,
            snr_db = frame.signal_to_noise,
            "radio frame received"
        );

        let fields = match telegram::decode(&payload) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(error = %e, "malformed telegram discarded");
                return;
            }
        };

        let reading = match reading::validate(fields) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(error = %e, "invalid reading discarded");
                return;
            }
        };

        self.publish_reading(&reading).await;
    }

    /// Publish the five field topics, each best-effort: one failure is
    /// logged and the remaining fields are still attempted.
    async fn publish_reading(&mut self, reading: &SensorReading) {
        let fields = [
            (&self.topics.id, reading.source_id.clone()),
            (
                &self.topics.temperature,
                format!("{:.1}", reading.temperature_c),
            ),
            (&self.topics.humidity, format!("{:.1}", reading.humidity_pct)),
            (&self.topics.gas, reading.equivalent_co2_ppm.to_string()),
            (&self.topics.tvoc, reading.total_voc_ppb.to_string()),
        ];

        for (topic, value) in fields {
            if !self.broker.publish(topic, &value).await {
                warn!(topic = %topic, "publish failed");
            }
        }

        info!(
            source_id = %reading.source_id,
            temperature_c = reading.temperature_c,
            humidity_pct = reading.humidity_pct,
            eco2_ppm = reading.equivalent_co2_ppm,
            tvoc_ppb = reading.total_voc_ppb,
            "reading published"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{BrokerCredentials, NetworkCredentials, MAX_PAYLOAD_LEN};
    use std::cell::Cell;
    use std::collections::VecDeque;

    struct ManualClock {
        now: Cell<Duration>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Cell::new(Duration::ZERO),
            }
        }

        fn advance(&self, d: Duration) {
            self.now.set(self.now.get() + d);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Duration {
            self.now.get()
        }

        async fn sleep(&self, duration: Duration) {
            self.advance(duration);
        }
    }

    #[derive(Default)]
    struct MockRadio {
        frames: VecDeque<RadioFrame>,
        rearms: u32,
    }

    impl MockRadio {
        fn with_frame(payload: &str) -> Self {
            let mut frames = VecDeque::new();
            frames.push_back(RadioFrame {
                payload: payload.to_string(),
                signal_strength: -92,
                signal_to_noise: 7.5,
            });
            Self { frames, rearms: 0 }
        }
    }

    impl RadioChannel for MockRadio {
        fn try_receive_frame(&mut self) -> Option<RadioFrame> {
            self.frames.pop_front()
        }

        async fn begin_transmit(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn write_bytes(&mut self, _: &[u8]) -> anyhow::Result<()> {
            Ok(())
        }

        async fn end_transmit(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn rearm_receive(&mut self) {
            self.rearms += 1;
        }
    }

    struct MockNetwork {
        attached: bool,
        checks: u32,
    }

    impl NetworkLink for MockNetwork {
        async fn attach(&mut self, _: &NetworkCredentials) {
            self.attached = true;
        }

        async fn is_attached(&mut self) -> bool {
            self.checks += 1;
            self.attached
        }
    }

    #[derive(Default)]
    struct MockBroker {
        connected: bool,
        accept_connect: bool,
        connect_calls: u32,
        service_calls: u32,
        published: Vec<(String, String)>,
    }

    impl BrokerLink for MockBroker {
        async fn connect(&mut self, _: &str, _: Option<&BrokerCredentials>) -> bool {
            self.connect_calls += 1;
            self.connected = self.accept_connect;
            self.connected
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn publish(&mut self, topic: &str, payload: &str) -> bool {
            if !self.connected {
                return false;
            }
            self.published.push((topic.to_string(), payload.to_string()));
            true
        }

        async fn service(&mut self) {
            self.service_calls += 1;
        }
    }

    fn gateway(
        radio: MockRadio,
        broker: MockBroker,
    ) -> Gateway<MockRadio, MockNetwork, MockBroker, ManualClock> {
        let network = MockNetwork {
            attached: true,
            checks: 0,
        };
        let network_sup = NetworkSupervisor::new(
            NetworkCredentials {
                ssid: "testnet".to_string(),
                password: "secret".to_string(),
            },
            Duration::from_secs(30),
        );
        let broker_sup =
            BrokerSupervisor::new("gw".to_string(), None, Duration::from_secs(5));
        Gateway::new(
            radio,
            network,
            broker,
            ManualClock::new(),
            network_sup,
            broker_sup,
            GatewaySettings {
                namespace: "colonymon".to_string(),
                health_check_interval: Duration::from_secs(60),
                poll_delay: Duration::from_millis(10),
            },
        )
    }

    #[tokio::test]
    async fn valid_telegram_publishes_five_fields() {
        let radio = MockRadio::with_frame("id=H001;temp=25.4;hum=60.2;gas=400;tvoc=50");
        let broker = MockBroker {
            connected: true,
            ..Default::default()
        };
        let mut gw = gateway(radio, broker);

        gw.run_turn().await.unwrap();

        assert_eq!(
            gw.broker.published,
            vec![
                ("colonymon/id".to_string(), "H001".to_string()),
                ("colonymon/temperature".to_string(), "25.4".to_string()),
                ("colonymon/humidity".to_string(), "60.2".to_string()),
                ("colonymon/gas".to_string(), "400".to_string()),
                ("colonymon/tvoc".to_string(), "50".to_string()),
            ]
        );
        assert_eq!(gw.radio.rearms, 1);
    }

    #[tokio::test]
    async fn out_of_range_telegram_publishes_nothing() {
        let radio = MockRadio::with_frame("temp=999;hum=60.2;gas=400;tvoc=50");
        let broker = MockBroker {
            connected: true,
            ..Default::default()
        };
        let mut gw = gateway(radio, broker);

        gw.run_turn().await.unwrap();

        assert!(gw.broker.published.is_empty());
        assert_eq!(gw.radio.rearms, 1);
    }

    #[tokio::test]
    async fn missing_field_telegram_publishes_nothing() {
        let radio = MockRadio::with_frame("id=H001;temp=25.4;hum=60.2;gas=400");
        let broker = MockBroker {
            connected: true,
            ..Default::default()
        };
        let mut gw = gateway(radio, broker);

        gw.run_turn().await.unwrap();
        assert!(gw.broker.published.is_empty());
    }

    #[tokio::test]
    async fn empty_frame_is_skipped_but_receiver_rearmed() {
        let radio = MockRadio::with_frame("");
        let broker = MockBroker {
            connected: true,
            ..Default::default()
        };
        let mut gw = gateway(radio, broker);

        gw.run_turn().await.unwrap();
        assert!(gw.broker.published.is_empty());
        assert_eq!(gw.radio.rearms, 1);
    }

    #[tokio::test]
    async fn oversized_frame_is_capped_before_decoding() {
        // The telegram sits inside the 256-char cap; padding past it is
        // dropped without affecting the decode.
        let mut payload = "id=H001;temp=25.4;hum=60.2;gas=400;tvoc=50;".to_string();
        payload.push_str(&"x".repeat(MAX_PAYLOAD_LEN));
        let radio = MockRadio::with_frame(&payload);
        let broker = MockBroker {
            connected: true,
            ..Default::default()
        };
        let mut gw = gateway(radio, broker);

        gw.run_turn().await.unwrap();
        assert_eq!(gw.broker.published.len(), 5);
    }

    #[tokio::test]
    async fn oversized_frame_can_lose_required_fields_to_the_cap() {
        // tvoc only appears past the cap, so the truncated telegram is
        // rejected as missing a required field.
        let mut payload = format!("id=H001;{}", "x".repeat(MAX_PAYLOAD_LEN));
        payload.push_str(";temp=25.4;hum=60.2;gas=400;tvoc=50");
        let radio = MockRadio::with_frame(&payload);
        let broker = MockBroker {
            connected: true,
            ..Default::default()
        };
        let mut gw = gateway(radio, broker);

        gw.run_turn().await.unwrap();
        assert!(gw.broker.published.is_empty());
        assert_eq!(gw.radio.rearms, 1);
    }

    #[tokio::test]
    async fn disconnected_broker_triggers_reconnect_and_drops_publishes() {
        let radio = MockRadio::with_frame("id=H001;temp=25.4;hum=60.2;gas=400;tvoc=50");
        let broker = MockBroker {
            connected: false,
            accept_connect: false,
            ..Default::default()
        };
        let mut gw = gateway(radio, broker);

        gw.run_turn().await.unwrap();

        assert_eq!(gw.broker.connect_calls, 1);
        // Publishes were attempted best-effort but the session was down.
        assert!(gw.broker.published.is_empty());
        assert_eq!(gw.radio.rearms, 1);
    }

    #[tokio::test]
    async fn broker_session_is_serviced_every_turn() {
        let broker = MockBroker {
            connected: true,
            ..Default::default()
        };
        let mut gw = gateway(MockRadio::default(), broker);

        gw.run_turn().await.unwrap();
        gw.run_turn().await.unwrap();
        assert_eq!(gw.broker.service_calls, 2);
    }

    #[tokio::test]
    async fn health_check_runs_only_when_interval_elapses() {
        let broker = MockBroker {
            connected: true,
            ..Default::default()
        };
        let mut gw = gateway(MockRadio::default(), broker);

        gw.run_turn().await.unwrap();
        gw.clock.advance(Duration::from_secs(59));
        gw.run_turn().await.unwrap();
        assert_eq!(gw.network.checks, 0);

        gw.clock.advance(Duration::from_secs(1));
        gw.run_turn().await.unwrap();
        assert_eq!(gw.network.checks, 1);

        gw.clock.advance(Duration::from_secs(60));
        gw.run_turn().await.unwrap();
        assert_eq!(gw.network.checks, 2);
    }

    #[tokio::test]
    async fn health_check_updates_supervisor_state() {
        let broker = MockBroker {
            connected: true,
            ..Default::default()
        };
        let mut gw = gateway(MockRadio::default(), broker);
        assert!(!gw.network_sup.is_connected());

        gw.clock.advance(Duration::from_secs(60));
        gw.run_turn().await.unwrap();
        assert!(gw.network_sup.is_connected());
    }
}
