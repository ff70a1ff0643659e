//! LoRa modem bridge adapter
//!
//! The gateway host has no SPI bus to the SX127x, so the modem is driven
//! by an external bridge process attached to the serial port. The bridge
//! is spawned with the radio profile on its command line and speaks a
//! line protocol:
//!
//! - stdout, one received frame per line: `RX <rssi> <snr> <payload>`
//! - stdin, one transmission per line: `TX <payload>`
//!
//! A reader task parses stdout into [`RadioFrame`]s and hands them over a
//! single-slot channel, so at most one frame is ever in flight between
//! the bridge and the ingestion loop.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::RadioConfig;
use crate::link::{cap_payload, RadioChannel, RadioFrame};

/// Radio channel backed by the bridge subprocess.
pub struct BridgeRadio {
    _child: Child,
    stdin: ChildStdin,
    frames: mpsc::Receiver<RadioFrame>,
    tx_buf: Vec<u8>,
    _reader: JoinHandle<()>,
}

impl BridgeRadio {
    /// Spawn the bridge process and start parsing its output.
    pub fn spawn(config: &RadioConfig) -> Result<Self> {
        let mut command = Command::new(&config.bridge_command);
        command
            .args(&config.bridge_args)
            .arg("--frequency-mhz")
            .arg(config.frequency_mhz.to_string())
            .arg("--tx-power-dbm")
            .arg(config.tx_power_dbm.to_string())
            .arg("--bandwidth-hz")
            .arg(config.bandwidth_hz.to_string())
            .arg("--spreading-factor")
            .arg(config.spreading_factor.to_string())
            .arg("--coding-rate")
            .arg(config.coding_rate.to_string())
            .arg("--preamble-length")
            .arg(config.preamble_length.to_string())
            .arg("--sync-word")
            .arg(format!("0x{:02X}", config.sync_word))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn().with_context(|| {
            format!("Failed to spawn radio bridge: {}", config.bridge_command)
        })?;
        let stdout = child
            .stdout
            .take()
            .context("Failed to capture radio bridge stdout")?;
        let stdin = child
            .stdin
            .take()
            .context("Failed to capture radio bridge stdin")?;

        // Single-slot hand-off: a frame arriving while the previous one
        // is still unconsumed is dropped, not queued.
        let (tx, rx) = mpsc::channel(1);
        let reader = tokio::spawn(read_bridge_output(BufReader::new(stdout), tx));

        Ok(Self {
            _child: child,
            stdin,
            frames: rx,
            tx_buf: Vec::new(),
            _reader: reader,
        })
    }
}

/// Parse bridge stdout into frames and forward them to the channel.
async fn read_bridge_output(
    mut reader: BufReader<ChildStdout>,
    tx: mpsc::Sender<RadioFrame>,
) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                warn!("radio bridge ended (EOF on stdout)");
                break;
            }
            Ok(_) => {
                if let Some(frame) = parse_bridge_line(&line) {
                    if tx.try_send(frame).is_err() {
                        warn!("previous frame still unconsumed, dropping");
                    }
                } else {
                    debug!(line = %line.trim_end(), "bridge output");
                }
            }
            Err(e) => {
                error!(error = %e, "error reading radio bridge stdout");
                break;
            }
        }
    }
}

/// Parse one `RX <rssi> <snr> <payload>` line from the bridge.
///
/// Lines without the marker or with garbled signal metadata are not
/// frames and are ignored by the caller. The payload is capped at
/// [`crate::link::MAX_PAYLOAD_LEN`] characters on construction, so a
/// runaway bridge line never produces an oversized frame.
fn parse_bridge_line(line: &str) -> Option<RadioFrame> {
    let rest = line.trim_end().strip_prefix("RX ")?;
    let mut parts = rest.splitn(3, ' ');
    let signal_strength = parts.next()?.parse().ok()?;
    let signal_to_noise = parts.next()?.parse().ok()?;
    let payload = cap_payload(parts.next().unwrap_or("")).to_string();
    Some(RadioFrame {
        payload,
        signal_strength,
        signal_to_noise,
    })
}

impl RadioChannel for BridgeRadio {
    fn try_receive_frame(&mut self) -> Option<RadioFrame> {
        self.frames.try_recv().ok()
    }

    async fn begin_transmit(&mut self) -> Result<()> {
        self.tx_buf.clear();
        Ok(())
    }

    async fn write_bytes(&mut self, payload: &[u8]) -> Result<()> {
        self.tx_buf.extend_from_slice(payload);
        Ok(())
    }

    async fn end_transmit(&mut self) -> Result<()> {
        self.stdin
            .write_all(b"TX ")
            .await
            .context("Failed to write to radio bridge stdin")?;
        self.stdin
            .write_all(&self.tx_buf)
            .await
            .context("Failed to write payload to radio bridge")?;
        self.stdin
            .write_all(b"\n")
            .await
            .context("Failed to terminate bridge transmit line")?;
        self.stdin
            .flush()
            .await
            .context("Failed to flush radio bridge stdin")?;
        Ok(())
    }

    fn rearm_receive(&mut self) {
        // The bridge returns the modem to receive mode on its own after
        // reporting a frame; nothing to actuate from here.
    }
}
