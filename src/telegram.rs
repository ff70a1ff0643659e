//! Telegram codec for the LoRa wire format
//!
//! Telegrams are short text payloads of `key=value` pairs separated by `;`:
//!
//! `id=H001;temp=25.4;hum=60.2;gas=400;tvoc=50`
//!
//! Field order is not significant. `id` is optional; `temp`, `hum`, `gas`
//! and `tvoc` are mandatory. Numeric conversion is deliberately lenient:
//! a garbled substring converts to `0.0`/`0` instead of failing, matching
//! what the sensor nodes in the field already produce. Range checking is
//! the validator's job, not the codec's.

use thiserror::Error;

use crate::reading::SensorReading;

/// Decode failure for a received telegram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// One of the mandatory keys never appears in the payload.
    #[error("required field `{0}` missing from telegram")]
    MissingField(&'static str),
}

/// Decoded but not yet range-validated telegram fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TelegramFields {
    /// Originating node id, if the telegram carried one.
    pub id: Option<String>,
    /// Temperature in °C.
    pub temp: f32,
    /// Relative humidity in %.
    pub hum: f32,
    /// Equivalent CO₂ in ppm. Signed so that a negative wire value
    /// reaches the validator instead of being clamped here.
    pub gas: i32,
    /// Total VOC in ppb.
    pub tvoc: i32,
}

/// Mandatory telegram keys, checked before any extraction.
const REQUIRED_KEYS: [&str; 4] = ["temp", "hum", "gas", "tvoc"];

/// Best-effort string-to-float conversion.
///
/// Returns `0.0` for anything that is not a valid number. This mirrors the
/// sensor firmware's conversion semantics and must not be upgraded to a
/// strict parse, which would change which telegrams the gateway accepts.
pub fn lenient_f32(s: &str) -> f32 {
    s.trim().parse().unwrap_or(0.0)
}

/// Best-effort string-to-integer conversion, `0` on failure.
pub fn lenient_i32(s: &str) -> i32 {
    s.trim().parse().unwrap_or(0)
}

/// Extract the value substring for `key` from the payload.
///
/// Scans for the first `key=` occurrence and takes everything up to the
/// next `;` or end of input, trimmed of surrounding whitespace.
fn extract_value<'a>(payload: &'a str, key: &str) -> Option<&'a str> {
    let marker = format!("{key}=");
    let start = payload.find(&marker)? + marker.len();
    let rest = &payload[start..];
    let end = rest.find(';').unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// Decode a telegram payload into unvalidated fields.
///
/// Fails only on a missing mandatory key; malformed numeric substrings
/// convert leniently and flow on to the validator.
pub fn decode(payload: &str) -> Result<TelegramFields, DecodeError> {
    for key in REQUIRED_KEYS {
        let marker = format!("{key}=");
        if !payload.contains(&marker) {
            return Err(DecodeError::MissingField(key));
        }
    }

    // Presence is established; extraction cannot fail for required keys.
    let temp = lenient_f32(extract_value(payload, "temp").unwrap_or(""));
    let hum = lenient_f32(extract_value(payload, "hum").unwrap_or(""));
    let gas = lenient_i32(extract_value(payload, "gas").unwrap_or(""));
    let tvoc = lenient_i32(extract_value(payload, "tvoc").unwrap_or(""));
    let id = extract_value(payload, "id")
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(TelegramFields {
        id,
        temp,
        hum,
        gas,
        tvoc,
    })
}

/// Encode a reading into the wire telegram, sender side.
///
/// Temperature and humidity carry one decimal place, gas and tvoc are
/// plain integers, no trailing separator.
pub fn encode(reading: &SensorReading) -> String {
    format!(
        "id={};temp={:.1};hum={:.1};gas={};tvoc={}",
        reading.source_id,
        reading.temperature_c,
        reading.humidity_pct,
        reading.equivalent_co2_ppm,
        reading.total_voc_ppb,
    )
}
