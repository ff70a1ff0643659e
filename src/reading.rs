//! Validated sensor readings
//!
//! A [`SensorReading`] only ever exists after every field has passed its
//! physical range check; out-of-range telegrams are rejected whole. The
//! checks run in a fixed order and stop at the first violation.

use std::ops::RangeInclusive;

use thiserror::Error;

use crate::telegram::TelegramFields;

/// Source id used when a telegram omits the optional `id` field.
pub const UNKNOWN_SOURCE: &str = "UNKNOWN";

/// Physical temperature bounds in °C (sensor operating range).
pub const TEMPERATURE_RANGE_C: RangeInclusive<f32> = -40.0..=85.0;
/// Relative humidity bounds in %.
pub const HUMIDITY_RANGE_PCT: RangeInclusive<f32> = 0.0..=100.0;
/// Equivalent CO₂ bounds in ppm.
pub const ECO2_RANGE_PPM: RangeInclusive<i32> = 0..=5000;
/// Total VOC bounds in ppb.
pub const TVOC_RANGE_PPB: RangeInclusive<i32> = 0..=1000;

/// A decoded field fell outside its physical range.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("temperature {0} °C outside expected range -40.0 to 85.0")]
    Temperature(f32),
    #[error("humidity {0} % outside expected range 0.0 to 100.0")]
    Humidity(f32),
    #[error("eCO2 {0} ppm outside expected range 0 to 5000")]
    Gas(i32),
    #[error("TVOC {0} ppb outside expected range 0 to 1000")]
    Tvoc(i32),
}

/// One validated environmental sample from a sensor node.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Identifier of the originating node, `"UNKNOWN"` if absent.
    pub source_id: String,
    /// Temperature in °C.
    pub temperature_c: f32,
    /// Relative humidity in %.
    pub humidity_pct: f32,
    /// Equivalent CO₂ in ppm.
    pub equivalent_co2_ppm: u16,
    /// Total volatile organic compounds in ppb.
    pub total_voc_ppb: u16,
}

/// Range-check decoded fields and promote them to a [`SensorReading`].
///
/// Checks temperature, humidity, gas, tvoc in that order and returns on
/// the first violation; a failing telegram is discarded whole, never
/// partially published.
pub fn validate(fields: TelegramFields) -> Result<SensorReading, ValidationError> {
    if !TEMPERATURE_RANGE_C.contains(&fields.temp) {
        return Err(ValidationError::Temperature(fields.temp));
    }
    if !HUMIDITY_RANGE_PCT.contains(&fields.hum) {
        return Err(ValidationError::Humidity(fields.hum));
    }
    if !ECO2_RANGE_PPM.contains(&fields.gas) {
        return Err(ValidationError::Gas(fields.gas));
    }
    if !TVOC_RANGE_PPB.contains(&fields.tvoc) {
        return Err(ValidationError::Tvoc(fields.tvoc));
    }

    Ok(SensorReading {
        source_id: fields.id.unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
        temperature_c: fields.temp,
        humidity_pct: fields.hum,
        equivalent_co2_ppm: fields.gas as u16,
        total_voc_ppb: fields.tvoc as u16,
    })
}
