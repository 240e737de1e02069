use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::ProviderId;

/// A point on the map, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinates")]
pub struct Coordinates {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct RawCoordinates {
    lat: f64,
    lon: f64,
}

impl TryFrom<RawCoordinates> for Coordinates {
    type Error = InvalidCoordinates;

    fn try_from(raw: RawCoordinates) -> Result<Self, Self::Error> {
        Self::new(raw.lat, raw.lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("Invalid coordinates ({lat}, {lon}): latitude must be within [-90, 90] and longitude within [-180, 180]")]
pub struct InvalidCoordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Result<Self, InvalidCoordinates> {
        let lat_ok = lat.is_finite() && (-90.0..=90.0).contains(&lat);
        let lon_ok = lon.is_finite() && (-180.0..=180.0).contains(&lon);

        if lat_ok && lon_ok {
            Ok(Self { lat, lon })
        } else {
            Err(InvalidCoordinates { lat, lon })
        }
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4},{:.4}", self.lat, self.lon)
    }
}

/// Coarse sky condition shared by every provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionTag {
    Clear,
    Cloudy,
    Rainy,
    Stormy,
    Foggy,
}

impl ConditionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionTag::Clear => "clear",
            ConditionTag::Cloudy => "cloudy",
            ConditionTag::Rainy => "rainy",
            ConditionTag::Stormy => "stormy",
            ConditionTag::Foggy => "foggy",
        }
    }
}

impl std::fmt::Display for ConditionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who produced a [`Reading`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingSource {
    Provider(ProviderId),
    /// Merged from several provider readings.
    Consensus,
    /// Synthesized because no provider answered.
    Simulated,
}

impl std::fmt::Display for ReadingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadingSource::Provider(id) => write!(f, "{id}"),
            ReadingSource::Consensus => f.write_str("consensus"),
            ReadingSource::Simulated => f.write_str("simulated"),
        }
    }
}

/// Raw numeric values in canonical units, before clamping into a [`Reading`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurements {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub wind_speed_kph: f64,
    pub precipitation_mm: f64,
    pub pressure_hpa: f64,
}

/// One observation. Immutable once built; values are already in canonical units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawReading")]
pub struct Reading {
    temperature_c: f64,
    humidity_pct: u8,
    wind_speed_kph: f64,
    precipitation_mm: f64,
    pressure_hpa: i32,
    condition: ConditionTag,
    source: ReadingSource,
    observed_at: DateTime<Utc>,
}

/// Wire shape of a [`Reading`]; decoded values go through [`Reading::new`].
#[derive(Deserialize)]
struct RawReading {
    temperature_c: f64,
    humidity_pct: f64,
    wind_speed_kph: f64,
    precipitation_mm: f64,
    pressure_hpa: f64,
    condition: ConditionTag,
    source: ReadingSource,
    observed_at: DateTime<Utc>,
}

impl From<RawReading> for Reading {
    fn from(raw: RawReading) -> Self {
        Reading::new(
            Measurements {
                temperature_c: raw.temperature_c,
                humidity_pct: raw.humidity_pct,
                wind_speed_kph: raw.wind_speed_kph,
                precipitation_mm: raw.precipitation_mm,
                pressure_hpa: raw.pressure_hpa,
            },
            raw.condition,
            raw.source,
            raw.observed_at,
        )
    }
}

impl Reading {
    /// Humidity is rounded and clamped to 0–100, pressure rounded, and wind and
    /// precipitation floored at zero.
    pub fn new(
        values: Measurements,
        condition: ConditionTag,
        source: ReadingSource,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            temperature_c: values.temperature_c,
            humidity_pct: values.humidity_pct.round().clamp(0.0, 100.0) as u8,
            wind_speed_kph: values.wind_speed_kph.max(0.0),
            precipitation_mm: values.precipitation_mm.max(0.0),
            pressure_hpa: values.pressure_hpa.round() as i32,
            condition,
            source,
            observed_at,
        }
    }

    pub fn temperature_c(&self) -> f64 {
        self.temperature_c
    }

    pub fn humidity_pct(&self) -> u8 {
        self.humidity_pct
    }

    pub fn wind_speed_kph(&self) -> f64 {
        self.wind_speed_kph
    }

    pub fn precipitation_mm(&self) -> f64 {
        self.precipitation_mm
    }

    pub fn pressure_hpa(&self) -> i32 {
        self.pressure_hpa
    }

    pub fn condition(&self) -> ConditionTag {
        self.condition
    }

    pub fn source(&self) -> ReadingSource {
        self.source
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub fn measurements(&self) -> Measurements {
        Measurements {
            temperature_c: self.temperature_c,
            humidity_pct: f64::from(self.humidity_pct),
            wind_speed_kph: self.wind_speed_kph,
            precipitation_mm: self.precipitation_mm,
            pressure_hpa: f64::from(self.pressure_hpa),
        }
    }
}

/// Result of one aggregation call. Built fresh every call and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedWeather {
    pub reading: Reading,
    /// Every known provider, `true` if it contributed to `reading`.
    pub sources: BTreeMap<ProviderId, bool>,
    /// 0–100.
    pub confidence: u8,
    pub warnings: Vec<String>,
}

impl AggregatedWeather {
    pub fn is_simulated(&self) -> bool {
        self.reading.source() == ReadingSource::Simulated
    }

    pub fn contributing_sources(&self) -> impl Iterator<Item = ProviderId> + '_ {
        self.sources.iter().filter(|&(_, &ok)| ok).map(|(id, _)| *id)
    }
}
