//! Fan-out over every configured provider and merge the answers into one
//! consensus reading.
//!
//! Aggregation never fails. Partial outages lower the confidence score and
//! add warnings; a total outage yields a simulated reading with confidence 0.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Local, TimeZone};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    model::{AggregatedWeather, ConditionTag, Coordinates, Measurements, Reading, ReadingSource},
    provider::{AdapterError, AdapterResult, ProviderId, WeatherProvider, enabled_providers},
    simulation::simulate_reading,
};

pub const NO_LIVE_SOURCES: &str = "no live sources available";

/// Flat deduction applied once per call when any field disagrees.
const DISAGREEMENT_PENALTY: u8 = 20;

/// Largest tolerated min/max spread per field before sources are considered
/// to disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisagreementThresholds {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub wind_speed_kph: f64,
    pub precipitation_mm: f64,
    pub pressure_hpa: f64,
}

impl Default for DisagreementThresholds {
    fn default() -> Self {
        Self {
            temperature_c: 5.0,
            humidity_pct: 20.0,
            wind_speed_kph: 20.0,
            precipitation_mm: 15.0,
            pressure_hpa: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorSettings {
    /// Shared deadline for every provider in one call.
    pub timeout: Duration,
    pub thresholds: DisagreementThresholds,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(10), thresholds: DisagreementThresholds::default() }
    }
}

struct Field {
    name: &'static str,
    unit: &'static str,
    value: fn(&Measurements) -> f64,
    threshold: fn(&DisagreementThresholds) -> f64,
}

const FIELDS: [Field; 5] = [
    Field {
        name: "temperature",
        unit: "°C",
        value: |m| m.temperature_c,
        threshold: |t| t.temperature_c,
    },
    Field {
        name: "humidity",
        unit: "%",
        value: |m| m.humidity_pct,
        threshold: |t| t.humidity_pct,
    },
    Field {
        name: "wind speed",
        unit: "km/h",
        value: |m| m.wind_speed_kph,
        threshold: |t| t.wind_speed_kph,
    },
    Field {
        name: "precipitation",
        unit: "mm",
        value: |m| m.precipitation_mm,
        threshold: |t| t.precipitation_mm,
    },
    Field {
        name: "pressure",
        unit: "hPa",
        value: |m| m.pressure_hpa,
        threshold: |t| t.pressure_hpa,
    },
];

#[derive(Debug, Default)]
pub struct Aggregator {
    settings: AggregatorSettings,
    /// Kept sorted by provider priority.
    adapters: Vec<Arc<dyn WeatherProvider>>,
}

impl Aggregator {
    pub fn new(settings: AggregatorSettings) -> Self {
        Self { settings, adapters: Vec::new() }
    }

    /// Build an aggregator with one adapter per enabled provider.
    pub fn from_config(config: &Config) -> Self {
        enabled_providers(config)
            .into_iter()
            .fold(Self::new(config.aggregator_settings()), Self::with_adapter)
    }

    /// Register an adapter. A second adapter with the same id replaces the first.
    pub fn with_adapter(mut self, adapter: Arc<dyn WeatherProvider>) -> Self {
        self.adapters.retain(|a| a.id() != adapter.id());
        self.adapters.push(adapter);
        self.adapters.sort_by_key(|a| a.id());
        self
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.settings
    }

    pub fn configured(&self) -> impl Iterator<Item = ProviderId> + '_ {
        self.adapters.iter().map(|a| a.id())
    }

    /// Query every adapter concurrently and merge whatever came back in time.
    pub async fn get_aggregated_weather(&self, coords: Coordinates) -> AggregatedWeather {
        let timeout = self.settings.timeout;

        let calls = self.adapters.iter().map(|adapter| async move {
            let id = adapter.id();
            let outcome =
                match tokio::time::timeout(timeout, adapter.fetch_reading(coords, timeout)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(AdapterError::Timeout),
                };
            (id, outcome)
        });

        let outcomes = join_all(calls).await;
        self.merge(outcomes, &Local::now())
    }

    fn merge<Tz: TimeZone>(
        &self,
        outcomes: Vec<(ProviderId, AdapterResult)>,
        now: &DateTime<Tz>,
    ) -> AggregatedWeather {
        let mut sources: BTreeMap<ProviderId, bool> =
            ProviderId::all().iter().map(|id| (*id, false)).collect();
        let mut successes: Vec<(ProviderId, Reading)> = Vec::new();
        let mut failures: Vec<(ProviderId, AdapterError)> = Vec::new();

        for (id, outcome) in outcomes {
            match outcome {
                Ok(reading) => {
                    tracing::debug!(provider = %id, temperature_c = reading.temperature_c(), "reading received");
                    successes.push((id, reading));
                }
                Err(err) => {
                    tracing::warn!(provider = %id, reason = err.reason(), error = %err, "provider unavailable");
                    failures.push((id, err));
                }
            }
        }

        if successes.is_empty() {
            tracing::info!("no live weather sources answered, falling back to simulation");
            return AggregatedWeather {
                reading: simulate_reading(now),
                sources,
                confidence: 0,
                warnings: vec![NO_LIVE_SOURCES.to_string()],
            };
        }

        successes.sort_by_key(|(id, _)| *id);
        for (id, _) in &successes {
            sources.insert(*id, true);
        }

        let measurements: Vec<Measurements> =
            successes.iter().map(|(_, r)| r.measurements()).collect();

        let mut warnings = disagreements(&measurements, &self.settings.thresholds);
        let mut confidence = base_confidence(successes.len(), self.adapters.len());
        if !warnings.is_empty() {
            confidence = confidence.saturating_sub(DISAGREEMENT_PENALTY);
        }

        failures.sort_by_key(|(id, _)| *id);
        warnings.extend(failures.iter().map(|(id, err)| format!("{id} unavailable: {}", err.reason())));

        let observed_at = successes
            .iter()
            .map(|(_, r)| r.observed_at())
            .max()
            .unwrap_or_else(|| now.with_timezone(&chrono::Utc));

        let reading = Reading::new(
            mean(&measurements),
            consensus_condition(&successes),
            ReadingSource::Consensus,
            observed_at,
        );

        AggregatedWeather { reading, sources, confidence, warnings }
    }
}

fn base_confidence(successes: usize, configured: usize) -> u8 {
    if configured == 0 {
        return 0;
    }
    let pct = (100.0 * successes as f64 / configured as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

fn mean(values: &[Measurements]) -> Measurements {
    let n = values.len().max(1) as f64;
    let avg = |f: fn(&Measurements) -> f64| values.iter().map(f).sum::<f64>() / n;

    Measurements {
        temperature_c: avg(|m| m.temperature_c),
        humidity_pct: avg(|m| m.humidity_pct),
        wind_speed_kph: avg(|m| m.wind_speed_kph),
        precipitation_mm: avg(|m| m.precipitation_mm),
        pressure_hpa: avg(|m| m.pressure_hpa),
    }
}

/// One warning per field whose spread exceeds its threshold.
fn disagreements(values: &[Measurements], thresholds: &DisagreementThresholds) -> Vec<String> {
    FIELDS
        .iter()
        .filter_map(|field| {
            let (min, max) = values.iter().map(field.value).fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), v| (lo.min(v), hi.max(v)),
            );
            let spread = max - min;
            let threshold = (field.threshold)(thresholds);

            (spread > threshold).then(|| {
                format!(
                    "sources disagree on {} by {spread:.1}{unit} (threshold {threshold}{unit})",
                    field.name,
                    unit = field.unit,
                )
            })
        })
        .collect()
}

/// Most frequent tag; ties go to the tag reported by the highest-priority source.
/// `successes` must be sorted by priority.
fn consensus_condition(successes: &[(ProviderId, Reading)]) -> ConditionTag {
    let mut counts: HashMap<ConditionTag, usize> = HashMap::new();
    for (_, reading) in successes {
        *counts.entry(reading.condition()).or_default() += 1;
    }
    let top = counts.values().copied().max().unwrap_or(0);

    successes
        .iter()
        .map(|(_, r)| r.condition())
        .find(|tag| counts.get(tag) == Some(&top))
        .unwrap_or(ConditionTag::Cloudy)
}
