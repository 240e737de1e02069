use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use crate::model::{ConditionTag, Coordinates, Measurements, Reading, ReadingSource};

use super::{AdapterError, AdapterResult, ProviderId, WeatherProvider, fetch_json};

const DEFAULT_BASE_URL: &str = "http://api.weatherapi.com";

/// Backup source: WeatherAPI.com current conditions.
#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: Option<String>,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key, base_url: DEFAULT_BASE_URL.to_string(), http: Client::new() }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch_current(
        &self,
        api_key: &str,
        coords: Coordinates,
        timeout: Duration,
    ) -> AdapterResult {
        let url = format!("{}/v1/current.json", self.base_url);
        let q = format!("{},{}", coords.lat(), coords.lon());

        let request = self.http.get(url).query(&[("key", api_key), ("q", q.as_str())]);

        let parsed: WaResponse = fetch_json(ProviderId::WeatherApi, request, timeout).await?;
        let current = parsed.current;

        Ok(Reading::new(
            Measurements {
                temperature_c: current.temp_c,
                humidity_pct: current.humidity,
                wind_speed_kph: current.wind_kph,
                precipitation_mm: current.precip_mm,
                pressure_hpa: current.pressure_mb,
            },
            condition_from_code(current.condition.code),
            ReadingSource::Provider(ProviderId::WeatherApi),
            Utc::now(),
        ))
    }
}

/// WeatherAPI condition codes, see https://www.weatherapi.com/docs/weather_conditions.json
fn condition_from_code(code: u16) -> ConditionTag {
    match code {
        1000 => ConditionTag::Clear,
        1003 | 1006 | 1009 => ConditionTag::Cloudy,
        1030 | 1135 | 1147 => ConditionTag::Foggy,
        1087 | 1273 | 1276 | 1279 | 1282 => ConditionTag::Stormy,
        1063..=1264 => ConditionTag::Rainy,
        _ => ConditionTag::Cloudy,
    }
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    code: u16,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    humidity: f64,
    wind_kph: f64,
    #[serde(default)]
    precip_mm: f64,
    pressure_mb: f64,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    current: WaCurrent,
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::WeatherApi
    }

    async fn fetch_reading(&self, coords: Coordinates, timeout: Duration) -> AdapterResult {
        let api_key = self.api_key.as_deref().ok_or(AdapterError::NotConfigured)?;
        self.fetch_current(api_key, coords, timeout).await
    }
}
