use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use crate::model::{ConditionTag, Coordinates, Measurements, Reading, ReadingSource};

use super::{AdapterError, AdapterResult, ProviderId, WeatherProvider, fetch_json};

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

/// Primary source: OpenWeather current-conditions endpoint.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: Option<String>,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            http: Client::new(),
        }
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
        let url = format!("{}/data/2.5/weather", self.base_url);

        let request = self.http.get(url).query(&[
            ("lat", coords.lat().to_string()),
            ("lon", coords.lon().to_string()),
            ("appid", api_key.to_string()),
            ("units", "metric".to_string()),
        ]);

        let parsed: OwCurrentResponse =
            fetch_json(ProviderId::OpenWeather, request, timeout).await?;

        let condition = parsed
            .weather
            .first()
            .map(|w| condition_from_code(w.id))
            .unwrap_or(ConditionTag::Clear);

        let precipitation_mm = parsed.rain.and_then(|r| r.one_hour).unwrap_or(0.0)
            + parsed.snow.and_then(|s| s.one_hour).unwrap_or(0.0);

        Ok(Reading::new(
            Measurements {
                temperature_c: parsed.main.temp,
                humidity_pct: parsed.main.humidity,
                // m/s -> km/h
                wind_speed_kph: parsed.wind.speed * 3.6,
                precipitation_mm,
                pressure_hpa: parsed.main.pressure,
            },
            condition,
            ReadingSource::Provider(ProviderId::OpenWeather),
            Utc::now(),
        ))
    }
}

/// Map OpenWeather condition ids (grouped by hundreds) onto our tags.
fn condition_from_code(id: u16) -> ConditionTag {
    match id {
        200..=299 => ConditionTag::Stormy,
        300..=399 | 500..=699 => ConditionTag::Rainy,
        700..=799 => ConditionTag::Foggy,
        800 => ConditionTag::Clear,
        _ => ConditionTag::Cloudy,
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: f64,
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    id: u16,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwVolume {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwWeather>,
    wind: OwWind,
    rain: Option<OwVolume>,
    snow: Option<OwVolume>,
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenWeather
    }

    async fn fetch_reading(&self, coords: Coordinates, timeout: Duration) -> AdapterResult {
        let api_key = self.api_key.as_deref().ok_or(AdapterError::NotConfigured)?;
        self.fetch_current(api_key, coords, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manila() -> Coordinates {
        Coordinates::new(14.5995, 120.9842).unwrap()
    }

    #[test]
    fn condition_codes_map_to_tags() {
        assert_eq!(condition_from_code(211), ConditionTag::Stormy);
        assert_eq!(condition_from_code(301), ConditionTag::Rainy);
        assert_eq!(condition_from_code(502), ConditionTag::Rainy);
        assert_eq!(condition_from_code(741), ConditionTag::Foggy);
        assert_eq!(condition_from_code(800), ConditionTag::Clear);
        assert_eq!(condition_from_code(804), ConditionTag::Cloudy);
    }

    #[tokio::test]
    async fn normalizes_current_weather() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("appid", "KEY"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "Manila",
                "dt": 1_700_000_000,
                "main": { "temp": 30.2, "feels_like": 35.0, "humidity": 78, "pressure": 1007 },
                "weather": [{ "id": 501, "description": "moderate rain" }],
                "wind": { "speed": 5.0 },
                "rain": { "1h": 4.5 }
            })))
            .mount(&mock_server)
            .await;

        let provider =
            OpenWeatherProvider::new(Some("KEY".to_string())).with_base_url(mock_server.uri());
        let before = Utc::now();
        let reading = provider.fetch_reading(manila(), Duration::from_secs(5)).await.unwrap();

        assert_eq!(reading.temperature_c(), 30.2);
        assert_eq!(reading.humidity_pct(), 78);
        assert!((reading.wind_speed_kph() - 18.0).abs() < 1e-9);
        assert_eq!(reading.precipitation_mm(), 4.5);
        assert_eq!(reading.pressure_hpa(), 1007);
        assert_eq!(reading.condition(), ConditionTag::Rainy);
        assert_eq!(reading.source(), ReadingSource::Provider(ProviderId::OpenWeather));
        // call time, not the provider's `dt`
        assert!(reading.observed_at() >= before);
    }

    #[tokio::test]
    async fn missing_rain_block_means_zero_precipitation() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "main": { "temp": 31.0, "humidity": 60, "pressure": 1010 },
                "weather": [{ "id": 800 }],
                "wind": { "speed": 2.0 }
            })))
            .mount(&mock_server)
            .await;

        let provider =
            OpenWeatherProvider::new(Some("KEY".to_string())).with_base_url(mock_server.uri());
        let reading = provider.fetch_reading(manila(), Duration::from_secs(5)).await.unwrap();

        assert_eq!(reading.precipitation_mm(), 0.0);
        assert_eq!(reading.condition(), ConditionTag::Clear);
    }

    #[tokio::test]
    async fn error_status_is_network_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "cod": 401,
                "message": "Invalid API key"
            })))
            .mount(&mock_server)
            .await;

        let provider =
            OpenWeatherProvider::new(Some("BAD".to_string())).with_base_url(mock_server.uri());
        let err = provider.fetch_reading(manila(), Duration::from_secs(5)).await.unwrap_err();

        assert_eq!(err.reason(), "network-error");
        assert!(err.to_string().contains("401"), "should mention status: {err}");
    }

    #[tokio::test]
    async fn garbage_body_is_malformed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let provider =
            OpenWeatherProvider::new(Some("KEY".to_string())).with_base_url(mock_server.uri());
        let err = provider.fetch_reading(manila(), Duration::from_secs(5)).await.unwrap_err();

        assert_eq!(err.reason(), "malformed-response");
    }

    #[tokio::test]
    async fn slow_response_is_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(serde_json::json!({})),
            )
            .mount(&mock_server)
            .await;

        let provider =
            OpenWeatherProvider::new(Some("KEY".to_string())).with_base_url(mock_server.uri());
        let err = provider.fetch_reading(manila(), Duration::from_millis(50)).await.unwrap_err();

        assert_eq!(err, AdapterError::Timeout);
    }

    #[tokio::test]
    async fn without_key_is_not_configured() {
        let provider = OpenWeatherProvider::new(None);
        let err = provider.fetch_reading(manila(), Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err, AdapterError::NotConfigured);
    }
}
