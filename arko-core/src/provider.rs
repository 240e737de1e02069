use crate::{
    Config, Coordinates, Reading,
    provider::{
        openmeteo::OpenMeteoProvider, openweather::OpenWeatherProvider,
        weatherapi::WeatherApiProvider,
    },
};
use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{convert::TryFrom, fmt::Debug, sync::Arc, time::Duration};

pub mod openmeteo;
pub mod openweather;
pub mod weatherapi;

/// Known adapters, declared in tie-break priority order (primary first).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenWeather,
    WeatherApi,
    OpenMeteo,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::WeatherApi => "weatherapi",
            ProviderId::OpenMeteo => "openmeteo",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeather, ProviderId::WeatherApi, ProviderId::OpenMeteo]
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderId::OpenMeteo)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweather" => Ok(ProviderId::OpenWeather),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            "openmeteo" => Ok(ProviderId::OpenMeteo),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openweather, weatherapi, openmeteo."
            )),
        }
    }
}

/// Why an adapter could not produce a reading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("request timed out")]
    Timeout,
    #[error("no API key configured")]
    NotConfigured,
}

impl AdapterError {
    /// Short machine-friendly tag used in aggregation warnings.
    pub fn reason(&self) -> &'static str {
        match self {
            AdapterError::Network(_) => "network-error",
            AdapterError::MalformedResponse(_) => "malformed-response",
            AdapterError::Timeout => "timeout",
            AdapterError::NotConfigured => "not-configured",
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else if err.is_decode() {
            AdapterError::MalformedResponse(err.to_string())
        } else {
            AdapterError::Network(err.to_string())
        }
    }
}

pub type AdapterResult = Result<Reading, AdapterError>;

/// One external weather source, normalized to canonical units.
///
/// Implementations never panic or propagate transport errors past
/// `fetch_reading`; every failure is reported as an [`AdapterError`].
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    async fn fetch_reading(&self, coords: Coordinates, timeout: Duration) -> AdapterResult;
}

/// Construct a provider from config. Keyed providers without a key are still
/// built; they report `NotConfigured` when asked for a reading.
pub fn provider_from_config(id: ProviderId, config: &Config) -> Arc<dyn WeatherProvider> {
    let api_key = config.provider_api_key(id).map(str::to_owned);
    let base_url = config.provider_base_url(id);

    match id {
        ProviderId::OpenWeather => {
            let provider = OpenWeatherProvider::new(api_key);
            Arc::new(match base_url {
                Some(url) => provider.with_base_url(url),
                None => provider,
            })
        }
        ProviderId::WeatherApi => {
            let provider = WeatherApiProvider::new(api_key);
            Arc::new(match base_url {
                Some(url) => provider.with_base_url(url),
                None => provider,
            })
        }
        ProviderId::OpenMeteo => {
            let provider = OpenMeteoProvider::new();
            Arc::new(match base_url {
                Some(url) => provider.with_base_url(url),
                None => provider,
            })
        }
    }
}

/// Build one adapter per enabled provider, in priority order.
pub fn enabled_providers(config: &Config) -> Vec<Arc<dyn WeatherProvider>> {
    ProviderId::all()
        .iter()
        .filter(|id| config.is_provider_enabled(**id))
        .map(|id| provider_from_config(*id, config))
        .collect()
}

/// Send a prepared GET and decode its JSON body, mapping every failure onto the
/// adapter taxonomy.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    provider: ProviderId,
    request: RequestBuilder,
    timeout: Duration,
) -> Result<T, AdapterError> {
    if timeout.is_zero() {
        return Err(AdapterError::Timeout);
    }

    let res = request.timeout(timeout).send().await.map_err(AdapterError::from_reqwest)?;

    let status = res.status();
    let body = res.text().await.map_err(AdapterError::from_reqwest)?;

    if !status.is_success() {
        return Err(AdapterError::Network(format!(
            "{provider} request failed with status {status}: {}",
            truncate_body(&body),
        )));
    }

    serde_json::from_str(&body).map_err(|e| {
        AdapterError::MalformedResponse(format!("Failed to parse {provider} JSON: {e}"))
    })
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}
