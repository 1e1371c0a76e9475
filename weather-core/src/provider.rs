use crate::{Config, WeatherError, WeatherQuery, provider::openweather::OpenWeatherProvider};
use async_trait::async_trait;
use serde_json::Value;
use std::{convert::TryFrom, fmt::Debug, sync::Arc, time::Duration};

pub mod openweather;

/// External services the backend holds credentials for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceId {
    OpenWeather,
    Gemini,
}

impl ServiceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceId::OpenWeather => "openweather",
            ServiceId::Gemini => "gemini",
        }
    }

    /// Environment variable that overrides the configured API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ServiceId::OpenWeather => "OPENWEATHERMAP_API_KEY",
            ServiceId::Gemini => "GEMINI_API_KEY",
        }
    }

    pub const fn all() -> &'static [ServiceId] {
        &[ServiceId::OpenWeather, ServiceId::Gemini]
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ServiceId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweather" => Ok(ServiceId::OpenWeather),
            "gemini" => Ok(ServiceId::Gemini),
            _ => Err(anyhow::anyhow!(
                "Unknown service '{value}'. Supported services: openweather, gemini."
            )),
        }
    }
}

/// Source of raw forecast payloads.
///
/// Implementations perform exactly one outbound call per invocation and never
/// retry.
#[async_trait]
pub trait ForecastProvider: Send + Sync + Debug {
    async fn fetch_forecast(&self, query: &WeatherQuery) -> Result<Value, WeatherError>;
}

/// Build a shared HTTP client honouring the configured timeout.
pub fn http_client(config: &Config) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))
}

/// Construct the forecast provider from config.
pub fn provider_from_config(
    config: &Config,
    http: reqwest::Client,
) -> anyhow::Result<Arc<dyn ForecastProvider>> {
    let id = ServiceId::OpenWeather;
    let api_key = config.service_api_key(id).ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured for service '{id}'.\n\
                 Hint: run `weather configure {id}` or set {}.",
            id.api_key_env()
        )
    })?;

    let mut provider = OpenWeatherProvider::new(api_key.to_owned()).with_client(http);
    if let Some(url) = config.service_config(id).and_then(|s| s.base_url.as_deref()) {
        provider = provider.with_base_url(url);
    }

    Ok(Arc::new(provider))
}
