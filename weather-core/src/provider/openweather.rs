use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::{WeatherError, WeatherQuery};

use super::ForecastProvider;

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

/// OpenWeatherMap 5 day / 3 hour forecast endpoint.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            http: Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    fn forecast_url(&self) -> String {
        format!("{}/data/2.5/forecast", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ForecastProvider for OpenWeatherProvider {
    async fn fetch_forecast(&self, query: &WeatherQuery) -> Result<Value, WeatherError> {
        let mut params: Vec<(&str, String)> = match query {
            WeatherQuery::City(name) => vec![("q", name.clone())],
            WeatherQuery::Coordinates { latitude, longitude } => {
                vec![("lat", latitude.to_string()), ("lon", longitude.to_string())]
            }
        };
        params.push(("appid", self.api_key.clone()));
        params.push(("units", "metric".to_string()));

        tracing::debug!(%query, "requesting OpenWeather forecast");

        let res = self
            .http
            .get(self.forecast_url())
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                // The URL carries `appid`.
                let e = e.without_url();
                tracing::warn!(%query, error = %e, "OpenWeather request failed");
                WeatherError::UpstreamUnavailable(format!("request failed: {e}"))
            })?;

        let status = res.status();
        let body = res.text().await.map_err(|e| {
            WeatherError::UpstreamUnavailable(format!(
                "failed to read response body: {}",
                e.without_url()
            ))
        })?;

        if status != StatusCode::OK {
            tracing::warn!(%query, %status, body = %truncate_body(&body), "OpenWeather returned an error");
            return Err(WeatherError::UpstreamUnavailable(format!(
                "status {}: {}",
                status,
                truncate_body(&body)
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| WeatherError::MalformedResponse(format!("invalid JSON body: {e}")))
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenWeatherProvider {
        OpenWeatherProvider::new("TEST_KEY".into()).with_base_url(server.uri())
    }

    #[tokio::test]
    async fn city_query_sends_metric_units_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/forecast"))
            .and(query_param("q", "Fargo"))
            .and(query_param("appid", "TEST_KEY"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "list": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let raw = provider_for(&server)
            .fetch_forecast(&WeatherQuery::city("Fargo"))
            .await
            .unwrap();
        assert_eq!(raw, json!({ "list": [] }));
    }

    #[tokio::test]
    async fn coordinates_query_sends_lat_and_lon() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/forecast"))
            .and(query_param("lat", "46.8772"))
            .and(query_param("lon", "-96.7898"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let query = WeatherQuery::Coordinates { latitude: 46.8772, longitude: -96.7898 };
        let raw = provider_for(&server).fetch_forecast(&query).await.unwrap();
        assert_eq!(raw["ok"], true);
    }

    #[tokio::test]
    async fn non_200_is_upstream_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("city not found"))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .fetch_forecast(&WeatherQuery::city("Nowhere"))
            .await
            .unwrap_err();
        assert!(matches!(err, WeatherError::UpstreamUnavailable(ref m) if m.contains("404")));
    }

    #[tokio::test]
    async fn other_success_codes_are_not_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .fetch_forecast(&WeatherQuery::city("Fargo"))
            .await
            .unwrap_err();
        assert!(matches!(err, WeatherError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .fetch_forecast(&WeatherQuery::city("Fargo"))
            .await
            .unwrap_err();
        assert!(matches!(err, WeatherError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn transport_failure_is_upstream_unavailable_without_key() {
        // Nothing listens on port 1.
        let provider = OpenWeatherProvider::new("SECRET_APPID".into()).with_base_url("http://127.0.0.1:1");

        let err = provider
            .fetch_forecast(&WeatherQuery::city("Fargo"))
            .await
            .unwrap_err();
        match err {
            WeatherError::UpstreamUnavailable(msg) => {
                assert!(msg.starts_with("request failed"));
                assert!(!msg.contains("SECRET_APPID"), "key leaked: {msg}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "é".repeat(300);
        let out = truncate_body(&long);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}
