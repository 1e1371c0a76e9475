//! Request-level orchestration: fetch, normalize, record, cache, summarize.

use std::sync::Arc;

use crate::{
    WeatherError,
    cache::LatestWeatherCache,
    config::DEFAULT_SUMMARY_MAX_CHARS,
    model::{NormalizedWeather, WeatherQuery, WeatherRecord},
    normalize::normalize,
    provider::ForecastProvider,
    store::{UpsertOutcome, WeatherStore},
    summary::{TextGenerator, build_prompt, format_summary},
};

/// A fetched snapshot together with what the store did with it.
#[derive(Debug, Clone)]
pub struct Observation {
    pub weather: NormalizedWeather,
    pub outcome: UpsertOutcome,
}

#[derive(Clone)]
pub struct WeatherService {
    provider: Arc<dyn ForecastProvider>,
    store: Arc<dyn WeatherStore>,
    cache: Arc<LatestWeatherCache>,
    generator: Arc<dyn TextGenerator>,
    summary_max_chars: usize,
}

impl WeatherService {
    pub fn new(
        provider: Arc<dyn ForecastProvider>,
        store: Arc<dyn WeatherStore>,
        cache: Arc<LatestWeatherCache>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            provider,
            store,
            cache,
            generator,
            summary_max_chars: DEFAULT_SUMMARY_MAX_CHARS,
        }
    }

    pub fn with_summary_max_chars(mut self, max_chars: usize) -> Self {
        self.summary_max_chars = max_chars;
        self
    }

    pub fn cache(&self) -> &Arc<LatestWeatherCache> {
        &self.cache
    }

    /// Fetch and normalize the forecast for `query`, record it if it changed,
    /// and make it the cached latest snapshot.
    ///
    /// On any error nothing is written and the cache keeps its previous value.
    pub async fn observe(&self, query: &WeatherQuery) -> Result<Observation, WeatherError> {
        let raw = self.provider.fetch_forecast(query).await?;
        let weather = normalize(&raw)?;

        let store = Arc::clone(&self.store);
        let snapshot = weather.clone();
        let outcome = tokio::task::spawn_blocking(move || store.upsert_if_changed(&snapshot))
            .await
            .map_err(|e| WeatherError::Storage(format!("store task failed: {e}")))??;

        self.cache.store(weather.clone());

        Ok(Observation { weather, outcome })
    }

    /// Like [`observe`](Self::observe), returning only the snapshot.
    pub async fn current_weather(&self, query: &WeatherQuery) -> Result<NormalizedWeather, WeatherError> {
        self.observe(query).await.map(|o| o.weather)
    }

    /// Persisted snapshots for `city`, newest first.
    pub async fn history(&self, city: &str, limit: usize) -> Result<Vec<WeatherRecord>, WeatherError> {
        let store = Arc::clone(&self.store);
        let city = city.to_string();
        tokio::task::spawn_blocking(move || store.history_for_city(&city, limit))
            .await
            .map_err(|e| WeatherError::Storage(format!("store task failed: {e}")))?
    }

    /// Summarize the cached snapshot with the text generator.
    pub async fn summary(&self) -> Result<String, WeatherError> {
        let weather = self.cache.latest().ok_or(WeatherError::NoDataAvailable)?;
        let prompt = build_prompt(&weather);

        let text = self.generator.generate(&prompt).await.map_err(|e| {
            tracing::warn!(generator = self.generator.name(), error = %format!("{e:#}"), "summary generation failed");
            WeatherError::SummaryGeneration(format!("{e:#}"))
        })?;

        Ok(format_summary(&text, self.summary_max_chars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteWeatherStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct StubProvider {
        responses: Mutex<Vec<Result<Value, WeatherError>>>,
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn new(responses: Vec<Result<Value, WeatherError>>) -> Self {
            Self { responses: Mutex::new(responses), calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl ForecastProvider for StubProvider {
        async fn fetch_forecast(&self, _query: &WeatherQuery) -> Result<Value, WeatherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock();
            if responses.len() > 1 { responses.remove(0) } else { clone_response(&responses[0]) }
        }
    }

    fn clone_response(r: &Result<Value, WeatherError>) -> Result<Value, WeatherError> {
        match r {
            Ok(v) => Ok(v.clone()),
            Err(e) => Err(WeatherError::UpstreamUnavailable(e.to_string())),
        }
    }

    #[derive(Debug)]
    struct StubGenerator {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for StubGenerator {
        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().push(prompt.to_string());
            self.reply.clone().map_err(|e| anyhow::anyhow!(e))
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    fn payload(city: &str, temp: f64) -> Value {
        let list: Vec<Value> = (0..40)
            .map(|i| {
                json!({
                    "dt_txt": format!("2024-03-{:02} {:02}:00:00", 1 + i / 8, (i % 8) * 3),
                    "main": { "temp": temp, "temp_min": temp - 2.0, "temp_max": temp + 2.0, "humidity": 70, "pressure": 1012 },
                    "weather": [{ "description": "broken clouds" }],
                    "wind": { "speed": 4.1 }
                })
            })
            .collect();
        json!({ "city": { "name": city, "country": "US" }, "list": list })
    }

    struct Harness {
        service: WeatherService,
        provider: Arc<StubProvider>,
        store: Arc<SqliteWeatherStore>,
        generator: Arc<StubGenerator>,
    }

    fn harness(responses: Vec<Result<Value, WeatherError>>, reply: Result<String, String>) -> Harness {
        let provider = Arc::new(StubProvider::new(responses));
        let store = Arc::new(SqliteWeatherStore::open_in_memory().unwrap());
        let generator = Arc::new(StubGenerator { reply, prompts: Mutex::new(vec![]) });
        let service = WeatherService::new(
            provider.clone(),
            store.clone(),
            Arc::new(LatestWeatherCache::new()),
            generator.clone(),
        );
        Harness { service, provider, store, generator }
    }

    #[tokio::test]
    async fn repeated_identical_fetches_persist_once() {
        let h = harness(vec![Ok(payload("Fargo", 3.0))], Ok("ok".into()));
        let query = WeatherQuery::city("Fargo");

        let first = h.service.observe(&query).await.unwrap();
        assert!(first.outcome.is_inserted());
        for _ in 0..4 {
            let next = h.service.observe(&query).await.unwrap();
            assert!(!next.outcome.is_inserted());
        }

        assert_eq!(h.store.count_for_city("Fargo").unwrap(), 1);
        assert_eq!(h.provider.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn changed_fetch_appends_a_row() {
        let h = harness(
            vec![Ok(payload("Fargo", 3.0)), Ok(payload("Fargo", 4.0))],
            Ok("ok".into()),
        );
        let query = WeatherQuery::city("Fargo");

        h.service.observe(&query).await.unwrap();
        let second = h.service.observe(&query).await.unwrap();

        assert!(second.outcome.is_inserted());
        assert_eq!(h.store.count_for_city("Fargo").unwrap(), 2);
        assert_eq!(h.service.cache().latest().unwrap().current.temperature, 4.0);
    }

    #[tokio::test]
    async fn fetch_populates_cache_with_five_day_forecast() {
        let h = harness(vec![Ok(payload("Fargo", 3.0))], Ok("ok".into()));

        let weather = h.service.current_weather(&WeatherQuery::city("Fargo")).await.unwrap();

        assert_eq!(weather.forecast.len(), 5);
        assert_eq!(h.service.cache().latest(), Some(weather));
    }

    #[tokio::test]
    async fn upstream_failure_writes_nothing_and_keeps_cache_empty() {
        let h = harness(
            vec![Err(WeatherError::UpstreamUnavailable("status 404".into()))],
            Ok("ok".into()),
        );

        let err = h.service.observe(&WeatherQuery::city("Nowhere")).await.unwrap_err();

        assert!(matches!(err, WeatherError::UpstreamUnavailable(_)));
        assert_eq!(h.store.count().unwrap(), 0);
        assert!(h.service.cache().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_writes_nothing() {
        let h = harness(vec![Ok(json!({ "city": { "name": "X", "country": "Y" }, "list": [] }))], Ok("ok".into()));

        let err = h.service.observe(&WeatherQuery::city("X")).await.unwrap_err();

        assert!(matches!(err, WeatherError::MalformedResponse(_)));
        assert_eq!(h.store.count().unwrap(), 0);
        assert!(h.service.cache().is_empty());
    }

    #[tokio::test]
    async fn summary_without_data_is_no_data_available() {
        let h = harness(vec![Ok(payload("Fargo", 3.0))], Ok("ok".into()));

        let err = h.service.summary().await.unwrap_err();

        assert!(matches!(err, WeatherError::NoDataAvailable));
        assert!(h.generator.prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn summary_uses_cached_snapshot_and_formats_output() {
        let h = harness(vec![Ok(payload("Fargo", 3.0))], Ok("Line one.\nLine two.".into()));
        h.service.observe(&WeatherQuery::city("Fargo")).await.unwrap();

        let summary = h.service.summary().await.unwrap();

        assert_eq!(summary, "Line one. Line two.");
        let prompts = h.generator.prompts.lock();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Fargo, US"));
    }

    #[tokio::test]
    async fn summary_is_capped_at_configured_length() {
        let mut h = harness(vec![Ok(payload("Fargo", 3.0))], Ok("x".repeat(6000)));
        h.service = h.service.with_summary_max_chars(4000);
        h.service.observe(&WeatherQuery::city("Fargo")).await.unwrap();

        assert_eq!(h.service.summary().await.unwrap().chars().count(), 4000);
    }

    #[tokio::test]
    async fn generator_failure_is_wrapped() {
        let h = harness(vec![Ok(payload("Fargo", 3.0))], Err("model overloaded".into()));
        h.service.observe(&WeatherQuery::city("Fargo")).await.unwrap();

        let err = h.service.summary().await.unwrap_err();

        assert!(matches!(err, WeatherError::SummaryGeneration(ref m) if m.contains("model overloaded")));
    }

    #[tokio::test]
    async fn history_lists_newest_first() {
        let h = harness(
            vec![Ok(payload("Fargo", 1.0)), Ok(payload("Fargo", 2.0))],
            Ok("ok".into()),
        );
        let query = WeatherQuery::city("Fargo");
        h.service.observe(&query).await.unwrap();
        h.service.observe(&query).await.unwrap();

        let history = h.service.history("Fargo", 10).await.unwrap();
        let temps: Vec<f64> = history.iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![2.0, 1.0]);
    }
}
