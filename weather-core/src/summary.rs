use async_trait::async_trait;
use std::{fmt::Debug, fmt::Write as _, sync::Arc, time::Duration};

use crate::{Config, model::NormalizedWeather, provider::ServiceId, summary::gemini::GeminiClient};

pub mod gemini;

/// External text-generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync + Debug {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Stand-in used when no text-generation key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!(
            "Text generation is not configured. Hint: run `weather configure gemini` or set {}.",
            ServiceId::Gemini.api_key_env()
        )
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Build the text generator from config, falling back to [`DisabledGenerator`].
pub fn generator_from_config(config: &Config, http: reqwest::Client) -> Arc<dyn TextGenerator> {
    let id = ServiceId::Gemini;
    let Some(api_key) = config.service_api_key(id) else {
        tracing::warn!("no {id} API key configured; summaries are disabled");
        return Arc::new(DisabledGenerator);
    };

    let svc = config.service_config(id);
    let mut client = GeminiClient::new(api_key.to_owned())
        .with_client(http)
        .with_timeout(Duration::from_secs(config.summary_timeout_secs.max(1)));
    if let Some(model) = svc.and_then(|s| s.model.as_deref()) {
        client = client.with_model(model);
    }
    if let Some(url) = svc.and_then(|s| s.base_url.as_deref()) {
        client = client.with_base_url(url);
    }
    Arc::new(client)
}

/// Deterministic prompt describing current conditions and every forecast day.
pub fn build_prompt(weather: &NormalizedWeather) -> String {
    let current = &weather.current;
    let mut prompt = String::new();

    // Writing to a String cannot fail.
    let _ = write!(
        prompt,
        "Generate a concise weather summary for {}, {}. ",
        weather.location.city, weather.location.country
    );
    let _ = write!(prompt, "Current temperature: {}°C. ", current.temperature);
    let _ = write!(prompt, "Description: {}. ", current.description);
    let _ = write!(prompt, "Wind speed: {} m/s. ", current.wind_speed);
    let _ = write!(prompt, "Humidity: {}%. ", current.humidity);
    let _ = write!(prompt, "Pressure: {} hPa. ", current.pressure);
    let _ = writeln!(prompt, "Provide a brief {}-day forecast summary:", weather.forecast.len());

    for day in &weather.forecast {
        let _ = writeln!(
            prompt,
            "- {}: {}°C to {}°C, {}",
            day.date, day.temp_min, day.temp_max, day.description
        );
    }

    prompt.push_str("\nYou are an expert meteorologist. Please provide:\n");
    prompt.push_str("1. A brief summary of the overall weather trend.\n");
    prompt.push_str("2. Any notable changes or unusual weather patterns.\n");
    prompt.push_str("3. Practical recommendations for clothing and activities.\n");
    prompt.push_str("4. Any potential weather-related precautions or advisories.\n\n");
    prompt.push_str(
        "Answer in clear, friendly language without any special formatting or markdown, \
         in a conversational tone that is easy to understand for the general public.",
    );

    prompt
}

/// Replace each line break with a single space and cap the length at
/// `max_chars` characters.
pub fn format_summary(text: &str, max_chars: usize) -> String {
    text.replace("\r\n", " ")
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .take(max_chars)
        .collect()
}
