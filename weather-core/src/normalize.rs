//! Mapping of the OpenWeather forecast payload into [`NormalizedWeather`].

use serde::Deserialize;
use serde_json::Value;

use crate::{
    WeatherError,
    model::{CurrentConditions, ForecastDay, Location, NormalizedWeather},
};

/// The provider reports every 3 hours; every 8th entry is one day apart.
pub const TIMESTEPS_PER_DAY: usize = 8;

#[derive(Debug, Deserialize)]
struct OwCity {
    name: String,
    country: String,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp_min: f64,
    temp_max: f64,
    temp: Option<f64>,
    humidity: Option<i64>,
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwEntry {
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: Option<OwWind>,
    dt_txt: String,
}

// Entries stay raw until sampled; unsampled timesteps are never inspected.
#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    city: OwCity,
    list: Vec<Value>,
}

/// Normalize a raw forecast payload.
///
/// Current conditions come from the first entry; the daily forecast samples
/// entries 0, 8, 16, ... in order.
pub fn normalize(raw: &Value) -> Result<NormalizedWeather, WeatherError> {
    let parsed = OwForecastResponse::deserialize(raw)
        .map_err(|e| WeatherError::MalformedResponse(e.to_string()))?;

    let first = parsed
        .list
        .first()
        .ok_or_else(|| malformed("forecast list is empty"))
        .and_then(|raw| entry_at(raw, 0))?;

    let current = CurrentConditions {
        temperature: first.main.temp.ok_or_else(|| malformed("list[0].main.temp is missing"))?,
        description: description_of(&first, 0)?,
        wind_speed: first
            .wind
            .as_ref()
            .map(|w| w.speed)
            .ok_or_else(|| malformed("list[0].wind.speed is missing"))?,
        humidity: first.main.humidity.ok_or_else(|| malformed("list[0].main.humidity is missing"))?,
        pressure: first.main.pressure.ok_or_else(|| malformed("list[0].main.pressure is missing"))?,
        uv: None,
    };

    let forecast = parsed
        .list
        .iter()
        .enumerate()
        .step_by(TIMESTEPS_PER_DAY)
        .map(|(idx, raw)| {
            let entry = entry_at(raw, idx)?;
            Ok(ForecastDay {
                date: date_of(&entry, idx)?,
                temp_min: entry.main.temp_min,
                temp_max: entry.main.temp_max,
                description: description_of(&entry, idx)?,
            })
        })
        .collect::<Result<Vec<_>, WeatherError>>()?;

    Ok(NormalizedWeather {
        location: Location { city: parsed.city.name, country: parsed.city.country },
        current,
        forecast,
    })
}

fn malformed(msg: impl Into<String>) -> WeatherError {
    WeatherError::MalformedResponse(msg.into())
}

fn entry_at(raw: &Value, idx: usize) -> Result<OwEntry, WeatherError> {
    OwEntry::deserialize(raw).map_err(|e| malformed(format!("list[{idx}]: {e}")))
}

fn description_of(entry: &OwEntry, idx: usize) -> Result<String, WeatherError> {
    entry
        .weather
        .first()
        .map(|w| w.description.clone())
        .ok_or_else(|| malformed(format!("list[{idx}].weather is empty")))
}

// "2024-03-01 12:00:00" -> "2024-03-01"
fn date_of(entry: &OwEntry, idx: usize) -> Result<String, WeatherError> {
    entry
        .dt_txt
        .split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| malformed(format!("list[{idx}].dt_txt is empty")))
}
