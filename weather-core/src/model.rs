use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WeatherError;

/// What the caller wants the forecast for.
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherQuery {
    City(String),
    Coordinates { latitude: f64, longitude: f64 },
}

impl WeatherQuery {
    pub fn city(name: impl Into<String>) -> Self {
        WeatherQuery::City(name.into())
    }

    /// Both coordinates are required; a missing one is rejected before any
    /// outbound call is made.
    pub fn from_coordinates(
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<Self, WeatherError> {
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Ok(WeatherQuery::Coordinates { latitude, longitude }),
            _ => Err(WeatherError::InvalidRequest(
                "Latitude and Longitude are required parameters.".to_string(),
            )),
        }
    }
}

impl std::fmt::Display for WeatherQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeatherQuery::City(name) => f.write_str(name),
            WeatherQuery::Coordinates { latitude, longitude } => write!(f, "{latitude},{longitude}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub country: String,
}

/// Conditions at the first timestep of the provider's series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    #[serde(rename = "temp_c")]
    pub temperature: f64,
    pub description: String,
    pub wind_speed: f64,
    pub humidity: i64,
    pub pressure: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uv: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    /// `YYYY-MM-DD`
    pub date: String,
    pub temp_min: f64,
    pub temp_max: f64,
    pub description: String,
}

/// Provider-independent weather snapshot.
///
/// `location` is flattened on the wire so clients read `city` and `country`
/// at the top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedWeather {
    #[serde(flatten)]
    pub location: Location,
    pub current: CurrentConditions,
    pub forecast: Vec<ForecastDay>,
}

/// One persisted row. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub id: i64,
    pub city: String,
    pub country: String,
    pub temperature: f64,
    pub description: String,
    pub humidity: i64,
    pub wind_speed: f64,
    pub pressure: f64,
    pub forecast: Vec<ForecastDay>,
    pub timestamp: DateTime<Utc>,
}

impl WeatherRecord {
    /// True when any tracked field differs from `weather`.
    ///
    /// Floats are compared exactly; the forecast is compared element by
    /// element, in order.
    pub fn differs_from(&self, weather: &NormalizedWeather) -> bool {
        let current = &weather.current;
        self.country != weather.location.country
            || self.temperature != current.temperature
            || self.description != current.description
            || self.humidity != current.humidity
            || self.wind_speed != current.wind_speed
            || self.pressure != current.pressure
            || self.forecast != weather.forecast
    }
}
