//! Core library for the weather backend.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The OpenWeather forecast fetcher and the normalizer for its payload
//! - Change-detected persistence of weather snapshots (SQLite)
//! - The in-memory latest-snapshot cache and AI summary generation
//!
//! It is used by `weather-server`, but can also be reused by other binaries.

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod provider;
pub mod service;
pub mod store;
pub mod summary;

pub use cache::LatestWeatherCache;
pub use config::{Config, ServiceConfig};
pub use error::WeatherError;
pub use model::{CurrentConditions, ForecastDay, Location, NormalizedWeather, WeatherQuery, WeatherRecord};
pub use provider::{ForecastProvider, ServiceId};
pub use service::{Observation, WeatherService};
pub use store::{SqliteWeatherStore, UpsertOutcome, WeatherStore};
pub use summary::TextGenerator;
