use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use weather_core::{
    Config, LatestWeatherCache, NormalizedWeather, ServiceId, SqliteWeatherStore, UpsertOutcome,
    WeatherQuery, WeatherService, WeatherStore,
    provider::{http_client, provider_from_config},
    summary::generator_from_config,
};
use weather_server::{AppState, router};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Weather backend service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API.
    Serve {
        /// Listen address, e.g. "0.0.0.0:8000".
        #[arg(long)]
        bind: Option<String>,

        /// SQLite database file.
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Fetch and record the weather for a city or coordinates, then print it.
    Show {
        /// City name; defaults to the configured default city.
        city: Option<String>,

        #[arg(long, requires = "lon", conflicts_with = "city", allow_hyphen_values = true)]
        lat: Option<f64>,

        #[arg(long, requires = "lat", conflicts_with = "city", allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// List recorded snapshots for a city, newest first.
    History {
        city: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Configure credentials for an external service.
    Configure {
        /// Service short name: "openweather" or "gemini".
        service: String,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Serve { bind, database } => {
                let mut config = Config::load()?;
                if let Some(bind) = bind {
                    config.bind = bind;
                }
                if let Some(database) = database {
                    config.database_path = database;
                }
                serve(config).await
            }
            Command::Show { city, lat, lon } => {
                let config = Config::load()?;
                let query = match (lat, lon) {
                    (None, None) => WeatherQuery::city(city.unwrap_or_else(|| config.default_city.clone())),
                    (lat, lon) => WeatherQuery::from_coordinates(lat, lon)?,
                };
                let service = build_service(&config)?;
                let observation = service.observe(&query).await?;
                print_weather(&observation.weather, &observation.outcome);
                Ok(())
            }
            Command::History { city, limit } => {
                let config = Config::load()?;
                let store = open_store(&config)?;
                let records = store.history_for_city(&city, limit)?;
                if records.is_empty() {
                    println!("No recorded weather for {city}.");
                }
                for r in records {
                    println!(
                        "#{:<5} {}  {:>6.1}°C  {:<20} humidity {}%  wind {} m/s  {} hPa",
                        r.id,
                        r.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                        r.temperature,
                        r.description,
                        r.humidity,
                        r.wind_speed,
                        r.pressure,
                    );
                }
                Ok(())
            }
            Command::Configure { service } => configure(&service),
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let service = build_service(&config)?;
    let state = AppState { service, default_city: config.default_city.clone() };
    let app = router(state, &config.cors_allowed_origins);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(
        bind = %config.bind,
        database = %config.database_path.display(),
        "weather API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("weather API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {e}");
    }
}

fn open_store(config: &Config) -> anyhow::Result<SqliteWeatherStore> {
    let path = &config.database_path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
    }
    SqliteWeatherStore::open(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))
}

fn build_service(config: &Config) -> anyhow::Result<WeatherService> {
    let http = http_client(config)?;
    let provider = provider_from_config(config, http.clone())?;
    let generator = generator_from_config(config, http);
    let store = Arc::new(open_store(config)?);

    Ok(WeatherService::new(provider, store, Arc::new(LatestWeatherCache::new()), generator)
        .with_summary_max_chars(config.summary_max_chars))
}

fn configure(service: &str) -> anyhow::Result<()> {
    let id = ServiceId::try_from(service)?;
    let mut config = Config::load_file()?;

    let api_key = inquire::Password::new(&format!("API key for {id}:"))
        .without_confirmation()
        .with_display_mode(inquire::PasswordDisplayMode::Masked)
        .prompt()
        .context("Failed to read API key")?;
    if api_key.trim().is_empty() {
        anyhow::bail!("API key must not be empty");
    }

    config.upsert_service_api_key(id, api_key.trim().to_string());
    let path = config.save()?;
    println!("Saved {id} credentials to {}", path.display());
    Ok(())
}

fn print_weather(weather: &NormalizedWeather, outcome: &UpsertOutcome) {
    let current = &weather.current;
    println!("{}, {}", weather.location.city, weather.location.country);
    println!(
        "  now: {:.1}°C, {}, humidity {}%, wind {} m/s, pressure {} hPa",
        current.temperature, current.description, current.humidity, current.wind_speed, current.pressure
    );
    for day in &weather.forecast {
        println!(
            "  {}: {:.1}°C .. {:.1}°C, {}",
            day.date, day.temp_min, day.temp_max, day.description
        );
    }
    match outcome {
        UpsertOutcome::Inserted(r) => println!("  recorded as #{}", r.id),
        UpsertOutcome::Unchanged(r) => println!("  unchanged since #{}", r.id),
    }
}
