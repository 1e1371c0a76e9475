//! SQLite-backed weather history with change detection.
//!
//! A row is appended only when a snapshot differs from the most recent row for
//! the same city. Rows are never updated or deleted.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::path::Path;

use crate::{
    WeatherError,
    model::{ForecastDay, NormalizedWeather, WeatherRecord},
};

/// Result of [`WeatherStore::upsert_if_changed`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// A new row was written.
    Inserted(WeatherRecord),
    /// The latest row already matched; nothing was written.
    Unchanged(WeatherRecord),
}

impl UpsertOutcome {
    pub fn record(&self) -> &WeatherRecord {
        match self {
            UpsertOutcome::Inserted(r) | UpsertOutcome::Unchanged(r) => r,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted(_))
    }
}

/// Persistent history of weather snapshots.
pub trait WeatherStore: Send + Sync {
    /// Append `weather` unless the latest row for its city already matches it.
    ///
    /// The lookup and the insert happen atomically.
    fn upsert_if_changed(&self, weather: &NormalizedWeather) -> Result<UpsertOutcome, WeatherError>;

    fn latest_for_city(&self, city: &str) -> Result<Option<WeatherRecord>, WeatherError>;

    /// Newest first.
    fn history_for_city(&self, city: &str, limit: usize) -> Result<Vec<WeatherRecord>, WeatherError>;

    fn count_for_city(&self, city: &str) -> Result<usize, WeatherError>;
}

const SELECT_COLUMNS: &str = "SELECT id, city, country, temperature, description, humidity, \
     wind_speed, pressure, forecast, timestamp FROM weather";

pub struct SqliteWeatherStore {
    conn: Mutex<Connection>,
}

impl SqliteWeatherStore {
    /// Open (or create) the store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WeatherError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store.
    pub fn open_in_memory() -> Result<Self, WeatherError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, WeatherError> {
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), WeatherError> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS weather (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                city TEXT NOT NULL,
                country TEXT NOT NULL,
                temperature REAL NOT NULL,
                description TEXT NOT NULL,
                humidity INTEGER NOT NULL,
                wind_speed REAL NOT NULL,
                pressure REAL NOT NULL,
                forecast TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_weather_city_id ON weather(city, id DESC);
            "#,
        )?;
        Ok(())
    }

    /// Total number of rows across all cities.
    pub fn count(&self) -> Result<usize, WeatherError> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM weather", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn latest_in(conn: &Connection, city: &str) -> Result<Option<WeatherRecord>, WeatherError> {
        let sql = format!("{SELECT_COLUMNS} WHERE city = ?1 ORDER BY id DESC LIMIT 1");
        let row = conn
            .query_row(&sql, params![city], Self::row_to_raw)
            .optional()?;
        row.map(RawRow::into_record).transpose()
    }

    fn row_to_raw(row: &rusqlite::Row) -> rusqlite::Result<RawRow> {
        Ok(RawRow {
            id: row.get(0)?,
            city: row.get(1)?,
            country: row.get(2)?,
            temperature: row.get(3)?,
            description: row.get(4)?,
            humidity: row.get(5)?,
            wind_speed: row.get(6)?,
            pressure: row.get(7)?,
            forecast: row.get(8)?,
            timestamp: row.get(9)?,
        })
    }
}

/// Row as stored; JSON and timestamp columns are decoded in `into_record`.
struct RawRow {
    id: i64,
    city: String,
    country: String,
    temperature: f64,
    description: String,
    humidity: i64,
    wind_speed: f64,
    pressure: f64,
    forecast: String,
    timestamp: String,
}

impl RawRow {
    fn into_record(self) -> Result<WeatherRecord, WeatherError> {
        let forecast: Vec<ForecastDay> = serde_json::from_str(&self.forecast).map_err(|e| {
            WeatherError::Storage(format!("row {} has an unreadable forecast: {e}", self.id))
        })?;
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                WeatherError::Storage(format!("row {} has an unreadable timestamp: {e}", self.id))
            })?;

        Ok(WeatherRecord {
            id: self.id,
            city: self.city,
            country: self.country,
            temperature: self.temperature,
            description: self.description,
            humidity: self.humidity,
            wind_speed: self.wind_speed,
            pressure: self.pressure,
            forecast,
            timestamp,
        })
    }
}

impl WeatherStore for SqliteWeatherStore {
    fn upsert_if_changed(&self, weather: &NormalizedWeather) -> Result<UpsertOutcome, WeatherError> {
        let city = weather.location.city.as_str();
        let mut conn = self.conn.lock();
        // IMMEDIATE takes the write lock up front, so another writer on the same
        // file cannot slip an insert between our read and our write.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(latest) = Self::latest_in(&tx, city)? {
            if !latest.differs_from(weather) {
                tx.commit()?;
                tracing::debug!(city, id = latest.id, "weather unchanged; no row written");
                return Ok(UpsertOutcome::Unchanged(latest));
            }
        }

        let forecast_json = serde_json::to_string(&weather.forecast)
            .map_err(|e| WeatherError::Storage(format!("failed to encode forecast: {e}")))?;
        let now = Utc::now();
        let current = &weather.current;

        tx.execute(
            r#"
            INSERT INTO weather (city, country, temperature, description, humidity, wind_speed, pressure, forecast, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                city,
                weather.location.country,
                current.temperature,
                current.description,
                current.humidity,
                current.wind_speed,
                current.pressure,
                forecast_json,
                now.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        tracing::info!(city, id, "stored new weather snapshot");

        Ok(UpsertOutcome::Inserted(WeatherRecord {
            id,
            city: city.to_string(),
            country: weather.location.country.clone(),
            temperature: current.temperature,
            description: current.description.clone(),
            humidity: current.humidity,
            wind_speed: current.wind_speed,
            pressure: current.pressure,
            forecast: weather.forecast.clone(),
            timestamp: now,
        }))
    }

    fn latest_for_city(&self, city: &str) -> Result<Option<WeatherRecord>, WeatherError> {
        let conn = self.conn.lock();
        Self::latest_in(&conn, city)
    }

    fn history_for_city(&self, city: &str, limit: usize) -> Result<Vec<WeatherRecord>, WeatherError> {
        let conn = self.conn.lock();
        let sql = format!("{SELECT_COLUMNS} WHERE city = ?1 ORDER BY id DESC LIMIT ?2");
        let mut stmt = conn.prepare(&sql)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![city, limit], Self::row_to_raw)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRow::into_record).collect()
    }

    fn count_for_city(&self, city: &str) -> Result<usize, WeatherError> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM weather WHERE city = ?1",
            params![city],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
