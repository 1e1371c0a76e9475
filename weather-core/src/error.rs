use thiserror::Error;

/// Errors surfaced by the weather pipeline.
///
/// Each variant maps to one user-visible failure class; the HTTP layer decides
/// the status code and the message shown to callers.
#[derive(Debug, Error)]
pub enum WeatherError {
    /// Required request input is missing or unusable.
    #[error("{0}")]
    InvalidRequest(String),

    /// The forecast provider answered with something other than 200, or could
    /// not be reached at all.
    #[error("Weather provider unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The forecast provider answered 200 but the payload has an unexpected shape.
    #[error("Malformed weather provider response: {0}")]
    MalformedResponse(String),

    /// A summary was requested before any weather data was fetched.
    #[error("No weather data available.")]
    NoDataAvailable,

    /// The text-generation service failed.
    #[error("{0}")]
    SummaryGeneration(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for WeatherError {
    fn from(e: rusqlite::Error) -> Self {
        WeatherError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_errors_become_storage_errors() {
        let err: WeatherError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, WeatherError::Storage(_)));
    }

    #[test]
    fn summary_error_displays_underlying_message() {
        let err = WeatherError::SummaryGeneration("quota exceeded".into());
        assert_eq!(err.to_string(), "quota exceeded");
    }
}
