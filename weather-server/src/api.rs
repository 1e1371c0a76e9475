use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use weather_core::{NormalizedWeather, WeatherError, WeatherQuery, WeatherRecord, WeatherService};

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub service: WeatherService,
    pub default_city: String,
}

/// Routes are served at the root and again under `/api`.
pub fn router(state: AppState, cors_allowed_origins: &[String]) -> Router {
    let weather = Router::new()
        .route("/weather", get(weather_by_city))
        .route("/weather/coordinates", get(weather_by_coordinates))
        .route("/weather/generate-weather-summary", get(generate_summary))
        .route("/weather/history", get(weather_history));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(weather.clone())
        .nest("/api", weather)
        .layer(cors_layer(cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
}

/// Maps pipeline errors onto the JSON error body `{ "error": ... }`.
pub struct ApiError(WeatherError);

impl From<WeatherError> for ApiError {
    fn from(e: WeatherError) -> Self {
        ApiError(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            WeatherError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            WeatherError::UpstreamUnavailable(_) => {
                (StatusCode::BAD_REQUEST, "Unable to fetch weather data".to_string())
            }
            WeatherError::MalformedResponse(_) => (
                StatusCode::BAD_GATEWAY,
                "Malformed response from weather provider".to_string(),
            ),
            WeatherError::NoDataAvailable => {
                (StatusCode::BAD_REQUEST, "No weather data available.".to_string())
            }
            WeatherError::SummaryGeneration(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            WeatherError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to store weather data".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, %status, "request failed");
        } else {
            tracing::warn!(error = %self.0, %status, "request rejected");
        }

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct CityParams {
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CoordinateParams {
    lat: Option<String>,
    lon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    city: Option<String>,
    limit: Option<String>,
}

#[derive(Serialize)]
struct SummaryBody {
    summary: String,
}

async fn weather_by_city(
    State(state): State<AppState>,
    Query(params): Query<CityParams>,
) -> Result<Json<NormalizedWeather>, ApiError> {
    let city = params
        .city
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| state.default_city.clone());

    let weather = state.service.current_weather(&WeatherQuery::city(city)).await?;
    Ok(Json(weather))
}

async fn weather_by_coordinates(
    State(state): State<AppState>,
    Query(params): Query<CoordinateParams>,
) -> Result<Json<NormalizedWeather>, ApiError> {
    let latitude = parse_coordinate(params.lat.as_deref())?;
    let longitude = parse_coordinate(params.lon.as_deref())?;
    let query = WeatherQuery::from_coordinates(latitude, longitude)?;

    let weather = state.service.current_weather(&query).await?;
    Ok(Json(weather))
}

async fn generate_summary(State(state): State<AppState>) -> Result<Json<SummaryBody>, ApiError> {
    let summary = state.service.summary().await?;
    Ok(Json(SummaryBody { summary }))
}

async fn weather_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<WeatherRecord>>, ApiError> {
    let city = params
        .city
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| state.default_city.clone());
    let limit = parse_limit(params.limit.as_deref())?;

    let records = state.service.history(&city, limit).await?;
    Ok(Json(records))
}

// Blank counts as missing; anything else must parse as a number.
fn parse_coordinate(raw: Option<&str>) -> Result<Option<f64>, WeatherError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s.parse::<f64>().map(Some).map_err(|_| {
            WeatherError::InvalidRequest("Latitude and Longitude must be numbers.".to_string())
        }),
    }
}

fn parse_limit(raw: Option<&str>) -> Result<usize, WeatherError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(DEFAULT_HISTORY_LIMIT),
        Some(s) => s
            .parse::<usize>()
            .map(|n| n.min(MAX_HISTORY_LIMIT))
            .map_err(|_| WeatherError::InvalidRequest("limit must be a non-negative integer.".to_string())),
    }
}
