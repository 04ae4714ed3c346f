//! Request handlers

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::{ApiError, AppState};
use crate::{
    database::{export, FlightFilter, DEFAULT_FLIGHT_LIMIT},
    models::{now_utc, FlightSummary, Icao, RecentAircraft, StoreStats, TimeRange, TracePoint},
    settings::{SettingsUpdate, UserConfig},
};

type ApiResult<T> = Result<T, ApiError>;

const NO_DATA: &str = "No data provided";

// =============================================================================
// Query parameters
// =============================================================================

/// Inclusive `start`/`end` bounds
#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    start: Option<String>,
    end: Option<String>,
}

impl RangeParams {
    fn time_range(&self) -> ApiResult<TimeRange> {
        Ok(TimeRange::parse(non_empty(&self.start), non_empty(&self.end))?)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FlightParams {
    icao: Option<String>,
    callsign: Option<String>,
    start: Option<String>,
    end: Option<String>,
    limit: Option<String>,
}

impl FlightParams {
    fn filter(&self) -> ApiResult<FlightFilter> {
        // A negative limit lifts the cap
        let limit = match non_empty(&self.limit) {
            Some(limit) => {
                let limit: i64 = limit
                    .trim()
                    .parse()
                    .map_err(|_| ApiError::bad_request(format!("invalid limit: {:?}", limit)))?;
                (limit >= 0).then(|| u32::try_from(limit).unwrap_or(u32::MAX))
            }
            None => Some(DEFAULT_FLIGHT_LIMIT),
        };

        Ok(FlightFilter {
            icao: non_empty(&self.icao).map(str::to_string),
            callsign: non_empty(&self.callsign).map(str::to_string),
            range: TimeRange::parse(non_empty(&self.start), non_empty(&self.end))?,
            limit,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    paused: bool,
    last_poll: Option<NaiveDateTime>,
    last_count: u64,
    total_logged: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    stats: StoreStats,
    paused: bool,
    interval: u64,
    retention_days: u32,
    last_poll: Option<NaiveDateTime>,
    last_count: u64,
}

#[derive(Debug, Serialize)]
pub struct TraceResponse {
    icao: Icao,
    positions: usize,
    trace: Vec<TracePoint>,
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let runtime = &state.runtime;
    Json(HealthResponse {
        status: "ok",
        paused: runtime.is_paused(),
        last_poll: runtime.last_poll(),
        last_count: runtime.last_count(),
        total_logged: runtime.total_logged(),
    })
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let stats = state.database.stats().await?;
    let runtime = &state.runtime;
    let settings = runtime.settings();

    Ok(Json(StatsResponse {
        stats,
        paused: settings.paused,
        interval: settings.interval,
        retention_days: settings.retention_days,
        last_poll: runtime.last_poll(),
        last_count: runtime.last_count(),
    }))
}

pub async fn get_settings(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.runtime.settings()))
}

pub async fn update_settings(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::bad_request(NO_DATA));
    }
    let update: SettingsUpdate = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid settings: {}", e)))?;

    update.apply(&state.runtime);
    state
        .settings
        .save_settings(&state.runtime)
        .await
        .map_err(|_| ApiError::Persistence("Could not save config"))?;

    let settings = state.runtime.settings();
    Ok(Json(json!({
        "success": true,
        "interval": settings.interval,
        "retention_days": settings.retention_days,
    })))
}

pub async fn get_user_config(State(state): State<AppState>) -> Json<UserConfig> {
    Json(state.settings.load_user_config().await)
}

pub async fn update_user_config(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let patch = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(patch)) if !patch.is_empty() => patch,
        Ok(_) => return Err(ApiError::bad_request(NO_DATA)),
        Err(_) if body.iter().all(u8::is_ascii_whitespace) => {
            return Err(ApiError::bad_request(NO_DATA))
        }
        Err(e) => return Err(ApiError::bad_request(format!("invalid JSON: {}", e))),
    };

    let keys: Vec<String> = patch.keys().cloned().collect();
    let config = state
        .settings
        .save_user_config(patch)
        .await
        .map_err(|_| ApiError::Persistence("Could not save config"))?;

    info!("User config updated: {:?}", keys);
    Ok(Json(json!({"success": true, "config": config})))
}

pub async fn pause(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    set_paused(&state, true).await
}

pub async fn resume(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    set_paused(&state, false).await
}

async fn set_paused(state: &AppState, paused: bool) -> ApiResult<Json<Value>> {
    state.runtime.set_paused(paused);
    state
        .settings
        .save_settings(&state.runtime)
        .await
        .map_err(|_| ApiError::Persistence("Could not save config"))?;

    info!("Logging {}", if paused { "paused" } else { "resumed" });
    Ok(Json(json!({"success": true, "paused": paused})))
}

pub async fn clear(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let deleted = state.database.clear().await?;
    state.runtime.reset_total_logged();

    info!("All logs cleared ({} positions)", deleted);
    Ok(Json(json!({"success": true})))
}

pub async fn export_csv(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> ApiResult<Response> {
    let snapshots = state.database.export(&params.time_range()?).await?;
    let body = export::to_csv(&snapshots)?;
    Ok(attachment("text/csv", "csv", body))
}

pub async fn export_json(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> ApiResult<Response> {
    let snapshots = state.database.export(&params.time_range()?).await?;
    let body = export::to_json(&snapshots)?;
    Ok(attachment("application/json", "json", body))
}

fn attachment(content_type: &str, extension: &str, body: Vec<u8>) -> Response {
    let filename = format!(
        "flights_{}.{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        extension
    );
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", filename),
            ),
        ],
        body,
    )
        .into_response()
}

pub async fn flights(
    State(state): State<AppState>,
    Query(params): Query<FlightParams>,
) -> ApiResult<Json<Vec<FlightSummary>>> {
    Ok(Json(state.database.list_flights(&params.filter()?).await?))
}

pub async fn trace(
    State(state): State<AppState>,
    Path(icao): Path<String>,
    Query(params): Query<RangeParams>,
) -> ApiResult<Json<TraceResponse>> {
    let icao = Icao::try_from(icao.as_str())?;
    let trace = state.database.trace(&icao, &params.time_range()?).await?;

    Ok(Json(TraceResponse {
        icao,
        positions: trace.len(),
        trace,
    }))
}

pub async fn recent(State(state): State<AppState>) -> ApiResult<Json<Vec<RecentAircraft>>> {
    let since = now_utc() - TimeDelta::hours(1);
    Ok(Json(state.database.recent(since).await?))
}
