//! HTTP API
//!
//! # Endpoints
//!
//! - `GET  /health` - liveness, pause state and last poll
//! - `GET  /api/stats` - logging statistics
//! - `GET  /api/settings`, `POST /api/settings` - poll interval and retention
//! - `GET  /api/userconfig`, `POST /api/userconfig` - dashboard preferences
//! - `GET  /api/export` - CSV download of the positions
//! - `GET  /api/export/json` - JSON download of the positions
//! - `GET  /api/flights` - positions grouped by aircraft and callsign
//! - `GET  /api/trace/{icao}` - track of one aircraft
//! - `GET  /api/recent` - aircraft seen in the last hour
//! - `POST /api/pause`, `POST /api/resume` - toggle polling
//! - `POST /api/clear` - delete all positions
//!
//! `start`/`end` query parameters are inclusive timestamp bounds. `OPTIONS`
//! preflights on any route are answered by the CORS layer.

pub mod error;
mod routes;

use std::sync::Arc;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{database::Database, settings::SettingsStore, state::RuntimeState};

pub use error::ApiError;

/// Shared state of the request handlers
#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub runtime: Arc<RuntimeState>,
    pub settings: Arc<SettingsStore>,
}

impl AppState {
    pub fn new(database: Database, runtime: Arc<RuntimeState>, settings: Arc<SettingsStore>) -> Self {
        Self {
            database,
            runtime,
            settings,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/stats", get(routes::stats))
        .route(
            "/api/settings",
            get(routes::get_settings).post(routes::update_settings),
        )
        .route(
            "/api/userconfig",
            get(routes::get_user_config).post(routes::update_user_config),
        )
        .route("/api/export", get(routes::export_csv))
        .route("/api/export/json", get(routes::export_json))
        .route("/api/flights", get(routes::flights))
        .route("/api/trace/{icao}", get(routes::trace))
        .route("/api/recent", get(routes::recent))
        .route("/api/pause", post(routes::pause))
        .route("/api/resume", post(routes::resume))
        .route("/api/clear", post(routes::clear))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
