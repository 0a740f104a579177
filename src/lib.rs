//! webfish: a PGN analysis service backed by an external UCI engine.
//!
//! `POST /analyze` takes a game in PGN, expands the main line into FENs and
//! asks the engine for the top candidate moves at every position. Completed
//! analyses are returned to the caller and written to disk as JSON.

pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod pgn;
pub mod routes;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::engine::EngineHandle;
use crate::storage::AnalysisStore;

/// Shared state for the handlers.
#[derive(Clone)]
pub struct AppState {
    /// The single engine session; empty when startup failed.
    pub engine: EngineHandle,
    /// Persisted-analysis store; None disables persistence.
    pub store: Option<Arc<AnalysisStore>>,
    /// Default depth for requests that omit one.
    pub max_depth: u32,
    /// Per-query engine timeout.
    pub engine_timeout: Duration,
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health_check))
        .route("/analyze", post(routes::analyze_pgn))
        .layer(Extension(state))
        .layer(cors)
}
