use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use webfish::config::{self, Config};
use webfish::engine::{StockfishEngine, UciEngine};
use webfish::storage::AnalysisStore;
use webfish::AppState;

#[tokio::main]
async fn main() {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();

    // Engine tuning parameters; missing/corrupt config degrades to defaults
    let params = config::load_engine_params(&config.engine_config_path);
    tracing::info!(options = params.len(), "Engine parameters loaded");

    // Spawn the engine once. A failure here is permanent: the service stays
    // up but every analysis request is rejected as unavailable.
    let session: Option<Box<dyn UciEngine>> =
        match StockfishEngine::new(&config.stockfish_path, &params).await {
            Ok(engine) => {
                tracing::info!(path = %config.stockfish_path, "Engine ready");
                Some(Box::new(engine))
            }
            Err(e) => {
                tracing::error!(path = %config.stockfish_path, error = %e, "Engine failed to start — analysis disabled");
                None
            }
        };

    let store = config.analysis_dir.as_ref().map(|dir| {
        tracing::info!(dir, "Persisting analyses");
        Arc::new(AnalysisStore::new(dir))
    });
    if store.is_none() {
        tracing::info!("Persistence disabled");
    }

    let state = AppState {
        engine: Arc::new(Mutex::new(session)),
        store,
        max_depth: config.max_depth,
        engine_timeout: Duration::from_secs(config.engine_timeout_secs),
    };

    let app = webfish::app(state.clone());

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .expect("Server error");

    tracing::info!("Shutting down engine");
    let mut session = state.engine.lock().await;
    if let Some(engine) = session.as_mut() {
        engine.quit().await;
    }
}
