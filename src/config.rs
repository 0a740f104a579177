//! Service configuration from environment variables, plus the engine
//! tuning parameters loaded from a JSON file at startup.

use std::env;
use std::fs;

use tracing::warn;

/// UCI option name -> value, applied to the engine at startup.
pub type EngineParams = serde_json::Map<String, serde_json::Value>;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// Path to the engine binary
    pub stockfish_path: String,

    /// Path to the JSON file with engine tuning parameters
    pub engine_config_path: String,

    /// Default (and maximum) search depth when the request omits one
    pub max_depth: u32,

    /// Per-query engine timeout in seconds
    pub engine_timeout_secs: u64,

    /// Directory for persisted analyses; None disables persistence
    pub analysis_dir: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            stockfish_path: env::var("STOCKFISH_PATH")
                .unwrap_or_else(|_| "/usr/local/bin/stockfish".to_string()),
            engine_config_path: env::var("ENGINE_CONFIG_PATH")
                .unwrap_or_else(|_| "stockfish_config.json".to_string()),
            max_depth: env::var("MAX_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            engine_timeout_secs: env::var("ENGINE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            analysis_dir: match env::var("ANALYSIS_DIR") {
                Ok(dir) if dir.is_empty() => None,
                Ok(dir) => Some(dir),
                Err(_) => Some("analyses".to_string()),
            },
        }
    }
}

/// Load engine tuning parameters from a JSON file.
///
/// A missing or malformed file degrades to empty parameters; the engine then
/// runs with its built-in defaults. Never blocks startup.
pub fn load_engine_params(path: &str) -> EngineParams {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path, error = %e, "Engine config not readable, using engine defaults");
            return EngineParams::new();
        }
    };

    match serde_json::from_str(&text) {
        Ok(params) => params,
        Err(e) => {
            warn!(path, error = %e, "Engine config is not valid JSON, using engine defaults");
            EngineParams::new()
        }
    }
}
