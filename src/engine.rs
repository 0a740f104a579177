//! UCI engine wrapper (async I/O) behind an injectable trait.
//!
//! One engine process is spawned at startup and shared for the lifetime of
//! the service. The orchestrator holds the session mutex for a whole request,
//! so `set_position`/`top_moves` pairs are never interleaved across requests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::EngineParams;
use crate::error::AppError;

/// Bound on the startup handshake; a wedged binary degrades to the
/// permanently-unavailable state instead of hanging startup.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period for an abandoned search to settle after `stop`.
const HALT_GRACE: Duration = Duration::from_secs(2);

/// One ranked candidate move for a position. Exactly one of `centipawn` and
/// `mate` is populated, per the engine's score line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecommendation {
    #[serde(rename = "move")]
    pub uci: String,
    pub centipawn: Option<i32>,
    pub mate: Option<i32>,
}

/// The engine capability the orchestrator depends on.
///
/// `set_position` and `top_moves` act on the session's mutable position
/// state, so callers must hold the session lock across both.
#[async_trait]
pub trait UciEngine: Send {
    async fn set_depth(&mut self, depth: u32) -> Result<(), AppError>;
    async fn set_position(&mut self, fen: &str) -> Result<(), AppError>;
    async fn top_moves(&mut self, count: u32) -> Result<Vec<MoveRecommendation>, AppError>;

    /// Restore the session after an abandoned query. Called before the
    /// session is reused when a `top_moves` future was dropped mid-search;
    /// an error means the session cannot be trusted and must be retired.
    async fn halt(&mut self) -> Result<(), AppError> {
        Ok(())
    }

    /// Best-effort shutdown of the underlying session.
    async fn quit(&mut self) {}
}

/// Shared engine session. Empty after a failed startup: every request then
/// fails fast with `EngineUnavailable` for the rest of the process lifetime.
pub type EngineHandle = Arc<Mutex<Option<Box<dyn UciEngine>>>>;

/// Stockfish process speaking UCI over piped stdio.
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    depth: u32,
}

impl StockfishEngine {
    /// Spawn the engine, run the UCI handshake and apply tuning parameters.
    pub async fn new(path: &str, params: &EngineParams) -> Result<Self, AppError> {
        let mut process = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| AppError::Engine(format!("Failed to spawn engine at {path}: {e}")))?;

        let stdin = process.stdin.take().unwrap();
        let stdout = BufReader::new(process.stdout.take().unwrap());

        let mut engine = Self {
            process,
            stdin,
            stdout,
            depth: 15,
        };

        tokio::time::timeout(STARTUP_TIMEOUT, engine.handshake(params))
            .await
            .map_err(|_| {
                AppError::Engine(format!(
                    "Engine at {path} did not complete the UCI handshake in time"
                ))
            })??;

        Ok(engine)
    }

    async fn handshake(&mut self, params: &EngineParams) -> Result<(), AppError> {
        self.send("uci").await?;
        self.wait_for("uciok").await?;

        for (name, value) in params {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            self.send(&format!("setoption name {name} value {value}")).await?;
        }

        self.send("isready").await?;
        self.wait_for("readyok").await?;
        Ok(())
    }

    async fn send(&mut self, cmd: &str) -> Result<(), AppError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| AppError::Engine(format!("Failed to write to engine: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| AppError::Engine(format!("Failed to flush engine stdin: {e}")))?;
        Ok(())
    }

    async fn read_line(&mut self, buf: &mut String) -> Result<(), AppError> {
        buf.clear();
        let n = self
            .stdout
            .read_line(buf)
            .await
            .map_err(|e| AppError::Engine(format!("Failed to read from engine: {e}")))?;
        if n == 0 {
            return Err(AppError::Engine("Engine closed its output stream".into()));
        }
        Ok(())
    }

    async fn wait_for(&mut self, expected: &str) -> Result<(), AppError> {
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();
            debug!(line = trimmed, "SF >");
            if trimmed == expected {
                return Ok(());
            }
        }
    }

    /// Read and discard output until a `bestmove` line.
    async fn drain_search(&mut self) -> Result<(), AppError> {
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();
            debug!(line = trimmed, "SF > (drained)");
            if trimmed.starts_with("bestmove") {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl UciEngine for StockfishEngine {
    async fn set_depth(&mut self, depth: u32) -> Result<(), AppError> {
        // Depth is a `go` argument, not a UCI option; remember it per session.
        self.depth = depth;
        Ok(())
    }

    async fn set_position(&mut self, fen: &str) -> Result<(), AppError> {
        self.send(&format!("position fen {fen}")).await
    }

    async fn top_moves(&mut self, count: u32) -> Result<Vec<MoveRecommendation>, AppError> {
        self.send(&format!("setoption name MultiPV value {count}")).await?;
        self.send(&format!("go depth {}", self.depth)).await?;

        // One slot per MultiPV rank; the engine re-emits lines as the search
        // deepens, so keep only the latest per rank.
        let mut slots: Vec<Option<MoveRecommendation>> = vec![None; count as usize];
        let mut line = String::new();

        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();

            if trimmed.starts_with("info") && trimmed.contains(" pv ") {
                let rank = parse_multipv_index(trimmed).unwrap_or(1).saturating_sub(1);
                if let Some(slot) = slots.get_mut(rank as usize) {
                    let pv = parse_pv(trimmed);
                    if let Some(first) = pv.first() {
                        *slot = Some(MoveRecommendation {
                            uci: first.clone(),
                            centipawn: parse_cp(trimmed),
                            mate: parse_mate(trimmed),
                        });
                    }
                }
            } else if trimmed.starts_with("bestmove") {
                break;
            }
        }

        self.send("setoption name MultiPV value 1").await?;

        // Trailing empty slots happen when the position has fewer legal
        // moves than requested (or none at all).
        Ok(slots.into_iter().flatten().collect())
    }

    async fn halt(&mut self) -> Result<(), AppError> {
        // A dropped `top_moves` leaves `go` running with its output queued
        // in the pipe; stop the search and drain past its bestmove so the
        // next query reads its own results, not these.
        self.send("stop").await?;
        tokio::time::timeout(HALT_GRACE, self.drain_search())
            .await
            .map_err(|_| AppError::Engine("Engine did not settle after stop".to_string()))??;
        self.send("setoption name MultiPV value 1").await
    }

    /// Send quit and wait for the process to exit.
    async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

/// The token following `key` in a whitespace-separated UCI info line.
fn token_after<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let mut tokens = line.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == key {
            return tokens.next();
        }
    }
    None
}

fn parse_cp(line: &str) -> Option<i32> {
    token_after(line, "cp")?.parse().ok()
}

fn parse_mate(line: &str) -> Option<i32> {
    token_after(line, "mate")?.parse().ok()
}

fn parse_multipv_index(line: &str) -> Option<u32> {
    token_after(line, "multipv")?.parse().ok()
}

/// PV moves from an info line; the PV runs to the end of the line or the
/// next non-move keyword.
fn parse_pv(line: &str) -> Vec<String> {
    line.split_whitespace()
        .skip_while(|&token| token != "pv")
        .skip(1)
        .take_while(|&token| !token.starts_with("bmc") && token != "string")
        .map(str::to_string)
        .collect()
}
