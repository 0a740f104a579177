//! Analysis orchestration: validated request in, immutable record out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::MoveRecommendation;
use crate::error::AppError;
use crate::pgn;
use crate::AppState;

/// Candidate moves requested per position.
pub const TOP_MOVES_PER_POSITION: u32 = 3;

/// A validated, normalized analysis request.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub pgn: String,
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionAnalysis {
    pub fen: String,
    pub best_moves: Vec<MoveRecommendation>,
}

/// One completed analysis. Created once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub pgn: String,
    pub depth: u32,
    pub positions: Vec<PositionAnalysis>,
}

/// Run a full analysis: expand the PGN, query the engine per position in
/// order, assemble the record and persist it if a store is configured.
///
/// The engine session lock is held for the entire request. The session's
/// position and depth are mutable shared state, so interleaving two requests
/// would attribute one request's recommendations to the other's positions.
pub async fn analyze(state: &AppState, request: AnalysisRequest) -> Result<AnalysisRecord, AppError> {
    let mut session = state.engine.lock().await;
    let engine = session.as_mut().ok_or(AppError::EngineUnavailable)?;

    let fens = pgn::pgn_to_fens(&request.pgn)?;

    engine.set_depth(request.depth).await?;

    let mut positions = Vec::with_capacity(fens.len());
    for fen in fens {
        engine.set_position(&fen).await?;
        let query = tokio::time::timeout(
            state.engine_timeout,
            engine.top_moves(TOP_MOVES_PER_POSITION),
        );
        let best_moves = match query.await {
            Ok(result) => result?,
            Err(_) => {
                // The dropped query leaves the search running; restore the
                // session before the lock is released so the stale output
                // cannot surface in a later request's results. A session
                // that will not settle is retired.
                if let Err(e) = engine.halt().await {
                    tracing::error!(error = %e, "Retiring engine session after failed recovery");
                    *session = None;
                }
                return Err(AppError::EngineTimeout);
            }
        };
        positions.push(PositionAnalysis { fen, best_moves });
    }

    drop(session);

    let record = AnalysisRecord {
        id: Uuid::new_v4().to_string(),
        created_at: Utc::now(),
        pgn: request.pgn,
        depth: request.depth,
        positions,
    };

    if let Some(store) = &state.store {
        let path = store.save(&record)?;
        tracing::info!(
            id = %record.id,
            positions = record.positions.len(),
            path = %path.display(),
            "Analysis persisted"
        );
    }

    Ok(record)
}
