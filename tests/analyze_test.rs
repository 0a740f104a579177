//! Orchestrator tests against a stub engine session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use webfish::analysis::{analyze, AnalysisRequest};
use webfish::engine::{MoveRecommendation, UciEngine};
use webfish::error::AppError;
use webfish::storage::AnalysisStore;
use webfish::AppState;

/// Engine stub that echoes the FEN it was last given, so cross-request
/// interleaving shows up as mismatched recommendations.
struct StubEngine {
    current_fen: String,
    query_delay: Duration,
}

impl StubEngine {
    fn new() -> Self {
        Self {
            current_fen: String::new(),
            query_delay: Duration::ZERO,
        }
    }

    fn with_delay(delay: Duration) -> Self {
        Self {
            current_fen: String::new(),
            query_delay: delay,
        }
    }
}

#[async_trait]
impl UciEngine for StubEngine {
    async fn set_depth(&mut self, _depth: u32) -> Result<(), AppError> {
        Ok(())
    }

    async fn set_position(&mut self, fen: &str) -> Result<(), AppError> {
        self.current_fen = fen.to_string();
        Ok(())
    }

    async fn top_moves(&mut self, count: u32) -> Result<Vec<MoveRecommendation>, AppError> {
        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }
        let ranked = vec![
            MoveRecommendation {
                uci: format!("best:{}", self.current_fen),
                centipawn: Some(52),
                mate: None,
            },
            MoveRecommendation {
                uci: format!("second:{}", self.current_fen),
                centipawn: Some(33),
                mate: None,
            },
            MoveRecommendation {
                uci: format!("third:{}", self.current_fen),
                centipawn: None,
                mate: Some(-2),
            },
        ];
        Ok(ranked.into_iter().take(count as usize).collect())
    }
}

/// Engine stub that models the session's stdout pipe: a query abandoned
/// mid-search leaves its results queued, and the next read returns them
/// unless the session is halted first.
struct PipeModelEngine {
    current_fen: String,
    stale: Option<MoveRecommendation>,
    wedge_next_query: bool,
}

impl PipeModelEngine {
    fn new() -> Self {
        Self {
            current_fen: String::new(),
            stale: None,
            wedge_next_query: true,
        }
    }
}

#[async_trait]
impl UciEngine for PipeModelEngine {
    async fn set_depth(&mut self, _depth: u32) -> Result<(), AppError> {
        Ok(())
    }

    async fn set_position(&mut self, fen: &str) -> Result<(), AppError> {
        self.current_fen = fen.to_string();
        Ok(())
    }

    async fn top_moves(&mut self, _count: u32) -> Result<Vec<MoveRecommendation>, AppError> {
        if let Some(stale) = self.stale.take() {
            // Leftover output from the abandoned search
            return Ok(vec![stale]);
        }
        if self.wedge_next_query {
            self.wedge_next_query = false;
            // The search will eventually write its result into the pipe
            // even though the caller has stopped waiting.
            self.stale = Some(MoveRecommendation {
                uci: "stale:firstmove".to_string(),
                centipawn: Some(99),
                mate: None,
            });
            tokio::time::sleep(Duration::from_secs(60)).await;
            self.stale = None;
        }
        Ok(vec![MoveRecommendation {
            uci: format!("best:{}", self.current_fen),
            centipawn: Some(52),
            mate: None,
        }])
    }

    async fn halt(&mut self) -> Result<(), AppError> {
        // stop + drain discards the pending output
        self.stale = None;
        Ok(())
    }
}

fn state_with(engine: Option<Box<dyn UciEngine>>) -> AppState {
    AppState {
        engine: Arc::new(Mutex::new(engine)),
        store: None,
        max_depth: 30,
        engine_timeout: Duration::from_secs(5),
    }
}

fn request(pgn: &str) -> AnalysisRequest {
    AnalysisRequest {
        pgn: pgn.to_string(),
        depth: 18,
    }
}

#[tokio::test]
async fn test_analyze_returns_ranked_moves_per_position() {
    let state = state_with(Some(Box::new(StubEngine::new())));

    let record = analyze(&state, request("1. e4 e5 2. Nf3")).await.unwrap();

    assert_eq!(record.depth, 18);
    assert_eq!(record.pgn, "1. e4 e5 2. Nf3");
    assert_eq!(record.positions.len(), 3);

    for position in &record.positions {
        assert!(position.best_moves.len() <= 3);
        // Engine ranking preserved, best first
        assert_eq!(position.best_moves[0].uci, format!("best:{}", position.fen));
        assert_eq!(position.best_moves[0].centipawn, Some(52));
        assert_eq!(position.best_moves[1].centipawn, Some(33));
        assert_eq!(position.best_moves[2].mate, Some(-2));
    }
}

#[tokio::test]
async fn test_zero_move_game_is_a_single_position_analysis() {
    let state = state_with(Some(Box::new(StubEngine::new())));

    let record = analyze(&state, request("[Event \"x\"]\n\n*")).await.unwrap();

    assert_eq!(record.positions.len(), 1);
    assert!(record.positions[0].fen.starts_with("rnbqkbnr/pppppppp/"));
}

#[tokio::test]
async fn test_unparsable_pgn_is_a_bad_request() {
    let state = state_with(Some(Box::new(StubEngine::new())));

    let err = analyze(&state, request("1. e5 e4")).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_unavailable_engine_fails_before_pgn_expansion() {
    let state = state_with(None);

    // Even a PGN that would fail expansion reports unavailability,
    // proving the engine check runs first.
    let err = analyze(&state, request("1. e5 e4")).await.unwrap_err();
    assert!(matches!(err, AppError::EngineUnavailable));
}

#[tokio::test]
async fn test_slow_engine_query_times_out() {
    let mut state = state_with(Some(Box::new(StubEngine::with_delay(Duration::from_millis(
        200,
    )))));
    state.engine_timeout = Duration::from_millis(20);

    let err = analyze(&state, request("1. e4")).await.unwrap_err();
    assert!(matches!(err, AppError::EngineTimeout));
}

#[tokio::test]
async fn test_timed_out_query_does_not_leak_into_later_requests() {
    let mut state = state_with(Some(Box::new(PipeModelEngine::new())));
    state.engine_timeout = Duration::from_millis(20);

    let err = analyze(&state, request("1. e4")).await.unwrap_err();
    assert!(matches!(err, AppError::EngineTimeout));

    // The failure is terminal for that request only: the same session must
    // serve the next request from a clean slate, never surfacing the
    // abandoned search's output as this request's recommendations.
    state.engine_timeout = Duration::from_secs(5);
    let record = analyze(&state, request("1. d4 d5")).await.unwrap();

    assert_eq!(record.positions.len(), 2);
    for position in &record.positions {
        assert_eq!(position.best_moves[0].uci, format!("best:{}", position.fen));
    }
}

#[tokio::test]
async fn test_analyze_persists_the_returned_record() {
    let dir = std::env::temp_dir().join(format!("webfish-it-{}", unique_suffix()));
    let mut state = state_with(Some(Box::new(StubEngine::new())));
    state.store = Some(Arc::new(AnalysisStore::new(&dir)));

    let record = analyze(&state, request("1. e4 e5")).await.unwrap();

    let mut files: Vec<_> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);

    let loaded = AnalysisStore::load(&files.pop().unwrap()).unwrap();
    assert_eq!(loaded, record);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_concurrent_requests_never_cross_attribute_recommendations() {
    let state = state_with(Some(Box::new(StubEngine::with_delay(Duration::from_millis(
        2,
    )))));

    let openings = [
        "1. e4 e5", "1. d4 d5", "1. c4 e5", "1. Nf3 d5", "1. g3 g6", "1. b3 e5", "1. f4 d5",
        "1. e4 c5",
    ];

    let mut tasks = Vec::new();
    for pgn in openings {
        let state = state.clone();
        tasks.push(tokio::spawn(async move {
            analyze(&state, request(pgn)).await
        }));
    }

    for task in tasks {
        let record = task.await.unwrap().unwrap();
        // Every recommendation must have been produced for the position it
        // is attached to; interleaved sessions would mix FENs across
        // requests.
        for position in &record.positions {
            assert_eq!(position.best_moves[0].uci, format!("best:{}", position.fen));
        }
    }
}

/// Timestamp-based suffix so parallel test runs never share a directory.
fn unique_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{ts}")
}
