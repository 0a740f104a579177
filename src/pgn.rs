//! PGN expansion: walk a game's main line and record the FEN of each
//! position before the move played from it, skipping side variations.

use std::ops::ControlFlow;

use pgn_reader::{RawTag, Reader, SanPlus, Skip, Visitor};
use shakmaty::{fen::Fen, CastlingMode, Chess, EnPassantMode, Position};

use crate::error::AppError;

/// Hard cap on main-line length, against pathological input.
const MAX_PLIES: usize = 1024;

/// Visitor that collects the FEN before every main-line move.
#[derive(Default)]
struct MainLineFens {
    fens: Vec<String>,
    start_fen: Option<String>,
    error: Option<String>,
}

fn fen_of(board: &Chess) -> String {
    Fen::from_position(board, EnPassantMode::Legal).to_string()
}

impl Visitor for MainLineFens {
    type Tags = Option<Chess>;
    type Movetext = Chess;
    type Output = ();

    fn begin_tags(&mut self) -> ControlFlow<(), Self::Tags> {
        ControlFlow::Continue(None)
    }

    fn tag(&mut self, tags: &mut Self::Tags, name: &[u8], value: RawTag<'_>) -> ControlFlow<()> {
        // A FEN tag seeds a non-standard starting position.
        if name == b"FEN" {
            let parsed = value
                .decode_utf8_lossy()
                .parse::<Fen>()
                .ok()
                .and_then(|fen| fen.into_position(CastlingMode::Standard).ok());
            match parsed {
                Some(pos) => *tags = Some(pos),
                None => {
                    self.error = Some("unreadable FEN tag".to_string());
                    return ControlFlow::Break(());
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Self::Tags) -> ControlFlow<(), Chess> {
        let board = tags.unwrap_or_default();
        self.start_fen = Some(fen_of(&board));
        ControlFlow::Continue(board)
    }

    fn begin_variation(&mut self, _board: &mut Chess) -> ControlFlow<(), Skip> {
        // Main line only
        ControlFlow::Continue(Skip(true))
    }

    fn san(&mut self, board: &mut Chess, san_plus: SanPlus) -> ControlFlow<()> {
        if self.fens.len() >= MAX_PLIES {
            self.error = Some(format!("game exceeds {MAX_PLIES} plies"));
            return ControlFlow::Break(());
        }

        let mv = match san_plus.san.to_move(board) {
            Ok(mv) => mv,
            Err(_) => {
                self.error = Some(format!("illegal move {san_plus}"));
                return ControlFlow::Break(());
            }
        };

        // Position before the move, matching the main-line walk order.
        self.fens.push(fen_of(board));

        match board.clone().play(mv) {
            Ok(next) => *board = next,
            Err(_) => {
                self.error = Some(format!("illegal move {san_plus}"));
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    fn end_game(&mut self, _board: Chess) {}
}

/// Expand a PGN into the ordered FENs of its main line.
///
/// Returns one FEN per main-line move (recorded before the move); a game
/// with no moves yields exactly the starting position. Empty input, an
/// unreadable FEN tag or an illegal move is a `BadRequest`.
pub fn pgn_to_fens(pgn: &str) -> Result<Vec<String>, AppError> {
    let mut reader = Reader::new(pgn.as_bytes());
    let mut visitor = MainLineFens::default();

    let game = reader
        .read_game(&mut visitor)
        .map_err(anyhow::Error::from)?;

    if let Some(reason) = visitor.error {
        return Err(AppError::BadRequest(format!("Invalid PGN: {reason}")));
    }
    if game.is_none() {
        return Err(AppError::BadRequest("PGN contains no game".to_string()));
    }

    if visitor.fens.is_empty() {
        // Zero-move game: a single-position analysis of the start.
        let start = visitor.start_fen.unwrap_or_else(|| fen_of(&Chess::default()));
        return Ok(vec![start]);
    }

    Ok(visitor.fens)
}
