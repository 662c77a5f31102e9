//! Thin wrapper around `shakmaty::Chess` plus the repetition bookkeeping the
//! environment contract in [`super::rules`] needs but `shakmaty::Position`
//! does not track on its own (it only ever sees one position at a time).

use shakmaty::zobrist::Zobrist64;
use shakmaty::zobrist::ZobristHash;
use shakmaty::Chess;
use shakmaty::Color;
use shakmaty::EnPassantMode;
use shakmaty::Move;
use shakmaty::Position as ShakmatyPosition;

/// A legal chess position. Equality is by FEN, not by internal
/// representation, so two positions reached by different move orders but
/// identical on the board compare equal.
#[derive(Debug, Clone)]
pub struct Position(Chess);

impl Position {
    pub fn new_game() -> Self {
        Self(Chess::default())
    }

    pub fn turn(&self) -> Color {
        self.0.turn()
    }

    pub fn board(&self) -> &shakmaty::Board {
        self.0.board()
    }

    pub fn legal_moves(&self) -> Vec<Move> {
        self.0.legal_moves().into_iter().collect()
    }

    pub fn is_checkmate(&self) -> bool {
        self.0.is_checkmate()
    }

    pub fn is_stalemate(&self) -> bool {
        self.0.is_stalemate()
    }

    pub fn is_insufficient_material(&self) -> bool {
        self.0.is_insufficient_material()
    }

    /// Halfmove clock since the last capture or pawn push; the fifty-move
    /// rule fires at 100.
    pub fn halfmove_clock(&self) -> u32 {
        self.0.halfmoves()
    }

    /// Repetition key: board + side to move + castling rights + en-passant
    /// square, exactly the FIDE repetition definition, folded into one u64
    /// via shakmaty's Zobrist hashing rather than a FEN string compare.
    pub fn repetition_key(&self) -> u64 {
        self.0.zobrist_hash::<Zobrist64>(EnPassantMode::Legal).0
    }

    pub fn fen(&self) -> String {
        shakmaty::fen::Fen::from_position(self.0.clone(), EnPassantMode::Legal).to_string()
    }

    /// Applies a legal move, returning the resulting position. Panics if
    /// `mv` is not legal in this position — callers are expected to draw
    /// moves from [`Position::legal_moves`] or decode them through
    /// [`super::codec::ActionCodec`], both of which only ever produce legal
    /// moves.
    pub fn play(&self, mv: &Move) -> Self {
        let next = self
            .0
            .clone()
            .play(mv)
            .expect("caller supplied an illegal move to Position::play");
        Self(next)
    }

    /// Escape hatch for the observation encoder, which needs a few
    /// `shakmaty::Position` accessors this wrapper doesn't otherwise expose
    /// (castling rights, en-passant square, fullmove number, check status).
    pub(crate) fn as_shakmaty(&self) -> &Chess {
        &self.0
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.fen() == other.fen()
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new_game()
    }
}

/// Per-game ply log the self-play worker threads through every `step()`
/// call so the environment can answer repetition/fifty-move questions
/// without owning its own unbounded history.
#[derive(Debug, Clone, Default)]
pub struct GameHistory {
    keys: Vec<u64>,
}

impl GameHistory {
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    pub fn push(&mut self, position: &Position) {
        self.keys.push(position.repetition_key());
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// True once the current position (already pushed) has occurred three
    /// or more times in this game.
    pub fn is_threefold_repetition(&self) -> bool {
        match self.keys.last() {
            Some(last) => self.keys.iter().filter(|k| *k == last).count() >= 3,
            None => false,
        }
    }

    pub(crate) fn last_key(&self) -> Option<u64> {
        self.keys.last().copied()
    }

    pub(crate) fn keys_iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.keys.iter().copied()
    }
}
