//! Deterministic feature-vector encoding of a chess position. The
//! same `(Position, GameHistory)` pair always produces the same
//! `Observation`; no randomness, no hidden state.
//!
//! Layout (839 = 768 + 71):
//!   - 768: twelve 64-square piece planes, one per (role, color) pair, in
//!     `Role::ALL x [White, Black]` order, each plane a one-hot occupancy
//!     mask over `Square as usize` index order (a1 = 0 .. h8 = 63).
//!   - 71 auxiliary scalars, broken into the groups documented inline below.

use shakmaty::Color;
use shakmaty::EnPassantMode;
use shakmaty::Position as ShakmatyPosition;
use shakmaty::Role;

use super::position::GameHistory;
use super::position::Position;

const ROLES: [Role; 6] = [
    Role::Pawn,
    Role::Knight,
    Role::Bishop,
    Role::Rook,
    Role::Queen,
    Role::King,
];

const PIECE_PLANES_LEN: usize = 12 * 64;
const AUX_LEN: usize = crate::OBSERVATION_LEN - PIECE_PLANES_LEN;

/// A fixed-length, deterministic feature vector. Wraps a boxed array so the
/// type stays `Clone`-cheap-ish and its length is enforced at the type
/// level rather than by convention.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation(pub Box<[f32; crate::OBSERVATION_LEN]>);

impl Observation {
    pub fn as_slice(&self) -> &[f32] {
        self.0.as_slice()
    }

    pub fn len(&self) -> usize {
        crate::OBSERVATION_LEN
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn encode(position: &Position, history: &GameHistory) -> Self {
        let mut features = vec![0.0f32; crate::OBSERVATION_LEN];

        let mut pawn_files = [[0u8; 8]; 2];
        let mut king_square = [None::<usize>; 2];
        let mut piece_counts = [[0u32; 6]; 2];

        for (square, piece) in position.board() {
            let color_idx = color_index(piece.color);
            let role_idx = ROLES.iter().position(|r| *r == piece.role).unwrap();
            let plane = role_idx * 2 + color_idx;
            let square_idx = square as usize;
            features[plane * 64 + square_idx] = 1.0;

            piece_counts[color_idx][role_idx] += 1;
            if piece.role == Role::Pawn {
                pawn_files[color_idx][square.file() as usize] += 1;
            }
            if piece.role == Role::King {
                king_square[color_idx] = Some(square.file() as usize);
            }
        }

        let mut aux = [0.0f32; AUX_LEN];
        let mut cursor = 0usize;

        // side to move (1)
        aux[cursor] = if position.turn() == Color::White { 1.0 } else { 0.0 };
        cursor += 1;

        // castling rights: white K, white Q, black k, black q (4)
        for (color, side) in [
            (Color::White, shakmaty::CastlingSide::KingSide),
            (Color::White, shakmaty::CastlingSide::QueenSide),
            (Color::Black, shakmaty::CastlingSide::KingSide),
            (Color::Black, shakmaty::CastlingSide::QueenSide),
        ] {
            aux[cursor] = if position.castling_rights(color, side) { 1.0 } else { 0.0 };
            cursor += 1;
        }

        // en passant file one-hot + "none" bit (9)
        match position.ep_square_file() {
            Some(file) => aux[cursor + file] = 1.0,
            None => aux[cursor + 8] = 1.0,
        }
        cursor += 9;

        // halfmove clock, normalized against the fifty-move threshold (1)
        aux[cursor] = (position.halfmove_clock() as f32 / 100.0).min(1.0);
        cursor += 1;

        // fullmove number, normalized against a generous game-length cap (1)
        aux[cursor] = (position.fullmove_number() as f32 / 200.0).min(1.0);
        cursor += 1;

        // side to move is in check (1)
        aux[cursor] = if position.is_in_check() { 1.0 } else { 0.0 };
        cursor += 1;

        // repetition count of the current position, one-hot over {1, 2, >=3} (3)
        let repetition_count = history.occurrences_of_last();
        aux[cursor + repetition_count.min(3).saturating_sub(1)] = 1.0;
        cursor += 3;

        // material diff per role, white count minus black count (6)
        for role_idx in 0..6 {
            aux[cursor + role_idx] =
                piece_counts[0][role_idx] as f32 - piece_counts[1][role_idx] as f32;
        }
        cursor += 6;

        // pawn count per file, white then black (8 + 8)
        for file in 0..8 {
            aux[cursor + file] = pawn_files[0][file] as f32;
        }
        cursor += 8;
        for file in 0..8 {
            aux[cursor + file] = pawn_files[1][file] as f32;
        }
        cursor += 8;

        // king file one-hot, white then black (8 + 8)
        if let Some(file) = king_square[0] {
            aux[cursor + file] = 1.0;
        }
        cursor += 8;
        if let Some(file) = king_square[1] {
            aux[cursor + file] = 1.0;
        }
        cursor += 8;

        // side-to-move mobility, normalized against the widest known legal
        // move count in any reachable chess position (1)
        aux[cursor] = (position.legal_moves().len() as f32 / 218.0).min(1.0);
        cursor += 1;

        // bishop pair present, white then black (1 + 1)
        aux[cursor] = if has_bishop_pair(position, Color::White) { 1.0 } else { 0.0 };
        cursor += 1;
        aux[cursor] = if has_bishop_pair(position, Color::Black) { 1.0 } else { 0.0 };
        cursor += 1;

        // insufficient-material flag (1)
        aux[cursor] = if position.is_insufficient_material() { 1.0 } else { 0.0 };
        cursor += 1;

        // reserved zero-padding, kept so the vector length is stable across
        // future feature additions without renumbering everything above (9)
        cursor += 9;

        debug_assert_eq!(cursor, AUX_LEN);

        features[PIECE_PLANES_LEN..].copy_from_slice(&aux);

        let boxed: Box<[f32; crate::OBSERVATION_LEN]> = features
            .into_boxed_slice()
            .try_into()
            .unwrap_or_else(|_| unreachable!("length is fixed by construction"));
        Self(boxed)
    }
}

fn color_index(color: Color) -> usize {
    match color {
        Color::White => 0,
        Color::Black => 1,
    }
}

fn has_bishop_pair(position: &Position, color: Color) -> bool {
    let mut light = false;
    let mut dark = false;
    for (square, piece) in position.board() {
        if piece.role == Role::Bishop && piece.color == color {
            let is_light = (square.file() as usize + square.rank() as usize) % 2 == 1;
            if is_light {
                light = true;
            } else {
                dark = true;
            }
        }
    }
    light && dark
}

impl GameHistory {
    /// How many times the most recently pushed position has occurred so
    /// far in this game, at least 1 once any position has been pushed.
    pub fn occurrences_of_last(&self) -> usize {
        match self.last_key() {
            Some(last) => self.keys_iter().filter(|k| *k == last).count().max(1),
            None => 0,
        }
    }
}

impl Position {
    fn castling_rights(&self, color: Color, side: shakmaty::CastlingSide) -> bool {
        self.as_shakmaty().castles().has(color, side)
    }

    fn ep_square_file(&self) -> Option<usize> {
        self.as_shakmaty()
            .ep_square(EnPassantMode::Legal)
            .map(|sq| sq.file() as usize)
    }

    fn fullmove_number(&self) -> u32 {
        self.as_shakmaty().fullmoves().get()
    }

    fn is_in_check(&self) -> bool {
        self.as_shakmaty().is_check()
    }
}
