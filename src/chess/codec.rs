//! Bijective mapping between legal chess moves and the fixed 4096-id
//! discrete action space: `id = from * 64 + to`, `from`/`to` being
//! 0..64 square indices (a1 = 0 .. h8 = 63, shakmaty's own `Square` order).
//!
//! The from/to square pair alone cannot distinguish a queen promotion from
//! an underpromotion to the same destination square, and budgeting a
//! separate id per promotion role would blow past the 4096-id space this
//! crate commits to. Queen promotion is therefore the only promotion this
//! codec ever emits or decodes; [`ActionCodec::legal_ids`] drops
//! underpromotion moves from the action list entirely rather than collide
//! them onto the queen-promotion id. This is a deliberate narrowing of full
//! chess, not an oversight — see DESIGN.md.

use shakmaty::CastlingSide;
use shakmaty::Move;
use shakmaty::Role;
use shakmaty::Square;

use super::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecError;

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "action id does not correspond to a legal move in this position")
    }
}

impl std::error::Error for CodecError {}

/// A stateless bijection between `0..4096` action ids and legal
/// [`shakmaty::Move`]s, scoped to a single position at a time.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActionCodec;

impl ActionCodec {
    fn square_index(square: Square) -> usize {
        square as usize
    }

    /// The square a move's piece lands on, resolving castling to the king's
    /// actual destination square rather than the rook's `to` (shakmaty's
    /// `Move::Castle { king, rook }` variant encodes the rook's source
    /// square in `rook`, not the king's landing square).
    fn action_squares(mv: &Move) -> (Square, Square) {
        match mv {
            Move::Normal { from, to, .. } => (*from, *to),
            Move::EnPassant { from, to } => (*from, *to),
            Move::Put { to, .. } => (*to, *to),
            Move::Castle { king, rook } => {
                let side = if rook.file() > king.file() {
                    CastlingSide::KingSide
                } else {
                    CastlingSide::QueenSide
                };
                let rank = king.rank();
                let dest_file = match side {
                    CastlingSide::KingSide => shakmaty::File::G,
                    CastlingSide::QueenSide => shakmaty::File::C,
                };
                (*king, Square::from_coords(dest_file, rank))
            }
        }
    }

    /// Whether this move is representable in the 4096-id space: every move
    /// except an underpromotion (promotion present and not to queen).
    fn is_representable(mv: &Move) -> bool {
        match mv.promotion() {
            Some(role) => role == Role::Queen,
            None => true,
        }
    }

    /// Encodes a legal move into its action id. Returns `None` for an
    /// underpromotion, which this codec never represents (see module docs).
    pub fn encode(mv: &Move) -> Option<u16> {
        if !Self::is_representable(mv) {
            return None;
        }
        let (from, to) = Self::action_squares(mv);
        Some((Self::square_index(from) * 64 + Self::square_index(to)) as u16)
    }

    /// All ids of the legal moves available in `position`, queen-promotion
    /// collapsed and underpromotions dropped, alongside their originating
    /// moves so callers can still recover the exact move to play.
    pub fn legal_ids(position: &Position) -> Vec<(u16, Move)> {
        position
            .legal_moves()
            .into_iter()
            .filter_map(|mv| Self::encode(&mv).map(|id| (id, mv)))
            .collect()
    }

    /// Decodes `id` into the legal move it names in `position`, or
    /// `CodecError` if no legal move in this position encodes to `id`.
    pub fn decode(position: &Position, id: u16) -> Result<Move, CodecError> {
        Self::legal_ids(position)
            .into_iter()
            .find(|(candidate, _)| *candidate == id)
            .map(|(_, mv)| mv)
            .ok_or(CodecError)
    }
}
