//! A frozen, non-trainable backend that scores moves by simple
//! material-and-center heuristics instead of a learned value function.
//! Serves as this crate's `BaselineHeuristic` opponent strategy.

use super::BatchResult;
use super::LearningBackend;
use super::QStats;
use crate::replay::Transition;
use crate::ACTION_SPACE;

const PIECE_PLANES_LEN: usize = 768;
const SIDE_TO_MOVE_INDEX: usize = PIECE_PLANES_LEN;

/// Per-role material value in the same `[Pawn, Knight, Bishop, Rook,
/// Queen, King]` order [`crate::chess::observation`] lays its planes out
/// in.
const ROLE_VALUES: [f32; 6] = [1.0, 3.0, 3.0, 5.0, 9.0, 0.0];

const CENTER_SQUARES: [usize; 4] = [
    27, // d4
    28, // e4
    35, // d5
    36, // e5
];

#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicBackend;

impl HeuristicBackend {
    pub fn new() -> Self {
        Self
    }

    fn score(&self, observation: &[f32], action: u16) -> f32 {
        let to_square = action as usize % 64;
        let mover_is_white = observation[SIDE_TO_MOVE_INDEX] >= 0.5;
        let opponent_color_idx = if mover_is_white { 1 } else { 0 };

        let capture_value = (0..6)
            .map(|role_idx| {
                let plane = role_idx * 2 + opponent_color_idx;
                let occupied = observation[plane * 64 + to_square] > 0.5;
                if occupied {
                    ROLE_VALUES[role_idx]
                } else {
                    0.0
                }
            })
            .fold(0.0, f32::max);

        let center_bonus = if CENTER_SQUARES.contains(&to_square) { 0.1 } else { 0.0 };

        capture_value + center_bonus
    }
}

impl LearningBackend for HeuristicBackend {
    fn q_values(&self, observation: &[f32]) -> Vec<f32> {
        (0..ACTION_SPACE as u16).map(|action| self.score(observation, action)).collect()
    }

    fn target_q_values(&self, observation: &[f32]) -> Vec<f32> {
        self.q_values(observation)
    }

    fn update(&mut self, _batch: &[Transition], _gamma: f32) -> (BatchResult, Vec<f32>) {
        (
            BatchResult { loss: 0.0, q_stats: QStats::default(), grad_norm: 0.0, entropy: 0.0 },
            Vec::new(),
        )
    }

    fn sync_target(&mut self) {}

    fn snapshot(&self) -> Vec<u8> {
        Vec::new()
    }

    fn load(&mut self, _bytes: &[u8]) -> anyhow::Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "baseline_heuristic"
    }
}
