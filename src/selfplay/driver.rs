//! Fans a cycle's worth of self-play games out across a `rayon` thread
//! pool and tolerates a bounded fraction of per-game failures without
//! failing the whole cycle.

use rayon::prelude::*;
use shakmaty::Color;

use crate::backend::LearningBackend;
use crate::chess::ChessEnvironment;
use crate::config::ExplorationStrategy;
use crate::policy::MaskedPolicy;

use super::worker::GameRecord;
use super::worker::SelfPlayWorker;

/// Above this fraction of per-cycle games failing, the cycle itself is
/// treated as failed rather than silently proceeding on a shrunken sample.
const MAX_DROPPED_FRACTION: f32 = 0.5;

pub struct SelfPlayDriver;

impl SelfPlayDriver {
    /// Runs `games_per_cycle` games in parallel, returning the successful
    /// [`GameRecord`]s. Errors if more than [`MAX_DROPPED_FRACTION`] of
    /// games failed (environment bug, learner panic, etc.) rather than
    /// training on a cycle that mostly didn't happen.
    #[allow(clippy::too_many_arguments)]
    pub fn run_cycle(
        env: &(dyn ChessEnvironment + Sync),
        learner: &(dyn LearningBackend + Sync),
        opponent: &(dyn LearningBackend + Sync),
        policy: &(MaskedPolicy),
        games_per_cycle: usize,
        max_plies: u32,
        step_limit_penalty: crate::Reward,
        exploration: ExplorationStrategy,
        epsilon: f32,
        temperature: f32,
        cycle_seed: u64,
    ) -> anyhow::Result<Vec<GameRecord>> {
        let results: Vec<Option<GameRecord>> = (0..games_per_cycle)
            .into_par_iter()
            .map(|game_index| {
                let learner_color = if game_index % 2 == 0 { Color::White } else { Color::Black };
                let mut rng = crate::seeded_rng(&[cycle_seed, game_index as u64]);
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    SelfPlayWorker::play_game(
                        env,
                        learner,
                        opponent,
                        policy,
                        learner_color,
                        max_plies,
                        step_limit_penalty,
                        exploration,
                        epsilon,
                        temperature,
                        &mut rng,
                    )
                }));
                match outcome {
                    Ok(Ok(record)) => Some(record),
                    Ok(Err(error)) => {
                        log::warn!("self-play game {} failed: {:#}", game_index, error);
                        None
                    }
                    Err(_) => {
                        log::warn!("self-play game {} panicked", game_index);
                        None
                    }
                }
            })
            .collect();

        let total = results.len();
        let records: Vec<GameRecord> = results.into_iter().flatten().collect();
        let dropped = total - records.len();

        if total > 0 && dropped as f32 / total as f32 > MAX_DROPPED_FRACTION {
            anyhow::bail!(
                "self-play cycle dropped {}/{} games, exceeding the {:.0}% tolerance",
                dropped,
                total,
                MAX_DROPPED_FRACTION * 100.0
            );
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::heuristic::HeuristicBackend;
    use crate::chess::StandardEnvironment;

    #[test]
    fn a_full_cycle_produces_one_record_per_game() {
        let env = StandardEnvironment;
        let learner = HeuristicBackend::new();
        let opponent = HeuristicBackend::new();
        let policy = MaskedPolicy::new();

        let records = SelfPlayDriver::run_cycle(
            &env,
            &learner,
            &opponent,
            &policy,
            6,
            20,
            -0.5,
            ExplorationStrategy::EpsilonGreedy,
            0.3,
            1.0,
            7,
        )
        .unwrap();

        assert_eq!(records.len(), 6);
    }

    #[test]
    fn alternating_colors_balances_the_learner_across_games() {
        let env = StandardEnvironment;
        let learner = HeuristicBackend::new();
        let opponent = HeuristicBackend::new();
        let policy = MaskedPolicy::new();

        let records = SelfPlayDriver::run_cycle(
            &env,
            &learner,
            &opponent,
            &policy,
            4,
            10,
            -0.5,
            ExplorationStrategy::Greedy,
            0.0,
            1.0,
            1,
        )
        .unwrap();

        let white_games = records.iter().filter(|r| r.learner_color == Color::White).count();
        assert_eq!(white_games, 2);
    }
}
