//! Orchestrates the self-play -> replay -> update -> sync -> checkpoint
//! cycle: generate a cycle's worth of self-play games, learn from them,
//! checkpoint, and repeat until a terminal condition is reached.

use std::time::Instant;

use rand::Rng;
use shakmaty::Color;

use crate::backend::heuristic::HeuristicBackend;
use crate::backend::LearningBackend;
use crate::backend::QStats;
use crate::checkpoint::CheckpointManager;
use crate::chess::ChessEnvironment;
use crate::chess::Outcome;
use crate::config::OpponentStrategy;
use crate::config::TrainingConfig;
use crate::eval::EvaluationResult;
use crate::eval::Evaluator;
use crate::metrics::CycleMetrics;
use crate::metrics::MetricsTracker;
use crate::metrics::TerminationBreakdown;
use crate::metrics::TrainingStats;
use crate::policy::linear_decay;
use crate::policy::MaskedPolicy;
use crate::replay::PrioritizedConfig;
use crate::replay::ReplayBuffer;
use crate::selfplay::GameRecord;
use crate::selfplay::SelfPlayDriver;
use crate::validator::TrainingValidator;

/// How a finished game looks from the learner's side, independent of which
/// color it played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GameOutcome {
    Win,
    Draw,
    Loss,
}

fn classify(outcome: Option<Outcome>, learner_color: Color) -> GameOutcome {
    match outcome {
        Some(Outcome::Draw) | None => GameOutcome::Draw,
        Some(Outcome::WhiteWins) if learner_color == Color::White => GameOutcome::Win,
        Some(Outcome::BlackWins) if learner_color == Color::Black => GameOutcome::Win,
        Some(_) => GameOutcome::Loss,
    }
}

/// Why [`Trainer::train`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxCyclesReached,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub cycles_completed: usize,
    pub stop_reason: StopReason,
    pub final_mean_reward: f32,
}

pub struct Trainer {
    config: TrainingConfig,
    env: Box<dyn ChessEnvironment + Sync>,
    learner: Box<dyn LearningBackend + Sync>,
    opponent_factory: Box<dyn Fn() -> Box<dyn LearningBackend + Sync> + Send + Sync>,
    frozen_opponent: Option<Box<dyn LearningBackend + Sync>>,
    baseline_opponent: HeuristicBackend,
    checkpoint_pool: Vec<String>,
    policy: MaskedPolicy,
    buffer: ReplayBuffer,
    metrics: MetricsTracker,
    validator: TrainingValidator,
    checkpoints: CheckpointManager,
    cycle: usize,
}

impl Trainer {
    pub fn new(
        config: TrainingConfig,
        env: Box<dyn ChessEnvironment + Sync>,
        learner: Box<dyn LearningBackend + Sync>,
        opponent_factory: Box<dyn Fn() -> Box<dyn LearningBackend + Sync> + Send + Sync>,
        checkpoint_root: impl Into<std::path::PathBuf>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let buffer = if config.deterministic {
            ReplayBuffer::new(config.buffer_capacity, config.cleanup_ratio)
        } else {
            ReplayBuffer::new(config.buffer_capacity, config.cleanup_ratio)
                .with_prioritization(PrioritizedConfig::default())
        };
        let checkpoints =
            CheckpointManager::new(checkpoint_root, config.checkpoint_interval, 0.01, config.fingerprint())?;
        let metrics = MetricsTracker::new(config.trend_window);

        Ok(Self {
            config,
            env,
            learner,
            opponent_factory,
            frozen_opponent: None,
            baseline_opponent: HeuristicBackend::new(),
            checkpoint_pool: Vec::new(),
            policy: MaskedPolicy::new(),
            buffer,
            metrics,
            validator: TrainingValidator::new(),
            checkpoints,
            cycle: 0,
        })
    }

    /// Runs cycles until `max_cycles` is reached or the operator interrupts.
    /// Always writes a final checkpoint before returning, even on
    /// interruption.
    pub fn train(&mut self) -> anyhow::Result<TrainingSummary> {
        let stop_reason = loop {
            if crate::interrupted() {
                break StopReason::Interrupted;
            }
            if self.cycle >= self.config.max_cycles {
                break StopReason::MaxCyclesReached;
            }

            let metrics = self.run_cycle()?;
            log::info!("{}", metrics.summary());
            self.cycle += 1;
        };

        let final_mean_reward = self.metrics.latest().map(|m| m.mean_reward).unwrap_or(0.0);
        self.checkpoints.save_final(self.cycle, self.learner.as_ref(), final_mean_reward)?;

        Ok(TrainingSummary {
            cycles_completed: self.cycle,
            stop_reason,
            final_mean_reward,
        })
    }

    fn resolve_opponent(&mut self) -> anyhow::Result<()> {
        match self.config.opponent_strategy {
            OpponentStrategy::SelfCurrent => {}
            OpponentStrategy::FrozenSnapshotEveryKCycles => {
                if self.cycle % self.config.opponent_snapshot_interval == 0 || self.frozen_opponent.is_none() {
                    let mut frozen = (self.opponent_factory)();
                    frozen.load(&self.learner.snapshot())?;
                    self.frozen_opponent = Some(frozen);
                }
            }
            OpponentStrategy::BaselineHeuristic => {}
            OpponentStrategy::CheckpointPool => {
                if !self.checkpoint_pool.is_empty()
                    && (self.cycle % self.config.opponent_snapshot_interval == 0 || self.frozen_opponent.is_none())
                {
                    let mut rng = crate::seeded_rng(&[self.config.seed.unwrap_or(0) as u64, self.cycle as u64]);
                    let index = rng.random_range(0..self.checkpoint_pool.len());
                    let name = self.checkpoint_pool[index].clone();
                    let mut candidate = (self.opponent_factory)();
                    self.checkpoints.load_backend(&name, candidate.as_mut())?;
                    self.frozen_opponent = Some(candidate);
                }
            }
        }
        Ok(())
    }

    fn opponent(&self) -> &(dyn LearningBackend + Sync) {
        match self.config.opponent_strategy {
            OpponentStrategy::SelfCurrent => self.learner.as_ref(),
            OpponentStrategy::BaselineHeuristic => &self.baseline_opponent,
            OpponentStrategy::FrozenSnapshotEveryKCycles | OpponentStrategy::CheckpointPool => {
                self.frozen_opponent.as_deref().unwrap_or_else(|| self.learner.as_ref())
            }
        }
    }

    fn exploration_schedule(&self) -> (f32, f32) {
        let epsilon = linear_decay(
            self.config.epsilon_start,
            self.config.epsilon_end,
            self.cycle,
            self.config.epsilon_decay_steps,
        );
        let temperature = linear_decay(
            self.config.temperature_start,
            self.config.temperature_end,
            self.cycle,
            self.config.temperature_decay_steps,
        );
        (epsilon, temperature)
    }

    fn run_cycle(&mut self) -> anyhow::Result<CycleMetrics> {
        let start = Instant::now();
        self.resolve_opponent()?;
        let (epsilon, temperature) = self.exploration_schedule();
        let seed = self.config.seed.unwrap_or(0) as u64;

        let records = SelfPlayDriver::run_cycle(
            self.env.as_ref(),
            self.learner.as_ref(),
            self.opponent(),
            &self.policy,
            self.config.games_per_cycle,
            self.config.max_plies_per_game,
            self.config.step_limit_penalty,
            self.config.exploration_strategy,
            epsilon,
            temperature,
            seed.wrapping_add(self.cycle as u64),
        )?;

        let games_dropped = self.config.games_per_cycle - records.len();
        let mean_reward = if records.is_empty() {
            0.0
        } else {
            records
                .iter()
                .filter_map(|r| r.transitions.last())
                .map(|t| t.reward)
                .sum::<f32>()
                / records.len() as f32
        };

        let (wins, draws, losses_count) = tally_outcomes(&records);
        let avg_ply = if records.is_empty() {
            0.0
        } else {
            records.iter().map(|r| r.plies as f32).sum::<f32>() / records.len() as f32
        };
        let termination = records.iter().fold(TerminationBreakdown::default(), |mut acc, record| {
            if record.truncated {
                acc.step_limit += 1;
            } else {
                acc.natural += 1;
            }
            acc
        });

        for record in &records {
            for transition in &record.transitions {
                self.buffer.push(transition.clone());
            }
        }

        let mut rng = crate::seeded_rng(&[seed, self.cycle as u64, 7]);
        let mut losses = Vec::new();
        let mut grad_norms = Vec::new();
        let mut entropies = Vec::new();
        let mut q_stats = Vec::new();
        for batch_index in 0..self.config.batches_per_cycle {
            if self.buffer.len() < self.config.batch_size {
                break;
            }
            let sampled = self.buffer.sample(self.config.batch_size, &mut rng);
            let (result, td_errors) = self.learner.update(&sampled.transitions, self.config.gamma);
            if !result.loss.is_finite() || !result.grad_norm.is_finite() {
                // reject this batch's result from the cycle's own aggregates
                // rather than let one non-finite batch poison the mean for
                // batches that ran cleanly; the remaining batches still run.
                self.validator.flag_non_finite_batch(self.cycle, batch_index);
                continue;
            }
            self.buffer.update_priorities(&sampled.indices, &td_errors);
            losses.push(result.loss);
            grad_norms.push(result.grad_norm);
            entropies.push(result.entropy);
            q_stats.push(result.q_stats);
        }

        if self.cycle % self.config.target_sync_interval == 0 {
            self.learner.sync_target();
        }

        let metrics = CycleMetrics {
            cycle: self.cycle,
            games_played: records.len(),
            games_dropped,
            wins,
            draws,
            losses: losses_count,
            avg_ply,
            mean_reward,
            mean_loss: average(&losses),
            mean_grad_norm: average(&grad_norms),
            mean_entropy: average(&entropies),
            q_stats: average_q_stats(&q_stats),
            batches_processed: losses.len(),
            buffer_utilization: self.buffer.utilization(),
            illegal_argmax_rate: self.policy.illegal_argmax_rate(),
            action_diversity: self.policy.action_diversity(),
            termination,
            wall_time: start.elapsed(),
        };

        self.metrics.record(metrics);
        let reward_trend = self.metrics.trend(|m| m.mean_reward, false);
        self.validator.check(&metrics, reward_trend);

        if let Some(path) = self.checkpoints.maybe_checkpoint(self.cycle, self.learner.as_ref(), mean_reward)? {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                self.checkpoint_pool.push(stem.to_string());
            }
        }

        if self.config.evaluation_interval > 0 && self.cycle % self.config.evaluation_interval == 0 {
            let evaluation = self.run_evaluation(seed)?;
            log::info!(
                "evaluation @ cycle {}: {}/{}/{} (W/L/D), win_rate {:.3}, p={:.4}, h={:.3}, avg_game_length {:.1}",
                self.cycle,
                evaluation.wins,
                evaluation.losses,
                evaluation.draws,
                evaluation.win_rate,
                evaluation.p_value,
                evaluation.cohens_h,
                evaluation.avg_game_length,
            );
            // Promotion is gated on the evaluator's statistically-grounded
            // score against a fixed opponent, not on raw self-play reward,
            // which mixes in an opponent that is itself improving cycle to
            // cycle and so isn't a stable yardstick.
            self.checkpoints.maybe_promote(self.cycle, self.learner.as_ref(), evaluation.win_rate)?;
        }

        Ok(metrics)
    }

    fn run_evaluation(&self, seed: u64) -> anyhow::Result<EvaluationResult> {
        let records = SelfPlayDriver::run_cycle(
            self.env.as_ref(),
            self.learner.as_ref(),
            &self.baseline_opponent,
            &MaskedPolicy::new(),
            self.config.evaluation_games,
            self.config.max_plies_per_game,
            self.config.step_limit_penalty,
            crate::config::ExplorationStrategy::Greedy,
            0.0,
            1.0,
            seed.wrapping_add(0xE7A1),
        )?;

        let (wins, draws, losses) = tally_outcomes(&records);
        let total_plies: u64 = records.iter().map(|r| r.plies as u64).sum();

        Evaluator::evaluate(wins, losses, draws, total_plies)
    }
}

/// Tallies every record's outcome from the learner's perspective into
/// `(wins, draws, losses)`.
fn tally_outcomes(records: &[GameRecord]) -> (usize, usize, usize) {
    let mut wins = 0;
    let mut draws = 0;
    let mut losses = 0;
    for record in records {
        match classify(record.outcome, record.learner_color) {
            GameOutcome::Win => wins += 1,
            GameOutcome::Draw => draws += 1,
            GameOutcome::Loss => losses += 1,
        }
    }
    (wins, draws, losses)
}

fn average(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

/// Averages `mean_q`/`variance` and pools `max_q`/`min_q` across a cycle's
/// batch-level [`QStats`] into one cycle-level summary.
fn average_q_stats(stats: &[QStats]) -> QStats {
    if stats.is_empty() {
        return QStats::default();
    }
    let n = stats.len() as f32;
    QStats {
        mean_q: stats.iter().map(|s| s.mean_q).sum::<f32>() / n,
        max_q: stats.iter().map(|s| s.max_q).fold(f32::MIN, f32::max),
        min_q: stats.iter().map(|s| s.min_q).fold(f32::MAX, f32::min),
        variance: stats.iter().map(|s| s.variance).sum::<f32>() / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dqn::ManualDqnBackend;
    use crate::chess::StandardEnvironment;

    fn trainer(config: TrainingConfig, root: &std::path::Path) -> Trainer {
        Trainer::new(
            config,
            Box::new(StandardEnvironment),
            Box::new(ManualDqnBackend::new(1e-2)),
            Box::new(|| Box::new(ManualDqnBackend::new(1e-2))),
            root,
        )
        .unwrap()
    }

    #[test]
    fn a_smoke_cycle_completes_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TrainingConfig::default();
        config.max_cycles = 1;
        let mut trainer = trainer(config, dir.path());
        let summary = trainer.train().unwrap();
        assert_eq!(summary.cycles_completed, 1);
        assert_eq!(summary.stop_reason, StopReason::MaxCyclesReached);
        assert!(dir.path().join("final.bin").exists());
    }

    #[test]
    fn baseline_opponent_strategy_never_touches_the_frozen_slot() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TrainingConfig::default();
        config.max_cycles = 2;
        config.opponent_strategy = OpponentStrategy::BaselineHeuristic;
        let mut trainer = trainer(config, dir.path());
        trainer.train().unwrap();
        assert!(trainer.frozen_opponent.is_none());
    }
}
