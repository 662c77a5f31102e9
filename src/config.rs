//! `TrainingConfig` — the single recognized configuration surface for the
//! training core. Parsing a config file, environment variables, or a
//! CLI into this struct is the caller's job; this module only owns
//! validation of the recognized fields.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExplorationStrategy {
    EpsilonGreedy,
    Boltzmann,
    Greedy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpponentStrategy {
    SelfCurrent,
    FrozenSnapshotEveryKCycles,
    BaselineHeuristic,
    CheckpointPool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub max_cycles: usize,
    pub games_per_cycle: usize,
    pub max_plies_per_game: u32,
    pub step_limit_penalty: f32,
    pub batch_size: usize,
    pub batches_per_cycle: usize,
    pub gamma: f32,
    pub target_sync_interval: usize,
    pub buffer_capacity: usize,
    pub cleanup_ratio: f32,
    pub exploration_strategy: ExplorationStrategy,
    pub epsilon_start: f32,
    pub epsilon_end: f32,
    pub epsilon_decay_steps: usize,
    pub temperature_start: f32,
    pub temperature_end: f32,
    pub temperature_decay_steps: usize,
    pub opponent_strategy: OpponentStrategy,
    pub opponent_snapshot_interval: usize,
    pub checkpoint_interval: usize,
    pub evaluation_interval: usize,
    pub evaluation_games: usize,
    pub trend_window: usize,
    pub seed: Option<i64>,
    pub worker_count: Option<usize>,
    pub deterministic: bool,
}

impl Default for TrainingConfig {
    /// Values chosen for a quick, deterministic smoke cycle, not for a
    /// real training run.
    fn default() -> Self {
        Self {
            max_cycles: 1,
            games_per_cycle: 2,
            max_plies_per_game: 4,
            step_limit_penalty: -0.5,
            batch_size: 2,
            batches_per_cycle: 1,
            gamma: 0.99,
            target_sync_interval: 1,
            buffer_capacity: 16,
            cleanup_ratio: 0.1,
            exploration_strategy: ExplorationStrategy::EpsilonGreedy,
            epsilon_start: 1.0,
            epsilon_end: 0.05,
            epsilon_decay_steps: 10_000,
            temperature_start: 1.0,
            temperature_end: 0.1,
            temperature_decay_steps: 10_000,
            opponent_strategy: OpponentStrategy::SelfCurrent,
            opponent_snapshot_interval: 5,
            checkpoint_interval: 10,
            evaluation_interval: 10,
            evaluation_games: 20,
            trend_window: 10,
            seed: Some(42),
            worker_count: None,
            deterministic: true,
        }
    }
}

impl TrainingConfig {
    /// Loads a config from a JSON file. `serde_json` is already on the
    /// dependency graph for checkpoint sidecars, so this avoids pulling in
    /// a separate config-framework dependency just for this.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// A stable fingerprint of every recognized field's JSON serialization,
    /// recorded on checkpoints so a later run can tell whether it was
    /// resumed with a matching configuration. Serde's field order is
    /// declaration order, so this is stable across runs of the same binary
    /// without needing a canonicalizing serializer.
    pub fn fingerprint(&self) -> u64 {
        let encoded = serde_json::to_vec(self).expect("TrainingConfig always serializes");
        let mut hasher = DefaultHasher::new();
        encoded.hash(&mut hasher);
        hasher.finish()
    }

    /// Number of self-play workers to spawn, resolving an unset count to
    /// the number of logical CPUs (`num_cpus::get()`), clamped so we never
    /// spawn more workers than games in a cycle.
    pub fn resolved_worker_count(&self) -> usize {
        let cores = self.worker_count.unwrap_or_else(num_cpus::get);
        cores.max(1).min(self.games_per_cycle.max(1))
    }

    /// Rejects out-of-range fields before training starts.
    pub fn validate(&self) -> anyhow::Result<()> {
        use anyhow::ensure;
        ensure!(self.max_cycles > 0, "max_cycles must be > 0");
        ensure!(self.games_per_cycle > 0, "games_per_cycle must be > 0");
        ensure!(self.max_plies_per_game > 0, "max_plies_per_game must be > 0");
        ensure!(self.step_limit_penalty <= 0.0, "step_limit_penalty must be <= 0");
        ensure!(self.batch_size > 0, "batch_size must be > 0");
        ensure!(self.batches_per_cycle > 0, "batches_per_cycle must be > 0");
        ensure!((0.0..=1.0).contains(&self.gamma), "gamma must be in [0,1]");
        ensure!(self.target_sync_interval > 0, "target_sync_interval must be > 0");
        ensure!(
            self.buffer_capacity > self.batch_size,
            "bufferCapacity must be > batchSize"
        );
        ensure!(
            self.cleanup_ratio > 0.0 && self.cleanup_ratio < 1.0,
            "cleanup_ratio must be in (0,1)"
        );
        ensure!(self.opponent_snapshot_interval > 0, "opponent_snapshot_interval must be > 0");
        ensure!(self.checkpoint_interval > 0, "checkpoint_interval must be > 0");
        ensure!(self.evaluation_interval > 0, "evaluation_interval must be > 0");
        ensure!(self.evaluation_games > 0, "evaluation_games must be > 0");
        ensure!(self.evaluation_games % 2 == 0, "evaluation_games must be even");
        ensure!(self.trend_window > 0, "trend_window must be > 0");
        if let Some(n) = self.worker_count {
            ensure!(n > 0, "worker_count must be > 0 or unset for auto");
        }
        Ok(())
    }
}
