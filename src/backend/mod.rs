//! The pluggable learning capability. Everything in this crate that isn't
//! `LearningBackend` itself only ever sees `q_values`/`update`/
//! `sync_target`/snapshot-load — the actual function approximator stays a
//! black box behind this trait.

pub mod dqn;
pub mod heuristic;

use crate::replay::Transition;
use crate::Reward;

/// Summary statistics for the action-value estimates a backend currently
/// holds over a batch, logged alongside [`BatchResult`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QStats {
    pub mean_q: f32,
    pub max_q: f32,
    pub min_q: f32,
    pub variance: f32,
}

impl QStats {
    pub fn from_values(values: &[f32]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let sum: f32 = values.iter().sum();
        let mean_q = sum / values.len() as f32;
        let variance = values.iter().map(|v| (v - mean_q).powi(2)).sum::<f32>() / values.len() as f32;
        Self {
            mean_q,
            max_q: values.iter().cloned().fold(f32::MIN, f32::max),
            min_q: values.iter().cloned().fold(f32::MAX, f32::min),
            variance,
        }
    }
}

/// The outcome of one mini-batch update, the unit [`crate::metrics`] rolls
/// up into a [`crate::metrics::CycleMetrics`] and [`crate::validator`]
/// inspects for numerical pathology.
#[derive(Debug, Clone, Copy)]
pub struct BatchResult {
    pub loss: f32,
    pub q_stats: QStats,
    pub grad_norm: f32,
    /// Shannon entropy (nats) of the batch's mean action-probability
    /// distribution, the signal [`crate::validator`] watches to catch the
    /// policy collapsing onto a single action.
    pub entropy: f32,
}

/// A pluggable, trainable mapping from observations to per-action values.
/// Implementations are free to be a linear approximator, a lookup table, or
/// an FFI bridge to a real tensor library — this crate's training core only
/// ever talks to the trait.
pub trait LearningBackend: Send + Sync {
    /// Action-value estimate for every id in the fixed action space, using
    /// the *online* network (as opposed to the target network used for
    /// bootstrapped targets).
    fn q_values(&self, observation: &[f32]) -> Vec<f32>;

    /// Action-value estimate for every id in the fixed action space, using
    /// the frozen target network ([`LearningBackend::sync_target`]).
    fn target_q_values(&self, observation: &[f32]) -> Vec<f32>;

    /// Softmax of the online Q-values, the action-probability distribution
    /// entropy is measured against. Backends with a more direct notion of a
    /// policy distribution may override this; the default derives one from
    /// `q_values` so every backend satisfies the capability.
    fn action_probabilities(&self, observation: &[f32]) -> Vec<f32> {
        softmax(&self.q_values(observation))
    }

    /// One gradient step against a mini-batch of transitions, discounting
    /// bootstrapped targets by `gamma`. Returns per-batch diagnostics and
    /// the per-transition absolute TD-errors (for prioritized replay).
    fn update(&mut self, batch: &[Transition], gamma: f32) -> (BatchResult, Vec<f32>);

    /// Copies the online network's parameters into the target network,
    /// called every `target_sync_interval` cycles.
    fn sync_target(&mut self);

    /// Serializes the backend's parameters (online + target) for a
    /// checkpoint.
    fn snapshot(&self) -> Vec<u8>;

    /// Restores parameters previously produced by [`LearningBackend::snapshot`].
    fn load(&mut self, bytes: &[u8]) -> anyhow::Result<()>;

    /// A stable identifier for the concrete backend implementation, recorded
    /// on every [`crate::checkpoint::CheckpointMetadata`] so a loaded
    /// checkpoint can be cross-checked against the backend trying to load
    /// it.
    fn backend_name(&self) -> &'static str {
        "unknown"
    }
}

/// Bellman target for one transition given a backend's target-network
/// Q-values over the next state's legal actions, shared by every backend so
/// the discounting math only lives in one place.
pub fn bootstrapped_target(reward: Reward, gamma: f32, done: bool, next_q_masked_max: f32) -> f32 {
    if done {
        reward
    } else {
        reward + gamma * next_q_masked_max
    }
}

pub fn masked_max(q_values: &[f32], legal_actions: &[u16]) -> f32 {
    legal_actions
        .iter()
        .map(|&id| q_values[id as usize])
        .fold(f32::MIN, f32::max)
}

/// Numerically stable softmax, shared by every backend's default
/// [`LearningBackend::action_probabilities`].
pub fn softmax(values: &[f32]) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }
    let max = values.iter().cloned().fold(f32::MIN, f32::max);
    let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return vec![1.0 / values.len() as f32; values.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

/// Shannon entropy in nats of a probability distribution. Zero-probability
/// entries are skipped rather than producing `NaN` from `0 * ln(0)`.
pub fn entropy_of(probabilities: &[f32]) -> f32 {
    probabilities.iter().filter(|&&p| p > 0.0).map(|&p| -p * p.ln()).sum()
}
