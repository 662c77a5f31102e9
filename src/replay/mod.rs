//! Circular experience buffer feeding mini-batch updates. Storage is a
//! plain `VecDeque` with FIFO-with-batched-cleanup eviction, so a long
//! training run isn't paying a `pop_front` on every single push once the
//! buffer is full.

use std::collections::VecDeque;

use rand::Rng;

use crate::chess::Observation;
use crate::Probability;
use crate::Reward;

/// One `(s, a, r, s', done)` tuple plus the legal action ids available in
/// `next_observation`, so a masked target-Q computation never needs to
/// re-derive legality from the position.
#[derive(Debug, Clone)]
pub struct Transition {
    pub observation: Observation,
    pub action: u16,
    pub reward: Reward,
    pub next_observation: Observation,
    pub next_legal_actions: Vec<u16>,
    pub done: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PrioritizedConfig {
    pub alpha: f32,
    pub beta: f32,
    pub epsilon: f32,
}

impl Default for PrioritizedConfig {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            beta: 0.4,
            epsilon: 1e-3,
        }
    }
}

/// A sampled mini-batch, carrying the indices sampled (so their priorities
/// can be refreshed after the backend reports TD-errors) and the
/// importance-sampling weight of each entry (all `1.0` under uniform
/// sampling).
pub struct SampledBatch {
    pub transitions: Vec<Transition>,
    pub indices: Vec<usize>,
    pub weights: Vec<Probability>,
}

pub struct ReplayBuffer {
    capacity: usize,
    cleanup_ratio: f32,
    prioritized: Option<PrioritizedConfig>,
    storage: VecDeque<Transition>,
    priorities: VecDeque<f32>,
}

impl ReplayBuffer {
    pub fn new(capacity: usize, cleanup_ratio: f32) -> Self {
        assert!(capacity > 0, "replay buffer capacity must be > 0");
        assert!(
            cleanup_ratio > 0.0 && cleanup_ratio < 1.0,
            "cleanup_ratio must be in (0,1)"
        );
        Self {
            capacity,
            cleanup_ratio,
            prioritized: None,
            storage: VecDeque::with_capacity(capacity),
            priorities: VecDeque::with_capacity(capacity),
        }
    }

    pub fn with_prioritization(mut self, config: PrioritizedConfig) -> Self {
        self.prioritized = Some(config);
        self
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn utilization(&self) -> f32 {
        self.storage.len() as f32 / self.capacity as f32
    }

    /// Appends a transition, giving it the maximum priority currently in the
    /// buffer so every fresh transition is sampled at least once before its
    /// priority is refined by a real TD-error (standard PER bootstrap).
    pub fn push(&mut self, transition: Transition) {
        if self.storage.len() >= self.capacity {
            self.cleanup();
        }
        let max_priority = self.priorities.iter().cloned().fold(1.0f32, f32::max);
        self.storage.push_back(transition);
        self.priorities.push_back(max_priority);
    }

    /// Drops the oldest `cleanup_ratio` fraction of entries in one sweep
    /// rather than evicting one-for-one, so a long training run isn't
    /// paying a `pop_front` on every single push once it's full.
    fn cleanup(&mut self) {
        let drop_count = ((self.capacity as f32 * self.cleanup_ratio).ceil() as usize).max(1);
        for _ in 0..drop_count.min(self.storage.len()) {
            self.storage.pop_front();
            self.priorities.pop_front();
        }
    }

    /// Draws `batch_size` transitions, without replacement while the buffer
    /// holds at least that many, and with replacement otherwise (a buffer
    /// not yet full enough still has to produce a complete batch). Returns
    /// an empty batch for `batch_size == 0`.
    pub fn sample(&self, batch_size: usize, rng: &mut impl Rng) -> SampledBatch {
        if batch_size == 0 || self.storage.is_empty() {
            return SampledBatch { transitions: Vec::new(), indices: Vec::new(), weights: Vec::new() };
        }

        let indices = match self.prioritized {
            Some(config) => self.sample_prioritized_indices(batch_size, config, rng),
            None => self.sample_uniform_indices(batch_size, rng),
        };

        let weights = match self.prioritized {
            Some(config) => self.importance_weights(&indices, config),
            None => vec![1.0; indices.len()],
        };

        let transitions = indices.iter().map(|&i| self.storage[i].clone()).collect();

        SampledBatch { transitions, indices, weights }
    }

    fn sample_uniform_indices(&self, batch_size: usize, rng: &mut impl Rng) -> Vec<usize> {
        let len = self.storage.len();
        if batch_size > len {
            return (0..batch_size).map(|_| rng.random_range(0..len)).collect();
        }
        let mut pool: Vec<usize> = (0..len).collect();
        let mut out = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            let pick = rng.random_range(0..pool.len());
            out.push(pool.swap_remove(pick));
        }
        out
    }

    fn sample_prioritized_indices(
        &self,
        batch_size: usize,
        config: PrioritizedConfig,
        rng: &mut impl Rng,
    ) -> Vec<usize> {
        let weights: Vec<f32> = self
            .priorities
            .iter()
            .map(|p| (p + config.epsilon).powf(config.alpha))
            .collect();
        let total: f32 = weights.iter().sum();

        let mut out = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            let mut draw = rng.random_range(0.0..total.max(f32::MIN_POSITIVE));
            let mut chosen = weights.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                if draw <= *w {
                    chosen = i;
                    break;
                }
                draw -= w;
            }
            out.push(chosen);
        }
        out
    }

    /// Importance-sampling correction weights, normalized so the maximum
    /// weight in the batch is exactly 1.0 (standard PER stabilization).
    fn importance_weights(&self, indices: &[usize], config: PrioritizedConfig) -> Vec<f32> {
        let n = self.storage.len() as f32;
        let total_priority: f32 = self
            .priorities
            .iter()
            .map(|p| (p + config.epsilon).powf(config.alpha))
            .sum();

        let raw: Vec<f32> = indices
            .iter()
            .map(|&i| {
                let priority = (self.priorities[i] + config.epsilon).powf(config.alpha);
                let probability = priority / total_priority;
                (n * probability).powf(-config.beta)
            })
            .collect();

        let max_weight = raw.iter().cloned().fold(f32::MIN_POSITIVE, f32::max);
        raw.into_iter().map(|w| w / max_weight).collect()
    }

    /// Refreshes the priorities of previously sampled `indices` with new
    /// absolute TD-errors. No-op under uniform sampling.
    pub fn update_priorities(&mut self, indices: &[usize], td_errors: &[f32]) {
        if self.prioritized.is_none() {
            return;
        }
        for (&index, &error) in indices.iter().zip(td_errors) {
            if let Some(slot) = self.priorities.get_mut(index) {
                *slot = error.abs();
            }
        }
    }
}
