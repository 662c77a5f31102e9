//! Turns a backend's full-action-space Q-values into one legal action id.
//! Exploration strategy is a small enum rather than a trait, since (unlike
//! [`crate::backend`]) there is nothing here a caller would plausibly want
//! to implement externally.

use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use rand::Rng;

use crate::config::ExplorationStrategy;

/// How many of the most recent action selections [`MaskedPolicy::action_diversity`]
/// reports the unique/total ratio over.
const ACTION_DIVERSITY_WINDOW: usize = 500;

/// Selects legal actions from a backend's Q-value vector, exploring by
/// `strategy`, and counts how often the backend's unmasked argmax would
/// have landed outside the legal set (a validator-facing signal that the
/// backend hasn't yet learned legality at all). Also tracks the diversity
/// of its own recent choices, a signal of the policy collapsing onto a
/// handful of actions regardless of position.
#[derive(Default)]
pub struct MaskedPolicy {
    illegal_argmax_count: AtomicUsize,
    decision_count: AtomicUsize,
    recent_actions: Mutex<VecDeque<u16>>,
}

impl MaskedPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn illegal_argmax_count(&self) -> usize {
        self.illegal_argmax_count.load(Ordering::Relaxed)
    }

    pub fn decision_count(&self) -> usize {
        self.decision_count.load(Ordering::Relaxed)
    }

    pub fn illegal_argmax_rate(&self) -> f32 {
        let decisions = self.decision_count();
        if decisions == 0 {
            0.0
        } else {
            self.illegal_argmax_count() as f32 / decisions as f32
        }
    }

    /// Unique/total ratio of action ids over the last
    /// [`ACTION_DIVERSITY_WINDOW`] selections, or `None` before that many
    /// have been made.
    pub fn action_diversity(&self) -> Option<f32> {
        let recent = self.recent_actions.lock().expect("recent_actions mutex is never poisoned");
        if recent.len() < ACTION_DIVERSITY_WINDOW {
            return None;
        }
        let unique: HashSet<u16> = recent.iter().copied().collect();
        Some(unique.len() as f32 / recent.len() as f32)
    }

    fn record_action(&self, action: u16) {
        let mut recent = self.recent_actions.lock().expect("recent_actions mutex is never poisoned");
        if recent.len() == ACTION_DIVERSITY_WINDOW {
            recent.pop_front();
        }
        recent.push_back(action);
    }

    /// Picks one action id from `legal_actions`, using `q_values` (indexed
    /// by the full 4096-id action space) as the preference signal. Panics
    /// if `legal_actions` is empty — the environment guarantees at least
    /// one legal action in any non-terminal position, so an empty mask
    /// reaching here is a caller bug, not a runtime condition to recover
    /// from.
    pub fn select(
        &self,
        q_values: &[f32],
        legal_actions: &[u16],
        strategy: ExplorationStrategy,
        epsilon: f32,
        temperature: f32,
        rng: &mut impl Rng,
    ) -> u16 {
        assert!(!legal_actions.is_empty(), "cannot select from an empty legal action set");

        self.decision_count.fetch_add(1, Ordering::Relaxed);
        self.record_illegal_argmax(q_values, legal_actions);

        let chosen = match strategy {
            ExplorationStrategy::Greedy => self.greedy(q_values, legal_actions),
            ExplorationStrategy::EpsilonGreedy => {
                if rng.random::<f32>() < epsilon {
                    legal_actions[rng.random_range(0..legal_actions.len())]
                } else {
                    self.greedy(q_values, legal_actions)
                }
            }
            ExplorationStrategy::Boltzmann => self.boltzmann(q_values, legal_actions, temperature, rng),
        };
        self.record_action(chosen);
        chosen
    }

    fn greedy(&self, q_values: &[f32], legal_actions: &[u16]) -> u16 {
        *legal_actions
            .iter()
            .max_by(|&&a, &&b| {
                q_values[a as usize]
                    .partial_cmp(&q_values[b as usize])
                    .expect("Q-values must not be NaN by the time a policy selects over them")
            })
            .expect("legal_actions is non-empty")
    }

    fn boltzmann(
        &self,
        q_values: &[f32],
        legal_actions: &[u16],
        temperature: f32,
        rng: &mut impl Rng,
    ) -> u16 {
        let temperature = temperature.max(1e-6);
        let max_q = legal_actions
            .iter()
            .map(|&a| q_values[a as usize])
            .fold(f32::MIN, f32::max);
        let weights: Vec<f32> = legal_actions
            .iter()
            .map(|&a| ((q_values[a as usize] - max_q) / temperature).exp())
            .collect();
        let total: f32 = weights.iter().sum();
        let mut draw = rng.random_range(0.0..total.max(f32::MIN_POSITIVE));
        for (i, w) in weights.iter().enumerate() {
            if draw <= *w {
                return legal_actions[i];
            }
            draw -= w;
        }
        *legal_actions.last().expect("legal_actions is non-empty")
    }

    fn record_illegal_argmax(&self, q_values: &[f32], legal_actions: &[u16]) {
        let unmasked_argmax = (0..q_values.len())
            .max_by(|&a, &b| q_values[a].partial_cmp(&q_values[b]).unwrap())
            .unwrap_or(0);
        if !legal_actions.contains(&(unmasked_argmax as u16)) {
            self.illegal_argmax_count.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Linear interpolation from `start` to `end` over `decay_steps`, clamped
/// to `end` beyond that point. Shared by epsilon and temperature decay.
pub fn linear_decay(start: f32, end: f32, step: usize, decay_steps: usize) -> f32 {
    if decay_steps == 0 || step >= decay_steps {
        return end;
    }
    let progress = step as f32 / decay_steps as f32;
    start + (end - start) * progress
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn greedy_picks_the_highest_q_legal_action() {
        let policy = MaskedPolicy::new();
        let mut q = vec![0.0; 4096];
        q[5] = 10.0;
        q[9] = 1.0;
        let mut rng = rand::rngs::SmallRng::seed_from_u64(0);
        let chosen = policy.select(&q, &[5, 9], ExplorationStrategy::Greedy, 0.0, 1.0, &mut rng);
        assert_eq!(chosen, 5);
    }

    #[test]
    fn epsilon_zero_is_equivalent_to_greedy() {
        let policy = MaskedPolicy::new();
        let mut q = vec![0.0; 4096];
        q[5] = 10.0;
        q[9] = 1.0;
        let mut rng = rand::rngs::SmallRng::seed_from_u64(1);
        let chosen = policy.select(&q, &[5, 9], ExplorationStrategy::EpsilonGreedy, 0.0, 1.0, &mut rng);
        assert_eq!(chosen, 5);
    }

    #[test]
    fn illegal_argmax_is_counted_when_global_best_is_masked_out() {
        let policy = MaskedPolicy::new();
        let mut q = vec![0.0; 4096];
        q[100] = 50.0; // globally best, but illegal here
        q[5] = 1.0;
        let mut rng = rand::rngs::SmallRng::seed_from_u64(2);
        policy.select(&q, &[5, 9], ExplorationStrategy::Greedy, 0.0, 1.0, &mut rng);
        assert_eq!(policy.illegal_argmax_count(), 1);
        assert_eq!(policy.decision_count(), 1);
    }

    #[test]
    fn linear_decay_reaches_end_value_at_boundary_and_beyond() {
        assert_eq!(linear_decay(1.0, 0.0, 0, 10), 1.0);
        assert_eq!(linear_decay(1.0, 0.0, 10, 10), 0.0);
        assert_eq!(linear_decay(1.0, 0.0, 20, 10), 0.0);
        assert_eq!(linear_decay(1.0, 0.0, 5, 10), 0.5);
    }

    #[test]
    fn action_diversity_is_none_before_the_window_fills() {
        let policy = MaskedPolicy::new();
        let mut q = vec![0.0; 4096];
        q[5] = 1.0;
        let mut rng = rand::rngs::SmallRng::seed_from_u64(4);
        for _ in 0..499 {
            policy.select(&q, &[5, 9], ExplorationStrategy::Greedy, 0.0, 1.0, &mut rng);
        }
        assert_eq!(policy.action_diversity(), None);
        policy.select(&q, &[5, 9], ExplorationStrategy::Greedy, 0.0, 1.0, &mut rng);
        assert_eq!(policy.action_diversity(), Some(1.0 / 500.0));
    }

    #[test]
    fn boltzmann_only_ever_returns_legal_actions() {
        let policy = MaskedPolicy::new();
        let mut q = vec![0.0; 4096];
        q[5] = 3.0;
        q[9] = -3.0;
        let mut rng = rand::rngs::SmallRng::seed_from_u64(3);
        for _ in 0..20 {
            let chosen = policy.select(&q, &[5, 9], ExplorationStrategy::Boltzmann, 0.0, 0.5, &mut rng);
            assert!(chosen == 5 || chosen == 9);
        }
    }
}
