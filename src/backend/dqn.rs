//! A linear-in-features DQN backend: one weight vector and bias per action
//! id, trained by per-transition SGD against a Huber loss. This is the
//! crate's only concrete [`super::LearningBackend`] — deliberately not a
//! real tensor-library model (no example in this codebase's dependency
//! graph pulls one in), so it stays exactly as "black box behind a trait"
//! as the interface demands without fabricating a dependency to back it.
//! See DESIGN.md for the Open Question this resolves.

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;

use super::bootstrapped_target;
use super::entropy_of;
use super::masked_max;
use super::softmax;
use super::BatchResult;
use super::LearningBackend;
use super::QStats;
use crate::replay::Transition;
use crate::ACTION_SPACE;
use crate::OBSERVATION_LEN;

/// Huber loss delta. Below this, the loss is quadratic; beyond it, linear —
/// keeps a single outlier transition from dominating a mini-batch's
/// gradient.
const HUBER_DELTA: f32 = 1.0;

#[derive(Clone)]
struct LinearNetwork {
    weights: Vec<f32>,
    bias: Vec<f32>,
}

impl LinearNetwork {
    fn zeroed() -> Self {
        Self {
            weights: vec![0.0; ACTION_SPACE * OBSERVATION_LEN],
            bias: vec![0.0; ACTION_SPACE],
        }
    }

    fn row(&self, action: usize) -> &[f32] {
        &self.weights[action * OBSERVATION_LEN..(action + 1) * OBSERVATION_LEN]
    }

    fn row_mut(&mut self, action: usize) -> &mut [f32] {
        &mut self.weights[action * OBSERVATION_LEN..(action + 1) * OBSERVATION_LEN]
    }

    fn q_values(&self, observation: &[f32]) -> Vec<f32> {
        (0..ACTION_SPACE)
            .map(|action| dot(self.row(action), observation) + self.bias[action])
            .collect()
    }

    fn serialize(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity((self.weights.len() + self.bias.len()) * 4);
        for v in &self.weights {
            buffer.write_f32::<LittleEndian>(*v).expect("writing to a Vec cannot fail");
        }
        for v in &self.bias {
            buffer.write_f32::<LittleEndian>(*v).expect("writing to a Vec cannot fail");
        }
        buffer
    }

    fn deserialize(mut bytes: &[u8]) -> anyhow::Result<Self> {
        let mut weights = vec![0.0f32; ACTION_SPACE * OBSERVATION_LEN];
        let mut bias = vec![0.0f32; ACTION_SPACE];
        for slot in weights.iter_mut() {
            *slot = bytes.read_f32::<LittleEndian>()?;
        }
        for slot in bias.iter_mut() {
            *slot = bytes.read_f32::<LittleEndian>()?;
        }
        Ok(Self { weights, bias })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn huber_grad(error: f32) -> f32 {
    if error.abs() <= HUBER_DELTA {
        error
    } else {
        HUBER_DELTA * error.signum()
    }
}

fn huber_loss(error: f32) -> f32 {
    if error.abs() <= HUBER_DELTA {
        0.5 * error * error
    } else {
        HUBER_DELTA * (error.abs() - 0.5 * HUBER_DELTA)
    }
}

pub struct ManualDqnBackend {
    online: LinearNetwork,
    target: LinearNetwork,
    learning_rate: f32,
}

impl ManualDqnBackend {
    pub fn new(learning_rate: f32) -> Self {
        let online = LinearNetwork::zeroed();
        let target = online.clone();
        Self { online, target, learning_rate }
    }
}

impl Default for ManualDqnBackend {
    fn default() -> Self {
        Self::new(1e-3)
    }
}

impl LearningBackend for ManualDqnBackend {
    fn q_values(&self, observation: &[f32]) -> Vec<f32> {
        self.online.q_values(observation)
    }

    fn target_q_values(&self, observation: &[f32]) -> Vec<f32> {
        self.target.q_values(observation)
    }

    fn update(&mut self, batch: &[Transition], gamma: f32) -> (BatchResult, Vec<f32>) {
        let mut td_errors = Vec::with_capacity(batch.len());
        let mut losses = Vec::with_capacity(batch.len());
        let mut entropies = Vec::with_capacity(batch.len());
        let mut all_q = Vec::with_capacity(batch.len());

        for transition in batch {
            let observation = transition.observation.as_slice();
            let q_online = self.online.q_values(observation);
            let predicted = q_online[transition.action as usize];
            entropies.push(entropy_of(&softmax(&q_online)));

            let next_q_target = self.target.q_values(transition.next_observation.as_slice());
            let next_max = if transition.next_legal_actions.is_empty() {
                0.0
            } else {
                masked_max(&next_q_target, &transition.next_legal_actions)
            };
            let target = bootstrapped_target(transition.reward, gamma, transition.done, next_max);

            let error = predicted - target;
            td_errors.push(error.abs());
            losses.push(huber_loss(error));
            all_q.extend_from_slice(&q_online);

            let grad = huber_grad(error);
            if grad.is_finite() {
                let row = self.online.row_mut(transition.action as usize);
                for (w, x) in row.iter_mut().zip(observation) {
                    *w -= self.learning_rate * grad * x;
                }
                self.online.bias[transition.action as usize] -= self.learning_rate * grad;
            }
        }

        let mean_loss = losses.iter().sum::<f32>() / losses.len().max(1) as f32;
        let grad_norm = td_errors.iter().map(|e| e * e).sum::<f32>().sqrt();
        let mean_entropy = entropies.iter().sum::<f32>() / entropies.len().max(1) as f32;

        let result = BatchResult {
            loss: mean_loss,
            q_stats: QStats::from_values(&all_q),
            grad_norm,
            entropy: mean_entropy,
        };
        (result, td_errors)
    }

    fn sync_target(&mut self) {
        self.target = self.online.clone();
    }

    fn snapshot(&self) -> Vec<u8> {
        let mut buffer = self.online.serialize();
        buffer.extend(self.target.serialize());
        buffer
    }

    fn load(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        let half = bytes.len() / 2;
        self.online = LinearNetwork::deserialize(&bytes[..half])?;
        self.target = LinearNetwork::deserialize(&bytes[half..])?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "manual_dqn"
    }
}
