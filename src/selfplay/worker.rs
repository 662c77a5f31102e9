//! Plays one game of self-play and returns the transitions generated from
//! the learner's side of the board.

use rand::Rng;
use shakmaty::Color;

use crate::backend::LearningBackend;
use crate::chess::ChessEnvironment;
use crate::chess::GameHistory;
use crate::chess::Observation;
use crate::chess::Outcome;
use crate::config::ExplorationStrategy;
use crate::policy::MaskedPolicy;
use crate::replay::Transition;
use crate::Reward;

#[derive(Debug, Clone)]
pub struct GameRecord {
    pub transitions: Vec<Transition>,
    pub outcome: Option<Outcome>,
    pub truncated: bool,
    pub plies: u32,
    pub learner_color: Color,
}

/// A learner move awaiting the opponent's reply before its transition can be
/// closed out: the macro-step this worker trains on spans the learner's own
/// ply plus whatever the opponent does immediately after it.
struct PendingTransition {
    observation: Observation,
    action: u16,
}

impl PendingTransition {
    fn finish(self, reward: Reward, next_observation: Observation, done: bool, next_legal_actions: Vec<u16>) -> Transition {
        Transition {
            observation: self.observation,
            action: self.action,
            reward,
            next_observation,
            next_legal_actions,
            done,
        }
    }
}

pub struct SelfPlayWorker;

impl SelfPlayWorker {
    /// Plays one game to completion (or to `max_plies`), recording a
    /// [`Transition`] for every ply `learner` is on move. Every ply advances
    /// the game, but a learner transition only closes once the side to move
    /// reverts back to `learner_color` (or the game ends) — the opponent's
    /// reply is folded into the reward, next observation, and `done` of the
    /// learner's own transition rather than producing one of its own, so a
    /// step-limit or decisive result landing on the opponent's move is never
    /// silently dropped.
    #[allow(clippy::too_many_arguments)]
    pub fn play_game(
        env: &dyn ChessEnvironment,
        learner: &dyn LearningBackend,
        opponent: &dyn LearningBackend,
        policy: &MaskedPolicy,
        learner_color: Color,
        max_plies: u32,
        step_limit_penalty: Reward,
        exploration: ExplorationStrategy,
        epsilon: f32,
        temperature: f32,
        rng: &mut impl Rng,
    ) -> anyhow::Result<GameRecord> {
        let mut position = env.reset();
        let mut history = GameHistory::new();
        history.push(&position);

        let mut transitions = Vec::new();
        let mut pending: Option<PendingTransition> = None;
        let mut ply = 0u32;
        let mut outcome = None;
        let mut truncated = false;

        loop {
            let legal = env.legal_actions(&position);
            if legal.is_empty() {
                anyhow::bail!("environment reported a non-terminal position with no legal actions");
            }

            let mover_is_learner = position_turn(&position) == learner_color;
            let backend = if mover_is_learner { learner } else { opponent };

            let observation = Observation::encode(&position, &history);
            let q_values = backend.q_values(observation.as_slice());
            let action = policy.select(
                &q_values,
                &legal,
                if mover_is_learner { exploration } else { ExplorationStrategy::Greedy },
                epsilon,
                temperature,
                rng,
            );

            let step = env.step(&position, &mut history, action, ply, max_plies, step_limit_penalty)?;

            if mover_is_learner {
                // The opponent replied to the previous learner move without
                // ending the game, so that transition closes here: zero
                // intervening reward, `done = false`, and this ply's
                // (pre-move) observation and legal actions as the next state.
                if let Some(pend) = pending.take() {
                    transitions.push(pend.finish(0.0, observation.clone(), false, legal.clone()));
                }
                if step.done {
                    let next_observation = Observation::encode(&step.position, &history);
                    transitions.push(PendingTransition { observation, action }.finish(step.reward, next_observation, true, Vec::new()));
                } else {
                    pending = Some(PendingTransition { observation, action });
                }
            } else if step.done {
                if let Some(pend) = pending.take() {
                    let next_observation = Observation::encode(&step.position, &history);
                    // A decisive or drawn result is signed from the
                    // opponent's perspective and must be negated for the
                    // learner's transition; a step-limit penalty is already
                    // side-neutral and carries over unchanged.
                    let reward = if step.truncated { step.reward } else { -step.reward };
                    transitions.push(pend.finish(reward, next_observation, true, Vec::new()));
                }
            }

            position = step.position;
            ply += 1;

            if step.done {
                outcome = step.outcome;
                truncated = step.truncated;
                break;
            }
        }

        Ok(GameRecord { transitions, outcome, truncated, plies: ply, learner_color })
    }
}

fn position_turn(position: &crate::chess::Position) -> Color {
    // `Position` only exposes a handful of read accessors by design; this
    // goes through the same `turn()` wrapper the environment itself uses
    // rather than reaching into `shakmaty` directly.
    position.turn()
}
