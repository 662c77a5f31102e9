//! The environment contract a self-play worker drives. Chess rules
//! themselves — legality, check, mate detection — are `shakmaty`'s job;
//! this module only adds the bookkeeping layered on top of them:
//! step-limit truncation and the repetition/fifty-move draw conditions
//! `shakmaty::Position::outcome` does not know about, because it only
//! ever sees one position at a time.

use shakmaty::Color;

use super::codec::ActionCodec;
use super::codec::CodecError;
use super::position::GameHistory;
use super::position::Position;
use crate::Reward;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    WhiteWins,
    BlackWins,
    Draw,
}

/// The result of applying one action: the resulting position, the reward
/// attributed to the side that just moved, and whether the game is over.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub position: Position,
    pub reward: Reward,
    pub done: bool,
    pub outcome: Option<Outcome>,
    pub truncated: bool,
}

/// External collaborator a [`crate::selfplay::worker::SelfPlayWorker`]
/// drives to generate one game of self-play. Implementations never panic on
/// an action id drawn from their own [`ChessEnvironment::legal_actions`].
pub trait ChessEnvironment: Send + Sync {
    fn reset(&self) -> Position;

    fn legal_actions(&self, position: &Position) -> Vec<u16>;

    /// Applies `action` to `position`, appending the resulting position to
    /// `history`. `ply` is the zero-indexed ply count already played in
    /// this game, used to apply the step-limit penalty at `max_plies`.
    fn step(
        &self,
        position: &Position,
        history: &mut GameHistory,
        action: u16,
        ply: u32,
        max_plies: u32,
        step_limit_penalty: Reward,
    ) -> Result<StepOutcome, CodecError>;
}

/// The default, and only, environment implementation: standard chess rules
/// via `shakmaty`, with repetition/fifty-move/step-limit layered on top.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardEnvironment;

impl ChessEnvironment for StandardEnvironment {
    fn reset(&self) -> Position {
        Position::new_game()
    }

    fn legal_actions(&self, position: &Position) -> Vec<u16> {
        ActionCodec::legal_ids(position).into_iter().map(|(id, _)| id).collect()
    }

    fn step(
        &self,
        position: &Position,
        history: &mut GameHistory,
        action: u16,
        ply: u32,
        max_plies: u32,
        step_limit_penalty: Reward,
    ) -> Result<StepOutcome, CodecError> {
        let mover = position.turn();
        let mv = ActionCodec::decode(position, action)?;
        let next = position.play(&mv);
        history.push(&next);

        if let Some(outcome) = decisive_or_drawn(&next) {
            let reward = reward_for(outcome, mover);
            return Ok(StepOutcome {
                position: next,
                reward,
                done: true,
                outcome: Some(outcome),
                truncated: false,
            });
        }

        if history.is_threefold_repetition() || next.halfmove_clock() >= 100 {
            return Ok(StepOutcome {
                position: next,
                reward: 0.0,
                done: true,
                outcome: Some(Outcome::Draw),
                truncated: false,
            });
        }

        if ply + 1 >= max_plies {
            return Ok(StepOutcome {
                position: next,
                reward: step_limit_penalty,
                done: true,
                outcome: None,
                truncated: true,
            });
        }

        Ok(StepOutcome {
            position: next,
            reward: 0.0,
            done: false,
            outcome: None,
            truncated: false,
        })
    }
}

fn decisive_or_drawn(position: &Position) -> Option<Outcome> {
    if position.is_checkmate() {
        return Some(match position.turn() {
            Color::White => Outcome::BlackWins,
            Color::Black => Outcome::WhiteWins,
        });
    }
    if position.is_stalemate() || position.is_insufficient_material() {
        return Some(Outcome::Draw);
    }
    None
}

fn reward_for(outcome: Outcome, mover: Color) -> Reward {
    match (outcome, mover) {
        (Outcome::Draw, _) => 0.0,
        (Outcome::WhiteWins, Color::White) => 1.0,
        (Outcome::BlackWins, Color::Black) => 1.0,
        _ => -1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Finds the legal move whose (from, to) squares match the given
    /// algebraic square names, e.g. `("f2", "f3")`.
    fn find_by_squares(position: &Position, from: &str, to: &str) -> u16 {
        ActionCodec::legal_ids(position)
            .into_iter()
            .find(|(_, mv)| mv.from().map(|s| s.to_string()) == Some(from.to_string()) && mv.to().to_string() == to)
            .map(|(id, _)| id)
            .expect("move exists in this line")
    }

    /// Fool's mate: the fastest possible checkmate, reached in four plies.
    fn play_fools_mate() -> (GameHistory, StepOutcome) {
        let env = StandardEnvironment;
        let mut position = env.reset();
        let mut history = GameHistory::new();
        history.push(&position);
        let plies = [("f2", "f3"), ("e7", "e5"), ("g2", "g4"), ("d8", "h4")];
        let mut last = None;
        for (ply, (from, to)) in plies.iter().enumerate() {
            let id = find_by_squares(&position, from, to);
            let outcome = env
                .step(&position, &mut history, id, ply as u32, 200, -0.5)
                .unwrap();
            position = outcome.position.clone();
            last = Some(outcome);
        }
        (history, last.unwrap())
    }

    #[test]
    fn checkmate_ends_the_game_with_a_decisive_reward() {
        let (_, outcome) = play_fools_mate();
        assert!(outcome.done);
        assert_eq!(outcome.outcome, Some(Outcome::BlackWins));
        assert_eq!(outcome.reward, 1.0);
    }

    #[test]
    fn step_limit_truncates_with_penalty_and_no_decisive_outcome() {
        let env = StandardEnvironment;
        let position = env.reset();
        let mut history = GameHistory::new();
        history.push(&position);
        let (id, _) = ActionCodec::legal_ids(&position).into_iter().next().unwrap();
        let outcome = env.step(&position, &mut history, id, 0, 1, -0.5).unwrap();
        assert!(outcome.done);
        assert!(outcome.truncated);
        assert_eq!(outcome.reward, -0.5);
        assert_eq!(outcome.outcome, None);
    }

    #[test]
    fn unknown_action_id_is_rejected_without_panicking() {
        let env = StandardEnvironment;
        let position = env.reset();
        let mut history = GameHistory::new();
        history.push(&position);
        let known: std::collections::HashSet<u16> =
            env.legal_actions(&position).into_iter().collect();
        let bogus = (0..4096u16).find(|id| !known.contains(id)).unwrap();
        assert!(env.step(&position, &mut history, bogus, 0, 200, -0.5).is_err());
    }
}
