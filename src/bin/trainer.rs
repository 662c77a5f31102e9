//! Thin composition root: load a config (or fall back to defaults), wire
//! the concrete chess environment and DQN backend together, and run a
//! training loop until a terminal condition fires. CLI flag parsing,
//! metrics export, and a richer operator UI are out of scope here — this
//! binary only proves the library wires together.

use chess_rl_core::backend::dqn::ManualDqnBackend;
use chess_rl_core::chess::StandardEnvironment;
use chess_rl_core::config::TrainingConfig;
use chess_rl_core::train::{StopReason, Trainer};
use colored::Colorize;

fn main() -> anyhow::Result<()> {
    chess_rl_core::init()?;
    chess_rl_core::watch_for_interrupt();

    let config = match std::env::args().nth(1) {
        Some(path) => TrainingConfig::from_path(path)?,
        None => {
            log::warn!("no config path given, training with built-in defaults (press 'q' + enter to stop)");
            TrainingConfig::default()
        }
    };

    let learning_rate = 1e-3;
    let mut trainer = Trainer::new(
        config,
        Box::new(StandardEnvironment),
        Box::new(ManualDqnBackend::new(learning_rate)),
        Box::new(move || Box::new(ManualDqnBackend::new(learning_rate))),
        "checkpoints",
    )?;

    let summary = trainer.train()?;
    let headline = format!(
        "training stopped after {} cycles ({:?}), final mean reward {:.4}",
        summary.cycles_completed, summary.stop_reason, summary.final_mean_reward
    );
    let headline = match summary.stop_reason {
        StopReason::MaxCyclesReached => headline.green(),
        StopReason::Interrupted => headline.yellow(),
    };
    println!("{headline}");
    Ok(())
}
