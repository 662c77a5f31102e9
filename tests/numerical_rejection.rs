//! A backend that reports a NaN loss on one batch must not poison the
//! cycle, and the remaining batches in that cycle still run.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use chess_rl_core::backend::BatchResult;
use chess_rl_core::backend::LearningBackend;
use chess_rl_core::backend::QStats;
use chess_rl_core::chess::StandardEnvironment;
use chess_rl_core::config::OpponentStrategy;
use chess_rl_core::config::TrainingConfig;
use chess_rl_core::replay::Transition;
use chess_rl_core::train::Trainer;
use chess_rl_core::ACTION_SPACE;

/// Reports a NaN loss on exactly its second `update` call, a finite loss
/// every other time.
struct FlakyBackend {
    calls: AtomicUsize,
}

impl Default for FlakyBackend {
    fn default() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }
}

impl LearningBackend for FlakyBackend {
    fn q_values(&self, _observation: &[f32]) -> Vec<f32> {
        vec![0.0; ACTION_SPACE]
    }
    fn target_q_values(&self, observation: &[f32]) -> Vec<f32> {
        self.q_values(observation)
    }
    fn update(&mut self, _batch: &[Transition], _gamma: f32) -> (BatchResult, Vec<f32>) {
        let call_index = self.calls.fetch_add(1, Ordering::SeqCst);
        let loss = if call_index == 1 { f32::NAN } else { 1.0 };
        (
            BatchResult { loss, q_stats: QStats::default(), grad_norm: 1.0, entropy: 1.0 },
            vec![0.5],
        )
    }
    fn sync_target(&mut self) {}
    fn snapshot(&self) -> Vec<u8> {
        Vec::new()
    }
    fn load(&mut self, _bytes: &[u8]) -> anyhow::Result<()> {
        Ok(())
    }
}

#[test]
fn a_single_nan_batch_is_rejected_without_failing_the_cycle() {
    let mut config = TrainingConfig::default();
    config.games_per_cycle = 2;
    config.max_plies_per_game = 4;
    config.batch_size = 1;
    config.batches_per_cycle = 4;
    config.buffer_capacity = 32;
    config.opponent_strategy = OpponentStrategy::BaselineHeuristic;

    let dir = tempfile::tempdir().unwrap();
    let mut trainer = Trainer::new(
        config,
        Box::new(StandardEnvironment),
        Box::new(FlakyBackend::default()),
        Box::new(|| Box::new(FlakyBackend::default())),
        dir.path(),
    )
    .unwrap();

    // the cycle must complete rather than propagate an error for the
    // single bad batch.
    let summary = trainer.train().unwrap();
    assert_eq!(summary.cycles_completed, 1);
}
