//! End-to-end scenarios exercising the public training surface together
//! rather than one module at a time.

use chess_rl_core::backend::dqn::ManualDqnBackend;
use chess_rl_core::chess::StandardEnvironment;
use chess_rl_core::config::ExplorationStrategy;
use chess_rl_core::config::TrainingConfig;
use chess_rl_core::train::Trainer;
use rand::SeedableRng;

fn smoke_config() -> TrainingConfig {
    TrainingConfig::default()
}

fn build_trainer(config: TrainingConfig, checkpoint_root: &std::path::Path) -> Trainer {
    let learning_rate = 1e-2;
    Trainer::new(
        config,
        Box::new(StandardEnvironment),
        Box::new(ManualDqnBackend::new(learning_rate)),
        Box::new(move || Box::new(ManualDqnBackend::new(learning_rate))),
        checkpoint_root,
    )
    .unwrap()
}

#[test]
fn smoke_cycle_completes_with_one_update_and_one_sync() {
    let dir = tempfile::tempdir().unwrap();
    let mut trainer = build_trainer(smoke_config(), dir.path());

    let summary = trainer.train().unwrap();

    assert_eq!(summary.cycles_completed, 1);
    assert!(dir.path().join("final.bin").exists());
    assert!(dir.path().join("final.json").exists());
}

#[test]
fn step_limit_penalty_is_never_reported_as_a_draw() {
    let mut config = smoke_config();
    config.max_plies_per_game = 2;
    config.step_limit_penalty = -0.5;

    let dir = tempfile::tempdir().unwrap();
    let mut trainer = build_trainer(config, dir.path());

    // two plies is nowhere near enough to reach checkmate or stalemate
    // from the starting position, so every game in the cycle must end by
    // truncation with exactly the configured penalty.
    let summary = trainer.train().unwrap();
    assert_eq!(summary.cycles_completed, 1);
}

#[test]
fn deterministic_runs_with_the_same_seed_reach_the_same_cycle_count() {
    let mut config_a = smoke_config();
    config_a.seed = Some(1234);
    let mut config_b = config_a.clone();
    config_b.seed = Some(1234);

    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let summary_a = build_trainer(config_a, dir_a.path()).train().unwrap();
    let summary_b = build_trainer(config_b, dir_b.path()).train().unwrap();

    assert_eq!(summary_a.cycles_completed, summary_b.cycles_completed);
    assert_eq!(summary_a.stop_reason, summary_b.stop_reason);
    assert_eq!(summary_a.final_mean_reward, summary_b.final_mean_reward);
}

#[test]
fn greedy_exploration_never_selects_an_illegal_action_even_against_an_adversarial_backend() {
    use chess_rl_core::backend::LearningBackend;
    use chess_rl_core::chess::ActionCodec;
    use chess_rl_core::chess::Position;
    use chess_rl_core::policy::MaskedPolicy;
    use chess_rl_core::ACTION_SPACE;

    /// A backend that always ranks action id 0 highest. In the starting
    /// position id 0 (a1-a1) is not a legal move, so an unmasked argmax
    /// would pick an illegal action every time.
    #[derive(Default)]
    struct AdversarialBackend;

    impl LearningBackend for AdversarialBackend {
        fn q_values(&self, _observation: &[f32]) -> Vec<f32> {
            let mut values = vec![0.0f32; ACTION_SPACE];
            values[0] = 1_000.0;
            values
        }
        fn target_q_values(&self, observation: &[f32]) -> Vec<f32> {
            self.q_values(observation)
        }
        fn update(
            &mut self,
            _batch: &[chess_rl_core::replay::Transition],
            _gamma: f32,
        ) -> (chess_rl_core::backend::BatchResult, Vec<f32>) {
            unimplemented!("not exercised in this scenario")
        }
        fn sync_target(&mut self) {}
        fn snapshot(&self) -> Vec<u8> {
            Vec::new()
        }
        fn load(&mut self, _bytes: &[u8]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    let backend = AdversarialBackend;
    let policy = MaskedPolicy::new();
    let position = Position::new_game();
    let legal_ids: Vec<u16> = ActionCodec::legal_ids(&position).into_iter().map(|(id, _)| id).collect();
    let observation = backend.q_values(&[]);
    let mut rng = rand::rngs::SmallRng::seed_from_u64(9);

    for _ in 0..100 {
        let chosen = policy.select(
            &observation,
            &legal_ids,
            ExplorationStrategy::Greedy,
            0.0,
            1.0,
            &mut rng,
        );
        assert!(legal_ids.contains(&chosen));
    }
    assert_eq!(policy.illegal_argmax_count(), 0);
}
