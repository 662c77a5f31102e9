pub mod backend;
pub mod checkpoint;
pub mod chess;
pub mod config;
pub mod diagnostics;
pub mod eval;
pub mod metrics;
pub mod policy;
pub mod replay;
pub mod selfplay;
pub mod train;
pub mod validator;

/// dimensional analysis types
pub type Reward = f32;
pub type Probability = f32;
pub type Utility = f32;

/// size of the fixed discrete action id space (64 from-squares x 64 to-squares)
pub const ACTION_SPACE: usize = 4096;
/// length of the deterministic observation feature vector, see [`chess::observation`]
pub const OBSERVATION_LEN: usize = 839;

/// minimum interval between two `log`-emitted repeats of the same
/// aggregated validation message
pub const VALIDATION_LOG_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// how often the trainer binary prints a progress line, independent
/// of how often checkpoints or evaluations run
pub const TRAINING_LOG_INTERVAL: std::time::Duration = std::time::Duration::from_secs(10);

/// trait for random generation, mainly (strictly?) for testing
pub trait Arbitrary {
    fn random() -> Self;
}

/// cooperative cancellation flag checked by workers between moves and by
/// the trainer between batches. A real binary wires this to stdin
/// ([`watch_for_interrupt`]); tests flip it directly.
static CANCELLED: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

pub fn interrupted() -> bool {
    CANCELLED.load(std::sync::atomic::Ordering::Relaxed)
}

pub fn cancel() {
    CANCELLED.store(true, std::sync::atomic::Ordering::Relaxed);
}

/// spawn a background thread that flips [`CANCELLED`] when the operator
/// types `q` and hits enter, for stopping a long-running training loop
/// gracefully from an interactive terminal.
pub fn watch_for_interrupt() {
    std::thread::spawn(|| {
        let mut line = String::new();
        loop {
            line.clear();
            if std::io::stdin().read_line(&mut line).is_err() {
                return;
            }
            if line.trim().eq_ignore_ascii_case("q") {
                log::warn!("interrupt requested, finishing in-flight work");
                cancel();
                return;
            }
        }
    });
}

/// initialize logging: a terminal logger plus a timestamped file logger
/// under `logs/`.
pub fn init() -> anyhow::Result<()> {
    std::fs::create_dir_all("logs")?;
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time moves slow")
        .as_secs();
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(format!("logs/{}.log", time))?,
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file]).map_err(|e| anyhow::anyhow!(e))
}

/// seed a deterministic, cheap RNG from an arbitrary tuple of hashables, by
/// hashing the parts into a `SmallRng` seed so the same (seed, cycle,
/// index) always reproduces the same draw.
pub fn seeded_rng(parts: &[u64]) -> rand::rngs::SmallRng {
    use rand::SeedableRng;
    use std::hash::Hash;
    use std::hash::Hasher;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for p in parts {
        p.hash(&mut hasher);
    }
    rand::rngs::SmallRng::seed_from_u64(hasher.finish())
}
