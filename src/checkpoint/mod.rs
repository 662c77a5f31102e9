//! Checkpoint persistence for a backend's parameters: an artifact's
//! `name()`/`path()`/`done()` gate a flat bincode blob + JSON metadata
//! sidecar write, since this core has no database dependency to write
//! through instead.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;

use crate::backend::LearningBackend;
use crate::Reward;

fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(bytes);
    hasher.finish()
}

/// Minimum elapsed time between two regular-interval checkpoint writes,
/// independent of cycle count, so a pathologically small
/// `checkpointInterval` can't thrash the disk.
const MIN_CHECKPOINT_INTERVAL: std::time::Duration = std::time::Duration::from_millis(250);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub cycle: usize,
    pub mean_reward: Reward,
    pub created_at_unix: u64,
    pub is_best: bool,
    /// [`crate::backend::LearningBackend::backend_name`] of the backend
    /// that produced this checkpoint.
    pub backend_id: String,
    /// Hash of the raw parameter snapshot, so two checkpoints can be
    /// compared for equality without a full byte diff.
    pub param_hash: u64,
    /// Hash of the training run's [`crate::config::TrainingConfig`], so a
    /// checkpoint loaded into a differently-configured run is detectable.
    pub config_fingerprint: u64,
}

/// An artifact persisted as `<name>.bin` (the backend's raw parameter
/// snapshot) plus `<name>.json` (its [`CheckpointMetadata`] sidecar).
pub trait Disk {
    fn name(&self) -> String;

    fn bin_path(&self, root: &Path) -> PathBuf {
        root.join(format!("{}.bin", self.name()))
    }

    fn meta_path(&self, root: &Path) -> PathBuf {
        root.join(format!("{}.json", self.name()))
    }

    fn done(&self, root: &Path) -> bool {
        self.bin_path(root).exists() && self.meta_path(root).exists()
    }
}

struct Artifact(String);

impl Disk for Artifact {
    fn name(&self) -> String {
        self.0.clone()
    }
}

pub struct CheckpointManager {
    root: PathBuf,
    interval: usize,
    epsilon_promote: f32,
    config_fingerprint: u64,
    best_score: Mutex<Option<f32>>,
    last_write: Mutex<Instant>,
}

impl CheckpointManager {
    pub fn new(
        root: impl Into<PathBuf>,
        interval: usize,
        epsilon_promote: f32,
        config_fingerprint: u64,
    ) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            interval,
            epsilon_promote,
            config_fingerprint,
            best_score: Mutex::new(None),
            last_write: Mutex::new(Instant::now() - MIN_CHECKPOINT_INTERVAL),
        })
    }

    fn metadata(&self, cycle: usize, backend: &dyn LearningBackend, mean_reward: Reward, is_best: bool) -> CheckpointMetadata {
        CheckpointMetadata {
            cycle,
            mean_reward,
            created_at_unix: Self::unix_now(),
            is_best,
            backend_id: backend.backend_name().to_string(),
            param_hash: hash_bytes(&backend.snapshot()),
            config_fingerprint: self.config_fingerprint,
        }
    }

    fn write(&self, artifact: &Artifact, backend: &dyn LearningBackend, metadata: &CheckpointMetadata) -> anyhow::Result<PathBuf> {
        let bin_path = artifact.bin_path(&self.root);
        let encoded = bincode::serialize(&backend.snapshot())?;
        std::fs::write(&bin_path, encoded)?;

        let meta_path = artifact.meta_path(&self.root);
        std::fs::write(&meta_path, serde_json::to_vec_pretty(metadata)?)?;

        log::info!(
            "checkpoint {} written (cycle {}, mean_reward {:.4})",
            artifact.name(),
            metadata.cycle,
            metadata.mean_reward
        );
        Ok(bin_path)
    }

    fn unix_now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time moves slow")
            .as_secs()
    }

    /// Writes a regular-interval checkpoint named `cycle-<n>` if `cycle` is
    /// a multiple of the configured interval and the rate-limit gate is
    /// open. Returns `None` when skipped, never an error for a skip.
    pub fn maybe_checkpoint(
        &self,
        cycle: usize,
        backend: &dyn LearningBackend,
        mean_reward: Reward,
    ) -> anyhow::Result<Option<PathBuf>> {
        if self.interval == 0 || cycle % self.interval != 0 {
            return Ok(None);
        }
        {
            let mut last_write = self.last_write.lock().expect("checkpoint mutex poisoned");
            if last_write.elapsed() < MIN_CHECKPOINT_INTERVAL {
                return Ok(None);
            }
            *last_write = Instant::now();
        }

        let artifact = Artifact(format!("cycle-{cycle}"));
        let metadata = self.metadata(cycle, backend, mean_reward, false);
        Ok(Some(self.write(&artifact, backend, &metadata)?))
    }

    /// Promotes `backend` to `best` if `mean_reward` beats the best score
    /// seen so far by at least `epsilon_promote`. A fresh best overwrites
    /// the previous `best` artifact in place rather than accumulating one
    /// file per promotion.
    pub fn maybe_promote(
        &self,
        cycle: usize,
        backend: &dyn LearningBackend,
        mean_reward: Reward,
    ) -> anyhow::Result<bool> {
        let mut best_score = self.best_score.lock().expect("checkpoint mutex poisoned");
        let improved = match *best_score {
            Some(current_best) => mean_reward >= current_best + self.epsilon_promote,
            None => true,
        };
        if !improved {
            return Ok(false);
        }
        *best_score = Some(mean_reward);
        drop(best_score);

        let artifact = Artifact("best".to_string());
        let metadata = self.metadata(cycle, backend, mean_reward, true);
        self.write(&artifact, backend, &metadata)?;
        Ok(true)
    }

    /// Writes the terminal checkpoint unconditionally when a terminal
    /// condition is reached.
    pub fn save_final(&self, cycle: usize, backend: &dyn LearningBackend, mean_reward: Reward) -> anyhow::Result<PathBuf> {
        let artifact = Artifact("final".to_string());
        let metadata = self.metadata(cycle, backend, mean_reward, false);
        self.write(&artifact, backend, &metadata)
    }

    pub fn load_metadata(&self, name: &str) -> anyhow::Result<CheckpointMetadata> {
        let artifact = Artifact(name.to_string());
        let bytes = std::fs::read(artifact.meta_path(&self.root))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn load_backend(&self, name: &str, backend: &mut dyn LearningBackend) -> anyhow::Result<()> {
        let artifact = Artifact(name.to_string());
        let encoded = std::fs::read(artifact.bin_path(&self.root))?;
        let bytes: Vec<u8> = bincode::deserialize(&encoded)?;
        backend.load(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dqn::ManualDqnBackend;

    fn manager() -> (tempfile::TempDir, CheckpointManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path(), 2, 0.05, 7).unwrap();
        (dir, manager)
    }

    #[test]
    fn regular_checkpoint_only_fires_on_interval_multiples() {
        let (_dir, manager) = manager();
        let backend = ManualDqnBackend::default();
        assert!(manager.maybe_checkpoint(1, &backend, 0.0).unwrap().is_none());
        assert!(manager.maybe_checkpoint(2, &backend, 0.0).unwrap().is_some());
    }

    #[test]
    fn promotion_requires_clearing_the_epsilon_threshold() {
        let (_dir, manager) = manager();
        let backend = ManualDqnBackend::default();
        assert!(manager.maybe_promote(0, &backend, 0.1).unwrap());
        assert!(!manager.maybe_promote(1, &backend, 0.12).unwrap());
        assert!(manager.maybe_promote(2, &backend, 0.2).unwrap());
    }

    #[test]
    fn final_checkpoint_round_trips_through_load() {
        let (_dir, manager) = manager();
        let mut backend = ManualDqnBackend::default();
        manager.save_final(10, &backend, 0.5).unwrap();
        manager.load_backend("final", &mut backend).unwrap();
        let metadata = manager.load_metadata("final").unwrap();
        assert_eq!(metadata.cycle, 10);
    }

    #[test]
    fn metadata_records_backend_identity_and_config_fingerprint() {
        let (_dir, manager) = manager();
        let backend = ManualDqnBackend::default();
        manager.save_final(0, &backend, 0.0).unwrap();
        let metadata = manager.load_metadata("final").unwrap();
        assert_eq!(metadata.backend_id, "manual_dqn");
        assert_eq!(metadata.config_fingerprint, 7);
        assert_eq!(metadata.param_hash, hash_bytes(&backend.snapshot()));
    }
}
