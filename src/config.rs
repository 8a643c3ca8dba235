use std::{
    fs::File,
    io::BufReader,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    agent::PpoParams,
    env::SimConfig,
    error::{OrchestraErr, Result},
};

/// Everything a training run is configured with.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    /// Amount of rollout worker threads, each with its own environment.
    pub workers: NonZeroUsize,
    /// Counted rows that trigger a policy update.
    pub min_batch_size: NonZeroUsize,
    /// Finished episodes, across workers, that end the training.
    pub max_episodes: NonZeroUsize,
    pub gamma: f64,
    pub actor_lr: f32,
    pub critic_lr: f32,
    pub clip_epsilon: f32,
    /// Actor iterations, and then critic iterations, per update.
    pub update_depth: NonZeroUsize,
    pub seed: Option<u64>,
    /// The JSON metric table holding every target's noise.
    pub metrics_path: PathBuf,
    pub checkpoint_path: Option<PathBuf>,
    pub environment: SimConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            workers: NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN),
            min_batch_size: NonZeroUsize::new(64).unwrap_or(NonZeroUsize::MIN),
            max_episodes: NonZeroUsize::new(200).unwrap_or(NonZeroUsize::MIN),
            gamma: 0.9,
            actor_lr: 1e-3,
            critic_lr: 2e-3,
            clip_epsilon: 0.2,
            update_depth: NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN),
            seed: None,
            metrics_path: PathBuf::from("metrics.json"),
            checkpoint_path: None,
            environment: SimConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Reads and validates the configuration at `path`.
    ///
    /// Relative metric and checkpoint paths are taken relative to the file's directory.
    ///
    /// # Errors
    /// `Configuration` if the file can't be read or holds invalid values.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| OrchestraErr::Configuration(format!("{}: {e}", path.display())))?;

        let mut config: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| OrchestraErr::Configuration(format!("{}: {e}", path.display())))?;

        if let Some(dir) = path.parent() {
            config.metrics_path = dir.join(&config.metrics_path);
            config.checkpoint_path = config.checkpoint_path.map(|p| dir.join(p));
        }

        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// `Configuration` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(OrchestraErr::Configuration(msg.to_string()));

        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return invalid("gamma must be in (0, 1]");
        }
        if !(self.actor_lr > 0.0 && self.critic_lr > 0.0) {
            return invalid("learning rates must be positive");
        }
        if !(self.clip_epsilon > 0.0 && self.clip_epsilon < 1.0) {
            return invalid("clip_epsilon must be in (0, 1)");
        }

        self.environment.validate()
    }

    pub fn ppo_params(&self) -> PpoParams {
        PpoParams {
            actor_lr: self.actor_lr,
            critic_lr: self.critic_lr,
            clip_epsilon: self.clip_epsilon,
        }
    }
}
