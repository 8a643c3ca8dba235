pub mod agent;
pub mod config;
pub mod coordination;
pub mod env;
pub mod error;
pub mod metrics;
pub mod profile;
pub mod reward;
pub mod rollout;
mod session;

use std::sync::Arc;

use log::info;
use rand::{Rng, SeedableRng, rngs::StdRng};

pub use config::TrainingConfig;
pub use error::{OrchestraErr, Result};
pub use session::{Session, TrainingReport};

use crate::{
    agent::LinearAgent,
    env::{Environment, SimulatedEnvironment},
    metrics::MetricTable,
};

/// The session `train` builds.
pub type SimulatedSession = Session<SimulatedEnvironment, LinearAgent, Arc<LinearAgent>>;

/// Prepares a training session of a linear agent over simulated targets.
///
/// Every worker gets the same program with its own measurement noise. The agent is restored
/// from the configured checkpoint when there's one.
///
/// # Errors
/// `Configuration` if the configuration, the metric table or the checkpoint are unusable.
pub fn train(config: &TrainingConfig) -> Result<SimulatedSession> {
    config.validate()?;

    info!("loading metric table from {}", config.metrics_path.display());
    let metrics = MetricTable::load(&config.metrics_path)?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let program_seed: u64 = rng.random();
    let envs = (0..config.workers.get())
        .map(|_| -> Result<SimulatedEnvironment> {
            let mut env = SimulatedEnvironment::new(config.environment.clone(), program_seed)?;
            env.reseed(rng.random());
            Ok(env)
        })
        .collect::<Result<Vec<_>>>()?;

    let (state_dim, action_dim) = envs
        .first()
        .map(|env| (env.state_dim(), env.action_count()))
        .unwrap_or_default();

    let agent = Arc::new(LinearAgent::new(
        state_dim,
        action_dim,
        config.ppo_params(),
        &mut rng,
    )?);

    if let Some(path) = &config.checkpoint_path {
        agent.restore(path)?;
    }

    Session::new(config, &metrics, envs, Arc::clone(&agent), agent)
}
