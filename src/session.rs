use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use log::{error, info};

use crate::{
    agent::{Policy, Trainer},
    config::TrainingConfig,
    coordination::{EpisodeSummary, SharedState, StopHandle, UpdateCoordinator, UpdateStats},
    env::Environment,
    error::{OrchestraErr, Result},
    metrics::MetricSource,
    rollout::{RolloutWorker, WorkerMetrics},
};

/// What a finished training session went through.
#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    pub episodes: Vec<EpisodeSummary>,
    pub updates: Vec<UpdateStats>,
    pub workers: Vec<WorkerMetrics>,
}

/// A training session ready to run: one rollout worker per environment and the update
/// coordinator, all sharing the same batch.
pub struct Session<E, P, T>
where
    T: Trainer,
{
    shared: Arc<SharedState>,
    workers: Vec<RolloutWorker<E, P>>,
    coordinator: UpdateCoordinator<T>,
}

impl<E, P, T> Session<E, P, T>
where
    E: Environment + Send + 'static,
    P: Policy + 'static,
    T: Trainer + 'static,
{
    /// Creates a new `Session`.
    ///
    /// Every check happens here, before any thread is started.
    ///
    /// # Arguments
    /// * `config` - The training configuration.
    /// * `metrics` - Where each environment's target noise is looked up.
    /// * `envs` - One environment per worker.
    /// * `policy` - The policy shared by the workers.
    /// * `trainer` - The trainer of that same policy.
    ///
    /// # Errors
    /// `Configuration` if the configuration is invalid, the environments don't match it or
    /// each other, or a target has no usable noise recorded.
    pub fn new<M: MetricSource>(
        config: &TrainingConfig,
        metrics: &M,
        envs: Vec<E>,
        policy: Arc<P>,
        trainer: T,
    ) -> Result<Self> {
        config.validate()?;

        if envs.len() != config.workers.get() {
            return Err(OrchestraErr::Configuration(format!(
                "{} workers configured but {} environments given",
                config.workers,
                envs.len()
            )));
        }

        let Some(first) = envs.first() else {
            return Err(OrchestraErr::Configuration("no environments".to_string()));
        };
        let (state_dim, action_dim) = (first.state_dim(), first.action_count());

        let shared = Arc::new(SharedState::new(
            config.min_batch_size.get(),
            config.max_episodes.get(),
        ));

        let mut workers = Vec::with_capacity(envs.len());
        for (id, env) in envs.into_iter().enumerate() {
            if env.state_dim() != state_dim || env.action_count() != action_dim {
                return Err(OrchestraErr::Configuration(format!(
                    "environment of worker {id} is {}x{}, expected {state_dim}x{action_dim}",
                    env.state_dim(),
                    env.action_count()
                )));
            }

            let stats = metrics.mean_sigma_for(env.target())?;
            if !(stats.sigma.is_finite() && stats.sigma > 0.0) {
                return Err(OrchestraErr::Configuration(format!(
                    "target '{}' has sigma {}, it must be positive",
                    env.target(),
                    stats.sigma
                )));
            }

            workers.push(RolloutWorker::new(
                id,
                env,
                Arc::clone(&policy),
                Arc::clone(&shared),
                stats.sigma,
                config.gamma,
                config.seed,
            ));
        }

        let mut coordinator = UpdateCoordinator::new(
            Arc::clone(&shared),
            trainer,
            state_dim,
            action_dim,
            config.update_depth.get(),
        );
        if let Some(path) = &config.checkpoint_path {
            coordinator = coordinator.with_checkpoint(path.clone());
        }

        Ok(Self {
            shared,
            workers,
            coordinator,
        })
    }

    /// Gives a handle able to stop the session from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.shared))
    }

    /// Runs the training until the episode cap is reached or a stop is requested.
    ///
    /// The workers are joined first, then the coordinator is stopped, so a batch completed by
    /// the last episodes is still trained on.
    ///
    /// # Errors
    /// `Io` if a thread can't be spawned, `ThreadPanicked` if one panicked.
    pub fn run(self) -> Result<TrainingReport> {
        let Self {
            shared,
            workers,
            coordinator,
        } = self;

        info!(
            "training started: workers={} min_batch_size={} max_episodes={}",
            workers.len(),
            shared.min_batch(),
            shared.max_episodes()
        );

        let updater = spawn("updater".to_string(), &shared, move || coordinator.run())?;

        let mut handles = Vec::with_capacity(workers.len());
        for worker in workers {
            let name = format!("worker-{}", worker.id());
            handles.push(spawn(name, &shared, move || worker.run())?);
        }

        let mut panicked = None;
        let mut report = TrainingReport::default();

        for (name, handle) in handles {
            match handle.join() {
                Ok(metrics) => report.workers.push(metrics),
                Err(_) => {
                    error!("thread {name} panicked");
                    panicked.get_or_insert(name);
                }
            }
        }

        shared.request_stop();

        let (name, handle) = updater;
        match handle.join() {
            Ok(updates) => report.updates = updates,
            Err(_) => {
                error!("thread {name} panicked");
                panicked.get_or_insert(name);
            }
        }

        if let Some(name) = panicked {
            return Err(OrchestraErr::ThreadPanicked(name));
        }

        report.episodes = shared.take_episodes();

        info!(
            "training finished: episodes={} updates={}",
            report.episodes.len(),
            report.updates.len()
        );
        Ok(report)
    }
}

/// Spawns a named thread, stopping the session if it can't be spawned.
fn spawn<F, R>(name: String, shared: &SharedState, f: F) -> Result<(String, JoinHandle<R>)>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    match thread::Builder::new().name(name.clone()).spawn(f) {
        Ok(handle) => Ok((name, handle)),
        Err(e) => {
            shared.request_stop();
            Err(e.into())
        }
    }
}
