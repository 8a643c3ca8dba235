use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use log::{debug, error, info, warn};
use rand::{SeedableRng, rngs::StdRng};

use super::{ExperienceRow, PassHistory, TrajectoryBuffer, WorkerMetrics};
use crate::{
    agent::Policy,
    coordination::{Admission, EpisodeSummary, SharedState},
    env::Environment,
    error::{OrchestraErr, Result},
    profile::{FeatureSet, resolve, select},
    reward::{RewardMap, attribute},
};

/// Consecutive abandoned episodes after which a worker gives up.
const MAX_CONSECUTIVE_FAILURES: usize = 32;

/// Drives episodes against one environment and publishes the experience to the batch.
///
/// Every successful step is attributed, discounted and flushed right away, so a worker never
/// holds rows across an update.
pub struct RolloutWorker<E, P> {
    id: usize,
    env: E,
    policy: Arc<P>,
    shared: Arc<SharedState>,
    sigma: f64,
    gamma: f64,
    rng: StdRng,
    history: PassHistory,
    buffer: TrajectoryBuffer,
    metrics: WorkerMetrics,
}

impl<E, P> RolloutWorker<E, P>
where
    E: Environment,
    P: Policy,
{
    /// Creates a new `RolloutWorker`.
    ///
    /// # Arguments
    /// * `id` - The worker's id, also offsets the seed.
    /// * `env` - The environment to collect from.
    /// * `policy` - The policy shared by every worker.
    /// * `shared` - The batch and gates shared with the update coordinator.
    /// * `sigma` - The historical noise of the environment's target.
    /// * `gamma` - The discount factor.
    /// * `seed` - Seeds the worker's random source, drawn from the OS if `None`.
    pub fn new(
        id: usize,
        env: E,
        policy: Arc<P>,
        shared: Arc<SharedState>,
        sigma: f64,
        gamma: f64,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            None => StdRng::from_os_rng(),
        };
        let buffer = TrajectoryBuffer::new(env.action_count());

        Self {
            id,
            env,
            policy,
            shared,
            sigma,
            gamma,
            rng,
            history: PassHistory::new(),
            buffer,
            metrics: WorkerMetrics::default(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn metrics(&self) -> &WorkerMetrics {
        &self.metrics
    }

    /// Runs episodes until a stop is requested or the episode cap is reached.
    pub fn run(mut self) -> WorkerMetrics {
        let mut failures = 0;

        while !self.shared.should_stop() && !self.shared.cap_reached() {
            match self.run_episode() {
                Ok(Some(summary)) => {
                    failures = 0;
                    self.metrics.bump_episode();

                    info!(
                        "episode finished: worker_id={} steps={} mean_reward={:.4} speedup={:.4}",
                        self.id, summary.steps, summary.mean_reward, summary.speedup
                    );
                    self.shared.record_episode(summary);
                }
                Ok(None) => break,
                Err(e) => {
                    failures += 1;
                    self.metrics.bump_abandoned();
                    if let OrchestraErr::BuildFailure { .. } = e {
                        self.metrics.bump_build_failure();
                    }

                    warn!("episode abandoned: worker_id={} {e}", self.id);

                    if failures >= MAX_CONSECUTIVE_FAILURES {
                        error!(
                            "worker giving up after {failures} failed episodes: worker_id={}",
                            self.id
                        );
                        break;
                    }
                }
            }
        }

        self.history.clear();
        self.buffer.clear();

        info!("worker finished: worker_id={}", self.id);
        self.metrics
    }

    /// Runs one episode.
    ///
    /// # Returns
    /// The episode's summary, `None` if a stop interrupted it or an error if it was abandoned.
    pub fn run_episode(&mut self) -> Result<Option<EpisodeSummary>> {
        self.history.clear();
        self.buffer.clear();

        let (mut features, info) = self.env.reset()?;
        let actions = self.env.action_count();
        let initial_cycles = info.total_cycles;
        let mut old_usage = info.usage;
        let mut old_total = info.total_cycles;
        let mut steps = 0;
        let mut reward_sum = 0.0;

        loop {
            if self.shared.should_stop() {
                return Ok(None);
            }
            let Some(generation) = self.shared.wait_for_collect() else {
                return Ok(None);
            };

            self.buffer.clear();

            if self.history.is_exhausted(actions) {
                debug!(worker_id = self.id; "every pass applied, ending episode");
                break;
            }

            let unit = select(&features, &old_usage, &mut self.rng)?;
            let action = self.choose_action(&unit.features)?;
            self.history.insert(action);

            let step = self.env.step(action)?;
            if step.reward < 0.0 {
                return Err(OrchestraErr::BuildFailure {
                    action,
                    reward: step.reward,
                });
            }

            let total = step.info.total_cycles;
            let (rewards, new_usage) =
                attribute(&old_usage, step.info.usage, old_total, total, self.sigma)?;

            let rows = self.collect_rows(&features, &step.features, action, &rewards)?;
            self.publish(generation, rows);

            debug!(
                "step done: worker_id={} unit={} action={action} reward={:.4}",
                self.id, unit.name, step.reward
            );

            self.metrics.bump_step();
            steps += 1;
            reward_sum += step.reward;
            old_usage = new_usage;
            old_total = total;
            features = step.features;

            if step.done {
                break;
            }
        }

        Ok(Some(EpisodeSummary {
            worker_id: self.id,
            steps,
            mean_reward: if steps > 0 {
                reward_sum / steps as f64
            } else {
                0.0
            },
            speedup: if old_total > 0.0 {
                initial_cycles / old_total
            } else {
                1.0
            },
        }))
    }

    /// Asks the policy for an action, replacing one that was already applied or is out of
    /// range with the lowest unused action.
    fn choose_action(&mut self, state: &[f32]) -> Result<usize> {
        let actions = self.env.action_count();
        let action = self.policy.choose_action(state, &self.history, &mut self.rng)?;

        if action < actions && !self.history.contains(action) {
            return Ok(action);
        }

        let fallback = self
            .history
            .first_unused(actions)
            .ok_or(OrchestraErr::ActionsExhausted { actions })?;

        warn!(
            "policy chose an unavailable pass: worker_id={} action={action} fallback={fallback}",
            self.id
        );
        Ok(fallback)
    }

    /// Buffers the rewarded sub-units of the step and turns them into experience rows.
    ///
    /// Profiled names are mapped to target sub-units, the first name resolving to a sub-unit
    /// wins and later ones are skipped. Rewards of names that match no sub-unit are dropped.
    fn collect_rows(
        &mut self,
        features: &FeatureSet,
        next: &FeatureSet,
        action: usize,
        rewards: &RewardMap,
    ) -> Result<Vec<ExperienceRow>> {
        let mut seen = HashSet::new();

        for (name, reward) in rewards {
            let target = match features.contains(name) {
                true => Some(name.as_str()),
                false => resolve(name, features.names()),
            };

            let Some(target) = target else {
                debug!("{}", OrchestraErr::NameResolution { name: name.clone() });
                self.buffer.append("", Vec::new(), action, *reward);
                continue;
            };

            if !seen.insert(target) {
                continue;
            }

            if let Some(state) = features.get(target) {
                self.buffer.append(target, state.to_vec(), action, *reward);
            }
        }

        let mut bootstrap = BTreeMap::new();
        for name in self.buffer.names() {
            let value = match next.get(name) {
                Some(state) => self.policy.value_of(state)?,
                None => 0.0,
            };
            bootstrap.insert(name.to_string(), value);
        }

        let returns = self.buffer.discount(&bootstrap, self.gamma);
        let rows = self.buffer.flatten(&returns);
        self.buffer.clear();

        Ok(rows)
    }

    fn publish(&mut self, generation: u64, rows: Vec<ExperienceRow>) {
        let n = rows.len();

        match self.shared.publish(generation, rows) {
            Admission::Accepted => self.metrics.add_published(n),
            Admission::Triggered => {
                self.metrics.add_published(n);
                info!(
                    "batch complete, update triggered: worker_id={} rows={}",
                    self.id,
                    self.shared.batch_count()
                );
            }
            Admission::Rejected => {
                self.metrics.add_rejected(n);
                warn!(
                    "batch complete or policy updated meanwhile, rows dropped: worker_id={} rows={n}",
                    self.id
                );
            }
        }
    }
}
