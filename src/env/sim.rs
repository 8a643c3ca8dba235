use std::num::NonZeroUsize;

use log::debug;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal, Uniform};
use serde::Deserialize;

use super::{Environment, Step, StepInfo};
use crate::{
    error::{OrchestraErr, Result},
    profile::{FeatureSet, UsageSnapshot},
};

const FUNCTION_NAMES: [&str; 8] = [
    "main",
    "parse_input",
    "compute_kernel",
    "reduce_rows",
    "write_output",
    "hash_lookup",
    "sort_records",
    "init_tables",
];

/// Reward reported for a target that failed to build.
const BUILD_FAILURE_REWARD: f64 = -1.0;

/// Parameters of the simulated target program.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub target: String,
    pub functions: NonZeroUsize,
    pub passes: NonZeroUsize,
    pub episode_len: NonZeroUsize,
    /// Length of every feature vector, the last two entries are dynamic.
    pub feature_dim: NonZeroUsize,
    pub base_cycles: f64,
    /// Relative standard deviation of a cycles measurement.
    pub noise: f64,
    pub failure_rate: f64,
    /// Functions below this share of the run are not reported by the profiler.
    pub visibility: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            target: "sim-bench".to_string(),
            functions: NonZeroUsize::new(6).unwrap_or(NonZeroUsize::MIN),
            passes: NonZeroUsize::new(34).unwrap_or(NonZeroUsize::MIN),
            episode_len: NonZeroUsize::new(8).unwrap_or(NonZeroUsize::MIN),
            feature_dim: NonZeroUsize::new(8).unwrap_or(NonZeroUsize::MIN),
            base_cycles: 1e6,
            noise: 0.01,
            failure_rate: 0.02,
            visibility: 0.05,
        }
    }
}

impl SimConfig {
    /// The noise band of the target, what a metric table would hold for it.
    pub fn sigma(&self) -> f64 {
        self.base_cycles * self.noise
    }

    /// # Errors
    /// `Configuration` describing the first invalid parameter.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(OrchestraErr::Configuration(format!("environment: {msg}")));

        if self.feature_dim.get() < 2 {
            return invalid("feature_dim must be at least 2");
        }
        if !(self.base_cycles > 0.0) {
            return invalid("base_cycles must be positive");
        }
        if !(self.noise >= 0.0) {
            return invalid("noise must not be negative");
        }
        if !(0.0..1.0).contains(&self.failure_rate) {
            return invalid("failure_rate must be in [0, 1)");
        }
        if !(0.0..1.0).contains(&self.visibility) {
            return invalid("visibility must be in [0, 1)");
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Function {
    target_name: String,
    profiler_name: String,
    base_cycles: f64,
    cycles: f64,
    statics: Vec<f32>,
}

/// A synthetic target program standing in for a real compiler and profiler.
///
/// Every pass scales the cycles of every function by a fixed factor drawn at construction,
/// so the best pass sequence is learnable. Functions are known to the target by mangled
/// names (`_Z6kernelv`) while the profiler reports the plain ones (`kernel`), measurements
/// carry gaussian noise and builds fail now and then.
pub struct SimulatedEnvironment {
    config: SimConfig,
    rng: StdRng,
    noise: Normal<f64>,
    functions: Vec<Function>,
    effects: Vec<Vec<f64>>,
    steps: usize,
    last: StepInfo,
}

impl SimulatedEnvironment {
    /// Creates a new `SimulatedEnvironment`.
    ///
    /// # Arguments
    /// * `config` - The program's parameters.
    /// * `seed` - Seeds both the program layout and the measurement noise.
    ///
    /// # Returns
    /// A `Configuration` error if `config` is invalid.
    pub fn new(config: SimConfig, seed: u64) -> Result<Self> {
        config.validate()?;

        let distr_err = |e: &dyn std::fmt::Display| OrchestraErr::Configuration(e.to_string());
        let mut rng = StdRng::seed_from_u64(seed);
        let weight_distr = Uniform::new(0.5, 5.0).map_err(|e| distr_err(&e))?;
        let effect_distr = Uniform::new(0.85, 1.08).map_err(|e| distr_err(&e))?;
        let static_distr = Uniform::new(0.0f32, 1.0).map_err(|e| distr_err(&e))?;
        let noise = Normal::new(0.0, config.noise).map_err(|e| distr_err(&e))?;

        let shares: Vec<f64> = (0..config.functions.get())
            .map(|_| weight_distr.sample(&mut rng))
            .collect();
        let total_share: f64 = shares.iter().sum();

        let functions: Vec<Function> = shares
            .iter()
            .enumerate()
            .map(|(i, share)| {
                let base = FUNCTION_NAMES[i % FUNCTION_NAMES.len()];
                let profiler_name = match i / FUNCTION_NAMES.len() {
                    0 => base.to_string(),
                    n => format!("{base}_{n}"),
                };
                let cycles = config.base_cycles * share / total_share;

                Function {
                    target_name: format!("_Z{}{}v", profiler_name.len(), profiler_name),
                    profiler_name,
                    base_cycles: cycles,
                    cycles,
                    statics: (0..config.feature_dim.get() - 2)
                        .map(|_| static_distr.sample(&mut rng))
                        .collect(),
                }
            })
            .collect();

        let effects: Vec<Vec<f64>> = (0..config.passes.get())
            .map(|_| {
                (0..config.functions.get())
                    .map(|_| effect_distr.sample(&mut rng))
                    .collect()
            })
            .collect();

        Ok(Self {
            config,
            rng,
            noise,
            functions,
            effects,
            steps: 0,
            last: StepInfo {
                total_cycles: 0.0,
                usage: UsageSnapshot::new(),
            },
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Reseeds the measurement noise and the build failures, the program is kept.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn exact_cycles(&self) -> f64 {
        self.functions.iter().map(|f| f.cycles).sum()
    }

    fn measure(&mut self) -> Result<StepInfo> {
        let exact = self.exact_cycles();
        let total_cycles = (exact * (1.0 + self.noise.sample(&mut self.rng))).max(1.0);

        let visibility = self.config.visibility;
        let usage = UsageSnapshot::from_entries(self.functions.iter().map(|f| {
            let share = (f.cycles / exact).min(1.0);
            let fraction = (share >= visibility).then_some(share);
            (f.profiler_name.clone(), fraction)
        }))?;

        Ok(StepInfo {
            total_cycles,
            usage,
        })
    }

    fn features(&self) -> FeatureSet {
        let exact = self.exact_cycles();
        let progress = self.steps as f32 / self.config.episode_len.get() as f32;

        self.functions
            .iter()
            .map(|f| {
                let mut features = f.statics.clone();
                features.push((f.cycles / exact) as f32);
                features.push(progress);
                (f.target_name.clone(), features)
            })
            .collect()
    }
}

impl Environment for SimulatedEnvironment {
    fn target(&self) -> &str {
        &self.config.target
    }

    fn action_count(&self) -> usize {
        self.config.passes.get()
    }

    fn state_dim(&self) -> usize {
        self.config.feature_dim.get()
    }

    fn reset(&mut self) -> Result<(FeatureSet, StepInfo)> {
        self.steps = 0;
        self.functions
            .iter_mut()
            .for_each(|f| f.cycles = f.base_cycles);

        self.last = self.measure()?;
        Ok((self.features(), self.last.clone()))
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        let Some(effects) = self.effects.get(action) else {
            return Err(OrchestraErr::Environment(format!("unknown pass {action}")));
        };

        self.steps += 1;

        if self.rng.random::<f64>() < self.config.failure_rate {
            debug!("simulated build failure: pass={action}");
            return Ok(Step {
                features: self.features(),
                reward: BUILD_FAILURE_REWARD,
                done: true,
                info: self.last.clone(),
            });
        }

        for (f, effect) in self.functions.iter_mut().zip(effects) {
            f.cycles *= effect;
        }

        let info = self.measure()?;
        let reward = (self.last.total_cycles / info.total_cycles - 1.0).max(0.0);
        self.last = info.clone();

        Ok(Step {
            features: self.features(),
            reward,
            done: self.steps >= self.config.episode_len.get(),
            info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::resolve;

    fn quiet_config() -> SimConfig {
        SimConfig {
            failure_rate: 0.0,
            episode_len: NonZeroUsize::new(3).unwrap(),
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_profiled_names_resolve_to_target_names() {
        let mut env = SimulatedEnvironment::new(quiet_config(), 3).unwrap();
        let (features, info) = env.reset().unwrap();

        assert_eq!(features.len(), info.usage.len());
        for name in info.usage.names() {
            assert!(!features.contains(name));
            assert!(resolve(name, features.names()).is_some(), "{name} unresolved");
        }
    }

    #[test]
    fn test_features_have_the_configured_length() {
        let mut env = SimulatedEnvironment::new(quiet_config(), 3).unwrap();
        let (features, _) = env.reset().unwrap();

        for (_, vector) in features.iter() {
            assert_eq!(vector.len(), env.state_dim());
        }
    }

    #[test]
    fn test_episode_ends_after_configured_steps() {
        let mut env = SimulatedEnvironment::new(quiet_config(), 5).unwrap();
        env.reset().unwrap();

        assert!(!env.step(0).unwrap().done);
        assert!(!env.step(1).unwrap().done);
        let last = env.step(2).unwrap();
        assert!(last.done);
        assert!(last.reward >= 0.0);
    }

    #[test]
    fn test_same_seed_same_program() {
        let mut a = SimulatedEnvironment::new(quiet_config(), 9).unwrap();
        let mut b = SimulatedEnvironment::new(quiet_config(), 9).unwrap();

        assert_eq!(a.reset().unwrap().1, b.reset().unwrap().1);
        assert_eq!(a.step(4).unwrap().info, b.step(4).unwrap().info);
    }

    #[test]
    fn test_reseed_keeps_the_program() {
        let mut a = SimulatedEnvironment::new(quiet_config(), 9).unwrap();
        let mut b = SimulatedEnvironment::new(quiet_config(), 9).unwrap();
        b.reseed(10);

        let (features_a, info_a) = a.reset().unwrap();
        let (features_b, info_b) = b.reset().unwrap();

        let names_a: Vec<_> = features_a.names().collect();
        let names_b: Vec<_> = features_b.names().collect();
        assert_eq!(names_a, names_b);
        assert_eq!(info_a.usage, info_b.usage);
        assert_ne!(info_a.total_cycles, info_b.total_cycles);
    }

    #[test]
    fn test_unknown_pass_is_an_error() {
        let mut env = SimulatedEnvironment::new(quiet_config(), 1).unwrap();
        env.reset().unwrap();
        assert!(matches!(env.step(1000), Err(OrchestraErr::Environment(_))));
    }

    #[test]
    fn test_failing_builds_report_negative_reward() {
        let config = SimConfig {
            failure_rate: 0.999,
            ..SimConfig::default()
        };
        let mut env = SimulatedEnvironment::new(config, 1).unwrap();
        env.reset().unwrap();

        let step = env.step(0).unwrap();
        assert!(step.reward < 0.0);
        assert!(step.done);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SimConfig {
            failure_rate: 1.0,
            ..SimConfig::default()
        };
        assert!(matches!(
            SimulatedEnvironment::new(config, 0),
            Err(OrchestraErr::Configuration(_))
        ));
    }
}
