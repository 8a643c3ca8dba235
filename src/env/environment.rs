use crate::{
    error::Result,
    profile::{FeatureSet, UsageSnapshot},
};

/// What the environment measured after building and profiling the target.
#[derive(Debug, Clone, PartialEq)]
pub struct StepInfo {
    /// Whole-program cycles of the latest run.
    pub total_cycles: f64,
    /// Per-function usage, keyed by profiler-native names.
    pub usage: UsageSnapshot,
}

/// The outcome of applying a pass.
#[derive(Debug, Clone)]
pub struct Step {
    pub features: FeatureSet,
    /// Negative when the target failed to build.
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
}

/// A compiler driver that applies passes to one target program and profiles the result.
pub trait Environment {
    /// The name of the target program, used to look up its historical noise.
    fn target(&self) -> &str;

    /// The size of the pass (action) space.
    fn action_count(&self) -> usize;

    /// The length of every sub-unit feature vector.
    fn state_dim(&self) -> usize;

    /// Starts a new episode from the unoptimized target.
    fn reset(&mut self) -> Result<(FeatureSet, StepInfo)>;

    /// Applies `action` on top of the passes applied so far this episode.
    fn step(&mut self, action: usize) -> Result<Step>;
}
