#![allow(dead_code)]

use std::{
    path::Path,
    sync::{
        Arc,
        mpsc::{Receiver, Sender},
    },
};

use parking_lot::Mutex;
use rand::Rng;

use pass_orchestra::{
    Result,
    agent::{Policy, Trainer},
    env::{Environment, Step, StepInfo},
    metrics::{MeanSigma, MetricTable},
    profile::{FeatureSet, UsageSnapshot},
    rollout::{Batch, PassHistory},
};

pub const TARGET: &str = "scripted";
pub const STATE_DIM: usize = 2;

/// A deterministic target where every pass shaves 10% off every function.
pub struct ScriptedEnv {
    /// `(target name, profiler name)` of every function.
    functions: Vec<(String, String)>,
    /// Profiler names that match no function.
    ghosts: Vec<String>,
    /// Profiler names of functions that take no cycles.
    idle: Vec<String>,
    hold: Option<Hold>,
    actions: usize,
    episode_len: usize,
    fail_at: Option<usize>,
    cycles: f64,
    steps: usize,
    pub applied: Arc<Mutex<Vec<Vec<usize>>>>,
}

impl ScriptedEnv {
    pub fn new(functions: &[(&str, &str)], actions: usize, episode_len: usize) -> Self {
        Self {
            functions: functions
                .iter()
                .map(|(t, p)| (t.to_string(), p.to_string()))
                .collect(),
            ghosts: Vec::new(),
            idle: Vec::new(),
            hold: None,
            actions,
            episode_len,
            fail_at: None,
            cycles: 1000.0,
            steps: 0,
            applied: Arc::default(),
        }
    }

    /// A single function `main`, known by the same name to the target and the profiler.
    pub fn single(actions: usize, episode_len: usize) -> Self {
        Self::new(&[("main", "main")], actions, episode_len)
    }

    pub fn with_ghost(mut self, name: &str) -> Self {
        self.ghosts.push(name.to_string());
        self
    }

    /// Profiles a function `name` that takes none of the cycles.
    pub fn with_idle(mut self, name: &str) -> Self {
        self.idle.push(name.to_string());
        self
    }

    /// Blocks the `step`th step of every episode, counting from 1, until released.
    ///
    /// `entered` is notified once the step is blocked, the step goes on when `release` is.
    pub fn holding_at(mut self, step: usize, entered: Sender<()>, release: Receiver<()>) -> Self {
        self.hold = Some(Hold {
            step,
            entered,
            release,
        });
        self
    }

    /// Makes the build fail at the `step`th step of every episode, counting from 1.
    pub fn failing_at(mut self, step: usize) -> Self {
        self.fail_at = Some(step);
        self
    }

    fn info(&self) -> StepInfo {
        let share = 1.0 / self.functions.len() as f64;
        let usage = self
            .functions
            .iter()
            .map(|(_, p)| (p.clone(), Some(share)))
            .chain(self.ghosts.iter().map(|g| (g.clone(), Some(0.1))))
            .chain(self.idle.iter().map(|i| (i.clone(), Some(0.0))));

        StepInfo {
            total_cycles: self.cycles,
            usage: UsageSnapshot::from_entries(usage).unwrap(),
        }
    }

    fn features(&self) -> FeatureSet {
        let progress = self.steps as f32 / self.episode_len as f32;
        self.functions
            .iter()
            .enumerate()
            .map(|(i, (t, _))| (t.clone(), vec![i as f32, progress]))
            .collect()
    }
}

struct Hold {
    step: usize,
    entered: Sender<()>,
    release: Receiver<()>,
}

impl Environment for ScriptedEnv {
    fn target(&self) -> &str {
        TARGET
    }

    fn action_count(&self) -> usize {
        self.actions
    }

    fn state_dim(&self) -> usize {
        STATE_DIM
    }

    fn reset(&mut self) -> Result<(FeatureSet, StepInfo)> {
        self.cycles = 1000.0;
        self.steps = 0;
        self.applied.lock().push(Vec::new());
        Ok((self.features(), self.info()))
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        self.steps += 1;
        if let Some(episode) = self.applied.lock().last_mut() {
            episode.push(action);
        }

        if let Some(hold) = self.hold.as_ref().filter(|h| h.step == self.steps) {
            hold.entered.send(()).unwrap();
            hold.release.recv().unwrap();
        }

        if self.fail_at == Some(self.steps) {
            return Ok(Step {
                features: self.features(),
                reward: -1.0,
                done: true,
                info: self.info(),
            });
        }

        self.cycles *= 0.9;
        Ok(Step {
            features: self.features(),
            reward: 0.1,
            done: self.steps >= self.episode_len,
            info: self.info(),
        })
    }
}

/// Always answers with the same action, applied or not.
pub struct StubbornPolicy(pub usize);

impl Policy for StubbornPolicy {
    fn choose_action<R: Rng>(&self, _: &[f32], _: &PassHistory, _: &mut R) -> Result<usize> {
        Ok(self.0)
    }

    fn value_of(&self, _: &[f32]) -> Result<f64> {
        Ok(0.0)
    }
}

/// Records the size of every batch it's asked to train on.
#[derive(Default)]
pub struct RecordingTrainer {
    pub batches: Mutex<Vec<usize>>,
}

impl Trainer for RecordingTrainer {
    fn update_old_policy(&self) {}

    fn advantages(&self, batch: &Batch) -> Result<Vec<f32>> {
        self.batches.lock().push(batch.len());
        Ok(batch.returns().to_vec())
    }

    fn actor_step(&self, _: &Batch, _: &[f32]) -> Result<f32> {
        Ok(0.0)
    }

    fn critic_step(&self, _: &Batch) -> Result<f32> {
        Ok(0.0)
    }

    fn save_checkpoint(&self, _: &Path) -> Result<()> {
        Ok(())
    }
}

pub fn metrics(sigma: f64) -> MetricTable {
    let mut table = MetricTable::new();
    table.insert(
        TARGET,
        MeanSigma {
            mean: 1000.0,
            sigma,
        },
    );
    table
}
