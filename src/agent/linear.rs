use std::{
    fs::File,
    io::{BufReader, BufWriter, ErrorKind},
    path::Path,
};

use log::info;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use parking_lot::RwLock;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::{Policy, Trainer, pick_unapplied};
use crate::{
    error::{OrchestraErr, Result},
    rollout::{Batch, PassHistory},
};

const RATIO_EPSILON: f32 = 1e-6;

/// Learning rates and clipping of the PPO update.
#[derive(Debug, Clone, Copy)]
pub struct PpoParams {
    pub actor_lr: f32,
    pub critic_lr: f32,
    pub clip_epsilon: f32,
}

#[derive(Serialize, Deserialize)]
struct Checkpoint {
    state_dim: usize,
    action_dim: usize,
    actor: Vec<f32>,
    critic: Vec<f32>,
}

/// A single layer actor-critic.
///
/// The actor is `softmax(s W + b)` and the critic `s w + c`. Parameters of each head are
/// stored flat, weights first and biases last.
pub struct LinearAgent {
    state_dim: usize,
    action_dim: usize,
    params: PpoParams,
    actor: RwLock<Vec<f32>>,
    old_actor: RwLock<Vec<f32>>,
    critic: RwLock<Vec<f32>>,
}

impl LinearAgent {
    /// Creates a new `LinearAgent` with weights drawn from `N(0, 0.1)` and zero biases.
    ///
    /// # Arguments
    /// * `state_dim` - The length of a feature vector.
    /// * `action_dim` - The amount of passes.
    /// * `params` - The hyperparameters of the update.
    /// * `rng` - The source of the initial weights.
    pub fn new<R: Rng>(
        state_dim: usize,
        action_dim: usize,
        params: PpoParams,
        rng: &mut R,
    ) -> Result<Self> {
        if state_dim == 0 || action_dim == 0 {
            return Err(OrchestraErr::Configuration(
                "agent needs a non empty state and action space".to_string(),
            ));
        }

        let distr =
            Normal::new(0.0, 0.1).map_err(|e| OrchestraErr::Configuration(e.to_string()))?;
        let mut init = |cols: usize| -> Vec<f32> {
            let mut head: Vec<f32> = (0..state_dim * cols)
                .map(|_| distr.sample(&mut *rng))
                .collect();
            head.resize(head.len() + cols, 0.0);
            head
        };

        let actor = init(action_dim);
        let critic = init(1);

        Ok(Self {
            state_dim,
            action_dim,
            params,
            old_actor: RwLock::new(actor.clone()),
            actor: RwLock::new(actor),
            critic: RwLock::new(critic),
        })
    }

    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    /// The action probabilities of the current actor for `state`.
    pub fn probabilities(&self, state: &[f32]) -> Result<Vec<f32>> {
        let x = self.single(state)?;
        let actor = self.actor.read();
        let probs = self.policy_of(&actor, x)?;

        Ok(probs.iter().copied().collect())
    }

    /// Writes both heads to `path` as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let checkpoint = Checkpoint {
            state_dim: self.state_dim,
            action_dim: self.action_dim,
            actor: self.actor.read().clone(),
            critic: self.critic.read().clone(),
        };

        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &checkpoint)?;
        Ok(())
    }

    /// Loads the parameters saved at `path`, if any.
    ///
    /// # Returns
    /// Whether a checkpoint was found, or `Configuration` if it was saved for other dimensions.
    pub fn restore(&self, path: &Path) -> Result<bool> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let checkpoint: Checkpoint = serde_json::from_reader(BufReader::new(file))?;

        if checkpoint.state_dim != self.state_dim
            || checkpoint.action_dim != self.action_dim
            || checkpoint.actor.len() != self.head_len(self.action_dim)
            || checkpoint.critic.len() != self.head_len(1)
        {
            return Err(OrchestraErr::Configuration(format!(
                "checkpoint {} is for a {}x{} agent, expected {}x{}",
                path.display(),
                checkpoint.state_dim,
                checkpoint.action_dim,
                self.state_dim,
                self.action_dim
            )));
        }

        *self.old_actor.write() = checkpoint.actor.clone();
        *self.actor.write() = checkpoint.actor;
        *self.critic.write() = checkpoint.critic;

        info!("restored checkpoint from {}", path.display());
        Ok(true)
    }

    fn head_len(&self, cols: usize) -> usize {
        (self.state_dim + 1) * cols
    }

    fn single<'a>(&self, state: &'a [f32]) -> Result<ArrayView2<'a, f32>> {
        ArrayView2::from_shape((1, self.state_dim), state).map_err(|_| {
            OrchestraErr::RowSizeMismatch {
                got: state.len(),
                expected: self.state_dim,
            }
        })
    }

    /// Gives a view of a flat head as its weights and biases.
    fn view_head<'a>(
        &self,
        head: &'a [f32],
        cols: usize,
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        let mismatch = |_| OrchestraErr::RowSizeMismatch {
            got: head.len(),
            expected: self.head_len(cols),
        };

        let w_size = self.state_dim * cols;
        let (w_raw, b_raw) = head.split_at(w_size.min(head.len()));
        let w = ArrayView2::from_shape((self.state_dim, cols), w_raw).map_err(mismatch)?;
        let b = ArrayView1::from_shape(cols, b_raw).map_err(mismatch)?;
        Ok((w, b))
    }

    fn linear(&self, head: &[f32], cols: usize, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let (w, b) = self.view_head(head, cols)?;
        let mut z = x.dot(&w);
        z += &b;
        Ok(z)
    }

    /// Row-wise softmax of the actor logits.
    fn policy_of(&self, head: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut z = self.linear(head, self.action_dim, x)?;

        for mut row in z.rows_mut() {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row /= sum;
        }

        Ok(z)
    }

    fn values(&self, head: &[f32], x: ArrayView2<f32>) -> Result<Array1<f32>> {
        Ok(self.linear(head, 1, x)?.column(0).to_owned())
    }

    /// Turns the gradient of the loss wrt the pre-activations into a flat head gradient.
    fn head_grad(x: ArrayView2<f32>, dz: &Array2<f32>) -> Vec<f32> {
        let dw = x.t().dot(dz);
        let db = dz.sum_axis(Axis(0));
        dw.iter().chain(db.iter()).copied().collect()
    }

    fn descend(head: &mut [f32], grad: &[f32], lr: f32) {
        for (w, g) in head.iter_mut().zip(grad) {
            *w -= lr * g;
        }
    }

    fn check_batch(&self, batch: &Batch) -> Result<()> {
        let expected = self.state_dim + self.action_dim + 1;

        if batch.state_dim() != self.state_dim || batch.action_dim() != self.action_dim {
            return Err(OrchestraErr::RowSizeMismatch {
                got: batch.state_dim() + batch.action_dim() + 1,
                expected,
            });
        }

        Ok(())
    }
}

impl Policy for LinearAgent {
    fn choose_action<R: Rng>(
        &self,
        state: &[f32],
        excluded: &PassHistory,
        rng: &mut R,
    ) -> Result<usize> {
        let probs = self.probabilities(state)?;
        pick_unapplied(&probs, excluded, rng)
    }

    fn value_of(&self, state: &[f32]) -> Result<f64> {
        let x = self.single(state)?;
        let critic = self.critic.read();
        let values = self.values(&critic, x)?;

        Ok(values.first().copied().unwrap_or_default() as f64)
    }
}

impl Trainer for LinearAgent {
    fn update_old_policy(&self) {
        let actor = self.actor.read().clone();
        *self.old_actor.write() = actor;
    }

    fn advantages(&self, batch: &Batch) -> Result<Vec<f32>> {
        self.check_batch(batch)?;

        let states = batch.states();
        let critic = self.critic.read();
        let values = self.values(&critic, states.view())?;

        Ok((batch.returns() - values).to_vec())
    }

    /// Takes a step on the clipped surrogate `-mean(min(r A, clip(r, 1-e, 1+e) A))`.
    fn actor_step(&self, batch: &Batch, advantages: &[f32]) -> Result<f32> {
        self.check_batch(batch)?;
        if advantages.len() != batch.len() {
            return Err(OrchestraErr::RowSizeMismatch {
                got: advantages.len(),
                expected: batch.len(),
            });
        }
        if batch.is_empty() {
            return Ok(0.0);
        }

        let states = batch.states();
        let actions = batch.actions();
        let n = batch.len() as f32;
        let eps = self.params.clip_epsilon;

        let old_probs = {
            let old_actor = self.old_actor.read();
            self.policy_of(&old_actor, states.view())?
        };

        let mut actor = self.actor.write();
        let probs = self.policy_of(&actor, states.view())?;

        let mut loss = 0.0;
        let mut dz = Array2::zeros(probs.raw_dim());

        for (i, (&a, &adv)) in actions.iter().zip(advantages).enumerate() {
            let pi = probs.row(i);
            let old = old_probs[[i, a]] + RATIO_EPSILON;
            let ratio = pi[a] / old;
            let surrogate = ratio * adv;
            let clipped = ratio.clamp(1.0 - eps, 1.0 + eps) * adv;
            loss -= surrogate.min(clipped) / n;

            // Constant wrt the parameters while the clipped term is the smaller one.
            if surrogate > clipped {
                continue;
            }

            let g = -adv / (old * n);
            for (j, &pj) in pi.iter().enumerate() {
                let delta = if j == a { 1.0 } else { 0.0 };
                dz[[i, j]] = g * pi[a] * (delta - pj);
            }
        }

        let grad = Self::head_grad(states.view(), &dz);
        Self::descend(&mut actor, &grad, self.params.actor_lr);

        Ok(loss)
    }

    fn critic_step(&self, batch: &Batch) -> Result<f32> {
        self.check_batch(batch)?;
        if batch.is_empty() {
            return Ok(0.0);
        }

        let states = batch.states();
        let returns = batch.returns();
        let n = batch.len() as f32;

        let mut critic = self.critic.write();
        let error = self.values(&critic, states.view())? - &returns;
        let loss = error.mapv(|e| e.powi(2)).mean().unwrap_or_default();

        let dv = (error * (2.0 / n)).insert_axis(Axis(1));
        let grad = Self::head_grad(states.view(), &dv);
        Self::descend(&mut critic, &grad, self.params.critic_lr);

        Ok(loss)
    }

    fn save_checkpoint(&self, path: &Path) -> Result<()> {
        self.save(path)
    }
}
