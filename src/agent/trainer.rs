use std::{path::Path, sync::Arc};

use crate::{error::Result, rollout::Batch};

/// Updates the policy from a batch of experience.
///
/// Only the update coordinator drives a `Trainer`, workers never call it.
pub trait Trainer: Send {
    /// Copies the current actor into the old actor the clipped ratio is measured against.
    fn update_old_policy(&self);

    /// The advantage of every row, `return - V(state)` under the current critic.
    fn advantages(&self, batch: &Batch) -> Result<Vec<f32>>;

    /// One optimization step of the actor.
    ///
    /// # Returns
    /// The actor loss before the step.
    fn actor_step(&self, batch: &Batch, advantages: &[f32]) -> Result<f32>;

    /// One optimization step of the critic.
    ///
    /// # Returns
    /// The critic loss before the step.
    fn critic_step(&self, batch: &Batch) -> Result<f32>;

    /// Persists the trained parameters at `path`.
    fn save_checkpoint(&self, path: &Path) -> Result<()>;
}

impl<T: Trainer + Sync + ?Sized> Trainer for Arc<T> {
    fn update_old_policy(&self) {
        (**self).update_old_policy()
    }

    fn advantages(&self, batch: &Batch) -> Result<Vec<f32>> {
        (**self).advantages(batch)
    }

    fn actor_step(&self, batch: &Batch, advantages: &[f32]) -> Result<f32> {
        (**self).actor_step(batch, advantages)
    }

    fn critic_step(&self, batch: &Batch) -> Result<f32> {
        (**self).critic_step(batch)
    }

    fn save_checkpoint(&self, path: &Path) -> Result<()> {
        (**self).save_checkpoint(path)
    }
}
