use std::{path::PathBuf, sync::Arc};

use log::{debug, error, info};

use super::SharedState;
use crate::{agent::Trainer, error::Result, rollout::Batch};

/// The outcome of one policy update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStats {
    pub rows: usize,
    /// The actor loss of the last actor iteration.
    pub actor_loss: f32,
    /// The critic loss of the last critic iteration.
    pub critic_loss: f32,
}

/// Requests a stop when the coordinator finishes, panics included, so no worker is left
/// blocked on the collect gate.
struct StopOnDrop(Arc<SharedState>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.request_stop();
    }
}

/// The single consumer of the experience batch.
///
/// Waits for a complete batch, trains on it and lets the workers collect again, until the
/// episode cap is reached or a stop is requested.
pub struct UpdateCoordinator<T: Trainer> {
    shared: Arc<SharedState>,
    trainer: T,
    state_dim: usize,
    action_dim: usize,
    update_depth: usize,
    checkpoint: Option<PathBuf>,
}

impl<T: Trainer> UpdateCoordinator<T> {
    /// Creates a new `UpdateCoordinator`.
    ///
    /// # Arguments
    /// * `shared` - The state shared with the workers.
    /// * `trainer` - The policy trainer.
    /// * `state_dim` - The length of a feature vector.
    /// * `action_dim` - The size of the action space.
    /// * `update_depth` - The amount of actor and of critic iterations per update.
    pub fn new(
        shared: Arc<SharedState>,
        trainer: T,
        state_dim: usize,
        action_dim: usize,
        update_depth: usize,
    ) -> Self {
        Self {
            shared,
            trainer,
            state_dim,
            action_dim,
            update_depth,
            checkpoint: None,
        }
    }

    /// Saves a checkpoint at `path` after every update.
    pub fn with_checkpoint(mut self, path: PathBuf) -> Self {
        self.checkpoint = Some(path);
        self
    }

    /// Runs the coordinator until the training ends.
    ///
    /// A batch completed before a stop is still trained on. A failed update is logged and
    /// its rows are lost, training goes on with the next batch.
    ///
    /// # Returns
    /// The stats of every update.
    pub fn run(mut self) -> Vec<UpdateStats> {
        let _guard = StopOnDrop(Arc::clone(&self.shared));
        let mut updates = Vec::new();

        while self.shared.wait_for_update() {
            match self.update() {
                Ok(Some(stats)) => {
                    info!(
                        "policy updated: update={} rows={} actor_loss={} critic_loss={}",
                        updates.len() + 1,
                        stats.rows,
                        stats.actor_loss,
                        stats.critic_loss
                    );
                    updates.push(stats);
                }
                Ok(None) => debug!("update triggered with an empty queue"),
                Err(e) => error!("policy update failed: {e}"),
            }

            if self.shared.should_stop() || self.shared.cap_reached() {
                break;
            }

            self.shared.resume();
        }

        info!("update coordinator finished: updates={}", updates.len());
        updates
    }

    fn update(&mut self) -> Result<Option<UpdateStats>> {
        self.trainer.update_old_policy();

        let rows = self.shared.drain();
        if rows.is_empty() {
            return Ok(None);
        }

        let batch = Batch::new(rows, self.state_dim, self.action_dim)?;
        let advantages = self.trainer.advantages(&batch)?;

        let mut actor_loss = 0.0;
        for _ in 0..self.update_depth {
            actor_loss = self.trainer.actor_step(&batch, &advantages)?;
        }

        let mut critic_loss = 0.0;
        for _ in 0..self.update_depth {
            critic_loss = self.trainer.critic_step(&batch)?;
        }

        if let Some(path) = &self.checkpoint {
            self.trainer.save_checkpoint(path)?;
        }

        Ok(Some(UpdateStats {
            rows: batch.len(),
            actor_loss,
            critic_loss,
        }))
    }
}
