use rand::Rng;

use crate::{error::Result, rollout::PassHistory};

/// The actor and critic as seen by the rollout workers.
///
/// Shared by every worker thread, so implementations synchronize their own parameters.
pub trait Policy: Send + Sync {
    /// Chooses the next pass to apply.
    ///
    /// # Arguments
    /// * `state` - The feature vector representing the target.
    /// * `excluded` - The passes already applied this episode, never to be returned.
    /// * `rng` - The worker's random source for exploration.
    fn choose_action<R: Rng>(
        &self,
        state: &[f32],
        excluded: &PassHistory,
        rng: &mut R,
    ) -> Result<usize>;

    /// The critic's estimate of the return reachable from `state`.
    fn value_of(&self, state: &[f32]) -> Result<f64>;
}
