use rand::{
    Rng,
    distr::{Distribution, weighted::WeightedIndex},
    seq::SliceRandom,
};

use crate::{
    error::{OrchestraErr, Result},
    rollout::PassHistory,
};

/// Turns action probabilities into an action not applied yet this episode.
///
/// The candidates are shuffled and then stable-sorted by descending probability, so equally
/// likely actions are ranked at random. Each draw is either the next ranked action or a
/// sample from the whole distribution, with equal odds. The first drawn action missing from
/// `excluded` is returned.
///
/// # Arguments
/// * `probs` - The policy's probability for every action.
/// * `excluded` - The passes already applied this episode.
/// * `rng` - The worker's random source.
///
/// # Errors
/// `ActionsExhausted` if every action was already applied.
pub fn pick_unapplied<R: Rng>(probs: &[f32], excluded: &PassHistory, rng: &mut R) -> Result<usize> {
    if excluded.is_exhausted(probs.len()) {
        return Err(OrchestraErr::ActionsExhausted {
            actions: probs.len(),
        });
    }

    let mut ranked: Vec<(usize, f32)> = probs.iter().copied().enumerate().collect();
    ranked.shuffle(rng);
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    // Degenerate distributions (all zero, NaN) leave only the ranked walk.
    let sampler = WeightedIndex::new(probs.iter().map(|p| p.max(0.0))).ok();
    let mut next = 0;

    loop {
        let action = match &sampler {
            Some(sampler) if rng.random_bool(0.5) => sampler.sample(rng),
            _ => {
                let (action, _) = ranked[next];
                next += 1;
                action
            }
        };

        if !excluded.contains(action) {
            return Ok(action);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn test_never_returns_an_applied_pass() {
        let mut rng = StdRng::seed_from_u64(11);
        let probs = [0.7, 0.1, 0.1, 0.1];
        let mut history = PassHistory::new();

        for _ in 0..probs.len() {
            let action = pick_unapplied(&probs, &history, &mut rng).unwrap();
            assert!(history.insert(action), "pass {action} picked twice");
        }
    }

    #[test]
    fn test_exhausted_history_is_an_error() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut history = PassHistory::new();
        history.insert(0);
        history.insert(1);

        assert!(matches!(
            pick_unapplied(&[0.5, 0.5], &history, &mut rng),
            Err(OrchestraErr::ActionsExhausted { actions: 2 })
        ));
    }

    #[test]
    fn test_certain_action_is_picked() {
        let mut rng = StdRng::seed_from_u64(4);
        let history = PassHistory::new();

        for _ in 0..20 {
            assert_eq!(pick_unapplied(&[0.0, 1.0, 0.0], &history, &mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn test_degenerate_distribution_still_picks() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut history = PassHistory::new();
        history.insert(0);

        let action = pick_unapplied(&[0.0, 0.0, 0.0], &history, &mut rng).unwrap();
        assert_ne!(action, 0);
    }
}
