use std::cmp::Ordering;

use log::debug;
use rand::Rng;

use super::{FeatureSet, SubUnit, UsageSnapshot, resolve};
use crate::error::{OrchestraErr, Result};

/// Picks the sub-unit whose features represent the whole target at the current step.
///
/// The most used function according to `usage` wins. Profiled names are matched against the
/// feature keys directly or through [`resolve`], walking the profiled functions by descending
/// usage (ties keep profile order). When nothing was profiled or nothing resolves, a sub-unit
/// is drawn uniformly at random.
///
/// # Arguments
/// * `features` - The feature vectors of every sub-unit.
/// * `usage` - The latest profiling sample.
/// * `rng` - The random source for the fallback draw.
///
/// # Returns
/// The representative sub-unit, `EmptyTarget` if `features` is empty.
pub fn select<R>(features: &FeatureSet, usage: &UsageSnapshot, rng: &mut R) -> Result<SubUnit>
where
    R: Rng,
{
    if features.is_empty() {
        return Err(OrchestraErr::EmptyTarget);
    }

    let mut observed: Vec<_> = usage
        .iter()
        .filter_map(|(name, f)| f.map(|f| (name, f)))
        .collect();

    // Stable, so equally used functions keep the profiler's order.
    observed.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(Ordering::Equal));

    for (name, fraction) in observed {
        let target = if features.contains(name) {
            Some(name)
        } else {
            resolve(name, features.names())
        };

        if let Some(target) = target {
            let vector = features.get(target).unwrap_or_default();
            return Ok(SubUnit {
                name: target.to_string(),
                usage: Some(fraction),
                features: vector.to_vec(),
            });
        }

        debug!("profiled function '{name}' has no matching sub-unit");
    }

    let i = rng.random_range(0..features.len());
    let (name, vector) = features.nth(i).ok_or(OrchestraErr::EmptyTarget)?;

    Ok(SubUnit {
        name: name.to_string(),
        usage: None,
        features: vector.to_vec(),
    })
}
