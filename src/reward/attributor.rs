use crate::{
    error::{OrchestraErr, Result},
    profile::UsageSnapshot,
};

/// Base credit weight of every function.
pub const ALPHA: f64 = 2.0;
/// Boost applied to functions whose profiling status changed or that were profiled twice.
pub const BETA: f64 = 2.0;

/// Per-function rewards, in the order of the attributed names.
pub type RewardMap = Vec<(String, f64)>;

/// The significance of a change in total cycles relative to the target's noise.
///
/// `|(|delta| - sigma)| / (2 * sigma)`, two standard deviations being the band of a 95%
/// confidence interval.
///
/// # Errors
/// `DegenerateMetric` if `sigma` is zero.
pub fn sigma_ratio(delta: f64, sigma: f64) -> Result<f64> {
    if sigma == 0.0 {
        return Err(OrchestraErr::DegenerateMetric { what: "sigma" });
    }

    finite((delta.abs() - sigma).abs() / (2.0 * sigma), "sigma ratio")
}

/// How a single function's credit is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Credit comes from the whole-program delta.
    Aggregate(Hint),
    /// Credit comes from the function's own cycles, both samples know its usage.
    PerFunction,
}

/// What a change in profiling status suggests about a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hint {
    None,
    /// Became visible to the profiler, it probably got slower.
    Slowdown,
    /// Vanished from the profile, it probably got faster.
    Speedup,
}

/// Splits one whole-program measurement into per-function rewards.
///
/// Every function named by either profile is attributed, old names first. The profiled
/// ratio weighting per-function credit is the share of those names the new profile observed.
///
/// # Arguments
/// * `old_usage` - The profile before applying the pass.
/// * `new_usage` - The profile after applying the pass.
/// * `old_total` - Total cycles before applying the pass.
/// * `new_total` - Total cycles after applying the pass.
/// * `sigma` - Historical standard deviation of the target's total cycles.
///
/// # Returns
/// The reward of every function named by either profile, and `new_usage` to be fed as the
/// `old_usage` of the next step.
///
/// # Errors
/// `DegenerateMetric` if `sigma`, `old_total` or a function's old cycles are zero.
pub fn attribute(
    old_usage: &UsageSnapshot,
    new_usage: UsageSnapshot,
    old_total: f64,
    new_total: f64,
    sigma: f64,
) -> Result<(RewardMap, UsageSnapshot)> {
    let mut names: Vec<&str> = old_usage.names().collect();
    names.extend(new_usage.names().filter(|name| !old_usage.contains(name)));

    if names.is_empty() {
        return Ok((Vec::new(), new_usage));
    }

    if old_total == 0.0 {
        return Err(OrchestraErr::DegenerateMetric {
            what: "old total cycles",
        });
    }

    let delta = old_total - new_total;
    let sigma_ratio = sigma_ratio(delta, sigma)?;
    let profiled_ratio = new_usage.observed() as f64 / names.len() as f64;

    let mut rewards = Vec::with_capacity(names.len());
    for name in names {
        let old = old_usage.get(name);
        let new = new_usage.get(name);

        let (mode, mut alpha) = match (old, new) {
            (None, None) => (Mode::Aggregate(Hint::None), ALPHA),
            (None, Some(_)) => (Mode::Aggregate(Hint::Slowdown), ALPHA * BETA),
            (Some(_), None) => (Mode::Aggregate(Hint::Speedup), ALPHA * BETA),
            (Some(_), Some(_)) => (Mode::PerFunction, ALPHA * BETA * (1.0 / profiled_ratio)),
        };

        let reward = match mode {
            Mode::Aggregate(hint) => {
                let mut delta = delta;
                let contradicted = match hint {
                    Hint::Slowdown => delta > 0.0,
                    Hint::Speedup => delta < 0.0,
                    Hint::None => false,
                };

                if contradicted {
                    alpha /= BETA;
                    delta = -delta;
                }

                alpha * sigma_ratio * (delta / old_total)
            }
            Mode::PerFunction => {
                let old_cycles = old_total * old.unwrap_or_default();
                let new_cycles = new_total * new.unwrap_or_default();

                if old_cycles == 0.0 {
                    return Err(OrchestraErr::DegenerateMetric {
                        what: "old function cycles",
                    });
                }

                alpha * sigma_ratio * ((old_cycles - new_cycles) / old_cycles)
            }
        };

        rewards.push((name.to_string(), finite(reward, "function reward")?));
    }

    Ok((rewards, new_usage))
}

fn finite(value: f64, what: &'static str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(OrchestraErr::DegenerateMetric { what })
    }
}
