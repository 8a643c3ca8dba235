use std::{error::Error, fmt, io};

/// The crate's result type.
pub type Result<T> = std::result::Result<T, OrchestraErr>;

/// Failures raised while collecting rollouts or updating the policy.
///
/// `BuildFailure`, `NameResolution` and `DegenerateMetric` are per-episode failures, the
/// rollout loop logs them and moves on. `Configuration` is fatal and raised before any
/// thread is started.
#[derive(Debug)]
pub enum OrchestraErr {
    /// The environment reported a negative immediate reward for `action`.
    BuildFailure { action: usize, reward: f64 },
    /// No target sub-unit matches a profiler-reported name.
    NameResolution { name: String },
    /// A reward denominator was zero or produced a non finite value.
    DegenerateMetric { what: &'static str },
    /// Invalid or missing configuration, metric tables included.
    Configuration(String),
    /// A usage fraction outside of `[0, 1]`.
    InvalidUsage { name: String, fraction: f64 },
    /// The environment exposed a target without sub-units.
    EmptyTarget,
    /// Every action of the action space was already applied during the episode.
    ActionsExhausted { actions: usize },
    /// An experience row doesn't match the batch's state and action sizes.
    RowSizeMismatch { got: usize, expected: usize },
    /// The environment failed for a reason other than a failed build.
    Environment(String),
    /// A rollout or update thread panicked.
    ThreadPanicked(String),
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for OrchestraErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildFailure { action, reward } => {
                write!(f, "build failed after pass {action}: reward {reward}")
            }
            Self::NameResolution { name } => {
                write!(f, "no sub-unit matches profiled name '{name}'")
            }
            Self::DegenerateMetric { what } => write!(f, "degenerate metric: {what} is zero"),
            Self::Configuration(msg) => write!(f, "invalid configuration: {msg}"),
            Self::InvalidUsage { name, fraction } => {
                write!(f, "usage fraction {fraction} of '{name}' is outside [0, 1]")
            }
            Self::EmptyTarget => write!(f, "target exposes no sub-units"),
            Self::ActionsExhausted { actions } => {
                write!(f, "all {actions} passes were already applied this episode")
            }
            Self::RowSizeMismatch { got, expected } => {
                write!(f, "experience row has {got} values, expected {expected}")
            }
            Self::Environment(msg) => write!(f, "environment error: {msg}"),
            Self::ThreadPanicked(name) => write!(f, "thread '{name}' panicked"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl Error for OrchestraErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for OrchestraErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for OrchestraErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_keeps_its_source() {
        let err = OrchestraErr::from(io::Error::other("disk gone"));
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "io error: disk gone");
    }

    #[test]
    fn test_degenerate_metric_message() {
        let err = OrchestraErr::DegenerateMetric { what: "sigma" };
        assert_eq!(err.to_string(), "degenerate metric: sigma is zero");
        assert!(err.source().is_none());
    }
}
