use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

use serde::Deserialize;

use crate::error::{OrchestraErr, Result};

/// Historical statistics of a target's whole-program cycles.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MeanSigma {
    pub mean: f64,
    pub sigma: f64,
}

/// Where the noise band of every target comes from.
pub trait MetricSource {
    /// # Errors
    /// `Configuration` if `target` is unknown.
    fn mean_sigma_for(&self, target: &str) -> Result<MeanSigma>;
}

/// A metric source backed by a JSON object of `{ "<target>": { "mean": .., "sigma": .. } }`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct MetricTable {
    targets: HashMap<String, MeanSigma>,
}

impl MetricTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the table at `path`.
    ///
    /// # Errors
    /// `Configuration` if the file can't be opened, `Json` if it's malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            OrchestraErr::Configuration(format!("metric table {}: {e}", path.display()))
        })?;

        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn insert(&mut self, target: impl Into<String>, stats: MeanSigma) {
        self.targets.insert(target.into(), stats);
    }
}

impl MetricSource for MetricTable {
    fn mean_sigma_for(&self, target: &str) -> Result<MeanSigma> {
        self.targets.get(target).copied().ok_or_else(|| {
            OrchestraErr::Configuration(format!("no metrics recorded for target '{target}'"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_target_table() {
        let table: MetricTable =
            serde_json::from_str(r#"{ "bench": { "mean": 1000.0, "sigma": 50.0 } }"#).unwrap();

        assert_eq!(
            table.mean_sigma_for("bench").unwrap(),
            MeanSigma {
                mean: 1000.0,
                sigma: 50.0
            }
        );
    }

    #[test]
    fn test_unknown_target_is_a_configuration_error() {
        let table = MetricTable::new();
        assert!(matches!(
            table.mean_sigma_for("missing"),
            Err(OrchestraErr::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_file_is_a_configuration_error() {
        assert!(matches!(
            MetricTable::load(Path::new("/nonexistent/metrics.json")),
            Err(OrchestraErr::Configuration(_))
        ));
    }
}
