use std::collections::HashMap;

use crate::error::{OrchestraErr, Result};

/// A named function of the target program.
#[derive(Debug, Clone, PartialEq)]
pub struct SubUnit {
    pub name: String,
    pub usage: Option<f64>,
    pub features: Vec<f32>,
}

/// One profiling sample: the share of the run spent in each function.
///
/// Functions the profiler did not observe are kept as explicit `None` entries, so the set of
/// names survives even when no usage was measured for them. Entries keep insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageSnapshot {
    entries: Vec<(String, Option<f64>)>,
    index: HashMap<String, usize>,
}

impl UsageSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from `(name, fraction)` pairs.
    ///
    /// # Errors
    /// `InvalidUsage` if any known fraction is outside of `[0, 1]`.
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Option<f64>)>,
        S: Into<String>,
    {
        let mut snapshot = Self::new();
        for (name, fraction) in entries {
            snapshot.insert(name, fraction)?;
        }

        Ok(snapshot)
    }

    /// Records the usage of `name`, replacing a previous value if it was already present.
    ///
    /// # Errors
    /// `InvalidUsage` if `fraction` is known and outside of `[0, 1]`.
    pub fn insert(&mut self, name: impl Into<String>, fraction: Option<f64>) -> Result<()> {
        let name = name.into();

        if let Some(f) = fraction {
            if !(0.0..=1.0).contains(&f) {
                return Err(OrchestraErr::InvalidUsage { name, fraction: f });
            }
        }

        match self.index.get(&name) {
            Some(&i) => self.entries[i].1 = fraction,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, fraction));
            }
        }

        Ok(())
    }

    /// The measured fraction of `name`, `None` if unknown or never reported.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.index.get(name).and_then(|&i| self.entries[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + Clone {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.entries.iter().map(|(name, f)| (name.as_str(), *f))
    }

    /// Amount of entries with a known fraction.
    pub fn observed(&self) -> usize {
        self.entries.iter().filter(|(_, f)| f.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The feature vectors of every sub-unit of the target, keyed by target-native names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    units: Vec<(String, Vec<f32>)>,
    index: HashMap<String, usize>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the feature vector of `name`.
    pub fn insert(&mut self, name: impl Into<String>, features: Vec<f32>) {
        let name = name.into();

        match self.index.get(&name) {
            Some(&i) => self.units[i].1 = features,
            None => {
                self.index.insert(name.clone(), self.units.len());
                self.units.push((name, features));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&[f32]> {
        self.index.get(name).map(|&i| self.units[i].1.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + Clone {
        self.units.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.units
            .iter()
            .map(|(name, features)| (name.as_str(), features.as_slice()))
    }

    /// The `i`-th sub-unit in insertion order.
    pub fn nth(&self, i: usize) -> Option<(&str, &[f32])> {
        self.units
            .get(i)
            .map(|(name, features)| (name.as_str(), features.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Vec<f32>)> for FeatureSet {
    fn from_iter<T: IntoIterator<Item = (S, Vec<f32>)>>(iter: T) -> Self {
        let mut set = Self::new();
        for (name, features) in iter {
            set.insert(name, features);
        }

        set
    }
}
