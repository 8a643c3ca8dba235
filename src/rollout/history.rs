use std::collections::HashSet;

/// The passes already applied during the current episode.
///
/// A pass is applied at most once per episode, so every chosen action is checked against
/// this set before stepping the environment.
#[derive(Debug, Clone, Default)]
pub struct PassHistory {
    applied: HashSet<usize>,
}

impl PassHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `action` as applied.
    ///
    /// # Returns
    /// `false` if it had already been applied this episode.
    pub fn insert(&mut self, action: usize) -> bool {
        self.applied.insert(action)
    }

    pub fn contains(&self, action: usize) -> bool {
        self.applied.contains(&action)
    }

    /// The lowest action of `0..actions` not applied yet.
    pub fn first_unused(&self, actions: usize) -> Option<usize> {
        (0..actions).find(|a| !self.applied.contains(a))
    }

    /// Whether every action of `0..actions` was already applied.
    pub fn is_exhausted(&self, actions: usize) -> bool {
        self.first_unused(actions).is_none()
    }

    pub fn clear(&mut self) {
        self.applied.clear();
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}
