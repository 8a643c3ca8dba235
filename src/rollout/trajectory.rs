use std::collections::BTreeMap;

use super::ExperienceRow;

/// Discounted returns of every buffered sub-unit, in append order.
pub type Returns = BTreeMap<String, Vec<f64>>;

#[derive(Debug, Clone)]
struct Transition {
    features: Vec<f32>,
    action: usize,
    reward: f64,
}

/// Accumulates the `(state, action, reward)` transitions of each sub-unit during an episode.
#[derive(Debug, Clone)]
pub struct TrajectoryBuffer {
    action_dim: usize,
    trajectories: BTreeMap<String, Vec<Transition>>,
}

impl TrajectoryBuffer {
    /// Creates a new `TrajectoryBuffer`.
    ///
    /// # Arguments
    /// * `action_dim` - The size of the action space, used to one-hot encode actions.
    pub fn new(action_dim: usize) -> Self {
        Self {
            action_dim,
            trajectories: BTreeMap::new(),
        }
    }

    /// Records a transition of `name`.
    ///
    /// Transitions of unnamed sub-units can't be told apart, an empty `name` drops the
    /// transition along with anything previously buffered under the empty name.
    pub fn append(&mut self, name: &str, features: Vec<f32>, action: usize, reward: f64) {
        if name.is_empty() {
            self.trajectories.remove(name);
            return;
        }

        self.trajectories
            .entry(name.to_string())
            .or_default()
            .push(Transition {
                features,
                action,
                reward,
            });
    }

    /// Computes the discounted returns of every trajectory.
    ///
    /// # Arguments
    /// * `bootstrap` - The value estimate of each sub-unit's next state, `0` if missing.
    /// * `gamma` - The discount factor.
    pub fn discount(&self, bootstrap: &BTreeMap<String, f64>, gamma: f64) -> Returns {
        self.trajectories
            .iter()
            .map(|(name, transitions)| {
                let mut value = bootstrap.get(name).copied().unwrap_or_default();
                let mut returns: Vec<f64> = transitions
                    .iter()
                    .rev()
                    .map(|t| {
                        value = t.reward + gamma * value;
                        value
                    })
                    .collect();

                returns.reverse();
                (name.clone(), returns)
            })
            .collect()
    }

    /// Turns every buffered transition into an `ExperienceRow`.
    ///
    /// # Arguments
    /// * `returns` - The output of `discount`, trajectories without returns are skipped.
    pub fn flatten(&self, returns: &Returns) -> Vec<ExperienceRow> {
        self.trajectories
            .iter()
            .filter_map(|(name, transitions)| returns.get(name).map(|r| (transitions, r)))
            .flat_map(|(transitions, returns)| transitions.iter().zip(returns))
            .map(|(t, &ret)| ExperienceRow::new(&t.features, t.action, self.action_dim, ret as f32))
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.trajectories.keys().map(String::as_str)
    }

    /// Amount of buffered transitions.
    pub fn len(&self) -> usize {
        self.trajectories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.trajectories.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_backward_recurrence() {
        let mut buffer = TrajectoryBuffer::new(2);
        for _ in 0..3 {
            buffer.append("main", vec![0.0], 0, 1.0);
        }

        let returns = buffer.discount(&BTreeMap::new(), 0.5);
        assert_eq!(returns["main"], [1.75, 1.5, 1.0]);
    }

    #[test]
    fn test_discount_uses_bootstrap_value() {
        let mut buffer = TrajectoryBuffer::new(2);
        buffer.append("main", vec![0.0], 0, 1.0);
        buffer.append("main", vec![0.0], 1, 0.0);

        let bootstrap = BTreeMap::from([("main".to_string(), 4.0)]);
        let returns = buffer.discount(&bootstrap, 0.5);
        assert_eq!(returns["main"], [1.0 + 0.5 * 2.0, 2.0]);
    }

    #[test]
    fn test_empty_name_purges_its_entries() {
        let mut buffer = TrajectoryBuffer::new(2);
        buffer.trajectories.insert(
            String::new(),
            vec![Transition {
                features: vec![1.0],
                action: 0,
                reward: 1.0,
            }],
        );
        buffer.append("kernel", vec![1.0], 0, 1.0);
        buffer.append("", vec![1.0], 1, 1.0);

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.names().collect::<Vec<_>>(), ["kernel"]);
    }

    #[test]
    fn test_flatten_rows() {
        let mut buffer = TrajectoryBuffer::new(3);
        buffer.append("a", vec![0.5], 2, 1.0);
        buffer.append("b", vec![0.25], 0, 2.0);

        let returns = buffer.discount(&BTreeMap::new(), 0.9);
        let mut rows: Vec<_> = buffer
            .flatten(&returns)
            .into_iter()
            .map(|r| r.as_slice().to_vec())
            .collect();
        rows.sort_by(|a, b| a[0].total_cmp(&b[0]));

        assert_eq!(rows, [vec![0.25, 1.0, 0.0, 0.0, 2.0], vec![0.5, 0.0, 0.0, 1.0, 1.0]]);
    }

    #[test]
    fn test_clear() {
        let mut buffer = TrajectoryBuffer::new(1);
        buffer.append("a", vec![], 0, 1.0);
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
