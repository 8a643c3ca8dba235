use ndarray::{Array1, Array2};

use crate::error::{OrchestraErr, Result};

/// One training sample: `features ⧺ one_hot(action) ⧺ discounted_return`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperienceRow(Box<[f32]>);

impl ExperienceRow {
    /// Creates a new `ExperienceRow`.
    ///
    /// # Arguments
    /// * `features` - The state the action was taken in.
    /// * `action` - The action taken, out of range actions leave the one-hot block empty.
    /// * `action_dim` - The size of the action space.
    /// * `ret` - The discounted return of the transition.
    pub fn new(features: &[f32], action: usize, action_dim: usize, ret: f32) -> Self {
        let mut row = Vec::with_capacity(features.len() + action_dim + 1);
        row.extend_from_slice(features);
        row.extend((0..action_dim).map(|a| if a == action { 1.0 } else { 0.0 }));
        row.push(ret);

        Self(row.into_boxed_slice())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The discounted return, always the last value of the row.
    pub fn ret(&self) -> f32 {
        self.0.last().copied().unwrap_or_default()
    }
}

/// The rows drained for a single policy update.
#[derive(Debug, Clone)]
pub struct Batch {
    rows: Vec<ExperienceRow>,
    state_dim: usize,
    action_dim: usize,
}

impl Batch {
    /// Creates a new `Batch`.
    ///
    /// # Returns
    /// `RowSizeMismatch` if a row isn't `state_dim + action_dim + 1` long.
    pub fn new(rows: Vec<ExperienceRow>, state_dim: usize, action_dim: usize) -> Result<Self> {
        let expected = state_dim + action_dim + 1;

        if let Some(row) = rows.iter().find(|row| row.len() != expected) {
            return Err(OrchestraErr::RowSizeMismatch {
                got: row.len(),
                expected,
            });
        }

        Ok(Self {
            rows,
            state_dim,
            action_dim,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    pub fn rows(&self) -> &[ExperienceRow] {
        &self.rows
    }

    /// The states as a `(rows, state_dim)` matrix.
    pub fn states(&self) -> Array2<f32> {
        Array2::from_shape_fn((self.rows.len(), self.state_dim), |(i, j)| {
            self.rows[i].as_slice()[j]
        })
    }

    /// The index of the hot entry of every action block.
    pub fn actions(&self) -> Vec<usize> {
        let range = self.state_dim..self.state_dim + self.action_dim;

        self.rows
            .iter()
            .map(|row| {
                row.as_slice()[range.clone()]
                    .iter()
                    .position(|&v| v == 1.0)
                    .unwrap_or_default()
            })
            .collect()
    }

    pub fn returns(&self) -> Array1<f32> {
        self.rows.iter().map(ExperienceRow::ret).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_layout() {
        let row = ExperienceRow::new(&[0.5, 0.25], 1, 3, 2.0);
        assert_eq!(row.as_slice(), [0.5, 0.25, 0.0, 1.0, 0.0, 2.0]);
        assert_eq!(row.ret(), 2.0);
    }

    #[test]
    fn test_batch_views() {
        let rows = vec![
            ExperienceRow::new(&[1.0, 2.0], 0, 2, 0.5),
            ExperienceRow::new(&[3.0, 4.0], 1, 2, -0.5),
        ];
        let batch = Batch::new(rows, 2, 2).unwrap();

        assert_eq!(batch.states(), ndarray::array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(batch.actions(), [0, 1]);
        assert_eq!(batch.returns(), ndarray::array![0.5, -0.5]);
    }

    #[test]
    fn test_mismatched_row_is_rejected() {
        let rows = vec![ExperienceRow::new(&[1.0], 0, 2, 0.5)];
        let err = Batch::new(rows, 2, 2).unwrap_err();
        assert!(matches!(
            err,
            OrchestraErr::RowSizeMismatch {
                got: 4,
                expected: 5
            }
        ));
    }
}
