/// Dense `num_states × num_actions` table of action values, stored row-major.
///
/// Dimensions are fixed at construction and validated by the engine, so the
/// accessors here index directly.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionValueTable {
    num_states: usize,
    num_actions: usize,
    values: Vec<f64>,
}

impl ActionValueTable {
    pub(crate) fn zeros(num_states: usize, num_actions: usize) -> Self {
        Self {
            num_states,
            num_actions,
            values: vec![0.0; num_states * num_actions],
        }
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    #[inline]
    fn offset(&self, state: usize, action: usize) -> usize {
        debug_assert!(state < self.num_states && action < self.num_actions);
        state * self.num_actions + action
    }

    pub fn get(&self, state: usize, action: usize) -> f64 {
        self.values[self.offset(state, action)]
    }

    pub(crate) fn set(&mut self, state: usize, action: usize, value: f64) {
        let offset = self.offset(state, action);
        self.values[offset] = value;
    }

    pub fn row(&self, state: usize) -> &[f64] {
        let start = state * self.num_actions;
        &self.values[start..start + self.num_actions]
    }

    pub(crate) fn row_mut(&mut self, state: usize) -> &mut [f64] {
        let start = state * self.num_actions;
        &mut self.values[start..start + self.num_actions]
    }

    /// Index of the largest value in `state`'s row; ties go to the lowest index.
    pub fn argmax(&self, state: usize) -> usize {
        let mut best = 0;
        let row = self.row(state);
        for (action, value) in row.iter().enumerate().skip(1) {
            if *value > row[best] {
                best = action;
            }
        }
        best
    }

    pub fn max(&self, state: usize) -> f64 {
        self.get(state, self.argmax(state))
    }
}
