use serde::{Deserialize, Serialize};

use crate::control::state_mapper::CongestionState;
use crate::error::ConfigError;

/// Score for every (throughput, delay) bucket pair, indexed
/// `scores[throughput][delay]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreTable {
    pub scores: [[f64; 3]; 3],
}

impl ScoreTable {
    /// Penalises high delay hardest; prefers medium-or-better throughput at
    /// low-to-medium delay.
    pub const BALANCED: Self = Self::graded(0.0, 1.0, 3.0, 5.0, 20.0, 30.0);

    /// Same shape as [`BALANCED`](Self::BALANCED) with a larger payoff for
    /// the good states.
    pub const THROUGHPUT_HEAVY: Self = Self::graded(0.0, 1.0, 2.0, 5.0, 20.0, 50.0);

    /// Build the common layout: the three high-delay cells, then low and
    /// medium throughput at low delay, then everything else.
    pub const fn graded(
        low_tp_high_delay: f64,
        med_tp_high_delay: f64,
        high_tp_high_delay: f64,
        low_tp_low_delay: f64,
        med_tp_low_delay: f64,
        otherwise: f64,
    ) -> Self {
        Self {
            scores: [
                [low_tp_low_delay, otherwise, low_tp_high_delay],
                [med_tp_low_delay, otherwise, med_tp_high_delay],
                [otherwise, otherwise, high_tp_high_delay],
            ],
        }
    }

    pub fn score(&self, state: CongestionState) -> f64 {
        self.scores[state.throughput.index()][state.delay.index()]
    }

    pub(crate) fn is_finite(&self) -> bool {
        self.scores.iter().flatten().all(|s| s.is_finite())
    }
}

impl Default for ScoreTable {
    fn default() -> Self {
        Self::BALANCED
    }
}

/// How an epoch's outcome is turned into a scalar reward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum RewardFunction {
    /// Look the discretised state up in a score table.
    Table(ScoreTable),
    /// Throughput over smoothed RTT ("power").
    Power,
    /// Fixed payoff for the (state, action) pair the epoch ran under,
    /// indexed `scores[state][action]`.
    PerAction { scores: Vec<Vec<f64>> },
}

impl Default for RewardFunction {
    fn default() -> Self {
        Self::Table(ScoreTable::default())
    }
}

impl RewardFunction {
    /// Reward for an epoch that ran under `taken = (state, action)` and ended
    /// in `state` with the given smoothed signals.
    pub fn reward(
        &self,
        taken: (usize, usize),
        state: CongestionState,
        throughput: f64,
        rtt_ms: f64,
    ) -> f64 {
        match self {
            Self::Table(table) => table.score(state),
            Self::Power if rtt_ms > 0.0 => throughput / rtt_ms,
            Self::Power => 0.0,
            Self::PerAction { scores } => scores
                .get(taken.0)
                .and_then(|row| row.get(taken.1))
                .copied()
                .unwrap_or(0.0),
        }
    }

    /// A `num_states x num_actions` table paying `value` for one pair and
    /// nothing elsewhere.
    pub fn single_payoff(
        num_states: usize,
        num_actions: usize,
        state: usize,
        action: usize,
        value: f64,
    ) -> Self {
        let mut scores = vec![vec![0.0; num_actions]; num_states];
        if let Some(cell) = scores.get_mut(state).and_then(|row| row.get_mut(action)) {
            *cell = value;
        }
        Self::PerAction { scores }
    }

    pub(crate) fn validate(
        &self,
        num_states: usize,
        num_actions: usize,
    ) -> Result<(), ConfigError> {
        match self {
            Self::Table(table) if !table.is_finite() => Err(ConfigError::InvalidParameter {
                name: "learning.reward.scores",
                value: f64::NAN,
            }),
            Self::PerAction { scores } => {
                if scores.len() != num_states {
                    return Err(ConfigError::InvalidParameter {
                        name: "learning.reward.scores",
                        value: scores.len() as f64,
                    });
                }
                if let Some(row) = scores.iter().find(|row| row.len() != num_actions) {
                    return Err(ConfigError::InvalidParameter {
                        name: "learning.reward.scores",
                        value: row.len() as f64,
                    });
                }
                if let Some(bad) = scores.iter().flatten().find(|v| !v.is_finite()) {
                    return Err(ConfigError::InvalidParameter {
                        name: "learning.reward.scores",
                        value: *bad,
                    });
                }
                Ok(())
            }
            Self::Table(_) | Self::Power => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::state_mapper::Bucket;

    fn state(tp: Bucket, delay: Bucket) -> CongestionState {
        CongestionState::new(tp, delay)
    }

    #[test]
    fn test_balanced_scores() {
        let table = ScoreTable::BALANCED;
        assert_eq!(table.score(state(Bucket::Low, Bucket::High)), 0.0);
        assert_eq!(table.score(state(Bucket::Med, Bucket::High)), 1.0);
        assert_eq!(table.score(state(Bucket::High, Bucket::High)), 3.0);
        assert_eq!(table.score(state(Bucket::Low, Bucket::Low)), 5.0);
        assert_eq!(table.score(state(Bucket::Med, Bucket::Low)), 20.0);
        assert_eq!(table.score(state(Bucket::Low, Bucket::Med)), 30.0);
        assert_eq!(table.score(state(Bucket::High, Bucket::Low)), 30.0);
    }

    #[test]
    fn test_power_reward() {
        let power = RewardFunction::Power;
        let any = state(Bucket::Med, Bucket::Med);
        assert_eq!(power.reward((0, 0), any, 500.0, 50.0), 10.0);
        assert_eq!(power.reward((0, 0), any, 500.0, 0.0), 0.0);
    }

    #[test]
    fn test_per_action_reward() {
        let table = RewardFunction::single_payoff(9, 9, 0, 7, 1.0);
        let low = state(Bucket::Low, Bucket::Low);
        assert_eq!(table.reward((0, 7), low, 10.0, 20.0), 1.0);
        assert_eq!(table.reward((0, 6), low, 10.0, 20.0), 0.0);
        assert_eq!(table.reward((4, 7), low, 10.0, 20.0), 0.0);
        assert!(table.validate(9, 9).is_ok());
        assert!(table.validate(9, 11).is_err());
    }
}
