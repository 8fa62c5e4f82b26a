use typed_index_collections::TiVec;

use crate::problem::{Minutes, TrainIdx};

pub mod cp;
pub mod greedy;

/// Adjusted `(entry, exit)` per train, in section order.
pub type Schedule = TiVec<TrainIdx, (Minutes, Minutes)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SolverError {
    #[error("no schedule satisfies the constraints")]
    NoSolution,
    #[error("the time budget ran out before any schedule was found")]
    Timeout,
}

impl SolverError {
    /// Short status name reported as the failure reason.
    pub fn status_name(self) -> &'static str {
        match self {
            SolverError::NoSolution => "INFEASIBLE",
            SolverError::Timeout => "UNKNOWN",
        }
    }
}
