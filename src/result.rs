use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    model::conflicts::ConstraintCounts,
    problem::{Minutes, Section},
    scenario::Scenario,
    solvers::{cp::SearchStatistics, Schedule},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStatus {
    Optimal,
    Feasible,
    Failed,
    InsufficientData,
    Error,
}

impl OptimizationStatus {
    /// Whether the result carries a schedule.
    pub fn is_solved(self) -> bool {
        matches!(self, OptimizationStatus::Optimal | OptimizationStatus::Feasible)
    }
}

/// Original and adjusted times of one train.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainAdjustment {
    /// Written as the key of the schedule object rather than as a field.
    #[serde(default, skip_serializing)]
    pub train_id: String,
    pub original_entry: Minutes,
    pub original_exit: Minutes,
    pub optimized_entry: Minutes,
    pub optimized_exit: Minutes,
    pub entry_deviation: Minutes,
    pub exit_deviation: Minutes,
    pub journey_time: Minutes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journey_date: Option<NaiveDate>,
}

impl TrainAdjustment {
    pub fn is_adjusted(&self) -> bool {
        self.entry_deviation != 0 || self.exit_deviation != 0
    }

    pub fn total_deviation(&self) -> Minutes {
        self.entry_deviation.abs() + self.exit_deviation.abs()
    }
}

/// The outcome of one optimization call. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub status: OptimizationStatus,
    pub scenario: Scenario,
    pub total_trains: usize,
    pub trains_adjusted: usize,
    pub total_deviation_minutes: Minutes,
    pub average_deviation: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "by_train_id")]
    pub optimized_schedule: Vec<TrainAdjustment>,
    pub solve_time_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<ConstraintCounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput_score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Set when the schedule comes from the greedy fallback instead of the solver.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub heuristic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchStatistics>,
}

/// The schedule as a JSON object keyed by train id, in input order.
mod by_train_id {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use serde_json::{Map, Value};

    use super::TrainAdjustment;

    pub fn serialize<S: Serializer>(
        schedule: &[TrainAdjustment],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(schedule.iter().map(|a| (&a.train_id, a)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<TrainAdjustment>, D::Error> {
        Map::<String, Value>::deserialize(deserializer)?
            .into_iter()
            .map(|(train_id, value)| {
                let adjustment: TrainAdjustment =
                    serde_json::from_value(value).map_err(D::Error::custom)?;
                Ok(TrainAdjustment {
                    train_id,
                    ..adjustment
                })
            })
            .collect()
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl OptimizationResult {
    fn empty(status: OptimizationStatus, scenario: Scenario, total_trains: usize) -> Self {
        OptimizationResult {
            status,
            scenario,
            total_trains,
            trains_adjusted: 0,
            total_deviation_minutes: 0,
            average_deviation: 0.0,
            optimized_schedule: Vec::new(),
            solve_time_seconds: 0.0,
            constraints: None,
            objective_value: None,
            throughput_score: None,
            reason: None,
            error: None,
            message: None,
            heuristic: false,
            search: None,
        }
    }

    pub fn insufficient_data(scenario: Scenario, total_trains: usize) -> Self {
        OptimizationResult {
            message: Some("Need at least 2 trains for optimization".to_string()),
            ..Self::empty(OptimizationStatus::InsufficientData, scenario, total_trains)
        }
    }

    pub fn error(scenario: Scenario, total_trains: usize, error: impl ToString) -> Self {
        OptimizationResult {
            error: Some(error.to_string()),
            ..Self::empty(OptimizationStatus::Error, scenario, total_trains)
        }
    }

    pub fn failed(
        scenario: Scenario,
        total_trains: usize,
        reason: impl Into<String>,
        solve_time_seconds: f64,
        constraints: ConstraintCounts,
    ) -> Self {
        OptimizationResult {
            reason: Some(reason.into()),
            solve_time_seconds: round_to(solve_time_seconds, 2),
            constraints: Some(constraints),
            ..Self::empty(OptimizationStatus::Failed, scenario, total_trains)
        }
    }

    /// Builds a solved result from adjusted `(entry, exit)` times in section order.
    pub fn solved(
        status: OptimizationStatus,
        scenario: Scenario,
        section: &Section,
        schedule: &Schedule,
        solve_time_seconds: f64,
        constraints: ConstraintCounts,
    ) -> Self {
        let optimized_schedule: Vec<TrainAdjustment> = section
            .trains
            .iter()
            .zip(schedule.iter())
            .map(|(train, &(entry, exit))| TrainAdjustment {
                train_id: train.train_id.clone(),
                original_entry: train.entry_time,
                original_exit: train.exit_time,
                optimized_entry: entry,
                optimized_exit: exit,
                entry_deviation: entry - train.entry_time,
                exit_deviation: exit - train.exit_time,
                journey_time: exit - entry,
                entry_platform: train.entry_platform.clone(),
                exit_platform: train.exit_platform.clone(),
                journey_date: train.journey_date,
            })
            .collect();

        let total_trains = section.len();
        let trains_adjusted = optimized_schedule.iter().filter(|a| a.is_adjusted()).count();
        let total_deviation_minutes: Minutes =
            optimized_schedule.iter().map(TrainAdjustment::total_deviation).sum();
        let average_deviation = if total_trains > 0 {
            total_deviation_minutes as f64 / (2 * total_trains) as f64
        } else {
            0.0
        };

        OptimizationResult {
            trains_adjusted,
            total_deviation_minutes,
            average_deviation,
            optimized_schedule,
            solve_time_seconds: round_to(solve_time_seconds, 2),
            constraints: Some(constraints),
            ..Self::empty(status, scenario, total_trains)
        }
    }

    /// `(entry, exit)` per train, as accepted by [`Section::verify_solution`].
    pub fn adjusted_times(&self) -> Vec<(Minutes, Minutes)> {
        self.optimized_schedule
            .iter()
            .map(|a| (a.optimized_entry, a.optimized_exit))
            .collect()
    }

    pub fn min_headway_minutes(&self) -> Option<Minutes> {
        self.constraints.map(|c| c.min_headway_minutes)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
