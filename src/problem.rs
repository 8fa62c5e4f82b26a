use std::collections::HashSet;

use chrono::NaiveDate;
use derive_more::{From, Into};
use serde::{Deserialize, Serialize};
use typed_index_collections::TiVec;

/// Minutes since midnight.
pub type Minutes = i32;

pub const MINUTES_PER_DAY: Minutes = 1440;
pub const LATEST_MINUTE: Minutes = MINUTES_PER_DAY - 1;
pub const MIN_JOURNEY_FLOOR: Minutes = 15;

/// One train record as supplied by an upstream schedule provider. Times may be missing; such
/// trains are dropped before a model is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainSchedule {
    pub train_id: String,
    #[serde(default)]
    pub entry_time: Option<Minutes>,
    #[serde(default)]
    pub exit_time: Option<Minutes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journey_date: Option<NaiveDate>,
}

impl TrainSchedule {
    pub fn new(train_id: impl Into<String>, entry_time: Minutes, exit_time: Minutes) -> Self {
        TrainSchedule {
            train_id: train_id.into(),
            entry_time: Some(entry_time),
            exit_time: Some(exit_time),
            entry_platform: None,
            exit_platform: None,
            journey_date: None,
        }
    }

    pub fn without_times(train_id: impl Into<String>) -> Self {
        TrainSchedule {
            entry_time: None,
            exit_time: None,
            ..TrainSchedule::new(train_id, 0, 0)
        }
    }

    pub fn with_entry_platform(mut self, platform: impl Into<String>) -> Self {
        self.entry_platform = Some(platform.into());
        self
    }

    pub fn with_exit_platform(mut self, platform: impl Into<String>) -> Self {
        self.exit_platform = Some(platform.into());
        self
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.journey_date = Some(date);
        self
    }

    pub fn is_complete(&self) -> bool {
        self.entry_time.is_some() && self.exit_time.is_some()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, From, Into)]
pub struct TrainIdx(usize);

/// A train with complete timing data, as seen by the optimizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionTrain {
    pub train_id: String,
    pub entry_time: Minutes,
    pub exit_time: Minutes,
    pub entry_platform: Option<String>,
    pub exit_platform: Option<String>,
    pub journey_date: Option<NaiveDate>,
}

impl SectionTrain {
    pub fn journey_time(&self) -> Minutes {
        self.exit_time - self.entry_time
    }

    /// Half the scheduled journey, but never below [`MIN_JOURNEY_FLOOR`].
    pub fn min_journey_time(&self) -> Minutes {
        self.journey_time().div_euclid(2).max(MIN_JOURNEY_FLOOR)
    }

    pub fn shares_entry_platform(&self, other: &SectionTrain) -> bool {
        match (&self.entry_platform, &other.entry_platform) {
            (Some(a), Some(b)) => !a.is_empty() && a == b,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("train {train_id}: {field} {value} is outside the day (0..=1439)")]
    TimeOutOfRange {
        train_id: String,
        field: &'static str,
        value: Minutes,
    },
    #[error("train {train_id}: exit time {exit_time} is not after entry time {entry_time}")]
    NonPositiveJourney {
        train_id: String,
        entry_time: Minutes,
        exit_time: Minutes,
    },
    #[error("duplicate train id {0}")]
    DuplicateTrain(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// The separations and bounds a schedule must respect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeparationRules {
    pub min_headway: Minutes,
    pub platform_separation: Minutes,
    pub max_deviation: Minutes,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("expected times for {expected} trains, got {found}")]
    ShapeMismatch { expected: usize, found: usize },
    #[error("train {0}: adjusted time outside the day")]
    OutsideDay(String),
    #[error("train {train_id}: deviation {deviation} exceeds the bound")]
    Deviation { train_id: String, deviation: Minutes },
    #[error("train {train_id}: journey {journey} is shorter than {required}")]
    Journey {
        train_id: String,
        journey: Minutes,
        required: Minutes,
    },
    #[error("trains {first} and {second}: entries {separation} apart, headway is {required}")]
    Headway {
        first: String,
        second: String,
        separation: Minutes,
        required: Minutes,
    },
    #[error("trains {first} and {second}: share a platform {separation} apart, need {required}")]
    Platform {
        first: String,
        second: String,
        separation: Minutes,
        required: Minutes,
    },
}

/// The trains on one section for one optimization call. Owns a copy of the input records, so
/// nothing done to it is visible to the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Section {
    pub trains: TiVec<TrainIdx, SectionTrain>,
}

impl Section {
    /// Keeps the trains with both times present, in input order.
    pub fn from_schedules(schedules: &[TrainSchedule]) -> Section {
        let trains = schedules
            .iter()
            .filter_map(|s| {
                Some(SectionTrain {
                    train_id: s.train_id.clone(),
                    entry_time: s.entry_time?,
                    exit_time: s.exit_time?,
                    entry_platform: s.entry_platform.clone(),
                    exit_platform: s.exit_platform.clone(),
                    journey_date: s.journey_date,
                })
            })
            .collect();
        Section { trains }
    }

    pub fn len(&self) -> usize {
        self.trains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trains.is_empty()
    }

    /// Every unordered pair of trains, lower index first.
    pub fn pairs(&self) -> impl Iterator<Item = (TrainIdx, TrainIdx)> + '_ {
        let n = self.trains.len();
        (0..n).flat_map(move |a| ((a + 1)..n).map(move |b| (TrainIdx::from(a), TrainIdx::from(b))))
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen = HashSet::new();
        for train in self.trains.iter() {
            if !seen.insert(train.train_id.as_str()) {
                return Err(ModelError::DuplicateTrain(train.train_id.clone()));
            }
            let times = [("entry_time", train.entry_time), ("exit_time", train.exit_time)];
            for (field, value) in times {
                if !(0..=LATEST_MINUTE).contains(&value) {
                    return Err(ModelError::TimeOutOfRange {
                        train_id: train.train_id.clone(),
                        field,
                        value,
                    });
                }
            }
            if train.journey_time() <= 0 {
                return Err(ModelError::NonPositiveJourney {
                    train_id: train.train_id.clone(),
                    entry_time: train.entry_time,
                    exit_time: train.exit_time,
                });
            }
        }
        Ok(())
    }

    /// Checks an `(entry, exit)` assignment per train against the separation rules without a
    /// solver. Returns the total absolute deviation.
    pub fn verify_solution(
        &self,
        solution: &[(Minutes, Minutes)],
        rules: &SeparationRules,
    ) -> Result<Minutes, Violation> {
        let _p = hprof::enter("verify_solution");
        if solution.len() != self.trains.len() {
            return Err(Violation::ShapeMismatch {
                expected: self.trains.len(),
                found: solution.len(),
            });
        }

        let mut total_deviation = 0;
        for (train, &(entry, exit)) in self.trains.iter().zip(solution) {
            if !(0..=LATEST_MINUTE).contains(&entry) || !(0..=LATEST_MINUTE).contains(&exit) {
                return Err(Violation::OutsideDay(train.train_id.clone()));
            }
            for deviation in [entry - train.entry_time, exit - train.exit_time] {
                if deviation.abs() > rules.max_deviation {
                    return Err(Violation::Deviation {
                        train_id: train.train_id.clone(),
                        deviation,
                    });
                }
                total_deviation += deviation.abs();
            }
            if exit - entry < train.min_journey_time() {
                return Err(Violation::Journey {
                    train_id: train.train_id.clone(),
                    journey: exit - entry,
                    required: train.min_journey_time(),
                });
            }
        }

        for (a, b) in self.pairs() {
            let (ta, tb) = (&self.trains[a], &self.trains[b]);
            let separation = (solution[usize::from(a)].0 - solution[usize::from(b)].0).abs();
            if separation < rules.min_headway {
                return Err(Violation::Headway {
                    first: ta.train_id.clone(),
                    second: tb.train_id.clone(),
                    separation,
                    required: rules.min_headway,
                });
            }
            if ta.shares_entry_platform(tb) && separation < rules.platform_separation {
                return Err(Violation::Platform {
                    first: ta.train_id.clone(),
                    second: tb.train_id.clone(),
                    separation,
                    required: rules.platform_separation,
                });
            }
        }

        Ok(total_deviation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: SeparationRules = SeparationRules {
        min_headway: 5,
        platform_separation: 10,
        max_deviation: 120,
    };

    fn section(schedules: &[TrainSchedule]) -> Section {
        Section::from_schedules(schedules)
    }

    #[test]
    fn incomplete_records_are_dropped_in_order() {
        let mut partial = TrainSchedule::new("B", 400, 450);
        partial.exit_time = None;
        let s = section(&[
            TrainSchedule::new("A", 360, 420),
            partial,
            TrainSchedule::without_times("C"),
            TrainSchedule::new("D", 500, 560),
        ]);
        let ids: Vec<_> = s.trains.iter().map(|t| t.train_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "D"]);
    }

    #[test]
    fn min_journey_has_a_floor() {
        let s = section(&[
            TrainSchedule::new("long", 360, 421),
            TrainSchedule::new("short", 360, 380),
        ]);
        assert_eq!(s.trains[TrainIdx(0)].min_journey_time(), 30);
        assert_eq!(s.trains[TrainIdx(1)].min_journey_time(), 15);
    }

    #[test]
    fn empty_or_missing_platforms_are_not_shared() {
        let s = section(&[
            TrainSchedule::new("A", 0, 60).with_entry_platform("1"),
            TrainSchedule::new("B", 0, 60).with_entry_platform("1"),
            TrainSchedule::new("C", 0, 60).with_entry_platform(""),
            TrainSchedule::new("D", 0, 60).with_entry_platform(""),
            TrainSchedule::new("E", 0, 60).with_exit_platform("1"),
        ]);
        let t = &s.trains;
        assert!(t[TrainIdx(0)].shares_entry_platform(&t[TrainIdx(1)]));
        assert!(!t[TrainIdx(2)].shares_entry_platform(&t[TrainIdx(3)]));
        assert!(!t[TrainIdx(0)].shares_entry_platform(&t[TrainIdx(4)]));
    }

    #[test]
    fn validation_rejects_bad_records() {
        let dup = section(&[TrainSchedule::new("A", 0, 60), TrainSchedule::new("A", 100, 160)]);
        assert_eq!(dup.validate(), Err(ModelError::DuplicateTrain("A".into())));

        let late = section(&[TrainSchedule::new("A", 1400, 1440)]);
        assert!(matches!(
            late.validate(),
            Err(ModelError::TimeOutOfRange {
                field: "exit_time",
                ..
            })
        ));

        let backwards = section(&[TrainSchedule::new("A", 600, 600)]);
        assert!(matches!(backwards.validate(), Err(ModelError::NonPositiveJourney { .. })));

        assert_eq!(section(&[TrainSchedule::new("A", 0, 1439)]).validate(), Ok(()));
    }

    #[test]
    fn pairs_cover_each_unordered_pair_once() {
        let s = section(&[
            TrainSchedule::new("A", 0, 60),
            TrainSchedule::new("B", 10, 70),
            TrainSchedule::new("C", 20, 80),
        ]);
        let pairs: Vec<(usize, usize)> = s.pairs().map(|(a, b)| (a.into(), b.into())).collect();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn verifier_reports_total_deviation() {
        let s = section(&[TrainSchedule::new("A", 360, 420), TrainSchedule::new("B", 362, 422)]);
        assert_eq!(s.verify_solution(&[(360, 420), (365, 422)], &RULES), Ok(3));
    }

    #[test]
    fn verifier_catches_each_violation() {
        let s = section(&[
            TrainSchedule::new("A", 360, 420).with_entry_platform("1"),
            TrainSchedule::new("B", 362, 422).with_entry_platform("1"),
        ]);
        assert!(matches!(
            s.verify_solution(&[(360, 420)], &RULES),
            Err(Violation::ShapeMismatch { expected: 2, found: 1 })
        ));
        assert!(matches!(
            s.verify_solution(&[(360, 420), (364, 422)], &RULES),
            Err(Violation::Headway { separation: 4, .. })
        ));
        assert!(matches!(
            s.verify_solution(&[(360, 420), (366, 422)], &RULES),
            Err(Violation::Platform { separation: 6, .. })
        ));
        assert!(matches!(
            s.verify_solution(&[(360, 380), (372, 422)], &RULES),
            Err(Violation::Journey { required: 30, .. })
        ));
        assert!(matches!(
            s.verify_solution(&[(200, 420), (372, 422)], &RULES),
            Err(Violation::Deviation { deviation: -160, .. })
        ));
    }
}
