use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use typed_index_collections::TiVec;

use crate::{
    config::OptimizerConfig,
    problem::{Minutes, Section, TrainIdx},
};

/// Named what-if variations of one optimization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    #[default]
    #[display(fmt = "default")]
    Default,
    #[display(fmt = "reduce_headway")]
    ReduceHeadway,
    #[display(fmt = "weather_disruption")]
    WeatherDisruption,
    #[display(fmt = "add_delay")]
    AddDelay,
    #[display(fmt = "maximize_throughput")]
    MaximizeThroughput,
    #[display(fmt = "minimize_delay")]
    MinimizeDelay,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::Default,
        Scenario::ReduceHeadway,
        Scenario::WeatherDisruption,
        Scenario::AddDelay,
        Scenario::MaximizeThroughput,
        Scenario::MinimizeDelay,
    ];

    /// Derives the constraint and objective changes for this scenario. The section is only
    /// read.
    pub fn plan(self, section: &Section, config: &OptimizerConfig) -> ScenarioPlan {
        let mut entry_delay_floors: TiVec<TrainIdx, Option<Minutes>> =
            section.trains.iter().map(|_| None).collect();
        let mut min_headway = config.min_headway_minutes;
        let mut objective = ObjectivePolicy::Balanced;

        match self {
            Scenario::Default => {}
            Scenario::ReduceHeadway => {
                min_headway = min_headway.min(config.reduced_headway_minutes);
            }
            Scenario::WeatherDisruption => {
                for floor in entry_delay_floors.iter_mut() {
                    *floor = Some(config.weather_min_delay_minutes);
                }
            }
            Scenario::AddDelay => {
                if let Some(first) = entry_delay_floors.first_mut() {
                    *first = Some(config.add_delay_minutes);
                }
            }
            Scenario::MaximizeThroughput => objective = ObjectivePolicy::MaximizeThroughput,
            Scenario::MinimizeDelay => objective = ObjectivePolicy::MinimizeDelay,
        }

        ScenarioPlan {
            scenario: self,
            min_headway,
            entry_delay_floors,
            objective,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown scenario {0:?}")]
pub struct UnknownScenario(pub String);

impl FromStr for Scenario {
    type Err = UnknownScenario;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .iter()
            .copied()
            .find(|scenario| scenario.to_string() == s)
            .ok_or_else(|| UnknownScenario(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectivePolicy {
    /// Maximise `weight * total throughput score - total absolute deviation`.
    Balanced,
    MaximizeThroughput,
    MinimizeDelay,
}

impl ObjectivePolicy {
    pub fn uses_throughput_score(self) -> bool {
        !matches!(self, ObjectivePolicy::MinimizeDelay)
    }

    pub fn uses_deviation(self) -> bool {
        !matches!(self, ObjectivePolicy::MaximizeThroughput)
    }

    /// Whether the reported objective value is maximised.
    pub fn is_maximisation(self) -> bool {
        self.uses_throughput_score()
    }
}

/// Everything a scenario changes about one solve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScenarioPlan {
    pub scenario: Scenario,
    pub min_headway: Minutes,
    /// Lower bound on the entry deviation of each train, if any.
    pub entry_delay_floors: TiVec<TrainIdx, Option<Minutes>>,
    pub objective: ObjectivePolicy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::TrainSchedule;

    fn three_trains() -> Section {
        Section::from_schedules(&[
            TrainSchedule::new("A", 360, 420),
            TrainSchedule::new("B", 370, 430),
            TrainSchedule::new("C", 380, 440),
        ])
    }

    #[test]
    fn names_round_trip_through_from_str_and_serde() {
        for scenario in Scenario::ALL {
            let name = scenario.to_string();
            assert_eq!(name.parse::<Scenario>(), Ok(scenario));
            assert_eq!(serde_json::to_string(&scenario).unwrap(), format!("\"{}\"", name));
        }
        assert_eq!(
            "heavy_snow".parse::<Scenario>(),
            Err(UnknownScenario("heavy_snow".into()))
        );
    }

    #[test]
    fn default_plan_changes_nothing() {
        let section = three_trains();
        let plan = Scenario::Default.plan(&section, &OptimizerConfig::default());
        assert_eq!(plan.min_headway, 5);
        assert!(plan.entry_delay_floors.iter().all(Option::is_none));
        assert_eq!(plan.objective, ObjectivePolicy::Balanced);
    }

    #[test]
    fn reduce_headway_never_raises_the_headway() {
        let section = three_trains();
        let plan = Scenario::ReduceHeadway.plan(&section, &OptimizerConfig::default());
        assert_eq!(plan.min_headway, 3);

        let config = OptimizerConfig {
            min_headway_minutes: 2,
            ..OptimizerConfig::default()
        };
        assert_eq!(Scenario::ReduceHeadway.plan(&section, &config).min_headway, 2);
    }

    #[test]
    fn delay_scenarios_set_entry_floors() {
        let section = three_trains();
        let config = OptimizerConfig::default();

        let weather = Scenario::WeatherDisruption.plan(&section, &config);
        assert!(weather.entry_delay_floors.iter().all(|f| *f == Some(10)));

        let delay = Scenario::AddDelay.plan(&section, &config);
        let floors: Vec<_> = delay.entry_delay_floors.iter().copied().collect();
        assert_eq!(floors, vec![Some(20), None, None]);
    }

    #[test]
    fn objective_scenarios_only_change_the_objective() {
        let section = three_trains();
        let config = OptimizerConfig::default();
        for (scenario, policy) in [
            (Scenario::MaximizeThroughput, ObjectivePolicy::MaximizeThroughput),
            (Scenario::MinimizeDelay, ObjectivePolicy::MinimizeDelay),
        ] {
            let plan = scenario.plan(&section, &config);
            assert_eq!(plan.objective, policy);
            assert_eq!(plan.min_headway, 5);
            assert!(plan.entry_delay_floors.iter().all(Option::is_none));
        }
    }

    #[test]
    fn planning_is_repeatable_and_leaves_section_alone() {
        let section = three_trains();
        let before = section.clone();
        let config = OptimizerConfig::default();
        let first = Scenario::AddDelay.plan(&section, &config);
        let second = Scenario::AddDelay.plan(&section, &config);
        assert_eq!(first, second);
        assert_eq!(section, before);
    }
}
