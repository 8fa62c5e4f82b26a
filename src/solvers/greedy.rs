use log::debug;

use super::{Schedule, SolverError};
use crate::{
    config::OptimizerConfig,
    problem::{Section, TrainIdx, LATEST_MINUTE},
    scenario::ScenarioPlan,
};

/// Postpones trains in order of their earliest allowed entry until every separation holds.
///
/// Never moves a train earlier, so the result can be far from optimal, but it needs no search
/// and fails only when a train is pushed past its deviation bound or the end of the day.
pub fn solve(
    section: &Section,
    plan: &ScenarioPlan,
    config: &OptimizerConfig,
) -> Result<Schedule, SolverError> {
    let _p = hprof::enter("greedy solver");
    let earliest_entry = |t: TrainIdx| {
        let floor = plan.entry_delay_floors[t].unwrap_or(0).max(0);
        section.trains[t].entry_time + floor
    };

    let mut order: Vec<TrainIdx> = section.trains.keys().collect();
    order.sort_by_key(|&t| (earliest_entry(t), t));

    let mut schedule: Schedule = section
        .trains
        .iter()
        .map(|t| (t.entry_time, t.exit_time))
        .collect();
    let mut placed: Vec<TrainIdx> = Vec::new();

    for t in order {
        let train = &section.trains[t];
        let mut entry = earliest_entry(t);
        for &other in &placed {
            let mut separation = plan.min_headway;
            if train.shares_entry_platform(&section.trains[other]) {
                separation = separation.max(config.platform_separation_minutes);
            }
            entry = entry.max(schedule[other].0 + separation);
        }
        let exit = train.exit_time.max(entry + train.min_journey_time());

        let delay = (entry - train.entry_time).max(exit - train.exit_time);
        if delay > config.max_deviation_minutes || exit > LATEST_MINUTE {
            debug!(
                "Greedy postponement of train {} to {}-{} exceeds the bounds",
                train.train_id, entry, exit
            );
            return Err(SolverError::NoSolution);
        }

        schedule[t] = (entry, exit);
        placed.push(t);
    }

    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{problem::TrainSchedule, scenario::Scenario};

    fn greedy(
        schedules: &[TrainSchedule],
        scenario: Scenario,
        config: &OptimizerConfig,
    ) -> (Section, Result<Schedule, SolverError>) {
        let section = Section::from_schedules(schedules);
        let plan = scenario.plan(&section, config);
        let result = solve(&section, &plan, config);
        (section, result)
    }

    #[test]
    fn later_trains_are_pushed_back() {
        let config = OptimizerConfig::default();
        let (section, result) = greedy(
            &[
                TrainSchedule::new("late", 370, 430),
                TrainSchedule::new("A", 360, 420).with_entry_platform("1"),
                TrainSchedule::new("B", 362, 422).with_entry_platform("1"),
            ],
            Scenario::Default,
            &config,
        );
        let schedule = result.unwrap();
        assert_eq!(schedule.raw, vec![(375, 430), (360, 420), (370, 422)]);
        assert!(section
            .verify_solution(&schedule.raw, &config.separation_rules(5))
            .is_ok());
    }

    #[test]
    fn exit_follows_when_entry_moves_far() {
        let config = OptimizerConfig::default();
        let (_, result) = greedy(
            &[TrainSchedule::new("A", 360, 380), TrainSchedule::new("B", 360, 380)],
            Scenario::AddDelay,
            &config,
        );
        // A may not enter before 380, so B goes first and A exits at least 15 minutes later.
        assert_eq!(result.unwrap().raw, vec![(380, 395), (360, 380)]);
    }

    #[test]
    fn bounds_are_enforced() {
        let config = OptimizerConfig {
            max_deviation_minutes: 6,
            ..OptimizerConfig::default()
        };
        let (_, result) = greedy(
            &[
                TrainSchedule::new("A", 600, 660),
                TrainSchedule::new("B", 600, 660),
                TrainSchedule::new("C", 600, 660),
            ],
            Scenario::Default,
            &config,
        );
        assert_eq!(result, Err(SolverError::NoSolution));

        let (_, result) = greedy(
            &[TrainSchedule::new("A", 1420, 1439), TrainSchedule::new("B", 1420, 1439)],
            Scenario::Default,
            &OptimizerConfig::default(),
        );
        assert_eq!(result, Err(SolverError::NoSolution));
    }
}
