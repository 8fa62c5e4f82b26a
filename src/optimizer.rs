use std::time::Instant;

use log::{info, warn};
use pumpkin_solver::termination::TimeBudget;

use crate::{
    config::OptimizerConfig,
    model::conflicts::count_constraints,
    problem::{Section, TrainSchedule},
    result::{OptimizationResult, OptimizationStatus},
    scenario::{Scenario, ScenarioPlan},
    solvers::{cp::CpModel, greedy, SolverError},
};

/// Schedule optimizer for one section. Holds only read-only configuration, so one instance can
/// serve concurrent calls.
#[derive(Clone, Debug, Default)]
pub struct SectionOptimizer {
    config: OptimizerConfig,
}

impl SectionOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        SectionOptimizer { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Filters, validates and plans one call. Any reason not to solve is returned as the final
    /// result.
    fn prepare(
        &self,
        schedules: &[TrainSchedule],
        scenario: Scenario,
    ) -> Result<(Section, ScenarioPlan), OptimizationResult> {
        let section = Section::from_schedules(schedules);
        if section.len() < 2 {
            info!(
                "Only {} trains with complete times, not optimizing",
                section.len()
            );
            return Err(OptimizationResult::insufficient_data(scenario, section.len()));
        }
        if let Err(e) = self.config.validate().and_then(|_| section.validate()) {
            warn!("Cannot build model: {}", e);
            return Err(OptimizationResult::error(scenario, section.len(), e));
        }
        let plan = scenario.plan(&section, &self.config);
        Ok((section, plan))
    }

    /// Optimizes the schedules under one scenario. Never panics or returns an error: every
    /// outcome is a status of the result.
    pub fn optimize(&self, schedules: &[TrainSchedule], scenario: Scenario) -> OptimizationResult {
        info!("Starting optimization for scenario: {}", scenario);
        match self.prepare(schedules, scenario) {
            Ok((section, plan)) => self.solve(&section, &plan, None),
            Err(result) => result,
        }
    }

    /// Solves again for the best schedule strictly worse than `best`, a solver result for the
    /// same schedules.
    pub fn next_best(
        &self,
        schedules: &[TrainSchedule],
        best: &OptimizationResult,
    ) -> OptimizationResult {
        let scenario = best.scenario;
        let objective = match best.objective_value {
            Some(value) if best.status.is_solved() && !best.heuristic => value,
            _ => {
                return OptimizationResult::error(
                    scenario,
                    best.total_trains,
                    "next-best search needs a solver result with an objective value",
                )
            }
        };
        info!(
            "Searching next-best schedule for scenario {} below objective {}",
            scenario, objective
        );
        match self.prepare(schedules, scenario) {
            Ok((section, plan)) => {
                let minimised = if plan.objective.is_maximisation() {
                    -objective
                } else {
                    objective
                };
                self.solve(&section, &plan, Some(minimised))
            }
            Err(result) => result,
        }
    }

    fn solve(
        &self,
        section: &Section,
        plan: &ScenarioPlan,
        exclude_up_to: Option<i64>,
    ) -> OptimizationResult {
        let start_time = Instant::now();
        let mut model = CpModel::build(section, plan, &self.config);
        if let Some(best) = exclude_up_to {
            model.exclude_up_to(best);
        }
        let counts = model.constraint_counts();
        info!(
            "Model created: {} trains, {} headway constraints, {} platform constraints",
            section.len(),
            counts.headway_constraints,
            counts.platform_constraints
        );

        let mut budget = TimeBudget::starting_now(self.config.time_budget());
        let (outcome, statistics) = model.solve(&mut budget);
        let solve_time = start_time.elapsed().as_secs_f64();

        match outcome {
            Ok(solution) => {
                let status = if solution.optimal {
                    OptimizationStatus::Optimal
                } else {
                    OptimizationStatus::Feasible
                };
                let mut result = OptimizationResult::solved(
                    status,
                    plan.scenario,
                    section,
                    &solution.schedule,
                    solve_time,
                    counts,
                );
                result.objective_value = Some(solution.objective_value);
                result.throughput_score = solution.throughput_score;
                result.search = Some(statistics);
                info!(
                    "Optimization successful: {} trains adjusted, total deviation: {} minutes",
                    result.trains_adjusted, result.total_deviation_minutes
                );
                result
            }
            Err(e) => {
                warn!(
                    "Optimization failed with status: {} ({})",
                    e.status_name(),
                    e
                );
                let mut result = OptimizationResult::failed(
                    plan.scenario,
                    section.len(),
                    e.status_name(),
                    solve_time,
                    counts,
                );
                result.search = Some(statistics);
                result
            }
        }
    }

    /// Like [`SectionOptimizer::optimize`], but when the time budget runs out without any
    /// schedule, assigns one greedily instead of failing.
    pub fn optimize_with_fallback(
        &self,
        schedules: &[TrainSchedule],
        scenario: Scenario,
    ) -> OptimizationResult {
        let result = self.optimize(schedules, scenario);
        let timed_out = result.status == OptimizationStatus::Failed
            && result.reason.as_deref() == Some(SolverError::Timeout.status_name());
        if !timed_out {
            return result;
        }

        let (section, plan) = match self.prepare(schedules, scenario) {
            Ok(prepared) => prepared,
            Err(other) => return other,
        };
        let start_time = Instant::now();
        let schedule = match greedy::solve(&section, &plan, &self.config) {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!("Greedy fallback failed: {}", e);
                return result;
            }
        };
        let rules = self.config.separation_rules(plan.min_headway);
        if let Err(violation) = section.verify_solution(&schedule.raw, &rules) {
            warn!("Greedy fallback produced an invalid schedule: {}", violation);
            return result;
        }

        let solve_time = result.solve_time_seconds + start_time.elapsed().as_secs_f64();
        let counts = result
            .constraints
            .unwrap_or_else(|| count_constraints(&section, plan.min_headway));
        let mut fallback = OptimizationResult::solved(
            OptimizationStatus::Feasible,
            scenario,
            &section,
            &schedule,
            solve_time,
            counts,
        );
        fallback.heuristic = true;
        fallback.reason = Some(format!(
            "solver returned {}, schedule assigned greedily",
            SolverError::Timeout.status_name()
        ));
        info!(
            "Greedy fallback: {} trains adjusted, total deviation: {} minutes",
            fallback.trains_adjusted, fallback.total_deviation_minutes
        );
        fallback
    }

    /// Runs each scenario on its own thread. A failing scenario does not affect the others; the
    /// results come back in the order of `scenarios`.
    ///
    /// The profiler is per thread, so a profile of a sweep shows only its total time, not the
    /// model and solve spans of each scenario.
    pub fn sweep(
        &self,
        schedules: &[TrainSchedule],
        scenarios: &[Scenario],
    ) -> Vec<OptimizationResult> {
        let _p = hprof::enter("sweep");
        std::thread::scope(|scope| {
            let handles: Vec<_> = scenarios
                .iter()
                .map(|&scenario| scope.spawn(move || self.optimize(schedules, scenario)))
                .collect();
            handles
                .into_iter()
                .zip(scenarios)
                .map(|(handle, &scenario)| {
                    handle.join().unwrap_or_else(|_| {
                        OptimizationResult::error(
                            scenario,
                            Section::from_schedules(schedules).len(),
                            "optimization thread panicked",
                        )
                    })
                })
                .collect()
        })
    }
}
