use std::cell::{Cell, RefCell};

use log::{debug, info};
use pumpkin_solver::{
    constraints::{greater_than_or_equals, less_than_or_equals},
    optimisation::{linear_sat_unsat::LinearSatUnsat, OptimisationDirection},
    proof::ConstraintTag,
    results::{OptimisationResult, ProblemSolution, SolutionReference},
    termination::TerminationCondition,
    variables::{DomainId, Literal, TransformableVariable},
    ConstraintOperationError, DefaultBrancher, Solver,
};
use serde::{Deserialize, Serialize};
use typed_index_collections::TiVec;

use super::{Schedule, SolverError};
use crate::{
    config::OptimizerConfig,
    model::{
        absolute_value,
        add_trains,
        conflicts::{add_conflicts, count_constraints, ConstraintCounts, Precedence},
        literal_term, sum_variable, Term, TrainVars,
    },
    problem::{Minutes, Section, TrainIdx},
    scenario::{ObjectivePolicy, ScenarioPlan},
};

/// Highest throughput score of a single train.
pub const MAX_TRAIN_SCORE: i32 = 10;
/// Score cap for the first train in sequence, and for trains moved by more than the headway.
pub const CAPPED_TRAIN_SCORE: i32 = 5;

/// A schedule found by the constraint solver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpSolution {
    pub schedule: Schedule,
    pub optimal: bool,
    /// The objective in its natural direction: maximised for the throughput policies, minimised
    /// for `minimize_delay`.
    pub objective_value: i64,
    /// The objective as minimised by the search.
    pub minimised_objective: i64,
    pub throughput_score: Option<i64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStatistics {
    /// Improving schedules found before the search stopped.
    pub solutions: u64,
}

#[derive(Clone, Copy, Debug)]
struct ScoreVars {
    score: DomainId,
    has_predecessor: Literal,
}

struct Assembled {
    trains: TiVec<TrainIdx, TrainVars>,
    scores: Option<TiVec<TrainIdx, ScoreVars>>,
    objective: DomainId,
}

/// The best schedule seen so far, read from the solver as it improves.
struct Incumbent {
    schedule: Schedule,
    minimised_objective: i64,
    throughput_score: Option<i64>,
}

impl Assembled {
    fn read(&self, solution: &impl ProblemSolution) -> Incumbent {
        let schedule = self
            .trains
            .iter()
            .map(|v| {
                (
                    solution.get_integer_value(v.entry),
                    solution.get_integer_value(v.exit),
                )
            })
            .collect();
        let throughput_score = self.scores.as_ref().map(|scores| {
            scores
                .iter()
                .map(|s| i64::from(solution.get_integer_value(s.score)))
                .sum()
        });
        Incumbent {
            schedule,
            minimised_objective: i64::from(solution.get_integer_value(self.objective)),
            throughput_score,
        }
    }
}

/// Keeps every improving schedule, since a search stopped by its budget reports no solution.
fn record_incumbent<'a>(
    assembled: &'a Assembled,
    best: &'a RefCell<Option<Incumbent>>,
    found: &'a Cell<u64>,
) -> impl Fn(&Solver, SolutionReference, &DefaultBrancher) + 'a {
    move |_, solution, _| {
        let incumbent = assembled.read(&solution);
        debug!("Improving schedule with objective {}", incumbent.minimised_objective);
        found.set(found.get() + 1);
        *best.borrow_mut() = Some(incumbent);
    }
}

/// The constraint model of one scenario over one section, ready to be solved once.
pub struct CpModel {
    solver: Solver,
    tag: ConstraintTag,
    assembled: Option<Assembled>,
    objective: ObjectivePolicy,
    counts: ConstraintCounts,
}

impl CpModel {
    /// Builds the model. A model that is already infeasible while its constraints are posted is
    /// still returned; solving it reports [`SolverError::NoSolution`].
    pub fn build(section: &Section, plan: &ScenarioPlan, config: &OptimizerConfig) -> CpModel {
        let _p = hprof::enter("build model");
        let mut solver = Solver::default();
        let tag = solver.new_constraint_tag();
        let counts = count_constraints(section, plan.min_headway);
        let assembled = match assemble(&mut solver, tag, section, plan, config) {
            Ok(assembled) => Some(assembled),
            Err(e) => {
                debug!("Model infeasible while posting constraints: {:?}", e);
                None
            }
        };
        debug!(
            "Model built with {} headway and {} platform constraints",
            counts.headway_constraints, counts.platform_constraints
        );
        CpModel {
            solver,
            tag,
            assembled,
            objective: plan.objective,
            counts,
        }
    }

    pub fn constraint_counts(&self) -> ConstraintCounts {
        self.counts
    }

    /// Restricts the search to schedules strictly worse than `best`, given in minimised form.
    pub fn exclude_up_to(&mut self, best: i64) {
        let Some(assembled) = self.assembled.as_ref() else {
            return;
        };
        // Past the objective's domain, so nothing remains.
        let bound = i32::try_from(best.saturating_add(1)).unwrap_or(i32::MAX);
        let posted = self
            .solver
            .add_constraint(greater_than_or_equals(
                vec![assembled.objective.scaled(1)],
                bound,
                self.tag,
            ))
            .post();
        if let Err(e) = posted {
            debug!("No schedule worse than objective {}: {:?}", best, e);
            self.assembled = None;
        }
    }

    pub fn solve(
        mut self,
        termination: &mut impl TerminationCondition,
    ) -> (Result<CpSolution, SolverError>, SearchStatistics) {
        let Some(assembled) = self.assembled.take() else {
            return (Err(SolverError::NoSolution), SearchStatistics::default());
        };
        let best = RefCell::new(None);
        let found = Cell::new(0);
        let result = {
            let _p = hprof::enter("solve");
            let mut brancher = self.solver.default_brancher();
            let procedure = LinearSatUnsat::new(
                OptimisationDirection::Minimise,
                assembled.objective,
                record_incumbent(&assembled, &best, &found),
            );
            self.solver.optimise(&mut brancher, termination, procedure)
        };
        let statistics = SearchStatistics {
            solutions: found.get(),
        };
        info!(
            "Search finished after {} improving solutions",
            statistics.solutions
        );

        let (incumbent, optimal) = match result {
            OptimisationResult::Optimal(solution) => (assembled.read(&solution), true),
            OptimisationResult::Satisfiable(solution) => (assembled.read(&solution), false),
            OptimisationResult::Unsatisfiable => return (Err(SolverError::NoSolution), statistics),
            OptimisationResult::Unknown => match best.into_inner() {
                Some(incumbent) => (incumbent, false),
                None => return (Err(SolverError::Timeout), statistics),
            },
        };

        let objective_value = if self.objective.is_maximisation() {
            -incumbent.minimised_objective
        } else {
            incumbent.minimised_objective
        };
        (
            Ok(CpSolution {
                schedule: incumbent.schedule,
                optimal,
                objective_value,
                minimised_objective: incumbent.minimised_objective,
                throughput_score: incumbent.throughput_score,
            }),
            statistics,
        )
    }
}

fn assemble(
    solver: &mut Solver,
    tag: ConstraintTag,
    section: &Section,
    plan: &ScenarioPlan,
    config: &OptimizerConfig,
) -> Result<Assembled, ConstraintOperationError> {
    let trains = add_trains(solver, tag, section, config.max_deviation_minutes)?;
    let precedences = add_conflicts(
        solver,
        tag,
        section,
        &trains,
        plan.min_headway,
        config.platform_separation_minutes,
    )?;

    for (train, floor) in plan.entry_delay_floors.iter_enumerated() {
        if let Some(floor) = *floor {
            solver
                .add_constraint(greater_than_or_equals(
                    vec![trains[train].entry_deviation.scaled(1)],
                    floor,
                    tag,
                ))
                .post()?;
        }
    }

    let max_deviation = config.max_deviation_minutes;
    let mut terms: Vec<Term> = Vec::new();
    let (mut lowest, mut highest) = (0, 0);

    if plan.objective.uses_deviation() {
        for vars in trains.iter() {
            for deviation in [vars.entry_deviation, vars.exit_deviation] {
                let abs = absolute_value(solver, tag, deviation, max_deviation)?;
                terms.push(abs.scaled(1));
                highest += max_deviation;
            }
        }
    }

    let scores = if plan.objective.uses_throughput_score() {
        let weight = match plan.objective {
            ObjectivePolicy::Balanced => config.throughput_weight,
            _ => 1,
        };
        let scores = add_throughput_scores(
            solver,
            tag,
            section,
            &trains,
            &precedences,
            plan.min_headway,
        )?;
        terms.extend(scores.iter().map(|s| s.score.scaled(-weight)));
        lowest -= weight * max_total_score(section.len());
        Some(scores)
    } else {
        None
    };

    let objective = sum_variable(solver, tag, terms, lowest, highest)?;

    Ok(Assembled {
        trains,
        scores,
        objective,
    })
}

/// Every train but the first in sequence can reach [`MAX_TRAIN_SCORE`].
pub fn max_total_score(trains: usize) -> i32 {
    match trains {
        0 => 0,
        n => MAX_TRAIN_SCORE * (n as i32 - 1) + CAPPED_TRAIN_SCORE,
    }
}

/// Per train, a score in `[0, MAX_TRAIN_SCORE]` capped at [`CAPPED_TRAIN_SCORE`] unless the train
/// has a predecessor and its entry moved by at most the headway.
fn add_throughput_scores(
    solver: &mut Solver,
    tag: ConstraintTag,
    section: &Section,
    trains: &TiVec<TrainIdx, TrainVars>,
    precedences: &[Precedence],
    headway: Minutes,
) -> Result<TiVec<TrainIdx, ScoreVars>, ConstraintOperationError> {
    let bonus = MAX_TRAIN_SCORE - CAPPED_TRAIN_SCORE;
    let mut scores: TiVec<TrainIdx, ScoreVars> = TiVec::new();

    for (train, vars) in trains.iter_enumerated() {
        let score = solver.new_bounded_integer(0, MAX_TRAIN_SCORE);
        let has_predecessor = solver.new_literal();
        let within_headway = solver.new_literal();

        for cap in [has_predecessor, within_headway] {
            solver
                .add_constraint(less_than_or_equals(
                    vec![score.scaled(1), literal_term(cap, -bonus)],
                    CAPPED_TRAIN_SCORE,
                    tag,
                ))
                .post()?;
        }

        // has_predecessor <= sum over pairs of "other before train"
        let mut predecessors = vec![literal_term(has_predecessor, 1)];
        for p in precedences
            .iter()
            .filter(|p| p.first == train || p.second == train)
        {
            predecessors.push(literal_term(p.before(p.other(train)), -1));
        }
        solver
            .add_constraint(less_than_or_equals(predecessors, 0, tag))
            .post()?;

        let moved = || vec![vars.entry_deviation.scaled(1)];
        solver
            .add_constraint(less_than_or_equals(moved(), headway, tag))
            .implied_by(within_headway)?;
        solver
            .add_constraint(greater_than_or_equals(moved(), -headway, tag))
            .implied_by(within_headway)?;

        scores.push(ScoreVars {
            score,
            has_predecessor,
        });
    }

    // Some train is first in any order.
    let all_have_predecessors: Vec<Term> = scores
        .iter()
        .map(|s| literal_term(s.has_predecessor, 1))
        .collect();
    solver
        .add_constraint(less_than_or_equals(
            all_have_predecessors,
            section.len() as i32 - 1,
            tag,
        ))
        .post()?;

    Ok(scores)
}
