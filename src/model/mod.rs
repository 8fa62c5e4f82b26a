//! Decision variables for the adjusted schedule of each train, and the modelling helpers shared
//! by the solvers.

use pumpkin_solver::{
    constraints::{equals, greater_than_or_equals, less_than_or_equals},
    proof::ConstraintTag,
    variables::{AffineView, DomainId, Literal, TransformableVariable},
    ConstraintOperationError, Solver,
};
use typed_index_collections::TiVec;

use crate::problem::{Minutes, Section, SectionTrain, TrainIdx, LATEST_MINUTE};

pub mod conflicts;

/// A scaled integer variable, the term type of every linear constraint in the model.
pub type Term = AffineView<DomainId>;

/// Adjusted times and deviations of one train, linked by `adjusted = original + deviation`.
#[derive(Clone, Copy, Debug)]
pub struct TrainVars {
    pub entry: DomainId,
    pub exit: DomainId,
    pub entry_deviation: DomainId,
    pub exit_deviation: DomainId,
}

/// `x - y`.
pub fn difference(x: DomainId, y: DomainId) -> Vec<Term> {
    vec![x.scaled(1), y.scaled(-1)]
}

/// `coefficient * literal`, reading the literal as 0 or 1.
pub fn literal_term(literal: Literal, coefficient: i32) -> Term {
    literal.get_integer_variable().scaled(coefficient)
}

/// A fresh variable in `[lower, upper]` equal to the sum of `terms`.
pub fn sum_variable(
    solver: &mut Solver,
    tag: ConstraintTag,
    mut terms: Vec<Term>,
    lower: i32,
    upper: i32,
) -> Result<DomainId, ConstraintOperationError> {
    let total = solver.new_bounded_integer(lower, upper);
    terms.push(total.scaled(-1));
    solver.add_constraint(equals(terms, 0, tag)).post()?;
    Ok(total)
}

/// Creates the time and deviation variables of one train, with the minimum journey duration.
pub fn add_train(
    solver: &mut Solver,
    tag: ConstraintTag,
    train: &SectionTrain,
    max_deviation: Minutes,
) -> Result<TrainVars, ConstraintOperationError> {
    let entry_deviation = solver.new_bounded_integer(-max_deviation, max_deviation);
    let exit_deviation = solver.new_bounded_integer(-max_deviation, max_deviation);
    let entry = solver.new_bounded_integer(0, LATEST_MINUTE);
    let exit = solver.new_bounded_integer(0, LATEST_MINUTE);

    solver
        .add_constraint(equals(
            difference(entry, entry_deviation),
            train.entry_time,
            tag,
        ))
        .post()?;
    solver
        .add_constraint(equals(difference(exit, exit_deviation), train.exit_time, tag))
        .post()?;
    solver
        .add_constraint(greater_than_or_equals(
            difference(exit, entry),
            train.min_journey_time(),
            tag,
        ))
        .post()?;

    Ok(TrainVars {
        entry,
        exit,
        entry_deviation,
        exit_deviation,
    })
}

pub fn add_trains(
    solver: &mut Solver,
    tag: ConstraintTag,
    section: &Section,
    max_deviation: Minutes,
) -> Result<TiVec<TrainIdx, TrainVars>, ConstraintOperationError> {
    section
        .trains
        .iter()
        .map(|train| add_train(solver, tag, train, max_deviation))
        .collect()
}

/// `|x|` with `x` in `[-bound, bound]`.
///
/// A literal `x >= 0` selects which of `abs == x` and `abs == -x` holds. The two unconditional
/// inequalities `abs >= x` and `abs >= -x` are implied, and let the lower bound of `abs` follow
/// the bounds of `x` before the sign is decided.
pub fn absolute_value(
    solver: &mut Solver,
    tag: ConstraintTag,
    x: DomainId,
    bound: i32,
) -> Result<DomainId, ConstraintOperationError> {
    let abs = solver.new_bounded_integer(0, bound);
    let non_negative = solver.new_literal();
    let sum = || vec![abs.scaled(1), x.scaled(1)];

    solver
        .add_constraint(greater_than_or_equals(vec![x.scaled(1)], 0, tag))
        .implied_by(non_negative)?;
    solver
        .add_constraint(less_than_or_equals(vec![x.scaled(1)], -1, tag))
        .implied_by(!non_negative)?;
    solver
        .add_constraint(equals(difference(abs, x), 0, tag))
        .implied_by(non_negative)?;
    solver
        .add_constraint(equals(sum(), 0, tag))
        .implied_by(!non_negative)?;

    solver
        .add_constraint(greater_than_or_equals(difference(abs, x), 0, tag))
        .post()?;
    solver
        .add_constraint(greater_than_or_equals(sum(), 0, tag))
        .post()?;

    Ok(abs)
}

/// Minimises `objective` without a time limit, for checking what the constraints allow.
#[cfg(test)]
pub(crate) fn minimise(
    solver: &mut Solver,
    objective: DomainId,
) -> Option<impl pumpkin_solver::results::ProblemSolution> {
    use pumpkin_solver::{
        optimisation::{linear_sat_unsat::LinearSatUnsat, OptimisationDirection},
        results::{OptimisationResult, SolutionReference},
        termination::Indefinite,
    };

    fn ignore<B>(_: &Solver, _: SolutionReference, _: &B) {}

    let mut brancher = solver.default_brancher();
    let result = solver.optimise(
        &mut brancher,
        &mut Indefinite,
        LinearSatUnsat::new(OptimisationDirection::Minimise, objective, ignore),
    );
    match result {
        OptimisationResult::Optimal(solution) => Some(solution),
        OptimisationResult::Unsatisfiable => None,
        _ => panic!("expected an optimal solution or a proof of infeasibility"),
    }
}
