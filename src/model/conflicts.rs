use pumpkin_solver::{
    constraints::greater_than_or_equals, proof::ConstraintTag, variables::Literal,
    ConstraintOperationError, Solver,
};
use serde::{Deserialize, Serialize};
use typed_index_collections::TiSlice;

use super::{difference, TrainVars};
use crate::problem::{Minutes, Section, TrainIdx};

/// The ordering decision for one pair of trains: `first` goes before `second` exactly when the
/// literal holds.
#[derive(Clone, Copy, Debug)]
pub struct Precedence {
    pub first: TrainIdx,
    pub second: TrainIdx,
    pub first_before_second: Literal,
}

impl Precedence {
    /// The literal stating that `train` comes before the other train of the pair.
    pub fn before(&self, train: TrainIdx) -> Literal {
        if train == self.first {
            self.first_before_second
        } else {
            !self.first_before_second
        }
    }

    pub fn other(&self, train: TrainIdx) -> TrainIdx {
        if train == self.first {
            self.second
        } else {
            self.first
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintCounts {
    pub headway_constraints: usize,
    pub platform_constraints: usize,
    pub min_headway_minutes: Minutes,
}

/// One headway constraint per pair, one platform constraint per pair sharing an entry platform.
pub fn count_constraints(section: &Section, min_headway: Minutes) -> ConstraintCounts {
    let mut counts = ConstraintCounts {
        min_headway_minutes: min_headway,
        ..Default::default()
    };
    for (a, b) in section.pairs() {
        counts.headway_constraints += 1;
        if section.trains[a].shares_entry_platform(&section.trains[b]) {
            counts.platform_constraints += 1;
        }
    }
    counts
}

/// Posts the disjunctive separation constraints between every pair of trains.
///
/// Under `a before b`, `entry[b] - entry[a] >= min_headway`, and additionally
/// `>= platform_separation` when both use the same entry platform.
pub fn add_conflicts(
    solver: &mut Solver,
    tag: ConstraintTag,
    section: &Section,
    vars: &TiSlice<TrainIdx, TrainVars>,
    min_headway: Minutes,
    platform_separation: Minutes,
) -> Result<Vec<Precedence>, ConstraintOperationError> {
    let _p = hprof::enter("conflict constraints");
    let mut precedences = Vec::new();

    for (a, b) in section.pairs() {
        let first_before_second = solver.new_literal();
        let shares_platform = section.trains[a].shares_entry_platform(&section.trains[b]);

        for (lit, earlier, later) in [(first_before_second, a, b), (!first_before_second, b, a)] {
            let gap = || difference(vars[later].entry, vars[earlier].entry);
            solver
                .add_constraint(greater_than_or_equals(gap(), min_headway, tag))
                .implied_by(lit)?;
            if shares_platform {
                solver
                    .add_constraint(greater_than_or_equals(gap(), platform_separation, tag))
                    .implied_by(lit)?;
            }
        }

        precedences.push(Precedence {
            first: a,
            second: b,
            first_before_second,
        });
    }

    Ok(precedences)
}

#[cfg(test)]
mod tests {
    use pumpkin_solver::{
        constraints::equals, results::ProblemSolution, variables::TransformableVariable,
    };

    use super::*;
    use crate::{
        model::{add_trains, literal_term, minimise, sum_variable},
        problem::TrainSchedule,
    };

    fn platform_trio() -> Section {
        Section::from_schedules(&[
            TrainSchedule::new("A", 360, 420).with_entry_platform("1"),
            TrainSchedule::new("B", 361, 421).with_entry_platform("1"),
            TrainSchedule::new("C", 362, 422).with_entry_platform("2"),
        ])
    }

    #[test]
    fn counts_pairs_and_shared_platforms() {
        let counts = count_constraints(&platform_trio(), 5);
        assert_eq!(
            counts,
            ConstraintCounts {
                headway_constraints: 3,
                platform_constraints: 1,
                min_headway_minutes: 5,
            }
        );
    }

    #[test]
    fn deciding_a_precedence_separates_entries() {
        let section = platform_trio();
        let mut solver = Solver::default();
        let tag = solver.new_constraint_tag();
        let vars = add_trains(&mut solver, tag, &section, 120).unwrap();
        let precedences = add_conflicts(&mut solver, tag, &section, &vars, 5, 10).unwrap();
        assert_eq!(precedences.len(), 3);

        let (a, b) = (TrainIdx::from(0), TrainIdx::from(1));
        let ab = precedences[0];
        assert_eq!((ab.first, ab.second), (a, b));
        assert_eq!(ab.other(a), b);
        assert_eq!(ab.before(b), !ab.before(a));

        // Pin A and order A before B: the shared platform pushes B ten minutes later.
        solver
            .add_constraint(equals(vec![vars[a].entry.scaled(1)], 360, tag))
            .post()
            .unwrap();
        solver
            .add_constraint(equals(vec![literal_term(ab.before(a), 1)], 1, tag))
            .post()
            .unwrap();
        let solution = minimise(&mut solver, vars[b].entry).unwrap();
        assert_eq!(solution.get_integer_value(vars[b].entry), 370);
        assert!(!solution.get_literal_value(ab.before(b)));
    }

    #[test]
    fn entries_too_close_for_either_order_are_infeasible() {
        let section = platform_trio();
        let mut solver = Solver::default();
        let tag = solver.new_constraint_tag();
        let vars = add_trains(&mut solver, tag, &section, 120).unwrap();
        add_conflicts(&mut solver, tag, &section, &vars, 5, 10).unwrap();

        let (a, c) = (TrainIdx::from(0), TrainIdx::from(2));
        solver
            .add_constraint(equals(vec![vars[a].entry.scaled(1)], 360, tag))
            .post()
            .unwrap();
        let rejected = solver
            .add_constraint(equals(vec![vars[c].entry.scaled(1)], 362, tag))
            .post()
            .is_err();
        assert!(rejected || minimise(&mut solver, vars[c].entry).is_none());
    }

    #[test]
    fn solved_entries_respect_every_separation() {
        let section = platform_trio();
        let mut solver = Solver::default();
        let tag = solver.new_constraint_tag();
        let vars = add_trains(&mut solver, tag, &section, 120).unwrap();
        add_conflicts(&mut solver, tag, &section, &vars, 5, 10).unwrap();

        let entries = vars.iter().map(|v| v.entry.scaled(1)).collect();
        let total = sum_variable(&mut solver, tag, entries, 0, 3 * 1439).unwrap();
        let solution = minimise(&mut solver, total).unwrap();
        let entries: Vec<i32> = vars
            .iter()
            .map(|v| solution.get_integer_value(v.entry))
            .collect();
        for (a, b) in section.pairs() {
            let gap = (entries[usize::from(a)] - entries[usize::from(b)]).abs();
            let required = if section.trains[a].shares_entry_platform(&section.trains[b]) {
                10
            } else {
                5
            };
            assert!(gap >= required, "{:?} too close: {:?}", (a, b), entries);
        }
        // Two hours early is the limit, with C between the platform-sharing pair: 240, 250, 245.
        assert_eq!(solution.get_integer_value(total), 3 * 240 + 15);
    }
}
