//! Clarabel backend through `good_lp`.
//!
//! Clarabel is a pure-Rust interior-point solver, so it needs no native
//! libraries. Variables whose bounds coincide (slots outside a shift window)
//! are substituted as constants before the problem is handed over; an
//! interior-point method has no strict interior for them.
//!
//! The time limit is passed to Clarabel itself, which stops iterating once it
//! expires. `good_lp` reports dual infeasibility as a solution, so the raw
//! solver status is inspected before any values are read.

use super::{bound_infeasible_row, LpSolver, SolveLimits, SolveOutcome};
use crate::optimizer::model::ScheduleModel;

#[derive(Debug, Clone, Copy, Default)]
pub struct ClarabelSolver;

impl ClarabelSolver {
    pub fn new() -> Self {
        Self
    }
}

impl LpSolver for ClarabelSolver {
    fn name(&self) -> &'static str {
        "clarabel"
    }

    fn solve(&self, model: &ScheduleModel, limits: &SolveLimits) -> SolveOutcome {
        if let Some(row) = bound_infeasible_row(model) {
            tracing::debug!(constraint = ?row.kind, "row unreachable within variable bounds");
            return SolveOutcome::Infeasible;
        }
        solve_with_clarabel(model, limits)
    }
}

/// Outcome decided by the raw Clarabel status alone, or `None` when the
/// primal values can be read.
#[cfg(feature = "optimization")]
fn outcome_for_status(status: ::clarabel::solver::SolverStatus) -> Option<SolveOutcome> {
    use ::clarabel::solver::SolverStatus;

    match status {
        SolverStatus::Solved | SolverStatus::AlmostSolved => None,
        SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => Some(SolveOutcome::Infeasible),
        SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => Some(SolveOutcome::Unbounded),
        SolverStatus::MaxTime => Some(SolveOutcome::failure("clarabel: time limit reached")),
        SolverStatus::MaxIterations => Some(SolveOutcome::failure("clarabel: iteration limit reached")),
        other => Some(SolveOutcome::failure(format!("clarabel: {other:?}"))),
    }
}

#[cfg(feature = "optimization")]
fn outcome_for_error(error: good_lp::ResolutionError) -> SolveOutcome {
    use good_lp::ResolutionError;

    match error {
        ResolutionError::Infeasible => SolveOutcome::Infeasible,
        ResolutionError::Unbounded => SolveOutcome::Unbounded,
        ResolutionError::Other(reason) => SolveOutcome::failure(format!("clarabel: {reason}")),
        ResolutionError::Str(reason) => SolveOutcome::failure(format!("clarabel: {reason}")),
    }
}

#[cfg(feature = "optimization")]
fn solve_with_clarabel(model: &ScheduleModel, limits: &SolveLimits) -> SolveOutcome {
    use crate::optimizer::model::Relation;
    use good_lp::solvers::clarabel::clarabel;
    use good_lp::{constraint, variable, Expression, ProblemVariables, Solution, SolverModel, Variable};

    enum Column {
        Free(Variable),
        Fixed(f64),
    }

    let mut vars = ProblemVariables::new();
    let columns: Vec<Column> = model
        .variables()
        .iter()
        .map(|spec| {
            if spec.is_fixed() {
                Column::Fixed(spec.lower)
            } else {
                let mut definition = variable().min(spec.lower);
                if let Some(upper) = spec.upper {
                    definition = definition.max(upper);
                }
                Column::Free(vars.add(definition))
            }
        })
        .collect();

    let linear = |terms: &[(usize, f64)]| -> Expression {
        let mut expr = Expression::from(0.0);
        for &(var, coef) in terms {
            match columns[var] {
                Column::Free(v) => expr += coef * v,
                Column::Fixed(value) => expr += coef * value,
            }
        }
        expr
    };

    let mut problem = vars.minimise(linear(model.objective())).using(clarabel);
    for row in model.constraints() {
        let lhs = linear(&row.terms);
        let rhs = row.rhs;
        problem = problem.with(match row.relation {
            Relation::LessOrEqual => constraint!(lhs <= rhs),
            Relation::Equal => constraint!(lhs == rhs),
            Relation::GreaterOrEqual => constraint!(lhs >= rhs),
        });
    }
    problem.settings().time_limit(limits.time_limit.as_secs_f64());

    let solution = match problem.solve() {
        Ok(solution) => solution,
        Err(error) => return outcome_for_error(error),
    };
    if let Some(outcome) = outcome_for_status(solution.inner().status) {
        return outcome;
    }

    let values: Vec<f64> = columns
        .iter()
        .map(|column| match column {
            Column::Free(v) => solution.value(*v),
            Column::Fixed(value) => *value,
        })
        .collect();
    let objective = model.objective_value(&values);
    SolveOutcome::Optimal { values, objective }
}

#[cfg(not(feature = "optimization"))]
fn solve_with_clarabel(_model: &ScheduleModel, _limits: &SolveLimits) -> SolveOutcome {
    SolveOutcome::failure("LP solving requires the 'optimization' feature to be enabled")
}
