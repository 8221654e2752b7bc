//! LP solver adapter.
//!
//! Every backend reports through [`SolveOutcome`]; solver-specific status codes
//! never leave the backend module. [`solve_and_classify`] runs a backend and then
//! certifies its answer against the model: a returned vector is only reported as
//! optimal when it is finite, inside the variable bounds and satisfies every row.

pub mod clarabel;

pub use clarabel::ClarabelSolver;

use std::time::Duration;

use super::model::{LinearConstraint, Relation, ScheduleModel};
use super::SolveStatus;

/// Values with smaller magnitude are reported as exactly zero.
pub const ZERO_TOLERANCE: f64 = 1e-9;
/// Largest bound violation that is snapped back instead of rejected.
pub const BOUND_TOLERANCE: f64 = 1e-6;
/// Largest scaled row residual accepted from a solver.
pub const FEASIBILITY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Optimal { values: Vec<f64>, objective: f64 },
    Infeasible,
    Unbounded,
    NumericalFailure { reason: String },
}

impl SolveOutcome {
    pub fn status(&self) -> SolveStatus {
        match self {
            SolveOutcome::Optimal { .. } => SolveStatus::Optimal,
            SolveOutcome::Infeasible => SolveStatus::Infeasible,
            SolveOutcome::Unbounded => SolveStatus::Unbounded,
            SolveOutcome::NumericalFailure { .. } => SolveStatus::NumericalFailure,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        SolveOutcome::NumericalFailure {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveLimits {
    pub time_limit: Duration,
}

/// A linear-programming backend.
#[cfg_attr(test, mockall::automock)]
pub trait LpSolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Solves `model` within `limits`. Implementations enforce the time limit
    /// inside the solver and return on the calling thread.
    fn solve(&self, model: &ScheduleModel, limits: &SolveLimits) -> SolveOutcome;
}

/// Runs `solver` and certifies an optimal answer before handing it on.
pub fn solve_and_classify(solver: &dyn LpSolver, model: &ScheduleModel, limits: &SolveLimits) -> SolveOutcome {
    match solver.solve(model, limits) {
        SolveOutcome::Optimal { values, .. } => certify(model, values),
        SolveOutcome::NumericalFailure { reason } => {
            tracing::warn!(solver = solver.name(), %reason, "solver failed");
            SolveOutcome::NumericalFailure { reason }
        }
        other => other,
    }
}

/// Checks a raw solution against the model and cleans solver noise.
///
/// Values within [`BOUND_TOLERANCE`] outside a bound are moved onto it and
/// values below [`ZERO_TOLERANCE`] become zero. Anything further off is a
/// numerical failure, never clipped.
pub fn certify(model: &ScheduleModel, mut values: Vec<f64>) -> SolveOutcome {
    let specs = model.variables();
    if values.len() != specs.len() {
        return SolveOutcome::failure(format!(
            "solver returned {} values for {} variables",
            values.len(),
            specs.len()
        ));
    }

    for (index, (value, spec)) in values.iter_mut().zip(specs).enumerate() {
        if !value.is_finite() {
            return SolveOutcome::failure(format!("variable {index} ({:?}) is not finite", spec.kind));
        }
        let lower_slack = BOUND_TOLERANCE * spec.lower.abs().max(1.0);
        if *value < spec.lower - lower_slack {
            return SolveOutcome::failure(format!(
                "variable {index} ({:?}) = {value} below lower bound {}",
                spec.kind, spec.lower
            ));
        }
        if let Some(upper) = spec.upper {
            let upper_slack = BOUND_TOLERANCE * upper.abs().max(1.0);
            if *value > upper + upper_slack {
                return SolveOutcome::failure(format!(
                    "variable {index} ({:?}) = {value} above upper bound {upper}",
                    spec.kind
                ));
            }
            *value = value.min(upper);
        }
        *value = value.max(spec.lower);
        if value.abs() < ZERO_TOLERANCE {
            *value = 0.0;
        }
    }

    for row in model.constraints() {
        let violation = row.violation(&values);
        if violation > FEASIBILITY_TOLERANCE * row.scale(&values) {
            return SolveOutcome::failure(format!(
                "constraint {:?} violated by {violation:e}",
                row.kind
            ));
        }
    }

    let objective = model.objective_value(&values);
    SolveOutcome::Optimal { values, objective }
}

/// Activity range of a row implied by the variable bounds alone.
fn row_activity_range(model: &ScheduleModel, row: &LinearConstraint) -> (f64, f64) {
    let specs = model.variables();
    row.terms.iter().fold((0.0, 0.0), |(lo, hi), &(var, coef)| {
        let spec = specs[var];
        let upper = spec.upper.unwrap_or(f64::INFINITY);
        if coef >= 0.0 {
            (lo + coef * spec.lower, hi + coef * upper)
        } else {
            (lo + coef * upper, hi + coef * spec.lower)
        }
    })
}

/// Finds a row that no assignment within the variable bounds can satisfy.
pub fn bound_infeasible_row(model: &ScheduleModel) -> Option<&LinearConstraint> {
    model.constraints().iter().find(|row| {
        let (lo, hi) = row_activity_range(model, row);
        let slack = FEASIBILITY_TOLERANCE * row.rhs.abs().max(1.0);
        match row.relation {
            Relation::LessOrEqual => lo > row.rhs + slack,
            Relation::GreaterOrEqual => hi < row.rhs - slack,
            Relation::Equal => lo > row.rhs + slack || hi < row.rhs - slack,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DemandTable, Station};
    use crate::optimizer::{OptimizerConfig, ShiftWindow};

    fn model() -> ScheduleModel {
        let table = DemandTable::new(
            2,
            vec![
                Station::new("A", 4.0, vec![4.0, 0.0]),
                Station::new("B", 4.0, vec![0.0, 2.0]),
            ],
        )
        .unwrap();
        ScheduleModel::build(&table, &OptimizerConfig::with_horizon(2)).unwrap()
    }

    fn limits() -> SolveLimits {
        SolveLimits {
            time_limit: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_certify_accepts_feasible_and_snaps_noise() {
        // x_A = [2, 2], x_B = [1, 1], P = 3
        let values = vec![2.0, 2.0 + 1e-8, 1.0, 1.0 - 1e-8, 3.0];
        match certify(&model(), values) {
            SolveOutcome::Optimal { values, objective } => {
                assert_eq!(objective, 3.0);
                assert_eq!(values[0], 2.0);
            }
            other => panic!("expected optimal, got {other:?}"),
        }
    }

    #[test]
    fn test_certify_snaps_tiny_values_to_zero() {
        let values = vec![4.0, 5e-10, 0.0, 2.0, 4.0];
        match certify(&model(), values) {
            SolveOutcome::Optimal { values, .. } => assert_eq!(values[1], 0.0),
            other => panic!("expected optimal, got {other:?}"),
        }
    }

    #[test]
    fn test_certify_rejects_bound_violation() {
        // A draws 5 kW in slot 0 against a 4 kW limit.
        let values = vec![5.0, -1.0, 1.0, 1.0, 5.0];
        assert!(matches!(certify(&model(), values), SolveOutcome::NumericalFailure { .. }));
    }

    #[test]
    fn test_certify_rejects_broken_energy_row() {
        let values = vec![1.0, 1.0, 1.0, 1.0, 2.0];
        assert!(matches!(certify(&model(), values), SolveOutcome::NumericalFailure { .. }));
    }

    #[test]
    fn test_certify_rejects_non_finite_and_wrong_length() {
        assert!(matches!(
            certify(&model(), vec![f64::NAN, 2.0, 1.0, 1.0, 3.0]),
            SolveOutcome::NumericalFailure { .. }
        ));
        assert!(matches!(certify(&model(), vec![1.0]), SolveOutcome::NumericalFailure { .. }));
    }

    #[test]
    fn test_solve_and_classify_passes_statuses_through() {
        for outcome in [SolveOutcome::Infeasible, SolveOutcome::Unbounded] {
            let mut solver = MockLpSolver::new();
            let expected = outcome.clone();
            solver.expect_solve().returning(move |_, _| outcome.clone());
            solver.expect_name().return_const("mock");
            assert_eq!(solve_and_classify(&solver, &model(), &limits()), expected);
        }
    }

    #[test]
    fn test_solve_and_classify_does_not_trust_solver_vector() {
        let mut solver = MockLpSolver::new();
        solver.expect_solve().returning(|_, _| SolveOutcome::Optimal {
            values: vec![0.0; 5],
            objective: 0.0,
        });
        solver.expect_name().return_const("mock");
        assert_eq!(
            solve_and_classify(&solver, &model(), &limits()).status(),
            SolveStatus::NumericalFailure
        );
    }

    #[test]
    fn test_bound_infeasible_row_detects_window_shortfall() {
        let table = DemandTable::new(4, vec![Station::new("S", 1.0, vec![3.0, 0.0, 0.0, 0.0])]).unwrap();
        let cfg = OptimizerConfig {
            max_shift_slots: ShiftWindow::Slots(1),
            ..OptimizerConfig::with_horizon(4)
        };
        let model = ScheduleModel::build(&table, &cfg).unwrap();
        assert!(bound_infeasible_row(&model).is_some());
        assert!(bound_infeasible_row(&self::model()).is_none());
    }
}
