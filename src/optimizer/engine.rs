use std::time::Instant;

use super::model::ScheduleModel;
use super::solver::{self, ClarabelSolver, LpSolver, SolveLimits, SolveOutcome};
use super::{postprocess, OptimizationResult, OptimizerConfig, SolveStatus};
use crate::domain::DemandTable;
use crate::error::OptimizerError;

/// Runs one call through build, solve and post-processing.
///
/// Holds nothing but the solver backend, so a single instance can serve
/// concurrent calls from several threads.
pub struct ScheduleOptimizer {
    pub solver: Box<dyn LpSolver>,
}

impl Default for ScheduleOptimizer {
    fn default() -> Self {
        Self::new(Box::new(ClarabelSolver::new()))
    }
}

impl ScheduleOptimizer {
    pub fn new(solver: Box<dyn LpSolver>) -> Self {
        Self { solver }
    }

    /// Builds and solves the schedule model for `demand`.
    ///
    /// Configuration problems and energy shortfalls found before solving are
    /// returned as errors. Solver outcomes (optimal or not) come back as an
    /// [`OptimizationResult`] whose status tells them apart; use
    /// [`OptimizationResult::into_schedule`] to turn non-optimal statuses into
    /// errors.
    pub fn optimize(
        &self,
        demand: &DemandTable,
        config: &OptimizerConfig,
    ) -> Result<OptimizationResult, OptimizerError> {
        let model = ScheduleModel::build(demand, config)?;
        let limits = SolveLimits {
            time_limit: config.time_limit(),
        };

        let started = Instant::now();
        tracing::info!(
            solver = self.solver.name(),
            stations = demand.len(),
            horizon_slots = config.horizon_slots,
            objective = %config.objective,
            "solving charging schedule"
        );
        let outcome = solver::solve_and_classify(self.solver.as_ref(), &model, &limits);
        tracing::info!(
            status = %outcome.status(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "solver finished"
        );

        Ok(match outcome {
            SolveOutcome::Optimal { values, objective } => {
                postprocess::post_process(&model, demand, values, objective)
            }
            SolveOutcome::NumericalFailure { reason } => {
                postprocess::unsolved(&model, demand, SolveStatus::NumericalFailure, Some(reason))
            }
            other => {
                tracing::warn!(status = %other.status(), "no schedule produced");
                postprocess::unsolved(&model, demand, other.status(), None)
            }
        })
    }
}
