use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::Objective;
use crate::domain::ChargingSchedule;
use crate::error::OptimizerError;

/// Four-way classification of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    NumericalFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotLoad {
    pub slot: usize,
    pub load_kw: f64,
    /// Share of the horizon's energy drawn in this slot.
    pub share_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadProfile {
    pub slots: Vec<SlotLoad>,
    pub peak_slot: Option<usize>,
    pub off_peak_slot: Option<usize>,
}

/// Summary of an aggregate load series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadMetrics {
    pub peak_load_kw: f64,
    pub average_load_kw: f64,
    /// `None` when the average load is zero.
    pub peak_to_average_ratio: Option<f64>,
    /// Population variance of the slot loads (kW^2).
    pub load_variance: f64,
    pub total_energy_kwh: f64,
    pub profile: LoadProfile,
}

/// Outcome of one optimization call. Never mutated after it is returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub status: SolveStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    pub objective: Objective,
    pub slot_duration_hours: f64,
    /// Minimized objective; for the variance objective this is the
    /// piecewise-linear estimate, see `optimized.load_variance` for the exact value.
    pub objective_value: Option<f64>,
    pub schedule: Option<ChargingSchedule>,
    pub optimized: Option<LoadMetrics>,
    pub baseline: LoadMetrics,
    /// `(1 - optimized_ratio / baseline_ratio) * 100`. Negative values mean the
    /// optimized load is less flat than the baseline and are reported as-is.
    pub flattening_percent: Option<f64>,
    /// `(1 - optimized_peak / baseline_peak) * 100`.
    pub peak_reduction_percent: Option<f64>,
}

impl OptimizationResult {
    pub fn is_optimal(&self) -> bool {
        self.status == SolveStatus::Optimal
    }

    pub fn peak_load_kw(&self) -> Option<f64> {
        self.optimized.as_ref().map(|m| m.peak_load_kw)
    }

    pub fn peak_to_average_ratio(&self) -> Option<f64> {
        self.optimized.as_ref().and_then(|m| m.peak_to_average_ratio)
    }

    /// The schedule, or the solver classification as an error.
    pub fn into_schedule(self) -> Result<ChargingSchedule, OptimizerError> {
        match (self.status, self.schedule) {
            (SolveStatus::Optimal, Some(schedule)) => Ok(schedule),
            (SolveStatus::Infeasible, _) => Err(OptimizerError::SolverInfeasible),
            (SolveStatus::Unbounded, _) => Err(OptimizerError::Unbounded),
            (_, _) => Err(OptimizerError::NumericalFailure(
                self.status_message
                    .unwrap_or_else(|| "solver returned no schedule".to_string()),
            )),
        }
    }
}
