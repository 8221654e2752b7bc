use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::StationId;

/// Errors surfaced by a single optimization call.
///
/// Every variant is local to the call that produced it; the engine holds no
/// state between calls, so a caller may retry immediately with adjusted input.
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Infeasible model: {}", describe_shortfalls(.shortfalls))]
    InfeasibleModel { shortfalls: Vec<EnergyShortfall> },

    #[error("Solver reported the schedule model infeasible")]
    SolverInfeasible,

    #[error("Solver reported the schedule model unbounded")]
    Unbounded,

    #[error("Numerical failure: {0}")]
    NumericalFailure(String),

    #[error("Failed to read demand table: {0}")]
    Csv(#[from] csv::Error),
}

impl OptimizerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        OptimizerError::InvalidConfiguration(message.into())
    }
}

impl From<validator::ValidationErrors> for OptimizerError {
    fn from(errors: validator::ValidationErrors) -> Self {
        OptimizerError::InvalidConfiguration(errors.to_string())
    }
}

/// Energy a station (or one of its slots) needs but cannot physically receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyShortfall {
    /// `None` for a fleet-wide shortfall when per-station conservation is off.
    pub station: Option<StationId>,
    /// Set when a single slot's retained energy exceeds what the charger can deliver.
    pub slot: Option<usize>,
    pub required_kwh: f64,
    pub deliverable_kwh: f64,
}

impl EnergyShortfall {
    pub fn shortfall_kwh(&self) -> f64 {
        self.required_kwh - self.deliverable_kwh
    }
}

fn describe_shortfalls(shortfalls: &[EnergyShortfall]) -> String {
    shortfalls
        .iter()
        .map(|s| {
            let station = s
                .station
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "fleet".to_string());
            match s.slot {
                Some(slot) => format!(
                    "{station} slot {slot} needs {:.3} kWh but can deliver {:.3} kWh",
                    s.required_kwh, s.deliverable_kwh
                ),
                None => format!(
                    "{station} needs {:.3} kWh but can deliver {:.3} kWh (short {:.3} kWh)",
                    s.required_kwh,
                    s.deliverable_kwh,
                    s.shortfall_kwh()
                ),
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}
