//! Peak-flattening schedules for fleets of EV charging stations.
//!
//! Baseline per-slot demand goes in; a per-station charging plan that keeps
//! each station's energy while minimizing the fleet's peak (or variance)
//! comes out, solved as a linear program.

pub mod config;
pub mod domain;
pub mod error;
pub mod finance;
pub mod optimizer;
pub mod runner;
pub mod telemetry;

pub use domain::{ChargingSchedule, DemandRecord, DemandTable, Station, StationId, SyntheticDemand};
pub use error::{EnergyShortfall, OptimizerError};
pub use optimizer::{Objective, OptimizationResult, OptimizerConfig, ScheduleOptimizer, ShiftWindow, SolveStatus};
