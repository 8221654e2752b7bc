pub mod constraints;
pub mod engine;
pub mod model;
pub mod postprocess;
pub mod solver;
pub mod types;

pub use constraints::*;
pub use engine::*;
pub use model::ScheduleModel;
pub use solver::{ClarabelSolver, LpSolver, SolveLimits, SolveOutcome};
pub use types::*;
