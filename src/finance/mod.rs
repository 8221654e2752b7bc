//! Financial evaluation of optimization results.

pub mod roi;

pub use roi::{ChargerType, EnvironmentalImpact, RoiAssumptions, RoiEvaluator, RoiReport};

use anyhow::Result;

use crate::optimizer::OptimizationResult;

/// Turns an optimization result into a financial report.
///
/// Evaluators read the result and never modify it.
pub trait FinancialEvaluator {
    type Report;

    fn evaluate(&self, result: &OptimizationResult) -> Result<Self::Report>;
}
