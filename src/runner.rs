//! Batch runner: one independent optimization per configured scenario.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::{Config, ScenarioConfig};
use crate::finance::{FinancialEvaluator, RoiAssumptions, RoiEvaluator, RoiReport};
use crate::optimizer::{OptimizationResult, OptimizerConfig, ScheduleOptimizer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub scenario: String,
    pub result: Option<OptimizationResult>,
    pub roi: Option<RoiReport>,
    /// Set when the scenario failed before a result existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Loads demand, optimizes it and evaluates ROI for one scenario.
pub fn run_scenario(
    optimizer: &ScheduleOptimizer,
    scenario: &ScenarioConfig,
    config: &OptimizerConfig,
    finance: &RoiAssumptions,
) -> Result<(OptimizationResult, RoiReport)> {
    let demand = scenario.demand(config)?;
    let result = optimizer
        .optimize(&demand, config)
        .with_context(|| format!("scenario {}: optimization failed", scenario.name))?;
    let roi = RoiEvaluator::new(finance.clone(), demand.len())
        .evaluate(&result)
        .with_context(|| format!("scenario {}: ROI evaluation failed", scenario.name))?;
    Ok((result, roi))
}

fn report(run_id: Uuid, name: String, outcome: Result<(OptimizationResult, RoiReport)>) -> ScenarioReport {
    let (result, roi, error) = match outcome {
        Ok((result, roi)) => (Some(result), Some(roi), None),
        Err(e) => (None, None, Some(format!("{e:#}"))),
    };
    ScenarioReport {
        run_id,
        generated_at: Utc::now(),
        scenario: name,
        result,
        roi,
        error,
    }
}

/// Runs every scenario in parallel on the blocking pool.
///
/// A failing scenario yields a report with `error` set; the others still run.
/// Reports come back in configuration order.
pub async fn run_all(config: &Config, optimizer: Arc<ScheduleOptimizer>) -> Result<Vec<ScenarioReport>> {
    let run_id = Uuid::new_v4();
    let mut tasks = JoinSet::new();

    for (index, scenario) in config.scenarios.iter().cloned().enumerate() {
        let optimizer = Arc::clone(&optimizer);
        let opt_config = config.optimizer_for(&scenario);
        let finance = config.finance.clone();
        tasks.spawn_blocking(move || {
            tracing::info!(%run_id, scenario = %scenario.name, "scenario started");
            let outcome = opt_config.and_then(|opt_config| run_scenario(&optimizer, &scenario, &opt_config, &finance));
            match &outcome {
                Ok((result, _)) => tracing::info!(scenario = %scenario.name, status = %result.status, "scenario finished"),
                Err(e) => tracing::warn!(scenario = %scenario.name, error = %format!("{e:#}"), "scenario failed"),
            }
            (index, report(run_id, scenario.name, outcome))
        });
    }

    let mut reports = Vec::with_capacity(config.scenarios.len());
    while let Some(joined) = tasks.join_next().await {
        reports.push(joined.context("scenario task panicked")?);
    }
    reports.sort_by_key(|(index, _)| *index);
    Ok(reports.into_iter().map(|(_, report)| report).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputConfig;
    use crate::domain::SyntheticDemand;
    use crate::optimizer::solver::MockLpSolver;
    use crate::optimizer::SolveOutcome;

    fn scenario(name: &str, stations: usize) -> ScenarioConfig {
        ScenarioConfig {
            name: name.to_string(),
            demand_csv: None,
            synthetic: Some(SyntheticDemand {
                stations,
                sessions_per_station: 2,
                capacity_kw: 100.0,
                seed: 3,
                id_prefix: "T".to_string(),
            }),
            optimizer: None,
        }
    }

    fn config(scenarios: Vec<ScenarioConfig>) -> Config {
        Config {
            optimizer: OptimizerConfig::with_horizon(6),
            finance: RoiAssumptions::default(),
            scenarios,
            output: OutputConfig::default(),
        }
    }

    fn unbounded_optimizer() -> Arc<ScheduleOptimizer> {
        let mut solver = MockLpSolver::new();
        solver.expect_name().return_const("mock");
        solver.expect_solve().returning(|_, _| SolveOutcome::Unbounded);
        Arc::new(ScheduleOptimizer::new(Box::new(solver)))
    }

    #[tokio::test]
    async fn test_reports_keep_configuration_order() {
        let cfg = config(vec![scenario("a", 1), scenario("b", 2), scenario("c", 3)]);
        let reports = run_all(&cfg, unbounded_optimizer()).await.unwrap();
        let names: Vec<_> = reports.iter().map(|r| r.scenario.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(reports.iter().all(|r| r.run_id == reports[0].run_id));
        assert_eq!(reports[2].roi.as_ref().unwrap().stations, 3);
    }

    #[tokio::test]
    async fn test_invalid_override_fails_only_its_scenario() {
        let mut overridden = scenario("overridden", 1);
        let mut overrides = figment::value::Dict::new();
        overrides.insert("horizon_slots".to_string(), 0usize.into());
        overridden.optimizer = Some(overrides);
        let cfg = config(vec![overridden, scenario("plain", 1)]);
        let reports = run_all(&cfg, unbounded_optimizer()).await.unwrap();
        assert!(reports[0].error.as_deref().unwrap().contains("optimizer overrides"));
        assert!(reports[1].result.is_some());
    }

    #[tokio::test]
    async fn test_failed_scenario_does_not_stop_others() {
        let mut broken = scenario("broken", 1);
        broken.synthetic = None;
        let cfg = config(vec![broken, scenario("ok", 1)]);
        let reports = run_all(&cfg, unbounded_optimizer()).await.unwrap();
        assert!(reports[0].error.as_deref().unwrap().contains("no demand source"));
        assert!(reports[0].result.is_none());
        assert!(reports[1].error.is_none());
        assert!(reports[1].result.is_some());
    }
}
