//! Batch runs over the shipped configuration and sample data.

use ev_load_optimizer::config::Config;
use ev_load_optimizer::finance::ChargerType;
use ev_load_optimizer::runner::{self, ScenarioReport};
use ev_load_optimizer::{DemandTable, ScheduleOptimizer, ShiftWindow};
use std::sync::Arc;

#[test]
fn test_default_config_loads() {
    let cfg = Config::load_from("config/default.toml").unwrap();
    assert_eq!(cfg.optimizer.horizon_slots, 24);
    assert_eq!(cfg.finance.charger_type, ChargerType::FastDc);
    assert_eq!(cfg.scenarios.len(), 3);

    let shifted = cfg.optimizer_for(&cfg.scenarios[1]).unwrap();
    assert_eq!(shifted.max_shift_slots, ShiftWindow::Slots(4));
    assert_eq!(shifted.horizon_slots, 24);
    assert_eq!(shifted.solver_time_limit_seconds, 30.0);
    assert_eq!(cfg.optimizer_for(&cfg.scenarios[0]).unwrap().max_shift_slots, ShiftWindow::Unlimited);
}

#[test]
fn test_sample_demand_sums_duplicate_rows() {
    let table = DemandTable::from_csv_path(24, "data/sample_demand.csv").unwrap();
    assert_eq!(table.len(), 3);
    let mall = table.get(&"MALL-01".into()).unwrap();
    assert_eq!(mall.baseline_demand_kwh[19], 14.0);
    assert_eq!(mall.capacity_kw, 30.0);
}

#[cfg(feature = "optimization")]
#[tokio::test]
async fn test_default_scenarios_run_end_to_end() {
    let cfg = Config::load_from("config/default.toml").unwrap();
    let reports = runner::run_all(&cfg, Arc::new(ScheduleOptimizer::default())).await.unwrap();
    assert_eq!(reports.len(), 3);

    for report in &reports {
        assert!(report.error.is_none(), "{}: {:?}", report.scenario, report.error);
        let result = report.result.as_ref().unwrap();
        assert!(result.is_optimal(), "{}: {}", report.scenario, result.status);
        assert!(result.peak_load_kw().unwrap() <= result.baseline.peak_load_kw + 1e-6);

        let roi = report.roi.as_ref().unwrap();
        assert!(roi.annual_demand_charge_saving >= 0.0);
        assert_eq!(roi.yearly_cashflows.len(), 11);
    }

    // A tighter shift window can never beat the unrestricted one.
    let unlimited = reports[0].result.as_ref().unwrap().peak_load_kw().unwrap();
    let shifted = reports[1].result.as_ref().unwrap().peak_load_kw().unwrap();
    assert!(unlimited <= shifted + 1e-6);

    let json = serde_json::to_string(&reports).unwrap();
    let back: Vec<ScenarioReport> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, reports);
}
