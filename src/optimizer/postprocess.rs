//! Schedule post-processor: solved values to caller-facing metrics.

use itertools::Itertools;

use super::model::ScheduleModel;
use super::{LoadMetrics, LoadProfile, OptimizationResult, SlotLoad, SolveStatus};
use crate::domain::DemandTable;

/// `peak / average`, or `None` when the average is zero.
pub fn peak_to_average(load_kw: &[f64]) -> Option<f64> {
    if load_kw.is_empty() {
        return None;
    }
    let average = load_kw.iter().sum::<f64>() / load_kw.len() as f64;
    if average == 0.0 {
        return None;
    }
    let peak = load_kw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(peak / average)
}

pub fn load_profile(load_kw: &[f64]) -> LoadProfile {
    let total: f64 = load_kw.iter().sum();
    let slots = load_kw
        .iter()
        .enumerate()
        .map(|(slot, &load)| SlotLoad {
            slot,
            load_kw: load,
            share_percent: if total > 0.0 { load / total * 100.0 } else { 0.0 },
        })
        .collect();
    LoadProfile {
        slots,
        peak_slot: load_kw.iter().position_max_by(|a, b| a.total_cmp(b)),
        off_peak_slot: load_kw.iter().position_min_by(|a, b| a.total_cmp(b)),
    }
}

pub fn load_metrics(load_kw: &[f64], slot_duration_hours: f64) -> LoadMetrics {
    let n = load_kw.len().max(1) as f64;
    let average = load_kw.iter().sum::<f64>() / n;
    let peak = load_kw.iter().copied().fold(0.0_f64, f64::max);
    let variance = load_kw.iter().map(|l| (l - average).powi(2)).sum::<f64>() / n;

    LoadMetrics {
        peak_load_kw: peak,
        average_load_kw: average,
        peak_to_average_ratio: peak_to_average(load_kw),
        load_variance: variance,
        total_energy_kwh: load_kw.iter().sum::<f64>() * slot_duration_hours,
        profile: load_profile(load_kw),
    }
}

/// `(1 - optimized / baseline) * 100`, kept negative when the optimized
/// ratio is worse.
pub fn flattening_percent(optimized_ratio: Option<f64>, baseline_ratio: Option<f64>) -> Option<f64> {
    match (optimized_ratio, baseline_ratio) {
        (Some(optimized), Some(baseline)) if baseline > 0.0 => Some((1.0 - optimized / baseline) * 100.0),
        _ => None,
    }
}

pub fn peak_reduction_percent(optimized_peak: f64, baseline_peak: f64) -> Option<f64> {
    (baseline_peak > 0.0).then(|| (1.0 - optimized_peak / baseline_peak) * 100.0)
}

/// Removes the residual the solver left on each pool's delivered energy.
///
/// Runs only on certified solutions, so the rescale factor differs from one by
/// at most the feasibility tolerance. Zero entries stay zero.
fn settle_energy(model: &ScheduleModel, values: &mut [f64]) {
    let specs = model.variables();
    let dt = model.slot_duration_hours();
    for pool in model.pools() {
        let power: Vec<usize> = pool
            .stations
            .iter()
            .flat_map(|&s| (0..model.horizon_slots()).map(move |t| model.power_index(s, t)))
            .collect();
        let delivered: f64 = power.iter().map(|&var| values[var] * dt).sum();
        if delivered <= 0.0 {
            continue;
        }
        let factor = pool.total_kwh() / delivered;
        for var in power {
            let spec = specs[var];
            let scaled = values[var] * factor;
            values[var] = spec.upper.map_or(scaled, |upper| scaled.min(upper)).max(spec.lower);
        }
    }
}

/// Builds the result for a certified optimal solve.
pub fn post_process(
    model: &ScheduleModel,
    demand: &DemandTable,
    mut values: Vec<f64>,
    objective_value: f64,
) -> OptimizationResult {
    settle_energy(model, &mut values);

    let dt = model.slot_duration_hours();
    let schedule = model.schedule_from(&values);
    let baseline = load_metrics(&demand.baseline_load_kw(dt), dt);
    let optimized = load_metrics(&schedule.aggregate_load_kw(), dt);

    let flattening = flattening_percent(optimized.peak_to_average_ratio, baseline.peak_to_average_ratio);
    let peak_reduction = peak_reduction_percent(optimized.peak_load_kw, baseline.peak_load_kw);

    tracing::info!(
        baseline_peak_kw = baseline.peak_load_kw,
        optimized_peak_kw = optimized.peak_load_kw,
        flattening_percent = flattening,
        "schedule post-processed"
    );

    OptimizationResult {
        status: SolveStatus::Optimal,
        status_message: None,
        objective: model.objective_kind(),
        slot_duration_hours: dt,
        objective_value: Some(objective_value),
        schedule: Some(schedule),
        optimized: Some(optimized),
        baseline,
        flattening_percent: flattening,
        peak_reduction_percent: peak_reduction,
    }
}

/// Builds the result for a solve that ended without a schedule.
pub fn unsolved(
    model: &ScheduleModel,
    demand: &DemandTable,
    status: SolveStatus,
    message: Option<String>,
) -> OptimizationResult {
    let dt = model.slot_duration_hours();
    OptimizationResult {
        status,
        status_message: message,
        objective: model.objective_kind(),
        slot_duration_hours: dt,
        objective_value: None,
        schedule: None,
        optimized: None,
        baseline: load_metrics(&demand.baseline_load_kw(dt), dt),
        flattening_percent: None,
        peak_reduction_percent: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Station, StationId};
    use crate::optimizer::{OptimizerConfig, ShiftWindow};

    #[test]
    fn test_peak_to_average_guards_zero_average() {
        assert_eq!(peak_to_average(&[0.0, 0.0, 0.0]), None);
        assert_eq!(peak_to_average(&[]), None);
        assert_eq!(peak_to_average(&[8.0, 0.0, 0.0, 8.0]), Some(2.0));
        assert_eq!(peak_to_average(&[4.0, 4.0]), Some(1.0));
    }

    #[test]
    fn test_flattening_keeps_negative_values() {
        assert_eq!(flattening_percent(Some(1.0), Some(2.0)), Some(50.0));
        assert_eq!(flattening_percent(Some(3.0), Some(2.0)), Some(-50.0));
        assert_eq!(flattening_percent(None, Some(2.0)), None);
        assert_eq!(flattening_percent(Some(1.0), None), None);
    }

    #[test]
    fn test_peak_reduction() {
        assert_eq!(peak_reduction_percent(4.0, 8.0), Some(50.0));
        assert_eq!(peak_reduction_percent(4.0, 0.0), None);
    }

    #[test]
    fn test_load_profile_shares_and_extremes() {
        let profile = load_profile(&[1.0, 5.0, 0.5, 3.5]);
        assert_eq!(profile.peak_slot, Some(1));
        assert_eq!(profile.off_peak_slot, Some(2));
        assert_eq!(profile.slots[1].share_percent, 50.0);
        let total: f64 = profile.slots.iter().map(|s| s.share_percent).sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_load_metrics() {
        let metrics = load_metrics(&[8.0, 0.0, 0.0, 8.0], 0.5);
        assert_eq!(metrics.peak_load_kw, 8.0);
        assert_eq!(metrics.average_load_kw, 4.0);
        assert_eq!(metrics.peak_to_average_ratio, Some(2.0));
        assert_eq!(metrics.load_variance, 16.0);
        assert_eq!(metrics.total_energy_kwh, 8.0);
    }

    #[test]
    fn test_post_process_settles_energy_residual() {
        let table = DemandTable::new(2, vec![Station::new("A", 5.0, vec![3.0, 1.0])]).unwrap();
        let model = ScheduleModel::build(&table, &OptimizerConfig::with_horizon(2)).unwrap();
        let values = vec![2.0 + 3e-7, 2.0, 2.0];
        let result = post_process(&model, &table, values, 2.0);
        let schedule = result.schedule.unwrap();
        let energy = schedule.station_energy_kwh(&StationId::from("A")).unwrap();
        assert!((energy - 4.0).abs() < 1e-12);
        assert_eq!(result.baseline.peak_load_kw, 3.0);
        assert_eq!(result.status, SolveStatus::Optimal);
    }

    #[test]
    fn test_post_process_settles_windowed_pool() {
        let table = DemandTable::new(4, vec![Station::new("A", 5.0, vec![4.0, 0.0, 0.0, 0.0])]).unwrap();
        let cfg = OptimizerConfig {
            max_shift_slots: ShiftWindow::Slots(1),
            ..OptimizerConfig::with_horizon(4)
        };
        let model = ScheduleModel::build(&table, &cfg).unwrap();
        // x[0..4], flows from origin 0 into slots 0 and 1, P
        let values = vec![2.0 + 3e-7, 2.0, 0.0, 0.0, 2.0 + 3e-7, 2.0, 2.0];
        let schedule = post_process(&model, &table, values, 2.0).schedule.unwrap();
        let energy = schedule.station_energy_kwh(&StationId::from("A")).unwrap();
        assert!((energy - 4.0).abs() < 1e-12);
        assert_eq!(schedule.power_at(&StationId::from("A"), 2), Some(0.0));
    }

    #[test]
    fn test_unsolved_keeps_baseline_only() {
        let table = DemandTable::new(2, vec![Station::new("A", 5.0, vec![3.0, 1.0])]).unwrap();
        let model = ScheduleModel::build(&table, &OptimizerConfig::with_horizon(2)).unwrap();
        let result = unsolved(&model, &table, SolveStatus::Unbounded, None);
        assert!(result.schedule.is_none());
        assert!(result.optimized.is_none());
        assert_eq!(result.baseline.peak_to_average_ratio, Some(1.5));
    }
}
