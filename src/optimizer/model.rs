//! Schedule model builder.
//!
//! Translates a demand table and an [`OptimizerConfig`] into a linear program
//! that does not depend on any solver library:
//!
//! - `x[s,t]` power of station `s` in slot `t`, `lower(s,t) <= x[s,t] <= cap(s)`
//!   (upper bound 0 outside the shift window)
//! - energy conservation `sum_t x[s,t] * dt = sum_t demand(s,t)` per station,
//!   or once for the whole fleet when per-station conservation is off
//! - with a finite shift window the energy rows become transport rows: each
//!   origin slot's demand is delivered by flows that stay within `k` slots of it
//! - minimize-peak: one extra variable `P` and `L[t] <= P` for every slot
//! - minimize-variance: one extra variable `d[t]` per slot bounded below by
//!   tangent cuts of `(L[t] - mean)^2`
//!
//! Unsatisfiable energy requirements are detected here, before any solver runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Objective, OptimizerConfig, ShiftWindow};
use crate::domain::{ChargingSchedule, DemandTable, StationId};
use crate::error::{EnergyShortfall, OptimizerError};

/// Upper and lower bounds closer than this make a variable fixed.
pub const FIXED_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableKind {
    Power { station: usize, slot: usize },
    /// Energy of `pool` demanded in slot `origin` and delivered in `slot` (kW).
    Flow { pool: usize, origin: usize, slot: usize },
    Peak,
    Deviation { slot: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub kind: VariableKind,
    pub lower: f64,
    /// `None` means unbounded above.
    pub upper: Option<f64>,
}

impl VariableSpec {
    pub fn is_fixed(&self) -> bool {
        matches!(self.upper, Some(upper) if upper - self.lower <= FIXED_TOLERANCE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    LessOrEqual,
    Equal,
    GreaterOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    StationEnergy { station: usize },
    FleetEnergy,
    /// Demand of one origin slot is delivered within its shift window.
    OriginEnergy { pool: usize, origin: usize },
    /// Pool power in a slot equals the flows arriving there.
    ShiftLink { pool: usize, slot: usize },
    PeakBound { slot: usize },
    VarianceCut { slot: usize, breakpoint: usize },
}

/// `sum(coef * var) <relation> rhs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    pub kind: ConstraintKind,
    pub terms: Vec<(usize, f64)>,
    pub relation: Relation,
    pub rhs: f64,
}

impl LinearConstraint {
    pub fn activity(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|&(var, coef)| coef * values[var]).sum()
    }

    /// How far `values` are from satisfying the constraint; zero when satisfied.
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs = self.activity(values);
        match self.relation {
            Relation::LessOrEqual => (lhs - self.rhs).max(0.0),
            Relation::GreaterOrEqual => (self.rhs - lhs).max(0.0),
            Relation::Equal => (lhs - self.rhs).abs(),
        }
    }

    /// Magnitude used to scale tolerances for this row.
    pub fn scale(&self, values: &[f64]) -> f64 {
        let terms: f64 = self
            .terms
            .iter()
            .map(|&(var, coef)| (coef * values[var]).abs())
            .sum();
        1.0_f64.max(self.rhs.abs()).max(terms)
    }
}

/// Stations whose energy is balanced together: every station on its own, or
/// the whole fleet when per-station conservation is off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyPool {
    /// Station indices, ascending.
    pub stations: Vec<usize>,
    /// Baseline energy of the pool per origin slot (kWh).
    pub demand_kwh: Vec<f64>,
}

impl EnergyPool {
    pub fn total_kwh(&self) -> f64 {
        self.demand_kwh.iter().sum()
    }

    /// Slots holding nonzero baseline demand.
    pub fn origins(&self) -> impl Iterator<Item = usize> + '_ {
        self.demand_kwh
            .iter()
            .enumerate()
            .filter(|(_, &kwh)| kwh > 0.0)
            .map(|(slot, _)| slot)
    }
}

/// A built linear program, ready for an [`LpSolver`](super::LpSolver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleModel {
    station_ids: Vec<StationId>,
    capacities_kw: Vec<f64>,
    horizon_slots: usize,
    slot_duration_hours: f64,
    objective_kind: Objective,
    pools: Vec<EnergyPool>,
    variables: Vec<VariableSpec>,
    constraints: Vec<LinearConstraint>,
    objective: Vec<(usize, f64)>,
}

impl ScheduleModel {
    pub fn build(demand: &DemandTable, config: &OptimizerConfig) -> Result<Self, OptimizerError> {
        config.check()?;
        if demand.horizon_slots() != config.horizon_slots {
            return Err(OptimizerError::invalid(format!(
                "demand table covers {} slots but horizon_slots is {}",
                demand.horizon_slots(),
                config.horizon_slots
            )));
        }
        if demand.is_empty() {
            return Err(OptimizerError::invalid("demand table has no stations"));
        }

        precheck(demand, config)?;

        let horizon = config.horizon_slots;
        let dt = config.slot_duration_hours;
        let station_ids: Vec<StationId> = demand.stations().map(|s| s.id.clone()).collect();
        let capacities_kw: Vec<f64> = demand.stations().map(|s| s.capacity_kw).collect();
        let pools = energy_pools(demand, config.energy_conservation);

        let mut variables = Vec::with_capacity(station_ids.len() * horizon + horizon);
        for (s, station) in demand.stations().enumerate() {
            let pool = &pools[if config.energy_conservation { s } else { 0 }];
            for (t, &baseline_kwh) in station.baseline_demand_kwh.iter().enumerate() {
                let reachable = pool.origins().any(|origin| config.max_shift_slots.covers(origin, t));
                let upper = if reachable { station.capacity_kw } else { 0.0 };
                let lower = config
                    .max_shift_fraction
                    .map(|fraction| ((1.0 - fraction) * baseline_kwh / dt).min(upper))
                    .unwrap_or(0.0);
                variables.push(VariableSpec {
                    kind: VariableKind::Power { station: s, slot: t },
                    lower,
                    upper: Some(upper),
                });
            }
        }

        let mut constraints = Vec::new();
        match config.max_shift_slots {
            ShiftWindow::Unlimited => {
                for pool in &pools {
                    let kind = if config.energy_conservation {
                        ConstraintKind::StationEnergy { station: pool.stations[0] }
                    } else {
                        ConstraintKind::FleetEnergy
                    };
                    constraints.push(LinearConstraint {
                        kind,
                        terms: pool
                            .stations
                            .iter()
                            .flat_map(|&s| (0..horizon).map(move |t| (s * horizon + t, dt)))
                            .collect(),
                        relation: Relation::Equal,
                        rhs: pool.total_kwh(),
                    });
                }
            }
            ShiftWindow::Slots(k) => {
                for (p, pool) in pools.iter().enumerate() {
                    let pool_capacity_kw: f64 = pool.stations.iter().map(|&s| capacities_kw[s]).sum();
                    add_shift_flows(
                        p,
                        pool,
                        k,
                        pool_capacity_kw,
                        config,
                        &mut variables,
                        &mut constraints,
                    );
                }
            }
        }

        let slot_load = |t: usize| -> Vec<(usize, f64)> {
            (0..station_ids.len()).map(|s| (s * horizon + t, 1.0)).collect()
        };

        let objective = match config.objective {
            Objective::MinimizePeak => {
                let peak = variables.len();
                variables.push(VariableSpec {
                    kind: VariableKind::Peak,
                    lower: 0.0,
                    upper: None,
                });
                for t in 0..horizon {
                    let mut terms = slot_load(t);
                    terms.push((peak, -1.0));
                    constraints.push(LinearConstraint {
                        kind: ConstraintKind::PeakBound { slot: t },
                        terms,
                        relation: Relation::LessOrEqual,
                        rhs: 0.0,
                    });
                }
                vec![(peak, 1.0)]
            }
            Objective::MinimizeVariance => {
                let mean_kw = demand.total_demand_kwh() / (dt * horizon as f64);
                let breakpoints =
                    tangent_breakpoints(-mean_kw, capacities_kw.iter().sum::<f64>() - mean_kw, config.variance_segments);
                let mut objective = Vec::with_capacity(horizon);
                for t in 0..horizon {
                    let deviation = variables.len();
                    variables.push(VariableSpec {
                        kind: VariableKind::Deviation { slot: t },
                        lower: 0.0,
                        upper: None,
                    });
                    // d >= 2a(L - m) - a^2  <=>  2a*L - d <= 2a*m + a^2
                    for (k, &a) in breakpoints.iter().enumerate() {
                        if a == 0.0 {
                            continue;
                        }
                        let mut terms: Vec<(usize, f64)> =
                            slot_load(t).into_iter().map(|(v, _)| (v, 2.0 * a)).collect();
                        terms.push((deviation, -1.0));
                        constraints.push(LinearConstraint {
                            kind: ConstraintKind::VarianceCut { slot: t, breakpoint: k },
                            terms,
                            relation: Relation::LessOrEqual,
                            rhs: 2.0 * a * mean_kw + a * a,
                        });
                    }
                    objective.push((deviation, 1.0));
                }
                objective
            }
        };

        let model = Self {
            station_ids,
            capacities_kw,
            horizon_slots: horizon,
            slot_duration_hours: dt,
            objective_kind: config.objective,
            pools,
            variables,
            constraints,
            objective,
        };

        tracing::debug!(
            stations = model.station_ids.len(),
            horizon_slots = horizon,
            variables = model.variables.len(),
            constraints = model.constraints.len(),
            objective = %config.objective,
            "built schedule model"
        );

        Ok(model)
    }

    pub fn station_ids(&self) -> &[StationId] {
        &self.station_ids
    }

    pub fn capacity_kw(&self, station: usize) -> f64 {
        self.capacities_kw[station]
    }

    pub fn horizon_slots(&self) -> usize {
        self.horizon_slots
    }

    pub fn slot_duration_hours(&self) -> f64 {
        self.slot_duration_hours
    }

    pub fn objective_kind(&self) -> Objective {
        self.objective_kind
    }

    pub fn pools(&self) -> &[EnergyPool] {
        &self.pools
    }

    pub fn variables(&self) -> &[VariableSpec] {
        &self.variables
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    /// Minimized as `sum(coef * var)`.
    pub fn objective(&self) -> &[(usize, f64)] {
        &self.objective
    }

    pub fn power_index(&self, station: usize, slot: usize) -> usize {
        station * self.horizon_slots + slot
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective.iter().map(|&(var, coef)| coef * values[var]).sum()
    }

    /// Maps solved variable values back to per-station power series.
    pub fn schedule_from(&self, values: &[f64]) -> ChargingSchedule {
        let power_kw: BTreeMap<StationId, Vec<f64>> = self
            .station_ids
            .iter()
            .enumerate()
            .map(|(s, id)| {
                let series = (0..self.horizon_slots)
                    .map(|t| values[self.power_index(s, t)])
                    .collect();
                (id.clone(), series)
            })
            .collect();
        ChargingSchedule {
            slot_duration_hours: self.slot_duration_hours,
            power_kw,
        }
    }
}

fn energy_pools(demand: &DemandTable, per_station: bool) -> Vec<EnergyPool> {
    if per_station {
        return demand
            .stations()
            .enumerate()
            .map(|(s, station)| EnergyPool {
                stations: vec![s],
                demand_kwh: station.baseline_demand_kwh.clone(),
            })
            .collect();
    }
    let mut demand_kwh = vec![0.0; demand.horizon_slots()];
    for station in demand.stations() {
        for (slot, kwh) in station.baseline_demand_kwh.iter().enumerate() {
            demand_kwh[slot] += kwh;
        }
    }
    vec![EnergyPool {
        stations: (0..demand.len()).collect(),
        demand_kwh,
    }]
}

/// Transport rows for a finite shift window.
///
/// Each origin slot `o` gets flows `y[o,t]` for `|o - t| <= k` that deliver
/// exactly its baseline energy, and the pool's power in slot `t` equals the
/// flows arriving there. A flow never exceeds the origin's energy rate or the
/// pool's combined capacity. With a shift fraction the flow staying at its own
/// origin keeps at least the retained share.
fn add_shift_flows(
    p: usize,
    pool: &EnergyPool,
    k: usize,
    pool_capacity_kw: f64,
    config: &OptimizerConfig,
    variables: &mut Vec<VariableSpec>,
    constraints: &mut Vec<LinearConstraint>,
) {
    let horizon = config.horizon_slots;
    let dt = config.slot_duration_hours;
    let mut inflow: Vec<Vec<usize>> = vec![Vec::new(); horizon];

    for origin in pool.origins() {
        let origin_kwh = pool.demand_kwh[origin];
        let upper = (origin_kwh / dt).min(pool_capacity_kw);
        let retained_kw = config
            .max_shift_fraction
            .map(|fraction| ((1.0 - fraction) * origin_kwh / dt).min(upper))
            .unwrap_or(0.0);

        let first = origin.saturating_sub(k);
        let last = origin.saturating_add(k).min(horizon - 1);
        let mut terms = Vec::with_capacity(last - first + 1);
        for slot in first..=last {
            let var = variables.len();
            variables.push(VariableSpec {
                kind: VariableKind::Flow { pool: p, origin, slot },
                lower: if slot == origin { retained_kw } else { 0.0 },
                upper: Some(upper),
            });
            terms.push((var, dt));
            inflow[slot].push(var);
        }
        constraints.push(LinearConstraint {
            kind: ConstraintKind::OriginEnergy { pool: p, origin },
            terms,
            relation: Relation::Equal,
            rhs: origin_kwh,
        });
    }

    for (slot, arriving) in inflow.into_iter().enumerate() {
        // no flow reaches this slot, so every power column here is fixed at 0
        if arriving.is_empty() {
            continue;
        }
        let mut terms: Vec<(usize, f64)> = pool.stations.iter().map(|&s| (s * horizon + slot, 1.0)).collect();
        terms.extend(arriving.into_iter().map(|var| (var, -1.0)));
        constraints.push(LinearConstraint {
            kind: ConstraintKind::ShiftLink { pool: p, slot },
            terms,
            relation: Relation::Equal,
            rhs: 0.0,
        });
    }
}

/// Evenly spaced tangent points over `[lo, hi]`, always including zero.
fn tangent_breakpoints(lo: f64, hi: f64, segments: usize) -> Vec<f64> {
    let mut points: Vec<f64> = (0..=segments)
        .map(|k| lo + (hi - lo) * k as f64 / segments as f64)
        .collect();
    if !points.iter().any(|&a| a == 0.0) {
        points.push(0.0);
    }
    points.sort_by(|a, b| a.total_cmp(b));
    points.dedup();
    points
}

fn energy_slack(required: f64) -> f64 {
    1e-9 * required.abs().max(1.0)
}

/// Rejects requirements that no schedule can satisfy regardless of timing.
fn precheck(demand: &DemandTable, config: &OptimizerConfig) -> Result<(), OptimizerError> {
    let dt = config.slot_duration_hours;
    let mut shortfalls = Vec::new();

    if config.energy_conservation {
        for station in demand.stations() {
            let required = station.total_demand_kwh();
            let deliverable = station.deliverable_kwh(dt);
            if required > deliverable + energy_slack(required) {
                shortfalls.push(EnergyShortfall {
                    station: Some(station.id.clone()),
                    slot: None,
                    required_kwh: required,
                    deliverable_kwh: deliverable,
                });
            }
        }
    } else {
        let required = demand.total_demand_kwh();
        let deliverable: f64 = demand.stations().map(|s| s.deliverable_kwh(dt)).sum();
        if required > deliverable + energy_slack(required) {
            shortfalls.push(EnergyShortfall {
                station: None,
                slot: None,
                required_kwh: required,
                deliverable_kwh: deliverable,
            });
        }
    }

    if let Some(fraction) = config.max_shift_fraction {
        for station in demand.stations() {
            let per_slot = station.capacity_kw * dt;
            for (slot, &kwh) in station.baseline_demand_kwh.iter().enumerate() {
                let retained = (1.0 - fraction) * kwh;
                if retained > per_slot + energy_slack(retained) {
                    shortfalls.push(EnergyShortfall {
                        station: Some(station.id.clone()),
                        slot: Some(slot),
                        required_kwh: retained,
                        deliverable_kwh: per_slot,
                    });
                }
            }
        }
    }

    if shortfalls.is_empty() {
        Ok(())
    } else {
        tracing::warn!(count = shortfalls.len(), "energy requirements exceed station capacity");
        Err(OptimizerError::InfeasibleModel { shortfalls })
    }
}
