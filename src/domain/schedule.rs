use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::StationId;

/// Charging power per station and slot produced by one optimization call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingSchedule {
    pub slot_duration_hours: f64,
    /// Power drawn by each station in each slot (kW).
    pub power_kw: BTreeMap<StationId, Vec<f64>>,
}

impl ChargingSchedule {
    pub fn horizon_slots(&self) -> usize {
        self.power_kw.values().next().map(Vec::len).unwrap_or(0)
    }

    pub fn power_at(&self, station: &StationId, slot: usize) -> Option<f64> {
        self.power_kw.get(station).and_then(|p| p.get(slot)).copied()
    }

    /// `L[t]`: summed power of every station per slot.
    pub fn aggregate_load_kw(&self) -> Vec<f64> {
        let mut load = vec![0.0; self.horizon_slots()];
        for series in self.power_kw.values() {
            for (slot, kw) in series.iter().enumerate() {
                load[slot] += kw;
            }
        }
        load
    }

    pub fn station_energy_kwh(&self, station: &StationId) -> Option<f64> {
        self.power_kw
            .get(station)
            .map(|p| p.iter().sum::<f64>() * self.slot_duration_hours)
    }

    pub fn total_energy_kwh(&self) -> f64 {
        self.power_kw.values().flatten().sum::<f64>() * self.slot_duration_hours
    }
}
