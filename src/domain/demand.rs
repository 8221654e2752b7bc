//! Demand series boundary: per-station, per-slot energy demand and capacity.
//!
//! Records arrive keyed by `(station_id, slot)`. Missing slots count as zero
//! demand, repeated rows for the same slot are summed (several sessions in the
//! same hour), and a station must report the same capacity on every row.

use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use super::{Station, StationId};
use crate::error::OptimizerError;

/// One row of the demand table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandRecord {
    pub station_id: StationId,
    pub slot: usize,
    pub capacity_kw: f64,
    pub demand_kwh: f64,
}

impl DemandRecord {
    pub fn new(station_id: impl Into<StationId>, slot: usize, capacity_kw: f64, demand_kwh: f64) -> Self {
        Self {
            station_id: station_id.into(),
            slot,
            capacity_kw,
            demand_kwh,
        }
    }
}

/// Validated demand for every station over a fixed horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandTable {
    horizon_slots: usize,
    stations: BTreeMap<StationId, Station>,
}

impl DemandTable {
    pub fn new(
        horizon_slots: usize,
        stations: impl IntoIterator<Item = Station>,
    ) -> Result<Self, OptimizerError> {
        if horizon_slots == 0 {
            return Err(OptimizerError::invalid("horizon_slots must be greater than zero"));
        }

        let mut table = BTreeMap::new();
        for station in stations {
            station.validate(horizon_slots)?;
            match table.entry(station.id.clone()) {
                Entry::Occupied(_) => {
                    return Err(OptimizerError::invalid(format!(
                        "station {} listed more than once",
                        station.id
                    )))
                }
                Entry::Vacant(slot) => {
                    slot.insert(station);
                }
            }
        }

        Ok(Self {
            horizon_slots,
            stations: table,
        })
    }

    pub fn from_records(
        horizon_slots: usize,
        records: impl IntoIterator<Item = DemandRecord>,
    ) -> Result<Self, OptimizerError> {
        if horizon_slots == 0 {
            return Err(OptimizerError::invalid("horizon_slots must be greater than zero"));
        }

        let mut stations: BTreeMap<StationId, Station> = BTreeMap::new();
        for record in records {
            if record.slot >= horizon_slots {
                return Err(OptimizerError::invalid(format!(
                    "station {} slot {} is outside the {}-slot horizon",
                    record.station_id, record.slot, horizon_slots
                )));
            }
            if !record.demand_kwh.is_finite() || record.demand_kwh < 0.0 {
                return Err(OptimizerError::invalid(format!(
                    "station {} slot {} demand must be non-negative and finite, got {}",
                    record.station_id, record.slot, record.demand_kwh
                )));
            }

            let station = stations
                .entry(record.station_id.clone())
                .or_insert_with(|| {
                    Station::new(record.station_id.clone(), record.capacity_kw, vec![0.0; horizon_slots])
                });

            if station.capacity_kw != record.capacity_kw {
                return Err(OptimizerError::invalid(format!(
                    "station {} reports conflicting capacities {} kW and {} kW",
                    record.station_id, station.capacity_kw, record.capacity_kw
                )));
            }
            station.baseline_demand_kwh[record.slot] += record.demand_kwh;
        }

        Self::new(horizon_slots, stations.into_values())
    }

    /// Reads a CSV with header `station_id,slot,capacity_kw,demand_kwh`.
    pub fn from_csv_reader<R: io::Read>(horizon_slots: usize, reader: R) -> Result<Self, OptimizerError> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let records = csv_reader
            .deserialize::<DemandRecord>()
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(rows = records.len(), "parsed demand table");
        Self::from_records(horizon_slots, records)
    }

    pub fn from_csv_path(horizon_slots: usize, path: impl AsRef<Path>) -> Result<Self, OptimizerError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;
        let records = csv_reader
            .deserialize::<DemandRecord>()
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(path = %path.as_ref().display(), rows = records.len(), "parsed demand table");
        Self::from_records(horizon_slots, records)
    }

    pub fn horizon_slots(&self) -> usize {
        self.horizon_slots
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn get(&self, id: &StationId) -> Option<&Station> {
        self.stations.get(id)
    }

    /// Stations in ascending id order.
    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    pub fn total_demand_kwh(&self) -> f64 {
        self.stations.values().map(Station::total_demand_kwh).sum()
    }

    /// Unoptimized aggregate load per slot (kW).
    pub fn baseline_load_kw(&self, slot_duration_hours: f64) -> Vec<f64> {
        let mut load = vec![0.0; self.horizon_slots];
        for station in self.stations.values() {
            for (slot, kwh) in station.baseline_demand_kwh.iter().enumerate() {
                load[slot] += kwh / slot_duration_hours;
            }
        }
        load
    }
}
