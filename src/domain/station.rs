use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::OptimizerError;

/// Stable identifier of a charging station.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(String);

impl StationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for StationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A charging station with its power limit and unoptimized demand per slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    /// Maximum charging power (kW). Always strictly positive.
    pub capacity_kw: f64,
    /// Energy demanded in each slot of the horizon (kWh).
    pub baseline_demand_kwh: Vec<f64>,
}

impl Station {
    pub fn new(id: impl Into<StationId>, capacity_kw: f64, baseline_demand_kwh: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            capacity_kw,
            baseline_demand_kwh,
        }
    }

    pub fn horizon_slots(&self) -> usize {
        self.baseline_demand_kwh.len()
    }

    pub fn total_demand_kwh(&self) -> f64 {
        self.baseline_demand_kwh.iter().sum()
    }

    /// Most energy the station can deliver over the whole horizon.
    pub fn deliverable_kwh(&self, slot_duration_hours: f64) -> f64 {
        self.capacity_kw * slot_duration_hours * self.horizon_slots() as f64
    }

    pub(crate) fn validate(&self, horizon_slots: usize) -> Result<(), OptimizerError> {
        if !self.capacity_kw.is_finite() || self.capacity_kw <= 0.0 {
            return Err(OptimizerError::invalid(format!(
                "station {} capacity_kw must be positive and finite, got {}",
                self.id, self.capacity_kw
            )));
        }
        if self.baseline_demand_kwh.len() != horizon_slots {
            return Err(OptimizerError::invalid(format!(
                "station {} has {} demand slots, horizon is {}",
                self.id,
                self.baseline_demand_kwh.len(),
                horizon_slots
            )));
        }
        if let Some((slot, kwh)) = self
            .baseline_demand_kwh
            .iter()
            .enumerate()
            .find(|(_, kwh)| !kwh.is_finite() || **kwh < 0.0)
        {
            return Err(OptimizerError::invalid(format!(
                "station {} slot {} demand must be non-negative and finite, got {}",
                self.id, slot, kwh
            )));
        }
        Ok(())
    }
}
