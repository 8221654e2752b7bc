//! Synthetic charging demand for scenarios without measured data.
//!
//! Sessions start more often in the evening (four six-hour blocks weighted
//! 0.02 / 0.05 / 0.08 / 0.10) and draw energy according to the vehicle class.

use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Uniform, WeightedIndex};
use serde::{Deserialize, Serialize};

use super::{DemandTable, Station, StationId};
use crate::error::OptimizerError;

const HOUR_BLOCK_WEIGHTS: [f64; 4] = [0.02, 0.05, 0.08, 0.10];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VehicleClass {
    TwoWheeler,
    ThreeWheeler,
    FourWheeler,
}

impl VehicleClass {
    const ALL: [VehicleClass; 3] = [
        VehicleClass::TwoWheeler,
        VehicleClass::ThreeWheeler,
        VehicleClass::FourWheeler,
    ];

    fn energy_range_kwh(self) -> (f64, f64) {
        match self {
            VehicleClass::TwoWheeler => (1.5, 3.5),
            VehicleClass::ThreeWheeler => (5.0, 10.0),
            VehicleClass::FourWheeler => (20.0, 60.0),
        }
    }
}

/// Parameters of a generated demand table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticDemand {
    pub stations: usize,
    pub sessions_per_station: usize,
    pub capacity_kw: f64,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_prefix")]
    pub id_prefix: String,
}

fn default_prefix() -> String {
    "SYN".to_string()
}

impl SyntheticDemand {
    /// Same seed, same table.
    pub fn generate(
        &self,
        horizon_slots: usize,
        slot_duration_hours: f64,
    ) -> Result<DemandTable, OptimizerError> {
        if self.stations == 0 {
            return Err(OptimizerError::invalid("synthetic demand needs at least one station"));
        }
        if !slot_duration_hours.is_finite() || slot_duration_hours <= 0.0 {
            return Err(OptimizerError::invalid("slot_duration_hours must be positive"));
        }

        let weights: Vec<f64> = (0..horizon_slots)
            .map(|slot| {
                let hour = ((slot as f64 * slot_duration_hours).floor() as usize) % 24;
                HOUR_BLOCK_WEIGHTS[hour / 6]
            })
            .collect();
        let slot_dist = WeightedIndex::new(&weights)
            .map_err(|e| OptimizerError::invalid(format!("cannot weight synthetic slots: {e}")))?;
        let class_dist = Uniform::new(0, VehicleClass::ALL.len());
        let mut rng = StdRng::seed_from_u64(self.seed);

        let stations = (0..self.stations)
            .map(|index| {
                let mut demand = vec![0.0; horizon_slots];
                for _ in 0..self.sessions_per_station {
                    let slot = slot_dist.sample(&mut rng);
                    let class = VehicleClass::ALL[class_dist.sample(&mut rng)];
                    let (lo, hi) = class.energy_range_kwh();
                    demand[slot] += Uniform::new(lo, hi).sample(&mut rng);
                }
                Station::new(
                    StationId::new(format!("{}-{:03}", self.id_prefix, index + 1)),
                    self.capacity_kw,
                    demand,
                )
            })
            .collect::<Vec<_>>();

        DemandTable::new(horizon_slots, stations)
    }
}
