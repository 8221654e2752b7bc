use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use strum::{Display, EnumString};
use validator::Validate;

use crate::error::OptimizerError;

/// What the schedule model minimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Objective {
    /// Epigraph formulation: minimize `P` subject to `L[t] <= P`.
    #[default]
    MinimizePeak,
    /// Tangent-cut piecewise-linear approximation of `sum (L[t] - mean)^2`.
    MinimizeVariance,
}

/// How far energy may move in time from the slot it was demanded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShiftWindow {
    #[default]
    Unlimited,
    Slots(usize),
}

impl ShiftWindow {
    /// Whether `slot` lies within the window around `origin`.
    pub fn covers(&self, origin: usize, slot: usize) -> bool {
        match self {
            ShiftWindow::Unlimited => true,
            ShiftWindow::Slots(k) => origin.abs_diff(slot) <= *k,
        }
    }
}

impl fmt::Display for ShiftWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShiftWindow::Unlimited => f.write_str("unlimited"),
            ShiftWindow::Slots(k) => write!(f, "{k}"),
        }
    }
}

impl Serialize for ShiftWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ShiftWindow::Unlimited => serializer.serialize_str("unlimited"),
            ShiftWindow::Slots(k) => serializer.serialize_u64(*k as u64),
        }
    }
}

impl<'de> Deserialize<'de> for ShiftWindow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Slots(u64),
            Keyword(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Slots(k) => usize::try_from(k)
                .map(ShiftWindow::Slots)
                .map_err(|_| de::Error::custom("max_shift_slots out of range")),
            Repr::Keyword(word) if word.eq_ignore_ascii_case("unlimited") => Ok(ShiftWindow::Unlimited),
            Repr::Keyword(word) => Err(de::Error::custom(format!(
                "max_shift_slots must be a non-negative integer or \"unlimited\", got {word:?}"
            ))),
        }
    }
}

/// Options for one optimization call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct OptimizerConfig {
    #[validate(range(min = 1))]
    pub horizon_slots: usize,
    pub max_shift_slots: ShiftWindow,
    pub objective: Objective,
    /// Per-station energy must match its baseline total. When false only the
    /// fleet-wide total is conserved.
    pub energy_conservation: bool,
    pub solver_time_limit_seconds: f64,
    pub slot_duration_hours: f64,
    /// Largest fraction of a slot's baseline energy that may be moved elsewhere.
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_shift_fraction: Option<f64>,
    /// Tangent cuts per slot for the variance objective, minus one.
    #[validate(range(min = 2, max = 512))]
    pub variance_segments: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            horizon_slots: 24,
            max_shift_slots: ShiftWindow::Unlimited,
            objective: Objective::MinimizePeak,
            energy_conservation: true,
            solver_time_limit_seconds: 30.0,
            slot_duration_hours: 1.0,
            max_shift_fraction: None,
            variance_segments: 24,
        }
    }
}

impl OptimizerConfig {
    pub fn with_horizon(horizon_slots: usize) -> Self {
        Self {
            horizon_slots,
            ..Self::default()
        }
    }

    /// Checks ranges and finiteness before any model is built.
    pub fn check(&self) -> Result<(), OptimizerError> {
        self.validate()?;

        if !self.solver_time_limit_seconds.is_finite()
            || self.solver_time_limit_seconds <= 0.0
            || Duration::try_from_secs_f64(self.solver_time_limit_seconds).is_err()
        {
            return Err(OptimizerError::invalid(format!(
                "solver_time_limit_seconds must be positive and fit a duration, got {}",
                self.solver_time_limit_seconds
            )));
        }
        if !self.slot_duration_hours.is_finite() || self.slot_duration_hours <= 0.0 {
            return Err(OptimizerError::invalid(format!(
                "slot_duration_hours must be positive and finite, got {}",
                self.slot_duration_hours
            )));
        }
        if let Some(fraction) = self.max_shift_fraction {
            if fraction.is_nan() {
                return Err(OptimizerError::invalid("max_shift_fraction must be a number"));
            }
        }
        Ok(())
    }

    /// Saturates instead of panicking on limits `check` would reject.
    pub fn time_limit(&self) -> Duration {
        Duration::try_from_secs_f64(self.solver_time_limit_seconds).unwrap_or(Duration::MAX)
    }
}
