//! Return on investment for a fleet of charging stations.
//!
//! Revenue is the energy margin on delivered kWh, grown yearly; the peak
//! reduction from the optimized schedule adds a flat demand-charge saving.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::FinancialEvaluator;
use crate::optimizer::OptimizationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChargerType {
    SlowAc,
    FastDc,
    UltraFast,
}

impl ChargerType {
    /// Equipment and installation cost per station.
    pub fn setup_cost(self) -> f64 {
        match self {
            ChargerType::SlowAc => 100_000.0,
            ChargerType::FastDc => 2_500_000.0,
            ChargerType::UltraFast => 5_000_000.0,
        }
    }
}

/// Economic assumptions, in one currency throughout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiAssumptions {
    pub charger_type: ChargerType,
    /// Overrides the charger type's setup cost when set.
    pub setup_cost_per_station: Option<f64>,
    pub equipment_subsidy_fraction: f64,
    pub regional_subsidy_per_station: f64,
    pub regional_subsidy_max_fraction: f64,
    pub selling_price_per_kwh: f64,
    pub electricity_cost_per_kwh: f64,
    pub opex_fraction_of_revenue: f64,
    pub annual_growth: f64,
    pub discount_rate: f64,
    pub years: u32,
    /// Yearly grid demand charge per kW of peak.
    pub demand_charge_per_kw_year: f64,
    pub co2_kg_saved_per_kwh: f64,
    pub trees_per_ton_co2: f64,
}

impl Default for RoiAssumptions {
    fn default() -> Self {
        Self {
            charger_type: ChargerType::FastDc,
            setup_cost_per_station: None,
            equipment_subsidy_fraction: 0.40,
            regional_subsidy_per_station: 10_000.0,
            regional_subsidy_max_fraction: 0.25,
            selling_price_per_kwh: 15.0,
            electricity_cost_per_kwh: 8.0,
            opex_fraction_of_revenue: 0.25,
            annual_growth: 0.05,
            discount_rate: 0.10,
            years: 10,
            demand_charge_per_kw_year: 0.0,
            co2_kg_saved_per_kwh: 0.82,
            trees_per_ton_co2: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalImpact {
    pub annual_kwh_delivered: f64,
    pub annual_co2_saved_tons: f64,
    pub trees_equivalent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiReport {
    pub stations: usize,
    pub setup_cost: f64,
    pub equipment_subsidy: f64,
    pub regional_subsidy: f64,
    pub net_investment: f64,
    pub annual_revenue: f64,
    pub annual_profit: f64,
    pub annual_demand_charge_saving: f64,
    /// Year 0 is the (negative) net investment.
    pub yearly_cashflows: Vec<f64>,
    pub yearly_cumulative: Vec<f64>,
    pub breakeven_months: Option<u32>,
    pub npv: f64,
    /// Average yearly return on the net investment, in percent.
    pub simple_return_percent: f64,
    pub environmental_impact: EnvironmentalImpact,
}

#[derive(Debug, Clone, Default)]
pub struct RoiEvaluator {
    pub assumptions: RoiAssumptions,
    /// Number of stations the result covers.
    pub stations: usize,
}

impl RoiEvaluator {
    pub fn new(assumptions: RoiAssumptions, stations: usize) -> Self {
        Self { assumptions, stations }
    }

    fn check(&self) -> Result<()> {
        let a = &self.assumptions;
        ensure!(self.stations > 0, "ROI needs at least one station");
        ensure!(a.years > 0, "ROI horizon must be at least one year");
        ensure!(a.discount_rate > -1.0, "discount rate must exceed -100%");
        ensure!(
            (0.0..=1.0).contains(&a.equipment_subsidy_fraction)
                && (0.0..=1.0).contains(&a.regional_subsidy_max_fraction),
            "subsidy fractions must lie in [0, 1]"
        );
        Ok(())
    }
}

impl FinancialEvaluator for RoiEvaluator {
    type Report = RoiReport;

    fn evaluate(&self, result: &OptimizationResult) -> Result<RoiReport> {
        self.check()?;
        let a = &self.assumptions;
        let stations = self.stations as f64;

        let per_station = a.setup_cost_per_station.unwrap_or_else(|| a.charger_type.setup_cost());
        let setup_cost = per_station * stations;
        let equipment_subsidy = setup_cost * a.equipment_subsidy_fraction;
        let regional_subsidy = (a.regional_subsidy_per_station * stations)
            .min(setup_cost * a.regional_subsidy_max_fraction);
        let net_investment = setup_cost - equipment_subsidy - regional_subsidy;

        // Timing does not change how much energy is sold, so the baseline total
        // is valid whether or not the solve succeeded.
        let horizon_energy_kwh = result.baseline.total_energy_kwh;
        let horizon_days = horizon_days(result);
        let annual_kwh = if horizon_days > 0.0 {
            horizon_energy_kwh / horizon_days * 365.0
        } else {
            0.0
        };

        let annual_revenue = annual_kwh * (a.selling_price_per_kwh - a.electricity_cost_per_kwh);
        let annual_profit = annual_revenue * (1.0 - a.opex_fraction_of_revenue);

        let peak_saved_kw = result
            .optimized
            .as_ref()
            .map(|m| (result.baseline.peak_load_kw - m.peak_load_kw).max(0.0))
            .unwrap_or(0.0);
        let annual_demand_charge_saving = peak_saved_kw * a.demand_charge_per_kw_year;

        let mut yearly_cashflows = vec![-net_investment];
        let mut yearly_cumulative = vec![-net_investment];
        for year in 1..=a.years {
            let growth = (1.0 + a.annual_growth).powi(year as i32 - 1);
            let cashflow = annual_profit * growth + annual_demand_charge_saving;
            let cumulative = yearly_cumulative.last().copied().unwrap_or(0.0) + cashflow;
            yearly_cashflows.push(cashflow);
            yearly_cumulative.push(cumulative);
        }

        let breakeven_months = yearly_cumulative
            .iter()
            .position(|&c| c >= 0.0)
            .map(|year| year as u32 * 12);

        let npv = yearly_cashflows
            .iter()
            .enumerate()
            .map(|(i, cf)| cf / (1.0 + a.discount_rate).powi(i as i32))
            .sum();

        let simple_return_percent = if net_investment > 0.0 {
            let total_return: f64 = yearly_cashflows[1..].iter().sum();
            total_return / net_investment / a.years as f64 * 100.0
        } else {
            0.0
        };

        let annual_co2_saved_tons = annual_kwh * a.co2_kg_saved_per_kwh / 1000.0;

        tracing::debug!(stations = self.stations, net_investment, npv, "evaluated ROI");

        Ok(RoiReport {
            stations: self.stations,
            setup_cost,
            equipment_subsidy,
            regional_subsidy,
            net_investment,
            annual_revenue,
            annual_profit,
            annual_demand_charge_saving,
            yearly_cashflows,
            yearly_cumulative,
            breakeven_months,
            npv,
            simple_return_percent,
            environmental_impact: EnvironmentalImpact {
                annual_kwh_delivered: annual_kwh,
                annual_co2_saved_tons,
                trees_equivalent: annual_co2_saved_tons * a.trees_per_ton_co2,
            },
        })
    }
}

fn horizon_days(result: &OptimizationResult) -> f64 {
    result.baseline.profile.slots.len() as f64 * result.slot_duration_hours / 24.0
}
