use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    value::Dict,
    Figment,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::domain::{DemandTable, SyntheticDemand};
use crate::finance::RoiAssumptions;
use crate::optimizer::OptimizerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub finance: RoiAssumptions,
    #[serde(default)]
    pub scenarios: Vec<ScenarioConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// One independent optimization run.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    #[serde(default)]
    pub demand_csv: Option<PathBuf>,
    #[serde(default)]
    pub synthetic: Option<SyntheticDemand>,
    /// Keys merged over `[optimizer]` for this scenario only; keys left out
    /// keep the global value.
    #[serde(default)]
    pub optimizer: Option<Dict>,
}

impl ScenarioConfig {
    /// Loads or generates the scenario's demand table.
    pub fn demand(&self, optimizer: &OptimizerConfig) -> Result<DemandTable> {
        match (&self.demand_csv, &self.synthetic) {
            (Some(path), None) => DemandTable::from_csv_path(optimizer.horizon_slots, path)
                .with_context(|| format!("scenario {}: reading {}", self.name, path.display())),
            (None, Some(synthetic)) => synthetic
                .generate(optimizer.horizon_slots, optimizer.slot_duration_hours)
                .with_context(|| format!("scenario {}: generating demand", self.name)),
            (Some(_), Some(_)) => bail!("scenario {}: set either demand_csv or synthetic, not both", self.name),
            (None, None) => bail!("scenario {}: no demand source (demand_csv or synthetic)", self.name),
        }
    }
}

/// Scenario names become report file names, so they must stay a single
/// plain path component.
fn check_scenario_name(name: &str) -> Result<()> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !plain {
        bail!("scenario name {name:?} may only contain ASCII letters, digits, '-', '_' and '.'");
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Directory for per-scenario JSON reports; stdout when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub pretty: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config/default.toml")
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("EVLO__").split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Self = figment.extract()?;
        cfg.optimizer.check()?;
        let mut names = HashSet::new();
        for scenario in &cfg.scenarios {
            check_scenario_name(&scenario.name)?;
            if !names.insert(scenario.name.as_str()) {
                bail!("scenario {} is defined more than once", scenario.name);
            }
            cfg.optimizer_for(scenario)?;
        }
        Ok(cfg)
    }

    /// Optimizer settings effective for `scenario`: its overrides merged over
    /// the global `[optimizer]` section, then checked.
    pub fn optimizer_for(&self, scenario: &ScenarioConfig) -> Result<OptimizerConfig> {
        let Some(overrides) = &scenario.optimizer else {
            return Ok(self.optimizer.clone());
        };
        let merged: OptimizerConfig = Figment::from(Serialized::defaults(&self.optimizer))
            .merge(Serialized::defaults(overrides))
            .extract()
            .with_context(|| format!("scenario {}: optimizer overrides", scenario.name))?;
        merged
            .check()
            .with_context(|| format!("scenario {}: optimizer overrides", scenario.name))?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finance::ChargerType;
    use crate::optimizer::{Objective, ShiftWindow};
    use rstest::rstest;

    fn parse(toml: &str) -> Result<Config> {
        Config::from_figment(Figment::new().merge(Toml::string(toml)))
    }

    #[test]
    fn test_full_config() {
        let cfg = parse(
            r#"
            [optimizer]
            horizon_slots = 48
            slot_duration_hours = 0.5
            max_shift_slots = 4
            objective = "minimize_variance"

            [finance]
            charger_type = "slow_ac"
            demand_charge_per_kw_year = 1200.0

            [output]
            pretty = true

            [[scenarios]]
            name = "depot"
            demand_csv = "data/sample_demand.csv"

            [[scenarios]]
            name = "synthetic"
            [scenarios.synthetic]
            stations = 3
            sessions_per_station = 20
            capacity_kw = 50.0
            seed = 7
            "#,
        )
        .unwrap();

        assert_eq!(cfg.optimizer.horizon_slots, 48);
        assert_eq!(cfg.optimizer.max_shift_slots, ShiftWindow::Slots(4));
        assert_eq!(cfg.optimizer.objective, Objective::MinimizeVariance);
        assert_eq!(cfg.finance.charger_type, ChargerType::SlowAc);
        assert_eq!(cfg.finance.discount_rate, 0.10);
        assert!(cfg.output.pretty);
        assert_eq!(cfg.scenarios.len(), 2);
        assert_eq!(cfg.scenarios[1].synthetic.as_ref().unwrap().seed, 7);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.optimizer, OptimizerConfig::default());
        assert!(cfg.scenarios.is_empty());
        assert!(cfg.output.directory.is_none());
    }

    #[test]
    fn test_invalid_optimizer_section_is_rejected() {
        assert!(parse("[optimizer]\nhorizon_slots = 0").is_err());
        assert!(parse("[optimizer]\nmax_shift_fraction = 1.5").is_err());
    }

    #[test]
    fn test_scenario_override_wins() {
        let cfg = parse(
            r#"
            [[scenarios]]
            name = "short"
            [scenarios.synthetic]
            stations = 1
            sessions_per_station = 2
            capacity_kw = 10.0
            [scenarios.optimizer]
            horizon_slots = 6
            "#,
        )
        .unwrap();
        let scenario = &cfg.scenarios[0];
        let effective = cfg.optimizer_for(scenario).unwrap();
        assert_eq!(effective.horizon_slots, 6);
        let demand = scenario.demand(&effective).unwrap();
        assert_eq!(demand.horizon_slots(), 6);
    }

    #[test]
    fn test_scenario_override_keeps_unset_global_keys() {
        let cfg = parse(
            r#"
            [optimizer]
            horizon_slots = 48
            slot_duration_hours = 0.5
            objective = "minimize_variance"
            solver_time_limit_seconds = 5.0

            [[scenarios]]
            name = "windowed"
            demand_csv = "data/sample_demand.csv"
            [scenarios.optimizer]
            max_shift_slots = 2
            "#,
        )
        .unwrap();
        let effective = cfg.optimizer_for(&cfg.scenarios[0]).unwrap();
        assert_eq!(effective.max_shift_slots, ShiftWindow::Slots(2));
        assert_eq!(effective.horizon_slots, 48);
        assert_eq!(effective.slot_duration_hours, 0.5);
        assert_eq!(effective.objective, Objective::MinimizeVariance);
        assert_eq!(effective.solver_time_limit_seconds, 5.0);
    }

    #[test]
    fn test_invalid_scenario_override_is_rejected() {
        let err = parse(
            r#"
            [[scenarios]]
            name = "broken"
            demand_csv = "data/sample_demand.csv"
            [scenarios.optimizer]
            max_shift_fraction = 2.0
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("scenario broken"));
    }

    #[rstest]
    #[case::parent_dir("../../tmp/owned")]
    #[case::absolute("/etc/passwd")]
    #[case::backslash("..\\escape")]
    #[case::dot_dot("..")]
    #[case::empty("")]
    #[case::space("night shift")]
    fn test_unsafe_scenario_names_are_rejected(#[case] name: &str) {
        let toml = format!("[[scenarios]]\nname = {name:?}\ndemand_csv = \"data/sample_demand.csv\"\n");
        assert!(parse(&toml).is_err(), "{name:?} was accepted");
    }

    #[test]
    fn test_plain_scenario_names_are_accepted() {
        assert!(check_scenario_name("depot-2024_q1.v2").is_ok());
    }

    #[test]
    fn test_duplicate_scenario_names_are_rejected() {
        let toml = "[[scenarios]]\nname = \"a\"\ndemand_csv = \"x.csv\"\n[[scenarios]]\nname = \"a\"\ndemand_csv = \"y.csv\"\n";
        assert!(parse(toml).is_err());
    }

    #[test]
    fn test_scenario_requires_exactly_one_source() {
        let none = ScenarioConfig {
            name: "empty".into(),
            demand_csv: None,
            synthetic: None,
            optimizer: None,
        };
        assert!(none.demand(&OptimizerConfig::default()).is_err());
    }
}
