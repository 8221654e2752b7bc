use anyhow::{ensure, Context, Result};
use ev_load_optimizer::{config, runner, telemetry, ScheduleOptimizer};
use config::Config;
use runner::ScenarioReport;
use std::{fs, path::Path, sync::Arc};
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let path = std::env::args().nth(1).unwrap_or_else(|| "config/default.toml".to_string());
    let cfg = Config::load_from(&path).with_context(|| format!("loading configuration from {path}"))?;

    if cfg.scenarios.is_empty() {
        warn!(config = %path, "no scenarios configured");
        return Ok(());
    }
    info!(scenarios = cfg.scenarios.len(), "starting EV load optimizer");

    let optimizer = Arc::new(ScheduleOptimizer::default());
    let reports = runner::run_all(&cfg, optimizer).await?;

    match &cfg.output.directory {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            for report in &reports {
                write_report(dir, report, cfg.output.pretty)?;
            }
        }
        None => {
            let json = if cfg.output.pretty {
                serde_json::to_string_pretty(&reports)?
            } else {
                serde_json::to_string(&reports)?
            };
            println!("{json}");
        }
    }

    let failed = reports.iter().filter(|r| r.error.is_some()).count();
    info!(total = reports.len(), failed, "run complete");
    Ok(())
}

fn write_report(dir: &Path, report: &ScenarioReport, pretty: bool) -> Result<()> {
    let file_name = format!("{}.json", report.scenario);
    ensure!(
        Path::new(&file_name).components().count() == 1,
        "scenario {:?} is not a plain file name",
        report.scenario
    );
    let path = dir.join(file_name);
    let json = if pretty {
        serde_json::to_vec_pretty(report)?
    } else {
        serde_json::to_vec(report)?
    };
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "report written");
    Ok(())
}
