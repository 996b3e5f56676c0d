use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use ems_planner::config::AppConfig;
use ems_planner::ems::solve_once;
use ems_planner::fixtures::{
    self, plan_hash, BaselineStatus, ScenarioPaths,
};
use ems_planner::sources::{FixtureDocument, FixtureResolver};
use ems_planner::telemetry::init_tracing;

#[derive(Parser)]
#[command(name = "ems-planner")]
#[command(author, version, about = "Receding-horizon MILP planner for residential EMS")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Single-shot solve against a recorded fixture; writes the plan to
    /// `${data_dir}/ems_plan.json`
    Solve {
        /// YAML configuration file
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,

        /// Recorded inputs to replay
        #[arg(long, default_value = "ems_fixture.json")]
        fixture: PathBuf,

        /// Solve time (RFC 3339); defaults to the fixture's captured_at
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },

    /// Capture a fixture + config + solved baseline as a named scenario
    RecordScenario {
        #[arg(long)]
        fixture: String,

        #[arg(long)]
        name: String,

        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,

        /// Inputs document to capture
        #[arg(long = "inputs", default_value = "ems_fixture.json")]
        inputs: PathBuf,

        #[arg(long, default_value = "fixtures")]
        fixtures_dir: PathBuf,

        /// Capture time (RFC 3339); defaults to the document's captured_at
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },

    /// Regenerate stored baselines from recorded inputs
    RefreshBaseline {
        #[arg(long)]
        fixture: Option<String>,

        #[arg(long)]
        scenario: Option<String>,

        #[arg(long, default_value = "fixtures")]
        fixtures_dir: PathBuf,
    },

    /// Replay scenarios and report drift against stored baselines
    ScenarioReport {
        #[arg(long)]
        fixture: Option<String>,

        #[arg(long, default_value = "fixtures")]
        fixtures_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            config,
            fixture,
            now,
        } => {
            let app_config = AppConfig::load(&config)?;
            let document = FixtureDocument::from_path(&fixture)?;
            let now = resolve_now(now, document.captured_at)?;
            let resolver = FixtureResolver::new(document);
            let plan = solve_once(&app_config, &resolver, now)?;

            fs::create_dir_all(&app_config.server.data_dir)?;
            let out = app_config.server.data_dir.join("ems_plan.json");
            fs::write(&out, plan.to_canonical_json()?)
                .with_context(|| format!("writing {}", out.display()))?;
            info!(plan = %out.display(), status = %plan.status, "plan written");
        }

        Commands::RecordScenario {
            fixture,
            name,
            config,
            inputs,
            fixtures_dir,
            now,
        } => {
            let config_yaml = fs::read_to_string(&config)
                .with_context(|| format!("reading {}", config.display()))?;
            let document = FixtureDocument::from_path(&inputs)?;
            let now = resolve_now(now, document.captured_at)?;
            let paths = ScenarioPaths::new(&fixtures_dir, &fixture, &name);
            let plan = fixtures::record(&paths, &document, &config_yaml, now)?;
            let hash = plan_hash(&plan)?;
            info!(%hash, "scenario recorded");
        }

        Commands::RefreshBaseline {
            fixture,
            scenario,
            fixtures_dir,
        } => {
            let scenarios =
                fixtures::list_scenarios(&fixtures_dir, fixture.as_deref(), scenario.as_deref())?;
            if scenarios.is_empty() {
                bail!("no scenarios found under {}", fixtures_dir.display());
            }
            for paths in scenarios {
                fixtures::refresh_baseline(&paths)?;
            }
        }

        Commands::ScenarioReport {
            fixture,
            fixtures_dir,
        } => {
            let reports = fixtures::report(&fixtures_dir, fixture.as_deref())?;
            if reports.is_empty() {
                bail!("no scenarios found under {}", fixtures_dir.display());
            }
            let mut drifted = 0usize;
            for report in &reports {
                let status = match report.status {
                    BaselineStatus::Match => "ok",
                    BaselineStatus::Drift => {
                        drifted += 1;
                        "DRIFT"
                    }
                    BaselineStatus::MissingBaseline => {
                        drifted += 1;
                        "MISSING"
                    }
                };
                println!("{:<24} {:<24} {status}", report.fixture, report.scenario);
            }
            if drifted > 0 {
                bail!("{drifted} scenario(s) drifted from baseline");
            }
        }
    }

    Ok(())
}

fn resolve_now(
    explicit: Option<DateTime<Utc>>,
    captured: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>> {
    explicit
        .or(captured)
        .context("no solve time: pass --now or record captured_at in the fixture")
}
