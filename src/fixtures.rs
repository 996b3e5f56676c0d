//! Scenario fixtures: recorded inputs plus a baseline plan, stored as a
//! filesystem tree:
//!
//! ```text
//! fixtures/<fixture>/<scenario>/
//!   ems_fixture.json   recorded resolver inputs
//!   ems_config.yaml    configuration snapshot
//!   ems_plan.json      baseline plan
//!   ems_plan.hash      sha256 of the canonical plan JSON
//! ```
//!
//! Replaying a scenario re-solves from the recorded inputs; after rounding,
//! the result must match the stored baseline bit-for-bit.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::AppConfig;
use crate::ems::plan::Plan;
use crate::ems::solve_once;
use crate::sources::{FixtureDocument, FixtureResolver};

pub const FIXTURE_FILE: &str = "ems_fixture.json";
pub const CONFIG_FILE: &str = "ems_config.yaml";
pub const PLAN_FILE: &str = "ems_plan.json";
pub const HASH_FILE: &str = "ems_plan.hash";

/// One scenario directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioPaths {
    pub fixture: String,
    pub scenario: String,
    pub dir: PathBuf,
}

impl ScenarioPaths {
    pub fn new(root: &Path, fixture: &str, scenario: &str) -> Self {
        Self {
            fixture: fixture.to_string(),
            scenario: scenario.to_string(),
            dir: root.join(fixture).join(scenario),
        }
    }

    pub fn fixture_file(&self) -> PathBuf {
        self.dir.join(FIXTURE_FILE)
    }

    pub fn config_file(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn plan_file(&self) -> PathBuf {
        self.dir.join(PLAN_FILE)
    }

    pub fn hash_file(&self) -> PathBuf {
        self.dir.join(HASH_FILE)
    }
}

/// Enumerate scenario directories under `root`, optionally filtered.
pub fn list_scenarios(
    root: &Path,
    fixture_filter: Option<&str>,
    scenario_filter: Option<&str>,
) -> Result<Vec<ScenarioPaths>> {
    let mut scenarios = Vec::new();
    if !root.exists() {
        return Ok(scenarios);
    }
    for fixture_entry in fs::read_dir(root).context("reading fixtures root")? {
        let fixture_entry = fixture_entry?;
        if !fixture_entry.file_type()?.is_dir() {
            continue;
        }
        let fixture_name = fixture_entry.file_name().to_string_lossy().to_string();
        if fixture_filter.is_some_and(|f| f != fixture_name) {
            continue;
        }
        for scenario_entry in fs::read_dir(fixture_entry.path())? {
            let scenario_entry = scenario_entry?;
            if !scenario_entry.file_type()?.is_dir() {
                continue;
            }
            let scenario_name = scenario_entry.file_name().to_string_lossy().to_string();
            if scenario_filter.is_some_and(|s| s != scenario_name) {
                continue;
            }
            scenarios.push(ScenarioPaths {
                fixture: fixture_name.clone(),
                scenario: scenario_name,
                dir: scenario_entry.path(),
            });
        }
    }
    scenarios.sort_by(|a, b| (&a.fixture, &a.scenario).cmp(&(&b.fixture, &b.scenario)));
    Ok(scenarios)
}

/// Sha256 fingerprint of the canonical plan JSON.
pub fn plan_hash(plan: &Plan) -> Result<String> {
    let canonical = plan.to_canonical_json()?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Re-solve a scenario from its recorded inputs.
pub fn replay(paths: &ScenarioPaths) -> Result<Plan> {
    let config = AppConfig::load(&paths.config_file())?;
    let document = FixtureDocument::from_path(&paths.fixture_file())?;
    let Some(now) = document.captured_at else {
        bail!(
            "fixture {}/{} has no captured_at timestamp",
            paths.fixture,
            paths.scenario
        );
    };
    let resolver = FixtureResolver::new(document);
    Ok(solve_once(&config, &resolver, now)?)
}

/// Record a new scenario: store inputs, config, and the solved baseline.
pub fn record(
    paths: &ScenarioPaths,
    document: &FixtureDocument,
    config_yaml: &str,
    now: DateTime<Utc>,
) -> Result<Plan> {
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("creating {}", paths.dir.display()))?;

    let mut document = document.clone();
    document.captured_at = Some(now);
    document.write_to(&paths.fixture_file())?;
    fs::write(paths.config_file(), config_yaml)?;

    let config = AppConfig::from_yaml(config_yaml)?;
    let resolver = FixtureResolver::new(document);
    let plan = solve_once(&config, &resolver, now)?;
    write_baseline(paths, &plan)?;
    info!(
        fixture = %paths.fixture,
        scenario = %paths.scenario,
        "scenario recorded"
    );
    Ok(plan)
}

/// Regenerate the stored baseline from the recorded inputs.
pub fn refresh_baseline(paths: &ScenarioPaths) -> Result<Plan> {
    let plan = replay(paths)?;
    write_baseline(paths, &plan)?;
    info!(
        fixture = %paths.fixture,
        scenario = %paths.scenario,
        "baseline refreshed"
    );
    Ok(plan)
}

fn write_baseline(paths: &ScenarioPaths, plan: &Plan) -> Result<()> {
    fs::write(paths.plan_file(), plan.to_canonical_json()?)?;
    fs::write(paths.hash_file(), plan_hash(plan)?)?;
    Ok(())
}

/// Baseline comparison outcome for one scenario.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BaselineStatus {
    Match,
    Drift,
    MissingBaseline,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub fixture: String,
    pub scenario: String,
    pub status: BaselineStatus,
}

/// Replay each scenario and compare against its stored baseline.
pub fn report(root: &Path, fixture_filter: Option<&str>) -> Result<Vec<ScenarioReport>> {
    let mut reports = Vec::new();
    for paths in list_scenarios(root, fixture_filter, None)? {
        let plan = replay(&paths)?;
        let status = if !paths.plan_file().exists() {
            BaselineStatus::MissingBaseline
        } else {
            let stored = fs::read_to_string(paths.plan_file())?;
            if stored == plan.to_canonical_json()? {
                BaselineStatus::Match
            } else {
                BaselineStatus::Drift
            }
        };
        reports.push(ScenarioReport {
            fixture: paths.fixture,
            scenario: paths.scenario,
            status,
        });
    }
    Ok(reports)
}
