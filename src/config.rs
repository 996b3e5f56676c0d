use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::{LoadConfig, PlantConfig};
use crate::error::PlannerError;

/// Top-level application configuration.
///
/// The planner consumes `ems`, `plant`, and `loads`; `server` and
/// `homeassistant` are carried for the surrounding service and ignored here.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub homeassistant: HomeAssistantConfig,

    #[serde(default)]
    #[validate(nested)]
    pub ems: EmsConfig,

    #[validate(nested)]
    pub plant: PlantConfig,

    #[serde(default)]
    pub loads: Vec<LoadConfig>,
}

/// HTTP server settings, consumed by the service layer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Where `solve` writes `ems_plan.json`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

/// Home Assistant connection settings, consumed by the live resolver outside
/// this crate.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HomeAssistantConfig {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub token: Option<String>,
}

/// Terminal-SoC constraint mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TerminalSocMode {
    /// `E[N] >= E[0]`, enforced exactly.
    #[default]
    Hard,
    /// Soft target that relaxes toward the reserve as the horizon departs
    /// from the 24 h reference window; shortfall is penalized.
    Adaptive,
}

/// Per-kWh shortfall penalty: a fixed value, or a statistic of the aligned
/// import prices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TerminalSocPenalty {
    Fixed(f64),
    Statistic(PriceStatistic),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PriceStatistic {
    Median,
    Mean,
}

impl Default for TerminalSocPenalty {
    fn default() -> Self {
        TerminalSocPenalty::Statistic(PriceStatistic::Median)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TerminalSocConfig {
    #[serde(default)]
    pub mode: TerminalSocMode,

    #[serde(default)]
    pub penalty_per_kwh: TerminalSocPenalty,
}

/// Planner timing parameters.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EmsConfig {
    /// Base slot length.
    #[serde(default = "default_timestep_minutes")]
    #[validate(range(min = 1, max = 1440))]
    pub timestep_minutes: u32,

    /// Slot length of the high-resolution lead-in window.
    #[serde(default)]
    pub high_res_timestep_minutes: Option<u32>,

    /// Length of the high-resolution lead-in window.
    #[serde(default)]
    pub high_res_horizon_minutes: Option<u32>,

    /// Shortest acceptable horizon; less forecast coverage than this fails.
    #[serde(default = "default_min_horizon_minutes")]
    #[validate(range(min = 1))]
    pub min_horizon_minutes: u32,

    /// IANA zone for boundary flooring and local time windows. UTC when
    /// unset.
    #[serde(default)]
    pub timezone: Option<chrono_tz::Tz>,

    #[serde(default)]
    pub terminal_soc: TerminalSocConfig,
}

impl Default for EmsConfig {
    fn default() -> Self {
        Self {
            timestep_minutes: default_timestep_minutes(),
            high_res_timestep_minutes: None,
            high_res_horizon_minutes: None,
            min_horizon_minutes: default_min_horizon_minutes(),
            timezone: None,
            terminal_soc: TerminalSocConfig::default(),
        }
    }
}

impl EmsConfig {
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.unwrap_or(chrono_tz::UTC)
    }

    /// `(step, window)` of the high-resolution lead-in, when configured.
    pub fn high_res(&self) -> Option<(u32, u32)> {
        match (self.high_res_timestep_minutes, self.high_res_horizon_minutes) {
            (Some(step), Some(window)) => Some((step, window)),
            _ => None,
        }
    }

    pub fn validate_semantics(&self) -> Result<(), PlannerError> {
        match (self.high_res_timestep_minutes, self.high_res_horizon_minutes) {
            (Some(step), Some(_)) => {
                if step == 0 || step >= self.timestep_minutes {
                    return Err(PlannerError::ConfigInvalid(format!(
                        "high_res_timestep_minutes ({step}) must be positive and smaller \
                         than timestep_minutes ({})",
                        self.timestep_minutes
                    )));
                }
            }
            (None, None) => {}
            _ => {
                return Err(PlannerError::ConfigInvalid(
                    "high_res_timestep_minutes and high_res_horizon_minutes must be \
                     set together"
                        .into(),
                ));
            }
        }
        if let TerminalSocPenalty::Fixed(value) = self.terminal_soc.penalty_per_kwh {
            if value < 0.0 {
                return Err(PlannerError::ConfigInvalid(
                    "terminal_soc.penalty_per_kwh must be non-negative".into(),
                ));
            }
        }
        Ok(())
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_timestep_minutes() -> u32 {
    30
}
fn default_min_horizon_minutes() -> u32 {
    180
}

impl AppConfig {
    /// Load from a YAML file, with `EMS__`-prefixed environment overrides
    /// (`EMS__SERVER__PORT` -> `server.port`).
    pub fn load(path: &Path) -> Result<Self> {
        let config: AppConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("EMS__").split("__"))
            .extract()
            .with_context(|| format!("failed to parse configuration at {}", path.display()))?;
        config.validated().context("configuration validation failed")
    }

    /// Parse directly from a YAML string (fixtures, tests).
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: AppConfig = Figment::new()
            .merge(Yaml::string(raw))
            .extract()
            .context("failed to parse configuration")?;
        config.validated().context("configuration validation failed")
    }

    fn validated(self) -> Result<Self> {
        self.validate()?;
        self.validate_semantics()?;
        Ok(self)
    }

    /// Cross-field checks shared with the planner entry point.
    pub fn validate_semantics(&self) -> Result<(), PlannerError> {
        self.ems.validate_semantics()?;
        self.plant.validate_semantics()?;
        let mut seen = std::collections::HashSet::new();
        for load in &self.loads {
            load.validate_semantics()?;
            if !seen.insert(load.id()) {
                return Err(PlannerError::ConfigInvalid(format!(
                    "duplicate load id '{}'",
                    load.id()
                )));
            }
        }
        Ok(())
    }
}
