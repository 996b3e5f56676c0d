use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::battery::BatteryConfig;
use crate::error::PlannerError;
use crate::sources::EntityRef;

/// PV curtailment capability of an inverter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CurtailmentMode {
    /// PV output always equals the forecast.
    #[default]
    None,
    /// Either full PV or fully off.
    Binary,
    /// PV may track the local load while curtailed; curtailment blocks grid
    /// export so the reduction is not undone by the grid.
    LoadAware,
}

impl CurtailmentMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, CurtailmentMode::None)
    }
}

/// PV string configuration of an inverter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PvConfig {
    pub forecast: EntityRef,
    /// Realtime AC-side production. When present it overrides slot 0 of the
    /// forecast (MPC anchoring).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realtime_power: Option<EntityRef>,
}

/// A hybrid or PV-only inverter, optionally with a battery.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct InverterConfig {
    /// Stable slug used as the key in plan output.
    pub id: String,

    #[validate(length(min = 1))]
    pub name: String,

    #[validate(range(min = 0.0))]
    pub peak_power_kw: f64,

    #[serde(default)]
    pub curtailment: CurtailmentMode,

    pub pv: PvConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<BatteryConfig>,
}

impl InverterConfig {
    pub fn validate_semantics(&self) -> Result<(), PlannerError> {
        validate_slug("inverter", &self.id)?;
        if !self.name.chars().any(|c| c.is_alphabetic()) {
            return Err(PlannerError::ConfigInvalid(format!(
                "inverter '{}' name must include at least one letter",
                self.id
            )));
        }
        if self.peak_power_kw < 0.0 {
            return Err(PlannerError::ConfigInvalid(format!(
                "inverter '{}' peak_power_kw must be non-negative",
                self.id
            )));
        }
        if let Some(battery) = &self.battery {
            battery.validate_semantics()?;
        }
        Ok(())
    }
}

/// Slug format shared by inverter and load ids.
pub(crate) fn validate_slug(kind: &str, id: &str) -> Result<(), PlannerError> {
    let mut chars = id.chars();
    let head_ok = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let tail_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if head_ok && tail_ok {
        Ok(())
    } else {
        Err(PlannerError::ConfigInvalid(format!(
            "{kind} id '{id}' must be lowercase letters, numbers, and underscores"
        )))
    }
}
