use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::inverter::validate_slug;
use crate::domain::window::TimeWindow;
use crate::error::PlannerError;
use crate::sources::EntityRef;

/// One band of the piecewise EV terminal-SoC reward. Bands must be listed
/// with non-decreasing targets; each rewards energy charged up to its target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SocIncentive {
    pub target_soc_pct: f64,
    /// Reward per kWh within this band, currency/kWh.
    pub incentive: f64,
}

/// A hard-ish charging goal: reach the target SoC by a local time of day.
/// Enforced through a penalized slack so an unreachable deadline cannot make
/// the program infeasible.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvDeadlineTarget {
    pub target_soc_pct: f64,
    /// Local HH:MM; the next occurrence after `now` is used.
    pub by: String,
}

/// An EV whose charging the planner controls. Charge-only.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ControlledEvLoad {
    pub id: String,

    #[validate(length(min = 1))]
    pub name: String,

    /// Minimum sustained charge power when charging at all. A positive value
    /// makes the feasible set {0} ∪ [min, max].
    #[validate(range(min = 0.0))]
    pub min_power_kw: f64,

    #[validate(range(min = 0.0))]
    pub max_power_kw: f64,

    /// Usable battery capacity.
    #[validate(range(min = 0.0))]
    pub capacity_kwh: f64,

    pub connected: EntityRef,
    pub realtime_power: EntityRef,
    pub state_of_charge_pct: EntityRef,

    /// Whether the vehicle could be plugged in later during this horizon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_connect: Option<EntityRef>,

    /// Local windows during which a future connection may be assumed.
    #[serde(default)]
    pub allowed_connect_times: Vec<TimeWindow>,

    /// Lead time before an assumed future connection can carry charge.
    #[serde(default)]
    pub connect_grace_minutes: u32,

    #[serde(default)]
    pub soc_incentives: Vec<SocIncentive>,

    /// Cost per charging on/off transition. Only meaningful together with a
    /// positive `min_power_kw`, which introduces the on/off decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_penalty: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_target: Option<EvDeadlineTarget>,
}

impl ControlledEvLoad {
    pub fn validate_semantics(&self) -> Result<(), PlannerError> {
        validate_slug("load", &self.id)?;
        if self.min_power_kw > self.max_power_kw {
            return Err(PlannerError::ConfigInvalid(format!(
                "EV '{}': min_power_kw ({}) must be <= max_power_kw ({})",
                self.id, self.min_power_kw, self.max_power_kw
            )));
        }
        if self.capacity_kwh < 0.0 {
            return Err(PlannerError::ConfigInvalid(format!(
                "EV '{}': capacity_kwh must be non-negative",
                self.id
            )));
        }
        let mut prev_target = 0.0;
        for incentive in &self.soc_incentives {
            if !(0.0..=100.0).contains(&incentive.target_soc_pct) {
                return Err(PlannerError::ConfigInvalid(format!(
                    "EV '{}': incentive target {} out of range",
                    self.id, incentive.target_soc_pct
                )));
            }
            if incentive.target_soc_pct < prev_target {
                return Err(PlannerError::ConfigInvalid(format!(
                    "EV '{}': incentive targets must be non-decreasing ({} < {})",
                    self.id, incentive.target_soc_pct, prev_target
                )));
            }
            prev_target = incentive.target_soc_pct;
        }
        for window in &self.allowed_connect_times {
            window.validate()?;
        }
        if let Some(penalty) = self.switch_penalty {
            if penalty < 0.0 {
                return Err(PlannerError::ConfigInvalid(format!(
                    "EV '{}': switch_penalty must be non-negative",
                    self.id
                )));
            }
        }
        if let Some(deadline) = &self.deadline_target {
            if !(0.0..=100.0).contains(&deadline.target_soc_pct) {
                return Err(PlannerError::ConfigInvalid(format!(
                    "EV '{}': deadline target {} out of range",
                    self.id, deadline.target_soc_pct
                )));
            }
            // Reuse HH:MM validation via a throwaway window.
            TimeWindow {
                start: deadline.by.clone(),
                end: deadline.by.clone(),
                months: None,
            }
            .validate()?;
        }
        Ok(())
    }
}

/// A controllable load. Tagged so new load kinds slot in beside EVs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "load_type", rename_all = "snake_case")]
pub enum LoadConfig {
    ControlledEv(ControlledEvLoad),
}

impl LoadConfig {
    pub fn id(&self) -> &str {
        match self {
            LoadConfig::ControlledEv(ev) => &ev.id,
        }
    }

    pub fn validate_semantics(&self) -> Result<(), PlannerError> {
        match self {
            LoadConfig::ControlledEv(ev) => ev.validate_semantics(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev_yaml(extra: &str) -> String {
        format!(
            "load_type: controlled_ev\n\
             id: garage_ev\n\
             name: Garage EV\n\
             min_power_kw: 1.4\n\
             max_power_kw: 11\n\
             capacity_kwh: 50\n\
             connected: binary_sensor.ev_plugged\n\
             realtime_power: sensor.ev_power\n\
             state_of_charge_pct: sensor.ev_soc\n\
             {extra}"
        )
    }

    #[test]
    fn test_parses_tagged_ev_load() {
        let load: LoadConfig = serde_yaml::from_str(&ev_yaml("")).unwrap();
        assert_eq!(load.id(), "garage_ev");
        assert!(load.validate_semantics().is_ok());
        let LoadConfig::ControlledEv(ev) = load;
        assert_eq!(ev.connect_grace_minutes, 0);
        assert!(ev.soc_incentives.is_empty());
    }

    #[test]
    fn test_incentive_monotonicity() {
        let yaml = ev_yaml(
            "soc_incentives:\n\
             - target_soc_pct: 80\n\
             \x20 incentive: 0.05\n\
             - target_soc_pct: 50\n\
             \x20 incentive: 0.20\n",
        );
        let load: LoadConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(load.validate_semantics().is_err());
    }

    #[test]
    fn test_power_bounds() {
        let yaml = ev_yaml("").replace("min_power_kw: 1.4", "min_power_kw: 12");
        let load: LoadConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(load.validate_semantics().is_err());
    }

    #[test]
    fn test_deadline_target_hhmm() {
        let yaml = ev_yaml(
            "deadline_target:\n\
             \x20 target_soc_pct: 80\n\
             \x20 by: \"07:30\"\n",
        );
        let load: LoadConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(load.validate_semantics().is_ok());

        let bad = ev_yaml(
            "deadline_target:\n\
             \x20 target_soc_pct: 80\n\
             \x20 by: \"7h30\"\n",
        );
        let load: LoadConfig = serde_yaml::from_str(&bad).unwrap();
        assert!(load.validate_semantics().is_err());
    }
}
