use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::PlannerError;
use crate::sources::EntityRef;

/// A battery behind an inverter.
///
/// Efficiency is a single round-trip figure; the SoC dynamics apply it on the
/// charge side, so a full charge/discharge cycle loses exactly
/// `1 - storage_efficiency_pct/100` of the energy drawn.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct BatteryConfig {
    #[validate(range(min = 0.0))]
    pub capacity_kwh: f64,

    #[validate(range(min = 0.0, max = 100.0))]
    pub storage_efficiency_pct: f64,

    /// Wear cost per kWh charged. Zero makes PV charging free.
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub charge_cost_per_kwh: f64,

    /// Wear cost per kWh discharged.
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub discharge_cost_per_kwh: f64,

    /// Value assigned to each stored kWh at horizon end. When set, the
    /// objective rewards terminal SoC, which incentivizes charging when
    /// export prices are low. Typical value: 0.08-0.15 currency/kWh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soc_value_per_kwh: Option<f64>,

    #[validate(range(min = 0.0, max = 100.0))]
    pub min_soc_pct: f64,

    #[validate(range(min = 0.0, max = 100.0))]
    pub max_soc_pct: f64,

    /// Fill fraction below which grid export is blocked. Self-consumption
    /// discharge remains allowed down to `min_soc_pct`.
    #[validate(range(min = 0.0, max = 100.0))]
    pub reserve_soc_pct: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_charge_kw: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_discharge_kw: Option<f64>,

    pub state_of_charge_pct: EntityRef,
}

impl BatteryConfig {
    pub fn validate_semantics(&self) -> Result<(), PlannerError> {
        if self.capacity_kwh < 0.0 {
            return Err(PlannerError::ConfigInvalid(
                "battery capacity_kwh must be non-negative".into(),
            ));
        }
        if self.min_soc_pct > self.max_soc_pct {
            return Err(PlannerError::ConfigInvalid(format!(
                "battery min_soc_pct ({}) must be <= max_soc_pct ({})",
                self.min_soc_pct, self.max_soc_pct
            )));
        }
        if self.reserve_soc_pct > self.max_soc_pct {
            return Err(PlannerError::ConfigInvalid(format!(
                "battery reserve_soc_pct ({}) must be <= max_soc_pct ({})",
                self.reserve_soc_pct, self.max_soc_pct
            )));
        }
        if self.storage_efficiency_pct <= 0.0 {
            return Err(PlannerError::ConfigInvalid(
                "battery storage_efficiency_pct must be positive".into(),
            ));
        }
        for (name, value) in [
            ("max_charge_kw", self.max_charge_kw),
            ("max_discharge_kw", self.max_discharge_kw),
        ] {
            if let Some(v) = value {
                if v < 0.0 {
                    return Err(PlannerError::ConfigInvalid(format!(
                        "battery {name} must be non-negative"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn min_soc_kwh(&self) -> f64 {
        self.capacity_kwh * self.min_soc_pct / 100.0
    }

    pub fn max_soc_kwh(&self) -> f64 {
        self.capacity_kwh * self.max_soc_pct / 100.0
    }

    pub fn reserve_kwh(&self) -> f64 {
        self.capacity_kwh * self.reserve_soc_pct / 100.0
    }

    /// Charge-side efficiency factor.
    pub fn storage_efficiency(&self) -> f64 {
        self.storage_efficiency_pct / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery(min: f64, max: f64, reserve: f64) -> BatteryConfig {
        BatteryConfig {
            capacity_kwh: 10.0,
            storage_efficiency_pct: 94.0,
            charge_cost_per_kwh: 0.0,
            discharge_cost_per_kwh: 0.05,
            soc_value_per_kwh: None,
            min_soc_pct: min,
            max_soc_pct: max,
            reserve_soc_pct: reserve,
            max_charge_kw: Some(5.0),
            max_discharge_kw: Some(5.0),
            state_of_charge_pct: EntityRef::new("sensor.battery_soc"),
        }
    }

    #[test]
    fn test_soc_conversions() {
        let b = battery(10.0, 95.0, 25.0);
        assert_eq!(b.min_soc_kwh(), 1.0);
        assert_eq!(b.max_soc_kwh(), 9.5);
        assert_eq!(b.reserve_kwh(), 2.5);
        assert!((b.storage_efficiency() - 0.94).abs() < 1e-12);
    }

    #[test]
    fn test_soc_bound_ordering() {
        assert!(battery(10.0, 95.0, 25.0).validate_semantics().is_ok());
        assert!(battery(60.0, 50.0, 25.0).validate_semantics().is_err());
        assert!(battery(10.0, 50.0, 80.0).validate_semantics().is_err());
    }

    #[test]
    fn test_zero_efficiency_rejected() {
        let mut b = battery(10.0, 95.0, 25.0);
        b.storage_efficiency_pct = 0.0;
        assert!(b.validate_semantics().is_err());
    }
}
