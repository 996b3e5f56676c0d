//! Typed plant model: grid connection, inverters, batteries, and
//! controllable loads. Read-only once loaded.

pub mod battery;
pub mod grid;
pub mod inverter;
pub mod loads;
pub mod window;

use serde::{Deserialize, Serialize};
use validator::Validate;

pub use battery::BatteryConfig;
pub use grid::GridConfig;
pub use inverter::{CurtailmentMode, InverterConfig, PvConfig};
pub use loads::{ControlledEvLoad, EvDeadlineTarget, LoadConfig, SocIncentive};
pub use window::{TimeWindow, TimeWindowMatcher};

use crate::error::PlannerError;
use crate::sources::{EntityRef, PowerForecastSource};

/// Baseline (non-controllable) site load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlantLoadConfig {
    pub realtime_load_power: EntityRef,
    pub forecast: PowerForecastSource,
}

/// The whole plant topology.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PlantConfig {
    #[validate(nested)]
    pub grid: GridConfig,

    pub load: PlantLoadConfig,

    pub inverters: Vec<InverterConfig>,
}

impl PlantConfig {
    /// Cross-field checks beyond what derive-level validation expresses.
    pub fn validate_semantics(&self) -> Result<(), PlannerError> {
        self.grid.validate_semantics()?;
        let mut seen = std::collections::HashSet::new();
        for inverter in &self.inverters {
            inverter.validate_semantics()?;
            if !seen.insert(inverter.id.as_str()) {
                return Err(PlannerError::ConfigInvalid(format!(
                    "duplicate inverter id '{}'",
                    inverter.id
                )));
            }
        }
        Ok(())
    }
}
