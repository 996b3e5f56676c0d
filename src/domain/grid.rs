use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::window::TimeWindow;
use crate::error::PlannerError;
use crate::sources::EntityRef;

/// Grid connection: caps, price sources, and operator import policy.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GridConfig {
    #[validate(range(min = 0.0))]
    pub max_import_kw: f64,

    #[validate(range(min = 0.0))]
    pub max_export_kw: f64,

    pub realtime_price_import: EntityRef,
    pub realtime_price_export: EntityRef,
    pub price_import_forecast: EntityRef,
    pub price_export_forecast: EntityRef,

    /// Local time-of-day windows during which grid import is forbidden.
    /// Import inside a window stays feasible through a heavily penalized
    /// slack so a conflict cannot make the program infeasible.
    #[serde(default)]
    pub import_forbidden_periods: Vec<TimeWindow>,

    /// Premium applied to import prices and discount applied to export
    /// prices (and EV incentives), in percent. Makes grid interaction
    /// slightly less attractive than local use.
    #[serde(default)]
    #[validate(range(min = 0.0, max = 100.0))]
    pub price_bias_pct: f64,
}

impl GridConfig {
    pub fn validate_semantics(&self) -> Result<(), PlannerError> {
        for window in &self.import_forbidden_periods {
            window.validate()?;
        }
        Ok(())
    }

    /// Price bias as a fraction.
    pub fn price_bias(&self) -> f64 {
        self.price_bias_pct / 100.0
    }
}
