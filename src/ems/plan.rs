//! The plan document: one flat record per horizon slot, serializable to
//! stable JSON. Every numeric field is rounded to 3 decimal places at
//! extraction so recorded baselines compare bitwise.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::solver::LpStatus;

/// Round to 3 decimal places, normalizing negative zero.
pub fn round3(value: f64) -> f64 {
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Installed capacities echoed alongside the plan so consumers can convert
/// kWh trajectories to percentages.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanCapacities {
    /// Battery capacity per inverter id, kWh.
    pub batteries: BTreeMap<String, f64>,
    /// EV capacity per load id, kWh.
    pub evs: BTreeMap<String, f64>,
}

/// One horizon slot of the plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanSlot {
    pub index: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_s: f64,

    pub grid_import_kw: f64,
    pub grid_export_kw: f64,
    pub grid_import_violation_kw: f64,
    /// Net grid flow, import positive.
    pub grid_kw: f64,

    /// Baseline site load.
    pub load_kw: f64,
    /// Baseline plus controllable loads.
    pub load_total_kw: f64,

    pub price_import: f64,
    pub price_export: f64,
    /// Grid energy cost of this slot only; penalties and incentives are
    /// excluded.
    pub segment_cost: f64,
    pub cumulative_cost: f64,

    /// Total PV output across inverters.
    pub pv_kw: f64,
    pub pv_inverters: BTreeMap<String, f64>,

    pub battery_charge_kw: f64,
    pub battery_discharge_kw: f64,
    pub battery_soc_kwh: f64,

    pub ev_charge_kw: f64,
    pub ev_soc_kwh: f64,

    pub inverter_ac_net_kw: f64,

    pub curtail_inverters: BTreeMap<String, u8>,
    pub curtail_any: bool,
    pub import_allowed: bool,
}

/// A complete plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub generated_at: DateTime<Utc>,
    pub status: LpStatus,
    pub objective: f64,
    pub capacities: PlanCapacities,
    pub slots: Vec<PlanSlot>,
}

impl Plan {
    /// Canonical JSON used for baselines and fingerprints.
    pub fn to_canonical_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
