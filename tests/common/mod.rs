//! Shared helpers for the end-to-end planner tests: interval constructors
//! and the entity names used by the test configurations.

use chrono::{DateTime, Duration, TimeZone, Utc};
use ems_planner::sources::{FixtureResolver, PowerInterval, PriceInterval};

pub const PRICE_IMPORT_RT: &str = "sensor.price_import_rt";
pub const PRICE_EXPORT_RT: &str = "sensor.price_export_rt";
pub const PRICE_IMPORT_FC: &str = "sensor.price_import_fc";
pub const PRICE_EXPORT_FC: &str = "sensor.price_export_fc";
pub const SITE_LOAD_RT: &str = "sensor.site_load";
pub const LOAD_FC: &str = "sensor.load_fc";
pub const PV_FC: &str = "sensor.pv_fc";
pub const BATT_SOC: &str = "sensor.batt_soc";
pub const EV_CONNECTED: &str = "binary_sensor.ev_connected";
pub const EV_POWER: &str = "sensor.ev_power";
pub const EV_SOC: &str = "sensor.ev_soc";

/// Noon UTC on a fixed date; all scenarios are pinned to it.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
}

pub fn power_steps(
    start: DateTime<Utc>,
    step_minutes: i64,
    values: &[f64],
) -> Vec<PowerInterval> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let s = start + Duration::minutes(i as i64 * step_minutes);
            PowerInterval {
                start: s,
                end: s + Duration::minutes(step_minutes),
                value: *v,
            }
        })
        .collect()
}

pub fn price_steps(
    start: DateTime<Utc>,
    step_minutes: i64,
    values: &[f64],
) -> Vec<PriceInterval> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let s = start + Duration::minutes(i as i64 * step_minutes);
            PriceInterval {
                start: s,
                end: s + Duration::minutes(step_minutes),
                value: *v,
            }
        })
        .collect()
}

/// One flat interval spanning `minutes`.
pub fn flat_power(start: DateTime<Utc>, minutes: i64, value: f64) -> Vec<PowerInterval> {
    vec![PowerInterval {
        start,
        end: start + Duration::minutes(minutes),
        value,
    }]
}

pub fn flat_price(start: DateTime<Utc>, minutes: i64, value: f64) -> Vec<PriceInterval> {
    vec![PriceInterval {
        start,
        end: start + Duration::minutes(minutes),
        value,
    }]
}

/// Resolver with grid prices, site load, and realtime scalars preloaded.
pub fn grid_resolver(
    price_import: Vec<PriceInterval>,
    price_export: Vec<PriceInterval>,
    load: Vec<PowerInterval>,
    realtime_load_kw: f64,
) -> FixtureResolver {
    let realtime_import = price_import.first().map(|p| p.value).unwrap_or(0.0);
    let realtime_export = price_export.first().map(|p| p.value).unwrap_or(0.0);
    FixtureResolver::default()
        .with_price_forecast(PRICE_IMPORT_FC, price_import)
        .with_price_forecast(PRICE_EXPORT_FC, price_export)
        .with_power_forecast(LOAD_FC, load)
        .with_scalar(PRICE_IMPORT_RT, realtime_import)
        .with_scalar(PRICE_EXPORT_RT, realtime_export)
        .with_scalar(SITE_LOAD_RT, realtime_load_kw)
}

/// The grid + load YAML common to every scenario.
pub fn grid_yaml(max_import_kw: f64, max_export_kw: f64, extra_grid: &str) -> String {
    format!(
        "\
plant:
  grid:
    max_import_kw: {max_import_kw}
    max_export_kw: {max_export_kw}
    realtime_price_import: {PRICE_IMPORT_RT}
    realtime_price_export: {PRICE_EXPORT_RT}
    price_import_forecast: {PRICE_IMPORT_FC}
    price_export_forecast: {PRICE_EXPORT_FC}
{extra_grid}  load:
    realtime_load_power: {SITE_LOAD_RT}
    forecast:
      type: entity
      entity: {LOAD_FC}
"
    )
}

/// Balance residual of one plan slot: import + ac_net - export - total load.
pub fn balance_residual(slot: &ems_planner::ems::PlanSlot) -> f64 {
    slot.grid_import_kw + slot.inverter_ac_net_kw - slot.grid_export_kw - slot.load_total_kw
}

pub const TOL: f64 = 1e-3;
