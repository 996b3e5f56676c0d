//! Objective tuning constants, kept in one place so they can be adjusted
//! without touching the formulation. All tie-breakers are sized to never
//! reverse a strictly economic decision.

/// Effective export price when the tariff is exactly zero, so exporting is
/// preferred over curtailing surplus.
pub const EXPORT_ZERO_PRICE_BONUS: f64 = 1e-4;

/// Per-kW penalty on imports inside forbidden windows. Large enough to
/// dominate any realistic price while keeping the program feasible.
pub const IMPORT_VIOLATION_WEIGHT: f64 = 1e3;

/// Early-flow tie-breaker: biases equivalent grid flow toward earlier slots
/// for ordering stability.
pub const EARLY_FLOW_TIE_BREAKER: f64 = 1e-5;

/// Time-weighted battery throughput tie-breaker stabilizing dispatch
/// ordering across equal-cost slots.
pub const BATTERY_TIMING_TIE_BREAKER: f64 = 1e-6;

/// Penalty per kW of per-slot EV charge power change.
pub const EV_RAMP_PENALTY: f64 = 1e-4;

/// Penalty per kW of slot-0 deviation from the EV's realtime charge power.
pub const EV_ANCHOR_PENALTY: f64 = 5e-2;

/// Realtime EV power below this is treated as idle and the anchor is
/// dropped.
pub const EV_ANCHOR_ACTIVE_THRESHOLD_KW: f64 = 0.1;

/// Reference window for the adaptive terminal-SoC ratio, minutes (24 h).
pub const TERMINAL_SOC_REFERENCE_MINUTES: f64 = 1440.0;

/// Prices closer to zero than this are considered exactly zero.
pub const PRICE_EPSILON: f64 = 1e-9;
