//! Receding-horizon MILP planner for a residential energy management system.
//!
//! Given a plant topology (grid connection, PV inverters, batteries,
//! controllable loads), time-varying forecasts, and realtime sensor values,
//! the planner produces a per-slot plan: grid import/export, per-inverter PV
//! and curtailment, battery charge/discharge and SoC trajectory, and EV
//! charging power.
//!
//! The entry point is [`ems::plan`] (or [`ems::solve_once`] for the CBC
//! default). All I/O lives behind the [`sources::SourceResolver`] and
//! [`solver::MilpSolver`] seams.

pub mod config;
pub mod domain;
pub mod ems;
pub mod error;
pub mod fixtures;
pub mod solver;
pub mod sources;
pub mod telemetry;

pub use config::AppConfig;
pub use ems::{plan, solve_once, CancelToken, Plan};
pub use error::PlannerError;
