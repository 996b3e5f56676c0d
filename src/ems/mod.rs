//! The planning core: horizon construction, forecast alignment, MILP
//! formulation, and plan extraction.

pub mod alignment;
pub mod builder;
pub mod horizon;
pub mod objective;
pub mod plan;
pub mod planner;
pub mod weights;

pub use horizon::{build_horizon, Horizon, HorizonSlot};
pub use plan::{Plan, PlanCapacities, PlanSlot};
pub use planner::{plan, solve_once, CancelToken};
