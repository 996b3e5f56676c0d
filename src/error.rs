use thiserror::Error;

use crate::sources::DataSourceError;

/// Planner error taxonomy.
///
/// Every failure mode of a planning invocation maps to exactly one of these
/// kinds. Configuration errors are raised at model construction, alignment
/// errors during MILP build; both are fatal to the invocation. Solver errors
/// are surfaced to the caller; the planner never falls back silently.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Topology or parameter violations detected before building the model.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The shortest forecast does not cover the minimum horizon.
    #[error(
        "forecast coverage too short: {coverage_minutes} min available, \
         {min_horizon_minutes} min required (limiting series: {limiting})"
    )]
    ForecastCoverageTooShort {
        coverage_minutes: i64,
        min_horizon_minutes: i64,
        limiting: String,
    },

    /// A non-zero slot is not fully covered by forecast intervals and no
    /// realtime override is available.
    #[error("forecast series '{series}' does not cover horizon slot {slot}")]
    AlignmentCoverageError { series: String, slot: usize },

    /// The MILP was proved infeasible. Usually a configuration conflict that
    /// escapes the violation slack.
    #[error("solver proved the problem infeasible")]
    SolverInfeasible,

    /// The solver returned an error, timed out, or reported a non-optimal
    /// status other than infeasible.
    #[error("solver failed: {0}")]
    SolverError(String),

    /// Surfaced from the source resolver (upstream I/O failure, bad units).
    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    /// The invocation was cancelled before the solver was started.
    #[error("planning cancelled")]
    Cancelled,
}

impl PlannerError {
    /// Machine-readable error kind, stable across message changes.
    pub fn kind(&self) -> &'static str {
        match self {
            PlannerError::ConfigInvalid(_) => "config_invalid",
            PlannerError::ForecastCoverageTooShort { .. } => "forecast_coverage_too_short",
            PlannerError::AlignmentCoverageError { .. } => "alignment_coverage_error",
            PlannerError::SolverInfeasible => "solver_infeasible",
            PlannerError::SolverError(_) => "solver_error",
            PlannerError::DataSource(_) => "data_source_error",
            PlannerError::Cancelled => "cancelled",
        }
    }
}
