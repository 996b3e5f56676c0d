//! Source resolution: the seam between the planner and upstream data.
//!
//! The planner never fetches anything itself. Realtime scalars and forecast
//! interval sequences arrive through a [`SourceResolver`], and implementations
//! may be swapped freely: a live upstream provider outside this crate, or
//! [`FixtureResolver`] replaying a recorded document.

pub mod fixture;
pub mod intervals;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use fixture::{FixtureDocument, FixtureResolver};
pub use intervals::{PowerInterval, PriceInterval};

/// Reference to an upstream sensor entity. Serialized as the bare entity id.
/// The provider behind the resolver normalizes units to kW, kWh, or currency
/// per kWh as appropriate for the entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct EntityRef {
    pub entity: String,
}

impl EntityRef {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.entity)
    }
}

/// Parameters for the historical-average forecast synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryProfileRequest {
    pub entity: EntityRef,
    /// Days of history to average over.
    pub days: u32,
    /// Resolution of the synthesized profile.
    pub interval_minutes: u32,
    /// How far ahead the profile extends.
    pub horizon_hours: u32,
}

/// A power forecast source: a forecast-carrying entity, or a profile
/// synthesized from the entity's own history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PowerForecastSource {
    Entity { entity: EntityRef },
    HistoryProfile(HistoryProfileRequest),
}

impl PowerForecastSource {
    /// Stable key naming this source in coverage logs and fixtures.
    pub fn key(&self) -> &str {
        match self {
            PowerForecastSource::Entity { entity } => &entity.entity,
            PowerForecastSource::HistoryProfile(req) => &req.entity.entity,
        }
    }
}

/// Errors surfaced from a resolver implementation.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error("source '{source_name}' returned bad data: {message}")]
    BadData {
        source_name: String,
        message: String,
    },

    #[error("upstream failure resolving '{source_name}': {message}")]
    Upstream {
        source_name: String,
        message: String,
    },
}

/// Typed provider of realtime scalars and forecast interval sequences.
///
/// Synchronous: the planner core is a pure transformation, and any blocking
/// I/O behind these calls is the implementation's concern.
pub trait SourceResolver {
    /// Current sensor reading, unit-normalized.
    fn resolve_scalar(&self, entity: &EntityRef) -> Result<f64, DataSourceError>;

    /// Power forecast intervals for a forecast-carrying entity. Non-empty and
    /// contiguous, or a structured error.
    fn resolve_power_forecast(
        &self,
        entity: &EntityRef,
    ) -> Result<Vec<PowerInterval>, DataSourceError>;

    /// Price forecast intervals. Same contract as power forecasts.
    fn resolve_price_forecast(
        &self,
        entity: &EntityRef,
    ) -> Result<Vec<PriceInterval>, DataSourceError>;

    /// Historical-average power profile synthesized from entity history.
    fn resolve_history_profile(
        &self,
        request: &HistoryProfileRequest,
    ) -> Result<Vec<PowerInterval>, DataSourceError>;

    /// Dispatch a [`PowerForecastSource`] to the matching method.
    fn resolve_power_source(
        &self,
        source: &PowerForecastSource,
    ) -> Result<Vec<PowerInterval>, DataSourceError> {
        match source {
            PowerForecastSource::Entity { entity } => self.resolve_power_forecast(entity),
            PowerForecastSource::HistoryProfile(req) => self.resolve_history_profile(req),
        }
    }

    /// Resolve a scalar that reports a boolean state (0.0 / 1.0 upstream).
    fn resolve_bool(&self, entity: &EntityRef) -> Result<bool, DataSourceError> {
        Ok(self.resolve_scalar(entity)? != 0.0)
    }
}
