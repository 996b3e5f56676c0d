//! Fixture replay: a [`SourceResolver`] backed by a recorded JSON document.
//!
//! Recording captures every resolved input of a planning run; replaying the
//! document reproduces the run bit-for-bit without any upstream system.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    DataSourceError, EntityRef, HistoryProfileRequest, PowerInterval, PriceInterval,
    SourceResolver,
};

/// The recorded inputs of one planning run. BTreeMaps keep the serialized
/// form stable for baseline diffs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureDocument {
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scalars: BTreeMap<String, f64>,
    #[serde(default)]
    pub power_forecasts: BTreeMap<String, Vec<PowerInterval>>,
    #[serde(default)]
    pub price_forecasts: BTreeMap<String, Vec<PriceInterval>>,
    #[serde(default)]
    pub history_profiles: BTreeMap<String, Vec<PowerInterval>>,
}

impl FixtureDocument {
    pub fn from_path(path: &Path) -> Result<Self, DataSourceError> {
        let raw = std::fs::read_to_string(path).map_err(|err| DataSourceError::Upstream {
            source_name: path.display().to_string(),
            message: err.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|err| DataSourceError::BadData {
            source_name: path.display().to_string(),
            message: err.to_string(),
        })
    }

    pub fn write_to(&self, path: &Path) -> Result<(), DataSourceError> {
        let raw =
            serde_json::to_string_pretty(self).map_err(|err| DataSourceError::BadData {
                source_name: path.display().to_string(),
                message: err.to_string(),
            })?;
        std::fs::write(path, raw).map_err(|err| DataSourceError::Upstream {
            source_name: path.display().to_string(),
            message: err.to_string(),
        })
    }
}

/// Replays a [`FixtureDocument`]. Static by construction; every lookup miss
/// is an [`DataSourceError::UnknownSource`].
#[derive(Debug, Clone, Default)]
pub struct FixtureResolver {
    document: FixtureDocument,
}

impl FixtureResolver {
    pub fn new(document: FixtureDocument) -> Self {
        Self { document }
    }

    pub fn from_path(path: &Path) -> Result<Self, DataSourceError> {
        Ok(Self::new(FixtureDocument::from_path(path)?))
    }

    pub fn document(&self) -> &FixtureDocument {
        &self.document
    }

    /// Builder-style insertion helpers for tests and recording.
    pub fn with_scalar(mut self, entity: &str, value: f64) -> Self {
        self.document.scalars.insert(entity.to_string(), value);
        self
    }

    pub fn with_power_forecast(mut self, key: &str, intervals: Vec<PowerInterval>) -> Self {
        self.document
            .power_forecasts
            .insert(key.to_string(), intervals);
        self
    }

    pub fn with_price_forecast(mut self, key: &str, intervals: Vec<PriceInterval>) -> Self {
        self.document
            .price_forecasts
            .insert(key.to_string(), intervals);
        self
    }

    pub fn with_history_profile(mut self, key: &str, intervals: Vec<PowerInterval>) -> Self {
        self.document
            .history_profiles
            .insert(key.to_string(), intervals);
        self
    }
}

impl SourceResolver for FixtureResolver {
    fn resolve_scalar(&self, entity: &EntityRef) -> Result<f64, DataSourceError> {
        self.document
            .scalars
            .get(&entity.entity)
            .copied()
            .ok_or_else(|| DataSourceError::UnknownSource(entity.entity.clone()))
    }

    fn resolve_power_forecast(
        &self,
        entity: &EntityRef,
    ) -> Result<Vec<PowerInterval>, DataSourceError> {
        self.document
            .power_forecasts
            .get(&entity.entity)
            .cloned()
            .ok_or_else(|| DataSourceError::UnknownSource(entity.entity.clone()))
    }

    fn resolve_price_forecast(
        &self,
        entity: &EntityRef,
    ) -> Result<Vec<PriceInterval>, DataSourceError> {
        self.document
            .price_forecasts
            .get(&entity.entity)
            .cloned()
            .ok_or_else(|| DataSourceError::UnknownSource(entity.entity.clone()))
    }

    fn resolve_history_profile(
        &self,
        request: &HistoryProfileRequest,
    ) -> Result<Vec<PowerInterval>, DataSourceError> {
        self.document
            .history_profiles
            .get(&request.entity.entity)
            .cloned()
            .ok_or_else(|| DataSourceError::UnknownSource(request.entity.entity.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_scalar_replay_and_miss() {
        let resolver = FixtureResolver::default().with_scalar("sensor.soc", 42.5);
        assert_eq!(
            resolver
                .resolve_scalar(&EntityRef::new("sensor.soc"))
                .unwrap(),
            42.5
        );
        assert!(matches!(
            resolver.resolve_scalar(&EntityRef::new("sensor.other")),
            Err(DataSourceError::UnknownSource(_))
        ));
    }

    #[test]
    fn test_document_roundtrip() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let resolver = FixtureResolver::default()
            .with_scalar("sensor.load", 1.2)
            .with_power_forecast(
                "sensor.pv",
                vec![PowerInterval {
                    start,
                    end: start + Duration::minutes(30),
                    value: 3.0,
                }],
            );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ems_fixture.json");
        resolver.document().write_to(&path).unwrap();

        let replayed = FixtureResolver::from_path(&path).unwrap();
        assert_eq!(
            replayed
                .resolve_scalar(&EntityRef::new("sensor.load"))
                .unwrap(),
            1.2
        );
        let pv = replayed
            .resolve_power_forecast(&EntityRef::new("sensor.pv"))
            .unwrap();
        assert_eq!(pv.len(), 1);
        assert_eq!(pv[0].value, 3.0);
    }
}
