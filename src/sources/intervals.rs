use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DataSourceError;

/// Maximum gap between adjacent forecast intervals still treated as
/// contiguous coverage.
pub const CONTIGUITY_TOLERANCE_SECS: i64 = 60;

/// A price forecast interval, in currency per kWh.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub value: f64,
}

/// A power forecast interval, in kW.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PowerInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub value: f64,
}

/// Common view over price and power intervals used by the aligner.
pub trait ForecastInterval {
    fn start(&self) -> DateTime<Utc>;
    fn end(&self) -> DateTime<Utc>;
    fn value(&self) -> f64;
}

impl ForecastInterval for PriceInterval {
    fn start(&self) -> DateTime<Utc> {
        self.start
    }
    fn end(&self) -> DateTime<Utc> {
        self.end
    }
    fn value(&self) -> f64 {
        self.value
    }
}

impl ForecastInterval for PowerInterval {
    fn start(&self) -> DateTime<Utc> {
        self.start
    }
    fn end(&self) -> DateTime<Utc> {
        self.end
    }
    fn value(&self) -> f64 {
        self.value
    }
}

/// Validate a forecast series: non-empty, finite values, strictly positive
/// interval durations, sorted by start, and contiguous within the sub-minute
/// tolerance.
pub fn validate_series<I: ForecastInterval>(
    series_name: &str,
    intervals: &[I],
) -> Result<(), DataSourceError> {
    if intervals.is_empty() {
        return Err(DataSourceError::BadData {
            source_name: series_name.to_string(),
            message: "forecast series is empty".into(),
        });
    }
    let mut previous_end: Option<DateTime<Utc>> = None;
    for (idx, interval) in intervals.iter().enumerate() {
        if !interval.value().is_finite() {
            return Err(DataSourceError::BadData {
                source_name: series_name.to_string(),
                message: format!("interval {idx} has a non-finite value"),
            });
        }
        if interval.end() <= interval.start() {
            return Err(DataSourceError::BadData {
                source_name: series_name.to_string(),
                message: format!("interval {idx} has non-positive duration"),
            });
        }
        if let Some(prev) = previous_end {
            let gap = (interval.start() - prev).num_seconds();
            if gap < 0 {
                return Err(DataSourceError::BadData {
                    source_name: series_name.to_string(),
                    message: format!("interval {idx} overlaps or is out of order"),
                });
            }
            if gap >= CONTIGUITY_TOLERANCE_SECS {
                return Err(DataSourceError::BadData {
                    source_name: series_name.to_string(),
                    message: format!("gap of {gap}s before interval {idx}"),
                });
            }
        }
        previous_end = Some(interval.end());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    fn interval(offset_min: i64, len_min: i64, value: f64) -> PowerInterval {
        let start = t0() + Duration::minutes(offset_min);
        PowerInterval {
            start,
            end: start + Duration::minutes(len_min),
            value,
        }
    }

    #[test]
    fn test_contiguous_series_is_valid() {
        let series = vec![interval(0, 30, 1.0), interval(30, 30, 2.0)];
        assert!(validate_series("load", &series).is_ok());
    }

    #[test]
    fn test_sub_minute_gap_is_tolerated() {
        let mut second = interval(30, 30, 2.0);
        second.start += Duration::seconds(45);
        let series = vec![interval(0, 30, 1.0), second];
        assert!(validate_series("load", &series).is_ok());
    }

    #[test]
    fn test_minute_gap_is_rejected() {
        let series = vec![interval(0, 30, 1.0), interval(32, 30, 2.0)];
        let err = validate_series("load", &series).unwrap_err();
        assert!(err.to_string().contains("gap"));
    }

    #[test]
    fn test_infinite_value_is_rejected() {
        let series = vec![interval(0, 30, f64::INFINITY)];
        assert!(validate_series("pv", &series).is_err());
    }

    #[test]
    fn test_empty_and_degenerate_are_rejected() {
        let empty: Vec<PowerInterval> = vec![];
        assert!(validate_series("load", &empty).is_err());
        assert!(validate_series("load", &[interval(0, 0, 1.0)]).is_err());
    }
}
