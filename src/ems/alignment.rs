//! Forecast alignment: strict time-weighted projection of interval-valued
//! forecasts onto horizon slots.
//!
//! Alignment never guesses. A slot that is not fully covered by forecast
//! intervals fails loudly, except slot 0, which a realtime override may
//! supply (the MPC convention: slot 0 is the current control window, so its
//! exogenous inputs come from sensors, not forecasts).

use chrono::{DateTime, Utc};

use crate::ems::horizon::Horizon;
use crate::error::PlannerError;
use crate::sources::intervals::{ForecastInterval, CONTIGUITY_TOLERANCE_SECS};

/// Minutes from `start` to the end of the series. Zero when the series ends
/// before `start`.
pub fn coverage_minutes<I: ForecastInterval>(start: DateTime<Utc>, intervals: &[I]) -> i64 {
    intervals
        .last()
        .map(|last| ((last.end() - start).num_seconds() / 60).max(0))
        .unwrap_or(0)
}

/// Project a forecast series onto the horizon slots.
///
/// Each slot's value is the overlap-weighted mean of the intervals covering
/// it. Sub-minute coverage shortfalls are tolerated (adjacent intervals may
/// have small gaps). When `first_slot_override` is provided it replaces
/// slot 0 unconditionally.
pub fn align_series<I: ForecastInterval>(
    horizon: &Horizon,
    intervals: &[I],
    first_slot_override: Option<f64>,
    series_name: &str,
) -> Result<Vec<f64>, PlannerError> {
    let mut series = Vec::with_capacity(horizon.num_slots());

    for slot in &horizon.slots {
        if slot.index == 0 {
            if let Some(override_value) = first_slot_override {
                series.push(override_value);
                continue;
            }
        }

        let slot_seconds = (slot.end - slot.start).num_seconds();
        let mut covered_seconds = 0i64;
        let mut weighted_sum = 0.0;
        for interval in intervals {
            let overlap_start = interval.start().max(slot.start);
            let overlap_end = interval.end().min(slot.end);
            let overlap = (overlap_end - overlap_start).num_seconds();
            if overlap > 0 {
                covered_seconds += overlap;
                weighted_sum += interval.value() * overlap as f64;
            }
        }

        if slot_seconds - covered_seconds >= CONTIGUITY_TOLERANCE_SECS {
            return Err(PlannerError::AlignmentCoverageError {
                series: series_name.to_string(),
                slot: slot.index,
            });
        }
        series.push(weighted_sum / covered_seconds as f64);
    }

    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmsConfig, TerminalSocConfig};
    use crate::ems::horizon::build_horizon;
    use crate::sources::PowerInterval;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn hourly_horizon(num_hours: i64) -> Horizon {
        let ems = EmsConfig {
            timestep_minutes: 60,
            high_res_timestep_minutes: None,
            high_res_horizon_minutes: None,
            min_horizon_minutes: 60,
            timezone: None,
            terminal_soc: TerminalSocConfig::default(),
        };
        build_horizon(t0(), &ems, num_hours * 60).unwrap()
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
    fn test_exact_cover_passes_through() {
        let horizon = hourly_horizon(2);
        let series = align_series(
            &horizon,
            &[interval(0, 60, 1.5), interval(60, 60, 2.5)],
            None,
            "load",
        )
        .unwrap();
        assert_eq!(series, vec![1.5, 2.5]);
    }

    #[test]
    fn test_time_weighted_mean_within_slot() {
        // 30 min at 2.0 + 30 min at 4.0 inside one hourly slot -> 3.0.
        let horizon = hourly_horizon(1);
        let series = align_series(
            &horizon,
            &[interval(0, 30, 2.0), interval(30, 30, 4.0)],
            None,
            "pv",
        )
        .unwrap();
        assert!((series[0] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_uneven_weights() {
        // 45 min at 4.0 + 15 min at 0.0 -> 3.0.
        let horizon = hourly_horizon(1);
        let series = align_series(
            &horizon,
            &[interval(0, 45, 4.0), interval(45, 15, 0.0)],
            None,
            "pv",
        )
        .unwrap();
        assert!((series[0] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_slot_fails_with_index() {
        let horizon = hourly_horizon(2);
        let err = align_series(&horizon, &[interval(0, 60, 1.0)], None, "load").unwrap_err();
        match err {
            PlannerError::AlignmentCoverageError { series, slot } => {
                assert_eq!(series, "load");
                assert_eq!(slot, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_override_supplies_uncovered_slot_zero() {
        let horizon = hourly_horizon(2);
        // Forecast only covers the second slot.
        let series = align_series(&horizon, &[interval(60, 60, 2.0)], Some(0.7), "load").unwrap();
        assert_eq!(series, vec![0.7, 2.0]);
    }

    #[test]
    fn test_override_replaces_covered_slot_zero() {
        let horizon = hourly_horizon(1);
        let series = align_series(&horizon, &[interval(0, 60, 9.0)], Some(1.1), "load").unwrap();
        assert_eq!(series, vec![1.1]);
    }

    #[test]
    fn test_sub_minute_gap_is_covered() {
        let horizon = hourly_horizon(1);
        let mut tail = interval(30, 30, 2.0);
        tail.start += Duration::seconds(40);
        let series = align_series(&horizon, &[interval(0, 30, 2.0), tail], None, "pv").unwrap();
        assert!((series[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_coverage_minutes() {
        assert_eq!(coverage_minutes::<PowerInterval>(t0(), &[]), 0);
        assert_eq!(coverage_minutes(t0(), &[interval(0, 90, 1.0)]), 90);
        assert_eq!(coverage_minutes(t0(), &[interval(-120, 30, 1.0)]), 0);
    }
}
