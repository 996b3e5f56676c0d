use chrono::{DateTime, Datelike, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::PlannerError;

const MONTH_ABBRS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// A recurring local time-of-day window, optionally restricted to months.
///
/// The window is half-open on minute-of-day: `[start, end)`. A window whose
/// start is later than its end wraps midnight; `start == end` matches
/// nothing. Months are 3-letter lowercase abbreviations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub months: Option<Vec<String>>,
}

impl TimeWindow {
    pub fn validate(&self) -> Result<(), PlannerError> {
        parse_hhmm(&self.start)?;
        parse_hhmm(&self.end)?;
        if let Some(months) = &self.months {
            if months.is_empty() {
                return Err(PlannerError::ConfigInvalid(
                    "time window months must not be empty".into(),
                ));
            }
            for month in months {
                if !MONTH_ABBRS.contains(&month.as_str()) {
                    return Err(PlannerError::ConfigInvalid(format!(
                        "invalid month abbreviation '{month}' (expected jan..dec)"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn parse_hhmm(value: &str) -> Result<u32, PlannerError> {
    let (hour, minute) = value.split_once(':').ok_or_else(|| {
        PlannerError::ConfigInvalid(format!("time window boundary '{value}' is not HH:MM"))
    })?;
    let hour: u32 = hour
        .parse()
        .map_err(|_| PlannerError::ConfigInvalid(format!("invalid hour in '{value}'")))?;
    let minute: u32 = minute
        .parse()
        .map_err(|_| PlannerError::ConfigInvalid(format!("invalid minute in '{value}'")))?;
    if hour > 23 || minute > 59 {
        return Err(PlannerError::ConfigInvalid(format!(
            "time window boundary '{value}' out of range"
        )));
    }
    Ok(hour * 60 + minute)
}

fn minute_in_window(minute_of_day: u32, start: u32, end: u32) -> bool {
    if start == end {
        return false;
    }
    if start < end {
        start <= minute_of_day && minute_of_day < end
    } else {
        minute_of_day >= start || minute_of_day < end
    }
}

/// Evaluates [`TimeWindow`] lists against local instants.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeWindowMatcher;

impl TimeWindowMatcher {
    /// True when any window covers `when`. Empty lists match nothing.
    pub fn matches<Tz: TimeZone>(&self, windows: &[TimeWindow], when: &DateTime<Tz>) -> bool {
        let minute_of_day = when.hour() * 60 + when.minute();
        let month = MONTH_ABBRS[when.month0() as usize];
        for window in windows {
            if let Some(months) = &window.months {
                if !months.iter().any(|m| m == month) {
                    continue;
                }
            }
            // Boundaries were validated at config load; fall through on the
            // (unreachable) parse failure rather than panicking mid-solve.
            let (Ok(start), Ok(end)) = (parse_hhmm(&window.start), parse_hhmm(&window.end)) else {
                continue;
            };
            if minute_in_window(minute_of_day, start, end) {
                return true;
            }
        }
        false
    }

    /// True when the list is empty or any window covers `when`.
    pub fn allows<Tz: TimeZone>(&self, windows: &[TimeWindow], when: &DateTime<Tz>) -> bool {
        windows.is_empty() || self.matches(windows, when)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn window(start: &str, end: &str) -> TimeWindow {
        TimeWindow {
            start: start.into(),
            end: end.into(),
            months: None,
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_plain_window_is_half_open() {
        let windows = vec![window("17:00", "20:00")];
        let matcher = TimeWindowMatcher;
        assert!(!matcher.matches(&windows, &at(16, 59)));
        assert!(matcher.matches(&windows, &at(17, 0)));
        assert!(matcher.matches(&windows, &at(19, 59)));
        assert!(!matcher.matches(&windows, &at(20, 0)));
    }

    #[test]
    fn test_window_wraps_midnight() {
        let windows = vec![window("22:00", "06:00")];
        let matcher = TimeWindowMatcher;
        assert!(matcher.matches(&windows, &at(23, 30)));
        assert!(matcher.matches(&windows, &at(2, 0)));
        assert!(!matcher.matches(&windows, &at(12, 0)));
    }

    #[test]
    fn test_degenerate_window_matches_nothing() {
        let windows = vec![window("08:00", "08:00")];
        assert!(!TimeWindowMatcher.matches(&windows, &at(8, 0)));
    }

    #[test]
    fn test_month_restriction() {
        let mut w = window("17:00", "20:00");
        w.months = Some(vec!["jun".into(), "jul".into()]);
        let windows = vec![w];
        let matcher = TimeWindowMatcher;
        let june = Utc.with_ymd_and_hms(2026, 6, 1, 18, 0, 0).unwrap();
        let january = Utc.with_ymd_and_hms(2026, 1, 1, 18, 0, 0).unwrap();
        assert!(matcher.matches(&windows, &june));
        assert!(!matcher.matches(&windows, &january));
    }

    #[test]
    fn test_allows_is_vacuous_on_empty() {
        assert!(TimeWindowMatcher.allows(&[], &at(3, 0)));
        assert!(!TimeWindowMatcher.allows(&[window("10:00", "11:00")], &at(3, 0)));
    }

    #[test]
    fn test_validate_rejects_bad_boundaries() {
        assert!(window("25:00", "10:00").validate().is_err());
        assert!(window("aa:00", "10:00").validate().is_err());
        assert!(window("08:00", "10:61").validate().is_err());
        assert!(window("08:00", "10:30").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_months() {
        let mut w = window("08:00", "10:00");
        w.months = Some(vec!["junk".into()]);
        assert!(w.validate().is_err());
        w.months = Some(vec![]);
        assert!(w.validate().is_err());
        w.months = Some(vec!["dec".into()]);
        assert!(w.validate().is_ok());
    }
}
