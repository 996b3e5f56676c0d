//! Horizon construction: a wall-clock-aligned, mixed-resolution time grid.
//!
//! The horizon starts at `floor(now)` on the first active timestep boundary
//! (so slot 0 may begin before `now`), runs a high-resolution lead-in window
//! when configured, then snaps forward to the coarse clock grid and continues
//! at the base timestep. The total length is truncated to the shortest
//! forecast coverage, and must reach at least the configured minimum.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::config::EmsConfig;
use crate::error::PlannerError;

/// One horizon slot. Contiguous with its neighbors, strictly positive length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HorizonSlot {
    pub index: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl HorizonSlot {
    pub fn duration_h(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 3600.0
    }

    pub fn duration_m(&self) -> i64 {
        (self.end - self.start).num_seconds() / 60
    }
}

/// The ordered slot grid a plan is solved over.
#[derive(Debug, Clone)]
pub struct Horizon {
    pub now: DateTime<Utc>,
    pub start: DateTime<Utc>,
    pub tz: Tz,
    pub slots: Vec<HorizonSlot>,
}

impl Horizon {
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Timestep indices `0..N`.
    pub fn t_range(&self) -> std::ops::Range<usize> {
        0..self.slots.len()
    }

    pub fn dt_hours(&self, t: usize) -> f64 {
        self.slots[t].duration_h()
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.slots.last().map(|s| s.end).unwrap_or(self.start)
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end() - self.start).num_seconds() / 60
    }

    /// Slot start in the planner's local zone, for time-of-day windows.
    pub fn local_start(&self, t: usize) -> DateTime<Tz> {
        self.slots[t].start.with_timezone(&self.tz)
    }
}

/// Floor an instant to the previous `step_minutes` boundary of its local day.
pub fn floor_to_boundary(now: DateTime<Utc>, tz: Tz, step_minutes: u32) -> DateTime<Utc> {
    let local = now.with_timezone(&tz);
    let minute_of_day = local.hour() * 60 + local.minute();
    let floored = minute_of_day - minute_of_day % step_minutes;
    let naive = local
        .date_naive()
        .and_hms_opt(floored / 60, floored % 60, 0);
    match naive.and_then(|n| tz.from_local_datetime(&n).earliest()) {
        Some(local_floored) => local_floored.with_timezone(&Utc),
        // DST gap at the boundary: fall back to truncating in UTC.
        None => {
            let step_secs = i64::from(step_minutes) * 60;
            let floored_secs = now.timestamp() - now.timestamp().rem_euclid(step_secs);
            DateTime::<Utc>::from_timestamp(floored_secs, 0).unwrap_or(now)
        }
    }
}

fn is_on_boundary(at: DateTime<Utc>, tz: Tz, step_minutes: u32) -> bool {
    let local = at.with_timezone(&tz);
    local.second() == 0 && (local.hour() * 60 + local.minute()) % step_minutes == 0
}

/// Build the horizon slot grid.
///
/// `max_coverage_minutes` is the shortest forecast coverage measured from the
/// floored start; the horizon is truncated to it.
pub fn build_horizon(
    now: DateTime<Utc>,
    ems: &EmsConfig,
    max_coverage_minutes: i64,
) -> Result<Horizon, PlannerError> {
    let tz = ems.tz();
    let base_step = ems.timestep_minutes;
    let high_res = ems.high_res();

    let initial_step = high_res.map(|(step, _)| step).unwrap_or(base_step);
    let start = floor_to_boundary(now, tz, initial_step);

    if max_coverage_minutes < i64::from(ems.min_horizon_minutes) {
        return Err(PlannerError::ForecastCoverageTooShort {
            coverage_minutes: max_coverage_minutes,
            min_horizon_minutes: i64::from(ems.min_horizon_minutes),
            limiting: String::new(),
        });
    }

    let horizon_end = start + Duration::minutes(max_coverage_minutes);
    let mut slots: Vec<HorizonSlot> = Vec::new();
    let mut cursor = start;

    if let Some((high_step, high_window)) = high_res {
        let high_end = start + Duration::minutes(i64::from(high_window));
        // High-res slots run through the configured window, then continue
        // until the cursor lands on a coarse clock boundary.
        while cursor < horizon_end
            && (cursor < high_end || !is_on_boundary(cursor, tz, base_step))
        {
            let step_end = cursor + Duration::minutes(i64::from(high_step));
            let boundary_cap = if cursor >= high_end {
                next_boundary(cursor, tz, base_step)
            } else {
                step_end
            };
            let end = step_end.min(boundary_cap).min(horizon_end);
            push_slot(&mut slots, cursor, end);
            cursor = end;
        }
    }

    while cursor < horizon_end {
        let end = (cursor + Duration::minutes(i64::from(base_step))).min(horizon_end);
        push_slot(&mut slots, cursor, end);
        cursor = end;
    }

    Ok(Horizon {
        now,
        start,
        tz,
        slots,
    })
}

fn next_boundary(after: DateTime<Utc>, tz: Tz, step_minutes: u32) -> DateTime<Utc> {
    let floored = floor_to_boundary(after, tz, step_minutes);
    if floored == after {
        after
    } else {
        floored + Duration::minutes(i64::from(step_minutes))
    }
}

fn push_slot(slots: &mut Vec<HorizonSlot>, start: DateTime<Utc>, end: DateTime<Utc>) {
    if end > start {
        let index = slots.len();
        slots.push(HorizonSlot { index, start, end });
    }
}
