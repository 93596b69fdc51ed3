// src/services/schedule.rs

//! Opening-hours normalization.
//!
//! Converts the loosely formatted `hospitaltimes` record into a [`Schedule`].
//! Every parse failure degrades to a closed day or an absent window; nothing
//! here returns an error or panics.
//!
//! Accepted time tokens: `9:00`, `09:00`, `9시`, `9시30분`, `0900`, `18`,
//! optionally prefixed with `오전`/`오후` (`AM`/`PM`).

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::models::{CareFlags, DaySchedule, RawSchedule, Schedule, TimeWindow};

/// Values marking a day or service as closed.
const CLOSED_MARKERS: &[&str] = &["휴진", "휴무", "마감", "없음"];

/// Key prefixes per weekday, Monday first.
const DAY_KEYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

static CLOCK_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\s*[:시]\s*(\d{1,2})?").ok());
static COMPACT_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{2})(\d{2})\s*$").ok());
static HOUR_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{1,2})\s*$").ok());

/// A parsed clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    pub hour: u16,
    pub minute: u16,
}

impl ClockTime {
    pub fn minutes(&self) -> u16 {
        self.hour * 60 + self.minute
    }

    pub fn label(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }

    fn new(hour: u16, minute: u16) -> Option<Self> {
        let valid = minute < 60 && (hour < 24 || (hour == 24 && minute == 0));
        valid.then_some(Self { hour, minute })
    }
}

/// Whether `text` carries a closed marker.
pub fn is_closed_marker(text: &str) -> bool {
    CLOSED_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Parse the leading time token of a string.
pub fn parse_time(text: &str) -> Option<ClockTime> {
    let text = text.trim();
    if text.is_empty() || is_closed_marker(text) {
        return None;
    }

    let (hour, minute) = if let Some(caps) = CLOCK_RE.as_ref().and_then(|re| re.captures(text)) {
        let hour = caps.get(1)?.as_str().parse::<u16>().ok()?;
        let minute = match caps.get(2) {
            Some(m) => m.as_str().parse::<u16>().ok()?,
            None => 0,
        };
        (hour, minute)
    } else if let Some(caps) = COMPACT_RE.as_ref().and_then(|re| re.captures(text)) {
        (
            caps.get(1)?.as_str().parse::<u16>().ok()?,
            caps.get(2)?.as_str().parse::<u16>().ok()?,
        )
    } else if let Some(caps) = HOUR_RE.as_ref().and_then(|re| re.captures(text)) {
        (caps.get(1)?.as_str().parse::<u16>().ok()?, 0)
    } else {
        return None;
    };

    let afternoon = text.contains("오후") || text.to_ascii_uppercase().contains("PM");
    let hour = if afternoon && hour < 12 { hour + 12 } else { hour };

    ClockTime::new(hour, minute)
}

/// Parse a time from a JSON value. Non-strings are closed.
pub fn parse_time_value(value: Option<&Value>) -> Option<ClockTime> {
    value.and_then(Value::as_str).and_then(parse_time)
}

/// Parse a `HH:MM~HH:MM` window. Anything but exactly two valid parts is absent.
pub fn parse_window(text: &str) -> Option<TimeWindow> {
    let parts: Vec<&str> = text.split(['~', '～']).collect();
    if parts.len() != 2 {
        return None;
    }
    let start = parse_time(parts[0])?;
    let end = parse_time(parts[1])?;

    Some(TimeWindow {
        start: start.label(),
        end: end.label(),
        start_minutes: start.minutes(),
        end_minutes: end.minutes(),
    })
}

fn window_value(raw: &RawSchedule, key: &str) -> Option<TimeWindow> {
    raw.get(key).and_then(Value::as_str).and_then(parse_window)
}

fn flag_is_yes(raw: &RawSchedule, key: &str) -> bool {
    raw.get(key)
        .and_then(Value::as_str)
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("y"))
}

fn text_is_closed(raw: &RawSchedule, key: &str) -> bool {
    raw.get(key)
        .and_then(Value::as_str)
        .is_some_and(is_closed_marker)
}

fn day(raw: &RawSchedule, prefix: &str) -> DaySchedule {
    let open = parse_time_value(raw.get(&format!("trmt{prefix}Start")));
    let close = parse_time_value(raw.get(&format!("trmt{prefix}End")));

    DaySchedule {
        open: open.map(|t| t.label()),
        close: close.map(|t| t.label()),
        open_minutes: open.map(|t| t.minutes()),
        close_minutes: close.map(|t| t.minutes()),
    }
}

/// Normalize a raw opening-hours record.
///
/// `None` yields [`Schedule::closed`].
pub fn normalize(raw: Option<&RawSchedule>) -> Schedule {
    let Some(raw) = raw else {
        return Schedule::closed();
    };

    let mut schedule = Schedule::closed();
    for (index, prefix) in DAY_KEYS.iter().enumerate() {
        if let Some(slot) = schedule.day_mut(index) {
            *slot = day(raw, prefix);
        }
    }

    schedule.lunch = window_value(raw, "lunchWeek");
    schedule.lunch_saturday = window_value(raw, "lunchSat");
    schedule.reception = window_value(raw, "rcvWeek");
    schedule.reception_saturday = window_value(raw, "rcvSat");
    schedule.closed_on_sunday = text_is_closed(raw, "noTrmtSun");
    schedule.closed_on_holidays = text_is_closed(raw, "noTrmtHoli");
    schedule.emergency_day = flag_is_yes(raw, "emyDayYn");
    schedule.emergency_night = flag_is_yes(raw, "emyNgtYn");

    schedule
}

/// Night and weekend care flags.
///
/// Weekend care holds unless both `noTrmtSat` and `noTrmtSun` carry a closed
/// marker. A missing record or missing notes count as open. Listed Saturday
/// or Sunday hours always count as open.
pub fn care_flags(raw: Option<&RawSchedule>, schedule: &Schedule) -> CareFlags {
    let (night_care, weekend_closed) = match raw {
        Some(raw) => (
            flag_is_yes(raw, "emyNgtYn"),
            text_is_closed(raw, "noTrmtSat") && text_is_closed(raw, "noTrmtSun"),
        ),
        None => (false, false),
    };

    CareFlags {
        night_care,
        weekend_care: schedule.saturday.is_open() || schedule.sunday.is_open() || !weekend_closed,
    }
}
