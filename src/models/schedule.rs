//! Canonical weekly schedule shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw opening-hours record as stored in `hospitaltimes`.
pub type RawSchedule = Map<String, Value>;

/// Opening hours for a single weekday. `None` means closed or unknown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DaySchedule {
    /// Opening time as `HH:MM`
    pub open: Option<String>,
    /// Closing time as `HH:MM`
    pub close: Option<String>,
    pub open_minutes: Option<u16>,
    pub close_minutes: Option<u16>,
}

impl DaySchedule {
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }
}

/// A `start~end` window such as a lunch break or reception hours.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
    pub start_minutes: u16,
    pub end_minutes: u16,
}

/// Normalized weekly schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(rename = "Monday")]
    pub monday: DaySchedule,
    #[serde(rename = "Tuesday")]
    pub tuesday: DaySchedule,
    #[serde(rename = "Wednesday")]
    pub wednesday: DaySchedule,
    #[serde(rename = "Thursday")]
    pub thursday: DaySchedule,
    #[serde(rename = "Friday")]
    pub friday: DaySchedule,
    #[serde(rename = "Saturday")]
    pub saturday: DaySchedule,
    #[serde(rename = "Sunday")]
    pub sunday: DaySchedule,

    /// Weekday lunch break
    pub lunch: Option<TimeWindow>,
    pub lunch_saturday: Option<TimeWindow>,

    /// Weekday reception hours
    pub reception: Option<TimeWindow>,
    pub reception_saturday: Option<TimeWindow>,

    pub closed_on_sunday: bool,
    pub closed_on_holidays: bool,
    pub emergency_day: bool,
    pub emergency_night: bool,
}

impl Schedule {
    /// Schedule with every day closed and no windows or flags.
    pub fn closed() -> Self {
        Self::default()
    }

    pub fn day_mut(&mut self, index: usize) -> Option<&mut DaySchedule> {
        match index {
            0 => Some(&mut self.monday),
            1 => Some(&mut self.tuesday),
            2 => Some(&mut self.wednesday),
            3 => Some(&mut self.thursday),
            4 => Some(&mut self.friday),
            5 => Some(&mut self.saturday),
            6 => Some(&mut self.sunday),
            _ => None,
        }
    }
}
