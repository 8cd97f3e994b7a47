use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A bookable interval of clinic-local clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Slot {
    pub fn label(&self) -> String {
        format!("{} – {}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Time already taken on the calendar, in clinic-local time. Intervals may
/// arrive unordered and overlapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}
