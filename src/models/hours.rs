use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

const DAY_ORDER: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningWindow {
    pub day: String,
    pub start: String,
    pub end: String,
}

/// Clinic opening hours, one or more windows per weekday. A weekday with no
/// window is closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingHours {
    pub slots: Vec<OpeningWindow>,
}

/// A parsed opening window for a concrete date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl OperatingHours {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let hours: OperatingHours = serde_json::from_str(s)?;
        hours.validate()?;
        Ok(hours)
    }

    /// Every day of the week open between `start` and `end`.
    pub fn daily(start: &str, end: &str) -> anyhow::Result<Self> {
        let hours = OperatingHours {
            slots: DAY_ORDER
                .iter()
                .map(|day| OpeningWindow {
                    day: day.to_string(),
                    start: start.to_string(),
                    end: end.to_string(),
                })
                .collect(),
        };
        hours.validate()?;
        Ok(hours)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for slot in &self.slots {
            parse_weekday(&slot.day)?;
            let start = parse_time(&slot.start)?;
            let end = parse_time(&slot.end)?;
            if start >= end {
                anyhow::bail!("window must end after it starts: {} {}-{}", slot.day, slot.start, slot.end);
            }
        }

        for day in DAY_ORDER {
            let windows = self.windows_for_weekday(parse_weekday(day)?);
            for pair in windows.windows(2) {
                if pair[1].start < pair[0].end {
                    anyhow::bail!("overlapping opening windows on {day}");
                }
            }
        }
        Ok(())
    }

    /// Opening windows for `date`, sorted by start time. Empty when the
    /// clinic is closed that day.
    pub fn windows_for(&self, date: NaiveDate) -> Vec<Window> {
        self.windows_for_weekday(date.weekday())
    }

    fn windows_for_weekday(&self, weekday: Weekday) -> Vec<Window> {
        let mut windows: Vec<Window> = self
            .slots
            .iter()
            .filter(|s| parse_weekday(&s.day).map(|d| d == weekday).unwrap_or(false))
            .filter_map(|s| {
                Some(Window {
                    start: parse_time(&s.start).ok()?,
                    end: parse_time(&s.end).ok()?,
                })
            })
            .collect();
        windows.sort_by_key(|w| w.start);
        windows
    }

    pub fn to_human_readable(&self) -> String {
        if self.slots.is_empty() {
            return String::new();
        }

        let mut sorted_slots = self.slots.clone();
        sorted_slots.sort_by(|a, b| {
            let a_idx = day_index(&a.day);
            let b_idx = day_index(&b.day);
            a_idx.cmp(&b_idx).then_with(|| a.start.cmp(&b.start))
        });

        sorted_slots
            .iter()
            .map(|s| {
                let day = capitalize(&s.day);
                format!("{day}: {}-{}", s.start, s.end)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn day_index(day: &str) -> usize {
    DAY_ORDER
        .iter()
        .position(|d| *d == day.to_lowercase())
        .unwrap_or(DAY_ORDER.len())
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + &c.as_str().to_lowercase(),
    }
}

fn parse_weekday(s: &str) -> anyhow::Result<Weekday> {
    match s.to_lowercase().as_str() {
        "mon" => Ok(Weekday::Mon),
        "tue" => Ok(Weekday::Tue),
        "wed" => Ok(Weekday::Wed),
        "thu" => Ok(Weekday::Thu),
        "fri" => Ok(Weekday::Fri),
        "sat" => Ok(Weekday::Sat),
        "sun" => Ok(Weekday::Sun),
        _ => Err(anyhow::anyhow!("invalid weekday: {s}")),
    }
}

fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| anyhow::anyhow!("invalid time: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn time(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    #[test]
    fn test_parse_valid_json() {
        let json = r#"{"slots":[{"day":"mon","start":"10:00","end":"13:00"},{"day":"mon","start":"14:00","end":"20:00"}]}"#;
        let hours = OperatingHours::from_json(json).unwrap();
        assert_eq!(hours.slots.len(), 2);
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(OperatingHours::from_json("not json").is_err());
    }

    #[test]
    fn test_parse_invalid_day() {
        let json = r#"{"slots":[{"day":"xyz","start":"10:00","end":"20:00"}]}"#;
        assert!(OperatingHours::from_json(json).is_err());
    }

    #[test]
    fn test_parse_invalid_time() {
        let json = r#"{"slots":[{"day":"mon","start":"25:00","end":"20:00"}]}"#;
        assert!(OperatingHours::from_json(json).is_err());
    }

    #[test]
    fn test_parse_inverted_window() {
        let json = r#"{"slots":[{"day":"mon","start":"20:00","end":"10:00"}]}"#;
        assert!(OperatingHours::from_json(json).is_err());
    }

    #[test]
    fn test_parse_overlapping_windows() {
        let json = r#"{"slots":[{"day":"tue","start":"10:00","end":"14:00"},{"day":"tue","start":"13:00","end":"18:00"}]}"#;
        assert!(OperatingHours::from_json(json).is_err());
    }

    #[test]
    fn test_windows_sorted_for_date() {
        let json = r#"{"slots":[{"day":"mon","start":"14:00","end":"20:00"},{"day":"mon","start":"10:00","end":"13:00"}]}"#;
        let hours = OperatingHours::from_json(json).unwrap();
        // 2025-06-16 is a Monday
        let windows = hours.windows_for(date("2025-06-16"));
        assert_eq!(
            windows,
            vec![
                Window { start: time("10:00"), end: time("13:00") },
                Window { start: time("14:00"), end: time("20:00") },
            ]
        );
    }

    #[test]
    fn test_closed_day_has_no_windows() {
        let json = r#"{"slots":[{"day":"mon","start":"10:00","end":"20:00"}]}"#;
        let hours = OperatingHours::from_json(json).unwrap();
        // 2025-06-15 is a Sunday
        assert!(hours.windows_for(date("2025-06-15")).is_empty());
    }

    #[test]
    fn test_daily_opens_every_day() {
        let hours = OperatingHours::daily("10:00", "20:00").unwrap();
        for day in 16..=22 {
            let d = NaiveDate::from_ymd_opt(2025, 6, day).unwrap();
            assert_eq!(hours.windows_for(d).len(), 1);
        }
    }

    #[test]
    fn test_to_human_readable() {
        let json = r#"{"slots":[{"day":"fri","start":"10:00","end":"16:00"},{"day":"mon","start":"09:00","end":"17:00"}]}"#;
        let hours = OperatingHours::from_json(json).unwrap();
        assert_eq!(hours.to_human_readable(), "Mon: 09:00-17:00, Fri: 10:00-16:00");
    }

    #[test]
    fn test_to_human_readable_empty() {
        let hours = OperatingHours::from_json(r#"{"slots":[]}"#).unwrap();
        assert_eq!(hours.to_human_readable(), "");
    }
}
