use chrono::{Duration, NaiveDate, NaiveTime};

use crate::models::{BusyInterval, Slot};

/// Free fixed-length slots between `open` and `close` on `date`.
///
/// Candidates are laid end to end from `open`; a trailing candidate that
/// would run past `close` is dropped. A candidate is excluded when it
/// overlaps any busy interval under half-open semantics, so a busy interval
/// ending exactly at a slot's start does not block it.
pub fn compute_free_slots(
    date: NaiveDate,
    open: NaiveTime,
    close: NaiveTime,
    slot_duration: Duration,
    busy: &[BusyInterval],
) -> Vec<Slot> {
    if slot_duration <= Duration::zero() || open >= close {
        return Vec::new();
    }

    let window_end = date.and_time(close);
    let mut current = date.and_time(open);
    let mut slots = Vec::new();

    while current + slot_duration <= window_end {
        let slot_end = current + slot_duration;

        // Overlap: busy starts before slot ends AND busy ends after slot starts
        let clash = busy.iter().any(|b| b.start < slot_end && b.end > current);

        if !clash {
            slots.push(Slot {
                start: current.time(),
                end: slot_end.time(),
            });
        }

        current = slot_end;
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn busy(start: &str, end: &str) -> BusyInterval {
        BusyInterval {
            start: dt(start),
            end: dt(end),
        }
    }

    fn clinic_day(busy: &[BusyInterval]) -> Vec<Slot> {
        compute_free_slots(day(), t("10:00"), t("20:00"), Duration::minutes(30), busy)
    }

    #[test]
    fn test_empty_calendar_fills_whole_day() {
        let slots = clinic_day(&[]);
        assert_eq!(slots.len(), 20);
        assert_eq!(slots[0], Slot { start: t("10:00"), end: t("10:30") });
        assert_eq!(slots[19], Slot { start: t("19:30"), end: t("20:00") });
    }

    #[test]
    fn test_slots_have_fixed_length_and_ascend() {
        let slots = clinic_day(&[busy("2025-06-16 12:10", "2025-06-16 12:40")]);
        for slot in &slots {
            assert_eq!(slot.end - slot.start, Duration::minutes(30));
        }
        for pair in slots.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn test_trailing_partial_slot_dropped() {
        let slots = compute_free_slots(day(), t("10:00"), t("11:45"), Duration::minutes(30), &[]);
        assert_eq!(slots.len(), 3);
        assert_eq!(slots.last().unwrap().end, t("11:30"));
    }

    #[test]
    fn test_busy_interval_excludes_overlapping_slots() {
        let slots = clinic_day(&[busy("2025-06-16 10:15", "2025-06-16 11:15")]);
        let starts: Vec<_> = slots.iter().take(2).map(|s| s.start).collect();
        // 10:00, 10:30 and 11:00 all overlap 10:15-11:15
        assert_eq!(starts, vec![t("11:30"), t("12:00")]);
        assert_eq!(slots.len(), 17);
    }

    #[test]
    fn test_touching_endpoints_do_not_overlap() {
        let slots = clinic_day(&[
            busy("2025-06-16 09:00", "2025-06-16 10:00"),
            busy("2025-06-16 20:00", "2025-06-16 21:00"),
        ]);
        assert_eq!(slots.len(), 20);
        assert_eq!(slots[0].start, t("10:00"));
    }

    #[test]
    fn test_unordered_overlapping_busy_intervals() {
        let slots = clinic_day(&[
            busy("2025-06-16 15:00", "2025-06-16 16:00"),
            busy("2025-06-16 10:00", "2025-06-16 10:30"),
            busy("2025-06-16 15:30", "2025-06-16 17:00"),
        ]);
        assert!(!slots.iter().any(|s| s.start == t("10:00")));
        assert!(!slots.iter().any(|s| s.start >= t("15:00") && s.start < t("17:00")));
        assert_eq!(slots.len(), 20 - 1 - 4);
    }

    #[test]
    fn test_busy_covering_whole_window_returns_empty() {
        let slots = clinic_day(&[busy("2025-06-16 08:00", "2025-06-16 21:00")]);
        assert!(slots.is_empty());
    }

    #[test]
    fn test_busy_on_other_day_ignored() {
        let slots = clinic_day(&[busy("2025-06-17 10:00", "2025-06-17 20:00")]);
        assert_eq!(slots.len(), 20);
    }

    #[test]
    fn test_no_slot_overlaps_any_busy_interval() {
        let intervals = [
            busy("2025-06-16 10:05", "2025-06-16 10:10"),
            busy("2025-06-16 13:00", "2025-06-16 13:30"),
            busy("2025-06-16 18:45", "2025-06-16 19:15"),
        ];
        let slots = clinic_day(&intervals);
        for slot in &slots {
            let start = day().and_time(slot.start);
            let end = day().and_time(slot.end);
            for b in &intervals {
                assert!(!(start < b.end && end > b.start), "{slot:?} overlaps {b:?}");
            }
        }
        assert_eq!(slots.len(), 20 - 1 - 1 - 2);
    }

    #[test]
    fn test_degenerate_inputs_return_empty() {
        assert!(compute_free_slots(day(), t("20:00"), t("10:00"), Duration::minutes(30), &[]).is_empty());
        assert!(compute_free_slots(day(), t("10:00"), t("10:00"), Duration::minutes(30), &[]).is_empty());
        assert!(compute_free_slots(day(), t("10:00"), t("20:00"), Duration::zero(), &[]).is_empty());
        assert!(compute_free_slots(day(), t("10:00"), t("10:20"), Duration::minutes(30), &[]).is_empty());
    }
}
