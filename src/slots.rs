use chrono::{NaiveTime, Timelike};
use std::fmt::Display;
use std::str::FromStr;

const FIRST_SLOT_MINUTE: u32 = 6 * 60;
const LAST_SLOT_END_MINUTE: u32 = 24 * 60;
pub const SLOT_MINUTES: u32 = 30;

/// A half-hour pickup window, `[start, end)` in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSlot {
    start_minute: u32,
}

impl TimeSlot {
    pub const fn start_minute(self) -> u32 {
        self.start_minute
    }

    pub const fn end_minute(self) -> u32 {
        self.start_minute + SLOT_MINUTES
    }

    /// `HH:MM` of the first minute in the slot.
    pub fn start_label(self) -> String {
        format_minute(self.start_minute)
    }

    /// `HH:MM` of the first minute after the slot. The last slot ends at `24:00`.
    pub fn end_label(self) -> String {
        format_minute(self.end_minute())
    }

    pub fn label(self) -> String {
        format!("{}-{}", self.start_label(), self.end_label())
    }

    pub fn contains(self, time: NaiveTime) -> bool {
        let minute = time.hour() * 60 + time.minute();
        (self.start_minute..self.end_minute()).contains(&minute)
    }
}

fn format_minute(minute: u32) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

impl Display for TimeSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid time slot: {0}. Expected a half-hour start between 06:00 and 23:30")]
pub struct ParseTimeSlotError(String);

impl FromStr for TimeSlot {
    type Err = ParseTimeSlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseTimeSlotError(s.to_string());
        let start = s.trim().split('-').next().ok_or_else(invalid)?;
        let time = NaiveTime::parse_from_str(start.trim(), "%H:%M").map_err(|_| invalid())?;
        let minute = time.hour() * 60 + time.minute();

        generate_time_slots()
            .into_iter()
            .find(|slot| slot.start_minute == minute)
            .ok_or_else(invalid)
    }
}

/// The 36 pickup slots from 06:00 to midnight.
pub fn generate_time_slots() -> Vec<TimeSlot> {
    (FIRST_SLOT_MINUTE..LAST_SLOT_END_MINUTE)
        .step_by(SLOT_MINUTES as usize)
        .map(|start_minute| TimeSlot { start_minute })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generates_36_contiguous_slots() {
        let slots = generate_time_slots();
        assert_eq!(slots.len(), 36);
        assert_eq!(slots[0].label(), "06:00-06:30");
        assert_eq!(slots[35].label(), "23:30-24:00");

        for pair in slots.windows(2) {
            assert_eq!(pair[0].end_minute(), pair[1].start_minute());
        }
    }

    #[test]
    fn test_slot_boundaries_are_half_open() {
        let slot: TimeSlot = "12:00".parse().unwrap();
        assert!(slot.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        assert!(slot.contains(NaiveTime::from_hms_opt(12, 29, 59).unwrap()));
        assert!(!slot.contains(NaiveTime::from_hms_opt(12, 30, 0).unwrap()));
        assert!(!slot.contains(NaiveTime::from_hms_opt(11, 59, 0).unwrap()));
    }

    #[test]
    fn test_parse_slot() {
        assert_eq!("06:30".parse::<TimeSlot>().unwrap().start_minute(), 390);
        assert_eq!("06:30-07:00".parse::<TimeSlot>().unwrap().label(), "06:30-07:00");
        assert!("05:30".parse::<TimeSlot>().is_err());
        assert!("06:15".parse::<TimeSlot>().is_err());
        assert!("noon".parse::<TimeSlot>().is_err());
    }

    proptest! {
        #[test]
        fn prop_times_from_six_fall_in_exactly_one_slot(hour in 6u32..24, minute in 0u32..60) {
            let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap();
            let matching = generate_time_slots()
                .into_iter()
                .filter(|slot| slot.contains(time))
                .count();
            prop_assert_eq!(matching, 1);
        }

        #[test]
        fn prop_times_before_six_fall_in_no_slot(hour in 0u32..6, minute in 0u32..60) {
            let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap();
            prop_assert!(generate_time_slots().iter().all(|slot| !slot.contains(time)));
        }
    }
}
