//! Due-schedule resolution. Pure functions of `(now, entries, state)`.
//!
//! At startup the candidate for each entry is its most recent occurrence
//! at or before `now`: today's if its time of day has passed, otherwise
//! yesterday's. Anything older than that is never backfilled. The recurring
//! scheduler instead checks the exact slot its job was armed for.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use verdant_core::ScheduleEntry;

use crate::state::WateringState;
use crate::types::Occurrence;

/// The due predicate for one occurrence.
///
/// Spacing is counted in calendar days from the last completion to the
/// occurrence's own date.
pub fn is_due(now: NaiveDateTime, occurrence: &Occurrence, state: &WateringState) -> bool {
    if occurrence.scheduled_at > now {
        return false;
    }
    match state.last_watered(&occurrence.entry.id) {
        None => true,
        Some(last) => {
            let eligible_from =
                last.date() + Duration::days(i64::from(occurrence.entry.interval_days));
            occurrence.scheduled_at > last && eligible_from <= occurrence.date
        }
    }
}

/// Is `entry`'s occurrence on `date` due at `now`?
///
/// Used by the recurring scheduler with the date of the slot the job was
/// armed for, so a loop stalled past midnight still waters yesterday's slot.
pub fn resolve_slot(
    now: NaiveDateTime,
    entry: &ScheduleEntry,
    date: NaiveDate,
    state: &WateringState,
) -> Option<Occurrence> {
    let occurrence = Occurrence::new(entry, date);
    is_due(now, &occurrence, state).then_some(occurrence)
}

/// The most recent missed occurrence of `entry`, if it is due at `now`.
///
/// An entry that has never been watered only starts with today's slot.
pub fn resolve_entry(
    now: NaiveDateTime,
    entry: &ScheduleEntry,
    state: &WateringState,
) -> Option<Occurrence> {
    let today = Occurrence::new(entry, now.date());
    let candidate = if today.scheduled_at <= now {
        today
    } else if state.last_watered(&entry.id).is_some() {
        Occurrence::new(entry, now.date().pred_opt()?)
    } else {
        return None;
    };
    is_due(now, &candidate, state).then_some(candidate)
}

/// Every entry whose most recent occurrence is due at `now`, each evaluated
/// on its own, in configuration order.
pub fn resolve_due(
    now: NaiveDateTime,
    entries: &[ScheduleEntry],
    state: &WateringState,
) -> Vec<Occurrence> {
    entries
        .iter()
        .filter_map(|entry| resolve_entry(now, entry, state))
        .collect()
}

/// First date on which `entry` may run again, given the state. `None` when it
/// has never run.
pub fn next_eligible_date(
    entry: &ScheduleEntry,
    state: &WateringState,
) -> Option<chrono::NaiveDate> {
    state
        .last_watered(&entry.id)
        .map(|last| last.date() + Duration::days(i64::from(entry.interval_days)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use verdant_core::TimeOfDay;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        day(d).and_hms_opt(h, m, 0).unwrap()
    }

    fn entry(h: u32, m: u32, interval_days: u32) -> ScheduleEntry {
        ScheduleEntry::new(TimeOfDay::new(h, m).unwrap(), 30, interval_days)
    }

    fn watered(id: &str, when: NaiveDateTime) -> WateringState {
        let mut state = WateringState::new();
        state.record(id, when);
        state
    }

    #[test]
    fn first_run_is_due_once_start_time_passes() {
        let e = entry(7, 0, 1);
        let state = WateringState::new();
        assert_eq!(resolve_entry(at(16, 6, 59), &e, &state), None);

        let occ = resolve_entry(at(16, 7, 0), &e, &state).unwrap();
        assert_eq!(occ.scheduled_at, at(16, 7, 0));
        assert!(resolve_entry(at(16, 23, 59), &e, &state).is_some());
    }

    #[test]
    fn yesterday_run_makes_today_due() {
        let e = entry(7, 0, 1);
        let state = watered("07:00", at(15, 7, 0));
        let occ = resolve_entry(at(16, 7, 5), &e, &state).unwrap();
        assert_eq!(occ.date, day(16));
    }

    #[test]
    fn completed_today_is_not_due_again() {
        let e = entry(7, 0, 1);
        let state = watered("07:00", at(16, 7, 0));
        assert_eq!(resolve_entry(at(16, 12, 0), &e, &state), None);
    }

    #[test]
    fn interval_blocks_until_enough_days_pass() {
        let e = entry(7, 0, 3);
        let state = watered("07:00", at(14, 7, 0));
        assert_eq!(resolve_entry(at(16, 8, 0), &e, &state), None);
        assert!(resolve_entry(at(17, 8, 0), &e, &state).is_some());
        assert_eq!(next_eligible_date(&e, &state), Some(day(17)));
    }

    #[test]
    fn interval_counts_calendar_days_not_hours() {
        // Watered late in the evening; a daily entry is eligible the next
        // calendar day even though fewer than 24 hours have passed.
        let e = entry(7, 0, 1);
        let state = watered("07:00", at(15, 22, 0));
        let occ = resolve_entry(at(16, 7, 0), &e, &state);
        assert!(occ.is_some());
    }

    #[test]
    fn later_manual_timestamp_suppresses_todays_slot() {
        // A record after today's nominal time means today's slot is done.
        let e = entry(7, 0, 1);
        let state = watered("07:00", at(16, 9, 30));
        assert_eq!(resolve_entry(at(16, 10, 0), &e, &state), None);
    }

    #[test]
    fn resolve_is_pure() {
        let entries = vec![entry(7, 0, 1), entry(19, 0, 2)];
        let state = watered("19:00", at(13, 19, 0));
        let now = at(16, 20, 0);
        let first = resolve_due(now, &entries, &state);
        let second = resolve_due(now, &entries, &state);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn entries_are_resolved_independently_in_config_order() {
        let entries = vec![entry(19, 0, 1), entry(7, 0, 3), entry(6, 0, 1)];
        let mut state = WateringState::new();
        state.record("07:00", at(15, 7, 0)); // interval 3: not yet
        state.record("06:00", at(15, 6, 0)); // daily: due

        let due = resolve_due(at(16, 20, 0), &entries, &state);
        let ids: Vec<&str> = due.iter().map(|o| o.schedule_id()).collect();

        assert_eq!(ids, vec!["19:00", "06:00"]);
    }

    #[test]
    fn only_the_most_recent_missed_occurrence_is_caught_up() {
        // Down for a week, restarted before today's slot: yesterday's slot
        // is the one caught up, the six before it are gone.
        let e = entry(7, 0, 1);
        let state = watered("07:00", at(8, 7, 0));

        let early = resolve_entry(at(16, 6, 0), &e, &state).unwrap();
        assert_eq!(early.scheduled_at, at(15, 7, 0));
        let late = resolve_entry(at(16, 9, 0), &e, &state).unwrap();
        assert_eq!(late.scheduled_at, at(16, 7, 0));
    }

    #[test]
    fn yesterdays_slot_is_not_repeated_once_recorded() {
        let e = entry(7, 0, 1);
        let state = watered("07:00", at(15, 7, 0));
        assert_eq!(resolve_entry(at(16, 6, 0), &e, &state), None);
    }

    #[test]
    fn yesterdays_slot_respects_the_interval() {
        let e = entry(7, 0, 3);
        assert_eq!(resolve_entry(at(16, 6, 0), &e, &watered("07:00", at(13, 7, 0))), None);
        assert!(resolve_entry(at(16, 6, 0), &e, &watered("07:00", at(12, 7, 0))).is_some());
    }

    #[test]
    fn slot_from_before_midnight_is_still_due_after_it() {
        let e = entry(23, 59, 1);
        let state = watered("23:59", at(15, 23, 59));
        let occ = resolve_slot(at(17, 0, 5), &e, day(16), &state).unwrap();
        assert_eq!(occ.scheduled_at, at(16, 23, 59));

        let done = watered("23:59", at(16, 23, 59));
        assert_eq!(resolve_slot(at(17, 0, 5), &e, day(16), &done), None);
    }
}
