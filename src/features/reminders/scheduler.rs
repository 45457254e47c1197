//! # Reminder Scheduler
//!
//! Turns a medication's daily times into queue entries and computes when each
//! one fires next in local wall-clock time.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 2.0.0: Daily time-of-day schedules with per-entry validation, snooze successors
//! - 1.0.0: Initial release with one-shot reminders

use super::entry::{ReminderEntry, TimeOfDay};
use super::queue::ReminderQueueStore;
use crate::core::error::{ReminderError, Result};
use crate::features::medications::Medication;
use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use log::{debug, info, warn};

/// Longest DST gap searched when a wall-clock time does not exist locally
const MAX_GAP_MINUTES: i64 = 180;

/// Result of scheduling one medication: what was queued and what was rejected
#[derive(Debug, Default)]
pub struct ScheduleReport {
    pub scheduled: Vec<ReminderEntry>,
    pub rejected: Vec<(String, ReminderError)>,
}

impl ScheduleReport {
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// First instant strictly after `now` at which the local clock reads `time`
pub fn next_occurrence<Tz: TimeZone>(time: TimeOfDay, now: &DateTime<Tz>) -> DateTime<Utc> {
    let tz = now.timezone();
    let now_utc = now.with_timezone(&Utc);
    let today = now.date_naive();

    let candidate = resolve_local(&tz, today.and_time(time.as_naive_time()));
    if candidate > now_utc {
        return candidate;
    }

    let tomorrow = today.succ_opt().unwrap_or(today);
    resolve_local(&tz, tomorrow.and_time(time.as_naive_time()))
}

/// Map a local wall-clock time to UTC. Ambiguous times take the earlier
/// instant; times inside a DST gap move forward to the first valid minute.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => (1..=MAX_GAP_MINUTES)
            .find_map(|m| {
                tz.from_local_datetime(&(naive + chrono::Duration::minutes(m)))
                    .earliest()
            })
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc()),
    }
}

/// Builds daily and snooze entries
#[derive(Debug, Clone)]
pub struct ReminderScheduler {
    snooze_duration: chrono::Duration,
}

impl ReminderScheduler {
    pub fn new(snooze_duration: std::time::Duration) -> Result<Self> {
        let snooze_duration = chrono::Duration::from_std(snooze_duration).map_err(|_| {
            ReminderError::validation(
                format!("{}s", snooze_duration.as_secs()),
                "snooze duration is out of range",
            )
        })?;
        Ok(Self { snooze_duration })
    }

    pub fn snooze_duration(&self) -> chrono::Duration {
        self.snooze_duration
    }

    /// Build one daily entry per valid time. Invalid times are reported and skipped.
    pub fn build_entries<Tz: TimeZone>(
        &self,
        medication: &Medication,
        times: &[String],
        now: &DateTime<Tz>,
    ) -> ScheduleReport {
        let mut report = ScheduleReport::default();

        for raw in times {
            match raw.parse::<TimeOfDay>() {
                Ok(time_of_day) => {
                    let scheduled_at = next_occurrence(time_of_day, now);
                    debug!(
                        "Scheduling {} at {} -> {}",
                        medication.name, time_of_day, scheduled_at
                    );
                    report.scheduled.push(ReminderEntry {
                        medication_id: medication.id.clone(),
                        user_id: medication.user_id.clone(),
                        medication_name: medication.name.clone(),
                        time_of_day,
                        scheduled_at,
                        is_snooze_instance: false,
                        snooze_ordinal: 0,
                    });
                }
                Err(e) => {
                    warn!("Skipping time {raw:?} for medication {}: {e}", medication.id);
                    report.rejected.push((raw.clone(), e));
                }
            }
        }

        report
    }

    /// Queue the daily entries for `medication` at each of `times`
    pub async fn schedule<Tz: TimeZone>(
        &self,
        queue: &mut ReminderQueueStore,
        medication: &Medication,
        times: &[String],
        now: &DateTime<Tz>,
    ) -> ScheduleReport {
        let report = self.build_entries(medication, times, now);
        let queued = queue.enqueue_all(report.scheduled.clone()).await;

        info!(
            "Scheduled {queued} reminder(s) for {} ({} rejected)",
            medication.name,
            report.rejected.len()
        );
        report
    }

    /// The entry that replaces a snoozed notification
    pub fn snooze_entry(
        &self,
        medication: &Medication,
        time_of_day: TimeOfDay,
        snooze_ordinal: u32,
        now: DateTime<Utc>,
    ) -> Result<ReminderEntry> {
        let scheduled_at = now.checked_add_signed(self.snooze_duration).ok_or_else(|| {
            ReminderError::validation(
                format!("{}s", self.snooze_duration.num_seconds()),
                "snooze would fire past the latest representable time",
            )
        })?;

        Ok(ReminderEntry {
            medication_id: medication.id.clone(),
            user_id: medication.user_id.clone(),
            medication_name: medication.name.clone(),
            time_of_day,
            scheduled_at,
            is_snooze_instance: true,
            snooze_ordinal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use chrono::{FixedOffset, NaiveDate, Offset, Timelike};
    use std::sync::Arc;
    use std::time::Duration;

    fn at(hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 14, hour, minute, 0)
            .unwrap()
    }

    fn times(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_time_already_passed_moves_to_tomorrow() {
        let now = at(9, 0);
        let next = next_occurrence("08:00".parse().unwrap(), &now);
        let local = next.with_timezone(&now.timezone());

        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 15).unwrap());
        assert_eq!((local.hour(), local.minute()), (8, 0));
    }

    #[test]
    fn test_time_later_today_stays_today() {
        let now = at(7, 0);
        let next = next_occurrence("08:00".parse().unwrap(), &now);
        let local = next.with_timezone(&now.timezone());

        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
        assert_eq!((local.hour(), local.minute()), (8, 0));
    }

    #[test]
    fn test_exactly_now_is_never_returned() {
        let now = at(8, 0);
        let next = next_occurrence("08:00".parse().unwrap(), &now);
        assert!(next > now.with_timezone(&Utc));
        assert_eq!(next - now.with_timezone(&Utc), chrono::Duration::days(1));
    }

    #[test]
    fn test_every_minute_of_the_day_is_in_the_future() {
        let now = at(13, 37);
        let now_utc = now.with_timezone(&Utc);
        for hour in 0..24 {
            for minute in (0..60).step_by(7) {
                let time = TimeOfDay::new(hour, minute).unwrap();
                let next = next_occurrence(time, &now);
                assert!(next > now_utc);
                assert!(next - now_utc <= chrono::Duration::days(1));

                let local = next.with_timezone(&now.timezone());
                assert_eq!((local.hour(), local.minute()), (hour, minute));
            }
        }
    }

    #[test]
    fn test_build_entries_skips_only_invalid_times() {
        let scheduler = ReminderScheduler::new(Duration::from_secs(600)).unwrap();
        let med = Medication::new("m1", "u1", "Aspirin", &[]);

        let report =
            scheduler.build_entries(&med, &times(&["08:00", "25:00", "bad", "20:30"]), &at(9, 0));

        assert_eq!(report.scheduled.len(), 2);
        assert_eq!(report.rejected.len(), 2);
        assert!(!report.is_complete());
        assert!(report
            .rejected
            .iter()
            .all(|(_, e)| matches!(e, ReminderError::Validation { .. })));

        let first = &report.scheduled[0];
        assert_eq!(first.medication_name, "Aspirin");
        assert!(!first.is_snooze_instance);
        assert_eq!(first.snooze_ordinal, 0);
    }

    #[tokio::test]
    async fn test_schedule_persists_entries() {
        let store = Arc::new(MemoryStore::new());
        let mut queue = ReminderQueueStore::new(store.clone());
        let scheduler = ReminderScheduler::new(Duration::from_secs(600)).unwrap();
        let vitamin = Medication::new("m2", "u1", "Vitamin", &[]);

        let report = scheduler
            .schedule(&mut queue, &vitamin, &times(&["08:00"]), &at(7, 0))
            .await;

        assert!(report.is_complete());
        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.entries()[0].scheduled_at,
            at(8, 0).with_timezone(&Utc)
        );
    }

    #[test]
    fn test_snooze_entry_offsets_from_now() {
        let scheduler = ReminderScheduler::new(Duration::from_secs(30)).unwrap();
        let med = Medication::new("m1", "u1", "Aspirin", &[]);
        let now = Utc::now();

        let entry = scheduler
            .snooze_entry(&med, "08:00".parse().unwrap(), 2, now)
            .unwrap();

        assert!(entry.is_snooze_instance);
        assert_eq!(entry.snooze_ordinal, 2);
        assert_eq!(entry.scheduled_at - now, chrono::Duration::seconds(30));
    }

    #[test]
    fn test_snooze_past_latest_time_is_rejected() {
        let scheduler = ReminderScheduler::new(Duration::from_secs(600)).unwrap();
        let med = Medication::new("m1", "u1", "Aspirin", &[]);

        let result = scheduler.snooze_entry(&med, "08:00".parse().unwrap(), 1, DateTime::<Utc>::MAX_UTC);

        assert!(matches!(result, Err(ReminderError::Validation { .. })));
    }

    #[test]
    fn test_unrepresentable_snooze_duration_is_rejected() {
        let result = ReminderScheduler::new(Duration::from_secs(u64::MAX));
        assert!(matches!(result, Err(ReminderError::Validation { .. })));
    }

    /// Central European time for 2026: clocks go forward at 01:00 UTC on
    /// March 29 and back at 01:00 UTC on October 25
    #[derive(Debug, Clone, Copy)]
    struct Cet2026;

    impl Cet2026 {
        fn winter() -> FixedOffset {
            FixedOffset::east_opt(3600).unwrap()
        }

        fn summer() -> FixedOffset {
            FixedOffset::east_opt(2 * 3600).unwrap()
        }

        fn utc(month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2026, month, day)
                .unwrap()
                .and_hms_opt(hour, minute, 0)
                .unwrap()
        }
    }

    impl TimeZone for Cet2026 {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            Cet2026
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_hms_opt(12, 0, 0).unwrap())
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            // Summer first so an ambiguous result lists the earlier instant first
            let valid: Vec<FixedOffset> = [Self::summer(), Self::winter()]
                .into_iter()
                .filter(|offset| {
                    let utc = *local - chrono::Duration::seconds(offset.local_minus_utc() as i64);
                    self.offset_from_utc_datetime(&utc) == *offset
                })
                .collect();
            match valid.as_slice() {
                [] => LocalResult::None,
                [single] => LocalResult::Single(*single),
                [earlier, later, ..] => LocalResult::Ambiguous(*earlier, *later),
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_hms_opt(12, 0, 0).unwrap())
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            if *utc >= Self::utc(3, 29, 1, 0) && *utc < Self::utc(10, 25, 1, 0) {
                Self::summer()
            } else {
                Self::winter()
            }
        }
    }

    #[test]
    fn test_time_in_spring_gap_moves_to_first_valid_minute() {
        let now = Cet2026.with_ymd_and_hms(2026, 3, 29, 0, 30, 0).single().unwrap();

        let next = next_occurrence("02:30".parse().unwrap(), &now);

        // 02:30 does not exist; the clock jumps from 02:00 to 03:00
        assert_eq!(next.naive_utc(), Cet2026::utc(3, 29, 1, 0));
        let local = next.with_timezone(&Cet2026);
        assert_eq!((local.hour(), local.minute()), (3, 0));
        assert_eq!(local.offset().fix(), Cet2026::summer());
    }

    #[test]
    fn test_ambiguous_autumn_time_takes_earlier_instant() {
        let now = Cet2026.with_ymd_and_hms(2026, 10, 25, 0, 30, 0).single().unwrap();

        let next = next_occurrence("02:30".parse().unwrap(), &now);

        // 02:30 happens twice; the first one is still on summer time
        assert_eq!(next.naive_utc(), Cet2026::utc(10, 25, 0, 30));
        assert_eq!(next.with_timezone(&Cet2026).offset().fix(), Cet2026::summer());
    }

    #[test]
    fn test_transition_days_never_return_past_instants() {
        let transition_mornings = [
            Cet2026.with_ymd_and_hms(2026, 3, 29, 0, 30, 0).single().unwrap(),
            Cet2026.with_ymd_and_hms(2026, 3, 29, 3, 30, 0).single().unwrap(),
            Cet2026.with_ymd_and_hms(2026, 10, 25, 0, 30, 0).single().unwrap(),
            Cet2026.with_ymd_and_hms(2026, 10, 25, 4, 0, 0).single().unwrap(),
        ];

        for now in transition_mornings {
            let now_utc = now.with_timezone(&Utc);
            for hour in 0..24 {
                for minute in (0..60).step_by(15) {
                    let time = TimeOfDay::new(hour, minute).unwrap();
                    let next = next_occurrence(time, &now);
                    assert!(next > now_utc, "{time} from {now}");
                    assert!(next - now_utc <= chrono::Duration::hours(25), "{time} from {now}");
                }
            }
        }
    }
}
