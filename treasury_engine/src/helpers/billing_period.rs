//! Billing-period arithmetic.
//!
//! Due dates chain off each other rather than off "now", so a late payment does not drift the
//! member's billing anchor. Monthly anchors are capped at day 28 so that every month has the
//! anchor day.

use chrono::{DateTime, Datelike, Duration, Months, Timelike, Utc};

use crate::db_types::PaymentSchedule;

/// Calendar day monthly anchors are capped at.
pub const MAX_ANCHOR_DAY: u32 = 28;

/// Returns `now` with the calendar day capped at [`MAX_ANCHOR_DAY`]. This is the anchor the
/// first billing period hangs off. The time of day is kept so that deposits recorded moments
/// before the anchor is set fall *before* it and are not re-counted towards the next period.
pub fn anchor_date(now: DateTime<Utc>) -> DateTime<Utc> {
    let day = now.day().min(MAX_ANCHOR_DAY);
    now.with_day(day).unwrap_or(now).with_nanosecond(0).unwrap_or(now)
}

/// The due date one period after `from`.
pub fn next_due_date(from: DateTime<Utc>, schedule: PaymentSchedule) -> DateTime<Utc> {
    match schedule {
        PaymentSchedule::Weekly => from + Duration::days(7),
        PaymentSchedule::Monthly => from.checked_add_months(Months::new(1)).unwrap_or(from + Duration::days(28)),
    }
}

/// Deterministic idempotency key for a billing period: schedule code plus the period start date.
/// Two monitor runs crediting the same period always derive the same key.
pub fn period_key(schedule: PaymentSchedule, period_start: DateTime<Utc>) -> String {
    format!("{}-{}", schedule.code(), period_start.format("%Y%m%d"))
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn anchor_caps_at_28() {
        assert_eq!(
            anchor_date(Utc.with_ymd_and_hms(2026, 1, 31, 15, 30, 0).unwrap()),
            Utc.with_ymd_and_hms(2026, 1, 28, 15, 30, 0).unwrap()
        );
        assert_eq!(
            anchor_date(Utc.with_ymd_and_hms(2026, 2, 10, 8, 0, 0).unwrap()),
            Utc.with_ymd_and_hms(2026, 2, 10, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn monthly_periods_never_skip_short_months() {
        // An anchor of Jan 28 lands on Feb 28, not Mar 2.
        let due = next_due_date(utc(2026, 1, 28), PaymentSchedule::Monthly);
        assert_eq!(due, utc(2026, 2, 28));
    }

    #[test]
    fn weekly_periods_are_seven_days() {
        assert_eq!(next_due_date(utc(2026, 8, 3), PaymentSchedule::Weekly), utc(2026, 8, 10));
    }

    #[test]
    fn period_keys_are_deterministic() {
        assert_eq!(period_key(PaymentSchedule::Monthly, utc(2026, 8, 1)), "m-20260801");
        assert_eq!(period_key(PaymentSchedule::Weekly, utc(2026, 8, 3)), "w-20260803");
    }
}
