//! Weekly payroll arithmetic.
//!
//! Entries belong to the local week in which they were clocked in. Hours up
//! to the weekly threshold are paid at the base rate; the remainder is paid
//! at `rate * multiplier`. Hours and money are rounded to cents, half away
//! from zero.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

const SECONDS_PER_HOUR: i64 = 3600;
const MAX_OFFSET_HOURS: i32 = 23;

#[derive(Debug, Clone, Copy)]
pub struct PayrollSettings {
    pub weekly_overtime_hours: Decimal,
    pub overtime_multiplier: Decimal,
    pub utc_offset: FixedOffset,
}

impl PayrollSettings {
    pub fn new(weekly_overtime_hours: Decimal, overtime_multiplier: Decimal, utc_offset: FixedOffset) -> Self {
        PayrollSettings {
            weekly_overtime_hours,
            overtime_multiplier,
            utc_offset,
        }
    }
}

/// Whole-hour company offset; `None` outside -23..=23.
pub fn utc_offset_from_hours(hours: i32) -> Option<FixedOffset> {
    if !(-MAX_OFFSET_HOURS..=MAX_OFFSET_HOURS).contains(&hours) {
        return None;
    }
    hours
        .checked_mul(SECONDS_PER_HOUR as i32)
        .and_then(FixedOffset::east_opt)
}

/// The slice of a time entry payroll cares about.
#[derive(Debug, Clone)]
pub struct WorkedEntry {
    pub project_id: Option<Uuid>,
    pub clock_in_at: DateTime<Utc>,
    pub clock_out_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectHours {
    pub project_id: Option<Uuid>,
    pub hours: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklyPay {
    pub employee_id: Uuid,
    pub week_start: NaiveDate,
    pub total_hours: Decimal,
    pub regular_hours: Decimal,
    pub overtime_hours: Decimal,
    pub hourly_rate: Decimal,
    pub regular_pay: Decimal,
    pub overtime_pay: Decimal,
    pub gross_pay: Decimal,
    pub entry_count: i32,
    pub project_hours: Vec<ProjectHours>,
}

pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Monday of the ISO week containing `date`.
pub fn week_start_for(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

pub fn is_week_start(date: NaiveDate) -> bool {
    week_start_for(date) == date
}

/// UTC instants bounding the local week `[start, end)`.
pub fn week_bounds(week_start: NaiveDate, utc_offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_midnight = week_start.and_time(NaiveTime::default());
    let start = Utc.from_utc_datetime(&(local_midnight - Duration::seconds(utc_offset.local_minus_utc() as i64)));
    (start, start + Duration::days(7))
}

pub fn hours_from_seconds(seconds: i64) -> Decimal {
    Decimal::from(seconds.max(0)) / Decimal::from(SECONDS_PER_HOUR)
}

pub fn entry_hours(clock_in_at: DateTime<Utc>, clock_out_at: DateTime<Utc>) -> Decimal {
    round_cents(hours_from_seconds((clock_out_at - clock_in_at).num_seconds()))
}

fn local_date(at: DateTime<Utc>, utc_offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&utc_offset).date_naive()
}

pub fn calculate_week(
    employee_id: Uuid,
    hourly_rate: Decimal,
    entries: &[WorkedEntry],
    week_start: NaiveDate,
    settings: &PayrollSettings,
) -> WeeklyPay {
    let week_end = week_start + Duration::days(7);
    let mut total_seconds: i64 = 0;
    let mut entry_count = 0;
    let mut by_project: BTreeMap<Option<Uuid>, i64> = BTreeMap::new();

    for entry in entries {
        let Some(clock_out_at) = entry.clock_out_at else {
            continue;
        };
        let day = local_date(entry.clock_in_at, settings.utc_offset);
        if day < week_start || day >= week_end {
            continue;
        }
        let seconds = (clock_out_at - entry.clock_in_at).num_seconds().max(0);
        total_seconds += seconds;
        entry_count += 1;
        *by_project.entry(entry.project_id).or_default() += seconds;
    }

    let total_hours = round_cents(hours_from_seconds(total_seconds));
    let regular_hours = total_hours.min(settings.weekly_overtime_hours.max(Decimal::ZERO));
    let overtime_hours = total_hours - regular_hours;

    let regular_pay = round_cents(regular_hours * hourly_rate);
    let overtime_pay = round_cents(overtime_hours * hourly_rate * settings.overtime_multiplier);

    WeeklyPay {
        employee_id,
        week_start,
        total_hours,
        regular_hours,
        overtime_hours,
        hourly_rate,
        regular_pay,
        overtime_pay,
        gross_pay: regular_pay + overtime_pay,
        entry_count,
        project_hours: by_project
            .into_iter()
            .map(|(project_id, seconds)| ProjectHours {
                project_id,
                hours: round_cents(hours_from_seconds(seconds)),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn decimal(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn settings() -> PayrollSettings {
        PayrollSettings::new(Decimal::from(40), decimal("1.5"), utc_offset_from_hours(0).unwrap())
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn shift(day_offset: i64, start_hour: u32, hours: i64, project_id: Option<Uuid>) -> WorkedEntry {
        let day = monday() + Duration::days(day_offset);
        let clock_in_at = Utc
            .from_utc_datetime(&day.and_hms_opt(start_hour, 0, 0).unwrap());
        WorkedEntry {
            project_id,
            clock_in_at,
            clock_out_at: Some(clock_in_at + Duration::hours(hours)),
        }
    }

    #[test]
    fn test_week_start_for_each_weekday() {
        for offset in 0..7 {
            assert_eq!(week_start_for(monday() + Duration::days(offset)), monday());
        }
        assert!(is_week_start(monday()));
        assert!(!is_week_start(monday() + Duration::days(2)));
    }

    #[test]
    fn test_forty_hours_has_no_overtime() {
        let entries: Vec<_> = (0..5).map(|d| shift(d, 7, 8, None)).collect();
        let pay = calculate_week(Uuid::new_v4(), decimal("30.00"), &entries, monday(), &settings());
        assert_eq!(pay.regular_hours, decimal("40"));
        assert_eq!(pay.overtime_hours, Decimal::ZERO);
        assert_eq!(pay.gross_pay, decimal("1200.00"));
        assert_eq!(pay.entry_count, 5);
    }

    #[test]
    fn test_overtime_paid_at_multiplier() {
        let entries: Vec<_> = (0..5).map(|d| shift(d, 6, 9, None)).collect();
        let pay = calculate_week(Uuid::new_v4(), decimal("30.00"), &entries, monday(), &settings());
        assert_eq!(pay.total_hours, decimal("45"));
        assert_eq!(pay.regular_pay, decimal("1200.00"));
        assert_eq!(pay.overtime_hours, decimal("5"));
        assert_eq!(pay.overtime_pay, decimal("225.00"));
        assert_eq!(pay.gross_pay, decimal("1425.00"));
    }

    #[test]
    fn test_open_and_out_of_week_entries_ignored() {
        let mut open = shift(1, 7, 8, None);
        open.clock_out_at = None;
        let entries = vec![shift(0, 7, 8, None), open, shift(7, 7, 8, None), shift(-1, 7, 8, None)];
        let pay = calculate_week(Uuid::new_v4(), decimal("25"), &entries, monday(), &settings());
        assert_eq!(pay.entry_count, 1);
        assert_eq!(pay.total_hours, decimal("8"));
    }

    #[test]
    fn test_overnight_shift_belongs_to_clock_in_week() {
        // Sunday 20:00 to Monday 04:00 stays in the week it started.
        let entries = vec![shift(6, 20, 8, None)];
        let pay = calculate_week(Uuid::new_v4(), decimal("20"), &entries, monday(), &settings());
        assert_eq!(pay.total_hours, decimal("8"));
        let next = calculate_week(Uuid::new_v4(), decimal("20"), &entries, monday() + Duration::days(7), &settings());
        assert_eq!(next.entry_count, 0);
    }

    #[test]
    fn test_local_offset_moves_week_boundary() {
        // Monday 03:00 UTC is still Sunday evening at UTC-7.
        let entries = vec![shift(0, 3, 2, None)];
        let pacific = PayrollSettings::new(Decimal::from(40), decimal("1.5"), utc_offset_from_hours(-7).unwrap());
        let pay = calculate_week(Uuid::new_v4(), decimal("20"), &entries, monday(), &pacific);
        assert_eq!(pay.entry_count, 0);
        let previous = calculate_week(Uuid::new_v4(), decimal("20"), &entries, monday() - Duration::days(7), &pacific);
        assert_eq!(previous.entry_count, 1);
    }

    #[test]
    fn test_hours_rounded_to_cents() {
        let start = Utc.from_utc_datetime(&monday().and_hms_opt(8, 0, 0).unwrap());
        let entries = vec![WorkedEntry {
            project_id: None,
            clock_in_at: start,
            clock_out_at: Some(start + Duration::minutes(20)),
        }];
        let pay = calculate_week(Uuid::new_v4(), decimal("33.33"), &entries, monday(), &settings());
        assert_eq!(pay.total_hours, decimal("0.33"));
        assert_eq!(pay.regular_pay, decimal("11.00"));
    }

    #[test]
    fn test_project_breakdown() {
        let site_a = Some(Uuid::new_v4());
        let site_b = Some(Uuid::new_v4());
        let entries = vec![shift(0, 7, 6, site_a), shift(1, 7, 4, site_b), shift(2, 7, 3, site_a)];
        let pay = calculate_week(Uuid::new_v4(), decimal("30"), &entries, monday(), &settings());
        let a = pay.project_hours.iter().find(|p| p.project_id == site_a).unwrap();
        let b = pay.project_hours.iter().find(|p| p.project_id == site_b).unwrap();
        assert_eq!(a.hours, decimal("9"));
        assert_eq!(b.hours, decimal("4"));
    }

    #[test]
    fn test_week_bounds_respect_offset() {
        let (start, end) = week_bounds(monday(), FixedOffset::east_opt(-7 * 3600).unwrap());
        assert_eq!(start, Utc.from_utc_datetime(&monday().and_hms_opt(7, 0, 0).unwrap()));
        assert_eq!(end - start, Duration::days(7));
    }

    #[test]
    fn test_utc_offset_bounds() {
        assert_eq!(utc_offset_from_hours(-7), FixedOffset::east_opt(-7 * 3600));
        assert_eq!(utc_offset_from_hours(23), FixedOffset::east_opt(23 * 3600));
        assert_eq!(utc_offset_from_hours(24), None);
        assert_eq!(utc_offset_from_hours(-30), None);
        assert_eq!(utc_offset_from_hours(1_000_000), None);
        assert_eq!(utc_offset_from_hours(i32::MIN), None);
    }

    #[test]
    fn test_entry_hours() {
        let start = Utc::now();
        assert_eq!(entry_hours(start, start + Duration::minutes(90)), decimal("1.5"));
    }
}
