use std::collections::BTreeMap;

use chrono::{Datelike, Days, Months, NaiveDate, TimeDelta};
use serde::Serialize;

use crate::error::{AttendanceError, Result};
use crate::models::{AggregatedStats, AttendanceRecord, DayOfWeek, PeriodStats, TrendPoint, YearMonth};
use crate::stats::calculate_stats;
use crate::store::{AttendanceRecordStore, DateRange, RecordFilter};

pub const DEFAULT_WEEKS_BACK: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Granularity {
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendancePattern {
    pub by_day: BTreeMap<DayOfWeek, AggregatedStats>,
    pub most_absent_day: Option<DayOfWeek>,
    pub best_attendance_day: Option<DayOfWeek>,
}

pub fn days_before(date: NaiveDate, days: i64) -> Result<NaiveDate> {
    TimeDelta::try_days(days)
        .and_then(|delta| date.checked_sub_signed(delta))
        .ok_or_else(|| AttendanceError::InvalidDate(format!("{days} days before {date}")))
}

pub fn weeks_before(date: NaiveDate, weeks: i64) -> Result<NaiveDate> {
    TimeDelta::try_weeks(weeks)
        .and_then(|delta| date.checked_sub_signed(delta))
        .ok_or_else(|| AttendanceError::InvalidDate(format!("{weeks} weeks before {date}")))
}

pub fn week_start(date: NaiveDate) -> Result<NaiveDate> {
    days_before(date, date.weekday().num_days_from_monday() as i64)
}

/// Monday..Sunday window containing `date`.
pub fn week_window(date: NaiveDate) -> Result<DateRange> {
    let start = week_start(date)?;
    let end = start
        .checked_add_days(Days::new(6))
        .ok_or_else(|| AttendanceError::InvalidDate(format!("week of {start}")))?;
    Ok(DateRange::between(start, end))
}

/// One point per week for the last `weeks_back` weeks including the current
/// one, oldest first. `scope` narrows the fetch (a student, a set of classes);
/// its date range is replaced by each week's window. A lookback that leaves
/// the representable calendar is an [`AttendanceError::InvalidDate`].
pub async fn weekly_trend<S>(
    store: &S,
    scope: &RecordFilter,
    weeks_back: u32,
    today: NaiveDate,
) -> Result<Vec<TrendPoint>>
where
    S: AttendanceRecordStore + ?Sized,
{
    if weeks_back == 0 {
        return Ok(Vec::new());
    }
    week_window(weeks_before(today, i64::from(weeks_back) - 1)?)?;

    let mut points = Vec::with_capacity(weeks_back as usize);

    for offset in (0..i64::from(weeks_back)).rev() {
        let window = week_window(weeks_before(today, offset)?)?;
        let filter = scope.clone().within(window);
        let records = store.fetch_records(&filter).await?;
        let stats = calculate_stats(&records);
        let start = window.start.unwrap_or(today);

        log::debug!(
            "week of {start}: {} sessions, rate {}",
            stats.total,
            stats.attendance_rate
        );

        points.push(TrendPoint {
            period_label: start.format("%b %-d").to_string(),
            week_start: start,
            attendance_rate: stats.attendance_rate,
            total_sessions: stats.total,
        });
    }

    Ok(points)
}

pub fn group_by_month(records: &[AttendanceRecord]) -> BTreeMap<YearMonth, Vec<AttendanceRecord>> {
    let mut groups: BTreeMap<YearMonth, Vec<AttendanceRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(YearMonth::of(record.date))
            .or_default()
            .push(record.clone());
    }
    groups
}

pub fn monthly_breakdown(records: &[AttendanceRecord]) -> BTreeMap<YearMonth, AggregatedStats> {
    group_by_month(records)
        .into_iter()
        .map(|(month, group)| (month, calculate_stats(&group)))
        .collect()
}

/// Only days that actually have records appear in the map.
pub fn by_day_of_week(records: &[AttendanceRecord]) -> BTreeMap<DayOfWeek, AggregatedStats> {
    let mut groups: BTreeMap<DayOfWeek, Vec<AttendanceRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(DayOfWeek::of(record.date))
            .or_default()
            .push(record.clone());
    }
    groups
        .into_iter()
        .map(|(day, group)| (day, calculate_stats(&group)))
        .collect()
}

// Ties go to the earliest day of the week: the map iterates Monday first and
// only a strictly better rate replaces the current pick.
pub fn most_absent_day(by_day: &BTreeMap<DayOfWeek, AggregatedStats>) -> Option<DayOfWeek> {
    let mut best: Option<(DayOfWeek, f64)> = None;
    for (day, stats) in by_day {
        if best.map_or(true, |(_, rate)| stats.attendance_rate < rate) {
            best = Some((*day, stats.attendance_rate));
        }
    }
    best.map(|(day, _)| day)
}

pub fn best_attendance_day(by_day: &BTreeMap<DayOfWeek, AggregatedStats>) -> Option<DayOfWeek> {
    let mut best: Option<(DayOfWeek, f64)> = None;
    for (day, stats) in by_day {
        if best.map_or(true, |(_, rate)| stats.attendance_rate > rate) {
            best = Some((*day, stats.attendance_rate));
        }
    }
    best.map(|(day, _)| day)
}

pub fn attendance_pattern(records: &[AttendanceRecord]) -> AttendancePattern {
    let by_day = by_day_of_week(records);
    AttendancePattern {
        most_absent_day: most_absent_day(&by_day),
        best_attendance_day: best_attendance_day(&by_day),
        by_day,
    }
}

fn period_end(start: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Day => start,
        // past the last representable day the bucket just runs to `end`
        Granularity::Week => week_start(start)
            .ok()
            .and_then(|monday| monday.checked_add_days(Days::new(6)))
            .unwrap_or(NaiveDate::MAX),
        Granularity::Month => start
            .with_day(1)
            .and_then(|first| first.checked_add_months(Months::new(1)))
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX),
    }
}

/// Buckets `records` into consecutive day/week/month periods covering
/// `start..=end`. Week buckets close on Sunday, month buckets on the last day
/// of the month; the final bucket is clamped to `end`.
pub fn period_trend(
    records: &[AttendanceRecord],
    start: NaiveDate,
    end: NaiveDate,
    granularity: Granularity,
) -> Vec<PeriodStats> {
    let mut periods = Vec::new();
    let mut cursor = start;

    while cursor <= end {
        let close = period_end(cursor, granularity).min(end);
        let window = DateRange::between(cursor, close);
        let bucket: Vec<AttendanceRecord> = records
            .iter()
            .filter(|record| window.contains(record.date))
            .cloned()
            .collect();

        periods.push(PeriodStats {
            period_start: cursor,
            period_end: close,
            stats: calculate_stats(&bucket),
        });

        match close.succ_opt() {
            Some(next) => cursor = next,
            None => break,
        }
    }

    periods
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttendanceStatus::*;
    use crate::stats::fixtures::{day, record};
    use crate::store::MemoryStore;
    use chrono::Weekday;

    #[test]
    fn week_window_runs_monday_to_sunday() {
        // 2026-10-16 is a Friday
        let window = week_window(day(2026, 10, 16)).unwrap();
        assert_eq!(window.start, Some(day(2026, 10, 12)));
        assert_eq!(window.end, Some(day(2026, 10, 18)));
        assert_eq!(week_start(day(2026, 10, 12)).unwrap(), day(2026, 10, 12));
    }

    #[test]
    fn date_steps_fail_instead_of_overflowing() {
        assert_eq!(days_before(day(2026, 10, 16), 14).unwrap(), day(2026, 10, 2));
        assert!(matches!(
            days_before(day(2026, 10, 16), i64::MAX / 2),
            Err(AttendanceError::InvalidDate(_))
        ));
        assert!(weeks_before(day(2026, 10, 16), 20_000_000).is_err());
    }

    #[tokio::test]
    async fn oversized_lookback_is_an_invalid_date() {
        let err = weekly_trend(&MemoryStore::new(), &RecordFilter::default(), 20_000_000, day(2026, 10, 16))
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::InvalidDate(_)));
    }

    #[tokio::test]
    async fn weekly_trend_is_oldest_first_with_empty_weeks_at_full_rate() {
        let mut store = MemoryStore::new();
        store.add_record(record("S-1", 1, day(2026, 10, 13), Absent));
        store.add_record(record("S-1", 1, day(2026, 10, 14), Present));
        store.add_record(record("S-1", 1, day(2026, 10, 6), Absent));
        store.add_record(record("S-2", 1, day(2026, 10, 6), Present));

        let points = weekly_trend(&store, &RecordFilter::student("S-1"), 8, day(2026, 10, 16))
            .await
            .unwrap();

        assert_eq!(points.len(), 8);
        assert_eq!(points[0].week_start, day(2026, 8, 24));
        assert_eq!(points[0].total_sessions, 0);
        assert_eq!(points[0].attendance_rate, 100.0);
        assert_eq!(points[6].period_label, "Oct 5");
        assert_eq!(points[6].attendance_rate, 0.0);
        assert_eq!(points[7].period_label, "Oct 12");
        assert_eq!(points[7].total_sessions, 2);
        assert_eq!(points[7].attendance_rate, 50.0);
    }

    #[tokio::test]
    async fn zero_weeks_yields_nothing() {
        let store = MemoryStore::new();
        let points = weekly_trend(&store, &RecordFilter::default(), 0, day(2026, 10, 16))
            .await
            .unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn monthly_breakdown_sorts_by_month() {
        let records = vec![
            record("S-1", 1, day(2026, 10, 2), Absent),
            record("S-1", 1, day(2025, 12, 1), Present),
            record("S-1", 1, day(2026, 10, 9), Present),
        ];
        let months = monthly_breakdown(&records);
        let keys: Vec<String> = months.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["2025-12", "2026-10"]);
        assert_eq!(months[&YearMonth { year: 2026, month: 10 }].attendance_rate, 50.0);
    }

    #[test]
    fn day_pattern_skips_unobserved_days_and_breaks_ties_monday_first() {
        // Mon 2026-10-12, Wed 2026-10-14, Fri 2026-10-16
        let records = vec![
            record("S-1", 1, day(2026, 10, 12), Absent),
            record("S-1", 1, day(2026, 10, 14), Present),
            record("S-1", 1, day(2026, 10, 16), Absent),
        ];
        let pattern = attendance_pattern(&records);
        assert_eq!(pattern.by_day.len(), 3);
        assert!(!pattern.by_day.contains_key(&DayOfWeek(Weekday::Tue)));
        assert_eq!(pattern.most_absent_day, Some(DayOfWeek(Weekday::Mon)));
        assert_eq!(pattern.best_attendance_day, Some(DayOfWeek(Weekday::Wed)));
    }

    #[test]
    fn empty_pattern_has_no_extremes() {
        let pattern = attendance_pattern(&[]);
        assert!(pattern.by_day.is_empty());
        assert_eq!(pattern.most_absent_day, None);
        assert_eq!(pattern.best_attendance_day, None);
    }

    #[test]
    fn period_trend_clamps_and_chains_buckets() {
        let records = vec![
            record("S-1", 1, day(2026, 9, 30), Absent),
            record("S-1", 1, day(2026, 10, 1), Present),
        ];

        let weeks = period_trend(&records, day(2026, 9, 30), day(2026, 10, 10), Granularity::Week);
        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[0].period_end, day(2026, 10, 4));
        assert_eq!(weeks[0].stats.total, 2);
        assert_eq!(weeks[1].period_start, day(2026, 10, 5));
        assert_eq!(weeks[1].period_end, day(2026, 10, 10));

        let months = period_trend(&records, day(2026, 9, 15), day(2026, 10, 31), Granularity::Month);
        assert_eq!(months.len(), 2);
        assert_eq!(months[0].period_end, day(2026, 9, 30));
        assert_eq!(months[0].stats.absent, 1);
        assert_eq!(months[1].stats.present, 1);

        let days = period_trend(&records, day(2026, 9, 30), day(2026, 10, 1), Granularity::Day);
        assert_eq!(days.len(), 2);
    }

    #[test]
    fn period_trend_stops_at_the_calendar_edge() {
        let last = NaiveDate::MAX;
        let start = last.pred_opt().unwrap();
        let weeks = period_trend(&[], start, last, Granularity::Week);
        assert_eq!(weeks.last().map(|p| p.period_end), Some(last));
        assert_eq!(period_trend(&[], start, last, Granularity::Day).len(), 2);
    }
}
