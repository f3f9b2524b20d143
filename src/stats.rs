use crate::error::Result;
use crate::models::{AggregatedStats, AttendanceRecord, AttendanceStatus};

/// Rate reported when there are no sessions yet: no data counts as full attendance.
pub const EMPTY_RATE: f64 = 100.0;

pub fn calculate_stats(records: &[AttendanceRecord]) -> AggregatedStats {
    tally(records.iter().map(|record| record.status))
}

/// Aggregates raw status strings straight from an export or import, rejecting
/// anything that is not one of the five statuses.
pub fn calculate_stats_from_raw(statuses: &[&str]) -> Result<AggregatedStats> {
    let parsed = statuses
        .iter()
        .map(|value| value.parse::<AttendanceStatus>())
        .collect::<Result<Vec<_>>>()?;
    Ok(tally(parsed))
}

pub fn tally<I>(statuses: I) -> AggregatedStats
where
    I: IntoIterator<Item = AttendanceStatus>,
{
    let mut counts = StatusCounts::default();

    for status in statuses {
        match status {
            AttendanceStatus::Present => counts.present += 1,
            AttendanceStatus::Absent => counts.absent += 1,
            AttendanceStatus::Late => counts.late += 1,
            AttendanceStatus::Excused => counts.excused += 1,
            AttendanceStatus::Partial => counts.partial += 1,
        }
        if status.is_present() {
            counts.present_count += 1;
        }
    }

    counts.into_stats()
}

/// Sums several aggregates, e.g. one per class, and recomputes the rates.
pub fn combine(parts: &[AggregatedStats]) -> AggregatedStats {
    let mut counts = StatusCounts::default();
    for part in parts {
        counts.present += part.present;
        counts.absent += part.absent;
        counts.late += part.late;
        counts.excused += part.excused;
        counts.partial += part.partial;
        counts.present_count += part.present_count;
    }
    counts.into_stats()
}

#[derive(Debug, Default)]
struct StatusCounts {
    present: usize,
    absent: usize,
    late: usize,
    excused: usize,
    partial: usize,
    present_count: usize,
}

impl StatusCounts {
    fn into_stats(self) -> AggregatedStats {
        let total = self.present + self.absent + self.late + self.excused + self.partial;

        let (attendance_rate, absence_rate) = if total == 0 {
            (EMPTY_RATE, 0.0)
        } else {
            (
                percentage(self.present_count, total),
                percentage(self.absent, total),
            )
        };

        AggregatedStats {
            total,
            present: self.present,
            absent: self.absent,
            late: self.late,
            excused: self.excused,
            partial: self.partial,
            present_count: self.present_count,
            attendance_rate,
            absence_rate,
        }
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    round2(part as f64 / total as f64 * 100.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
