use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{AggregatedStats, Alert, AlertKind, AttendanceRecord, ClassRef, Severity};
use crate::trend::days_before;

/// Longest lookback accepted for the absence streak window.
pub const MAX_STREAK_WINDOW_DAYS: i64 = 366;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    /// Classes below this rate raise a low-attendance alert.
    pub low_rate: f64,
    /// Below this rate the alert is high severity.
    pub high_severity_rate: f64,
    pub absence_streak: usize,
    pub streak_window_days: i64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        AlertThresholds {
            low_rate: 75.0,
            high_severity_rate: 60.0,
            absence_streak: 3,
            streak_window_days: 14,
        }
    }
}

impl AlertThresholds {
    pub fn needs_attention(&self, stats: &AggregatedStats) -> bool {
        stats.total > 0 && stats.attendance_rate < self.low_rate
    }

    pub fn streak_cutoff(&self, today: NaiveDate) -> Result<NaiveDate> {
        days_before(today, self.streak_window_days.max(0))
    }
}

/// Leading run of `absent` records once sorted newest first.
pub fn consecutive_absences(records: &[AttendanceRecord]) -> usize {
    let mut sorted: Vec<&AttendanceRecord> = records.iter().collect();
    sorted.sort_by(|a, b| b.date.cmp(&a.date));
    sorted
        .iter()
        .take_while(|record| record.status.is_absent())
        .count()
}

pub fn low_attendance_alert(
    class: &ClassRef,
    stats: &AggregatedStats,
    thresholds: &AlertThresholds,
) -> Option<Alert> {
    if !thresholds.needs_attention(stats) {
        return None;
    }

    let severity = if stats.attendance_rate < thresholds.high_severity_rate {
        Severity::High
    } else {
        Severity::Medium
    };

    Some(Alert {
        kind: AlertKind::LowAttendance,
        severity,
        class: class.clone(),
        message: format!(
            "Your attendance in {} is {}%",
            class.subject_code, stats.attendance_rate
        ),
        stats: Some(*stats),
        consecutive_count: None,
    })
}

pub fn absence_streak_alert(
    class: &ClassRef,
    recent: &[AttendanceRecord],
    thresholds: &AlertThresholds,
    today: NaiveDate,
) -> Result<Option<Alert>> {
    let cutoff = thresholds.streak_cutoff(today)?;
    let window: Vec<AttendanceRecord> = recent
        .iter()
        .filter(|record| record.date >= cutoff)
        .cloned()
        .collect();

    let streak = consecutive_absences(&window);
    if streak < thresholds.absence_streak {
        return Ok(None);
    }

    Ok(Some(Alert {
        kind: AlertKind::ConsecutiveAbsences,
        severity: Severity::High,
        class: class.clone(),
        message: format!(
            "You have {} consecutive absences in {}",
            streak, class.subject_code
        ),
        stats: None,
        consecutive_count: Some(streak),
    }))
}

/// Runs both rules for every class seen in either map.
pub fn evaluate(
    per_class_stats: &BTreeMap<ClassRef, AggregatedStats>,
    recent_records_by_class: &BTreeMap<ClassRef, Vec<AttendanceRecord>>,
    thresholds: &AlertThresholds,
    today: NaiveDate,
) -> Result<Vec<Alert>> {
    let mut alerts = Vec::new();

    for (class, stats) in per_class_stats {
        if let Some(alert) = low_attendance_alert(class, stats, thresholds) {
            log::info!("{}: {}", class.class_id, alert.message);
            alerts.push(alert);
        }
    }

    for (class, recent) in recent_records_by_class {
        if let Some(alert) = absence_streak_alert(class, recent, thresholds, today)? {
            log::info!("{}: {}", class.class_id, alert.message);
            alerts.push(alert);
        }
    }

    log::debug!(
        "evaluated {} classes, {} alerts",
        per_class_stats.len().max(recent_records_by_class.len()),
        alerts.len()
    );
    Ok(alerts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::calculate_stats;
    use crate::stats::fixtures::{day, record, series};
    use crate::models::AttendanceStatus::*;

    fn class(id: i64) -> ClassRef {
        ClassRef {
            class_id: id,
            subject_code: format!("IT-{id}"),
        }
    }

    fn stats_with_rate(present: usize, absent: usize) -> AggregatedStats {
        let mut statuses = vec![Present; present];
        statuses.extend(vec![Absent; absent]);
        calculate_stats(&series(day(2026, 9, 1), &statuses))
    }

    #[test]
    fn streak_stops_at_first_non_absent() {
        let today = day(2026, 10, 16);
        let records = vec![
            record("S-1", 1, day(2026, 10, 15), Absent),
            record("S-1", 1, day(2026, 10, 14), Absent),
            record("S-1", 1, day(2026, 10, 13), Absent),
            record("S-1", 1, day(2026, 10, 12), Present),
            record("S-1", 1, day(2026, 10, 9), Absent),
        ];
        assert_eq!(consecutive_absences(&records), 3);
        let alert = absence_streak_alert(&class(1), &records, &AlertThresholds::default(), today)
            .unwrap()
            .expect("streak of three");
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.consecutive_count, Some(3));
        assert_eq!(alert.message, "You have 3 consecutive absences in IT-1");

        let mut broken = records.clone();
        broken.push(record("S-1", 1, day(2026, 10, 14), Excused));
        broken.retain(|r| !(r.date == day(2026, 10, 14) && r.status == Absent));
        assert_eq!(consecutive_absences(&broken), 1);
        assert!(absence_streak_alert(&class(1), &broken, &AlertThresholds::default(), today)
            .unwrap()
            .is_none());
    }

    #[test]
    fn streak_ignores_records_outside_the_window() {
        let today = day(2026, 10, 16);
        let records = vec![
            record("S-1", 1, day(2026, 10, 15), Absent),
            record("S-1", 1, day(2026, 10, 1), Absent),
            record("S-1", 1, day(2026, 9, 20), Absent),
        ];
        assert_eq!(consecutive_absences(&records), 3);
        assert!(absence_streak_alert(&class(1), &records, &AlertThresholds::default(), today)
            .unwrap()
            .is_none());
    }

    #[test]
    fn streak_sorts_unordered_input() {
        let records = vec![
            record("S-1", 1, day(2026, 10, 10), Present),
            record("S-1", 1, day(2026, 10, 15), Absent),
            record("S-1", 1, day(2026, 10, 13), Absent),
        ];
        assert_eq!(consecutive_absences(&records), 2);
    }

    #[test]
    fn low_attendance_severity_boundaries() {
        let t = AlertThresholds::default();
        // 3/4 = 75%: no alert
        assert!(low_attendance_alert(&class(1), &stats_with_rate(3, 1), &t).is_none());
        // 7/10 = 70%: medium
        let medium = low_attendance_alert(&class(1), &stats_with_rate(7, 3), &t).unwrap();
        assert_eq!(medium.severity, Severity::Medium);
        assert_eq!(medium.message, "Your attendance in IT-1 is 70%");
        // 3/5 = 60%: still medium
        let edge = low_attendance_alert(&class(1), &stats_with_rate(3, 2), &t).unwrap();
        assert_eq!(edge.severity, Severity::Medium);
        // 1/2 = 50%: high
        let high = low_attendance_alert(&class(1), &stats_with_rate(1, 1), &t).unwrap();
        assert_eq!(high.severity, Severity::High);
        assert_eq!(high.stats.map(|s| s.total), Some(2));
    }

    #[test]
    fn no_low_attendance_alert_without_sessions() {
        let mut empty = calculate_stats(&[]);
        assert!(low_attendance_alert(&class(1), &empty, &AlertThresholds::default()).is_none());
        empty.attendance_rate = 0.0;
        assert!(low_attendance_alert(&class(1), &empty, &AlertThresholds::default()).is_none());
    }

    #[test]
    fn class_can_raise_both_alerts() {
        let today = day(2026, 10, 16);
        let recent = vec![
            record("S-1", 1, day(2026, 10, 15), Absent),
            record("S-1", 1, day(2026, 10, 14), Absent),
            record("S-1", 1, day(2026, 10, 13), Absent),
            record("S-1", 1, day(2026, 10, 12), Present),
        ];

        let mut per_class = BTreeMap::new();
        per_class.insert(class(1), calculate_stats(&recent));
        per_class.insert(class(2), stats_with_rate(9, 1));
        let mut recent_by_class = BTreeMap::new();
        recent_by_class.insert(class(1), recent);
        recent_by_class.insert(class(2), vec![record("S-1", 2, day(2026, 10, 15), Absent)]);

        let alerts =
            evaluate(&per_class, &recent_by_class, &AlertThresholds::default(), today).unwrap();
        assert_eq!(alerts.len(), 2);
        assert!(alerts
            .iter()
            .any(|a| a.kind == AlertKind::LowAttendance && a.class == class(1) && a.severity == Severity::High));
        assert!(alerts
            .iter()
            .any(|a| a.kind == AlertKind::ConsecutiveAbsences && a.class == class(1)));
        assert!(alerts.iter().all(|a| a.class != class(2)));
    }

    #[test]
    fn custom_thresholds_apply() {
        let strict = AlertThresholds {
            low_rate: 95.0,
            high_severity_rate: 80.0,
            absence_streak: 1,
            streak_window_days: 30,
        };
        let alert = low_attendance_alert(&class(1), &stats_with_rate(9, 1), &strict).unwrap();
        assert_eq!(alert.severity, Severity::Medium);

        let recent = vec![record("S-1", 1, day(2026, 9, 20), Absent)];
        assert!(absence_streak_alert(&class(1), &recent, &strict, day(2026, 10, 16))
            .unwrap()
            .is_some());
    }

    #[test]
    fn oversized_streak_window_is_an_error() {
        let wide = AlertThresholds {
            streak_window_days: i64::MAX / 2,
            ..AlertThresholds::default()
        };
        let today = day(2026, 10, 16);
        assert!(matches!(
            wide.streak_cutoff(today),
            Err(crate::error::AttendanceError::InvalidDate(_))
        ));
        let recent = vec![record("S-1", 1, day(2026, 10, 15), Absent)];
        assert!(absence_streak_alert(&class(1), &recent, &wide, today).is_err());

        let negative = AlertThresholds {
            streak_window_days: -5,
            ..AlertThresholds::default()
        };
        assert_eq!(negative.streak_cutoff(today).unwrap(), today);
    }
}
