use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{AlertKind, Severity};
use crate::service::StudentDashboard;
use crate::trend::AttendancePattern;

pub fn build_report(
    dashboard: &StudentDashboard,
    pattern: Option<&AttendancePattern>,
    generated_on: NaiveDate,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Attendance Report");
    let _ = writeln!(
        output,
        "Generated for student {} on {}",
        dashboard.student_id, generated_on
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overall");

    let overall = &dashboard.overall;
    if overall.total == 0 {
        let _ = writeln!(output, "No attendance recorded yet.");
    } else {
        let _ = writeln!(
            output,
            "- {}% attendance across {} sessions",
            overall.attendance_rate, overall.total
        );
        let _ = writeln!(
            output,
            "- present {}, late {}, partial {}, excused {}, absent {}",
            overall.present, overall.late, overall.partial, overall.excused, overall.absent
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Classes");

    if dashboard.classes.is_empty() {
        let _ = writeln!(output, "Not enrolled in any classes.");
    } else {
        for summary in &dashboard.classes {
            let flag = if summary.needs_attention { " (needs attention)" } else { "" };
            let _ = writeln!(
                output,
                "- {} {}: {}% over {} sessions{}",
                summary.class.subject_code,
                summary.class.subject_title.as_deref().unwrap_or(""),
                summary.stats.attendance_rate,
                summary.stats.total,
                flag
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Trend");

    if dashboard.trend.iter().all(|point| point.total_sessions == 0) {
        let _ = writeln!(output, "No sessions in this window.");
    } else {
        for point in &dashboard.trend {
            let _ = writeln!(
                output,
                "- {}: {}% ({} sessions)",
                point.period_label, point.attendance_rate, point.total_sessions
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Alerts");

    if dashboard.alerts.is_empty() {
        let _ = writeln!(output, "No alerts.");
    } else {
        let mut alerts = dashboard.alerts.clone();
        alerts.sort_by_key(|alert| (alert.severity != Severity::High, alert.class.class_id));
        for alert in &alerts {
            let kind = match alert.kind {
                AlertKind::LowAttendance => "low attendance",
                AlertKind::ConsecutiveAbsences => "consecutive absences",
            };
            let severity = match alert.severity {
                Severity::High => "high",
                Severity::Medium => "medium",
            };
            let _ = writeln!(output, "- [{severity}] {kind}: {}", alert.message);
        }
    }

    if let Some(pattern) = pattern {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Day-of-Week Pattern");
        if pattern.by_day.is_empty() {
            let _ = writeln!(output, "No attendance recorded yet.");
        } else {
            for (day, stats) in &pattern.by_day {
                let _ = writeln!(output, "- {}: {}% ({} sessions)", day, stats.attendance_rate, stats.total);
            }
            if let Some(day) = pattern.most_absent_day {
                let _ = writeln!(output, "Most absences fall on {day}.");
            }
        }
    }

    output
}
