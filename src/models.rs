use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::error::AttendanceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
    Partial,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 5] = [
        AttendanceStatus::Present,
        AttendanceStatus::Absent,
        AttendanceStatus::Late,
        AttendanceStatus::Excused,
        AttendanceStatus::Partial,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
            AttendanceStatus::Partial => "partial",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Late => "Late",
            AttendanceStatus::Excused => "Excused",
            AttendanceStatus::Partial => "Partial",
        }
    }

    /// Present, late and partial all count towards the attendance rate.
    pub fn is_present(self) -> bool {
        matches!(
            self,
            AttendanceStatus::Present | AttendanceStatus::Late | AttendanceStatus::Partial
        )
    }

    pub fn is_absent(self) -> bool {
        self == AttendanceStatus::Absent
    }
}

impl FromStr for AttendanceStatus {
    type Err = AttendanceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            "excused" => Ok(AttendanceStatus::Excused),
            "partial" => Ok(AttendanceStatus::Partial),
            other => Err(AttendanceError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub student_id: String,
    pub class_id: i64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub remarks: Option<String>,
    pub marked_at: Option<NaiveDateTime>,
    pub marked_by: Option<Uuid>,
    pub ip_address: Option<String>,
    pub location: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassInfo {
    pub class_id: i64,
    pub subject_code: String,
    pub subject_title: Option<String>,
    pub faculty_id: Option<Uuid>,
}

impl ClassInfo {
    pub fn class_ref(&self) -> ClassRef {
        ClassRef {
            class_id: self.class_id,
            subject_code: self.subject_code.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClassRef {
    pub class_id: i64,
    pub subject_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrolledStudent {
    pub student_id: String,
    pub display_name: String,
}

/// Who is asking, resolved once from the raw id at the edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Identity {
    Student(String),
    ShsStudent(String),
    Faculty(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregatedStats {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
    pub partial: usize,
    pub present_count: usize,
    pub attendance_rate: f64,
    pub absence_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub period_label: String,
    pub week_start: NaiveDate,
    pub attendance_rate: f64,
    pub total_sessions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodStats {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub stats: AggregatedStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LowAttendance,
    ConsecutiveAbsences,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    pub class: ClassRef,
    pub message: String,
    pub stats: Option<AggregatedStats>,
    pub consecutive_count: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(date: NaiveDate) -> Self {
        YearMonth {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Long form such as `March 2026`.
    pub fn label(&self) -> String {
        match NaiveDate::from_ymd_opt(self.year, self.month, 1) {
            Some(first) => first.format("%B %Y").to_string(),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Weekday ordered Monday first, displayed as its full English name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DayOfWeek(pub Weekday);

impl DayOfWeek {
    pub fn of(date: NaiveDate) -> Self {
        DayOfWeek(date.weekday())
    }

    pub fn name(&self) -> &'static str {
        match self.0 {
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
            Weekday::Sun => "Sunday",
        }
    }
}

impl Ord for DayOfWeek {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .num_days_from_monday()
            .cmp(&other.0.num_days_from_monday())
    }
}

impl PartialOrd for DayOfWeek {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for DayOfWeek {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_is_exact() {
        for status in AttendanceStatus::ALL {
            assert_eq!(status.as_str().parse::<AttendanceStatus>().unwrap(), status);
        }
        let err = "Present".parse::<AttendanceStatus>().unwrap_err();
        assert!(matches!(err, AttendanceError::UnknownStatus(ref v) if v == "Present"));
        assert!("tardy".parse::<AttendanceStatus>().is_err());
    }

    #[test]
    fn present_equivalents() {
        assert!(AttendanceStatus::Late.is_present());
        assert!(AttendanceStatus::Partial.is_present());
        assert!(!AttendanceStatus::Excused.is_present());
        assert!(!AttendanceStatus::Excused.is_absent());
        assert!(AttendanceStatus::Absent.is_absent());
    }

    #[test]
    fn day_of_week_orders_monday_first() {
        let sunday = DayOfWeek(Weekday::Sun);
        let monday = DayOfWeek(Weekday::Mon);
        assert!(monday < sunday);
        assert_eq!(sunday.to_string(), "Sunday");
    }

    #[test]
    fn year_month_formats() {
        let ym = YearMonth::of(NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
        assert_eq!(ym.to_string(), "2026-03");
        assert_eq!(ym.label(), "March 2026");
        assert_eq!(serde_json::to_string(&ym).unwrap(), "\"2026-03\"");
    }

    #[test]
    fn alert_kind_serializes_under_type() {
        let alert = Alert {
            kind: AlertKind::ConsecutiveAbsences,
            severity: Severity::High,
            class: ClassRef {
                class_id: 1,
                subject_code: "IT101".into(),
            },
            message: "You have 3 consecutive absences in IT101".into(),
            stats: None,
            consecutive_count: Some(3),
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "consecutive_absences");
        assert_eq!(json["severity"], "high");
        assert!(json.get("kind").is_none());
    }
}
