use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AttendanceError, Result};
use crate::analytics::count_sessions;
use crate::models::{AggregatedStats, AttendanceRecord, ClassInfo};
use crate::stats::calculate_stats;
use crate::store::{AttendanceRecordStore, DateRange, RecordFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Excel,
    Pdf,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xlsx",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "excel",
            ExportFormat::Pdf => "pdf",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "csv" => Ok(ExportFormat::Csv),
            "excel" => Ok(ExportFormat::Excel),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(format!("unsupported export format: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatRow {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Class")]
    pub class: String,
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Remarks")]
    pub remarks: String,
    #[serde(rename = "Marked At")]
    pub marked_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportBundle {
    pub rows: Vec<FlatRow>,
    /// Without extension; see [`ExportFormat::extension`].
    pub filename: String,
    pub stats: AggregatedStats,
    pub format: ExportFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentSummaryRow {
    #[serde(rename = "Student ID")]
    pub student_id: String,
    #[serde(rename = "Student Name")]
    pub student_name: String,
    #[serde(rename = "Total Sessions")]
    pub total: usize,
    #[serde(rename = "Present")]
    pub present: usize,
    #[serde(rename = "Absent")]
    pub absent: usize,
    #[serde(rename = "Late")]
    pub late: usize,
    #[serde(rename = "Excused")]
    pub excused: usize,
    #[serde(rename = "Partial")]
    pub partial: usize,
    #[serde(rename = "Attendance Rate (%)")]
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassReport {
    pub class: ClassInfo,
    pub period: DateSpan,
    pub rows: Vec<StudentSummaryRow>,
    pub summary: AggregatedStats,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacultySummaryRow {
    #[serde(rename = "Class")]
    pub class: String,
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "Total Students")]
    pub total_students: usize,
    #[serde(rename = "Total Sessions")]
    pub total_sessions: usize,
    #[serde(rename = "Overall Attendance Rate (%)")]
    pub attendance_rate: f64,
    #[serde(rename = "Present Count")]
    pub present_count: usize,
    #[serde(rename = "Absent Count")]
    pub absent: usize,
    #[serde(rename = "Late Count")]
    pub late: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacultySummary {
    pub faculty_id: Uuid,
    pub period: DateSpan,
    pub rows: Vec<FacultySummaryRow>,
    pub filename: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

pub fn flat_row(record: &AttendanceRecord, class: &ClassInfo) -> FlatRow {
    FlatRow {
        date: record.date.format("%Y-%m-%d").to_string(),
        class: class.subject_code.clone(),
        subject: class.subject_title.clone().unwrap_or_default(),
        status: record.status.label().to_string(),
        remarks: record.remarks.clone().unwrap_or_default(),
        marked_at: record
            .marked_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
    }
}

pub fn student_filename(student_id: &str, today: NaiveDate) -> String {
    format!("attendance_report_{}_{}", student_id, today.format("%Y-%m-%d"))
}

/// Flattens a student's records, newest first, for file export. Rendering to
/// the requested format happens downstream.
pub async fn export_student_attendance<S>(
    store: &S,
    student_id: &str,
    class_id: Option<i64>,
    range: DateRange,
    format: ExportFormat,
    today: NaiveDate,
) -> Result<ExportBundle>
where
    S: AttendanceRecordStore + ?Sized,
{
    let filter = RecordFilter::student(student_id)
        .in_class(class_id)
        .within(range);
    let mut records = store.fetch_records(&filter).await?;
    records.sort_by(|a, b| b.date.cmp(&a.date));

    let mut class_ids: Vec<i64> = records.iter().map(|r| r.class_id).collect();
    class_ids.sort_unstable();
    class_ids.dedup();
    let classes = if class_ids.is_empty() {
        Default::default()
    } else {
        store.class_info(&class_ids).await?
    };

    let rows = records
        .iter()
        .map(|record| {
            classes
                .get(&record.class_id)
                .map(|class| flat_row(record, class))
                .ok_or(AttendanceError::MissingClass(record.class_id))
        })
        .collect::<Result<Vec<_>>>()?;

    log::debug!("exporting {} rows for student {}", rows.len(), student_id);

    Ok(ExportBundle {
        stats: calculate_stats(&records),
        rows,
        filename: student_filename(student_id, today),
        format,
    })
}

/// Per-student summary of one class over `start..=end`, in roster order.
pub async fn export_class_report<S>(
    store: &S,
    class_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<ClassReport>
where
    S: AttendanceRecordStore + ?Sized,
{
    let class = store
        .class_info(&[class_id])
        .await?
        .remove(&class_id)
        .ok_or(AttendanceError::MissingClass(class_id))?;
    let range = DateRange::between(start, end);
    let records = store
        .fetch_records(&RecordFilter::class(class_id).within(range))
        .await?;

    let mut rows = Vec::new();
    for student in store.enrolled_students(class_id).await? {
        let mine: Vec<AttendanceRecord> = records
            .iter()
            .filter(|r| r.student_id == student.student_id)
            .cloned()
            .collect();
        let stats = calculate_stats(&mine);
        rows.push(StudentSummaryRow {
            student_id: student.student_id,
            student_name: student.display_name,
            total: stats.total,
            present: stats.present,
            absent: stats.absent,
            late: stats.late,
            excused: stats.excused,
            partial: stats.partial,
            attendance_rate: stats.attendance_rate,
        });
    }

    let filename = format!(
        "class_attendance_{}_{}_to_{}",
        class.subject_code,
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    );

    Ok(ClassReport {
        summary: calculate_stats(&records),
        class,
        period: DateSpan { start, end },
        rows,
        filename,
    })
}

/// One row per class the faculty member teaches, over `start..=end`.
pub async fn export_faculty_summary<S>(
    store: &S,
    faculty_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<FacultySummary>
where
    S: AttendanceRecordStore + ?Sized,
{
    let range = DateRange::between(start, end);
    let mut rows = Vec::new();

    for class in store.classes_for_faculty(faculty_id).await? {
        let records = store
            .fetch_records(&RecordFilter::class(class.class_id).within(range))
            .await?;
        let stats = calculate_stats(&records);
        rows.push(FacultySummaryRow {
            total_students: store.enrolled_students(class.class_id).await?.len(),
            total_sessions: count_sessions(&records),
            attendance_rate: stats.attendance_rate,
            present_count: stats.present_count,
            absent: stats.absent,
            late: stats.late,
            class: class.subject_code,
            subject: class.subject_title.unwrap_or_default(),
        });
    }

    log::debug!("faculty {} summary: {} classes", faculty_id, rows.len());

    Ok(FacultySummary {
        faculty_id,
        period: DateSpan { start, end },
        rows,
        filename: format!(
            "faculty_summary_{}_{}_to_{}",
            faculty_id,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        ),
    })
}
