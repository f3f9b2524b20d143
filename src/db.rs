use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{AttendanceError, Result};
use crate::models::{AttendanceRecord, AttendanceStatus, ClassInfo, EnrolledStudent, Identity};
use crate::stats::calculate_stats_from_raw;
use crate::store::{AttendanceRecordStore, RecordFilter};

pub async fn connect(settings: &Settings) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to Postgres")
}

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed record store over the `attendance_insights` schema.
#[derive(Clone)]
pub struct PgAttendanceStore {
    pool: PgPool,
}

impl PgAttendanceStore {
    pub fn new(pool: PgPool) -> Self {
        PgAttendanceStore { pool }
    }
}

fn record_from_row(row: &PgRow) -> Result<AttendanceRecord> {
    let status: String = row.try_get("status")?;
    Ok(AttendanceRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        class_id: row.try_get("class_id")?,
        date: row.try_get("date")?,
        status: status.parse()?,
        remarks: row.try_get("remarks")?,
        marked_at: row.try_get("marked_at")?,
        marked_by: row.try_get("marked_by")?,
        ip_address: row.try_get("ip_address")?,
        location: row.try_get("location_data")?,
    })
}

fn class_from_row(row: &PgRow) -> Result<ClassInfo> {
    Ok(ClassInfo {
        class_id: row.try_get("id")?,
        subject_code: row.try_get("subject_code")?,
        subject_title: row.try_get("subject_title")?,
        faculty_id: row.try_get("faculty_id")?,
    })
}

const CLASS_COLUMNS: &str = "c.id, c.subject_code, c.subject_title, c.faculty_id";

#[async_trait]
impl AttendanceRecordStore for PgAttendanceStore {
    async fn fetch_records(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>> {
        let mut query = String::from(
            "SELECT id, student_id, class_id, date, status, remarks, marked_at, marked_by, \
             ip_address, location_data \
             FROM attendance_insights.attendances \
             WHERE deleted_at IS NULL",
        );
        let mut param = 0;
        let mut next = || {
            param += 1;
            param
        };

        if filter.student_id.is_some() {
            query.push_str(&format!(" AND student_id = ${}", next()));
        }
        if filter.class_ids.is_some() {
            query.push_str(&format!(" AND class_id = ANY(${})", next()));
        }
        if filter.range.start.is_some() {
            query.push_str(&format!(" AND date >= ${}", next()));
        }
        if filter.range.end.is_some() {
            query.push_str(&format!(" AND date <= ${}", next()));
        }
        query.push_str(" ORDER BY date DESC, student_id");

        let mut rows = sqlx::query(&query);
        if let Some(student) = &filter.student_id {
            rows = rows.bind(student);
        }
        if let Some(classes) = &filter.class_ids {
            rows = rows.bind(classes);
        }
        if let Some(start) = filter.range.start {
            rows = rows.bind(start);
        }
        if let Some(end) = filter.range.end {
            rows = rows.bind(end);
        }

        let fetched = rows.fetch_all(&self.pool).await?;
        log::debug!("fetched {} attendance rows for {:?}", fetched.len(), filter);
        fetched.iter().map(record_from_row).collect()
    }

    async fn class_info(&self, class_ids: &[i64]) -> Result<HashMap<i64, ClassInfo>> {
        let rows = sqlx::query(&format!(
            "SELECT {CLASS_COLUMNS} FROM attendance_insights.classes c WHERE c.id = ANY($1)"
        ))
        .bind(class_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| class_from_row(row).map(|class| (class.class_id, class)))
            .collect()
    }

    async fn classes_for_student(&self, student_id: &str) -> Result<Vec<ClassInfo>> {
        let rows = sqlx::query(&format!(
            "SELECT {CLASS_COLUMNS} FROM attendance_insights.classes c \
             JOIN attendance_insights.class_enrollments e ON e.class_id = c.id \
             WHERE e.student_id = $1 ORDER BY c.id"
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(class_from_row).collect()
    }

    async fn classes_for_faculty(&self, faculty_id: Uuid) -> Result<Vec<ClassInfo>> {
        let rows = sqlx::query(&format!(
            "SELECT {CLASS_COLUMNS} FROM attendance_insights.classes c \
             WHERE c.faculty_id = $1 ORDER BY c.id"
        ))
        .bind(faculty_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(class_from_row).collect()
    }

    async fn enrolled_students(&self, class_id: i64) -> Result<Vec<EnrolledStudent>> {
        let rows = sqlx::query(
            r#"
            SELECT e.student_id,
                   COALESCE(s.last_name || ', ' || s.first_name, shs.fullname, e.student_id) AS display_name
            FROM attendance_insights.class_enrollments e
            LEFT JOIN attendance_insights.students s ON s.id = e.student_id
            LEFT JOIN attendance_insights.shs_students shs ON shs.student_lrn = e.student_id
            WHERE e.class_id = $1
            ORDER BY display_name
            "#,
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;

        let mut students = Vec::with_capacity(rows.len());
        for row in rows {
            students.push(EnrolledStudent {
                student_id: row.try_get("student_id")?,
                display_name: row.try_get("display_name")?,
            });
        }
        Ok(students)
    }

    async fn resolve_identity(&self, raw_id: &str) -> Result<Identity> {
        let student = sqlx::query("SELECT 1 FROM attendance_insights.students WHERE id = $1")
            .bind(raw_id)
            .fetch_optional(&self.pool)
            .await?;
        if student.is_some() {
            return Ok(Identity::Student(raw_id.to_string()));
        }

        let shs = sqlx::query("SELECT 1 FROM attendance_insights.shs_students WHERE student_lrn = $1")
            .bind(raw_id)
            .fetch_optional(&self.pool)
            .await?;
        if shs.is_some() {
            return Ok(Identity::ShsStudent(raw_id.to_string()));
        }

        if let Ok(id) = Uuid::parse_str(raw_id) {
            let faculty = sqlx::query("SELECT 1 FROM attendance_insights.faculty WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            if faculty.is_some() {
                return Ok(Identity::Faculty(id));
            }
        }

        Err(AttendanceError::UnknownIdentity(raw_id.to_string()))
    }
}

pub const SEED_FACULTY_ID: &str = "7b4f2c1e-5a0d-4c8e-9f3a-2d6e8b1c4a90";

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let faculty_id = Uuid::parse_str(SEED_FACULTY_ID)?;
    sqlx::query(
        r#"
        INSERT INTO attendance_insights.faculty (id, first_name, last_name, email)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO NOTHING
        "#,
    )
    .bind(faculty_id)
    .bind("Maria")
    .bind("Santos")
    .bind("maria.santos@dccp.edu.ph")
    .execute(pool)
    .await?;

    let students = vec![
        ("2024-0001", "Avery", "Lee"),
        ("2024-0002", "Jules", "Moreno"),
    ];
    for (id, first, last) in &students {
        sqlx::query(
            r#"
            INSERT INTO attendance_insights.students (id, first_name, last_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name
            "#,
        )
        .bind(*id)
        .bind(*first)
        .bind(*last)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO attendance_insights.shs_students (student_lrn, fullname)
        VALUES ($1, $2)
        ON CONFLICT (student_lrn) DO NOTHING
        "#,
    )
    .bind("LRN-104455")
    .bind("Kiara Patel")
    .execute(pool)
    .await?;

    let classes = vec![
        ("IT101", "Introduction to Computing"),
        ("MATH1", "College Algebra"),
    ];
    let mut class_ids = Vec::new();
    for (code, title) in &classes {
        let id: i64 = sqlx::query(
            r#"
            INSERT INTO attendance_insights.classes (subject_code, subject_title, faculty_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (subject_code) DO UPDATE
            SET subject_title = EXCLUDED.subject_title, faculty_id = EXCLUDED.faculty_id
            RETURNING id
            "#,
        )
        .bind(*code)
        .bind(*title)
        .bind(faculty_id)
        .fetch_one(pool)
        .await?
        .get("id");
        class_ids.push(id);
    }

    for class_id in &class_ids {
        for student_id in ["2024-0001", "2024-0002", "LRN-104455"] {
            enroll(pool, *class_id, student_id).await?;
        }
    }

    // Four weeks of Monday/Wednesday/Friday sessions ending today.
    let today = Utc::now().date_naive();
    let mut date = today - Duration::weeks(4);
    let mut session = 0usize;
    while date <= today {
        if matches!(date.weekday(), Weekday::Mon | Weekday::Wed | Weekday::Fri) {
            for (i, class_id) in class_ids.iter().enumerate() {
                let statuses = [
                    seed_status(session, 0, i),
                    seed_status(session, 1, i),
                    seed_status(session, 2, i),
                ];
                for (student_id, status) in ["2024-0001", "2024-0002", "LRN-104455"]
                    .iter()
                    .zip(statuses)
                {
                    mark(pool, *class_id, student_id, date, status, None, Some(faculty_id)).await?;
                }
            }
            session += 1;
        }
        date += Duration::days(1);
    }

    Ok(())
}

// Avery is steady, Jules drifts late, Kiara misses the recent stretch of IT101.
fn seed_status(session: usize, student: usize, class: usize) -> AttendanceStatus {
    match (student, class) {
        (0, _) if session % 7 == 6 => AttendanceStatus::Excused,
        (0, _) => AttendanceStatus::Present,
        (1, _) if session % 3 == 0 => AttendanceStatus::Late,
        (1, _) if session % 5 == 4 => AttendanceStatus::Absent,
        (1, _) => AttendanceStatus::Present,
        (_, 0) if session >= 8 => AttendanceStatus::Absent,
        (_, _) if session % 4 == 1 => AttendanceStatus::Partial,
        _ => AttendanceStatus::Present,
    }
}

async fn enroll(pool: &PgPool, class_id: i64, student_id: &str) -> anyhow::Result<i64> {
    let id: i64 = sqlx::query(
        r#"
        INSERT INTO attendance_insights.class_enrollments (class_id, student_id)
        VALUES ($1, $2)
        ON CONFLICT (class_id, student_id) DO UPDATE SET student_id = EXCLUDED.student_id
        RETURNING id
        "#,
    )
    .bind(class_id)
    .bind(student_id)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

/// Upserts one session's attendance; the student must be enrolled in the class.
pub async fn mark(
    pool: &PgPool,
    class_id: i64,
    student_id: &str,
    date: NaiveDate,
    status: AttendanceStatus,
    remarks: Option<&str>,
    marked_by: Option<Uuid>,
) -> anyhow::Result<bool> {
    let enrollment_id: i64 = sqlx::query(
        "SELECT id FROM attendance_insights.class_enrollments WHERE class_id = $1 AND student_id = $2",
    )
    .bind(class_id)
    .bind(student_id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("student {student_id} is not enrolled in class {class_id}"))?
    .get("id");

    let marked_at: NaiveDateTime = Utc::now().naive_utc();
    let result = sqlx::query(
        r#"
        INSERT INTO attendance_insights.attendances
        (class_enrollment_id, student_id, class_id, date, status, remarks, marked_at, marked_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (student_id, class_id, date) WHERE deleted_at IS NULL DO UPDATE
        SET status = EXCLUDED.status, remarks = EXCLUDED.remarks,
            marked_at = EXCLUDED.marked_at, marked_by = EXCLUDED.marked_by,
            updated_at = NOW()
        "#,
    )
    .bind(enrollment_id)
    .bind(student_id)
    .bind(class_id)
    .bind(date)
    .bind(status.as_str())
    .bind(remarks)
    .bind(marked_at)
    .bind(marked_by)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

const SOFT_DELETE: &str = "UPDATE attendance_insights.attendances SET deleted_at = NOW() \
                           WHERE id = $1 AND deleted_at IS NULL";

/// Tombstones a record so it drops out of every aggregate. Returns false when
/// the id is unknown or already deleted.
pub async fn soft_delete(pool: &PgPool, record_id: i64) -> anyhow::Result<bool> {
    let result = sqlx::query(SOFT_DELETE).bind(record_id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

#[derive(Debug, serde::Deserialize)]
pub struct CsvRow {
    pub student_id: String,
    pub subject_code: String,
    pub date: NaiveDate,
    pub status: String,
    pub remarks: Option<String>,
    pub marked_by: Option<Uuid>,
}

/// Imports marks from a CSV file. Every status is checked before the first
/// row is written, so a bad file leaves the database untouched.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = reader
        .deserialize::<CsvRow>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("failed to read {}", csv_path.display()))?;

    let statuses: Vec<&str> = rows.iter().map(|row| row.status.as_str()).collect();
    let stats = calculate_stats_from_raw(&statuses)
        .with_context(|| format!("invalid status in {}", csv_path.display()))?;
    log::info!(
        "importing {} rows from {} ({}% attendance)",
        stats.total,
        csv_path.display(),
        stats.attendance_rate
    );

    let mut imported = 0usize;
    for (line, row) in rows.iter().enumerate() {
        let status: AttendanceStatus = row.status.parse()?;

        let class_id: i64 = sqlx::query(
            "SELECT id FROM attendance_insights.classes WHERE subject_code = $1",
        )
        .bind(&row.subject_code)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("row {}: unknown class {}", line + 1, row.subject_code))?
        .get("id");

        enroll(pool, class_id, &row.student_id).await?;
        if mark(
            pool,
            class_id,
            &row.student_id,
            row.date,
            status,
            row.remarks.as_deref().filter(|r| !r.is_empty()),
            row.marked_by,
        )
        .await?
        {
            imported += 1;
        }
    }

    log::info!("imported {imported} attendance rows from {}", csv_path.display());
    Ok(imported)
}
