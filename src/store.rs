use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{AttendanceRecord, ClassInfo, EnrolledStudent, Identity};

/// Inclusive date window; a missing bound means no restriction on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn since(start: NaiveDate) -> Self {
        DateRange {
            start: Some(start),
            end: None,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub student_id: Option<String>,
    pub class_ids: Option<Vec<i64>>,
    pub range: DateRange,
}

impl RecordFilter {
    pub fn student(student_id: &str) -> Self {
        RecordFilter {
            student_id: Some(student_id.to_string()),
            ..Default::default()
        }
    }

    pub fn class(class_id: i64) -> Self {
        RecordFilter {
            class_ids: Some(vec![class_id]),
            ..Default::default()
        }
    }

    pub fn classes(class_ids: Vec<i64>) -> Self {
        RecordFilter {
            class_ids: Some(class_ids),
            ..Default::default()
        }
    }

    pub fn in_class(mut self, class_id: Option<i64>) -> Self {
        if let Some(id) = class_id {
            self.class_ids = Some(vec![id]);
        }
        self
    }

    pub fn within(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        if let Some(student) = &self.student_id {
            if &record.student_id != student {
                return false;
            }
        }
        if let Some(classes) = &self.class_ids {
            if !classes.contains(&record.class_id) {
                return false;
            }
        }
        self.range.contains(record.date)
    }
}

/// Read side of the attendance tables. Implementations return records newest
/// first and never include soft-deleted rows.
#[async_trait]
pub trait AttendanceRecordStore: Send + Sync {
    async fn fetch_records(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>>;

    async fn class_info(&self, class_ids: &[i64]) -> Result<HashMap<i64, ClassInfo>>;

    async fn classes_for_student(&self, student_id: &str) -> Result<Vec<ClassInfo>>;

    async fn classes_for_faculty(&self, faculty_id: Uuid) -> Result<Vec<ClassInfo>>;

    async fn enrolled_students(&self, class_id: i64) -> Result<Vec<EnrolledStudent>>;

    async fn resolve_identity(&self, raw_id: &str) -> Result<Identity>;
}

#[derive(Debug, Clone)]
struct Enrollment {
    class_id: i64,
    student: EnrolledStudent,
    senior_high: bool,
}

/// Store held entirely in memory; used by tests and by callers that already
/// have the rows loaded.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Vec<(AttendanceRecord, bool)>,
    classes: Vec<ClassInfo>,
    enrollments: Vec<Enrollment>,
    faculty: BTreeSet<Uuid>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, class: ClassInfo) {
        if let Some(faculty_id) = class.faculty_id {
            self.faculty.insert(faculty_id);
        }
        self.classes.push(class);
    }

    pub fn enroll(&mut self, class_id: i64, student_id: &str, display_name: &str) {
        self.push_enrollment(class_id, student_id, display_name, false);
    }

    pub fn enroll_senior_high(&mut self, class_id: i64, student_id: &str, display_name: &str) {
        self.push_enrollment(class_id, student_id, display_name, true);
    }

    fn push_enrollment(&mut self, class_id: i64, student_id: &str, name: &str, senior_high: bool) {
        self.enrollments.push(Enrollment {
            class_id,
            student: EnrolledStudent {
                student_id: student_id.to_string(),
                display_name: name.to_string(),
            },
            senior_high,
        });
    }

    pub fn add_faculty(&mut self, faculty_id: Uuid) {
        self.faculty.insert(faculty_id);
    }

    /// Records without an id get one past the highest id stored so far.
    pub fn add_record(&mut self, mut record: AttendanceRecord) -> i64 {
        if record.id == 0 {
            record.id = self.records.iter().map(|(r, _)| r.id).max().unwrap_or(0) + 1;
        }
        let id = record.id;
        self.records.push((record, false));
        id
    }

    /// Tombstones a record; it stays stored but is no longer returned.
    pub fn soft_delete(&mut self, record_id: i64) -> bool {
        match self.records.iter_mut().find(|(r, _)| r.id == record_id) {
            Some((_, deleted)) => {
                *deleted = true;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AttendanceRecordStore for MemoryStore {
    async fn fetch_records(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>> {
        let mut records: Vec<AttendanceRecord> = self
            .records
            .iter()
            .filter(|(record, deleted)| !deleted && filter.matches(record))
            .map(|(record, _)| record.clone())
            .collect();
        records.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| a.student_id.cmp(&b.student_id))
        });
        Ok(records)
    }

    async fn class_info(&self, class_ids: &[i64]) -> Result<HashMap<i64, ClassInfo>> {
        Ok(self
            .classes
            .iter()
            .filter(|class| class_ids.contains(&class.class_id))
            .map(|class| (class.class_id, class.clone()))
            .collect())
    }

    async fn classes_for_student(&self, student_id: &str) -> Result<Vec<ClassInfo>> {
        let ids: BTreeSet<i64> = self
            .enrollments
            .iter()
            .filter(|e| e.student.student_id == student_id)
            .map(|e| e.class_id)
            .collect();
        Ok(self
            .classes
            .iter()
            .filter(|class| ids.contains(&class.class_id))
            .cloned()
            .collect())
    }

    async fn classes_for_faculty(&self, faculty_id: Uuid) -> Result<Vec<ClassInfo>> {
        Ok(self
            .classes
            .iter()
            .filter(|class| class.faculty_id == Some(faculty_id))
            .cloned()
            .collect())
    }

    async fn enrolled_students(&self, class_id: i64) -> Result<Vec<EnrolledStudent>> {
        Ok(self
            .enrollments
            .iter()
            .filter(|e| e.class_id == class_id)
            .map(|e| e.student.clone())
            .collect())
    }

    async fn resolve_identity(&self, raw_id: &str) -> Result<Identity> {
        if let Some(e) = self.enrollments.iter().find(|e| e.student.student_id == raw_id) {
            return Ok(if e.senior_high {
                Identity::ShsStudent(raw_id.to_string())
            } else {
                Identity::Student(raw_id.to_string())
            });
        }
        if let Ok(id) = Uuid::parse_str(raw_id) {
            if self.faculty.contains(&id) {
                return Ok(Identity::Faculty(id));
            }
        }
        Err(crate::error::AttendanceError::UnknownIdentity(
            raw_id.to_string(),
        ))
    }
}
