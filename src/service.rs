use std::collections::{BTreeMap, BTreeSet};

use chrono::{Months, NaiveDate};
use serde::Serialize;
use uuid::Uuid;

use crate::analytics::{
    self, ClassComparison, FacultyAnalytics, SessionSummary, StudentInsight, StudentInsights,
    TimePatterns,
};
use crate::error::{AttendanceError, Result};
use crate::models::{
    AggregatedStats, Alert, AttendanceRecord, ClassInfo, ClassRef, EnrolledStudent, Identity,
    PeriodStats, TrendPoint, YearMonth,
};
use crate::risk::{self, AlertThresholds};
use crate::stats::{calculate_stats, combine};
use crate::store::{AttendanceRecordStore, DateRange, RecordFilter};
use crate::trend::{self, AttendancePattern, Granularity, DEFAULT_WEEKS_BACK};

const RECENT_DAYS: i64 = 30;
const FACULTY_TREND_WEEKS: u32 = 4;
const RECENT_SESSION_COUNT: usize = 5;
/// Lookback for faculty analytics when no start date is given.
const ANALYTICS_MONTHS: u32 = 3;
pub const DEFAULT_SESSION_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct ClassSummary {
    pub class: ClassInfo,
    pub stats: AggregatedStats,
    pub recent: Vec<AttendanceRecord>,
    pub last_attendance: Option<AttendanceRecord>,
    pub needs_attention: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentDashboard {
    pub student_id: String,
    pub classes: Vec<ClassSummary>,
    pub overall: AggregatedStats,
    pub trend: Vec<TrendPoint>,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthHistory {
    pub month: YearMonth,
    pub label: String,
    pub records: Vec<AttendanceRecord>,
    pub stats: AggregatedStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentHistory {
    pub months: Vec<MonthHistory>,
    pub total_records: usize,
    pub overall: AggregatedStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassDetails {
    pub class: ClassInfo,
    pub stats: AggregatedStats,
    pub monthly: BTreeMap<YearMonth, AggregatedStats>,
    pub recent_sessions: Vec<AttendanceRecord>,
    pub pattern: AttendancePattern,
}

#[derive(Debug, Clone, Serialize)]
pub struct FacultyDashboard {
    pub faculty_id: Uuid,
    pub total_classes: usize,
    /// Enrollment rows across the faculty's classes.
    pub total_students: usize,
    pub recent_stats: AggregatedStats,
    pub classes_needing_attention: usize,
    pub recent_sessions: Vec<SessionSummary>,
    pub trend: Vec<TrendPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastSession {
    pub date: NaiveDate,
    pub stats: AggregatedStats,
    pub days_ago: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FacultyClassSummary {
    pub class: ClassInfo,
    pub enrollment_count: usize,
    pub stats: AggregatedStats,
    pub last_session: Option<LastSession>,
    pub needs_attention: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentAtRisk {
    pub student: EnrolledStudent,
    pub stats: AggregatedStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dashboard {
    Student(StudentDashboard),
    Faculty(FacultyDashboard),
}

/// Read-only attendance views over an injected record store.
pub struct AttendanceService<S> {
    store: S,
    thresholds: AlertThresholds,
}

impl<S: AttendanceRecordStore> AttendanceService<S> {
    pub fn new(store: S, thresholds: AlertThresholds) -> Self {
        AttendanceService { store, thresholds }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    pub async fn student_records(
        &self,
        student_id: &str,
        class_id: Option<i64>,
        range: DateRange,
    ) -> Result<Vec<AttendanceRecord>> {
        let filter = RecordFilter::student(student_id)
            .in_class(class_id)
            .within(range);
        self.store.fetch_records(&filter).await
    }

    pub async fn student_class_stats(&self, student_id: &str, class_id: i64) -> Result<AggregatedStats> {
        let records = self
            .student_records(student_id, Some(class_id), DateRange::default())
            .await?;
        Ok(calculate_stats(&records))
    }

    pub async fn student_overall_stats(&self, student_id: &str) -> Result<AggregatedStats> {
        let records = self
            .student_records(student_id, None, DateRange::default())
            .await?;
        Ok(calculate_stats(&records))
    }

    pub async fn class_stats(&self, class_id: i64, range: DateRange) -> Result<AggregatedStats> {
        let records = self
            .store
            .fetch_records(&RecordFilter::class(class_id).within(range))
            .await?;
        Ok(calculate_stats(&records))
    }

    /// Stats for a single session (one class, one date).
    pub async fn session_stats(&self, class_id: i64, date: NaiveDate) -> Result<AggregatedStats> {
        self.class_stats(class_id, DateRange::between(date, date)).await
    }

    pub async fn weekly_trend(
        &self,
        student_id: &str,
        weeks_back: u32,
        today: NaiveDate,
    ) -> Result<Vec<TrendPoint>> {
        trend::weekly_trend(&self.store, &RecordFilter::student(student_id), weeks_back, today).await
    }

    pub async fn class_trend(
        &self,
        class_id: i64,
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
    ) -> Result<Vec<PeriodStats>> {
        let records = self
            .store
            .fetch_records(&RecordFilter::class(class_id).within(DateRange::between(start, end)))
            .await?;
        Ok(trend::period_trend(&records, start, end, granularity))
    }

    pub async fn student_alerts(&self, student_id: &str, today: NaiveDate) -> Result<Vec<Alert>> {
        let per_class = self.per_class_stats(student_id).await?;
        let since = DateRange::since(self.thresholds.streak_cutoff(today)?);
        let mut recent_by_class = BTreeMap::new();

        for class in per_class.keys() {
            let recent = self
                .student_records(student_id, Some(class.class_id), since)
                .await?;
            recent_by_class.insert(class.clone(), recent);
        }

        risk::evaluate(&per_class, &recent_by_class, &self.thresholds, today)
    }

    pub async fn student_dashboard(&self, student_id: &str, today: NaiveDate) -> Result<StudentDashboard> {
        let classes = self.store.classes_for_student(student_id).await?;
        let recent_since = trend::days_before(today, RECENT_DAYS)?;
        let mut summaries = Vec::with_capacity(classes.len());

        for class in classes {
            let records = self
                .student_records(student_id, Some(class.class_id), DateRange::default())
                .await?;
            let stats = calculate_stats(&records);
            let recent: Vec<AttendanceRecord> = records
                .iter()
                .filter(|r| r.date >= recent_since)
                .take(5)
                .cloned()
                .collect();

            summaries.push(ClassSummary {
                needs_attention: stats.attendance_rate < self.thresholds.low_rate,
                last_attendance: recent.first().cloned(),
                class,
                stats,
                recent,
            });
        }

        let overall = combine(&summaries.iter().map(|s| s.stats).collect::<Vec<_>>());
        let trend = self.weekly_trend(student_id, DEFAULT_WEEKS_BACK, today).await?;
        let alerts = self.student_alerts(student_id, today).await?;

        log::debug!(
            "student {} dashboard: {} classes, {} alerts",
            student_id,
            summaries.len(),
            alerts.len()
        );

        Ok(StudentDashboard {
            student_id: student_id.to_string(),
            classes: summaries,
            overall,
            trend,
            alerts,
        })
    }

    pub async fn student_history(
        &self,
        student_id: &str,
        class_id: Option<i64>,
        range: DateRange,
    ) -> Result<StudentHistory> {
        let records = self.student_records(student_id, class_id, range).await?;

        let months = trend::group_by_month(&records)
            .into_iter()
            .rev()
            .map(|(month, records)| MonthHistory {
                label: month.label(),
                stats: calculate_stats(&records),
                month,
                records,
            })
            .collect();

        Ok(StudentHistory {
            months,
            total_records: records.len(),
            overall: calculate_stats(&records),
        })
    }

    pub async fn class_details(&self, student_id: &str, class_id: i64) -> Result<ClassDetails> {
        let class = self
            .store
            .class_info(&[class_id])
            .await?
            .remove(&class_id)
            .ok_or(crate::error::AttendanceError::MissingClass(class_id))?;
        let records = self
            .student_records(student_id, Some(class_id), DateRange::default())
            .await?;

        Ok(ClassDetails {
            class,
            stats: calculate_stats(&records),
            monthly: trend::monthly_breakdown(&records),
            recent_sessions: records.iter().take(10).cloned().collect(),
            pattern: trend::attendance_pattern(&records),
        })
    }

    pub async fn faculty_dashboard(&self, faculty_id: Uuid, today: NaiveDate) -> Result<FacultyDashboard> {
        let classes = self.store.classes_for_faculty(faculty_id).await?;
        let class_ids: Vec<i64> = classes.iter().map(|c| c.class_id).collect();

        let mut total_students = 0;
        let mut needing_attention = 0;
        for class in &classes {
            total_students += self.store.enrolled_students(class.class_id).await?.len();
            let stats = self.class_stats(class.class_id, DateRange::default()).await?;
            if stats.attendance_rate < self.thresholds.low_rate {
                needing_attention += 1;
            }
        }

        let scope = RecordFilter::classes(class_ids);
        let records = self.store.fetch_records(&scope).await?;
        let since = trend::days_before(today, RECENT_DAYS)?;
        let recent: Vec<AttendanceRecord> = records
            .iter()
            .filter(|r| r.date >= since)
            .cloned()
            .collect();
        let mut recent_sessions = analytics::sessions(&records);
        recent_sessions.truncate(RECENT_SESSION_COUNT);
        let trend = trend::weekly_trend(&self.store, &scope, FACULTY_TREND_WEEKS, today).await?;

        Ok(FacultyDashboard {
            faculty_id,
            total_classes: classes.len(),
            total_students,
            recent_stats: calculate_stats(&recent),
            classes_needing_attention: needing_attention,
            recent_sessions,
            trend,
        })
    }

    /// Every class the faculty member teaches with its all-time stats and
    /// latest session.
    pub async fn faculty_classes(&self, faculty_id: Uuid, today: NaiveDate) -> Result<Vec<FacultyClassSummary>> {
        let classes = self.store.classes_for_faculty(faculty_id).await?;
        let mut summaries = Vec::with_capacity(classes.len());

        for class in classes {
            let enrollment_count = self.store.enrolled_students(class.class_id).await?.len();
            let records = self
                .store
                .fetch_records(&RecordFilter::class(class.class_id))
                .await?;
            let stats = calculate_stats(&records);
            let last_session = analytics::sessions(&records)
                .into_iter()
                .next()
                .map(|session| LastSession {
                    days_ago: today.signed_duration_since(session.date).num_days().abs(),
                    date: session.date,
                    stats: session.stats,
                });

            summaries.push(FacultyClassSummary {
                needs_attention: stats.attendance_rate < self.thresholds.low_rate,
                class,
                enrollment_count,
                stats,
                last_session,
            });
        }

        Ok(summaries)
    }

    /// Dates attendance was taken for a class, newest first.
    pub async fn class_sessions(&self, class_id: i64, limit: usize) -> Result<Vec<SessionSummary>> {
        let records = self.store.fetch_records(&RecordFilter::class(class_id)).await?;
        let mut sessions = analytics::sessions(&records);
        sessions.truncate(limit);
        Ok(sessions)
    }

    /// Overview, weekly trend, class ranking, student buckets, day and month
    /// patterns and recommendations across a faculty member's classes.
    /// Defaults to the three months ending `today`.
    pub async fn faculty_analytics(
        &self,
        faculty_id: Uuid,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<FacultyAnalytics> {
        let end = end.unwrap_or(today);
        let start = match start {
            Some(start) => start,
            None => end.checked_sub_months(Months::new(ANALYTICS_MONTHS)).ok_or_else(|| {
                AttendanceError::InvalidDate(format!("{ANALYTICS_MONTHS} months before {end}"))
            })?,
        };
        if start > end {
            return Err(AttendanceError::InvalidDate(format!("{start} is after {end}")));
        }

        let classes = self.store.classes_for_faculty(faculty_id).await?;
        let scope = RecordFilter::classes(classes.iter().map(|c| c.class_id).collect())
            .within(DateRange::between(start, end));
        let records = self.store.fetch_records(&scope).await?;

        let mut comparison = Vec::with_capacity(classes.len());
        let mut roster: BTreeMap<String, EnrolledStudent> = BTreeMap::new();
        for class in classes {
            let enrolled = self.store.enrolled_students(class.class_id).await?;
            let class_records: Vec<AttendanceRecord> = records
                .iter()
                .filter(|r| r.class_id == class.class_id)
                .cloned()
                .collect();
            comparison.push(ClassComparison::new(class, &class_records, enrolled.len()));
            for student in enrolled {
                roster.entry(student.student_id.clone()).or_insert(student);
            }
        }

        let overview = analytics::overview(&records, roster.len());
        let student_insights = StudentInsights::categorize(roster.into_values().map(|student| {
            let mine: Vec<AttendanceRecord> = records
                .iter()
                .filter(|r| r.student_id == student.student_id)
                .cloned()
                .collect();
            StudentInsight::from_records(student, &mine)
        }));
        let time_patterns = TimePatterns {
            days: trend::attendance_pattern(&records),
            by_month: trend::monthly_breakdown(&records),
        };
        let recommendations = analytics::recommendations(&overview, &time_patterns, &student_insights);

        log::info!(
            "faculty {faculty_id} analytics {start}..{end}: {} records, {} recommendations",
            records.len(),
            recommendations.len()
        );

        Ok(FacultyAnalytics {
            start,
            end,
            trends: trend::period_trend(&records, start, end, Granularity::Week),
            overview,
            class_comparison: analytics::rank_classes(comparison),
            student_insights,
            time_patterns,
            recommendations,
        })
    }

    /// Enrolled students below `threshold` in a class, lowest rate first.
    pub async fn students_with_poor_attendance(
        &self,
        class_id: i64,
        threshold: f64,
    ) -> Result<Vec<StudentAtRisk>> {
        let mut at_risk = Vec::new();
        for student in self.store.enrolled_students(class_id).await? {
            let stats = self.student_class_stats(&student.student_id, class_id).await?;
            if stats.attendance_rate < threshold {
                at_risk.push(StudentAtRisk { student, stats });
            }
        }
        at_risk.sort_by(|a, b| {
            a.stats
                .attendance_rate
                .partial_cmp(&b.stats.attendance_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(at_risk)
    }

    pub async fn per_class_stats(&self, student_id: &str) -> Result<BTreeMap<ClassRef, AggregatedStats>> {
        let mut per_class = BTreeMap::new();
        for class in self.store.classes_for_student(student_id).await? {
            let stats = self.student_class_stats(student_id, class.class_id).await?;
            per_class.insert(class.class_ref(), stats);
        }
        Ok(per_class)
    }

    pub async fn dashboard_for(&self, identity: &Identity, today: NaiveDate) -> Result<Dashboard> {
        match identity {
            Identity::Student(id) | Identity::ShsStudent(id) => {
                Ok(Dashboard::Student(self.student_dashboard(id, today).await?))
            }
            Identity::Faculty(id) => Ok(Dashboard::Faculty(self.faculty_dashboard(*id, today).await?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlertKind;
    use crate::models::AttendanceStatus::*;
    use crate::stats::fixtures::{day, record};
    use crate::store::MemoryStore;

    const TODAY: (i32, u32, u32) = (2026, 10, 16);

    fn today() -> NaiveDate {
        day(TODAY.0, TODAY.1, TODAY.2)
    }

    fn service(faculty: Uuid) -> AttendanceService<MemoryStore> {
        let mut store = MemoryStore::new();
        store.add_class(ClassInfo {
            class_id: 1,
            subject_code: "IT101".into(),
            subject_title: Some("Intro to Computing".into()),
            faculty_id: Some(faculty),
        });
        store.add_class(ClassInfo {
            class_id: 2,
            subject_code: "MATH1".into(),
            subject_title: Some("College Algebra".into()),
            faculty_id: Some(faculty),
        });
        store.enroll(1, "S-1", "Lee, Avery");
        store.enroll(2, "S-1", "Lee, Avery");
        store.enroll(1, "S-2", "Moreno, Jules");

        // S-1 skips IT101 three sessions running
        for (d, status) in [(6, Present), (8, Present), (13, Absent), (14, Absent), (15, Absent)] {
            store.add_record(record("S-1", 1, day(2026, 10, d), status));
        }
        for d in [6, 8, 13, 15] {
            store.add_record(record("S-1", 2, day(2026, 10, d), Present));
        }
        for d in [6, 8, 13] {
            store.add_record(record("S-2", 1, day(2026, 10, d), Late));
        }
        store.add_record(record("S-2", 1, day(2026, 10, 15), Excused));

        AttendanceService::new(store, AlertThresholds::default())
    }

    #[tokio::test]
    async fn student_dashboard_composes_stats_trend_and_alerts() {
        let dashboard = service(Uuid::new_v4())
            .student_dashboard("S-1", today())
            .await
            .unwrap();

        assert_eq!(dashboard.classes.len(), 2);
        let it = &dashboard.classes[0];
        assert_eq!(it.stats.attendance_rate, 40.0);
        assert!(it.needs_attention);
        assert_eq!(it.recent.len(), 5);
        assert_eq!(it.last_attendance.as_ref().map(|r| r.date), Some(day(2026, 10, 15)));
        assert!(!dashboard.classes[1].needs_attention);

        assert_eq!(dashboard.overall.total, 9);
        assert_eq!(dashboard.overall.present_count, 6);
        assert_eq!(dashboard.overall.attendance_rate, 66.67);

        assert_eq!(dashboard.trend.len(), 8);
        assert_eq!(dashboard.trend[7].total_sessions, 5);

        let kinds: BTreeSet<_> = dashboard
            .alerts
            .iter()
            .map(|a| (a.class.class_id, format!("{:?}", a.kind)))
            .collect();
        assert_eq!(kinds.len(), 2);
        assert!(dashboard
            .alerts
            .iter()
            .any(|a| a.kind == AlertKind::ConsecutiveAbsences && a.consecutive_count == Some(3)));
    }

    #[tokio::test]
    async fn faculty_dashboard_covers_all_classes() {
        let faculty = Uuid::new_v4();
        let svc = service(faculty);
        let dashboard = svc.faculty_dashboard(faculty, today()).await.unwrap();
        assert_eq!(dashboard.total_classes, 2);
        // S-1 is enrolled twice, once per class
        assert_eq!(dashboard.total_students, 3);
        assert_eq!(dashboard.recent_stats.total, 13);
        assert_eq!(dashboard.classes_needing_attention, 1);
        assert_eq!(dashboard.trend.len(), 4);

        let sessions: Vec<(i64, NaiveDate)> = dashboard
            .recent_sessions
            .iter()
            .map(|s| (s.class_id, s.date))
            .collect();
        assert_eq!(
            sessions,
            vec![
                (1, day(2026, 10, 15)),
                (2, day(2026, 10, 15)),
                (1, day(2026, 10, 14)),
                (1, day(2026, 10, 13)),
                (2, day(2026, 10, 13)),
            ]
        );
    }

    #[tokio::test]
    async fn faculty_classes_carry_last_session() {
        let faculty = Uuid::new_v4();
        let classes = service(faculty).faculty_classes(faculty, today()).await.unwrap();
        assert_eq!(classes.len(), 2);

        let it = &classes[0];
        assert_eq!(it.enrollment_count, 2);
        assert_eq!(it.stats.total, 9);
        assert!(it.needs_attention);
        let last = it.last_session.as_ref().unwrap();
        assert_eq!(last.date, day(2026, 10, 15));
        assert_eq!(last.days_ago, 1);
        assert_eq!(last.stats.total, 2);

        assert_eq!(classes[1].enrollment_count, 1);
        assert!(!classes[1].needs_attention);
    }

    #[tokio::test]
    async fn class_sessions_are_newest_first_and_limited() {
        let svc = service(Uuid::new_v4());
        let sessions = svc.class_sessions(1, DEFAULT_SESSION_LIMIT).await.unwrap();
        let dates: Vec<NaiveDate> = sessions.iter().map(|s| s.date).collect();
        assert_eq!(
            dates,
            vec![
                day(2026, 10, 15),
                day(2026, 10, 14),
                day(2026, 10, 13),
                day(2026, 10, 8),
                day(2026, 10, 6),
            ]
        );
        assert_eq!(sessions[0].student_count, 2);
        assert_eq!(svc.class_sessions(1, 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn faculty_analytics_rank_bucket_and_recommend() {
        let faculty = Uuid::new_v4();
        let summary = service(faculty)
            .faculty_analytics(faculty, None, None, today())
            .await
            .unwrap();

        assert_eq!(summary.start, day(2026, 7, 16));
        assert_eq!(summary.end, today());
        assert_eq!(summary.overview.stats.total, 13);
        assert_eq!(summary.overview.total_students, 2);
        assert_eq!(summary.overview.total_sessions, 9);

        let ranked: Vec<&str> = summary
            .class_comparison
            .iter()
            .map(|c| c.class.subject_code.as_str())
            .collect();
        assert_eq!(ranked, vec!["MATH1", "IT101"]);
        assert_eq!(summary.class_comparison[1].sessions_count, 5);

        // S-1: 6 of 9 attended; S-2: 3 of 4
        let insights = &summary.student_insights;
        assert_eq!(insights.improvement_needed[0].student.student_id, "S-1");
        assert_eq!(insights.consistent_performers[0].student.student_id, "S-2");
        assert!(insights.at_risk_students.is_empty());

        assert!(summary
            .recommendations
            .iter()
            .any(|r| r.kind == analytics::RecommendationKind::Improvement));
        assert!(!summary.trends.is_empty());
    }

    #[tokio::test]
    async fn faculty_analytics_reject_inverted_range() {
        let faculty = Uuid::new_v4();
        let err = service(faculty)
            .faculty_analytics(faculty, Some(day(2026, 10, 20)), Some(day(2026, 10, 1)), today())
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::InvalidDate(_)));
    }

    #[tokio::test]
    async fn overall_stats_span_every_class() {
        let svc = service(Uuid::new_v4());
        let overall = svc.student_overall_stats("S-1").await.unwrap();
        assert_eq!(overall.total, 9);
        assert_eq!(overall.attendance_rate, 66.67);
        assert_eq!(svc.student_overall_stats("S-404").await.unwrap().attendance_rate, 100.0);
    }

    #[tokio::test]
    async fn poor_attendance_lists_lowest_first() {
        let svc = service(Uuid::new_v4());
        let at_risk = svc.students_with_poor_attendance(1, 80.0).await.unwrap();
        assert_eq!(at_risk.len(), 2);
        assert_eq!(at_risk[0].student.student_id, "S-1");
        assert_eq!(at_risk[1].stats.attendance_rate, 75.0);
    }

    #[tokio::test]
    async fn history_groups_months_newest_first() {
        let svc = service(Uuid::new_v4());
        let history = svc.student_history("S-1", None, DateRange::default()).await.unwrap();
        assert_eq!(history.total_records, 9);
        assert_eq!(history.months.len(), 1);
        assert_eq!(history.months[0].label, "October 2026");
    }

    #[tokio::test]
    async fn class_details_include_pattern() {
        let svc = service(Uuid::new_v4());
        let details = svc.class_details("S-1", 1).await.unwrap();
        assert_eq!(details.class.subject_code, "IT101");
        assert_eq!(details.recent_sessions.len(), 5);
        assert!(details.pattern.most_absent_day.is_some());
        assert!(svc.class_details("S-1", 42).await.is_err());
    }

    #[tokio::test]
    async fn per_class_stats_key_by_class() {
        let svc = service(Uuid::new_v4());
        let per_class = svc.per_class_stats("S-1").await.unwrap();
        let rates: Vec<(String, f64)> = per_class
            .iter()
            .map(|(class, stats)| (class.subject_code.clone(), stats.attendance_rate))
            .collect();
        assert_eq!(rates, vec![("IT101".to_string(), 40.0), ("MATH1".to_string(), 100.0)]);
        assert!(svc.per_class_stats("S-404").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn class_trend_buckets_by_week() {
        let svc = service(Uuid::new_v4());
        let weeks = svc
            .class_trend(1, day(2026, 10, 5), day(2026, 10, 18), Granularity::Week)
            .await
            .unwrap();
        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[0].stats.total, 4);
        assert_eq!(weeks[1].stats.total, 5);
    }

    #[tokio::test]
    async fn session_stats_cover_one_date() {
        let svc = service(Uuid::new_v4());
        let stats = svc.session_stats(1, day(2026, 10, 15)).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.absent, 1);
        assert_eq!(stats.excused, 1);
        assert_eq!(stats.attendance_rate, 0.0);
    }

    #[tokio::test]
    async fn identity_dispatch_picks_the_right_dashboard() {
        let faculty = Uuid::new_v4();
        let svc = service(faculty);
        let student = svc.store().resolve_identity("S-2").await.unwrap();
        assert!(matches!(
            svc.dashboard_for(&student, today()).await.unwrap(),
            Dashboard::Student(_)
        ));
        assert!(matches!(
            svc.dashboard_for(&Identity::Faculty(faculty), today()).await.unwrap(),
            Dashboard::Faculty(_)
        ));
    }
}
