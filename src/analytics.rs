use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

use crate::models::{AggregatedStats, AttendanceRecord, ClassInfo, EnrolledStudent, PeriodStats, YearMonth};
use crate::stats::{calculate_stats, round2, tally};
use crate::trend::AttendancePattern;

pub const AT_RISK_RATE: f64 = 60.0;
pub const TOP_PERFORMER_RATE: f64 = 95.0;
pub const IMPROVEMENT_RATE: f64 = 75.0;

/// Fewer records than this and a student's direction is not judged.
pub const MIN_TREND_RECORDS: usize = 4;
/// Rate points the second half must move by to count as a change.
pub const TREND_SHIFT: f64 = 10.0;

const ATTENDANCE_WEIGHT: f64 = 0.6;
const CONSISTENCY_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PerformanceGrade {
    APlus,
    A,
    BPlus,
    B,
    CPlus,
    C,
    D,
    F,
}

impl PerformanceGrade {
    pub fn for_rate(rate: f64) -> Self {
        match rate {
            r if r >= 95.0 => PerformanceGrade::APlus,
            r if r >= 90.0 => PerformanceGrade::A,
            r if r >= 85.0 => PerformanceGrade::BPlus,
            r if r >= 80.0 => PerformanceGrade::B,
            r if r >= 75.0 => PerformanceGrade::CPlus,
            r if r >= 70.0 => PerformanceGrade::C,
            r if r >= 60.0 => PerformanceGrade::D,
            _ => PerformanceGrade::F,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PerformanceGrade::APlus => "A+",
            PerformanceGrade::A => "A",
            PerformanceGrade::BPlus => "B+",
            PerformanceGrade::B => "B",
            PerformanceGrade::CPlus => "C+",
            PerformanceGrade::C => "C",
            PerformanceGrade::D => "D",
            PerformanceGrade::F => "F",
        }
    }
}

impl fmt::Display for PerformanceGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PerformanceGrade {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Weighted blend of the attendance rate (60%) and the share of sessions not
/// missed (40%), on a 0..=100 scale.
pub fn engagement_score(stats: &AggregatedStats) -> f64 {
    let attendance = stats.attendance_rate / 100.0;
    let consistency = 1.0 - stats.absent as f64 / stats.total.max(1) as f64;
    round2((attendance * ATTENDANCE_WEIGHT + consistency * CONSISTENCY_WEIGHT) * 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

/// Compares the rate of the later half of a student's records, in date
/// order, with the earlier half.
pub fn trend_direction(records: &[AttendanceRecord]) -> TrendDirection {
    if records.len() < MIN_TREND_RECORDS {
        return TrendDirection::InsufficientData;
    }

    let mut ordered: Vec<&AttendanceRecord> = records.iter().collect();
    ordered.sort_by_key(|record| record.date);
    let (earlier, later) = ordered.split_at(ordered.len() / 2);

    let before = tally(earlier.iter().map(|r| r.status)).attendance_rate;
    let after = tally(later.iter().map(|r| r.status)).attendance_rate;
    let difference = after - before;

    if difference > TREND_SHIFT {
        TrendDirection::Improving
    } else if difference < -TREND_SHIFT {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    AtRisk,
    TopPerformer,
    ImprovementNeeded,
    Consistent,
}

impl InsightCategory {
    pub fn for_rate(rate: f64) -> Self {
        if rate < AT_RISK_RATE {
            InsightCategory::AtRisk
        } else if rate >= TOP_PERFORMER_RATE {
            InsightCategory::TopPerformer
        } else if rate < IMPROVEMENT_RATE {
            InsightCategory::ImprovementNeeded
        } else {
            InsightCategory::Consistent
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentInsight {
    pub student: EnrolledStudent,
    pub stats: AggregatedStats,
    pub trend: TrendDirection,
}

impl StudentInsight {
    pub fn from_records(student: EnrolledStudent, records: &[AttendanceRecord]) -> Self {
        StudentInsight {
            student,
            stats: calculate_stats(records),
            trend: trend_direction(records),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StudentInsights {
    pub at_risk_students: Vec<StudentInsight>,
    pub top_performers: Vec<StudentInsight>,
    pub improvement_needed: Vec<StudentInsight>,
    pub consistent_performers: Vec<StudentInsight>,
}

impl StudentInsights {
    /// Buckets each student by rate; every bucket lists the lowest rate first.
    pub fn categorize<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = StudentInsight>,
    {
        let mut insights = StudentInsights::default();
        for entry in entries {
            let bucket = match InsightCategory::for_rate(entry.stats.attendance_rate) {
                InsightCategory::AtRisk => &mut insights.at_risk_students,
                InsightCategory::TopPerformer => &mut insights.top_performers,
                InsightCategory::ImprovementNeeded => &mut insights.improvement_needed,
                InsightCategory::Consistent => &mut insights.consistent_performers,
            };
            bucket.push(entry);
        }

        for bucket in [
            &mut insights.at_risk_students,
            &mut insights.top_performers,
            &mut insights.improvement_needed,
            &mut insights.consistent_performers,
        ] {
            bucket.sort_by(|a, b| a.stats.attendance_rate.total_cmp(&b.stats.attendance_rate));
        }
        insights
    }
}

/// One class meeting on one date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub class_id: i64,
    pub date: NaiveDate,
    pub student_count: usize,
    pub stats: AggregatedStats,
}

/// Groups records into class/date sessions, newest first.
pub fn sessions(records: &[AttendanceRecord]) -> Vec<SessionSummary> {
    let mut groups: BTreeMap<(NaiveDate, i64), Vec<AttendanceRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry((record.date, record.class_id))
            .or_default()
            .push(record.clone());
    }

    let mut summaries: Vec<SessionSummary> = groups
        .into_iter()
        .map(|((date, class_id), group)| SessionSummary {
            class_id,
            date,
            student_count: group.len(),
            stats: calculate_stats(&group),
        })
        .collect();
    summaries.sort_by(|a, b| b.date.cmp(&a.date).then(a.class_id.cmp(&b.class_id)));
    summaries
}

pub fn count_sessions(records: &[AttendanceRecord]) -> usize {
    records
        .iter()
        .map(|record| (record.class_id, record.date))
        .collect::<BTreeSet<_>>()
        .len()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewMetrics {
    #[serde(flatten)]
    pub stats: AggregatedStats,
    pub total_students: usize,
    pub total_sessions: usize,
    pub average_session_attendance: f64,
    pub engagement_score: f64,
}

pub fn overview(records: &[AttendanceRecord], total_students: usize) -> OverviewMetrics {
    let stats = calculate_stats(records);
    let total_sessions = count_sessions(records);
    let average_session_attendance = if total_sessions == 0 {
        0.0
    } else {
        round2(records.len() as f64 / total_sessions as f64)
    };

    OverviewMetrics {
        engagement_score: engagement_score(&stats),
        stats,
        total_students,
        total_sessions,
        average_session_attendance,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassComparison {
    pub class: ClassInfo,
    pub stats: AggregatedStats,
    pub enrollment_count: usize,
    pub sessions_count: usize,
    pub performance_grade: PerformanceGrade,
}

impl ClassComparison {
    pub fn new(class: ClassInfo, records: &[AttendanceRecord], enrollment_count: usize) -> Self {
        let stats = calculate_stats(records);
        let dates: BTreeSet<NaiveDate> = records.iter().map(|record| record.date).collect();
        ClassComparison {
            class,
            performance_grade: PerformanceGrade::for_rate(stats.attendance_rate),
            stats,
            enrollment_count,
            sessions_count: dates.len(),
        }
    }
}

/// Best attended class first.
pub fn rank_classes(mut classes: Vec<ClassComparison>) -> Vec<ClassComparison> {
    classes.sort_by(|a, b| b.stats.attendance_rate.total_cmp(&a.stats.attendance_rate));
    classes
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimePatterns {
    #[serde(flatten)]
    pub days: AttendancePattern,
    pub by_month: BTreeMap<YearMonth, AggregatedStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Critical,
    Improvement,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    pub title: String,
    pub description: String,
    pub action: String,
}

pub fn recommendations(
    overview: &OverviewMetrics,
    patterns: &TimePatterns,
    insights: &StudentInsights,
) -> Vec<Recommendation> {
    let mut out = Vec::new();

    if overview.stats.attendance_rate < IMPROVEMENT_RATE {
        out.push(Recommendation {
            kind: RecommendationKind::Critical,
            title: "Low Overall Attendance".to_string(),
            description: format!(
                "Overall attendance is below {IMPROVEMENT_RATE}%. Consider attendance incentives or a review of class engagement."
            ),
            action: "Review teaching methods and student engagement".to_string(),
        });
    }

    if let Some(day) = patterns.days.most_absent_day {
        out.push(Recommendation {
            kind: RecommendationKind::Improvement,
            title: format!("Low Attendance on {day}"),
            description: "Schedule important content or activities on this day to lift attendance."
                .to_string(),
            action: "Adjust schedule or add engaging content".to_string(),
        });
    }

    let at_risk = insights.at_risk_students.len();
    if at_risk > 0 {
        out.push(Recommendation {
            kind: RecommendationKind::Urgent,
            title: "Students at Risk".to_string(),
            description: format!(
                "{at_risk} students have attendance below {AT_RISK_RATE}%. Immediate intervention recommended."
            ),
            action: "Contact students and provide support".to_string(),
        });
    }

    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacultyAnalytics {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub overview: OverviewMetrics,
    pub trends: Vec<PeriodStats>,
    pub class_comparison: Vec<ClassComparison>,
    pub student_insights: StudentInsights,
    pub time_patterns: TimePatterns,
    pub recommendations: Vec<Recommendation>,
}
