use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use attendance_insights::config::Settings;
use attendance_insights::db::{self, PgAttendanceStore};
use attendance_insights::export::{self, ExportFormat};
use attendance_insights::report;
use attendance_insights::service::{Dashboard, DEFAULT_SESSION_LIMIT};
use attendance_insights::trend;
use attendance_insights::{AttendanceRecordStore, AttendanceService, DateRange};

#[derive(Parser)]
#[command(name = "attendance-insights")]
#[command(about = "Attendance statistics, trends and alerts for the school portal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import attendance marks from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Attendance statistics for a student
    Stats {
        #[arg(long)]
        student: String,
        #[arg(long)]
        class: Option<i64>,
        #[arg(long)]
        since: Option<NaiveDate>,
        #[arg(long)]
        until: Option<NaiveDate>,
    },
    /// Weekly attendance trend for a student
    Trend {
        #[arg(long)]
        student: String,
        #[arg(
            long,
            default_value_t = trend::DEFAULT_WEEKS_BACK,
            value_parser = clap::value_parser!(u32).range(1..=520)
        )]
        weeks: u32,
    },
    /// Class attendance bucketed by day, week or month
    ClassTrend {
        #[arg(long)]
        class: i64,
        #[arg(long)]
        since: NaiveDate,
        #[arg(long)]
        until: NaiveDate,
        #[arg(long, value_enum, default_value = "week")]
        by: trend::Granularity,
    },
    /// Sessions recorded for a class, newest first
    Sessions {
        #[arg(long)]
        class: i64,
        #[arg(long, default_value_t = DEFAULT_SESSION_LIMIT)]
        limit: usize,
    },
    /// Classes taught by a faculty member with their latest session
    FacultyClasses {
        #[arg(long)]
        faculty: Uuid,
    },
    /// Attendance analytics across a faculty member's classes, printed as JSON
    Analytics {
        #[arg(long)]
        faculty: Uuid,
        #[arg(long)]
        since: Option<NaiveDate>,
        #[arg(long)]
        until: Option<NaiveDate>,
    },
    /// Low attendance and absence streak alerts for a student
    Alerts {
        #[arg(long)]
        student: String,
    },
    /// Dashboard for a student or faculty id, printed as JSON
    Dashboard {
        #[arg(long)]
        id: String,
    },
    /// Export a student's attendance rows
    Export {
        #[arg(long)]
        student: String,
        #[arg(long)]
        class: Option<i64>,
        #[arg(long)]
        since: Option<NaiveDate>,
        #[arg(long)]
        until: Option<NaiveDate>,
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Per-student summary of one class, written as CSV
    ClassReport {
        #[arg(long)]
        class: i64,
        #[arg(long)]
        since: NaiveDate,
        #[arg(long)]
        until: NaiveDate,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Per-class summary for a faculty member, written as CSV
    FacultySummary {
        #[arg(long)]
        faculty: Uuid,
        #[arg(long)]
        since: NaiveDate,
        #[arg(long)]
        until: NaiveDate,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Soft-delete one attendance record
    Delete {
        #[arg(long)]
        record: i64,
    },
    /// Students in a class below an attendance rate
    AtRisk {
        #[arg(long)]
        class: i64,
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Generate a markdown report for a student
    Report {
        #[arg(long)]
        student: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("invalid configuration")?;
    let pool = db::connect(&settings).await?;
    let today = Utc::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let imported = db::import_csv(&pool, &csv).await?;
            println!("Imported {imported} attendance rows from {}.", csv.display());
        }
        Commands::Stats {
            student,
            class,
            since,
            until,
        } => {
            let service = AttendanceService::new(PgAttendanceStore::new(pool), settings.thresholds);
            let range = DateRange { start: since, end: until };
            let stats = if class.is_none() && range == DateRange::default() {
                service.student_overall_stats(&student).await?
            } else {
                let records = service.student_records(&student, class, range).await?;
                attendance_insights::calculate_stats(&records)
            };

            if stats.total == 0 {
                println!("No attendance recorded for {student} in this window.");
                return Ok(());
            }

            println!(
                "{student}: {}% attendance across {} sessions",
                stats.attendance_rate, stats.total
            );
            println!(
                "- present {}, late {}, partial {}, excused {}, absent {}",
                stats.present, stats.late, stats.partial, stats.excused, stats.absent
            );
        }
        Commands::Trend { student, weeks } => {
            let service = AttendanceService::new(PgAttendanceStore::new(pool), settings.thresholds);
            for point in service.weekly_trend(&student, weeks, today).await? {
                println!(
                    "- {}: {}% ({} sessions)",
                    point.period_label, point.attendance_rate, point.total_sessions
                );
            }
        }
        Commands::ClassTrend {
            class,
            since,
            until,
            by,
        } => {
            let service = AttendanceService::new(PgAttendanceStore::new(pool), settings.thresholds);
            for period in service.class_trend(class, since, until, by).await? {
                println!(
                    "- {} to {}: {}% ({} records)",
                    period.period_start,
                    period.period_end,
                    period.stats.attendance_rate,
                    period.stats.total
                );
            }
        }
        Commands::Sessions { class, limit } => {
            let service = AttendanceService::new(PgAttendanceStore::new(pool), settings.thresholds);
            let sessions = service.class_sessions(class, limit).await?;

            if sessions.is_empty() {
                println!("No sessions recorded for class {class}.");
                return Ok(());
            }

            for session in sessions {
                println!(
                    "- {} ({}): {} students, {}% attendance",
                    session.date.format("%b %-d, %Y"),
                    session.date.format("%A"),
                    session.student_count,
                    session.stats.attendance_rate
                );
            }
        }
        Commands::FacultyClasses { faculty } => {
            let service = AttendanceService::new(PgAttendanceStore::new(pool), settings.thresholds);
            for summary in service.faculty_classes(faculty, today).await? {
                let last = summary
                    .last_session
                    .as_ref()
                    .map(|s| format!("last session {} ({} days ago)", s.date, s.days_ago))
                    .unwrap_or_else(|| "no sessions yet".to_string());
                let flag = if summary.needs_attention { " (needs attention)" } else { "" };
                println!(
                    "- {}: {} enrolled, {}% attendance, {}{}",
                    summary.class.subject_code,
                    summary.enrollment_count,
                    summary.stats.attendance_rate,
                    last,
                    flag
                );
            }
        }
        Commands::Analytics {
            faculty,
            since,
            until,
        } => {
            let service = AttendanceService::new(PgAttendanceStore::new(pool), settings.thresholds);
            let analytics = service.faculty_analytics(faculty, since, until, today).await?;
            println!("{}", serde_json::to_string_pretty(&analytics)?);
        }
        Commands::Alerts { student } => {
            let service = AttendanceService::new(PgAttendanceStore::new(pool), settings.thresholds);
            let alerts = service.student_alerts(&student, today).await?;

            if alerts.is_empty() {
                println!("No alerts for {student}.");
                return Ok(());
            }

            for alert in alerts {
                println!("- [{:?}] {}", alert.severity, alert.message);
            }
        }
        Commands::Dashboard { id } => {
            let service = AttendanceService::new(PgAttendanceStore::new(pool), settings.thresholds);
            let identity = service.store().resolve_identity(&id).await?;
            log::info!("resolved {id} as {identity:?}");
            let dashboard = service.dashboard_for(&identity, today).await?;
            if let Dashboard::Faculty(faculty) = &dashboard {
                log::info!(
                    "{} of {} classes need attention",
                    faculty.classes_needing_attention,
                    faculty.total_classes
                );
            }
            println!("{}", serde_json::to_string_pretty(&dashboard)?);
        }
        Commands::Export {
            student,
            class,
            since,
            until,
            format,
            out,
        } => {
            if format != ExportFormat::Csv {
                anyhow::bail!("{format} files are rendered by the portal; use --format csv here");
            }

            let store = PgAttendanceStore::new(pool);
            let range = DateRange { start: since, end: until };
            let bundle =
                export::export_student_attendance(&store, &student, class, range, format, today)
                    .await?;

            let out = out.unwrap_or_else(|| {
                PathBuf::from(format!("{}.{}", bundle.filename, format.extension()))
            });
            let mut writer = csv::Writer::from_path(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            for row in &bundle.rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
            println!(
                "Exported {} rows ({}% attendance) to {}.",
                bundle.rows.len(),
                bundle.stats.attendance_rate,
                out.display()
            );
        }
        Commands::ClassReport {
            class,
            since,
            until,
            out,
        } => {
            let store = PgAttendanceStore::new(pool);
            let report = export::export_class_report(&store, class, since, until).await?;
            let out = out.unwrap_or_else(|| PathBuf::from(format!("{}.csv", report.filename)));
            let mut writer = csv::Writer::from_path(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            for row in &report.rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
            println!(
                "{} students, class rate {}%, written to {}.",
                report.rows.len(),
                report.summary.attendance_rate,
                out.display()
            );
        }
        Commands::FacultySummary {
            faculty,
            since,
            until,
            out,
        } => {
            let store = PgAttendanceStore::new(pool);
            let summary = export::export_faculty_summary(&store, faculty, since, until).await?;
            let out = out.unwrap_or_else(|| PathBuf::from(format!("{}.csv", summary.filename)));
            let mut writer = csv::Writer::from_path(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            for row in &summary.rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
            println!("{} classes written to {}.", summary.rows.len(), out.display());
        }
        Commands::Delete { record } => {
            if db::soft_delete(&pool, record).await? {
                println!("Record {record} deleted.");
            } else {
                println!("No live record with id {record}.");
            }
        }
        Commands::AtRisk { class, threshold } => {
            let service = AttendanceService::new(PgAttendanceStore::new(pool), settings.thresholds);
            let threshold = threshold.unwrap_or(service.thresholds().low_rate);
            let students = service.students_with_poor_attendance(class, threshold).await?;

            if students.is_empty() {
                println!("No students below {threshold}% in class {class}.");
                return Ok(());
            }

            for entry in students {
                println!(
                    "- {} ({}): {}% over {} sessions",
                    entry.student.display_name,
                    entry.student.student_id,
                    entry.stats.attendance_rate,
                    entry.stats.total
                );
            }
        }
        Commands::Report { student, out } => {
            let service = AttendanceService::new(PgAttendanceStore::new(pool), settings.thresholds);
            let dashboard = service.student_dashboard(&student, today).await?;
            let records = service
                .student_records(&student, None, DateRange::default())
                .await?;
            let pattern = trend::attendance_pattern(&records);
            let report = report::build_report(&dashboard, Some(&pattern), today);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
