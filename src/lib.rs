//! Attendance statistics, trends, risk alerts and flat exports over a
//! read-only attendance record store.

pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod report;
pub mod risk;
pub mod service;
pub mod stats;
pub mod store;
pub mod trend;

pub use error::{AttendanceError, Result};
pub use models::{AggregatedStats, Alert, AttendanceRecord, AttendanceStatus, Identity, TrendPoint};
pub use service::AttendanceService;
pub use stats::calculate_stats;
pub use store::{AttendanceRecordStore, DateRange, MemoryStore, RecordFilter};
