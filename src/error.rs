use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("unknown attendance status: {0:?}")]
    UnknownStatus(String),

    #[error("no class metadata for class {0}")]
    MissingClass(i64),

    #[error("no student or faculty matches id {0:?}")]
    UnknownIdentity(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("record store query failed")]
    Store(#[from] sqlx::Error),

    #[error("schema migration failed")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type Result<T> = std::result::Result<T, AttendanceError>;
