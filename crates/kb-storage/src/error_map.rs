//! Maps `sqlx::Error` into the shared `KbError` taxonomy at the repository
//! boundary so callers above `kb-storage` never see a raw `sqlx` type
//! (spec §7: "repositories raise typed errors").

use kb_core::KbError;

pub fn map_sqlx_err(context: &str, err: sqlx::Error) -> KbError {
    match &err {
        sqlx::Error::RowNotFound => KbError::NotFound(context.to_string()),
        sqlx::Error::Database(db_err) => {
            // Postgres unique_violation = 23505, SQLite gives "UNIQUE constraint failed".
            let is_unique = db_err.code().as_deref() == Some("23505")
                || db_err.message().contains("UNIQUE constraint failed");
            if is_unique {
                KbError::Conflict(format!("{context}: {}", db_err.message()))
            } else {
                KbError::Dependency(format!("{context}: {}", db_err.message()))
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            KbError::Dependency(format!("{context}: {err}"))
        }
        other => KbError::Dependency(format!("{context}: {other}")),
    }
}

pub fn not_found(context: impl Into<String>) -> KbError {
    KbError::NotFound(context.into())
}
