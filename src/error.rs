use uuid::Uuid;

use crate::models::Collection;

pub type Result<T> = std::result::Result<T, TrackError>;

#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("{entity} not found with id {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unknown field `{field}` for {collection}")]
    UnknownField { collection: Collection, field: String },

    #[error("backend unavailable: {0}")]
    Connectivity(sqlx::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Postgres SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for TrackError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return TrackError::Conflict(db_err.message().to_string());
            }
        }
        TrackError::Connectivity(err)
    }
}

impl From<std::io::Error> for TrackError {
    fn from(err: std::io::Error) -> Self {
        TrackError::Storage(err.to_string())
    }
}
