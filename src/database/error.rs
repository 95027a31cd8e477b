use crate::error::{AppError, AppErrorKind, InfrastructureError};
use std::fmt;
use thiserror::Error;

pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A guarded write found the row already in the target state.
    #[error("conflicting write: {message}")]
    Conflict { message: String },

    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("serialization failed: {message}")]
    Serialization { message: String },

    #[error("{message}")]
    Unknown { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::new(DatabaseErrorKind::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        })
    }

    pub fn unique_violation(constraint: &str) -> Self {
        Self::new(DatabaseErrorKind::UniqueViolation {
            constraint: constraint.to_string(),
        })
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::Conflict {
            message: message.into(),
        })
    }

    pub fn serialization(err: serde_json::Error) -> Self {
        Self::new(DatabaseErrorKind::Serialization {
            message: err.to_string(),
        })
    }

    /// True when the write lost a race against an identical write.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::UniqueViolation { .. } | DatabaseErrorKind::Conflict { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::ConnectionFailed { .. })
    }

    #[cfg(feature = "database")]
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::new(DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: String::new(),
            }),
            sqlx::Error::Database(db_err) => {
                if db_err.code().as_deref() == Some("23505") {
                    Self::unique_violation(db_err.constraint().unwrap_or("unknown"))
                } else {
                    Self::new(DatabaseErrorKind::Unknown {
                        message: db_err.message().to_string(),
                    })
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::new(DatabaseErrorKind::ConnectionFailed {
                    message: err.to_string(),
                })
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::new(DatabaseErrorKind::Serialization {
                    message: err.to_string(),
                })
            }
            other => Self::new(DatabaseErrorKind::Unknown {
                message: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "database error: {}", self.kind)
    }
}

impl std::error::Error for DatabaseError {}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
            message: err.to_string(),
            is_retryable: err.is_retryable(),
        }))
    }
}
