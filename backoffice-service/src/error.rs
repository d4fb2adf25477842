//! Error types for backoffice-service.

use service_core::error::AppError;
use thiserror::Error;

/// Failure reported by a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The database aborted the transaction (deadlock or serialization
    /// failure). Retrying the whole unit of work may succeed.
    #[error("Transaction aborted: {0}")]
    Contention(String),

    #[error("Database error: {0}")]
    Database(anyhow::Error),
}

/// SQLSTATE `40P01` (deadlock_detected) and `40001` (serialization_failure).
fn is_contention(code: Option<&str>) -> bool {
    matches!(code, Some("40P01") | Some("40001"))
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::UniqueViolation(db_err.message().to_string())
            }
            sqlx::Error::Database(ref db_err) if is_contention(db_err.code().as_deref()) => {
                StoreError::Contention(db_err.message().to_string())
            }
            other => StoreError::Database(anyhow::Error::new(other)),
        }
    }
}

/// Outcome of a rejected workflow step. Every variant is recoverable at the
/// request boundary; none leaves partial state behind.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Missing or invalid input, price mismatch or insufficient stock.
    /// `problems` lists every failing line when more than one was checked.
    #[error("{message}")]
    BadRequest {
        message: String,
        problems: Vec<String>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    /// The atomic stock guard or a concurrent writer refused the change.
    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(anyhow::Error),
}

impl WorkflowError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        WorkflowError::BadRequest {
            message: message.into(),
            problems: Vec::new(),
        }
    }

    pub fn rejected(message: impl Into<String>, problems: Vec<String>) -> Self {
        WorkflowError::BadRequest {
            message: message.into(),
            problems,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::BadRequest { .. } => "bad_request",
            WorkflowError::NotFound(_) => "not_found",
            WorkflowError::Unauthorized(_) => "unauthorized",
            WorkflowError::Conflict(_) => "conflict",
            WorkflowError::Internal(_) => "internal",
        }
    }

    /// Per-line problems carried by a `BadRequest`, empty otherwise.
    pub fn problems(&self) -> &[String] {
        match self {
            WorkflowError::BadRequest { problems, .. } => problems,
            _ => &[],
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(msg) => WorkflowError::Conflict(msg),
            StoreError::Contention(msg) => WorkflowError::Conflict(msg),
            StoreError::Database(e) => WorkflowError::Internal(e),
        }
    }
}

impl From<validator::ValidationErrors> for WorkflowError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut problems: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => format!("{}: {}", field, msg),
                    None => format!("{}: {}", field, e.code),
                })
            })
            .collect();
        problems.sort();
        WorkflowError::rejected("Invalid data provided", problems)
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::BadRequest { message, problems } => {
                AppError::Rejected { message, problems }
            }
            WorkflowError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            WorkflowError::Unauthorized(msg) => AppError::Unauthorized(anyhow::anyhow!(msg)),
            WorkflowError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            WorkflowError::Internal(e) => AppError::InternalError(e),
        }
    }
}
