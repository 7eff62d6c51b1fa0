use std::fmt;
use std::time::Duration;

use crate::model::CaseId;

/// Machine-readable error codes for callers deciding whether to retry,
/// prompt the user, or abandon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ValidationFailed,
    CaseNotFound,
    InvalidStatus,
    AccessDenied,
    WriteConflict,
    StoreTimeout,
    UpstreamFailure,
    StorageFailure,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ValidationFailed => "E1001",
            Self::CaseNotFound => "E2001",
            Self::InvalidStatus => "E2002",
            Self::AccessDenied => "E2003",
            Self::WriteConflict => "E3001",
            Self::StoreTimeout => "E3002",
            Self::UpstreamFailure => "E4001",
            Self::StorageFailure => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ValidationFailed => "Submission failed validation",
            Self::CaseNotFound => "Case not found",
            Self::InvalidStatus => "Invalid status value",
            Self::AccessDenied => "Operation not permitted for this role",
            Self::WriteConflict => "Concurrent write conflict",
            Self::StoreTimeout => "Case store timed out",
            Self::UpstreamFailure => "Upstream service failure",
            Self::StorageFailure => "Case store failure",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ValidationFailed => {
                Some("Provide a category (dog, cat, cow, other) and valid coordinates.")
            }
            Self::CaseNotFound => Some("The case may have been purged; search nearby cases again."),
            Self::InvalidStatus => Some("Use one of: Unhandled, Collected, InTreatment, Resolved."),
            Self::AccessDenied => {
                Some("Status changes and deletion require the administrator role.")
            }
            Self::WriteConflict => Some("Retry the operation; contributions are safe to re-apply."),
            Self::StoreTimeout => Some("Retry after the other writer releases the case."),
            Self::UpstreamFailure => {
                Some("The contribution was saved without the photo; upload it again later.")
            }
            Self::StorageFailure => Some("Check disk space and permissions on the case database."),
        }
    }

    /// Whether an operation failing with this code may succeed on retry.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::WriteConflict | Self::StoreTimeout)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("case {case_id} not found")]
    NotFound { case_id: CaseId },

    #[error("invalid status '{value}': expected Unhandled, Collected, InTreatment or Resolved")]
    InvalidStatus { value: String },

    #[error("{role} may not {action}")]
    AccessDenied {
        role: &'static str,
        action: &'static str,
    },

    #[error("case {case_id} was modified concurrently after {attempts} attempt(s)")]
    Conflict { case_id: CaseId, attempts: u32 },

    #[error("timed out after {waited:?} waiting for {resource}")]
    Timeout { resource: String, waited: Duration },

    #[error("{service} failed: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    #[error("case store failure: {0:#}")]
    Storage(#[source] anyhow::Error),
}

impl EngineError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(case_id: &CaseId) -> Self {
        Self::NotFound {
            case_id: case_id.clone(),
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::ValidationFailed,
            Self::NotFound { .. } => ErrorCode::CaseNotFound,
            Self::InvalidStatus { .. } => ErrorCode::InvalidStatus,
            Self::AccessDenied { .. } => ErrorCode::AccessDenied,
            Self::Conflict { .. } => ErrorCode::WriteConflict,
            Self::Timeout { .. } => ErrorCode::StoreTimeout,
            Self::Upstream { .. } => ErrorCode::UpstreamFailure,
            Self::Storage(_) => ErrorCode::StorageFailure,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// The case this error concerns, when there is one.
    #[must_use]
    pub const fn case_id(&self) -> Option<&CaseId> {
        match self {
            Self::NotFound { case_id } | Self::Conflict { case_id, .. } => Some(case_id),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode as Sqlite;

        if let rusqlite::Error::SqliteFailure(inner, _) = &err {
            if matches!(inner.code, Sqlite::DatabaseBusy | Sqlite::DatabaseLocked) {
                return Self::Timeout {
                    resource: "case database".to_string(),
                    waited: crate::db::DEFAULT_BUSY_TIMEOUT,
                };
            }
        }
        Self::Storage(err.into())
    }
}
