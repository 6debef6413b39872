use thiserror::Error;

/// Stable error taxonomy for every public operation (spec §7).
///
/// Each variant maps to a stable `code()` string and an `http_status()`
/// for transport layers that want one; messages are human-readable and
/// safe to surface, stack traces stay in the logs.
#[derive(Debug, Error)]
pub enum KbError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("shareability denied: {0}")]
    Shareability(String),

    #[error("embedding dimension mismatch: {0}")]
    Dimension(String),

    #[error("dependency failure: {0}")]
    Dependency(String),

    #[error("deadline exceeded: {0}")]
    Deadline(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl KbError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Shareability(_) => "shareability_denied",
            Self::Dimension(_) => "embedding_dimension",
            Self::Dependency(_) => "dependency",
            Self::Deadline(_) => "deadline",
            Self::Internal(_) => "internal",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Shareability(_) => 403,
            Self::Dimension(_) => 422,
            Self::Dependency(_) => 502,
            Self::Deadline(_) => 504,
            Self::Internal(_) => 500,
        }
    }
}

/// The `{code, message, details?}` envelope returned to callers (spec §7).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl From<&KbError> for ErrorEnvelope {
    fn from(err: &KbError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            details: None,
        }
    }
}

pub type KbResult<T> = Result<T, KbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = KbError::NotFound("product".into());
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn envelope_carries_code_and_message() {
        let err = KbError::Conflict("duplicate campaign".into());
        let envelope = ErrorEnvelope::from(&err);
        assert_eq!(envelope.code, "conflict");
        assert!(envelope.message.contains("duplicate campaign"));
    }
}
