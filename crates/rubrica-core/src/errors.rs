//! Error types for the grading pipeline.

use std::time::Duration;

/// Grading errors.
///
/// Every variant maps to a stable machine-readable [`kind`](GradingError::kind)
/// string; the `Display` output is the human-readable message.
#[derive(Debug, thiserror::Error)]
pub enum GradingError {
    /// No catalog entry matches the requested rubric name.
    #[error("rubric not found: {name}")]
    RubricNotFound { name: String },

    /// A catalog entry exists but does not yield a usable rubric.
    #[error("rubric malformed: {name} - {reason}")]
    RubricMalformed { name: String, reason: String },

    /// Every configured OCR model failed.
    #[error("transcription failed after {attempts} model(s): {last_error}")]
    TranscriptionFailed { attempts: usize, last_error: String },

    /// The judgment model did not answer within the configured duration.
    #[error("judgment timed out after {elapsed:?} (model {model})")]
    JudgmentTimeout { model: String, elapsed: Duration },

    /// The judgment model answered, but not with the requested shape.
    #[error("judgment malformed: {message}")]
    JudgmentMalformed { message: String },

    /// Transport or non-2xx failure from the judgment endpoint.
    #[error("provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    /// The submission itself is unusable (e.g. empty essay).
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Configuration could not be read or is inconsistent.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl GradingError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RubricNotFound { .. } => "rubric_not_found",
            Self::RubricMalformed { .. } => "rubric_malformed",
            Self::TranscriptionFailed { .. } => "transcription_failed",
            Self::JudgmentTimeout { .. } => "judgment_timeout",
            Self::JudgmentMalformed { .. } => "judgment_malformed",
            Self::Provider { .. } => "provider",
            Self::InvalidInput { .. } => "invalid_input",
            Self::Config { .. } => "config",
        }
    }

    /// Whether the caller sent something unusable (as opposed to an upstream failure).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::RubricNotFound { .. } | Self::RubricMalformed { .. } | Self::InvalidInput { .. }
        )
    }

    /// Whether resubmitting the same request may succeed.
    ///
    /// The core itself never retries; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::JudgmentTimeout { .. } | Self::Provider { .. } | Self::TranscriptionFailed { .. }
        )
    }

    pub(crate) fn malformed_rubric(name: &str, reason: impl Into<String>) -> Self {
        Self::RubricMalformed {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_judgment(message: impl Into<String>) -> Self {
        Self::JudgmentMalformed {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Result type for grading operations.
pub type GradingResult<T> = Result<T, GradingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        let err = GradingError::RubricNotFound {
            name: "ENEM".into(),
        };
        assert_eq!(err.kind(), "rubric_not_found");
        assert!(err.is_client_error());
        assert!(!err.is_retryable());

        let err = GradingError::JudgmentTimeout {
            model: "gpt-4.1".into(),
            elapsed: Duration::from_secs(240),
        };
        assert_eq!(err.kind(), "judgment_timeout");
        assert!(!err.is_client_error());
        assert!(err.is_retryable());
    }

    #[test]
    fn messages_are_human_readable() {
        let err = GradingError::malformed_rubric("FUVEST", "no criteria");
        assert_eq!(err.to_string(), "rubric malformed: FUVEST - no criteria");

        let err = GradingError::TranscriptionFailed {
            attempts: 3,
            last_error: "status 500".into(),
        };
        assert_eq!(
            err.to_string(),
            "transcription failed after 3 model(s): status 500"
        );
    }
}
