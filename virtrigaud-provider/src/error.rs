//! Error taxonomy at the provider contract boundary.
//!
//! Ten wire-level kinds; reconcilers map each to a requeue decision.
//! Providers carry the kind in the gRPC status code, with disambiguation
//! through a message prefix where one code covers two kinds.

use thiserror::Error;

/// The wire-level error kinds of the provider contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidSpec,
    Retryable,
    Unauthorized,
    NotSupported,
    RateLimit,
    Unavailable,
    Timeout,
    QuotaExceeded,
    Conflict,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::InvalidSpec => "InvalidSpec",
            ErrorKind::Retryable => "Retryable",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::NotSupported => "NotSupported",
            ErrorKind::RateLimit => "RateLimit",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::QuotaExceeded => "QuotaExceeded",
            ErrorKind::Conflict => "Conflict",
        }
    }

    /// Kinds the retry layer is allowed to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Retryable | ErrorKind::RateLimit | ErrorKind::Unavailable | ErrorKind::Timeout
        )
    }
}

/// Errors surfaced by provider calls.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    #[error("retryable provider error: {0}")]
    Retryable(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("deadline exceeded: {0}")]
    Timeout(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::NotFound(_) => ErrorKind::NotFound,
            ProviderError::InvalidSpec(_) => ErrorKind::InvalidSpec,
            ProviderError::Retryable(_) => ErrorKind::Retryable,
            ProviderError::Unauthorized(_) => ErrorKind::Unauthorized,
            ProviderError::NotSupported(_) => ErrorKind::NotSupported,
            ProviderError::RateLimit(_) => ErrorKind::RateLimit,
            ProviderError::Unavailable(_) => ErrorKind::Unavailable,
            ProviderError::Timeout(_) => ErrorKind::Timeout,
            ProviderError::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            ProviderError::Conflict(_) => ErrorKind::Conflict,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Build an error of the given kind.
    pub fn of_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::NotFound => ProviderError::NotFound(message),
            ErrorKind::InvalidSpec => ProviderError::InvalidSpec(message),
            ErrorKind::Retryable => ProviderError::Retryable(message),
            ErrorKind::Unauthorized => ProviderError::Unauthorized(message),
            ErrorKind::NotSupported => ProviderError::NotSupported(message),
            ErrorKind::RateLimit => ProviderError::RateLimit(message),
            ErrorKind::Unavailable => ProviderError::Unavailable(message),
            ErrorKind::Timeout => ProviderError::Timeout(message),
            ErrorKind::QuotaExceeded => ProviderError::QuotaExceeded(message),
            ErrorKind::Conflict => ProviderError::Conflict(message),
        }
    }

    /// Parse a task error string of the form "Kind: message".
    ///
    /// Task failures travel inside `TaskStatusResponse.error` rather than as
    /// a gRPC status; unknown prefixes are treated as Retryable.
    pub fn from_task_error(error: &str) -> Self {
        let (prefix, message) = match error.split_once(':') {
            Some((p, m)) => (p.trim(), m.trim()),
            None => ("", error),
        };
        let kind = match prefix {
            "NotFound" => ErrorKind::NotFound,
            "InvalidSpec" => ErrorKind::InvalidSpec,
            "Unauthorized" => ErrorKind::Unauthorized,
            "NotSupported" => ErrorKind::NotSupported,
            "RateLimit" => ErrorKind::RateLimit,
            "Unavailable" => ErrorKind::Unavailable,
            "Timeout" => ErrorKind::Timeout,
            "QuotaExceeded" => ErrorKind::QuotaExceeded,
            "Conflict" => ErrorKind::Conflict,
            _ => ErrorKind::Retryable,
        };
        Self::of_kind(kind, message)
    }
}

impl From<tonic::Status> for ProviderError {
    fn from(status: tonic::Status) -> Self {
        use tonic::Code;
        let message = status.message().to_string();
        match status.code() {
            Code::NotFound => ProviderError::NotFound(message),
            Code::InvalidArgument | Code::FailedPrecondition => {
                ProviderError::InvalidSpec(message)
            }
            Code::Unauthenticated | Code::PermissionDenied => {
                ProviderError::Unauthorized(message)
            }
            Code::Unimplemented => ProviderError::NotSupported(message),
            Code::ResourceExhausted => {
                // One code, two kinds: quota exhaustion is permanent,
                // rate limiting is not.
                if message.to_ascii_lowercase().contains("quota") {
                    ProviderError::QuotaExceeded(message)
                } else {
                    ProviderError::RateLimit(message)
                }
            }
            Code::Unavailable => ProviderError::Unavailable(message),
            Code::DeadlineExceeded => ProviderError::Timeout(message),
            Code::AlreadyExists | Code::Aborted => ProviderError::Conflict(message),
            _ => ProviderError::Retryable(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ProviderError::Unavailable("down".into()).is_retryable());
        assert!(ProviderError::Timeout("slow".into()).is_retryable());
        assert!(ProviderError::RateLimit("429".into()).is_retryable());
        assert!(ProviderError::Retryable("transient".into()).is_retryable());
        assert!(!ProviderError::NotFound("gone".into()).is_retryable());
        assert!(!ProviderError::InvalidSpec("bad".into()).is_retryable());
        assert!(!ProviderError::NotSupported("nope".into()).is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        let err: ProviderError =
            tonic::Status::new(tonic::Code::ResourceExhausted, "quota exceeded on pool").into();
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);

        let err: ProviderError =
            tonic::Status::new(tonic::Code::ResourceExhausted, "too many requests").into();
        assert_eq!(err.kind(), ErrorKind::RateLimit);

        let err: ProviderError = tonic::Status::new(tonic::Code::Unimplemented, "no clone").into();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }

    #[test]
    fn test_task_error_parsing() {
        let err = ProviderError::from_task_error("NotSupported: instant clone");
        assert_eq!(err.kind(), ErrorKind::NotSupported);

        let err = ProviderError::from_task_error("disk exploded mid-copy");
        assert_eq!(err.kind(), ErrorKind::Retryable);
    }
}
