//! Connector errors.
//!
//! Every error maps to a stable code through [`ConnectorError::error_code`];
//! the provisioning queue stores that code as the result of a failed
//! operation and the breaker counts it as a failure.

use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Error returned by a connector call.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The target system could not be reached.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// The call did not complete within the configured bound.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    /// The target answered but refuses work for now.
    #[error("target system unavailable: {message}")]
    TargetUnavailable { message: String },

    #[error("object already exists: {identifier}")]
    ObjectAlreadyExists { identifier: String },

    #[error("object not found: {identifier}")]
    ObjectNotFound { identifier: String },

    /// The target rejected the operation.
    #[error("operation rejected: {message}")]
    Rejected {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// The change feed no longer accepts the token.
    #[error("invalid sync token: {token}")]
    InvalidSyncToken { token: String },

    #[error("internal connector error: {message}")]
    Internal { message: String },
}

impl ConnectorError {
    /// Whether the same call may succeed later without any change.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::ConnectionTimeout { .. }
                | Self::TargetUnavailable { .. }
        )
    }

    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::ConnectionTimeout { .. } => "CONNECTOR_TIMEOUT",
            Self::TargetUnavailable { .. } => "TARGET_UNAVAILABLE",
            Self::ObjectAlreadyExists { .. } => "OBJECT_EXISTS",
            Self::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            Self::Rejected { .. } => "OPERATION_REJECTED",
            Self::InvalidSyncToken { .. } => "INVALID_SYNC_TOKEN",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::TargetUnavailable {
            message: message.into(),
        }
    }

    pub fn not_found(identifier: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            identifier: identifier.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
            source: None,
        }
    }

    /// Rejection carrying the error reported by the target client.
    pub fn rejected_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Rejected {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result type for connector calls.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ConnectorError::connection_failed("refused").is_transient());
        assert!(ConnectorError::ConnectionTimeout { timeout_secs: 5 }.is_transient());
        assert!(ConnectorError::unavailable("maintenance").is_transient());

        assert!(!ConnectorError::not_found("u1").is_transient());
        assert!(!ConnectorError::rejected("quota exceeded").is_transient());
        assert!(!ConnectorError::InvalidSyncToken { token: "7".into() }.is_transient());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ConnectorError::ConnectionTimeout { timeout_secs: 1 }.error_code(),
            "CONNECTOR_TIMEOUT"
        );
        assert_eq!(
            ConnectorError::connection_failed("x").error_code(),
            "CONNECTION_FAILED"
        );
        assert_eq!(ConnectorError::not_found("x").error_code(), "OBJECT_NOT_FOUND");
        assert_eq!(ConnectorError::internal("x").error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_rejection_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "ldap code 53");
        let err = ConnectorError::rejected_with_source("unwilling to perform", io);
        assert_eq!(err.to_string(), "operation rejected: unwilling to perform");
        assert!(std::error::Error::source(&err).is_some());
    }
}
