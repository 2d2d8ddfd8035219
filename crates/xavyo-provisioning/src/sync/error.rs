//! Sync-specific error types.

use thiserror::Error;
use xavyo_connector::error::ConnectorError;

use super::types::{SyncActionType, SyncConfigId, SyncLogId, SyncSituation};
use crate::provisioning::ProvisioningError;
use crate::queue::QueueError;
use crate::store::StoreError;
use crate::transform::TransformError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Connector error.
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Provisioning of an account failed.
    #[error("Provisioning error: {0}")]
    Provisioning(#[from] ProvisioningError),

    /// Queue error.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Inbound value transformation failed.
    #[error("Transform error on '{attribute}': {source}")]
    Transform {
        attribute: String,
        #[source]
        source: TransformError,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The configuration is disabled.
    #[error("Synchronization {config_id} is disabled")]
    Disabled { config_id: SyncConfigId },

    /// Another run of the configuration is in progress.
    #[error("Synchronization {config_id} is already running")]
    AlreadyRunning { config_id: SyncConfigId },

    /// No run with this log is in progress.
    #[error("No running synchronization for log {log_id}")]
    NotRunning { log_id: SyncLogId },

    /// An action is configured for a situation that does not allow it.
    #[error("Action {action} is not valid for situation {situation}")]
    InvalidAction {
        situation: SyncSituation,
        action: SyncActionType,
    },

    /// Correlation matched more than one entity.
    #[error("Correlation error: {message}")]
    Correlation { message: String },

    /// The item lacks the record the action works on.
    #[error("Action {action} needs {what}")]
    MissingContext {
        action: SyncActionType,
        what: &'static str,
    },
}

impl SyncError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        SyncError::Configuration {
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        SyncError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a correlation error.
    pub fn correlation(message: impl Into<String>) -> Self {
        SyncError::Correlation {
            message: message.into(),
        }
    }

    /// Create a missing-context error.
    #[must_use]
    pub fn missing(action: SyncActionType, what: &'static str) -> Self {
        SyncError::MissingContext { action, what }
    }

    /// Whether the error aborts the whole run rather than one item.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Store(_)
            | SyncError::Configuration { .. }
            | SyncError::NotFound { .. }
            | SyncError::Disabled { .. }
            | SyncError::AlreadyRunning { .. }
            | SyncError::NotRunning { .. }
            | SyncError::InvalidAction { .. }
            | SyncError::Transform { .. } => true,
            SyncError::Provisioning(e) => e.is_fatal(),
            SyncError::Queue(e) => e.is_fatal(),
            SyncError::Connector(_)
            | SyncError::Correlation { .. }
            | SyncError::MissingContext { .. } => false,
        }
    }
}
