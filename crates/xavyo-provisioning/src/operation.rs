//! Provisioning operations and batches.
//!
//! Every outbound change is a [`ProvisioningOperation`]. Operations for the
//! same account on the same system are grouped into one
//! [`ProvisioningBatch`] that fixes their execution order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use xavyo_connector::ids::{BatchId, OperationId, SystemId};
use xavyo_connector::operation::{AttributeSet, AttributeValue};
use xavyo_connector::types::OperationType;

use crate::identity::EntityId;

/// Result codes recorded on operations besides connector error codes.
pub mod result_codes {
    /// The connector call succeeded.
    pub const EXECUTED: &str = "EXECUTED";
    /// An operator canceled the operation.
    pub const CANCELED: &str = "CANCELED";
    /// The circuit breaker for the system and operation type is open.
    pub const BREAKER_OPEN: &str = "BREAKER_OPEN";
    /// The account was removed while the operation was waiting.
    pub const SYSTEM_ENTITY_DELETED: &str = "SYSTEM_ENTITY_DELETED";
}

const MASK: &str = "********";

/// Lifecycle state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationState {
    /// Waiting in its batch.
    #[default]
    Created,
    /// Connector call succeeded (terminal).
    Executed,
    /// Connector call failed; blocks the batch until retried or canceled.
    Exception,
    /// Skipped without a connector call; retryable.
    NotExecuted,
    /// Canceled by an operator (terminal).
    Canceled,
}

impl OperationState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Created => "CREATED",
            OperationState::Executed => "EXECUTED",
            OperationState::Exception => "EXCEPTION",
            OperationState::NotExecuted => "NOT_EXECUTED",
            OperationState::Canceled => "CANCELED",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Executed | OperationState::Canceled)
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, OperationState::Exception | OperationState::NotExecuted)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREATED" => Ok(OperationState::Created),
            "EXECUTED" => Ok(OperationState::Executed),
            "EXCEPTION" => Ok(OperationState::Exception),
            "NOT_EXECUTED" => Ok(OperationState::NotExecuted),
            "CANCELED" => Ok(OperationState::Canceled),
            _ => Err(format!("Unknown operation state: {s}")),
        }
    }
}

/// Result code and cause of the last state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub code: String,
    pub cause: Option<String>,
}

impl OperationResult {
    pub fn new(code: impl Into<String>, cause: Option<String>) -> Self {
        Self {
            code: code.into(),
            cause,
        }
    }
}

/// What an operation sends and what the target looked like beforehand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPayload {
    pub object_class: String,
    /// Account attributes to send.
    pub attributes: AttributeSet,
    /// Target object as read before the operation was built.
    pub snapshot: Option<AttributeSet>,
    /// Attribute names whose values must not be logged.
    #[serde(default)]
    pub confidential: BTreeSet<String>,
}

impl OperationPayload {
    pub fn new(object_class: impl Into<String>, attributes: AttributeSet) -> Self {
        Self {
            object_class: object_class.into(),
            attributes,
            snapshot: None,
            confidential: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_snapshot(mut self, snapshot: Option<AttributeSet>) -> Self {
        self.snapshot = snapshot;
        self
    }

    #[must_use]
    pub fn with_confidential(mut self, confidential: BTreeSet<String>) -> Self {
        self.confidential = confidential;
        self
    }

    /// Attributes with confidential values masked, for logs and audit.
    #[must_use]
    pub fn redacted(&self) -> AttributeSet {
        self.attributes
            .iter()
            .map(|(name, values)| {
                if self.confidential.contains(name) {
                    let masked = values
                        .iter()
                        .map(|_| AttributeValue::from(MASK))
                        .collect();
                    (name.clone(), masked)
                } else {
                    (name.clone(), values.clone())
                }
            })
            .collect()
    }
}

/// One outbound change for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningOperation {
    pub id: OperationId,
    pub operation_type: OperationType,
    pub system_id: SystemId,
    pub entity_type: String,
    pub entity_id: Option<EntityId>,
    /// UID of the account on the target system.
    pub uid: String,
    pub payload: OperationPayload,
    pub state: OperationState,
    pub result: Option<OperationResult>,
    pub batch_id: Option<BatchId>,
    /// Number of connector attempts so far.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProvisioningOperation {
    pub fn new(
        operation_type: OperationType,
        system_id: SystemId,
        entity_type: impl Into<String>,
        uid: impl Into<String>,
        payload: OperationPayload,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OperationId::new(),
            operation_type,
            system_id,
            entity_type: entity_type.into(),
            entity_id: None,
            uid: uid.into(),
            payload,
            state: OperationState::Created,
            result: None,
            batch_id: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_entity(mut self, entity_id: EntityId) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn mark_executed(&mut self) {
        self.transition(OperationState::Executed, result_codes::EXECUTED, None);
    }

    pub fn mark_exception(&mut self, code: impl Into<String>, cause: impl Into<String>) {
        self.transition(OperationState::Exception, code, Some(cause.into()));
    }

    pub fn mark_not_executed(&mut self, code: impl Into<String>, cause: impl Into<String>) {
        self.transition(OperationState::NotExecuted, code, Some(cause.into()));
    }

    pub fn mark_canceled(&mut self) {
        self.transition(OperationState::Canceled, result_codes::CANCELED, None);
    }

    /// Result code of the last transition, if any.
    #[must_use]
    pub fn result_code(&self) -> Option<&str> {
        self.result.as_ref().map(|r| r.code.as_str())
    }

    fn transition(&mut self, state: OperationState, code: impl Into<String>, cause: Option<String>) {
        self.state = state;
        self.result = Some(OperationResult::new(code, cause));
        self.updated_at = Utc::now();
    }
}

/// Ordered, not-yet-terminal operations of one account on one system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningBatch {
    pub id: BatchId,
    pub system_id: SystemId,
    pub uid: String,
    /// Active operations in enqueue order.
    pub operations: Vec<OperationId>,
    pub created_at: DateTime<Utc>,
}

impl ProvisioningBatch {
    pub fn new(system_id: SystemId, uid: impl Into<String>) -> Self {
        Self {
            id: BatchId::new(),
            system_id,
            uid: uid.into(),
            operations: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// First active operation.
    #[must_use]
    pub fn head(&self) -> Option<OperationId> {
        self.operations.first().copied()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.operations.is_empty()
    }
}
