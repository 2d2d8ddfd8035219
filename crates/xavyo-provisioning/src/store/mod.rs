//! Persistence seams of the engine.
//!
//! The engine reads and writes through four async traits. [`memory`] holds
//! an in-process implementation of all of them; [`postgres`] persists the
//! operation queue with sqlx.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use xavyo_connector::ids::{BatchId, MappingId, OperationId, SystemId};
use xavyo_connector::operation::AttributeValue;
use xavyo_connector::types::OperationType;

use crate::breaker::ProvisioningBreakConfig;
use crate::identity::{
    Account, AccountId, ControlledValue, EntityAccountLink, EntityId, IdentityEntity, LinkId,
    RoleAssignment, RoleAssignmentId,
};
use crate::mapping::{MappingOperation, RoleMapping, SystemMapping};
use crate::operation::{ProvisioningBatch, ProvisioningOperation};
use crate::sync::log::{SyncActionLog, SyncItemLog, SyncLog};
use crate::sync::types::{SyncConfigId, SyncLogId, SynchronizationConfig};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Stored value could not be decoded.
    #[error("Invalid stored value: {0}")]
    InvalidData(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Operations and their batches.
#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Persist a new operation and append it to the batch of its
    /// (system, uid), creating the batch when needed. Atomic.
    async fn enqueue_operation(
        &self,
        operation: ProvisioningOperation,
    ) -> StoreResult<(ProvisioningOperation, ProvisioningBatch)>;

    /// Overwrite an existing operation.
    async fn update_operation(&self, operation: &ProvisioningOperation) -> StoreResult<()>;

    async fn get_operation(&self, id: OperationId) -> StoreResult<Option<ProvisioningOperation>>;

    async fn get_batch(&self, id: BatchId) -> StoreResult<Option<ProvisioningBatch>>;

    /// Every operation ever enqueued in the batch, in enqueue order.
    async fn list_batch_operations(
        &self,
        batch_id: BatchId,
    ) -> StoreResult<Vec<ProvisioningOperation>>;

    /// Remove an operation from the active set of its batch.
    async fn deactivate_operation(
        &self,
        batch_id: BatchId,
        operation_id: OperationId,
    ) -> StoreResult<()>;

    /// Batches whose head operation is waiting, oldest head first.
    async fn list_ready_batches(&self, limit: usize) -> StoreResult<Vec<BatchId>>;
}

/// Mappings, breaker settings and synchronization configurations.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_system_mapping(&self, id: MappingId) -> StoreResult<Option<SystemMapping>>;

    async fn find_system_mapping(
        &self,
        system_id: SystemId,
        entity_type: &str,
        operation: MappingOperation,
    ) -> StoreResult<Option<SystemMapping>>;

    async fn save_system_mapping(&self, mapping: &SystemMapping) -> StoreResult<()>;

    async fn list_role_mappings(&self, system_id: SystemId) -> StoreResult<Vec<RoleMapping>>;

    async fn save_role_mapping(&self, mapping: &RoleMapping) -> StoreResult<()>;

    async fn get_break_config(
        &self,
        system_id: SystemId,
        operation_type: OperationType,
    ) -> StoreResult<Option<ProvisioningBreakConfig>>;

    async fn save_break_config(&self, config: &ProvisioningBreakConfig) -> StoreResult<()>;

    async fn get_sync_config(
        &self,
        id: SyncConfigId,
    ) -> StoreResult<Option<SynchronizationConfig>>;

    async fn save_sync_config(&self, config: &SynchronizationConfig) -> StoreResult<()>;

    /// Store the resume token of a configuration, leaving every other field
    /// as currently stored.
    async fn update_sync_token(&self, id: SyncConfigId, token: &str) -> StoreResult<()>;
}

/// Entities, accounts, links, role assignments and controlled values.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get_entity(&self, id: EntityId) -> StoreResult<Option<IdentityEntity>>;

    /// Entities of a type whose core or extended property holds `value`.
    async fn find_entities_by_attribute(
        &self,
        entity_type: &str,
        name: &str,
        value: &AttributeValue,
    ) -> StoreResult<Vec<IdentityEntity>>;

    async fn save_entity(&self, entity: &IdentityEntity) -> StoreResult<()>;

    /// Delete an entity together with its links and role assignments.
    async fn delete_entity(&self, id: EntityId) -> StoreResult<()>;

    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>>;

    async fn find_account(&self, system_id: SystemId, uid: &str) -> StoreResult<Option<Account>>;

    async fn list_accounts(&self, system_id: SystemId) -> StoreResult<Vec<Account>>;

    async fn save_account(&self, account: &Account) -> StoreResult<()>;

    /// Delete an account together with its links and controlled values.
    async fn delete_account(&self, id: AccountId) -> StoreResult<()>;

    async fn find_link_by_account(
        &self,
        account_id: AccountId,
    ) -> StoreResult<Option<EntityAccountLink>>;

    async fn list_links_for_entity(&self, entity_id: EntityId)
        -> StoreResult<Vec<EntityAccountLink>>;

    async fn save_link(&self, link: &EntityAccountLink) -> StoreResult<()>;

    async fn delete_link(&self, id: LinkId) -> StoreResult<()>;

    async fn list_role_assignments(&self, entity_id: EntityId) -> StoreResult<Vec<RoleAssignment>>;

    async fn save_role_assignment(&self, assignment: &RoleAssignment) -> StoreResult<()>;

    async fn delete_role_assignment(&self, id: RoleAssignmentId) -> StoreResult<()>;

    async fn get_controlled_values(&self, account_id: AccountId)
        -> StoreResult<Vec<ControlledValue>>;

    /// Replace the controlled values of an account.
    async fn save_controlled_values(
        &self,
        account_id: AccountId,
        values: &[ControlledValue],
    ) -> StoreResult<()>;
}

/// Synchronization run logs.
#[async_trait]
pub trait SyncLogStore: Send + Sync {
    async fn save_log(&self, log: &SyncLog) -> StoreResult<()>;

    async fn get_log(&self, id: SyncLogId) -> StoreResult<Option<SyncLog>>;

    /// Logs of a configuration, oldest first.
    async fn list_logs(&self, config_id: SyncConfigId) -> StoreResult<Vec<SyncLog>>;

    async fn save_action_log(&self, log: &SyncActionLog) -> StoreResult<()>;

    async fn list_action_logs(&self, log_id: SyncLogId) -> StoreResult<Vec<SyncActionLog>>;

    async fn append_item_log(&self, log_id: SyncLogId, item: &SyncItemLog) -> StoreResult<()>;

    /// Item logs of a run in insertion order.
    async fn list_item_logs(&self, log_id: SyncLogId) -> StoreResult<Vec<SyncItemLog>>;
}
