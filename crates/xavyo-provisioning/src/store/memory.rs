//! In-process store backing every store trait.
//!
//! All state sits behind one `RwLock`, so multi-record writes such as
//! [`OperationStore::enqueue_operation`] are atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use xavyo_connector::ids::{BatchId, MappingId, OperationId, SystemId};
use xavyo_connector::operation::AttributeValue;
use xavyo_connector::types::OperationType;

use super::{ConfigStore, IdentityStore, OperationStore, StoreError, StoreResult, SyncLogStore};
use crate::breaker::ProvisioningBreakConfig;
use crate::identity::{
    Account, AccountId, ControlledValue, EntityAccountLink, EntityId, IdentityEntity, LinkId,
    RoleAssignment, RoleAssignmentId,
};
use crate::mapping::{MappingOperation, RoleMapping, SystemMapping};
use crate::operation::{OperationState, ProvisioningBatch, ProvisioningOperation};
use crate::sync::log::{SyncActionLog, SyncItemLog, SyncLog};
use crate::sync::types::{SyncConfigId, SyncLogId, SynchronizationConfig};

#[derive(Default)]
struct State {
    operations: HashMap<OperationId, ProvisioningOperation>,
    operation_seq: HashMap<OperationId, u64>,
    next_seq: u64,
    batches: HashMap<BatchId, ProvisioningBatch>,
    batch_index: HashMap<(SystemId, String), BatchId>,
    batch_history: HashMap<BatchId, Vec<OperationId>>,

    system_mappings: HashMap<MappingId, SystemMapping>,
    role_mappings: HashMap<(SystemId, String), RoleMapping>,
    break_configs: HashMap<(SystemId, OperationType), ProvisioningBreakConfig>,
    sync_configs: HashMap<SyncConfigId, SynchronizationConfig>,

    entities: HashMap<EntityId, IdentityEntity>,
    accounts: HashMap<AccountId, Account>,
    links: HashMap<LinkId, EntityAccountLink>,
    role_assignments: HashMap<RoleAssignmentId, RoleAssignment>,
    controlled_values: HashMap<AccountId, Vec<ControlledValue>>,

    sync_logs: Vec<SyncLog>,
    action_logs: HashMap<SyncLogId, Vec<SyncActionLog>>,
    item_logs: HashMap<SyncLogId, Vec<SyncItemLog>>,
}

/// Store keeping everything in memory.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl OperationStore for InMemoryStore {
    async fn enqueue_operation(
        &self,
        mut operation: ProvisioningOperation,
    ) -> StoreResult<(ProvisioningOperation, ProvisioningBatch)> {
        let mut state = self.state.write().await;
        let key = (operation.system_id, operation.uid.clone());
        let existing = state.batch_index.get(&key).copied();
        let batch_id = match existing {
            Some(id) => id,
            None => {
                let batch = ProvisioningBatch::new(operation.system_id, operation.uid.clone());
                let id = batch.id;
                state.batches.insert(id, batch);
                state.batch_index.insert(key, id);
                id
            }
        };

        operation.batch_id = Some(batch_id);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.operation_seq.insert(operation.id, seq);
        state
            .batch_history
            .entry(batch_id)
            .or_default()
            .push(operation.id);
        state.operations.insert(operation.id, operation.clone());

        let batch = state
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| StoreError::not_found("Batch", batch_id))?;
        batch.operations.push(operation.id);
        let batch = batch.clone();
        Ok((operation, batch))
    }

    async fn update_operation(&self, operation: &ProvisioningOperation) -> StoreResult<()> {
        let mut state = self.state.write().await;
        match state.operations.get_mut(&operation.id) {
            Some(stored) => {
                *stored = operation.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("Operation", operation.id)),
        }
    }

    async fn get_operation(&self, id: OperationId) -> StoreResult<Option<ProvisioningOperation>> {
        Ok(self.state.read().await.operations.get(&id).cloned())
    }

    async fn get_batch(&self, id: BatchId) -> StoreResult<Option<ProvisioningBatch>> {
        Ok(self.state.read().await.batches.get(&id).cloned())
    }

    async fn list_batch_operations(
        &self,
        batch_id: BatchId,
    ) -> StoreResult<Vec<ProvisioningOperation>> {
        let state = self.state.read().await;
        Ok(state
            .batch_history
            .get(&batch_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.operations.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn deactivate_operation(
        &self,
        batch_id: BatchId,
        operation_id: OperationId,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let batch = state
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| StoreError::not_found("Batch", batch_id))?;
        batch.operations.retain(|id| *id != operation_id);
        Ok(())
    }

    async fn list_ready_batches(&self, limit: usize) -> StoreResult<Vec<BatchId>> {
        let state = self.state.read().await;
        let mut ready: Vec<(u64, BatchId)> = state
            .batches
            .values()
            .filter_map(|batch| {
                let head = batch.head()?;
                let operation = state.operations.get(&head)?;
                if operation.state != OperationState::Created {
                    return None;
                }
                let seq = state.operation_seq.get(&head).copied().unwrap_or(u64::MAX);
                Some((seq, batch.id))
            })
            .collect();
        ready.sort_unstable();
        Ok(ready.into_iter().take(limit).map(|(_, id)| id).collect())
    }
}

#[async_trait]
impl ConfigStore for InMemoryStore {
    async fn get_system_mapping(&self, id: MappingId) -> StoreResult<Option<SystemMapping>> {
        Ok(self.state.read().await.system_mappings.get(&id).cloned())
    }

    async fn find_system_mapping(
        &self,
        system_id: SystemId,
        entity_type: &str,
        operation: MappingOperation,
    ) -> StoreResult<Option<SystemMapping>> {
        let state = self.state.read().await;
        Ok(state
            .system_mappings
            .values()
            .find(|m| {
                m.system_id == system_id && m.entity_type == entity_type && m.operation == operation
            })
            .cloned())
    }

    async fn save_system_mapping(&self, mapping: &SystemMapping) -> StoreResult<()> {
        self.state
            .write()
            .await
            .system_mappings
            .insert(mapping.id, mapping.clone());
        Ok(())
    }

    async fn list_role_mappings(&self, system_id: SystemId) -> StoreResult<Vec<RoleMapping>> {
        let state = self.state.read().await;
        let mut mappings: Vec<RoleMapping> = state
            .role_mappings
            .values()
            .filter(|m| m.system_id == system_id)
            .cloned()
            .collect();
        mappings.sort_by(|a, b| a.role_code.cmp(&b.role_code));
        Ok(mappings)
    }

    async fn save_role_mapping(&self, mapping: &RoleMapping) -> StoreResult<()> {
        self.state.write().await.role_mappings.insert(
            (mapping.system_id, mapping.role_code.clone()),
            mapping.clone(),
        );
        Ok(())
    }

    async fn get_break_config(
        &self,
        system_id: SystemId,
        operation_type: OperationType,
    ) -> StoreResult<Option<ProvisioningBreakConfig>> {
        Ok(self
            .state
            .read()
            .await
            .break_configs
            .get(&(system_id, operation_type))
            .cloned())
    }

    async fn save_break_config(&self, config: &ProvisioningBreakConfig) -> StoreResult<()> {
        self.state
            .write()
            .await
            .break_configs
            .insert((config.system_id, config.operation_type), config.clone());
        Ok(())
    }

    async fn get_sync_config(
        &self,
        id: SyncConfigId,
    ) -> StoreResult<Option<SynchronizationConfig>> {
        Ok(self.state.read().await.sync_configs.get(&id).cloned())
    }

    async fn save_sync_config(&self, config: &SynchronizationConfig) -> StoreResult<()> {
        self.state
            .write()
            .await
            .sync_configs
            .insert(config.id, config.clone());
        Ok(())
    }

    async fn update_sync_token(&self, id: SyncConfigId, token: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let config = state
            .sync_configs
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Synchronization config", id))?;
        config.last_token = Some(token.to_string());
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn get_entity(&self, id: EntityId) -> StoreResult<Option<IdentityEntity>> {
        Ok(self.state.read().await.entities.get(&id).cloned())
    }

    async fn find_entities_by_attribute(
        &self,
        entity_type: &str,
        name: &str,
        value: &AttributeValue,
    ) -> StoreResult<Vec<IdentityEntity>> {
        let state = self.state.read().await;
        let mut found: Vec<IdentityEntity> = state
            .entities
            .values()
            .filter(|e| e.entity_type == entity_type)
            .filter(|e| {
                e.attributes.values(name).contains(value)
                    || e.extended_attributes.values(name).contains(value)
            })
            .cloned()
            .collect();
        found.sort_by_key(|e| e.id);
        Ok(found)
    }

    async fn save_entity(&self, entity: &IdentityEntity) -> StoreResult<()> {
        self.state
            .write()
            .await
            .entities
            .insert(entity.id, entity.clone());
        Ok(())
    }

    async fn delete_entity(&self, id: EntityId) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.entities.remove(&id);
        state.links.retain(|_, link| link.entity_id != id);
        state.role_assignments.retain(|_, a| a.entity_id != id);
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.state.read().await.accounts.get(&id).cloned())
    }

    async fn find_account(&self, system_id: SystemId, uid: &str) -> StoreResult<Option<Account>> {
        Ok(self
            .state
            .read()
            .await
            .accounts
            .values()
            .find(|a| a.system_id == system_id && a.uid == uid)
            .cloned())
    }

    async fn list_accounts(&self, system_id: SystemId) -> StoreResult<Vec<Account>> {
        let state = self.state.read().await;
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.system_id == system_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(accounts)
    }

    async fn save_account(&self, account: &Account) -> StoreResult<()> {
        self.state
            .write()
            .await
            .accounts
            .insert(account.id, account.clone());
        Ok(())
    }

    async fn delete_account(&self, id: AccountId) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.accounts.remove(&id);
        state.links.retain(|_, link| link.account_id != id);
        state.controlled_values.remove(&id);
        Ok(())
    }

    async fn find_link_by_account(
        &self,
        account_id: AccountId,
    ) -> StoreResult<Option<EntityAccountLink>> {
        Ok(self
            .state
            .read()
            .await
            .links
            .values()
            .find(|l| l.account_id == account_id)
            .cloned())
    }

    async fn list_links_for_entity(
        &self,
        entity_id: EntityId,
    ) -> StoreResult<Vec<EntityAccountLink>> {
        let state = self.state.read().await;
        let mut links: Vec<EntityAccountLink> = state
            .links
            .values()
            .filter(|l| l.entity_id == entity_id)
            .cloned()
            .collect();
        links.sort_by_key(|l| l.created_at);
        Ok(links)
    }

    async fn save_link(&self, link: &EntityAccountLink) -> StoreResult<()> {
        self.state.write().await.links.insert(link.id, link.clone());
        Ok(())
    }

    async fn delete_link(&self, id: LinkId) -> StoreResult<()> {
        self.state.write().await.links.remove(&id);
        Ok(())
    }

    async fn list_role_assignments(
        &self,
        entity_id: EntityId,
    ) -> StoreResult<Vec<RoleAssignment>> {
        let state = self.state.read().await;
        let mut assignments: Vec<RoleAssignment> = state
            .role_assignments
            .values()
            .filter(|a| a.entity_id == entity_id)
            .cloned()
            .collect();
        assignments.sort_by(|a, b| a.role_code.cmp(&b.role_code));
        Ok(assignments)
    }

    async fn save_role_assignment(&self, assignment: &RoleAssignment) -> StoreResult<()> {
        self.state
            .write()
            .await
            .role_assignments
            .insert(assignment.id, assignment.clone());
        Ok(())
    }

    async fn delete_role_assignment(&self, id: RoleAssignmentId) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.role_assignments.remove(&id);
        for link in state.links.values_mut() {
            if link.role_assignment_id == Some(id) {
                link.role_assignment_id = None;
            }
        }
        Ok(())
    }

    async fn get_controlled_values(
        &self,
        account_id: AccountId,
    ) -> StoreResult<Vec<ControlledValue>> {
        Ok(self
            .state
            .read()
            .await
            .controlled_values
            .get(&account_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_controlled_values(
        &self,
        account_id: AccountId,
        values: &[ControlledValue],
    ) -> StoreResult<()> {
        self.state
            .write()
            .await
            .controlled_values
            .insert(account_id, values.to_vec());
        Ok(())
    }
}

#[async_trait]
impl SyncLogStore for InMemoryStore {
    async fn save_log(&self, log: &SyncLog) -> StoreResult<()> {
        let mut state = self.state.write().await;
        match state.sync_logs.iter_mut().find(|l| l.id == log.id) {
            Some(stored) => *stored = log.clone(),
            None => state.sync_logs.push(log.clone()),
        }
        Ok(())
    }

    async fn get_log(&self, id: SyncLogId) -> StoreResult<Option<SyncLog>> {
        Ok(self
            .state
            .read()
            .await
            .sync_logs
            .iter()
            .find(|l| l.id == id)
            .cloned())
    }

    async fn list_logs(&self, config_id: SyncConfigId) -> StoreResult<Vec<SyncLog>> {
        Ok(self
            .state
            .read()
            .await
            .sync_logs
            .iter()
            .filter(|l| l.config_id == config_id)
            .cloned()
            .collect())
    }

    async fn save_action_log(&self, log: &SyncActionLog) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let logs = state.action_logs.entry(log.log_id).or_default();
        match logs.iter_mut().find(|l| l.id == log.id) {
            Some(stored) => *stored = log.clone(),
            None => logs.push(log.clone()),
        }
        Ok(())
    }

    async fn list_action_logs(&self, log_id: SyncLogId) -> StoreResult<Vec<SyncActionLog>> {
        Ok(self
            .state
            .read()
            .await
            .action_logs
            .get(&log_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_item_log(&self, log_id: SyncLogId, item: &SyncItemLog) -> StoreResult<()> {
        self.state
            .write()
            .await
            .item_logs
            .entry(log_id)
            .or_default()
            .push(item.clone());
        Ok(())
    }

    async fn list_item_logs(&self, log_id: SyncLogId) -> StoreResult<Vec<SyncItemLog>> {
        Ok(self
            .state
            .read()
            .await
            .item_logs
            .get(&log_id)
            .cloned()
            .unwrap_or_default())
    }
}
