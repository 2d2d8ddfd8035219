//! Synchronization Reconciler Tests
//!
//! Drives full and incremental runs against the mock change feed and checks
//! classification, action effects, logging, cancellation, run exclusivity and
//! the handling of fatal errors.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Harness, ENTITY_TYPE, OBJECT_CLASS};
use xavyo_connector::ids::{MappingId, SystemId};
use xavyo_connector::operation::{AttributeSet, AttributeValue, ENABLE_ATTRIBUTE};
use xavyo_connector::traits::SyncDelta;
use xavyo_connector::types::OperationType;
use xavyo_provisioning::store::memory::InMemoryStore;
use xavyo_provisioning::store::{ConfigStore, IdentityStore, StoreError, StoreResult};
use xavyo_provisioning::sync::{ItemOutcome, PlannedAction, SyncConfigId};
use xavyo_provisioning::{
    Account, AttributeMapping, EntityAccountLink, IdentityEntity, InactiveOwnerBehavior,
    MappingOperation, ProvisioningBreakConfig, ProvisioningError, RoleAssignment, RoleMapping,
    SyncActionType, SyncError, SyncLog, SyncLogId, SyncReconciler, SyncSituation,
    SynchronizationConfig, SystemMapping,
};

fn remote(login: &str, mail: &str) -> SyncDelta {
    SyncDelta::upsert(login, AttributeSet::new().with("login", login).with("mail", mail))
}

fn config(h: &Harness) -> SynchronizationConfig {
    SynchronizationConfig::new("hr-feed", h.sync_mapping.id).with_correlation_attribute("email")
}

async fn save(h: &Harness, config: SynchronizationConfig) -> SynchronizationConfig {
    h.store.save_sync_config(&config).await.unwrap();
    config
}

/// Entity with a linked account whose remote object is absent.
async fn linked(h: &Harness, username: &str) -> (IdentityEntity, Account, EntityAccountLink) {
    let entity = h.entity(username, &format!("{username}@example.com")).await;
    let account = Account::new(h.system_id, username, ENTITY_TYPE);
    h.store.save_account(&account).await.unwrap();
    let link = EntityAccountLink::new(entity.id, account.id);
    h.store.save_link(&link).await.unwrap();
    (entity, account, link)
}

async fn owner_of(h: &Harness, uid: &str) -> Option<IdentityEntity> {
    let account = h.store.find_account(h.system_id, uid).await.unwrap()?;
    let link = h.store.find_link_by_account(account.id).await.unwrap()?;
    h.store.get_entity(link.entity_id).await.unwrap()
}

#[tokio::test]
async fn test_missing_entity_creates_entity_and_link() {
    let h = Harness::new().await;
    h.connector.push_deltas(vec![remote("u1", "U1@Example.com")]);
    let config = save(
        &h,
        config(&h).with_action(SyncSituation::MissingEntity, SyncActionType::CreateEntity),
    )
    .await;

    let log = h.reconciler.run_sync(config.id).await.unwrap();

    assert!(!log.running);
    assert!(log.ended_at.is_some());
    assert!(!log.contains_error);
    assert!(!log.cancelled);

    let items = h.reconciler.item_logs(log.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].uid, "u1");
    assert_eq!(items[0].outcome, ItemOutcome::Success);
    assert_eq!(items[0].display_name.as_deref(), Some("u1"));

    let entity = owner_of(&h, "u1").await.unwrap();
    assert!(entity.is_active());
    assert_eq!(entity.attributes.get_string("username"), Some("u1"));
    assert_eq!(entity.attributes.get_string("email"), Some("u1@example.com"));

    let actions = h.reconciler.action_logs(log.id).await.unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action, SyncActionType::CreateEntity);
    assert_eq!(actions[0].count, 1);
    assert_eq!(items[0].action_log_id, actions[0].id);
}

#[tokio::test]
async fn test_unlinked_account_is_linked_and_updated() {
    let h = Harness::new().await;
    let entity = h.entity("alice-old", "alice@example.com").await;
    h.connector
        .push_deltas(vec![remote("alice", "ALICE@example.com")]);
    let config = save(
        &h,
        config(&h).with_action(SyncSituation::Unlinked, SyncActionType::LinkAndUpdateEntity),
    )
    .await;

    h.reconciler.run_sync(config.id).await.unwrap();

    let owner = owner_of(&h, "alice").await.unwrap();
    assert_eq!(owner.id, entity.id);
    assert_eq!(owner.attributes.get_string("username"), Some("alice"));

    // Linked now; LINKED has no action configured.
    let log = h.reconciler.run_sync(config.id).await.unwrap();
    let actions = h.reconciler.action_logs(log.id).await.unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action, SyncActionType::Ignore);
    assert_eq!(actions[0].outcome, ItemOutcome::Success);
    let items = h.reconciler.item_logs(log.id).await.unwrap();
    assert_eq!(items[0].message.as_deref(), Some("ignored"));
}

#[tokio::test]
async fn test_link_keeps_entity_untouched() {
    let h = Harness::new().await;
    let entity = h.entity("alice-old", "alice@example.com").await;
    h.connector.push_deltas(vec![remote("alice", "alice@example.com")]);
    let config = save(
        &h,
        config(&h).with_action(SyncSituation::Unlinked, SyncActionType::Link),
    )
    .await;

    h.reconciler.run_sync(config.id).await.unwrap();

    let owner = owner_of(&h, "alice").await.unwrap();
    assert_eq!(owner.id, entity.id);
    assert_eq!(owner.attributes.get_string("username"), Some("alice-old"));
}

#[tokio::test]
async fn test_linked_account_updates_entity() {
    let h = Harness::new().await;
    let (entity, _, _) = linked(&h, "bob").await;
    h.connector
        .push_deltas(vec![remote("bob", "Robert@Example.com")]);
    let config = save(
        &h,
        config(&h).with_action(SyncSituation::Linked, SyncActionType::UpdateEntity),
    )
    .await;

    h.reconciler.run_sync(config.id).await.unwrap();

    let entity = h.store.get_entity(entity.id).await.unwrap().unwrap();
    assert_eq!(entity.attributes.get_string("email"), Some("robert@example.com"));
}

#[tokio::test]
async fn test_unseen_account_is_unlinked_on_full_run() {
    let h = Harness::new().await;
    let (entity, account, _) = linked(&h, "carol").await;
    let config = save(
        &h,
        config(&h).with_action(SyncSituation::MissingAccount, SyncActionType::Unlink),
    )
    .await;

    let log = h.reconciler.run_sync(config.id).await.unwrap();

    let items = h.reconciler.item_logs(log.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].uid, "carol");
    assert_eq!(items[0].outcome, ItemOutcome::Success);
    assert!(h.store.list_links_for_entity(entity.id).await.unwrap().is_empty());
    assert!(h.store.get_account(account.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unlink_and_remove_role() {
    let h = Harness::new().await;
    let entity = h.entity("dave", "dave@example.com").await;
    let assignment = RoleAssignment::new(entity.id, "employee", 10);
    h.store.save_role_assignment(&assignment).await.unwrap();
    let account = Account::new(h.system_id, "dave", ENTITY_TYPE);
    h.store.save_account(&account).await.unwrap();
    h.store
        .save_link(&EntityAccountLink::new(entity.id, account.id).via_role(assignment.id))
        .await
        .unwrap();
    h.connector.push_deltas(vec![SyncDelta::deleted("dave")]);
    let config = save(
        &h,
        config(&h).with_action(
            SyncSituation::MissingAccount,
            SyncActionType::UnlinkAndRemoveRole,
        ),
    )
    .await;

    h.reconciler.run_sync(config.id).await.unwrap();

    assert!(h.store.list_links_for_entity(entity.id).await.unwrap().is_empty());
    assert!(h.store.list_role_assignments(entity.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_account_recreates_remote_account() {
    let h = Harness::new().await;
    linked(&h, "erin").await;
    let config = save(
        &h,
        config(&h).with_action(SyncSituation::MissingAccount, SyncActionType::CreateAccount),
    )
    .await;

    let log = h.reconciler.run_sync(config.id).await.unwrap();

    assert_eq!(h.connector.create_calls(), 1);
    assert_eq!(
        h.connector.object("erin").unwrap().get_string("mail"),
        Some("erin@example.com")
    );
    let items = h.reconciler.item_logs(log.id).await.unwrap();
    assert_eq!(items[0].outcome, ItemOutcome::Success);
}

#[tokio::test]
async fn test_missing_entity_deletes_account() {
    let h = Harness::new().await;
    h.connector
        .put_object("ghost", AttributeSet::new().with("login", "ghost"));
    h.connector.push_deltas(vec![remote("ghost", "ghost@example.com")]);
    let config = save(
        &h,
        config(&h).with_action(SyncSituation::MissingEntity, SyncActionType::DeleteAccount),
    )
    .await;

    let log = h.reconciler.run_sync(config.id).await.unwrap();

    assert_eq!(h.connector.delete_calls(), 1);
    assert!(h.connector.object("ghost").is_none());
    assert!(h
        .store
        .find_account(h.system_id, "ghost")
        .await
        .unwrap()
        .is_none());
    let items = h.reconciler.item_logs(log.id).await.unwrap();
    assert_eq!(items[0].outcome, ItemOutcome::Success);
}

#[tokio::test]
async fn test_missing_entity_disables_account() {
    let h = Harness::new().await;
    h.connector
        .put_object("ghost", AttributeSet::new().with("login", "ghost"));
    h.connector.push_deltas(vec![remote("ghost", "ghost@example.com")]);
    let config = save(
        &h,
        config(&h).with_action(SyncSituation::MissingEntity, SyncActionType::DisableAccount),
    )
    .await;

    h.reconciler.run_sync(config.id).await.unwrap();

    let object = h.connector.object("ghost").unwrap();
    assert_eq!(
        object.first(ENABLE_ATTRIBUTE),
        Some(&AttributeValue::from(false))
    );
    assert!(h
        .store
        .find_account(h.system_id, "ghost")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_failed_operation_is_item_error() {
    let h = Harness::new().await;
    h.connector
        .put_object("ghost", AttributeSet::new().with("login", "ghost"));
    h.connector.set_fail_delete(true);
    h.connector.push_deltas(vec![remote("ghost", "ghost@example.com")]);
    let config = save(
        &h,
        config(&h).with_action(SyncSituation::MissingEntity, SyncActionType::DeleteAccount),
    )
    .await;

    let log = h.reconciler.run_sync(config.id).await.unwrap();

    assert!(log.contains_error);
    assert!(log.error.is_none());
    let items = h.reconciler.item_logs(log.id).await.unwrap();
    assert_eq!(items[0].outcome, ItemOutcome::Error);
    assert!(items[0]
        .message
        .as_deref()
        .unwrap()
        .starts_with("CONNECTION_FAILED"));
}

#[tokio::test]
async fn test_delete_of_unknown_account_is_warning() {
    let h = Harness::new().await;
    h.connector.push_deltas(vec![SyncDelta::deleted("nobody")]);
    let config = save(
        &h,
        config(&h).with_action(SyncSituation::MissingAccount, SyncActionType::DeleteEntity),
    )
    .await;

    let log = h.reconciler.run_sync(config.id).await.unwrap();

    let items = h.reconciler.item_logs(log.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].outcome, ItemOutcome::Warning);
    assert!(!log.contains_error);
}

#[tokio::test]
async fn test_missing_account_deletes_entity() {
    let h = Harness::new().await;
    let (entity, account, _) = linked(&h, "frank").await;
    h.connector.push_deltas(vec![SyncDelta::deleted("frank")]);
    let config = save(
        &h,
        config(&h).with_action(SyncSituation::MissingAccount, SyncActionType::DeleteEntity),
    )
    .await;

    h.reconciler.run_sync(config.id).await.unwrap();

    assert!(h.store.get_entity(entity.id).await.unwrap().is_none());
    assert!(h.store.get_account(account.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_ambiguous_correlation_is_item_error() {
    let h = Harness::new().await;
    h.entity("twin-a", "twin@example.com").await;
    h.entity("twin-b", "twin@example.com").await;
    h.connector.push_deltas(vec![
        remote("twin", "twin@example.com"),
        remote("solo", "solo@example.com"),
    ]);
    let config = save(
        &h,
        config(&h).with_action(SyncSituation::MissingEntity, SyncActionType::CreateEntity),
    )
    .await;

    let log = h.reconciler.run_sync(config.id).await.unwrap();

    assert!(log.contains_error);
    assert!(log.error.is_none());
    let items = h.reconciler.item_logs(log.id).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].uid, "twin");
    assert_eq!(items[0].outcome, ItemOutcome::Error);
    assert_eq!(items[1].uid, "solo");
    assert_eq!(items[1].outcome, ItemOutcome::Success);
    assert!(owner_of(&h, "twin").await.is_none());
}

async fn inactive_owner_run(
    behavior: InactiveOwnerBehavior,
) -> (Harness, IdentityEntity, SyncLog) {
    let h = Harness::new().await;
    let entity = IdentityEntity::new(ENTITY_TYPE)
        .with_attribute("username", "gina")
        .with_attribute("email", "gina@example.com")
        .disabled();
    h.store.save_entity(&entity).await.unwrap();
    h.connector.push_deltas(vec![remote("gina", "gina@example.com")]);
    let config = save(
        &h,
        config(&h)
            .with_action(SyncSituation::Unlinked, SyncActionType::Link)
            .with_inactive_owner_behavior(behavior),
    )
    .await;
    let log = h.reconciler.run_sync(config.id).await.unwrap();
    (h, entity, log)
}

#[tokio::test]
async fn test_inactive_owner_not_linked() {
    let (h, _, log) = inactive_owner_run(InactiveOwnerBehavior::DoNotLink).await;

    assert!(h
        .store
        .find_account(h.system_id, "gina")
        .await
        .unwrap()
        .is_none());
    let items = h.reconciler.item_logs(log.id).await.unwrap();
    assert_eq!(items[0].outcome, ItemOutcome::Warning);
}

#[tokio::test]
async fn test_inactive_owner_linked_protected() {
    let (h, entity, _) = inactive_owner_run(InactiveOwnerBehavior::LinkProtected).await;

    let account = h
        .store
        .find_account(h.system_id, "gina")
        .await
        .unwrap()
        .unwrap();
    assert!(account.in_protection);
    assert_eq!(owner_of(&h, "gina").await.unwrap().id, entity.id);
}

#[tokio::test]
async fn test_inactive_owner_linked() {
    let (h, entity, _) = inactive_owner_run(InactiveOwnerBehavior::Link).await;

    let account = h
        .store
        .find_account(h.system_id, "gina")
        .await
        .unwrap()
        .unwrap();
    assert!(!account.in_protection);
    assert_eq!(owner_of(&h, "gina").await.unwrap().id, entity.id);
}

#[tokio::test]
async fn test_invalid_action_is_fatal() {
    let h = Harness::new().await;
    h.connector.push_deltas(vec![remote("u1", "u1@example.com")]);
    let config = save(
        &h,
        config(&h).with_action(SyncSituation::Linked, SyncActionType::CreateEntity),
    )
    .await;

    let err = h.reconciler.run_sync(config.id).await.unwrap_err();

    assert!(matches!(
        err,
        SyncError::InvalidAction {
            situation: SyncSituation::Linked,
            action: SyncActionType::CreateEntity,
        }
    ));
    assert!(h.reconciler.logs(config.id).await.unwrap().is_empty());
    assert!(h.connector.sync_tokens().is_empty());
}

#[tokio::test]
async fn test_disabled_config_is_rejected() {
    let h = Harness::new().await;
    let mut config = config(&h);
    config.enabled = false;
    let config = save(&h, config).await;

    let err = h.reconciler.run_sync(config.id).await.unwrap_err();
    assert!(matches!(err, SyncError::Disabled { .. }));
}

#[tokio::test]
async fn test_second_concurrent_run_is_rejected() {
    let h = Harness::new().await;
    h.connector.set_delay(Duration::from_millis(200));
    h.connector.push_deltas(vec![remote("u1", "u1@example.com")]);
    let config = save(&h, config(&h)).await;

    let first = tokio::spawn({
        let reconciler = h.reconciler.clone();
        let config_id = config.id;
        async move { reconciler.run_sync(config_id).await }
    });
    while !h.reconciler.is_running(config.id) {
        tokio::task::yield_now().await;
    }

    let err = h.reconciler.run_sync(config.id).await.unwrap_err();
    assert!(matches!(err, SyncError::AlreadyRunning { .. }));

    first.await.unwrap().unwrap();
    assert!(!h.reconciler.is_running(config.id));
    h.connector.set_delay(Duration::ZERO);
    h.reconciler.run_sync(config.id).await.unwrap();
}

#[tokio::test]
async fn test_cancellation_leaves_last_token() {
    let h = Harness::new().await;
    h.connector.push_deltas(vec![
        remote("u1", "u1@example.com"),
        remote("u2", "u2@example.com"),
        remote("u3", "u3@example.com"),
    ]);
    let config = save(
        &h,
        config(&h)
            .with_token_attribute("modifyTimestamp")
            .with_action(SyncSituation::MissingEntity, SyncActionType::CreateEntity),
    )
    .await;

    let reconciler = Arc::downgrade(&h.reconciler);
    let config_id = config.id;
    h.connector.on_sync(move || {
        if let Some(reconciler) = reconciler.upgrade() {
            if let Some(log_id) = reconciler.running_log(config_id) {
                reconciler.cancel_sync(log_id).unwrap();
            }
        }
    });

    let log = h.reconciler.run_sync(config.id).await.unwrap();

    assert!(log.cancelled);
    assert!(!log.running);
    assert!(log.token.is_none());
    assert!(h.reconciler.item_logs(log.id).await.unwrap().is_empty());
    let stored = h.store.get_sync_config(config.id).await.unwrap().unwrap();
    assert!(stored.last_token.is_none());
}

#[tokio::test]
async fn test_incremental_run_uses_last_token() {
    let h = Harness::new().await;
    h.connector.push_deltas(vec![
        remote("u1", "u1@example.com"),
        remote("u2", "u2@example.com"),
        remote("u3", "u3@example.com"),
    ]);
    let config = save(
        &h,
        config(&h)
            .with_token_attribute("modifyTimestamp")
            .with_action(SyncSituation::MissingEntity, SyncActionType::CreateEntity),
    )
    .await;

    let first = h.reconciler.run_sync(config.id).await.unwrap();
    assert_eq!(first.token.as_deref(), Some("3"));
    assert_eq!(h.connector.sync_tokens(), vec![None, Some("2".to_string())]);
    let stored = h.store.get_sync_config(config.id).await.unwrap().unwrap();
    assert_eq!(stored.last_token.as_deref(), Some("3"));

    h.connector.push_deltas(vec![remote("u4", "u4@example.com")]);
    let second = h.reconciler.run_sync(config.id).await.unwrap();

    assert_eq!(
        h.connector.sync_tokens().last().cloned().flatten().as_deref(),
        Some("3")
    );
    let items = h.reconciler.item_logs(second.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].uid, "u4");
    let stored = h.store.get_sync_config(config.id).await.unwrap().unwrap();
    assert_eq!(stored.last_token.as_deref(), Some("4"));
}

#[tokio::test]
async fn test_without_token_attribute_token_is_not_stored() {
    let h = Harness::new().await;
    h.connector.push_deltas(vec![remote("u1", "u1@example.com")]);
    let config = save(&h, config(&h)).await;

    h.reconciler.run_sync(config.id).await.unwrap();
    h.reconciler.run_sync(config.id).await.unwrap();

    assert_eq!(h.connector.sync_tokens(), vec![None, None]);
    let stored = h.store.get_sync_config(config.id).await.unwrap().unwrap();
    assert!(stored.last_token.is_none());
}

#[tokio::test]
async fn test_dry_run_applies_nothing() {
    let h = Harness::new().await;
    linked(&h, "hank").await;
    h.connector.push_deltas(vec![remote("u1", "u1@example.com")]);
    let config = save(
        &h,
        config(&h)
            .with_action(SyncSituation::MissingEntity, SyncActionType::CreateEntity)
            .with_action(SyncSituation::MissingAccount, SyncActionType::DeleteEntity),
    )
    .await;

    let planned = h.reconciler.dry_run(config.id).await.unwrap();

    assert_eq!(
        planned,
        vec![
            PlannedAction {
                uid: "u1".to_string(),
                situation: Some(SyncSituation::MissingEntity),
                action: SyncActionType::CreateEntity,
                error: None,
            },
            PlannedAction {
                uid: "hank".to_string(),
                situation: Some(SyncSituation::MissingAccount),
                action: SyncActionType::DeleteEntity,
                error: None,
            },
        ]
    );
    assert!(h
        .store
        .find_account(h.system_id, "u1")
        .await
        .unwrap()
        .is_none());
    assert!(owner_of(&h, "hank").await.is_some());
    assert!(h.reconciler.logs(config.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_without_run_is_rejected() {
    let h = Harness::new().await;
    let err = h
        .reconciler
        .cancel_sync(SyncLogId::new())
        .unwrap_err();
    assert!(matches!(err, SyncError::NotRunning { .. }));
}

#[tokio::test]
async fn test_token_update_keeps_concurrent_config_edits() {
    let h = Harness::new().await;
    h.connector.set_delay(Duration::from_millis(300));
    h.connector.push_deltas(vec![remote("u1", "u1@example.com")]);
    let config = save(&h, config(&h).with_token_attribute("modifyTimestamp")).await;

    let run = tokio::spawn({
        let reconciler = h.reconciler.clone();
        let config_id = config.id;
        async move { reconciler.run_sync(config_id).await }
    });
    while !h.reconciler.is_running(config.id) {
        tokio::task::yield_now().await;
    }

    let mut edited = h.store.get_sync_config(config.id).await.unwrap().unwrap();
    edited.name = "hr-feed-nightly".to_string();
    edited = edited.with_action(SyncSituation::MissingEntity, SyncActionType::CreateEntity);
    h.store.save_sync_config(&edited).await.unwrap();

    let log = run.await.unwrap().unwrap();
    assert_eq!(log.token.as_deref(), Some("1"));

    let stored = h.store.get_sync_config(config.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "hr-feed-nightly");
    assert_eq!(
        stored.action_for(SyncSituation::MissingEntity),
        SyncActionType::CreateEntity
    );
    assert_eq!(stored.last_token.as_deref(), Some("1"));
}

/// Config store whose token writes fail.
struct TokenRejectingStore(Arc<InMemoryStore>);

#[async_trait]
impl ConfigStore for TokenRejectingStore {
    async fn get_system_mapping(&self, id: MappingId) -> StoreResult<Option<SystemMapping>> {
        self.0.get_system_mapping(id).await
    }

    async fn find_system_mapping(
        &self,
        system_id: SystemId,
        entity_type: &str,
        operation: MappingOperation,
    ) -> StoreResult<Option<SystemMapping>> {
        self.0.find_system_mapping(system_id, entity_type, operation).await
    }

    async fn save_system_mapping(&self, mapping: &SystemMapping) -> StoreResult<()> {
        self.0.save_system_mapping(mapping).await
    }

    async fn list_role_mappings(&self, system_id: SystemId) -> StoreResult<Vec<RoleMapping>> {
        self.0.list_role_mappings(system_id).await
    }

    async fn save_role_mapping(&self, mapping: &RoleMapping) -> StoreResult<()> {
        self.0.save_role_mapping(mapping).await
    }

    async fn get_break_config(
        &self,
        system_id: SystemId,
        operation_type: OperationType,
    ) -> StoreResult<Option<ProvisioningBreakConfig>> {
        self.0.get_break_config(system_id, operation_type).await
    }

    async fn save_break_config(&self, config: &ProvisioningBreakConfig) -> StoreResult<()> {
        self.0.save_break_config(config).await
    }

    async fn get_sync_config(
        &self,
        id: SyncConfigId,
    ) -> StoreResult<Option<SynchronizationConfig>> {
        self.0.get_sync_config(id).await
    }

    async fn save_sync_config(&self, config: &SynchronizationConfig) -> StoreResult<()> {
        self.0.save_sync_config(config).await
    }

    async fn update_sync_token(&self, _id: SyncConfigId, _token: &str) -> StoreResult<()> {
        Err(StoreError::InvalidData("token column is read-only".to_string()))
    }
}

#[tokio::test]
async fn test_failed_token_write_closes_the_log() {
    let h = Harness::new().await;
    h.connector.push_deltas(vec![remote("u1", "u1@example.com")]);
    let config = save(&h, config(&h).with_token_attribute("modifyTimestamp")).await;
    let reconciler = SyncReconciler::new(
        Arc::new(TokenRejectingStore(h.store.clone())),
        h.store.clone(),
        h.store.clone(),
        h.provisioning.clone(),
        2,
    );

    let err = reconciler.run_sync(config.id).await.unwrap_err();

    assert!(matches!(err, SyncError::Store(StoreError::InvalidData(_))));
    assert!(!reconciler.is_running(config.id));
    let logs = reconciler.logs(config.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert!(!logs[0].running);
    assert!(logs[0].ended_at.is_some());
    assert!(logs[0].token.is_none());
    assert!(logs[0].error.as_deref().unwrap().contains("read-only"));
    let stored = h.store.get_sync_config(config.id).await.unwrap().unwrap();
    assert!(stored.last_token.is_none());
}

/// Group entity owning `cn=admins` on the same system as the identity feed.
async fn group_owner(h: &Harness) -> IdentityEntity {
    let group = IdentityEntity::new("group").with_attribute("name", "admins");
    h.store.save_entity(&group).await.unwrap();
    let account = Account::new(h.system_id, "cn=admins", "group");
    h.store.save_account(&account).await.unwrap();
    h.store
        .save_link(&EntityAccountLink::new(group.id, account.id))
        .await
        .unwrap();
    group
}

#[tokio::test]
async fn test_full_run_ignores_accounts_of_other_entity_types() {
    let h = Harness::new().await;
    let group = group_owner(&h).await;
    let config = save(
        &h,
        config(&h).with_action(SyncSituation::MissingAccount, SyncActionType::DeleteEntity),
    )
    .await;

    let log = h.reconciler.run_sync(config.id).await.unwrap();

    assert!(h.reconciler.item_logs(log.id).await.unwrap().is_empty());
    assert!(h.store.get_entity(group.id).await.unwrap().is_some());
    assert!(h
        .store
        .find_account(h.system_id, "cn=admins")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_delete_delta_for_other_entity_type_is_unknown() {
    let h = Harness::new().await;
    let group = group_owner(&h).await;
    h.connector.push_deltas(vec![SyncDelta::deleted("cn=admins")]);
    let config = save(
        &h,
        config(&h).with_action(SyncSituation::MissingAccount, SyncActionType::DeleteEntity),
    )
    .await;

    let log = h.reconciler.run_sync(config.id).await.unwrap();

    let items = h.reconciler.item_logs(log.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].outcome, ItemOutcome::Warning);
    assert!(h.store.get_entity(group.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_missing_provisioning_mapping_fails_the_run() {
    let h = Harness::new().await;
    let contractors = SystemMapping::new(
        h.system_id,
        "contractor",
        OBJECT_CLASS,
        MappingOperation::Synchronization,
    )
    .with_attribute(AttributeMapping::new("login", "username").as_uid());
    h.store.save_system_mapping(&contractors).await.unwrap();
    h.connector
        .put_object("ghost", AttributeSet::new().with("login", "ghost"));
    h.connector.push_deltas(vec![remote("ghost", "ghost@example.com")]);
    let config = save(
        &h,
        SynchronizationConfig::new("contractor-feed", contractors.id)
            .with_action(SyncSituation::MissingEntity, SyncActionType::DeleteAccount),
    )
    .await;

    let err = h.reconciler.run_sync(config.id).await.unwrap_err();

    assert!(matches!(
        err,
        SyncError::Provisioning(ProvisioningError::MappingNotFound { .. })
    ));
    assert!(err.is_fatal());
    assert_eq!(h.connector.delete_calls(), 0);
    assert!(h.connector.object("ghost").is_some());
    assert!(!h.reconciler.is_running(config.id));

    let logs = h.reconciler.logs(config.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert!(!logs[0].running);
    assert!(logs[0].ended_at.is_some());
    assert!(logs[0].error.as_deref().unwrap().contains("contractor"));
}

/// State of the identity model before one item of a run.
struct Arranged {
    uid: &'static str,
    entity: Option<IdentityEntity>,
    account: Option<Account>,
}

/// Entity and account linked through a role assignment.
async fn linked_via_role(h: &Harness, username: &'static str) -> Arranged {
    let entity = h.entity(username, &format!("{username}@example.com")).await;
    let assignment = RoleAssignment::new(entity.id, "employee", 10);
    h.store.save_role_assignment(&assignment).await.unwrap();
    let account = Account::new(h.system_id, username, ENTITY_TYPE);
    h.store.save_account(&account).await.unwrap();
    h.store
        .save_link(&EntityAccountLink::new(entity.id, account.id).via_role(assignment.id))
        .await
        .unwrap();
    Arranged {
        uid: username,
        entity: Some(entity),
        account: Some(account),
    }
}

/// Put the model and the change feed in the given situation for one item.
async fn arrange(h: &Harness, situation: SyncSituation) -> Arranged {
    match situation {
        SyncSituation::Linked => {
            let arranged = linked_via_role(h, "bob").await;
            h.connector.put_object(
                "bob",
                AttributeSet::new()
                    .with("login", "bob")
                    .with("mail", "Stale@Example.com"),
            );
            h.connector
                .push_deltas(vec![remote("bob", "Stale@Example.com")]);
            arranged
        }
        SyncSituation::Unlinked => {
            let entity = h.entity("alice-old", "alice@example.com").await;
            h.connector
                .push_deltas(vec![remote("alice", "ALICE@example.com")]);
            Arranged {
                uid: "alice",
                entity: Some(entity),
                account: None,
            }
        }
        SyncSituation::MissingEntity => {
            h.connector
                .put_object("ghost", AttributeSet::new().with("login", "ghost"));
            h.connector.push_deltas(vec![remote("ghost", "ghost@example.com")]);
            Arranged {
                uid: "ghost",
                entity: None,
                account: None,
            }
        }
        SyncSituation::MissingAccount => {
            let arranged = linked_via_role(h, "dave").await;
            h.connector.push_deltas(vec![SyncDelta::deleted("dave")]);
            arranged
        }
    }
}

async fn assert_effect(
    h: &Harness,
    arranged: &Arranged,
    situation: SyncSituation,
    action: SyncActionType,
) {
    let case = format!("{situation} -> {action}");
    let entity_id = arranged.entity.as_ref().map(|e| e.id);
    let links = match entity_id {
        Some(id) => h.store.list_links_for_entity(id).await.unwrap(),
        None => Vec::new(),
    };
    let roles = match entity_id {
        Some(id) => h.store.list_role_assignments(id).await.unwrap(),
        None => Vec::new(),
    };
    let stored_entity = match entity_id {
        Some(id) => h.store.get_entity(id).await.unwrap(),
        None => None,
    };

    match (situation, action) {
        (SyncSituation::Linked, SyncActionType::UpdateEntity) => {
            let entity = stored_entity.unwrap();
            assert_eq!(entity.attributes.get_string("email"), Some("stale@example.com"), "{case}");
            assert_eq!(h.connector.write_calls(), 0, "{case}");
        }
        (SyncSituation::Linked, SyncActionType::UpdateAccount) => {
            assert_eq!(h.connector.update_calls(), 1, "{case}");
            assert_eq!(
                h.connector.object("bob").unwrap().get_string("mail"),
                Some("bob@example.com"),
                "{case}"
            );
        }
        (SyncSituation::Linked | SyncSituation::MissingAccount, SyncActionType::Unlink) => {
            assert!(links.is_empty(), "{case}");
            assert_eq!(roles.len(), 1, "{case}");
            let account = arranged.account.as_ref().unwrap();
            assert!(h.store.get_account(account.id).await.unwrap().is_some(), "{case}");
        }
        (
            SyncSituation::Linked | SyncSituation::MissingAccount,
            SyncActionType::UnlinkAndRemoveRole,
        ) => {
            assert!(links.is_empty(), "{case}");
            assert!(roles.is_empty(), "{case}");
        }
        (SyncSituation::Linked | SyncSituation::MissingAccount, SyncActionType::Ignore) => {
            assert_eq!(links.len(), 1, "{case}");
            assert_eq!(roles.len(), 1, "{case}");
            let entity = stored_entity.unwrap();
            assert_eq!(entity, arranged.entity.clone().unwrap(), "{case}");
            assert_eq!(h.connector.write_calls(), 0, "{case}");
        }
        (SyncSituation::Unlinked, SyncActionType::LinkAndUpdateEntity) => {
            assert_eq!(owner_of(h, "alice").await.map(|e| e.id), entity_id, "{case}");
            let entity = stored_entity.unwrap();
            assert_eq!(entity.attributes.get_string("username"), Some("alice"), "{case}");
        }
        (SyncSituation::Unlinked, SyncActionType::Link) => {
            assert_eq!(owner_of(h, "alice").await.map(|e| e.id), entity_id, "{case}");
            let entity = stored_entity.unwrap();
            assert_eq!(entity.attributes.get_string("username"), Some("alice-old"), "{case}");
        }
        (SyncSituation::Unlinked | SyncSituation::MissingEntity, SyncActionType::Ignore) => {
            assert!(
                h.store
                    .find_account(h.system_id, arranged.uid)
                    .await
                    .unwrap()
                    .is_none(),
                "{case}"
            );
            assert!(links.is_empty(), "{case}");
            assert_eq!(h.connector.write_calls(), 0, "{case}");
        }
        (SyncSituation::MissingEntity, SyncActionType::CreateEntity) => {
            let owner = owner_of(h, "ghost").await.unwrap();
            assert_eq!(owner.attributes.get_string("email"), Some("ghost@example.com"), "{case}");
        }
        (SyncSituation::MissingEntity, SyncActionType::DeleteAccount) => {
            assert_eq!(h.connector.delete_calls(), 1, "{case}");
            assert!(h.connector.object("ghost").is_none(), "{case}");
        }
        (SyncSituation::MissingEntity, SyncActionType::DisableAccount) => {
            assert_eq!(
                h.connector.object("ghost").unwrap().first(ENABLE_ATTRIBUTE),
                Some(&AttributeValue::from(false)),
                "{case}"
            );
        }
        (SyncSituation::MissingAccount, SyncActionType::CreateAccount) => {
            assert_eq!(h.connector.create_calls(), 1, "{case}");
            assert_eq!(
                h.connector.object("dave").unwrap().get_string("mail"),
                Some("dave@example.com"),
                "{case}"
            );
        }
        (SyncSituation::MissingAccount, SyncActionType::DeleteEntity) => {
            assert!(stored_entity.is_none(), "{case}");
            let account = arranged.account.as_ref().unwrap();
            assert!(h.store.get_account(account.id).await.unwrap().is_none(), "{case}");
        }
        _ => panic!("no expectation for {case}"),
    }
}

#[tokio::test]
async fn test_every_valid_action_applies_once() {
    for situation in SyncSituation::ALL {
        for &action in situation.valid_actions() {
            let case = format!("{situation} -> {action}");
            let h = Harness::new().await;
            let arranged = arrange(&h, situation).await;
            let config = save(&h, config(&h).with_action(situation, action)).await;

            let log = h.reconciler.run_sync(config.id).await.unwrap();

            assert!(!log.contains_error, "{case}");
            let items = h.reconciler.item_logs(log.id).await.unwrap();
            assert_eq!(items.len(), 1, "{case}");
            assert_eq!(items[0].uid, arranged.uid, "{case}");
            assert_eq!(items[0].outcome, ItemOutcome::Success, "{case}");
            let actions = h.reconciler.action_logs(log.id).await.unwrap();
            assert_eq!(actions.len(), 1, "{case}");
            assert_eq!(actions[0].action, action, "{case}");
            assert_eq!(actions[0].count, 1, "{case}");

            assert_effect(&h, &arranged, situation, action).await;
        }
    }
}
