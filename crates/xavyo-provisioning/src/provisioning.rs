//! Provisioning service.
//!
//! Turns the desired state of an entity into queued operations: it gathers
//! the role contributions of the entity, reads the target object, runs the
//! attribute resolver and enqueues the outcome. Accounts frozen with
//! `in_protection` are left alone.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use xavyo_connector::error::ConnectorError;
use xavyo_connector::ids::SystemId;
use xavyo_connector::operation::{AttributeSet, ENABLE_ATTRIBUTE};
use xavyo_connector::types::OperationType;

use crate::identity::{Account, AccountId, EntityAccountLink, EntityId, IdentityEntity};
use crate::mapping::{MappingOperation, SystemMapping};
use crate::operation::{OperationPayload, ProvisioningOperation};
use crate::queue::{ProvisioningQueue, QueueError};
use crate::resolver::{AttributeResolver, ResolverError, ResolverInput, RoleContribution};
use crate::store::{ConfigStore, IdentityStore, StoreError};

/// Provisioning service errors.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Queue error.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Resolver error.
    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// Pre-read of the target object failed.
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// No provisioning mapping for the entity type on the system.
    #[error("No provisioning mapping for entity type '{entity_type}' on system {system_id}")]
    MappingNotFound {
        system_id: SystemId,
        entity_type: String,
    },

    /// Entity not found.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// The breaker forbids reading the target ahead of an update.
    #[error("{operation_type} operations on system {system_id} are disabled")]
    BreakerOpen {
        system_id: SystemId,
        operation_type: OperationType,
    },
}

impl ProvisioningError {
    /// Whether the error comes from configuration or storage rather than
    /// from the one account being provisioned.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            ProvisioningError::Store(_)
            | ProvisioningError::Resolver(_)
            | ProvisioningError::MappingNotFound { .. } => true,
            ProvisioningError::Queue(e) => e.is_fatal(),
            ProvisioningError::Connector(_)
            | ProvisioningError::EntityNotFound(_)
            | ProvisioningError::AccountNotFound(_)
            | ProvisioningError::BreakerOpen { .. } => false,
        }
    }
}

/// Result type for provisioning.
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;

/// Whether a built operation only joins its batch or also runs right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// Leave it to the workers.
    #[default]
    Queue,
    /// Run the batch until the operation is processed.
    Immediate,
}

/// Builds and enqueues provisioning operations.
pub struct ProvisioningService {
    configs: Arc<dyn ConfigStore>,
    identities: Arc<dyn IdentityStore>,
    queue: Arc<ProvisioningQueue>,
    resolver: AttributeResolver,
}

impl ProvisioningService {
    pub fn new(
        configs: Arc<dyn ConfigStore>,
        identities: Arc<dyn IdentityStore>,
        queue: Arc<ProvisioningQueue>,
    ) -> Self {
        Self {
            configs,
            identities,
            queue,
            resolver: AttributeResolver::new(),
        }
    }

    pub fn queue(&self) -> &Arc<ProvisioningQueue> {
        &self.queue
    }

    /// Bring the account of an entity on a system up to date.
    ///
    /// Creates the account when the entity has none there yet (or it is
    /// still a wish), otherwise updates it. Returns `None` when nothing was
    /// enqueued: the account is protected or no attribute changed.
    #[instrument(skip(self))]
    pub async fn provision_account(
        &self,
        entity_id: EntityId,
        system_id: SystemId,
        dispatch: Dispatch,
    ) -> ProvisioningResult<Option<ProvisioningOperation>> {
        let entity = self
            .identities
            .get_entity(entity_id)
            .await?
            .ok_or(ProvisioningError::EntityNotFound(entity_id))?;
        let mapping = self.provisioning_mapping(system_id, &entity.entity_type).await?;
        let account = self.linked_account(entity_id, system_id).await?;

        if let Some(account) = &account {
            if account.in_protection {
                info!(account_id = %account.id, "Account in protection, skipping provisioning");
                return Ok(None);
            }
        }

        let Some(operation) = self.build(&entity, &mapping, account).await? else {
            return Ok(None);
        };
        self.submit(operation, dispatch).await.map(Some)
    }

    /// Enqueue a DELETE of an account.
    #[instrument(skip(self))]
    pub async fn deprovision_account(
        &self,
        account_id: AccountId,
        dispatch: Dispatch,
    ) -> ProvisioningResult<ProvisioningOperation> {
        let (account, mapping) = self.account_with_mapping(account_id).await?;
        let operation = ProvisioningOperation::new(
            OperationType::Delete,
            account.system_id,
            account.entity_type.clone(),
            account.uid.clone(),
            OperationPayload::new(mapping.object_class.clone(), AttributeSet::new()),
        );
        let operation = self.with_owner(operation, account.id).await?;
        self.submit(operation, dispatch).await
    }

    /// Enqueue an UPDATE that disables an account.
    #[instrument(skip(self))]
    pub async fn disable_account(
        &self,
        account_id: AccountId,
        dispatch: Dispatch,
    ) -> ProvisioningResult<ProvisioningOperation> {
        let (account, mapping) = self.account_with_mapping(account_id).await?;
        let operation = ProvisioningOperation::new(
            OperationType::Update,
            account.system_id,
            account.entity_type.clone(),
            account.uid.clone(),
            OperationPayload::new(
                mapping.object_class.clone(),
                AttributeSet::new().with(ENABLE_ATTRIBUTE, false),
            ),
        );
        let operation = self.with_owner(operation, account.id).await?;
        self.submit(operation, dispatch).await
    }

    async fn submit(
        &self,
        operation: ProvisioningOperation,
        dispatch: Dispatch,
    ) -> ProvisioningResult<ProvisioningOperation> {
        let operation = match dispatch {
            Dispatch::Queue => self.queue.enqueue(operation).await?,
            Dispatch::Immediate => self.queue.enqueue_and_execute(operation).await?,
        };
        Ok(operation)
    }

    async fn with_owner(
        &self,
        operation: ProvisioningOperation,
        account_id: AccountId,
    ) -> ProvisioningResult<ProvisioningOperation> {
        Ok(match self.identities.find_link_by_account(account_id).await? {
            Some(link) => operation.with_entity(link.entity_id),
            None => operation,
        })
    }

    async fn provisioning_mapping(
        &self,
        system_id: SystemId,
        entity_type: &str,
    ) -> ProvisioningResult<SystemMapping> {
        self.configs
            .find_system_mapping(system_id, entity_type, MappingOperation::Provisioning)
            .await?
            .ok_or_else(|| ProvisioningError::MappingNotFound {
                system_id,
                entity_type: entity_type.to_string(),
            })
    }

    async fn account_with_mapping(
        &self,
        account_id: AccountId,
    ) -> ProvisioningResult<(Account, SystemMapping)> {
        let account = self
            .identities
            .get_account(account_id)
            .await?
            .ok_or(ProvisioningError::AccountNotFound(account_id))?;
        let mapping = self
            .provisioning_mapping(account.system_id, &account.entity_type)
            .await?;
        Ok((account, mapping))
    }

    async fn linked_account(
        &self,
        entity_id: EntityId,
        system_id: SystemId,
    ) -> ProvisioningResult<Option<Account>> {
        for link in self.identities.list_links_for_entity(entity_id).await? {
            if let Some(account) = self.identities.get_account(link.account_id).await? {
                if account.system_id == system_id {
                    return Ok(Some(account));
                }
            }
        }
        Ok(None)
    }

    async fn contributions(
        &self,
        entity_id: EntityId,
        system_id: SystemId,
    ) -> ProvisioningResult<Vec<RoleContribution>> {
        let role_mappings = self.configs.list_role_mappings(system_id).await?;
        let assignments = self.identities.list_role_assignments(entity_id).await?;
        Ok(assignments
            .iter()
            .filter(|a| a.active)
            .filter_map(|a| {
                role_mappings
                    .iter()
                    .find(|m| m.role_code == a.role_code)
                    .map(|m| RoleContribution::from_role(m, a.priority))
            })
            .collect())
    }

    /// Read the target object ahead of an UPDATE. The read is gated by the
    /// UPDATE breaker and a failed read counts against it.
    async fn pre_read(
        &self,
        system_id: SystemId,
        object_class: &str,
        uid: &str,
    ) -> ProvisioningResult<Option<AttributeSet>> {
        let executor = self.queue.executor();
        let Some(connector) = executor.connector(system_id).await else {
            return Ok(None);
        };
        let breaker = self.queue.breaker();
        if breaker.check(system_id, OperationType::Update).await?.is_open() {
            warn!(system_id = %system_id, uid, "Provisioning breaker open, target not read");
            return Err(ProvisioningError::BreakerOpen {
                system_id,
                operation_type: OperationType::Update,
            });
        }

        match executor.read(connector.as_ref(), object_class, uid).await {
            Ok(current) => Ok(current),
            Err(e) => {
                warn!(system_id = %system_id, uid, error = %e, code = e.error_code(), "Pre-read failed");
                breaker.record_failure(system_id, OperationType::Update).await?;
                Err(e.into())
            }
        }
    }

    async fn build(
        &self,
        entity: &IdentityEntity,
        mapping: &SystemMapping,
        account: Option<Account>,
    ) -> ProvisioningResult<Option<ProvisioningOperation>> {
        let system_id = mapping.system_id;

        let current = match &account {
            Some(account) if !account.wish => {
                self.pre_read(system_id, &mapping.object_class, &account.uid)
                    .await?
            }
            _ => None,
        };

        let operation_type = match &account {
            Some(account) if !account.wish && current.is_some() => OperationType::Update,
            _ => OperationType::Create,
        };

        let previous = match &account {
            Some(account) => self.identities.get_controlled_values(account.id).await?,
            None => Vec::new(),
        };
        let contributions = self.contributions(entity.id, system_id).await?;

        let resolved = self.resolver.resolve(&ResolverInput {
            operation_type,
            mapping,
            entity,
            contributions: &contributions,
            previous: &previous,
            current: current.as_ref(),
        })?;

        let account = match account {
            Some(account) => account,
            None => {
                let uid = resolved.uid.clone().ok_or_else(|| ResolverError::MissingUid {
                    mapping: mapping.id.to_string(),
                })?;
                let account = Account::new(system_id, uid, entity.entity_type.clone()).wished();
                self.identities.save_account(&account).await?;
                self.identities
                    .save_link(&EntityAccountLink::new(entity.id, account.id))
                    .await?;
                info!(account_id = %account.id, uid = %account.uid, "Account planned");
                account
            }
        };

        self.identities
            .save_controlled_values(account.id, &resolved.controlled_values)
            .await?;

        if operation_type == OperationType::Update && resolved.attributes.is_empty() {
            debug!(account_id = %account.id, "No attribute changed, nothing to provision");
            return Ok(None);
        }

        let payload = OperationPayload::new(mapping.object_class.clone(), resolved.attributes)
            .with_snapshot(current)
            .with_confidential(resolved.confidential);
        let operation = ProvisioningOperation::new(
            operation_type,
            system_id,
            entity.entity_type.clone(),
            account.uid.clone(),
            payload,
        )
        .with_entity(entity.id);
        Ok(Some(operation))
    }
}

impl std::fmt::Debug for ProvisioningService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningService").finish_non_exhaustive()
    }
}
