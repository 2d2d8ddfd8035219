//! Operation Processor
//!
//! Executes provisioning operations against the connector of their system.
//! Every connector call is bounded by the configured timeout; a call that
//! does not finish in time fails with `ConnectorError::ConnectionTimeout`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::ids::SystemId;
use xavyo_connector::operation::{AttributeSet, Uid};
use xavyo_connector::resilience::with_timeout;
use xavyo_connector::traits::{FullConnector, SyncPage};
use xavyo_connector::types::OperationType;

use crate::operation::ProvisioningOperation;

/// Provider for connectors.
#[async_trait]
pub trait ConnectorProvider: Send + Sync {
    /// Get the connector of a system, if one is registered.
    async fn get_connector(&self, system_id: SystemId) -> Option<Arc<dyn FullConnector>>;
}

/// Connector provider backed by an in-memory map.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: RwLock<HashMap<SystemId, Arc<dyn FullConnector>>>,
}

impl ConnectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, system_id: SystemId, connector: Arc<dyn FullConnector>) {
        self.connectors.write().await.insert(system_id, connector);
    }

    pub async fn unregister(&self, system_id: SystemId) {
        self.connectors.write().await.remove(&system_id);
    }
}

#[async_trait]
impl ConnectorProvider for ConnectorRegistry {
    async fn get_connector(&self, system_id: SystemId) -> Option<Arc<dyn FullConnector>> {
        self.connectors.read().await.get(&system_id).cloned()
    }
}

/// Runs connector calls for operations, each bounded by a timeout.
#[derive(Clone)]
pub struct OperationExecutor {
    connectors: Arc<dyn ConnectorProvider>,
    timeout: Duration,
}

impl OperationExecutor {
    pub fn new(connectors: Arc<dyn ConnectorProvider>, timeout: Duration) -> Self {
        Self {
            connectors,
            timeout,
        }
    }

    /// Get the connector of a system.
    pub async fn connector(&self, system_id: SystemId) -> Option<Arc<dyn FullConnector>> {
        self.connectors.get_connector(system_id).await
    }

    /// Execute one operation.
    ///
    /// Returns the UID reported by the connector; a DELETE of an object that
    /// is already gone succeeds with `None`.
    #[instrument(skip(self, connector, operation), fields(
        operation_id = %operation.id,
        operation_type = %operation.operation_type,
        uid = %operation.uid
    ))]
    pub async fn execute(
        &self,
        connector: &dyn FullConnector,
        operation: &ProvisioningOperation,
    ) -> ConnectorResult<Option<Uid>> {
        let object_class = operation.payload.object_class.as_str();
        let uid = Uid::new(operation.uid.clone());
        debug!(attributes = ?operation.payload.redacted(), "Executing operation");

        match operation.operation_type {
            OperationType::Create => {
                let created = with_timeout(
                    self.timeout,
                    connector.create(object_class, operation.payload.attributes.clone()),
                )
                .await?;
                info!(target_uid = %created, "Created account in target system");
                Ok(Some(created))
            }
            OperationType::Update => {
                let updated = with_timeout(
                    self.timeout,
                    connector.update(object_class, &uid, operation.payload.attributes.clone()),
                )
                .await?;
                info!(target_uid = %updated, "Updated account in target system");
                Ok(Some(updated))
            }
            OperationType::Delete => {
                match with_timeout(self.timeout, connector.delete(object_class, &uid)).await {
                    Ok(()) => {
                        info!("Deleted account from target system");
                        Ok(None)
                    }
                    Err(ConnectorError::ObjectNotFound { .. }) => {
                        info!("Account already absent from target system");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Read the current state of one target object.
    #[instrument(skip(self, connector))]
    pub async fn read(
        &self,
        connector: &dyn FullConnector,
        object_class: &str,
        uid: &str,
    ) -> ConnectorResult<Option<AttributeSet>> {
        with_timeout(self.timeout, connector.read(object_class, &Uid::new(uid))).await
    }

    /// Fetch one page of the change feed.
    #[instrument(skip(self, connector))]
    pub async fn sync_page(
        &self,
        connector: &dyn FullConnector,
        object_class: &str,
        token: Option<&str>,
        page_size: usize,
    ) -> ConnectorResult<SyncPage> {
        with_timeout(self.timeout, connector.sync(object_class, token, page_size)).await
    }
}

impl std::fmt::Debug for OperationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationExecutor")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
