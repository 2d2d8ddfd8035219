//! Provisioning Batch Queue
//!
//! Operations for the same account on the same system form a batch and run
//! strictly in enqueue order, one at a time. A failed operation stays at the
//! head of its batch in EXCEPTION and blocks everything behind it until an
//! operator retries or cancels it.
//!
//! Exclusion is enforced with one async mutex per batch. `execute_next`
//! never waits for it and reports [`ExecuteOutcome::Busy`] instead; the
//! operator actions wait their turn.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use xavyo_connector::ids::{BatchId, OperationId};
use xavyo_connector::types::OperationType;

use crate::breaker::ProvisioningBreaker;
use crate::operation::{
    result_codes, OperationState, ProvisioningBatch, ProvisioningOperation,
};
use crate::processor::OperationExecutor;
use crate::store::{IdentityStore, OperationStore, StoreError};

/// Registry size above which idle batch locks are dropped.
const LOCK_REGISTRY_SWEEP: usize = 1024;

/// Queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Operation not found.
    #[error("Operation not found: {0}")]
    OperationNotFound(OperationId),

    /// Batch not found.
    #[error("Batch not found: {0}")]
    BatchNotFound(BatchId),

    /// Operation was never enqueued.
    #[error("Operation {0} is not part of a batch")]
    Unbatched(OperationId),

    /// Only EXCEPTION and NOT_EXECUTED operations can be retried.
    #[error("Operation {operation_id} is {state} and cannot be retried")]
    NotRetryable {
        operation_id: OperationId,
        state: OperationState,
    },

    /// Retrying anything but the head would break batch order.
    #[error("Operation {operation_id} is not the head of batch {batch_id}")]
    NotBatchHead {
        operation_id: OperationId,
        batch_id: BatchId,
    },

    /// Operation already reached a terminal state.
    #[error("Operation {operation_id} is already {state}")]
    AlreadyTerminal {
        operation_id: OperationId,
        state: OperationState,
    },
}

impl QueueError {
    /// Errors caused by missing or corrupt records rather than by the request.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            QueueError::Store(_)
                | QueueError::OperationNotFound(_)
                | QueueError::BatchNotFound(_)
                | QueueError::Unbatched(_)
        )
    }
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// What one `execute_next` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteOutcome {
    /// The batch has no active operation.
    Idle,
    /// Another caller is executing this batch.
    Busy,
    /// The head is waiting for an operator.
    Blocked(OperationId),
    /// The head was processed; its state holds the result.
    Processed(ProvisioningOperation),
}

/// The provisioning batch queue.
pub struct ProvisioningQueue {
    operations: Arc<dyn OperationStore>,
    identities: Arc<dyn IdentityStore>,
    executor: OperationExecutor,
    breaker: Arc<ProvisioningBreaker>,
    locks: StdMutex<HashMap<BatchId, Arc<Mutex<()>>>>,
}

impl ProvisioningQueue {
    pub fn new(
        operations: Arc<dyn OperationStore>,
        identities: Arc<dyn IdentityStore>,
        executor: OperationExecutor,
        breaker: Arc<ProvisioningBreaker>,
    ) -> Self {
        Self {
            operations,
            identities,
            executor,
            breaker,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn executor(&self) -> &OperationExecutor {
        &self.executor
    }

    pub fn breaker(&self) -> &Arc<ProvisioningBreaker> {
        &self.breaker
    }

    fn batch_lock(&self, batch_id: BatchId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.len() > LOCK_REGISTRY_SWEEP {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(batch_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Append an operation to the batch of its account.
    #[instrument(skip(self, operation), fields(
        operation_id = %operation.id,
        operation_type = %operation.operation_type,
        system_id = %operation.system_id,
        uid = %operation.uid
    ))]
    pub async fn enqueue(
        &self,
        operation: ProvisioningOperation,
    ) -> QueueResult<ProvisioningOperation> {
        let (operation, batch) = self.operations.enqueue_operation(operation).await?;
        info!(
            batch_id = %batch.id,
            position = batch.operations.len(),
            "Operation enqueued"
        );
        Ok(operation)
    }

    /// Process the head of a batch if it is waiting.
    #[instrument(skip(self))]
    pub async fn execute_next(&self, batch_id: BatchId) -> QueueResult<ExecuteOutcome> {
        let lock = self.batch_lock(batch_id);
        let Ok(_guard) = lock.try_lock() else {
            return Ok(ExecuteOutcome::Busy);
        };

        let batch = self.load_batch(batch_id).await?;
        let Some(head) = batch.head() else {
            return Ok(ExecuteOutcome::Idle);
        };
        let mut operation = self.load_operation(head).await?;

        if operation.state.is_retryable() {
            warn!(operation_id = %operation.id, state = %operation.state, "Batch blocked");
            return Ok(ExecuteOutcome::Blocked(operation.id));
        }
        if operation.is_terminal() {
            self.operations.deactivate_operation(batch_id, head).await?;
            return Ok(ExecuteOutcome::Processed(operation));
        }

        self.process(&mut operation, batch_id).await?;
        Ok(ExecuteOutcome::Processed(operation))
    }

    /// Enqueue an operation and run its batch until the operation is processed
    /// or the batch stops making progress.
    ///
    /// The returned operation is still CREATED when it is queued behind a
    /// blocked or busy head.
    pub async fn enqueue_and_execute(
        &self,
        operation: ProvisioningOperation,
    ) -> QueueResult<ProvisioningOperation> {
        let operation = self.enqueue(operation).await?;
        let batch_id = operation
            .batch_id
            .ok_or(QueueError::Unbatched(operation.id))?;

        loop {
            match self.execute_next(batch_id).await? {
                ExecuteOutcome::Processed(processed) if processed.id == operation.id => {
                    return Ok(processed);
                }
                ExecuteOutcome::Processed(processed)
                    if processed.state == OperationState::Executed
                        || processed.state == OperationState::Canceled => {}
                _ => break,
            }
        }
        self.load_operation(operation.id).await
    }

    /// Re-execute the head operation of its batch.
    #[instrument(skip(self))]
    pub async fn retry(&self, operation_id: OperationId) -> QueueResult<ProvisioningOperation> {
        let operation = self.load_operation(operation_id).await?;
        let batch_id = operation
            .batch_id
            .ok_or(QueueError::Unbatched(operation_id))?;

        let lock = self.batch_lock(batch_id);
        let _guard = lock.lock().await;

        let mut operation = self.load_operation(operation_id).await?;
        if !operation.state.is_retryable() {
            return Err(QueueError::NotRetryable {
                operation_id,
                state: operation.state,
            });
        }
        let batch = self.load_batch(batch_id).await?;
        if batch.head() != Some(operation_id) {
            return Err(QueueError::NotBatchHead {
                operation_id,
                batch_id,
            });
        }

        info!(attempts = operation.attempts, "Retrying operation");
        self.process(&mut operation, batch_id).await?;
        Ok(operation)
    }

    /// Run every active operation of a batch in order, stopping at the first
    /// one that does not execute.
    #[instrument(skip(self))]
    pub async fn retry_batch(&self, batch_id: BatchId) -> QueueResult<Vec<ProvisioningOperation>> {
        let lock = self.batch_lock(batch_id);
        let _guard = lock.lock().await;

        let mut processed = Vec::new();
        loop {
            let batch = self.load_batch(batch_id).await?;
            let Some(head) = batch.head() else {
                break;
            };
            let mut operation = self.load_operation(head).await?;
            if operation.is_terminal() {
                self.operations.deactivate_operation(batch_id, head).await?;
                continue;
            }

            self.process(&mut operation, batch_id).await?;
            let executed = operation.state == OperationState::Executed;
            processed.push(operation);
            if !executed {
                break;
            }
        }

        info!(processed = processed.len(), "Batch retried");
        Ok(processed)
    }

    /// Cancel one operation without calling the connector.
    #[instrument(skip(self))]
    pub async fn cancel(&self, operation_id: OperationId) -> QueueResult<ProvisioningOperation> {
        let operation = self.load_operation(operation_id).await?;
        let batch_id = operation
            .batch_id
            .ok_or(QueueError::Unbatched(operation_id))?;

        let lock = self.batch_lock(batch_id);
        let _guard = lock.lock().await;

        let mut operation = self.load_operation(operation_id).await?;
        if operation.is_terminal() {
            return Err(QueueError::AlreadyTerminal {
                operation_id,
                state: operation.state,
            });
        }

        operation.mark_canceled();
        self.operations.update_operation(&operation).await?;
        self.operations
            .deactivate_operation(batch_id, operation_id)
            .await?;
        info!("Operation canceled");
        Ok(operation)
    }

    /// Cancel every active operation of a batch.
    #[instrument(skip(self))]
    pub async fn cancel_batch(&self, batch_id: BatchId) -> QueueResult<Vec<ProvisioningOperation>> {
        let lock = self.batch_lock(batch_id);
        let _guard = lock.lock().await;

        let batch = self.load_batch(batch_id).await?;
        let mut canceled = Vec::with_capacity(batch.operations.len());
        for operation_id in batch.operations {
            let mut operation = self.load_operation(operation_id).await?;
            if !operation.is_terminal() {
                operation.mark_canceled();
                self.operations.update_operation(&operation).await?;
                canceled.push(operation);
            }
            self.operations
                .deactivate_operation(batch_id, operation_id)
                .await?;
        }

        info!(canceled = canceled.len(), "Batch canceled");
        Ok(canceled)
    }

    pub async fn operation(&self, id: OperationId) -> QueueResult<Option<ProvisioningOperation>> {
        Ok(self.operations.get_operation(id).await?)
    }

    pub async fn batch(&self, id: BatchId) -> QueueResult<Option<ProvisioningBatch>> {
        Ok(self.operations.get_batch(id).await?)
    }

    /// Every operation of a batch, terminal ones included, in enqueue order.
    pub async fn batch_operations(&self, id: BatchId) -> QueueResult<Vec<ProvisioningOperation>> {
        Ok(self.operations.list_batch_operations(id).await?)
    }

    /// Batches whose head is waiting to run.
    pub async fn ready_batches(&self, limit: usize) -> QueueResult<Vec<BatchId>> {
        Ok(self.operations.list_ready_batches(limit).await?)
    }

    async fn load_batch(&self, id: BatchId) -> QueueResult<ProvisioningBatch> {
        self.operations
            .get_batch(id)
            .await?
            .ok_or(QueueError::BatchNotFound(id))
    }

    async fn load_operation(&self, id: OperationId) -> QueueResult<ProvisioningOperation> {
        self.operations
            .get_operation(id)
            .await?
            .ok_or(QueueError::OperationNotFound(id))
    }

    /// Run one operation. The caller holds the batch lock.
    async fn process(
        &self,
        operation: &mut ProvisioningOperation,
        batch_id: BatchId,
    ) -> QueueResult<()> {
        let Some(account) = self
            .identities
            .find_account(operation.system_id, &operation.uid)
            .await?
        else {
            warn!(operation_id = %operation.id, "Account no longer exists, skipping");
            operation.mark_not_executed(
                result_codes::SYSTEM_ENTITY_DELETED,
                format!("account '{}' no longer exists", operation.uid),
            );
            self.operations.update_operation(operation).await?;
            return Ok(());
        };

        let Some(connector) = self.executor.connector(operation.system_id).await else {
            warn!(operation_id = %operation.id, system_id = %operation.system_id, "System has no connector, skipping");
            operation.mark_not_executed(
                result_codes::SYSTEM_ENTITY_DELETED,
                format!("no connector registered for system {}", operation.system_id),
            );
            self.operations.update_operation(operation).await?;
            return Ok(());
        };

        if self
            .breaker
            .check(operation.system_id, operation.operation_type)
            .await?
            .is_open()
        {
            warn!(operation_id = %operation.id, "Provisioning breaker open, skipping");
            operation.mark_not_executed(
                result_codes::BREAKER_OPEN,
                format!(
                    "{} operations on system {} are disabled",
                    operation.operation_type, operation.system_id
                ),
            );
            self.operations.update_operation(operation).await?;
            return Ok(());
        }

        operation.attempts += 1;
        match self.executor.execute(connector.as_ref(), operation).await {
            Ok(_) => {
                operation.mark_executed();
                self.operations.update_operation(operation).await?;
                self.operations
                    .deactivate_operation(batch_id, operation.id)
                    .await?;

                match operation.operation_type {
                    OperationType::Create if account.wish => {
                        let mut account = account;
                        account.wish = false;
                        self.identities.save_account(&account).await?;
                    }
                    OperationType::Delete => {
                        self.identities.delete_account(account.id).await?;
                    }
                    _ => {}
                }
                info!(operation_id = %operation.id, "Operation executed");
            }
            Err(e) => {
                error!(
                    operation_id = %operation.id,
                    error = %e,
                    code = e.error_code(),
                    transient = e.is_transient(),
                    "Operation failed"
                );
                operation.mark_exception(e.error_code(), e.to_string());
                self.operations.update_operation(operation).await?;
                self.breaker
                    .record_failure(operation.system_id, operation.operation_type)
                    .await?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProvisioningQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningQueue")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
