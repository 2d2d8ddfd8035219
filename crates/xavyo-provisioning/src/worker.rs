//! Provisioning Worker
//!
//! Background worker that drains ready batches of the queue. Each batch is
//! handled by at most one task at a time; the batch lock inside the queue
//! makes concurrent pickups of the same batch harmless.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::interval;
use tracing::{debug, error, info, instrument};

use xavyo_connector::ids::BatchId;

use crate::config::EngineConfig;
use crate::operation::OperationState;
use crate::queue::{ExecuteOutcome, ProvisioningQueue};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of batches processed concurrently.
    pub concurrency: usize,

    /// How often to poll the queue (in milliseconds).
    pub poll_interval_ms: u64,

    /// Maximum batches fetched per poll.
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for WorkerConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            concurrency: config.worker_concurrency.max(1),
            poll_interval_ms: config.worker_poll_interval_ms.max(1),
            batch_size: config.worker_batch_size,
        }
    }
}

/// Provisioning worker that processes the batch queue.
pub struct ProvisioningWorker {
    queue: Arc<ProvisioningQueue>,
    config: WorkerConfig,
    shutdown: Arc<AtomicBool>,
}

impl ProvisioningWorker {
    /// Create a new worker.
    pub fn new(queue: Arc<ProvisioningQueue>, config: WorkerConfig) -> Self {
        Self {
            queue,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the worker.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval_ms,
            "Starting provisioning worker"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let period = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let mut poll_interval = interval(period);

        loop {
            poll_interval.tick().await;
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Worker shutdown requested, stopping poll loop");
                break;
            }
            self.poll_and_process(&semaphore).await;
        }

        info!("Waiting for in-flight batches to complete...");
        let permits = u32::try_from(self.config.concurrency).unwrap_or(u32::MAX);
        let _ = semaphore.acquire_many(permits).await;
        info!("Worker stopped");
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Check if shutdown was requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    async fn poll_and_process(&self, semaphore: &Arc<Semaphore>) {
        let batches = match self.queue.ready_batches(self.config.batch_size).await {
            Ok(batches) => batches,
            Err(e) => {
                error!(error = %e, "Failed to list ready batches");
                return;
            }
        };

        if batches.is_empty() {
            return;
        }
        debug!(count = batches.len(), "Ready batches");

        for batch_id in batches {
            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                debug!("All worker slots busy, skipping remaining batches");
                return;
            };

            let queue = self.queue.clone();
            tokio::spawn(async move {
                let _permit = permit;
                drain_batch(queue, batch_id).await;
            });
        }
    }
}

/// Execute a batch until it is empty, blocked or taken by someone else.
#[instrument(skip(queue))]
async fn drain_batch(queue: Arc<ProvisioningQueue>, batch_id: BatchId) {
    loop {
        match queue.execute_next(batch_id).await {
            Ok(ExecuteOutcome::Processed(operation))
                if operation.state == OperationState::Executed
                    || operation.state == OperationState::Canceled => {}
            Ok(ExecuteOutcome::Processed(operation)) => {
                debug!(operation_id = %operation.id, state = %operation.state, "Batch stopped");
                break;
            }
            Ok(_) => break,
            Err(e) => {
                error!(error = %e, fatal = e.is_fatal(), "Failed to execute batch");
                break;
            }
        }
    }
}
