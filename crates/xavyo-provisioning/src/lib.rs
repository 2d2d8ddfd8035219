//! # Provisioning Engine
//!
//! Provisioning queue and synchronization reconciler for xavyo.
//!
//! This crate provides the infrastructure for:
//! - Resolving the attributes of an account from its owner and roles
//! - Queuing operations in per-account batches with strict FIFO order
//! - Guarding target systems with a failure-counting circuit breaker
//! - Reconciling remote objects with the identity model
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────┐     ┌───────────────┐
//! │  Provisioning   │────►│ Batch Queue  │────►│   Executor    │
//! │    Service      │     │              │     │               │
//! └────────┬────────┘     └──────┬───────┘     └───────┬───────┘
//!          │                     │                     │
//!          ▼                     ▼                     ▼
//! ┌─────────────────┐     ┌──────────────┐     ┌───────────────┐
//! │    Attribute    │     │   Circuit    │     │   Connector   │
//! │    Resolver     │     │   Breaker    │     │               │
//! └─────────────────┘     └──────────────┘     └───────┬───────┘
//!                                                      │
//!                         ┌──────────────┐             │
//!                         │     Sync     │◄────────────┘
//!                         │  Reconciler  │   (change feed)
//!                         └──────────────┘
//! ```
//!
//! ## Features
//!
//! - **Attribute Resolver**: SET, MERGE, AUTHORITATIVE_MERGE, CREATE and WRITE_IF_NULL strategies
//! - **Batch Queue**: An EXCEPTION blocks its batch until retried or canceled
//! - **Circuit Breaker**: Sliding-window failure counts with warning and disable notifications
//! - **Sync Reconciler**: Situation-driven actions, cooperative cancel and incremental tokens
//!
//! ## Example
//!
//! ```ignore
//! use xavyo_provisioning::{Dispatch, ProvisioningService};
//!
//! let service = ProvisioningService::new(configs, identities, queue.clone());
//! let operation = service
//!     .provision_account(entity_id, system_id, Dispatch::Queue)
//!     .await?;
//!
//! // Workers drain the batch
//! worker.run().await;
//! ```

pub mod breaker;
pub mod config;
pub mod identity;
pub mod mapping;
pub mod notify;
pub mod operation;
pub mod processor;
pub mod provisioning;
pub mod queue;
pub mod resolver;
pub mod store;
pub mod sync;
pub mod transform;
pub mod worker;

// Re-exports for convenience
pub use breaker::{BreakerState, BreakerStatus, ProvisioningBreakConfig, ProvisioningBreaker};
pub use config::{ConfigError, EngineConfig};
pub use identity::{
    Account, AccountId, ControlledValue, EntityAccountLink, EntityId, EntityState,
    IdentityEntity, LinkId, RoleAssignment, RoleAssignmentId,
};
pub use mapping::{AttributeMapping, MappingOperation, MappingStrategy, RoleMapping, SystemMapping};
pub use notify::{Notifier, NotifyError, NotifyResult, TracingNotifier};
pub use operation::{
    result_codes, OperationPayload, OperationResult, OperationState, ProvisioningBatch,
    ProvisioningOperation,
};
pub use processor::{ConnectorProvider, ConnectorRegistry, OperationExecutor};
pub use provisioning::{Dispatch, ProvisioningError, ProvisioningResult, ProvisioningService};
pub use queue::{ExecuteOutcome, ProvisioningQueue, QueueError, QueueResult};
pub use resolver::{
    AttributeResolver, ResolvedAccount, ResolverError, ResolverInput, ResolverResult,
    RoleContribution,
};
pub use store::memory::InMemoryStore;
pub use store::postgres::PgOperationStore;
pub use store::{ConfigStore, IdentityStore, OperationStore, StoreError, StoreResult, SyncLogStore};
pub use sync::{
    InactiveOwnerBehavior, SyncActionType, SyncConfigId, SyncError, SyncLog, SyncLogId,
    SyncReconciler, SyncResult, SyncSituation, SynchronizationConfig,
};
pub use transform::{Transform, TransformContext, TransformError};
pub use worker::{ProvisioningWorker, WorkerConfig};
