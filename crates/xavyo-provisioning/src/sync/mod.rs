//! Synchronization Module
//!
//! Reconciles objects of a connected system with the identity model.
//!
//! ## Key Components
//!
//! - [`SyncReconciler`] - Runs a synchronization configuration over the change feed
//! - [`SynchronizationConfig`] - Situation actions, correlation and token settings
//! - [`SynchronizationContext`] - Per-item state handed between pipeline steps
//! - [`InboundMapper`] - Maps remote attributes onto entity properties
//! - [`SyncLog`] - Run, action and item logs
//!
//! ## Item Pipeline
//!
//! ```text
//! ┌───────┐   ┌──────────┐   ┌────────────────┐   ┌───────┐   ┌─────┐
//! │ FETCH │──►│ CLASSIFY │──►│ RESOLVE_ACTION │──►│ APPLY │──►│ LOG │
//! └───────┘   └──────────┘   └────────────────┘   └───────┘   └─────┘
//! ```
//!
//! ## Sync Situations
//!
//! - **Linked**: The account exists and is linked to an entity
//! - **Unlinked**: No link, but correlation found exactly one entity
//! - **Missing Entity**: No link and no correlated entity
//! - **Missing Account**: The account is known but gone remotely
//!
//! ## Example
//!
//! ```ignore
//! use xavyo_provisioning::sync::{SyncActionType, SyncSituation, SynchronizationConfig};
//!
//! let config = SynchronizationConfig::new("hr-feed", mapping.id)
//!     .with_correlation_attribute("email")
//!     .with_token_attribute("modifyTimestamp")
//!     .with_action(SyncSituation::MissingEntity, SyncActionType::CreateEntity)
//!     .with_action(SyncSituation::Unlinked, SyncActionType::LinkAndUpdateEntity)
//!     .with_action(SyncSituation::Linked, SyncActionType::UpdateEntity);
//!
//! let log = reconciler.run_sync(config.id).await?;
//! ```

pub mod context;
pub mod error;
pub mod log;
pub mod mapper;
pub mod reconciler;
pub mod types;

pub use context::SynchronizationContext;
pub use error::{SyncError, SyncResult};
pub use log::{ItemOutcome, SyncActionLog, SyncItemLog, SyncLog};
pub use mapper::{InboundMapper, InboundValues};
pub use reconciler::{ItemReport, PlannedAction, SyncReconciler};
pub use types::{
    InactiveOwnerBehavior, SyncActionLogId, SyncActionType, SyncConfigId, SyncItemLogId,
    SyncLogId, SyncSituation, SynchronizationConfig,
};
