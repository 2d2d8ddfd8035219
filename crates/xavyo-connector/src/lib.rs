//! # Connector Framework
//!
//! The gateway abstraction the provisioning engine uses to talk to external
//! identity systems (directories, databases, REST APIs).
//!
//! ## Architecture
//!
//! The framework uses a capability-based trait system inspired by `ConnId`:
//!
//! - [`Connector`] - Base trait all connectors implement
//! - [`ReadOp`] - Read one object by UID
//! - [`CreateOp`], [`UpdateOp`], [`DeleteOp`] - Write operations
//! - [`SyncOp`] - Paged, token-restartable change feed
//! - [`FullConnector`] - Everything the engine needs, implemented automatically
//!
//! ## Example
//!
//! ```ignore
//! use xavyo_connector::prelude::*;
//!
//! let attrs = AttributeSet::new()
//!     .with("login", "jdoe")
//!     .with_values("groups", ["admins", "users"]);
//! let uid = with_timeout(Duration::from_secs(30), connector.create("account", attrs)).await?;
//!
//! let page = connector.sync("account", None, 100).await?;
//! for delta in page.deltas {
//!     println!("{} {}", delta.delta_type, delta.uid);
//! }
//! ```
//!
//! ## Crate Organization
//!
//! - [`ids`] - Type-safe identifiers (`SystemId`, `OperationId`, etc.)
//! - [`types`] - Operation and delta enums
//! - [`error`] - Error types with transient/permanent classification
//! - [`traits`] - Connector capability traits and sync page types
//! - [`operation`] - Uid and the multi-valued `AttributeSet`
//! - [`resilience`] - Bounded-timeout wrapper for connector calls

pub mod error;
pub mod ids;
pub mod operation;
pub mod resilience;
pub mod traits;
pub mod types;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{ConnectorError, ConnectorResult};
    pub use crate::ids::{AttributeMappingId, BatchId, MappingId, OperationId, SystemId};
    pub use crate::operation::{AttributeSet, AttributeValue, Uid, ENABLE_ATTRIBUTE};
    pub use crate::resilience::with_timeout;
    pub use crate::traits::{
        Connector, CreateOp, DeleteOp, FullConnector, ReadOp, SyncDelta, SyncOp, SyncPage,
        UpdateOp,
    };
    pub use crate::types::{DeltaType, OperationType};
}

pub use error::{ConnectorError, ConnectorResult};
pub use traits::{Connector, CreateOp, DeleteOp, FullConnector, ReadOp, SyncOp, UpdateOp};
