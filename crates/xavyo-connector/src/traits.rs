//! Connector Framework traits
//!
//! Capability-based trait definitions for connectors, inspired by `ConnId`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ConnectorResult;
use crate::operation::{AttributeSet, Uid};
use crate::types::DeltaType;

/// Base trait for all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Get the display name for this connector instance.
    fn display_name(&self) -> &str;

    /// Test the connection to the target system.
    async fn test_connection(&self) -> ConnectorResult<()>;
}

/// Capability for reading a single object from the target system.
#[async_trait]
pub trait ReadOp: Connector {
    /// Read the current state of an object.
    ///
    /// Returns `Ok(None)` when the object does not exist.
    async fn read(&self, object_class: &str, uid: &Uid) -> ConnectorResult<Option<AttributeSet>>;
}

/// Capability for creating objects in the target system.
#[async_trait]
pub trait CreateOp: Connector {
    /// Create a new object and return the UID assigned by the target system.
    async fn create(&self, object_class: &str, attributes: AttributeSet) -> ConnectorResult<Uid>;
}

/// Capability for updating objects in the target system.
#[async_trait]
pub trait UpdateOp: Connector {
    /// Replace the given attributes of an existing object.
    ///
    /// Attributes not present in `attributes` are left untouched. The returned
    /// UID may differ from the input if the update renamed the object.
    async fn update(
        &self,
        object_class: &str,
        uid: &Uid,
        attributes: AttributeSet,
    ) -> ConnectorResult<Uid>;
}

/// Capability for deleting objects from the target system.
#[async_trait]
pub trait DeleteOp: Connector {
    /// Delete an object.
    async fn delete(&self, object_class: &str, uid: &Uid) -> ConnectorResult<()>;
}

/// A single change reported by the target system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncDelta {
    /// UID of the changed object.
    pub uid: Uid,
    /// Current attributes of the object; `None` for deletions.
    pub attributes: Option<AttributeSet>,
    /// Kind of change.
    pub delta_type: DeltaType,
    /// Token positioned right after this delta, if the system supports it.
    pub token: Option<String>,
}

impl SyncDelta {
    /// Create a create-or-update delta.
    #[must_use]
    pub fn upsert(uid: impl Into<Uid>, attributes: AttributeSet) -> Self {
        Self {
            uid: uid.into(),
            attributes: Some(attributes),
            delta_type: DeltaType::CreateOrUpdate,
            token: None,
        }
    }

    /// Create a delete delta.
    #[must_use]
    pub fn deleted(uid: impl Into<Uid>) -> Self {
        Self {
            uid: uid.into(),
            attributes: None,
            delta_type: DeltaType::Delete,
            token: None,
        }
    }

    /// Attach the token positioned after this delta.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// One finite page of sync deltas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncPage {
    /// Deltas in this page, in the order the system reported them.
    pub deltas: Vec<SyncDelta>,
    /// Token to resume from after this page.
    pub next_token: Option<String>,
    /// Whether another page can be requested with `next_token`.
    pub has_more: bool,
}

impl SyncPage {
    /// Create an empty, final page.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a final page with the given deltas.
    #[must_use]
    pub fn with_deltas(deltas: Vec<SyncDelta>) -> Self {
        Self {
            deltas,
            next_token: None,
            has_more: false,
        }
    }

    /// Set the resume token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.next_token = Some(token.into());
        self
    }

    /// Indicate that more pages follow.
    #[must_use]
    pub fn with_more(mut self) -> Self {
        self.has_more = true;
        self
    }
}

/// Capability for reading changes from the target system.
///
/// The sequence of deltas is consumed page by page; each page is finite and
/// the sequence can be restarted from any token previously handed out.
#[async_trait]
pub trait SyncOp: Connector {
    /// Fetch the next page of deltas.
    ///
    /// With `token == None` the connector reports every current object as a
    /// create-or-update delta (full reconciliation).
    async fn sync(
        &self,
        object_class: &str,
        token: Option<&str>,
        page_size: usize,
    ) -> ConnectorResult<SyncPage>;
}

/// A connector supporting every capability the engine relies on.
pub trait FullConnector: ReadOp + CreateOp + UpdateOp + DeleteOp + SyncOp {}

impl<T> FullConnector for T where T: ReadOp + CreateOp + UpdateOp + DeleteOp + SyncOp {}
