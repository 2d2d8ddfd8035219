//! Per-item synchronization context.
//!
//! A context travels through classification and action handling. Every
//! step returns a new context instead of mutating a shared one, so an
//! action that delegates to another (LINK_AND_UPDATE_ENTITY) works on its
//! own copy.

use std::sync::Arc;

use xavyo_connector::operation::AttributeSet;
use xavyo_connector::traits::SyncDelta;
use xavyo_connector::types::DeltaType;

use super::mapper::InboundValues;
use super::types::{SyncActionType, SyncSituation, SynchronizationConfig};
use crate::identity::{Account, EntityAccountLink, IdentityEntity};
use crate::mapping::SystemMapping;

#[derive(Debug, Clone)]
pub struct SynchronizationContext {
    pub config: Arc<SynchronizationConfig>,
    pub mapping: Arc<SystemMapping>,
    pub uid: String,
    pub delta_type: DeltaType,
    /// Remote attributes; `None` when the object is gone.
    pub remote: Option<AttributeSet>,
    pub token: Option<String>,
    pub mapped: InboundValues,
    pub situation: Option<SyncSituation>,
    pub action: Option<SyncActionType>,
    pub account: Option<Account>,
    pub link: Option<EntityAccountLink>,
    pub entity: Option<IdentityEntity>,
}

impl SynchronizationContext {
    /// Context of a delta from the change feed.
    #[must_use]
    pub fn from_delta(
        config: Arc<SynchronizationConfig>,
        mapping: Arc<SystemMapping>,
        delta: SyncDelta,
    ) -> Self {
        let remote = match delta.delta_type {
            DeltaType::Delete => None,
            DeltaType::CreateOrUpdate => delta.attributes,
        };
        Self {
            config,
            mapping,
            uid: delta.uid.value().to_string(),
            delta_type: delta.delta_type,
            remote,
            token: delta.token,
            mapped: InboundValues::default(),
            situation: None,
            action: None,
            account: None,
            link: None,
            entity: None,
        }
    }

    /// Context of a known account the remote side no longer reports.
    #[must_use]
    pub fn unseen(
        config: Arc<SynchronizationConfig>,
        mapping: Arc<SystemMapping>,
        account: Account,
    ) -> Self {
        Self {
            config,
            mapping,
            uid: account.uid.clone(),
            delta_type: DeltaType::Delete,
            remote: None,
            token: None,
            mapped: InboundValues::default(),
            situation: None,
            action: None,
            account: Some(account),
            link: None,
            entity: None,
        }
    }

    #[must_use]
    pub fn with_mapped(&self, mapped: InboundValues) -> Self {
        let mut next = self.clone();
        next.mapped = mapped;
        next
    }

    #[must_use]
    pub fn with_situation(&self, situation: SyncSituation) -> Self {
        let mut next = self.clone();
        next.situation = Some(situation);
        next
    }

    #[must_use]
    pub fn with_action(&self, action: SyncActionType) -> Self {
        let mut next = self.clone();
        next.action = Some(action);
        next
    }

    #[must_use]
    pub fn with_account(&self, account: Option<Account>) -> Self {
        let mut next = self.clone();
        next.account = account;
        next
    }

    #[must_use]
    pub fn with_link(&self, link: Option<EntityAccountLink>) -> Self {
        let mut next = self.clone();
        next.link = link;
        next
    }

    #[must_use]
    pub fn with_entity(&self, entity: Option<IdentityEntity>) -> Self {
        let mut next = self.clone();
        next.entity = entity;
        next
    }

    /// Value of the UID attribute as reported remotely, for item logs.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        let uid_mapping = self.mapping.uid_mapping()?;
        self.remote
            .as_ref()?
            .get_string(&uid_mapping.schema_attribute)
            .map(str::to_string)
    }
}
