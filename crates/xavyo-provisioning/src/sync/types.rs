//! Sync types: situations, actions and the synchronization configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use xavyo_connector::ids::MappingId;
use xavyo_connector::uuid_id;

uuid_id!(
    /// Identifier of a synchronization configuration.
    SyncConfigId
);

uuid_id!(
    /// Identifier of a synchronization run log.
    SyncLogId
);

uuid_id!(
    /// Identifier of an action log inside a run.
    SyncActionLogId
);

uuid_id!(
    /// Identifier of an item log.
    SyncItemLogId
);

/// Relationship between a remote object and the identity model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncSituation {
    /// Account exists and is linked to an entity.
    Linked,
    /// An entity matches, but the account is not linked to it.
    Unlinked,
    /// Remote object with no owning entity.
    MissingEntity,
    /// Known account whose remote object is gone.
    MissingAccount,
}

impl SyncSituation {
    pub const ALL: [SyncSituation; 4] = [
        SyncSituation::Linked,
        SyncSituation::Unlinked,
        SyncSituation::MissingEntity,
        SyncSituation::MissingAccount,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncSituation::Linked => "LINKED",
            SyncSituation::Unlinked => "UNLINKED",
            SyncSituation::MissingEntity => "MISSING_ENTITY",
            SyncSituation::MissingAccount => "MISSING_ACCOUNT",
        }
    }

    /// Actions that may be configured for this situation.
    #[must_use]
    pub fn valid_actions(&self) -> &'static [SyncActionType] {
        use SyncActionType::*;
        match self {
            SyncSituation::Linked => &[
                UpdateEntity,
                UpdateAccount,
                Unlink,
                UnlinkAndRemoveRole,
                Ignore,
            ],
            SyncSituation::Unlinked => &[LinkAndUpdateEntity, Link, Ignore],
            SyncSituation::MissingEntity => &[CreateEntity, DeleteAccount, DisableAccount, Ignore],
            SyncSituation::MissingAccount => &[
                CreateAccount,
                DeleteEntity,
                Unlink,
                UnlinkAndRemoveRole,
                Ignore,
            ],
        }
    }

    #[must_use]
    pub fn allows(&self, action: SyncActionType) -> bool {
        self.valid_actions().contains(&action)
    }
}

impl fmt::Display for SyncSituation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncSituation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LINKED" => Ok(SyncSituation::Linked),
            "UNLINKED" => Ok(SyncSituation::Unlinked),
            "MISSING_ENTITY" => Ok(SyncSituation::MissingEntity),
            "MISSING_ACCOUNT" => Ok(SyncSituation::MissingAccount),
            _ => Err(format!("Unknown sync situation: {s}")),
        }
    }
}

/// Action applied to a classified item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncActionType {
    UpdateEntity,
    UpdateAccount,
    Unlink,
    UnlinkAndRemoveRole,
    Link,
    LinkAndUpdateEntity,
    CreateEntity,
    DeleteAccount,
    DisableAccount,
    CreateAccount,
    DeleteEntity,
    Ignore,
}

impl SyncActionType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncActionType::UpdateEntity => "UPDATE_ENTITY",
            SyncActionType::UpdateAccount => "UPDATE_ACCOUNT",
            SyncActionType::Unlink => "UNLINK",
            SyncActionType::UnlinkAndRemoveRole => "UNLINK_AND_REMOVE_ROLE",
            SyncActionType::Link => "LINK",
            SyncActionType::LinkAndUpdateEntity => "LINK_AND_UPDATE_ENTITY",
            SyncActionType::CreateEntity => "CREATE_ENTITY",
            SyncActionType::DeleteAccount => "DELETE_ACCOUNT",
            SyncActionType::DisableAccount => "DISABLE_ACCOUNT",
            SyncActionType::CreateAccount => "CREATE_ACCOUNT",
            SyncActionType::DeleteEntity => "DELETE_ENTITY",
            SyncActionType::Ignore => "IGNORE",
        }
    }
}

impl fmt::Display for SyncActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when the correlated owner of an account is not active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InactiveOwnerBehavior {
    /// Skip the link.
    DoNotLink,
    /// Link and freeze the account against automatic provisioning.
    LinkProtected,
    /// Link as usual.
    #[default]
    Link,
}

/// Synchronization configuration of one system mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynchronizationConfig {
    pub id: SyncConfigId,
    pub name: String,
    /// System mapping (synchronization direction) used for inbound values.
    pub mapping_id: MappingId,
    /// Configured action per situation; missing entries mean IGNORE.
    #[serde(default)]
    pub situation_actions: BTreeMap<SyncSituation, SyncActionType>,
    #[serde(default)]
    pub inactive_owner_behavior: InactiveOwnerBehavior,
    /// Enables incremental runs when set.
    #[serde(default)]
    pub token_attribute: Option<String>,
    /// Token of the last fully completed run.
    #[serde(default)]
    pub last_token: Option<String>,
    /// Entity property compared against the same-named mapped attribute.
    #[serde(default)]
    pub correlation_attribute: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl SynchronizationConfig {
    pub fn new(name: impl Into<String>, mapping_id: MappingId) -> Self {
        Self {
            id: SyncConfigId::new(),
            name: name.into(),
            mapping_id,
            situation_actions: BTreeMap::new(),
            inactive_owner_behavior: InactiveOwnerBehavior::default(),
            token_attribute: None,
            last_token: None,
            correlation_attribute: None,
            enabled: true,
        }
    }

    #[must_use]
    pub fn with_action(mut self, situation: SyncSituation, action: SyncActionType) -> Self {
        self.situation_actions.insert(situation, action);
        self
    }

    #[must_use]
    pub fn with_inactive_owner_behavior(mut self, behavior: InactiveOwnerBehavior) -> Self {
        self.inactive_owner_behavior = behavior;
        self
    }

    #[must_use]
    pub fn with_token_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.token_attribute = Some(attribute.into());
        self
    }

    #[must_use]
    pub fn with_correlation_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.correlation_attribute = Some(attribute.into());
        self
    }

    /// Configured action for a situation.
    #[must_use]
    pub fn action_for(&self, situation: SyncSituation) -> SyncActionType {
        self.situation_actions
            .get(&situation)
            .copied()
            .unwrap_or(SyncActionType::Ignore)
    }

    /// First configured action that is not valid for its situation.
    #[must_use]
    pub fn invalid_action(&self) -> Option<(SyncSituation, SyncActionType)> {
        self.situation_actions
            .iter()
            .find(|(situation, action)| !situation.allows(**action))
            .map(|(s, a)| (*s, *a))
    }
}
