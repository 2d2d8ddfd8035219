//! Identity model records the engine reads and mutates.
//!
//! Accounts are the local representation of objects in target systems. An
//! account becomes owned by an entity through an [`EntityAccountLink`]; the
//! link optionally records the role assignment that caused it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use xavyo_connector::ids::{AttributeMappingId, SystemId};
use xavyo_connector::operation::{AttributeSet, AttributeValue};
use xavyo_connector::uuid_id;

uuid_id!(
    /// Identifier of an identity entity.
    EntityId
);

uuid_id!(
    /// Identifier of an account (system entity).
    AccountId
);

uuid_id!(
    /// Identifier of an entity-account link.
    LinkId
);

uuid_id!(
    /// Identifier of a role assignment.
    RoleAssignmentId
);

/// Lifecycle state of an identity entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    #[default]
    Active,
    Disabled,
}

impl EntityState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityState::Active => "active",
            EntityState::Disabled => "disabled",
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An identity in the authoritative model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityEntity {
    pub id: EntityId,
    pub entity_type: String,
    pub state: EntityState,
    /// Core properties.
    pub attributes: AttributeSet,
    /// Extended (form-defined) properties.
    pub extended_attributes: AttributeSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IdentityEntity {
    pub fn new(entity_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            entity_type: entity_type.into(),
            state: EntityState::Active,
            attributes: AttributeSet::new(),
            extended_attributes: AttributeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.set_single(name, value);
        self
    }

    #[must_use]
    pub fn with_extended(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.extended_attributes.set_single(name, value);
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.state = EntityState::Disabled;
        self
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == EntityState::Active
    }
}

/// An account on a target system, as known to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub system_id: SystemId,
    pub uid: String,
    pub entity_type: String,
    /// Frozen against automatic provisioning.
    pub in_protection: bool,
    /// Planned but not yet created on the target system.
    pub wish: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(system_id: SystemId, uid: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: AccountId::new(),
            system_id,
            uid: uid.into(),
            entity_type: entity_type.into(),
            in_protection: false,
            wish: false,
            created_at: Utc::now(),
        }
    }

    /// An account that still has to be created on the target.
    #[must_use]
    pub fn wished(mut self) -> Self {
        self.wish = true;
        self
    }
}

/// Ownership link between an entity and an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAccountLink {
    pub id: LinkId,
    pub entity_id: EntityId,
    pub account_id: AccountId,
    pub role_assignment_id: Option<RoleAssignmentId>,
    pub created_at: DateTime<Utc>,
}

impl EntityAccountLink {
    #[must_use]
    pub fn new(entity_id: EntityId, account_id: AccountId) -> Self {
        Self {
            id: LinkId::new(),
            entity_id,
            account_id,
            role_assignment_id: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn via_role(mut self, role_assignment_id: RoleAssignmentId) -> Self {
        self.role_assignment_id = Some(role_assignment_id);
        self
    }
}

/// A role assigned to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub id: RoleAssignmentId,
    pub entity_id: EntityId,
    pub role_code: String,
    /// Higher wins when SET mappings of several roles conflict.
    pub priority: i32,
    pub active: bool,
}

impl RoleAssignment {
    pub fn new(entity_id: EntityId, role_code: impl Into<String>, priority: i32) -> Self {
        Self {
            id: RoleAssignmentId::new(),
            entity_id,
            role_code: role_code.into(),
            priority,
            active: true,
        }
    }

    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// A value asserted by one source for a merged attribute of one account.
///
/// Historic values were asserted in an earlier pass and are no longer; they
/// drive removal of values the engine itself put on the target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ControlledValue {
    pub attribute_mapping_id: AttributeMappingId,
    pub source: String,
    pub value: AttributeValue,
    pub historic: bool,
}

impl ControlledValue {
    pub fn active(
        attribute_mapping_id: AttributeMappingId,
        source: impl Into<String>,
        value: AttributeValue,
    ) -> Self {
        Self {
            attribute_mapping_id,
            source: source.into(),
            value,
            historic: false,
        }
    }

    #[must_use]
    pub fn into_historic(mut self) -> Self {
        self.historic = true;
        self
    }
}
