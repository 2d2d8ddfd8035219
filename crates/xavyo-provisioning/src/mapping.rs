//! System mappings.
//!
//! A [`SystemMapping`] describes how one entity type maps onto one object
//! class of a target system. Roles may contribute additional attribute
//! mappings for the same system through a [`RoleMapping`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use xavyo_connector::ids::{AttributeMappingId, MappingId, SystemId};

use crate::transform::Transform;

/// How values from several sources are combined into one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingStrategy {
    /// One source wins by priority.
    #[default]
    Set,
    /// Union of all active sources, with safe removal of stale values.
    Merge,
    /// Like `Merge`, but an authoritative contribution overrides the rest.
    AuthoritativeMerge,
    /// Only sent when the account is created.
    Create,
    /// Only sent when the target currently has no value.
    WriteIfNull,
}

impl MappingStrategy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingStrategy::Set => "SET",
            MappingStrategy::Merge => "MERGE",
            MappingStrategy::AuthoritativeMerge => "AUTHORITATIVE_MERGE",
            MappingStrategy::Create => "CREATE",
            MappingStrategy::WriteIfNull => "WRITE_IF_NULL",
        }
    }
}

impl fmt::Display for MappingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MappingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SET" => Ok(MappingStrategy::Set),
            "MERGE" => Ok(MappingStrategy::Merge),
            "AUTHORITATIVE_MERGE" => Ok(MappingStrategy::AuthoritativeMerge),
            "CREATE" => Ok(MappingStrategy::Create),
            "WRITE_IF_NULL" => Ok(MappingStrategy::WriteIfNull),
            _ => Err(format!("Unknown mapping strategy: {s}")),
        }
    }
}

/// Mapping of one identity property onto one schema attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMapping {
    pub id: AttributeMappingId,
    /// Attribute name on the target system.
    pub schema_attribute: String,
    /// Property read from the entity; `None` for transform-only mappings.
    #[serde(default)]
    pub idm_property: Option<String>,
    #[serde(default)]
    pub strategy: MappingStrategy,
    /// This attribute carries the account UID.
    #[serde(default)]
    pub is_uid: bool,
    /// Read `idm_property` from the entity's core attributes.
    #[serde(default = "default_true")]
    pub entity_attribute: bool,
    /// Read `idm_property` from the entity's extended attributes.
    #[serde(default)]
    pub extended_attribute: bool,
    /// Value must be masked in logs and snapshots.
    #[serde(default)]
    pub confidential: bool,
    /// Value is kept in the account snapshot after provisioning.
    #[serde(default)]
    pub cached: bool,
    /// Password attribute; only sent when the account is created.
    #[serde(default)]
    pub password: bool,
    #[serde(default)]
    pub send_always: bool,
    #[serde(default)]
    pub send_only_if_not_null: bool,
    #[serde(default)]
    pub to_resource: Option<Transform>,
    #[serde(default)]
    pub from_resource: Option<Transform>,
}

fn default_true() -> bool {
    true
}

impl AttributeMapping {
    /// Map `idm_property` of the entity onto `schema_attribute` with SET.
    pub fn new(schema_attribute: impl Into<String>, idm_property: impl Into<String>) -> Self {
        Self {
            id: AttributeMappingId::new(),
            schema_attribute: schema_attribute.into(),
            idm_property: Some(idm_property.into()),
            strategy: MappingStrategy::Set,
            is_uid: false,
            entity_attribute: true,
            extended_attribute: false,
            confidential: false,
            cached: false,
            password: false,
            send_always: false,
            send_only_if_not_null: false,
            to_resource: None,
            from_resource: None,
        }
    }

    /// A mapping whose values come only from its `to_resource` transform.
    pub fn computed(schema_attribute: impl Into<String>, transform: Transform) -> Self {
        let mut mapping = Self::new(schema_attribute, String::new());
        mapping.idm_property = None;
        mapping.entity_attribute = false;
        mapping.to_resource = Some(transform);
        mapping
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: MappingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn as_uid(mut self) -> Self {
        self.is_uid = true;
        self
    }

    /// Read the property from the extended attributes instead.
    #[must_use]
    pub fn extended(mut self) -> Self {
        self.entity_attribute = false;
        self.extended_attribute = true;
        self
    }

    #[must_use]
    pub fn confidential(mut self) -> Self {
        self.confidential = true;
        self
    }

    #[must_use]
    pub fn password(mut self) -> Self {
        self.password = true;
        self.confidential = true;
        self
    }

    #[must_use]
    pub fn cached(mut self) -> Self {
        self.cached = true;
        self
    }

    #[must_use]
    pub fn send_always(mut self) -> Self {
        self.send_always = true;
        self
    }

    #[must_use]
    pub fn send_only_if_not_null(mut self) -> Self {
        self.send_only_if_not_null = true;
        self
    }

    #[must_use]
    pub fn with_to_resource(mut self, transform: Transform) -> Self {
        self.to_resource = Some(transform);
        self
    }

    #[must_use]
    pub fn with_from_resource(mut self, transform: Transform) -> Self {
        self.from_resource = Some(transform);
        self
    }
}

/// Direction a system mapping is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingOperation {
    Provisioning,
    Synchronization,
}

/// Attribute mappings of one entity type on one object class of a system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMapping {
    pub id: MappingId,
    pub system_id: SystemId,
    pub entity_type: String,
    pub object_class: String,
    pub operation: MappingOperation,
    pub attributes: Vec<AttributeMapping>,
}

impl SystemMapping {
    pub fn new(
        system_id: SystemId,
        entity_type: impl Into<String>,
        object_class: impl Into<String>,
        operation: MappingOperation,
    ) -> Self {
        Self {
            id: MappingId::new(),
            system_id,
            entity_type: entity_type.into(),
            object_class: object_class.into(),
            operation,
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, mapping: AttributeMapping) -> Self {
        self.attributes.push(mapping);
        self
    }

    /// The mapping flagged as the account UID, if any.
    #[must_use]
    pub fn uid_mapping(&self) -> Option<&AttributeMapping> {
        self.attributes.iter().find(|m| m.is_uid)
    }

    /// Look up the mapping of a schema attribute.
    #[must_use]
    pub fn attribute(&self, schema_attribute: &str) -> Option<&AttributeMapping> {
        self.attributes
            .iter()
            .find(|m| m.schema_attribute == schema_attribute)
    }
}

/// Attribute mappings a role contributes on one system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMapping {
    pub role_code: String,
    pub system_id: SystemId,
    /// Overrides non-authoritative contributions under AUTHORITATIVE_MERGE.
    #[serde(default)]
    pub authoritative: bool,
    pub attributes: Vec<AttributeMapping>,
}

impl RoleMapping {
    pub fn new(role_code: impl Into<String>, system_id: SystemId) -> Self {
        Self {
            role_code: role_code.into(),
            system_id,
            authoritative: false,
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn authoritative(mut self) -> Self {
        self.authoritative = true;
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, mapping: AttributeMapping) -> Self {
        self.attributes.push(mapping);
        self
    }
}
