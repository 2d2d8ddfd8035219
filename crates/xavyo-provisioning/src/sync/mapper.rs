//! Inbound mapping of remote attributes onto entity properties.

use tracing::warn;
use xavyo_connector::operation::{AttributeSet, AttributeValue};

use super::error::{SyncError, SyncResult};
use crate::identity::IdentityEntity;
use crate::mapping::{AttributeMapping, SystemMapping};
use crate::transform::TransformContext;

/// Entity values carried by one remote object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundValues {
    /// Core entity attributes.
    pub attributes: AttributeSet,
    /// Extended entity attributes.
    pub extended: AttributeSet,
}

impl InboundValues {
    /// Values of an entity property, core or extended.
    #[must_use]
    pub fn property(&self, name: &str) -> &[AttributeValue] {
        match self.attributes.get(name) {
            Some(values) => values,
            None => self.extended.values(name),
        }
    }

    /// Write the values onto an entity, replacing what it had.
    pub fn apply_to(&self, entity: &mut IdentityEntity) {
        for (name, values) in self.attributes.iter() {
            entity.attributes.set(name.clone(), values.clone());
        }
        for (name, values) in self.extended.iter() {
            entity.extended_attributes.set(name.clone(), values.clone());
        }
        entity.updated_at = chrono::Utc::now();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.extended.is_empty()
    }
}

/// Maps remote attributes of a synchronization mapping to entity values.
#[derive(Debug, Clone, Copy, Default)]
pub struct InboundMapper;

impl InboundMapper {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Map a remote object.
    ///
    /// Attributes absent from the remote object are left out so a partial
    /// delta never blanks an entity property, unless a transform can produce
    /// a value on its own.
    pub fn map(&self, mapping: &SystemMapping, remote: &AttributeSet) -> SyncResult<InboundValues> {
        let context = TransformContext::inbound(mapping.system_id, mapping.entity_type.clone());
        let mut values = InboundValues::default();

        for attribute in mapping.attributes.iter().filter(|a| is_inbound(a)) {
            let Some(property) = attribute.idm_property.as_deref() else {
                continue;
            };
            if !remote.has(&attribute.schema_attribute) && attribute.from_resource.is_none() {
                continue;
            }

            let raw = remote.values(&attribute.schema_attribute).to_vec();
            let mapped = match &attribute.from_resource {
                Some(transform) => {
                    transform
                        .apply(raw, &context)
                        .map_err(|source| SyncError::Transform {
                            attribute: attribute.schema_attribute.clone(),
                            source,
                        })?
                }
                None => raw,
            };

            if attribute.extended_attribute {
                values.extended.set(property, mapped);
            } else {
                values.attributes.set(property, mapped);
            }
        }

        if values.is_empty() && !remote.is_empty() {
            warn!(mapping_id = %mapping.id, "Remote object carries no mapped attribute");
        }
        Ok(values)
    }
}

fn is_inbound(attribute: &AttributeMapping) -> bool {
    attribute.idm_property.is_some()
        && (attribute.entity_attribute || attribute.extended_attribute)
        && !attribute.password
}
