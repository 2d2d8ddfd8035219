//! Attribute Value Resolver.
//!
//! Computes the attribute set sent to a target system for one account from
//! the system mapping, the role contributions of the owning entity, the
//! values controlled in earlier passes and, for updates, a pre-read of the
//! target object.
//!
//! Sources are ordered by priority (highest first) and then by source name,
//! so conflicting SET contributions of equal priority always resolve the same
//! way regardless of the order they were supplied in.
//!
//! For MERGE and AUTHORITATIVE_MERGE the output is
//! `(remote ∪ asserted) − (previously controlled − asserted)`: values the
//! engine never asserted are left alone on the target, and a value only
//! disappears once no active source asserts it anymore.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::{debug, instrument};

use xavyo_connector::operation::{AttributeSet, AttributeValue};
use xavyo_connector::types::OperationType;

use crate::identity::{ControlledValue, IdentityEntity};
use crate::mapping::{AttributeMapping, MappingStrategy, RoleMapping, SystemMapping};
use crate::transform::{TransformContext, TransformError};

/// Source name of the base system mapping.
pub const SYSTEM_SOURCE: &str = "system";

/// Resolver errors. All of them are configuration problems.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// A CREATE could not determine the account UID.
    #[error("no value resolved for the UID attribute of mapping {mapping}")]
    MissingUid { mapping: String },

    /// A role contributes an attribute the system mapping does not define.
    #[error("role '{role}' maps unknown schema attribute '{attribute}'")]
    UnmappedAttribute { role: String, attribute: String },

    /// A transform failed.
    #[error("transform of attribute '{attribute}' failed: {source}")]
    Transform {
        attribute: String,
        #[source]
        source: TransformError,
    },
}

/// Result type for resolver operations.
pub type ResolverResult<T> = Result<T, ResolverError>;

/// Attribute mappings one role assignment contributes.
#[derive(Debug, Clone)]
pub struct RoleContribution {
    /// Source name, the role code.
    pub source: String,
    /// Assignment priority; higher wins.
    pub priority: i32,
    /// Overrides other contributions under AUTHORITATIVE_MERGE.
    pub authoritative: bool,
    pub attributes: Vec<AttributeMapping>,
}

impl RoleContribution {
    /// Build a contribution from a role mapping and its assignment priority.
    #[must_use]
    pub fn from_role(role: &RoleMapping, priority: i32) -> Self {
        Self {
            source: role.role_code.clone(),
            priority,
            authoritative: role.authoritative,
            attributes: role.attributes.clone(),
        }
    }
}

/// Everything the resolver reads.
#[derive(Debug, Clone, Copy)]
pub struct ResolverInput<'a> {
    pub operation_type: OperationType,
    pub mapping: &'a SystemMapping,
    pub entity: &'a IdentityEntity,
    pub contributions: &'a [RoleContribution],
    /// Controlled values persisted for this account.
    pub previous: &'a [ControlledValue],
    /// Current state on the target; `None` when the object does not exist.
    pub current: Option<&'a AttributeSet>,
}

/// Output of one resolver pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccount {
    /// Account UID from the UID mapping, if it resolved.
    pub uid: Option<String>,
    /// Attributes to send.
    pub attributes: AttributeSet,
    /// Names of sent attributes that must be masked.
    pub confidential: BTreeSet<String>,
    /// Controlled values to persist for the account, sorted.
    pub controlled_values: Vec<ControlledValue>,
}

struct Candidate<'a> {
    source: &'a str,
    priority: i32,
    authoritative: bool,
    mapping: &'a AttributeMapping,
    values: Vec<AttributeValue>,
}

/// Stateless resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeResolver;

impl AttributeResolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Resolve the outbound attributes of one account.
    #[instrument(skip_all, fields(mapping_id = %input.mapping.id, operation = %input.operation_type))]
    pub fn resolve(&self, input: &ResolverInput<'_>) -> ResolverResult<ResolvedAccount> {
        let context = TransformContext::outbound(
            input.mapping.system_id,
            input.mapping.entity_type.clone(),
            input.operation_type,
        );

        let mut by_attribute: BTreeMap<&str, (&AttributeMapping, Vec<Candidate<'_>>)> =
            BTreeMap::new();

        for base in &input.mapping.attributes {
            let values = compute_values(base, input.entity, &context)?;
            by_attribute
                .entry(base.schema_attribute.as_str())
                .or_insert_with(|| (base, Vec::new()))
                .1
                .push(Candidate {
                    source: SYSTEM_SOURCE,
                    priority: i32::MIN,
                    authoritative: false,
                    mapping: base,
                    values,
                });
        }

        for contribution in input.contributions {
            for mapping in &contribution.attributes {
                let Some((_, candidates)) = by_attribute.get_mut(mapping.schema_attribute.as_str())
                else {
                    return Err(ResolverError::UnmappedAttribute {
                        role: contribution.source.clone(),
                        attribute: mapping.schema_attribute.clone(),
                    });
                };
                candidates.push(Candidate {
                    source: &contribution.source,
                    priority: contribution.priority,
                    authoritative: contribution.authoritative,
                    mapping,
                    values: compute_values(mapping, input.entity, &context)?,
                });
            }
        }

        let mut resolved = ResolvedAccount {
            uid: None,
            attributes: AttributeSet::new(),
            confidential: BTreeSet::new(),
            controlled_values: Vec::new(),
        };
        let mut controlled: BTreeSet<ControlledValue> = BTreeSet::new();

        for (attribute, (base, mut candidates)) in by_attribute {
            candidates.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.source.cmp(b.source))
                    .then_with(|| a.mapping.id.cmp(&b.mapping.id))
            });
            let Some(primary) = candidates.first() else {
                continue;
            };

            // Strategy and attribute flags belong to the system mapping; roles
            // only contribute values.
            if base.is_uid {
                resolved.uid = primary.values.first().map(ToString::to_string);
            }

            if base.password && input.operation_type != OperationType::Create {
                continue;
            }

            let remote = input.current.map(|c| c.values(attribute)).unwrap_or(&[]);

            let values = match base.strategy {
                MappingStrategy::Create if input.operation_type != OperationType::Create => {
                    continue;
                }
                MappingStrategy::WriteIfNull
                    if input.current.is_some_and(|c| !c.is_empty_attribute(attribute)) =>
                {
                    debug!(attribute, "Target already has a value, skipping WRITE_IF_NULL");
                    continue;
                }
                MappingStrategy::Set | MappingStrategy::Create | MappingStrategy::WriteIfNull => {
                    primary.values.clone()
                }
                MappingStrategy::Merge | MappingStrategy::AuthoritativeMerge => merge_values(
                    base,
                    &candidates,
                    input.previous,
                    input.current.map(|_| remote),
                    &mut controlled,
                ),
            };

            if !should_send(base, input.operation_type, &values, remote) {
                continue;
            }

            if base.confidential {
                resolved.confidential.insert(attribute.to_string());
            }
            resolved.attributes.set(attribute, values);
        }

        if input.operation_type == OperationType::Create
            && resolved.uid.as_deref().map_or(true, str::is_empty)
        {
            return Err(ResolverError::MissingUid {
                mapping: input.mapping.id.to_string(),
            });
        }

        resolved.controlled_values = controlled.into_iter().collect();
        debug!(
            attributes = resolved.attributes.len(),
            controlled = resolved.controlled_values.len(),
            "Resolved account attributes"
        );
        Ok(resolved)
    }
}

/// Read the mapped property and run the outbound transform.
fn compute_values(
    mapping: &AttributeMapping,
    entity: &IdentityEntity,
    context: &TransformContext,
) -> ResolverResult<Vec<AttributeValue>> {
    let raw = match &mapping.idm_property {
        Some(property) if mapping.extended_attribute => {
            entity.extended_attributes.values(property).to_vec()
        }
        Some(property) if mapping.entity_attribute => entity.attributes.values(property).to_vec(),
        _ => Vec::new(),
    };
    let raw: Vec<AttributeValue> = raw.into_iter().filter(|v| !v.is_blank()).collect();

    match &mapping.to_resource {
        Some(transform) => {
            transform
                .apply(raw, context)
                .map_err(|source| ResolverError::Transform {
                    attribute: mapping.schema_attribute.clone(),
                    source,
                })
        }
        None => Ok(raw),
    }
}

/// Compute merged values and record the controlled values for the next pass.
///
/// `remote` is `None` when the target state is unknown or absent.
fn merge_values(
    base: &AttributeMapping,
    candidates: &[Candidate<'_>],
    previous: &[ControlledValue],
    remote: Option<&[AttributeValue]>,
    controlled: &mut BTreeSet<ControlledValue>,
) -> Vec<AttributeValue> {
    let authoritative_active = base.strategy == MappingStrategy::AuthoritativeMerge
        && candidates
            .iter()
            .any(|c| c.authoritative && !c.values.is_empty());

    let contributing = candidates
        .iter()
        .filter(|c| !authoritative_active || c.authoritative);

    let mut asserted: BTreeSet<AttributeValue> = BTreeSet::new();
    for candidate in contributing {
        for value in &candidate.values {
            asserted.insert(value.clone());
            controlled.insert(ControlledValue::active(
                base.id,
                candidate.source,
                value.clone(),
            ));
        }
    }

    let remote_set: BTreeSet<&AttributeValue> = remote.unwrap_or(&[]).iter().collect();
    let mut removed: BTreeSet<&AttributeValue> = BTreeSet::new();
    for stale in previous
        .iter()
        .filter(|p| p.attribute_mapping_id == base.id && !asserted.contains(&p.value))
    {
        removed.insert(&stale.value);
        // Keep tracking until a pre-read confirms the value is gone.
        if remote.is_none() || remote_set.contains(&stale.value) {
            controlled.insert(stale.clone().into_historic());
        }
    }

    let mut out: BTreeSet<AttributeValue> = remote_set
        .into_iter()
        .filter(|v| !removed.contains(v))
        .cloned()
        .collect();
    out.extend(asserted);
    out.into_iter().collect()
}

/// Decide whether a computed attribute goes into the outbound set.
fn should_send(
    mapping: &AttributeMapping,
    operation_type: OperationType,
    values: &[AttributeValue],
    remote: &[AttributeValue],
) -> bool {
    if values.is_empty() {
        if mapping.send_only_if_not_null {
            return false;
        }
        return match operation_type {
            OperationType::Create => mapping.send_always,
            _ => mapping.send_always || !remote.is_empty(),
        };
    }

    if operation_type == OperationType::Create || mapping.send_always {
        return true;
    }

    let mut wanted: Vec<&AttributeValue> = values.iter().collect();
    let mut have: Vec<&AttributeValue> = remote.iter().collect();
    wanted.sort();
    have.sort();
    wanted != have
}
