//! Attribute transformations.
//!
//! Pure functions applied to a computed value list on its way to a target
//! system (`to_resource`) or back into the identity model (`from_resource`).
//! A transform sees the values and a read-only [`TransformContext`]; the same
//! input always yields the same output.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use xavyo_connector::ids::SystemId;
use xavyo_connector::operation::AttributeValue;
use xavyo_connector::types::OperationType;

/// Transformation errors.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A regex pattern failed to compile.
    #[error("invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },
}

/// Read-only context handed to transforms.
#[derive(Debug, Clone)]
pub struct TransformContext {
    /// Target system.
    pub system_id: SystemId,
    /// Entity type being mapped (e.g. "identity").
    pub entity_type: String,
    /// Outbound operation type; `None` for inbound mapping.
    pub operation_type: Option<OperationType>,
}

impl TransformContext {
    /// Context for an outbound (provisioning) mapping.
    #[must_use]
    pub fn outbound(
        system_id: SystemId,
        entity_type: impl Into<String>,
        operation_type: OperationType,
    ) -> Self {
        Self {
            system_id,
            entity_type: entity_type.into(),
            operation_type: Some(operation_type),
        }
    }

    /// Context for an inbound (synchronization) mapping.
    #[must_use]
    pub fn inbound(system_id: SystemId, entity_type: impl Into<String>) -> Self {
        Self {
            system_id,
            entity_type: entity_type.into(),
            operation_type: None,
        }
    }
}

/// Transformation to apply to an attribute's values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    /// Convert to lowercase.
    Lowercase,
    /// Convert to uppercase.
    Uppercase,
    /// Trim whitespace.
    Trim,
    /// Replace occurrences.
    Replace {
        /// Pattern to find.
        from: String,
        /// Replacement value.
        to: String,
    },
    /// Prepend a fixed string.
    Prefix { value: String },
    /// Append a fixed string.
    Suffix { value: String },
    /// Keep the given capture group of a regex match (0 = whole match).
    Regex {
        pattern: String,
        #[serde(default)]
        group: usize,
    },
    /// Use `value` when the input carries no non-blank value.
    Default { value: String },
    /// Ignore the input and emit fixed values.
    Constant { values: Vec<AttributeValue> },
    /// Render `template`, substituting `{value}` and `{entity_type}`.
    Format { template: String },
    /// Join all values into one string.
    Join { separator: String },
    /// Split every string value into several.
    Split { separator: String },
    /// Apply transforms in order.
    Chain { transforms: Vec<Transform> },
}

impl Transform {
    /// Apply the transformation.
    ///
    /// Non-string values pass through string transforms untouched. Blank
    /// strings produced along the way are dropped from the output.
    pub fn apply(
        &self,
        values: Vec<AttributeValue>,
        context: &TransformContext,
    ) -> Result<Vec<AttributeValue>, TransformError> {
        let out = match self {
            Transform::Lowercase => map_strings(values, |s| s.to_lowercase()),
            Transform::Uppercase => map_strings(values, |s| s.to_uppercase()),
            Transform::Trim => map_strings(values, |s| s.trim().to_string()),
            Transform::Replace { from, to } => map_strings(values, |s| s.replace(from, to)),
            Transform::Prefix { value } => map_strings(values, |s| format!("{value}{s}")),
            Transform::Suffix { value } => map_strings(values, |s| format!("{s}{value}")),
            Transform::Regex { pattern, group } => {
                let re = Regex::new(pattern).map_err(|e| TransformError::InvalidRegex {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
                map_strings(values, |s| {
                    re.captures(s)
                        .and_then(|caps| caps.get(*group))
                        .map_or_else(String::new, |m| m.as_str().to_string())
                })
            }
            Transform::Default { value } => {
                if values.iter().all(AttributeValue::is_blank) {
                    vec![AttributeValue::String(value.clone())]
                } else {
                    values
                }
            }
            Transform::Constant { values: constant } => constant.clone(),
            Transform::Format { template } => map_strings(values, |s| {
                template
                    .replace("{value}", s)
                    .replace("{entity_type}", &context.entity_type)
            }),
            Transform::Join { separator } => {
                if values.is_empty() {
                    values
                } else {
                    let joined = values
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(separator);
                    vec![AttributeValue::String(joined)]
                }
            }
            Transform::Split { separator } => values
                .into_iter()
                .flat_map(|v| match v {
                    AttributeValue::String(s) => s
                        .split(separator.as_str())
                        .map(|part| AttributeValue::String(part.to_string()))
                        .collect::<Vec<_>>(),
                    other => vec![other],
                })
                .collect(),
            Transform::Chain { transforms } => {
                let mut current = values;
                for t in transforms {
                    current = t.apply(current, context)?;
                }
                current
            }
        };

        Ok(out.into_iter().filter(|v| !v.is_blank()).collect())
    }
}

fn map_strings(values: Vec<AttributeValue>, f: impl Fn(&str) -> String) -> Vec<AttributeValue> {
    values
        .into_iter()
        .map(|v| match v {
            AttributeValue::String(s) => AttributeValue::String(f(&s)),
            other => other,
        })
        .collect()
}
