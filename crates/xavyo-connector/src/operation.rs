//! Connector Framework operation types
//!
//! UIDs and the multi-valued attribute model exchanged with target systems.
//! Attributes map a name to an ordered list of values; a missing attribute and
//! an attribute with an empty list are both treated as "empty".

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the pseudo-attribute carrying the enabled flag of an account.
pub const ENABLE_ATTRIBUTE: &str = "__ENABLE__";

/// Unique identifier for an object in a target system.
///
/// Different systems use different identifier schemes (DN, primary key,
/// resource id); the engine treats the value as opaque.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    /// Create a new UID.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Uid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A boolean value.
    Boolean(bool),
    /// An integer value.
    Integer(i64),
    /// A string value.
    String(String),
}

impl AttributeValue {
    /// Get as a string slice if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an integer if this is an integer value.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a boolean if this is a boolean value.
    #[must_use]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// An empty string counts as no value.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        matches!(self, AttributeValue::String(s) if s.is_empty())
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Boolean(b) => write!(f, "{b}"),
            AttributeValue::Integer(i) => write!(f, "{i}"),
            AttributeValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

/// A set of multi-valued attributes.
///
/// Backed by an ordered map so that serialization is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSet {
    #[serde(flatten)]
    attributes: BTreeMap<String, Vec<AttributeValue>>,
}

impl AttributeSet {
    /// Create a new empty attribute set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all values of an attribute.
    pub fn set(&mut self, name: impl Into<String>, values: Vec<AttributeValue>) {
        self.attributes.insert(name.into(), values);
    }

    /// Replace an attribute with a single value.
    pub fn set_single(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), vec![value.into()]);
    }

    /// Set a single value using builder pattern.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set_single(name, value);
        self
    }

    /// Set a list of values using builder pattern.
    #[must_use]
    pub fn with_values<V: Into<AttributeValue>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.set(name, values.into_iter().map(Into::into).collect());
        self
    }

    /// Get the values of an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[AttributeValue]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    /// Get the values of an attribute, or an empty slice.
    #[must_use]
    pub fn values(&self, name: &str) -> &[AttributeValue] {
        self.get(name).unwrap_or(&[])
    }

    /// Get the first value of an attribute.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&AttributeValue> {
        self.get(name).and_then(<[AttributeValue]>::first)
    }

    /// Get the first value of an attribute as a string.
    #[must_use]
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.first(name).and_then(AttributeValue::as_str)
    }

    /// Check if an attribute is present (possibly with no values).
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// True when the attribute is absent or carries no non-blank value.
    #[must_use]
    pub fn is_empty_attribute(&self, name: &str) -> bool {
        self.values(name).iter().all(AttributeValue::is_blank)
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<Vec<AttributeValue>> {
        self.attributes.remove(name)
    }

    /// Get all attribute names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Get the number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate over all attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<AttributeValue>)> {
        self.attributes.iter()
    }

    /// Merge another set into this one, replacing attributes present in both.
    pub fn extend(&mut self, other: AttributeSet) {
        self.attributes.extend(other.attributes);
    }

    /// Convert into the underlying map.
    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, Vec<AttributeValue>> {
        self.attributes
    }
}

impl FromIterator<(String, Vec<AttributeValue>)> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = (String, Vec<AttributeValue>)>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}
