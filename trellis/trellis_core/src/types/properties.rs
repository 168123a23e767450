//! Property values and property maps.
//!
//! Services carry a property mapping that filters are evaluated against,
//! and bundle descriptors carry free-form headers of the same shape. Keys
//! are case-sensitive strings; iteration order carries no meaning.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Property holding the interface names a service is published under.
pub const OBJECTCLASS: &str = "objectclass";

/// Property holding the registry-assigned service id.
pub const SERVICE_ID: &str = "service.id";

/// Property holding the id of the bundle that registered the service.
pub const SERVICE_BUNDLE_ID: &str = "service.bundleid";

/// Property holding the service ranking; higher ranks sort first.
pub const SERVICE_RANKING: &str = "service.ranking";

/// A single property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Boolean value.
    Bool(bool),

    /// Integer value.
    Integer(i64),

    /// Floating-point value.
    Float(f64),

    /// String value.
    String(String),

    /// List of values; filters match a list if any element matches.
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Get this value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer. Integral floats convert.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Float(f)
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 =>
            {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    /// Get this value as a floating-point number.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get this value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a list.
    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Check if this value is a list.
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::String(s) => write!(f, "{}", s),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        i64::try_from(value)
            .map(Self::Integer)
            .unwrap_or(Self::Float(value as f64))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// A property mapping with case-sensitive string keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, PropertyValue>);

impl Properties {
    /// Create an empty property map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a property, returning the previous value for the key.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Option<PropertyValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a property. Keys are case-sensitive.
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    /// Remove a property.
    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.0.remove(key)
    }

    /// Check if a property is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterate over all properties.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    /// Iterate over all keys.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `service.ranking` property, or 0 when absent or not an integer.
    pub fn ranking(&self) -> i32 {
        self.get(SERVICE_RANKING)
            .and_then(PropertyValue::as_integer)
            .and_then(|r| i32::try_from(r).ok())
            .unwrap_or(0)
    }
}

impl<K: Into<String>, V: Into<PropertyValue>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<PropertyValue>> Extend<(K, V)> for Properties {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl IntoIterator for Properties {
    type Item = (String, PropertyValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, PropertyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_case_sensitive() {
        let props = Properties::new().with("Color", "red");
        assert!(props.get("Color").is_some());
        assert!(props.get("color").is_none());
    }

    #[test]
    fn test_ranking_defaults_to_zero() {
        assert_eq!(Properties::new().ranking(), 0);
        assert_eq!(Properties::new().with(SERVICE_RANKING, 10).ranking(), 10);
        assert_eq!(Properties::new().with(SERVICE_RANKING, "high").ranking(), 0);
        assert_eq!(
            Properties::new().with(SERVICE_RANKING, i64::MAX).ranking(),
            0,
            "out-of-range rankings are ignored"
        );
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(PropertyValue::from(3).as_integer(), Some(3));
        assert_eq!(PropertyValue::from(3.0).as_integer(), Some(3));
        assert_eq!(PropertyValue::from(3.5).as_integer(), None);
        assert_eq!(PropertyValue::from("x").as_str(), Some("x"));
        assert_eq!(PropertyValue::from(true).as_bool(), Some(true));
        let list = PropertyValue::from(vec!["a", "b"]);
        assert!(list.is_list());
        assert_eq!(list.to_string(), "[a, b]");
    }

    #[test]
    fn test_collect_and_extend() {
        let mut props: Properties = vec![("a", 1), ("b", 2)].into_iter().collect();
        props.extend(vec![("c", "three")]);
        assert_eq!(props.len(), 3);
        assert_eq!(props.get("c").and_then(PropertyValue::as_str), Some("three"));
    }

    #[test]
    fn test_properties_serde() {
        let props = Properties::new()
            .with("color", "red")
            .with("size", 7)
            .with("tags", vec!["x", "y"])
            .with("enabled", true);
        let json = serde_json::to_string(&props).unwrap();
        let back: Properties = serde_json::from_str(&json).unwrap();
        assert_eq!(props, back);
    }
}
