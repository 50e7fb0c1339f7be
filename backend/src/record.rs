//! Records and unique addresses
//!
//! A [`Record`] is one row as seen by the mediator: field name to typed
//! value, in a stable (sorted) field order. An [`Identity`] is a validated
//! where-unique address: either every identity field of the entity or
//! exactly one single-field unique key.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::value::Value;

/// One row of an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Value of `field`, treating an absent field as null
    pub fn value(&self, field: &str) -> &Value {
        self.0.get(field).unwrap_or(&Value::Null)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    /// Keep only the fields for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.0.retain(|name, _| keep(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Project the values of `fields`, in order
    pub fn project(&self, fields: &[&str]) -> Vec<Value> {
        fields.iter().map(|f| self.value(f).clone()).collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A where-unique address resolving to at most one row.
///
/// Only constructed through validation, so every value is non-null and the
/// key set is a unique key of the entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Identity(BTreeMap<String, Value>);

impl Identity {
    pub(crate) fn from_pairs(pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    /// Address of `record` under the given key fields
    pub fn of(record: &Record, key: &[&str]) -> Option<Self> {
        let mut pairs = BTreeMap::new();
        for field in key {
            match record.get(field) {
                Some(v) if !v.is_null() => {
                    pairs.insert((*field).to_string(), v.clone());
                }
                _ => return None,
            }
        }
        Some(Self(pairs))
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True when `record` carries every value of this address
    pub fn matches(&self, record: &Record) -> bool {
        self.0
            .iter()
            .all(|(field, value)| record.value(field).same(value))
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        f.write_str(&parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> Record {
        [
            ("Id", Value::Int(3)),
            ("Name", Value::from("Front Door")),
            ("ServerId", Value::Null),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_identity_of_requires_non_null() {
        let record = monitor();
        assert!(Identity::of(&record, &["Id"]).is_some());
        assert!(Identity::of(&record, &["ServerId"]).is_none());
        assert!(Identity::of(&record, &["Missing"]).is_none());
    }

    #[test]
    fn test_identity_matches() {
        let record = monitor();
        let id = Identity::of(&record, &["Id"]).unwrap();
        assert!(id.matches(&record));

        let mut other = record.clone();
        other.insert("Id", Value::Int(4));
        assert!(!id.matches(&other));
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let json = serde_json::to_value(monitor()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"Id": 3, "Name": "Front Door", "ServerId": null})
        );
    }
}
