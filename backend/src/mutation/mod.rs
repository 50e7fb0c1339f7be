//! Mutation input shapes
//!
//! Validated payloads handed to a backend:
//! - [`CreateData`] - the fields a create supplies (defaults are filled at insert)
//! - [`UpdateData`] - per-field [`FieldUpdate`]s for update / updateMany / upsert
//!
//! Relations are plain foreign-key columns, so a single payload shape covers
//! what a relational ORM splits into "checked" and "unchecked" inputs.

mod validate;

pub use validate::{validate_create, validate_identity, validate_update, validate_upsert};

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::BackendError;
use crate::record::Record;
use crate::schema::{DefaultValue, EntityDescriptor};
use crate::value::{Arith, Value};

/// Fields supplied by a create, already coerced to their kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CreateData(pub Record);

impl CreateData {
    pub fn record(&self) -> &Record {
        &self.0
    }

    /// The row to insert: supplied fields plus literal and `now()`
    /// defaults. Auto-increment fields stay absent for the backend to assign.
    pub fn with_defaults(&self, entity: &EntityDescriptor) -> Record {
        let mut record = self.0.clone();
        entity.fill_defaults(&mut record);
        record
    }

    /// Auto-increment fields the payload leaves to the backend
    pub fn pending_sequences<'a>(
        &'a self,
        entity: &'a EntityDescriptor,
    ) -> impl Iterator<Item = &'static str> + 'a {
        entity
            .fields
            .iter()
            .filter(|f| f.default == Some(DefaultValue::AutoIncrement) && !self.0.contains(f.name))
            .map(|f| f.name)
    }
}

/// Change applied to one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldUpdate {
    Set(Value),
    Increment(Value),
    Decrement(Value),
    Multiply(Value),
    Divide(Value),
}

impl FieldUpdate {
    pub fn name(&self) -> &'static str {
        match self {
            FieldUpdate::Set(_) => "set",
            FieldUpdate::Increment(_) => "increment",
            FieldUpdate::Decrement(_) => "decrement",
            FieldUpdate::Multiply(_) => "multiply",
            FieldUpdate::Divide(_) => "divide",
        }
    }

    /// New value of `field` given its `current` value. Arithmetic on a null
    /// current value leaves it null.
    pub fn apply(&self, field: &str, current: &Value) -> Result<Value, BackendError> {
        let (op, operand) = match self {
            FieldUpdate::Set(v) => return Ok(v.clone()),
            FieldUpdate::Increment(v) => (Arith::Add, v),
            FieldUpdate::Decrement(v) => (Arith::Sub, v),
            FieldUpdate::Multiply(v) => (Arith::Mul, v),
            FieldUpdate::Divide(v) => (Arith::Div, v),
        };
        current.arith(op, operand).ok_or_else(|| {
            BackendError::query(format!(
                "{} of {} by {} failed (overflow or invalid operand)",
                self.name(),
                field,
                operand
            ))
        })
    }
}

/// Per-field updates of one mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct UpdateData(pub BTreeMap<String, FieldUpdate>);

impl UpdateData {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldUpdate)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Apply every field update to a copy of `record`
    pub fn apply(&self, record: &Record) -> Result<Record, BackendError> {
        let mut next = record.clone();
        for (field, update) in &self.0 {
            let value = update.apply(field, record.value(field))?;
            next.insert(field.clone(), value);
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_apply_arithmetic() {
        let row: Record = [("Frames", Value::Int(10)), ("Notes", Value::Null)]
            .into_iter()
            .collect();
        let mut updates = BTreeMap::new();
        updates.insert("Frames".to_string(), FieldUpdate::Increment(Value::Int(5)));
        updates.insert("Notes".to_string(), FieldUpdate::Set(Value::from("checked")));
        let next = UpdateData(updates).apply(&row).unwrap();
        assert_eq!(next.get("Frames"), Some(&Value::Int(15)));
        assert_eq!(next.get("Notes"), Some(&Value::from("checked")));
    }

    #[test]
    fn test_overflow_is_backend_error() {
        let update = FieldUpdate::Multiply(Value::Int(2));
        assert_matches!(
            update.apply("Frames", &Value::Int(i32::MAX)),
            Err(BackendError::Query { .. })
        );
        assert_eq!(update.apply("Frames", &Value::Null), Ok(Value::Null));
    }
}
