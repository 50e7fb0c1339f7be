//! Entity descriptors
//!
//! An [`EntityDescriptor`] is the single source of truth for one table: its
//! fields, their scalar kinds, nullability, defaults and the identity used to
//! address a row. Every other layer (filters, payload validation, planning,
//! SQL generation) derives its behaviour from it.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use super::SchemaError;
use crate::record::Record;
use crate::value::{self, Value};

/// Semantic primitive type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "variants", rename_all = "camelCase")]
pub enum ScalarKind {
    String,
    Int,
    BigInt,
    Float,
    Decimal,
    Boolean,
    DateTime,
    Enum(&'static [&'static str]),
}

impl ScalarKind {
    /// Kinds that support `lt`/`lte`/`gt`/`gte` and `_min`/`_max`
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            ScalarKind::String
                | ScalarKind::Int
                | ScalarKind::BigInt
                | ScalarKind::Float
                | ScalarKind::Decimal
                | ScalarKind::DateTime
        )
    }

    /// Kinds that support arithmetic updates and `_avg`/`_sum`
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ScalarKind::Int | ScalarKind::BigInt | ScalarKind::Float | ScalarKind::Decimal
        )
    }

    /// Kinds that support `contains`/`startsWith`/`endsWith`
    pub fn is_text(&self) -> bool {
        matches!(self, ScalarKind::String)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Int => "int",
            ScalarKind::BigInt => "bigint",
            ScalarKind::Float => "float",
            ScalarKind::Decimal => "decimal",
            ScalarKind::Boolean => "boolean",
            ScalarKind::DateTime => "datetime",
            ScalarKind::Enum(_) => "enum",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKind::Enum(variants) => write!(f, "enum({})", variants.join("|")),
            other => f.write_str(other.name()),
        }
    }
}

/// Default applied when a create payload omits a field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DefaultValue {
    Literal(Value),
    /// Next value of a per-table sequence (max + 1)
    AutoIncrement,
    /// Current timestamp at insert time
    Now,
}

/// One column of an entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: ScalarKind,
    pub nullable: bool,
    /// Single-field unique key, usable as an alternative address
    pub unique: bool,
    pub default: Option<DefaultValue>,
}

impl FieldDef {
    pub fn new(name: &'static str, kind: ScalarKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            unique: false,
            default: None,
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, ScalarKind::String)
    }

    pub fn int(name: &'static str) -> Self {
        Self::new(name, ScalarKind::Int)
    }

    pub fn big_int(name: &'static str) -> Self {
        Self::new(name, ScalarKind::BigInt)
    }

    pub fn float(name: &'static str) -> Self {
        Self::new(name, ScalarKind::Float)
    }

    pub fn decimal(name: &'static str) -> Self {
        Self::new(name, ScalarKind::Decimal)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, ScalarKind::Boolean)
    }

    pub fn date_time(name: &'static str) -> Self {
        Self::new(name, ScalarKind::DateTime)
    }

    pub fn enumeration(name: &'static str, variants: &'static [&'static str]) -> Self {
        Self::new(name, ScalarKind::Enum(variants))
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Literal default, normalized to the field kind when the entity is built
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.default = Some(DefaultValue::AutoIncrement);
        self
    }

    pub fn default_now(mut self) -> Self {
        self.default = Some(DefaultValue::Now);
        self
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Non-nullable without a default: must be present on create
    pub fn is_required(&self) -> bool {
        !self.nullable && self.default.is_none()
    }
}

/// Shape of one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDescriptor {
    pub name: &'static str,
    pub fields: Vec<FieldDef>,
    #[serde(rename = "identityFields")]
    pub identity: Vec<&'static str>,
}

impl EntityDescriptor {
    pub fn builder(name: &'static str) -> EntityBuilder {
        EntityBuilder {
            name,
            fields: Vec::new(),
            identity: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    /// Every key that addresses at most one row: the identity first, then
    /// each single-field unique column.
    pub fn unique_keys(&self) -> Vec<Vec<&'static str>> {
        let mut keys = vec![self.identity.clone()];
        for field in &self.fields {
            if field.unique && !(self.identity.len() == 1 && self.identity[0] == field.name) {
                keys.push(vec![field.name]);
            }
        }
        keys
    }

    /// Fill literal and `Now` defaults for fields absent from `record`.
    /// Auto-increment fields are left to the backend.
    pub fn fill_defaults(&self, record: &mut Record) {
        for field in &self.fields {
            if record.contains(field.name) {
                continue;
            }
            match &field.default {
                Some(DefaultValue::Literal(v)) => record.insert(field.name, v.clone()),
                Some(DefaultValue::Now) => record.insert(field.name, Value::DateTime(value::now())),
                Some(DefaultValue::AutoIncrement) => {}
                None if field.nullable => record.insert(field.name, Value::Null),
                None => {}
            }
        }
    }

    /// Map a backend record to the output shape: drop unknown columns and
    /// complete omitted fields with their literal default, or null.
    pub fn complete_record(&self, mut record: Record) -> Record {
        record.retain(|name| self.field(name).is_some());
        for field in &self.fields {
            if record.contains(field.name) {
                continue;
            }
            let value = match &field.default {
                Some(DefaultValue::Literal(v)) => v.clone(),
                _ => Value::Null,
            };
            record.insert(field.name, value);
        }
        record
    }
}

/// Builder validating an entity shape once, at schema-definition time.
#[derive(Debug)]
pub struct EntityBuilder {
    name: &'static str,
    fields: Vec<FieldDef>,
    identity: Vec<&'static str>,
}

impl EntityBuilder {
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn identity(mut self, fields: &[&'static str]) -> Self {
        self.identity = fields.to_vec();
        self
    }

    pub fn build(self) -> Result<EntityDescriptor, SchemaError> {
        let entity = self.name;
        let mut seen = HashSet::new();
        let mut fields = self.fields;
        for field in &mut fields {
            if !seen.insert(field.name) {
                return Err(SchemaError::DuplicateField {
                    entity,
                    field: field.name,
                });
            }
            field.default = normalize_default(entity, field)?;
        }

        if self.identity.is_empty() {
            return Err(SchemaError::EmptyIdentity { entity });
        }
        for &name in &self.identity {
            let field = fields
                .iter()
                .find(|f| f.name == name)
                .ok_or(SchemaError::UnknownIdentityField {
                    entity,
                    field: name,
                })?;
            if field.nullable {
                return Err(SchemaError::NullableIdentity {
                    entity,
                    field: name,
                });
            }
        }

        Ok(EntityDescriptor {
            name: self.name,
            fields,
            identity: self.identity,
        })
    }
}

fn normalize_default(
    entity: &'static str,
    field: &FieldDef,
) -> Result<Option<DefaultValue>, SchemaError> {
    let invalid = |reason: String| SchemaError::InvalidDefault {
        entity,
        field: field.name,
        reason,
    };
    match &field.default {
        None => Ok(None),
        Some(DefaultValue::AutoIncrement) => match field.kind {
            ScalarKind::Int | ScalarKind::BigInt => Ok(Some(DefaultValue::AutoIncrement)),
            other => Err(invalid(format!("auto-increment on {} field", other))),
        },
        Some(DefaultValue::Now) => match field.kind {
            ScalarKind::DateTime => Ok(Some(DefaultValue::Now)),
            other => Err(invalid(format!("now() on {} field", other))),
        },
        Some(DefaultValue::Literal(v)) => {
            let raw = serde_json::to_value(v).map_err(|e| invalid(e.to_string()))?;
            match Value::coerce(field.kind, &raw) {
                Ok(Value::Null) if field.nullable => Ok(Some(DefaultValue::Literal(Value::Null))),
                Ok(Value::Null) => Err(invalid("null default on non-nullable field".to_string())),
                Ok(coerced) => Ok(Some(DefaultValue::Literal(coerced))),
                Err(m) => Err(invalid(format!("expected {}, got {}", m.expected, m.actual))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn config() -> EntityDescriptor {
        EntityDescriptor::builder("Config")
            .field(FieldDef::int("Id").auto_increment().unique())
            .field(FieldDef::string("Name"))
            .field(FieldDef::string("Value"))
            .field(FieldDef::string("Prompt").nullable())
            .field(FieldDef::int("Readonly").default(0))
            .identity(&["Name"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_required_fields() {
        let entity = config();
        let required: Vec<_> = entity
            .fields
            .iter()
            .filter(|f| f.is_required())
            .map(|f| f.name)
            .collect();
        assert_eq!(required, vec!["Name", "Value"]);
    }

    #[test]
    fn test_unique_keys_include_identity_first() {
        let entity = config();
        assert_eq!(entity.unique_keys(), vec![vec!["Name"], vec!["Id"]]);
    }

    #[test]
    fn test_complete_record_applies_literal_defaults() {
        let entity = config();
        let mut record = Record::new();
        record.insert("Name", Value::from("X"));
        record.insert("Stray", Value::Int(1));

        let out = entity.complete_record(record);
        assert_eq!(out.get("Readonly"), Some(&Value::Int(0)));
        assert_eq!(out.get("Prompt"), Some(&Value::Null));
        assert_eq!(out.get("Stray"), None);
    }

    #[test]
    fn test_builder_rejects_bad_shapes() {
        let err = EntityDescriptor::builder("T")
            .field(FieldDef::int("Id"))
            .build()
            .unwrap_err();
        assert_matches!(err, SchemaError::EmptyIdentity { .. });

        let err = EntityDescriptor::builder("T")
            .field(FieldDef::int("Id").nullable())
            .identity(&["Id"])
            .build()
            .unwrap_err();
        assert_matches!(err, SchemaError::NullableIdentity { .. });

        let err = EntityDescriptor::builder("T")
            .field(FieldDef::int("Id"))
            .field(FieldDef::string("Name").auto_increment())
            .identity(&["Id"])
            .build()
            .unwrap_err();
        assert_matches!(err, SchemaError::InvalidDefault { .. });

        let err = EntityDescriptor::builder("T")
            .field(FieldDef::int("Id"))
            .field(FieldDef::int("Count").default("zero"))
            .identity(&["Id"])
            .build()
            .unwrap_err();
        assert_matches!(err, SchemaError::InvalidDefault { .. });
    }
}
