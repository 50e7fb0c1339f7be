//! Mutation payload validation

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value as JsonValue};

use super::{CreateData, FieldUpdate, UpdateData};
use crate::error::ValidationError;
use crate::record::{Identity, Record};
use crate::schema::{EntityDescriptor, FieldDef};
use crate::value::Value;

/// Validate a create payload: known fields, coercible values, no null on a
/// non-nullable field, every required field present.
pub fn validate_create(
    entity: &EntityDescriptor,
    raw: &JsonValue,
) -> Result<CreateData, ValidationError> {
    let obj = object(raw, "data")?;

    let mut record = Record::new();
    for (name, value) in obj {
        let def = known_field(entity, name)?;
        record.insert(def.name, coerce(def, value)?);
    }

    for field in &entity.fields {
        if field.is_required() && !record.contains(field.name) {
            return Err(ValidationError::MissingRequiredField {
                field: field.name.to_string(),
            });
        }
    }
    Ok(CreateData(record))
}

/// Validate an update payload. Values are either bare (set) or a single
/// operator object: `set`, `increment`, `decrement`, `multiply`, `divide`.
pub fn validate_update(
    entity: &EntityDescriptor,
    raw: &JsonValue,
) -> Result<UpdateData, ValidationError> {
    let data = update_fields(entity, raw)?;
    if data.is_empty() {
        return Err(ValidationError::EmptyUpdate {
            entity: entity.name.to_string(),
        });
    }
    Ok(data)
}

/// Validate the three parts of an upsert independently. An empty update
/// payload is allowed: the existing row is returned unchanged.
pub fn validate_upsert(
    entity: &EntityDescriptor,
    where_unique: &JsonValue,
    create: &JsonValue,
    update: &JsonValue,
) -> Result<(Identity, CreateData, UpdateData), ValidationError> {
    let identity = validate_identity(entity, where_unique)?;
    let create = validate_create(entity, create)?;
    let update = update_fields(entity, update)?;
    Ok((identity, create, update))
}

/// Validate a where-unique address: exactly the identity fields, exactly one
/// unique field, or the compound identity key (`MonitorId_Preset`) wrapping
/// the identity fields.
pub fn validate_identity(
    entity: &EntityDescriptor,
    raw: &JsonValue,
) -> Result<Identity, ValidationError> {
    let incomplete = |reason: String| ValidationError::IdentityIncomplete {
        entity: entity.name.to_string(),
        reason,
    };

    let obj = raw
        .as_object()
        .ok_or_else(|| incomplete(format!("expected an object, got {}", raw)))?;
    let compound = entity.identity.join("_");
    let obj = match (obj.len(), obj.get(&compound)) {
        (1, Some(JsonValue::Object(inner))) if entity.identity.len() > 1 => inner,
        _ => obj,
    };

    let mut pairs = BTreeMap::new();
    for (name, value) in obj {
        let def = known_field(entity, name)?;
        if value.is_null() {
            return Err(incomplete(format!("{} is null", name)));
        }
        pairs.insert(def.name.to_string(), coerce(def, value)?);
    }

    let keys: BTreeSet<&str> = pairs.keys().map(String::as_str).collect();
    let addresses_row = entity.unique_keys().iter().any(|key| {
        key.len() == keys.len() && key.iter().all(|f| keys.contains(f))
    });
    if !addresses_row {
        let expected: Vec<String> = entity
            .unique_keys()
            .iter()
            .map(|k| format!("({})", k.join(", ")))
            .collect();
        return Err(incomplete(format!(
            "expected one of {}, got ({})",
            expected.join(" or "),
            keys.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }
    Ok(Identity::from_pairs(pairs))
}

fn update_fields(entity: &EntityDescriptor, raw: &JsonValue) -> Result<UpdateData, ValidationError> {
    let obj = object(raw, "data")?;
    let mut updates = BTreeMap::new();
    for (name, value) in obj {
        let def = known_field(entity, name)?;
        let update = match value {
            JsonValue::Object(ops) => field_operation(def, ops)?,
            bare => FieldUpdate::Set(coerce(def, bare)?),
        };
        updates.insert(def.name.to_string(), update);
    }
    Ok(UpdateData(updates))
}

fn field_operation(
    def: &FieldDef,
    ops: &Map<String, JsonValue>,
) -> Result<FieldUpdate, ValidationError> {
    let invalid = |operation: &str, reason: &str| ValidationError::InvalidFieldOperation {
        field: def.name.to_string(),
        operation: operation.to_string(),
        reason: reason.to_string(),
    };

    let mut entries = ops.iter();
    let (op, raw) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        _ => return Err(invalid("update", "expected exactly one operator")),
    };

    if op == "set" {
        return Ok(FieldUpdate::Set(coerce(def, raw)?));
    }
    if !matches!(op.as_str(), "increment" | "decrement" | "multiply" | "divide") {
        return Err(invalid(op, "unknown operator"));
    }
    if !def.kind.is_numeric() {
        return Err(invalid(op, &format!("not supported on {} fields", def.kind.name())));
    }
    if raw.is_null() {
        return Err(ValidationError::TypeMismatch {
            field: def.name.to_string(),
            expected: def.kind.to_string(),
            actual: "null".to_string(),
        });
    }
    let operand = coerce(def, raw)?;

    Ok(match op.as_str() {
        "increment" => FieldUpdate::Increment(operand),
        "decrement" => FieldUpdate::Decrement(operand),
        "multiply" => FieldUpdate::Multiply(operand),
        _ => {
            if is_zero(&operand) {
                return Err(invalid(op, "division by zero"));
            }
            FieldUpdate::Divide(operand)
        }
    })
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Int(i) => *i == 0,
        Value::BigInt(i) => *i == 0,
        Value::Float(f) => *f == 0.0,
        Value::Decimal(d) => d.is_zero(),
        _ => false,
    }
}

fn object<'a>(raw: &'a JsonValue, what: &str) -> Result<&'a Map<String, JsonValue>, ValidationError> {
    raw.as_object().ok_or_else(|| {
        ValidationError::arguments(format!("{} must be an object, got {}", what, raw))
    })
}

fn known_field<'a>(entity: &'a EntityDescriptor, name: &str) -> Result<&'a FieldDef, ValidationError> {
    entity.field(name).ok_or_else(|| ValidationError::UnknownField {
        entity: entity.name.to_string(),
        field: name.to_string(),
    })
}

/// Coerce a payload value; null only on nullable fields
fn coerce(def: &FieldDef, raw: &JsonValue) -> Result<Value, ValidationError> {
    if raw.is_null() && !def.nullable {
        return Err(ValidationError::TypeMismatch {
            field: def.name.to_string(),
            expected: def.kind.to_string(),
            actual: "null".to_string(),
        });
    }
    Value::coerce(def.kind, raw).map_err(|m| ValidationError::TypeMismatch {
        field: def.name.to_string(),
        expected: m.expected,
        actual: m.actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::zoneminder;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn entity(name: &str) -> Arc<EntityDescriptor> {
        zoneminder::registry().unwrap().describe(name).unwrap().clone()
    }

    #[test]
    fn test_create_requires_fields() {
        let config = entity("Config");
        let err = validate_create(&config, &json!({"Name": "X", "Value": "1", "Type": "string"}))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingRequiredField {
                field: "Category".to_string()
            }
        );

        let data = validate_create(
            &config,
            &json!({"Name": "X", "Value": "1", "Type": "string", "Category": "c"}),
        )
        .unwrap();
        assert_eq!(data.record().len(), 4);
        assert_eq!(data.pending_sequences(&config).collect::<Vec<_>>(), vec!["Id"]);
    }

    #[test]
    fn test_create_rejects_null_and_unknown() {
        let config = entity("Config");
        assert_matches!(
            validate_create(&config, &json!({"Name": null})),
            Err(ValidationError::TypeMismatch { field, .. }) if field == "Name"
        );
        assert_matches!(
            validate_create(&config, &json!({"Colour": "red"})),
            Err(ValidationError::UnknownField { field, .. }) if field == "Colour"
        );
    }

    #[test]
    fn test_bigint_payloads() {
        let events = entity("Events");
        let data = validate_create(
            &events,
            &json!({"MonitorId": 1, "StateId": 1, "DiskSpace": "9007199254740993"}),
        )
        .unwrap();
        assert_eq!(
            data.record().get("DiskSpace"),
            Some(&Value::BigInt(9_007_199_254_740_993))
        );

        assert_matches!(
            validate_create(&events, &json!({"MonitorId": 1, "StateId": 1, "DiskSpace": 1e17})),
            Err(ValidationError::TypeMismatch { field, .. }) if field == "DiskSpace"
        );
    }

    #[test]
    fn test_update_operations() {
        let events = entity("Events");
        let data = validate_update(
            &events,
            &json!({"Frames": {"increment": 1}, "Notes": "reviewed", "Length": {"divide": "2.5"}}),
        )
        .unwrap();
        assert_eq!(data.0.len(), 3);

        assert_matches!(
            validate_update(&events, &json!({})),
            Err(ValidationError::EmptyUpdate { .. })
        );
        assert_matches!(
            validate_update(&events, &json!({"Name": {"increment": 1}})),
            Err(ValidationError::InvalidFieldOperation { .. })
        );
        assert_matches!(
            validate_update(&events, &json!({"Frames": {"divide": 0}})),
            Err(ValidationError::InvalidFieldOperation { reason, .. }) if reason == "division by zero"
        );
        assert_matches!(
            validate_update(&events, &json!({"Frames": {"set": 1, "increment": 2}})),
            Err(ValidationError::InvalidFieldOperation { .. })
        );
    }

    #[test]
    fn test_identity_forms() {
        let config = entity("Config");
        assert!(validate_identity(&config, &json!({"Name": "ZM_LANG"})).is_ok());
        // Id is an alternative unique key
        assert!(validate_identity(&config, &json!({"Id": 4})).is_ok());
        assert_matches!(
            validate_identity(&config, &json!({"Value": "x"})),
            Err(ValidationError::IdentityIncomplete { .. })
        );
        assert_matches!(
            validate_identity(&config, &json!({"Name": null})),
            Err(ValidationError::IdentityIncomplete { .. })
        );

        let presets = entity("ControlPresets");
        assert_matches!(
            validate_identity(&presets, &json!({"MonitorId": 1})),
            Err(ValidationError::IdentityIncomplete { .. })
        );
        let flat = validate_identity(&presets, &json!({"MonitorId": 1, "Preset": 2})).unwrap();
        let compound =
            validate_identity(&presets, &json!({"MonitorId_Preset": {"MonitorId": 1, "Preset": 2}}))
                .unwrap();
        assert_eq!(flat, compound);
    }

    #[test]
    fn test_upsert_parts_validated_independently() {
        let config = entity("Config");
        let (_, _, update) = validate_upsert(
            &config,
            &json!({"Name": "X"}),
            &json!({"Name": "X", "Value": "1", "Type": "string", "Category": "c"}),
            &json!({}),
        )
        .unwrap();
        assert!(update.is_empty());

        assert_matches!(
            validate_upsert(&config, &json!({"Name": "X"}), &json!({"Name": "X"}), &json!({})),
            Err(ValidationError::MissingRequiredField { .. })
        );
    }
}
