//! `where` validation
//!
//! Turns a Prisma-style JSON filter into a [`FilterNode`] checked against an
//! entity descriptor:
//!
//! ```json
//! { "Readonly": { "gt": 0 }, "OR": [{ "Name": "ZM_LANG" }, { "Category": { "in": ["system"] } }] }
//! ```

use serde_json::{Map, Value as JsonValue};

use super::{CaseMode, Condition, FilterNode, FilterOp, Predicate, TextMatch};
use crate::error::ValidationError;
use crate::schema::{EntityDescriptor, FieldDef};
use crate::value::Value;

/// Validate a raw `where` object against `entity`.
///
/// `null` means no filter. Composite nesting deeper than `max_depth` is
/// rejected.
pub fn validate_filter(
    entity: &EntityDescriptor,
    raw: &JsonValue,
    max_depth: usize,
) -> Result<FilterNode, ValidationError> {
    if raw.is_null() {
        return Ok(FilterNode::always());
    }
    parse_object(entity, raw, 0, max_depth)
}

fn parse_object(
    entity: &EntityDescriptor,
    raw: &JsonValue,
    depth: usize,
    max_depth: usize,
) -> Result<FilterNode, ValidationError> {
    let obj = raw.as_object().ok_or_else(|| ValidationError::InvalidFilter {
        field: "where".to_string(),
        operator: "-".to_string(),
        reason: "expected an object".to_string(),
    })?;

    let mut conjuncts = Vec::with_capacity(obj.len());
    for (key, value) in obj {
        let node = match key.as_str() {
            "AND" | "OR" | "NOT" => {
                if depth + 1 > max_depth {
                    return Err(ValidationError::InvalidFilter {
                        field: key.clone(),
                        operator: key.clone(),
                        reason: format!("nesting deeper than {}", max_depth),
                    });
                }
                let children = parse_children(entity, key, value, depth + 1, max_depth)?;
                match key.as_str() {
                    "AND" => Predicate::And(children),
                    "OR" => Predicate::Or(children),
                    _ => Predicate::Not(children),
                }
            }
            field => {
                let def = entity.field(field).ok_or_else(|| ValidationError::InvalidFilter {
                    field: field.to_string(),
                    operator: "-".to_string(),
                    reason: "unknown field".to_string(),
                })?;
                parse_field(def, value, depth, max_depth)?
            }
        };
        conjuncts.push(node);
    }
    Ok(Predicate::conjunction(conjuncts))
}

fn parse_children(
    entity: &EntityDescriptor,
    key: &str,
    value: &JsonValue,
    depth: usize,
    max_depth: usize,
) -> Result<Vec<FilterNode>, ValidationError> {
    match value {
        JsonValue::Array(items) => items
            .iter()
            .map(|item| parse_object(entity, item, depth, max_depth))
            .collect(),
        JsonValue::Object(_) => Ok(vec![parse_object(entity, value, depth, max_depth)?]),
        other => Err(ValidationError::InvalidFilter {
            field: key.to_string(),
            operator: key.to_string(),
            reason: format!("expected an object or a list, got {}", json_kind(other)),
        }),
    }
}

/// A field entry: a bare value (equals shorthand) or an operator object
pub(super) fn parse_field(
    def: &FieldDef,
    value: &JsonValue,
    depth: usize,
    max_depth: usize,
) -> Result<FilterNode, ValidationError> {
    match value {
        JsonValue::Object(ops) => parse_operators(def, ops, depth, max_depth),
        bare => Ok(leaf(def, FilterOp::Equals(operand(def, "equals", bare, true)?))),
    }
}

fn parse_operators(
    def: &FieldDef,
    ops: &Map<String, JsonValue>,
    depth: usize,
    max_depth: usize,
) -> Result<FilterNode, ValidationError> {
    let mode = match ops.get("mode") {
        None => CaseMode::Default,
        Some(raw) => parse_mode(def, raw)?,
    };
    if mode == CaseMode::Insensitive
        && !ops
            .keys()
            .any(|k| matches!(k.as_str(), "contains" | "startsWith" | "endsWith"))
    {
        return Err(invalid(def, "mode", "requires contains, startsWith or endsWith"));
    }

    let mut conjuncts = Vec::with_capacity(ops.len());
    for (op, raw) in ops {
        let node = match op.as_str() {
            "mode" => continue,
            "equals" => leaf(def, FilterOp::Equals(operand(def, op, raw, true)?)),
            "not" => {
                if depth + 1 > max_depth {
                    return Err(invalid(def, op, &format!("nesting deeper than {}", max_depth)));
                }
                let inner = match raw {
                    JsonValue::Object(nested) => parse_operators(def, nested, depth + 1, max_depth)?,
                    bare => leaf(def, FilterOp::Equals(operand(def, op, bare, true)?)),
                };
                Predicate::Not(vec![inner])
            }
            "in" => leaf(def, FilterOp::In(operand_list(def, op, raw)?)),
            "notIn" => leaf(def, FilterOp::NotIn(operand_list(def, op, raw)?)),
            "lt" | "lte" | "gt" | "gte" => {
                if !def.kind.is_ordered() {
                    return Err(invalid(def, op, &format!("not supported on {} fields", def.kind.name())));
                }
                let v = operand(def, op, raw, false)?;
                leaf(
                    def,
                    match op.as_str() {
                        "lt" => FilterOp::Lt(v),
                        "lte" => FilterOp::Lte(v),
                        "gt" => FilterOp::Gt(v),
                        _ => FilterOp::Gte(v),
                    },
                )
            }
            "contains" | "startsWith" | "endsWith" => {
                if !def.kind.is_text() {
                    return Err(invalid(def, op, &format!("not supported on {} fields", def.kind.name())));
                }
                let pattern = match operand(def, op, raw, false)? {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                let m = TextMatch { pattern, mode };
                leaf(
                    def,
                    match op.as_str() {
                        "contains" => FilterOp::Contains(m),
                        "startsWith" => FilterOp::StartsWith(m),
                        _ => FilterOp::EndsWith(m),
                    },
                )
            }
            unknown => return Err(invalid(def, unknown, "unknown operator")),
        };
        conjuncts.push(node);
    }
    Ok(Predicate::conjunction(conjuncts))
}

fn parse_mode(def: &FieldDef, raw: &JsonValue) -> Result<CaseMode, ValidationError> {
    if !def.kind.is_text() {
        return Err(invalid(def, "mode", &format!("not supported on {} fields", def.kind.name())));
    }
    match raw.as_str() {
        Some("default") => Ok(CaseMode::Default),
        Some("insensitive") => Ok(CaseMode::Insensitive),
        _ => Err(invalid(def, "mode", "expected \"default\" or \"insensitive\"")),
    }
}

/// Coerce one operand; `null` is only accepted where `allow_null` and the
/// field is nullable.
fn operand(
    def: &FieldDef,
    op: &str,
    raw: &JsonValue,
    allow_null: bool,
) -> Result<Value, ValidationError> {
    if raw.is_null() {
        if allow_null && def.nullable {
            return Ok(Value::Null);
        }
        return Err(ValidationError::TypeMismatch {
            field: def.name.to_string(),
            expected: def.kind.to_string(),
            actual: format!("null (in {})", op),
        });
    }
    Value::coerce(def.kind, raw).map_err(|m| ValidationError::TypeMismatch {
        field: def.name.to_string(),
        expected: m.expected,
        actual: m.actual,
    })
}

fn operand_list(def: &FieldDef, op: &str, raw: &JsonValue) -> Result<Vec<Value>, ValidationError> {
    let items = raw.as_array().ok_or_else(|| ValidationError::TypeMismatch {
        field: def.name.to_string(),
        expected: format!("list of {}", def.kind),
        actual: json_kind(raw).to_string(),
    })?;
    items.iter().map(|item| operand(def, op, item, false)).collect()
}

fn leaf(def: &FieldDef, op: FilterOp) -> FilterNode {
    Predicate::Leaf(Condition::new(def.name, op))
}

fn invalid(def: &FieldDef, operator: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidFilter {
        field: def.name.to_string(),
        operator: operator.to_string(),
        reason: reason.to_string(),
    }
}

pub(crate) fn json_kind(raw: &JsonValue) -> &'static str {
    match raw {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "object",
    }
}
