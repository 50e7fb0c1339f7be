//! `having` clauses for groupBy
//!
//! A having tree filters groups rather than rows. Each leaf either tests a
//! grouped (`by`) field of the group key, or an aggregate of one field over
//! the group's rows:
//!
//! ```json
//! { "MonitorId": { "in": [1, 2] }, "DiskSpace": { "_sum": { "gt": 1000000 } } }
//! ```

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use super::validate::{json_kind, parse_field};
use super::{Condition, FilterOp, Predicate};
use crate::aggregate::{AggregateValues, Selector};
use crate::error::ValidationError;
use crate::record::Record;
use crate::schema::{EntityDescriptor, FieldDef};

/// Leaf of a having tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HavingCondition {
    /// Condition on a grouped field
    Field(Condition),
    /// Condition on an aggregate over the group
    Aggregate {
        selector: Selector,
        field: String,
        op: FilterOp,
    },
}

pub type HavingNode = Predicate<HavingCondition>;

impl HavingNode {
    /// Test one group. `aggregates` must hold every aggregate the tree
    /// references (see [`HavingNode::required`]).
    pub fn matches(&self, key: &Record, aggregates: &AggregateValues) -> bool {
        self.eval(&|leaf: &HavingCondition| match leaf {
            HavingCondition::Field(c) => c.matches(key),
            HavingCondition::Aggregate {
                selector,
                field,
                op,
            } => op.test(aggregates.value(*selector, field)),
        })
    }

    /// Aggregates referenced by the tree
    pub fn required(&self) -> Vec<(Selector, String)> {
        let mut out = Vec::new();
        for leaf in self.leaves() {
            if let HavingCondition::Aggregate {
                selector, field, ..
            } = leaf
            {
                let entry = (*selector, field.clone());
                if !out.contains(&entry) {
                    out.push(entry);
                }
            }
        }
        out
    }
}

/// Validate a raw `having` object. Plain conditions are only allowed on the
/// `by` fields; aggregate conditions may name any field the selector supports.
pub fn validate_having(
    entity: &EntityDescriptor,
    by: &[String],
    raw: &JsonValue,
    max_depth: usize,
) -> Result<HavingNode, ValidationError> {
    if raw.is_null() {
        return Ok(HavingNode::always());
    }
    parse_object(entity, by, raw, 0, max_depth)
}

fn parse_object(
    entity: &EntityDescriptor,
    by: &[String],
    raw: &JsonValue,
    depth: usize,
    max_depth: usize,
) -> Result<HavingNode, ValidationError> {
    let obj = raw.as_object().ok_or_else(|| ValidationError::InvalidFilter {
        field: "having".to_string(),
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
                let children = match value {
                    JsonValue::Array(items) => items
                        .iter()
                        .map(|item| parse_object(entity, by, item, depth + 1, max_depth))
                        .collect::<Result<Vec<_>, _>>()?,
                    JsonValue::Object(_) => {
                        vec![parse_object(entity, by, value, depth + 1, max_depth)?]
                    }
                    other => {
                        return Err(ValidationError::InvalidFilter {
                            field: key.clone(),
                            operator: key.clone(),
                            reason: format!("expected an object or a list, got {}", json_kind(other)),
                        });
                    }
                };
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
                parse_field_entry(def, by, value, depth, max_depth)?
            }
        };
        conjuncts.push(node);
    }
    Ok(Predicate::conjunction(conjuncts))
}

fn parse_field_entry(
    def: &FieldDef,
    by: &[String],
    value: &JsonValue,
    depth: usize,
    max_depth: usize,
) -> Result<HavingNode, ValidationError> {
    let mut plain = Map::new();
    let mut conjuncts = Vec::new();

    if let JsonValue::Object(entries) = value {
        for (key, raw) in entries {
            match Selector::parse(key) {
                Some(selector) => {
                    selector.check(def)?;
                    let result = FieldDef::new(def.name, selector.result_kind(def)).nullable();
                    let node = parse_field(&result, raw, depth, max_depth)?;
                    conjuncts.push(node.map(&|c: Condition| HavingCondition::Aggregate {
                        selector,
                        field: c.field,
                        op: c.op,
                    }));
                }
                None => {
                    plain.insert(key.clone(), raw.clone());
                }
            }
        }
    }

    let has_plain = !plain.is_empty() || !value.is_object();
    if has_plain {
        if !by.iter().any(|f| f == def.name) {
            return Err(ValidationError::InvalidFilter {
                field: def.name.to_string(),
                operator: "having".to_string(),
                reason: "field is not in by; use an aggregate".to_string(),
            });
        }
        let raw = if value.is_object() {
            JsonValue::Object(plain)
        } else {
            value.clone()
        };
        let node = parse_field(def, &raw, depth, max_depth)?;
        conjuncts.push(node.map(&HavingCondition::Field));
    }

    Ok(Predicate::conjunction(conjuncts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::zoneminder;
    use crate::value::Value;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn events() -> std::sync::Arc<EntityDescriptor> {
        zoneminder::registry()
            .unwrap()
            .describe("Events")
            .unwrap()
            .clone()
    }

    fn by() -> Vec<String> {
        vec!["MonitorId".to_string()]
    }

    #[test]
    fn test_aggregate_and_plain_conditions() {
        let node = validate_having(
            &events(),
            &by(),
            &json!({"MonitorId": {"in": [1, 2]}, "DiskSpace": {"_sum": {"gt": 10}}}),
            8,
        )
        .unwrap();
        assert_eq!(
            node.required(),
            vec![(Selector::Sum, "DiskSpace".to_string())]
        );
    }

    #[test]
    fn test_plain_condition_requires_by_field() {
        assert_matches!(
            validate_having(&events(), &by(), &json!({"Name": "x"}), 8),
            Err(ValidationError::InvalidFilter { field, .. }) if field == "Name"
        );
    }

    #[test]
    fn test_selector_kind_checked() {
        assert_matches!(
            validate_having(&events(), &by(), &json!({"Name": {"_avg": {"gt": 1}}}), 8),
            Err(ValidationError::InvalidAggregate { .. })
        );
    }

    #[test]
    fn test_matches_group() {
        let node = validate_having(
            &events(),
            &by(),
            &json!({"Id": {"_count": {"gte": 2}}}),
            8,
        )
        .unwrap();

        let key: Record = [("MonitorId", Value::Int(1))].into_iter().collect();
        let mut aggregates = AggregateValues::default();
        aggregates.insert(Selector::Count, "Id", Value::Int(3));
        assert!(node.matches(&key, &aggregates));

        aggregates.insert(Selector::Count, "Id", Value::Int(1));
        assert!(!node.matches(&key, &aggregates));
    }
}
