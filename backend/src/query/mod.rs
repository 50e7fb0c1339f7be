//! Query arguments
//!
//! Raw read arguments as they arrive ([`FindManyArgs`]), their validated form
//! ([`QueryArgs`]) and the planner that normalizes them into a
//! [`QueryPlan`] a backend can execute without further checks.

pub mod planner;
pub mod window;

pub use planner::{Page, QueryLimits, QueryPlan, ScanDirection, plan_find, plan_window};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::ValidationError;
use crate::filters::{FilterNode, validate_filter};
use crate::mutation::validate_identity;
use crate::record::Identity;
use crate::schema::EntityDescriptor;

/// Raw arguments of findMany / findFirst / count.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FindManyArgs {
    #[serde(rename = "where", default)]
    pub filter: Option<JsonValue>,
    #[serde(default)]
    pub order_by: Option<JsonValue>,
    #[serde(default)]
    pub cursor: Option<JsonValue>,
    #[serde(default)]
    pub take: Option<i64>,
    #[serde(default)]
    pub skip: Option<i64>,
    #[serde(default)]
    pub distinct: Option<Vec<String>>,
}

/// Sort direction for ORDER BY clauses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    /// Ascending order, nulls first
    #[default]
    Asc,
    /// Descending order, nulls last
    Desc,
}

impl OrderDirection {
    /// Convert to SQL order string
    pub fn to_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            OrderDirection::Asc => OrderDirection::Desc,
            OrderDirection::Desc => OrderDirection::Asc,
        }
    }
}

/// One `orderBy` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderTerm {
    pub field: String,
    pub direction: OrderDirection,
}

impl OrderTerm {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// Read arguments checked against an entity, not yet normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryArgs {
    pub filter: FilterNode,
    pub order: Vec<OrderTerm>,
    pub cursor: Option<Identity>,
    pub take: Option<i64>,
    pub skip: Option<i64>,
    pub distinct: Vec<String>,
}

impl QueryArgs {
    pub fn validate(
        entity: &EntityDescriptor,
        raw: &FindManyArgs,
        limits: &QueryLimits,
    ) -> Result<Self, ValidationError> {
        let filter = validate_filter(
            entity,
            raw.filter.as_ref().unwrap_or(&JsonValue::Null),
            limits.max_filter_depth,
        )?;
        let order = parse_order_by(entity, raw.order_by.as_ref())?;
        let cursor = raw
            .cursor
            .as_ref()
            .map(|c| validate_identity(entity, c))
            .transpose()?;

        let mut distinct = Vec::new();
        for field in raw.distinct.iter().flatten() {
            if entity.field(field).is_none() {
                return Err(ValidationError::UnknownField {
                    entity: entity.name.to_string(),
                    field: field.clone(),
                });
            }
            if !distinct.contains(field) {
                distinct.push(field.clone());
            }
        }

        Ok(Self {
            filter,
            order,
            cursor,
            take: raw.take,
            skip: raw.skip,
            distinct,
        })
    }
}

/// Parse `orderBy`: one `{field: "asc"|"desc"}` object or a list of them.
pub fn parse_order_by(
    entity: &EntityDescriptor,
    raw: Option<&JsonValue>,
) -> Result<Vec<OrderTerm>, ValidationError> {
    let entries: Vec<&JsonValue> = match raw {
        None | Some(JsonValue::Null) => return Ok(Vec::new()),
        Some(JsonValue::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    };

    let mut terms = Vec::with_capacity(entries.len());
    let mut seen = HashSet::new();
    for entry in entries {
        let obj = entry.as_object().ok_or_else(|| ValidationError::InvalidOrderBy {
            field: entry.to_string(),
            reason: "expected an object".to_string(),
        })?;
        for (field, direction) in obj {
            if entity.field(field).is_none() {
                return Err(ValidationError::InvalidOrderBy {
                    field: field.clone(),
                    reason: "unknown field".to_string(),
                });
            }
            let direction = match direction.as_str() {
                Some("asc") => OrderDirection::Asc,
                Some("desc") => OrderDirection::Desc,
                _ => {
                    return Err(ValidationError::InvalidOrderBy {
                        field: field.clone(),
                        reason: format!("expected \"asc\" or \"desc\", got {}", direction),
                    });
                }
            };
            if !seen.insert(field.clone()) {
                return Err(ValidationError::InvalidOrderBy {
                    field: field.clone(),
                    reason: "listed twice".to_string(),
                });
            }
            terms.push(OrderTerm {
                field: field.clone(),
                direction,
            });
        }
    }
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::zoneminder;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn monitors() -> std::sync::Arc<EntityDescriptor> {
        zoneminder::registry()
            .unwrap()
            .describe("Monitors")
            .unwrap()
            .clone()
    }

    #[test]
    fn test_order_by_forms() {
        let entity = monitors();
        assert_eq!(
            parse_order_by(&entity, Some(&json!({"Name": "desc"}))).unwrap(),
            vec![OrderTerm::desc("Name")]
        );
        assert_eq!(
            parse_order_by(&entity, Some(&json!([{"Sequence": "asc"}, {"Id": "desc"}]))).unwrap(),
            vec![OrderTerm::asc("Sequence"), OrderTerm::desc("Id")]
        );
        assert_matches!(
            parse_order_by(&entity, Some(&json!({"Nope": "asc"}))),
            Err(ValidationError::InvalidOrderBy { .. })
        );
        assert_matches!(
            parse_order_by(&entity, Some(&json!({"Name": "up"}))),
            Err(ValidationError::InvalidOrderBy { .. })
        );
        assert_matches!(
            parse_order_by(&entity, Some(&json!([{"Name": "asc"}, {"Name": "desc"}]))),
            Err(ValidationError::InvalidOrderBy { .. })
        );
    }

    #[test]
    fn test_args_deserialize() {
        let raw: FindManyArgs = serde_json::from_value(json!({
            "where": {"Enabled": 1},
            "orderBy": {"Name": "asc"},
            "take": -2,
            "distinct": ["Function"]
        }))
        .unwrap();
        let args = QueryArgs::validate(&monitors(), &raw, &QueryLimits::default()).unwrap();
        assert_eq!(args.take, Some(-2));
        assert_eq!(args.distinct, vec!["Function".to_string()]);

        let err = serde_json::from_value::<FindManyArgs>(json!({"limit": 3}));
        assert!(err.is_err());
    }

    #[test]
    fn test_cursor_must_be_unique() {
        let raw: FindManyArgs = serde_json::from_value(json!({"cursor": {"Name": "x"}})).unwrap();
        assert_matches!(
            QueryArgs::validate(&monitors(), &raw, &QueryLimits::default()),
            Err(ValidationError::IdentityIncomplete { .. })
        );
    }
}
