//! aggregate / groupBy arguments

use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::{Selection, Selector};
use crate::error::ValidationError;
use crate::filters::{FilterNode, HavingNode, validate_filter, validate_having};
use crate::query::{
    FindManyArgs, OrderTerm, QueryArgs, QueryLimits, QueryPlan, parse_order_by, plan_window,
};
use crate::schema::EntityDescriptor;

/// Raw arguments of `aggregate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AggregateArgs {
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
    #[serde(rename = "_count", default)]
    pub count: Option<JsonValue>,
    #[serde(rename = "_avg", default)]
    pub avg: Option<JsonValue>,
    #[serde(rename = "_sum", default)]
    pub sum: Option<JsonValue>,
    #[serde(rename = "_min", default)]
    pub min: Option<JsonValue>,
    #[serde(rename = "_max", default)]
    pub max: Option<JsonValue>,
}

/// Validated `aggregate`: a row window and the aggregates to reduce it to.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateQuery {
    pub plan: QueryPlan,
    pub selection: Selection,
}

impl AggregateArgs {
    pub fn validate(
        &self,
        entity: &EntityDescriptor,
        limits: &QueryLimits,
    ) -> Result<AggregateQuery, ValidationError> {
        let window = FindManyArgs {
            filter: self.filter.clone(),
            order_by: self.order_by.clone(),
            cursor: self.cursor.clone(),
            take: self.take,
            skip: self.skip,
            distinct: None,
        };
        let args = QueryArgs::validate(entity, &window, limits)?;
        let plan = plan_window(entity, args, limits)?;
        let selection = Selection::parse(
            entity,
            &selectors(&self.count, &self.avg, &self.sum, &self.min, &self.max),
        )?;
        Ok(AggregateQuery { plan, selection })
    }
}

/// Raw arguments of `groupBy`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GroupByArgs {
    pub by: Vec<String>,
    #[serde(rename = "where", default)]
    pub filter: Option<JsonValue>,
    #[serde(default)]
    pub having: Option<JsonValue>,
    #[serde(default)]
    pub order_by: Option<JsonValue>,
    #[serde(default)]
    pub take: Option<i64>,
    #[serde(default)]
    pub skip: Option<i64>,
    #[serde(rename = "_count", default)]
    pub count: Option<JsonValue>,
    #[serde(rename = "_avg", default)]
    pub avg: Option<JsonValue>,
    #[serde(rename = "_sum", default)]
    pub sum: Option<JsonValue>,
    #[serde(rename = "_min", default)]
    pub min: Option<JsonValue>,
    #[serde(rename = "_max", default)]
    pub max: Option<JsonValue>,
}

/// Validated `groupBy`.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupByQuery {
    pub by: Vec<String>,
    pub filter: FilterNode,
    pub having: HavingNode,
    /// Requested terms over `by` fields, then the remaining `by` fields ascending
    pub order: Vec<OrderTerm>,
    pub skip: u64,
    pub take: Option<u64>,
    pub selection: Selection,
}

impl GroupByArgs {
    pub fn validate(
        &self,
        entity: &EntityDescriptor,
        limits: &QueryLimits,
    ) -> Result<GroupByQuery, ValidationError> {
        if self.by.is_empty() {
            return Err(ValidationError::arguments("groupBy requires at least one by field"));
        }
        let mut by = Vec::with_capacity(self.by.len());
        for field in &self.by {
            if entity.field(field).is_none() {
                return Err(ValidationError::UnknownField {
                    entity: entity.name.to_string(),
                    field: field.clone(),
                });
            }
            if !by.contains(field) {
                by.push(field.clone());
            }
        }

        let filter = validate_filter(
            entity,
            self.filter.as_ref().unwrap_or(&JsonValue::Null),
            limits.max_filter_depth,
        )?;
        let having = validate_having(
            entity,
            &by,
            self.having.as_ref().unwrap_or(&JsonValue::Null),
            limits.max_filter_depth,
        )?;

        let mut order = parse_order_by(entity, self.order_by.as_ref())?;
        if let Some(term) = order.iter().find(|t| !by.contains(&t.field)) {
            return Err(ValidationError::InvalidOrderBy {
                field: term.field.clone(),
                reason: "groupBy can only order by its by fields".to_string(),
            });
        }
        if order.is_empty() && (self.take.is_some() || self.skip.is_some()) {
            return Err(ValidationError::pagination(
                "groupBy take/skip require an orderBy over the by fields",
            ));
        }
        for field in &by {
            if !order.iter().any(|t| &t.field == field) {
                order.push(OrderTerm::asc(field.clone()));
            }
        }

        let skip = match self.skip {
            None => 0,
            Some(s) if s < 0 => return Err(ValidationError::pagination("skip must not be negative")),
            Some(s) if s.unsigned_abs() > limits.max_skip => {
                return Err(ValidationError::pagination(format!(
                    "skip {} exceeds the maximum of {}",
                    s, limits.max_skip
                )));
            }
            Some(s) => s.unsigned_abs(),
        };
        let take = match self.take {
            None => None,
            Some(t) if t < 0 => {
                return Err(ValidationError::pagination("groupBy does not support negative take"));
            }
            Some(t) if t.unsigned_abs() > limits.max_page_size => {
                return Err(ValidationError::pagination(format!(
                    "take {} exceeds the maximum page size of {}",
                    t, limits.max_page_size
                )));
            }
            Some(t) => Some(t.unsigned_abs()),
        };

        let selection = Selection::parse(
            entity,
            &selectors(&self.count, &self.avg, &self.sum, &self.min, &self.max),
        )?;

        Ok(GroupByQuery {
            by,
            filter,
            having,
            order,
            skip,
            take,
            selection,
        })
    }
}

fn selectors<'a>(
    count: &'a Option<JsonValue>,
    avg: &'a Option<JsonValue>,
    sum: &'a Option<JsonValue>,
    min: &'a Option<JsonValue>,
    max: &'a Option<JsonValue>,
) -> Vec<(Selector, &'a JsonValue)> {
    [
        (Selector::Count, count),
        (Selector::Avg, avg),
        (Selector::Sum, sum),
        (Selector::Min, min),
        (Selector::Max, max),
    ]
    .into_iter()
    .filter_map(|(s, v)| v.as_ref().map(|v| (s, v)))
    .collect()
}
