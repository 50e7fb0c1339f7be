//! Aggregation
//!
//! `aggregate` reduces a window of rows to `_count` / `_avg` / `_sum` /
//! `_min` / `_max` values; `groupBy` partitions the filtered rows by one or
//! more fields, reduces each partition, then filters groups with `having`.
//!
//! Result shapes:
//! - `_count` counts rows (`_all`) or non-null values of a field
//! - `_sum` of `Int`/`BigInt` fields is a `BigInt`; floats and decimals keep
//!   their kind
//! - `_avg` is a `Float`, or a `Decimal` for decimal fields
//! - `_min` / `_max` keep the field's kind
//! - every selector except `_count` is null over an empty input

mod request;

pub use request::{AggregateArgs, AggregateQuery, GroupByArgs, GroupByQuery};

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{BackendError, ValidationError};
use crate::record::Record;
use crate::schema::{EntityDescriptor, FieldDef, ScalarKind};
use crate::value::Value;

/// Pseudo-field counting every row under `_count`.
pub const COUNT_ALL: &str = "_all";

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Selector {
    #[serde(rename = "_count")]
    Count,
    #[serde(rename = "_avg")]
    Avg,
    #[serde(rename = "_sum")]
    Sum,
    #[serde(rename = "_min")]
    Min,
    #[serde(rename = "_max")]
    Max,
}

impl Selector {
    pub const ALL: [Selector; 5] = [
        Selector::Count,
        Selector::Avg,
        Selector::Sum,
        Selector::Min,
        Selector::Max,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Selector::Count => "_count",
            Selector::Avg => "_avg",
            Selector::Sum => "_sum",
            Selector::Min => "_min",
            Selector::Max => "_max",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == key)
    }

    /// Reject selectors the field's kind does not support
    pub fn check(&self, def: &FieldDef) -> Result<(), ValidationError> {
        let supported = match self {
            Selector::Count => true,
            Selector::Avg | Selector::Sum => def.kind.is_numeric(),
            Selector::Min | Selector::Max => def.kind.is_ordered(),
        };
        if supported {
            Ok(())
        } else {
            Err(ValidationError::InvalidAggregate {
                selector: self.key().to_string(),
                field: def.name.to_string(),
                reason: format!("not supported on {} fields", def.kind.name()),
            })
        }
    }

    /// Kind of the value this selector produces for `def`
    pub fn result_kind(&self, def: &FieldDef) -> ScalarKind {
        match (self, def.kind) {
            (Selector::Count, _) => ScalarKind::BigInt,
            (Selector::Avg, ScalarKind::Decimal) => ScalarKind::Decimal,
            (Selector::Avg, _) => ScalarKind::Float,
            (Selector::Sum, ScalarKind::Int | ScalarKind::BigInt) => ScalarKind::BigInt,
            (_, kind) => kind,
        }
    }

    /// Reduce `field` over `rows`
    pub fn compute(&self, field: &str, rows: &[&Record]) -> Result<Value, BackendError> {
        if *self == Selector::Count {
            let n = if field == COUNT_ALL {
                rows.len()
            } else {
                rows.iter().filter(|r| !r.value(field).is_null()).count()
            };
            return Ok(count_value(n as u64));
        }

        let values: Vec<&Value> = rows
            .iter()
            .map(|r| r.value(field))
            .filter(|v| !v.is_null())
            .collect();
        if values.is_empty() {
            return Ok(Value::Null);
        }

        match self {
            Selector::Count => Ok(count_value(values.len() as u64)),
            Selector::Sum => sum(field, &values),
            Selector::Avg => {
                let n = values.len();
                match sum(field, &values)? {
                    Value::Decimal(total) => total
                        .checked_div(Decimal::from(n as u64))
                        .map(Value::Decimal)
                        .ok_or_else(|| BackendError::query(format!("_avg of {} overflowed", field))),
                    total => Ok(total
                        .to_f64()
                        .map(|t| Value::Float(t / n as f64))
                        .unwrap_or(Value::Null)),
                }
            }
            Selector::Min => Ok(extreme(&values, Ordering::Less)),
            Selector::Max => Ok(extreme(&values, Ordering::Greater)),
        }
    }
}

/// Counts are plain JSON numbers whenever they fit an `Int`
fn count_value(n: u64) -> Value {
    match i32::try_from(n) {
        Ok(i) => Value::Int(i),
        Err(_) => Value::BigInt(i64::try_from(n).unwrap_or(i64::MAX)),
    }
}

fn sum(field: &str, values: &[&Value]) -> Result<Value, BackendError> {
    let overflow = || BackendError::query(format!("_sum of {} overflowed", field));
    match values[0] {
        Value::Int(_) | Value::BigInt(_) => {
            let mut total: i64 = 0;
            for v in values {
                let n = v.as_i64().ok_or_else(overflow)?;
                total = total.checked_add(n).ok_or_else(overflow)?;
            }
            Ok(Value::BigInt(total))
        }
        Value::Decimal(_) => {
            let mut total = Decimal::ZERO;
            for v in values {
                if let Value::Decimal(d) = v {
                    total = total.checked_add(*d).ok_or_else(overflow)?;
                }
            }
            Ok(Value::Decimal(total))
        }
        _ => Ok(Value::Float(values.iter().filter_map(|v| v.to_f64()).sum())),
    }
}

fn extreme(values: &[&Value], wanted: Ordering) -> Value {
    let mut best = values[0];
    for v in &values[1..] {
        if v.compare(best) == Some(wanted) {
            best = *v;
        }
    }
    best.clone()
}

// ============================================================================
// Selections and results
// ============================================================================

/// Which fields each selector reduces. `_count` may include [`COUNT_ALL`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Selection(BTreeMap<Selector, Vec<String>>);

impl Selection {
    pub fn add(&mut self, selector: Selector, field: impl Into<String>) {
        let field = field.into();
        let fields = self.0.entry(selector).or_default();
        if !fields.contains(&field) {
            fields.push(field);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Selector, &str)> + '_ {
        self.0
            .iter()
            .flat_map(|(s, fields)| fields.iter().map(move |f| (*s, f.as_str())))
    }

    /// Parse the selector keys (`_count`, `_avg`, ...) of a request
    pub fn parse(
        entity: &EntityDescriptor,
        raw: &[(Selector, &serde_json::Value)],
    ) -> Result<Self, ValidationError> {
        let mut selection = Selection::default();
        for (selector, value) in raw {
            let invalid = |field: &str, reason: &str| ValidationError::InvalidAggregate {
                selector: selector.key().to_string(),
                field: field.to_string(),
                reason: reason.to_string(),
            };
            match value {
                serde_json::Value::Null | serde_json::Value::Bool(false) => {}
                serde_json::Value::Bool(true) if *selector == Selector::Count => {
                    selection.add(Selector::Count, COUNT_ALL);
                }
                serde_json::Value::Object(fields) => {
                    for (field, flag) in fields {
                        match flag {
                            serde_json::Value::Bool(true) => {}
                            serde_json::Value::Bool(false) => continue,
                            _ => return Err(invalid(field, "expected true or false")),
                        }
                        if field == COUNT_ALL && *selector == Selector::Count {
                            selection.add(Selector::Count, COUNT_ALL);
                            continue;
                        }
                        let def = entity.field(field).ok_or_else(|| invalid(field, "unknown field"))?;
                        selector.check(def)?;
                        selection.add(*selector, def.name);
                    }
                }
                _ => return Err(invalid("-", "expected an object of field flags")),
            }
        }
        Ok(selection)
    }
}

/// Reduced values, keyed by selector then field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AggregateValues(BTreeMap<Selector, BTreeMap<String, Value>>);

impl AggregateValues {
    pub fn insert(&mut self, selector: Selector, field: impl Into<String>, value: Value) {
        self.0.entry(selector).or_default().insert(field.into(), value);
    }

    /// Value of one aggregate, null when it was not computed
    pub fn value(&self, selector: Selector, field: &str) -> &Value {
        self.0
            .get(&selector)
            .and_then(|fields| fields.get(field))
            .unwrap_or(&Value::Null)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One groupBy output row: the group key fields next to its aggregates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    #[serde(flatten)]
    pub key: Record,
    #[serde(flatten)]
    pub aggregates: AggregateValues,
}

/// Reduce `rows` (already windowed) for every selected aggregate
pub fn evaluate(selection: &Selection, rows: &[Record]) -> Result<AggregateValues, BackendError> {
    let refs: Vec<&Record> = rows.iter().collect();
    let mut values = AggregateValues::default();
    for (selector, field) in selection.iter() {
        values.insert(selector, field, selector.compute(field, &refs)?);
    }
    Ok(values)
}

/// Partition filtered `rows` by the query's `by` fields, reduce, apply
/// `having`, order and page the groups
pub fn group(query: &GroupByQuery, rows: Vec<Record>) -> Result<Vec<GroupRow>, BackendError> {
    let by: Vec<&str> = query.by.iter().map(String::as_str).collect();

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut partitions: Vec<(Vec<Value>, Vec<Record>)> = Vec::new();
    for row in rows {
        let key = row.project(&by);
        let slot = serde_json::to_string(&key).unwrap_or_default();
        match index.get(&slot) {
            Some(&i) => partitions[i].1.push(row),
            None => {
                index.insert(slot, partitions.len());
                partitions.push((key, vec![row]));
            }
        }
    }

    let required = query.having.required();
    let mut groups = Vec::with_capacity(partitions.len());
    for (key, members) in partitions {
        let refs: Vec<&Record> = members.iter().collect();
        let key: Record = by.iter().copied().zip(key).collect();

        let mut selected = AggregateValues::default();
        for (selector, field) in query.selection.iter() {
            selected.insert(selector, field, selector.compute(field, &refs)?);
        }

        if !query.having.is_always() {
            let mut candidate = selected.clone();
            for (selector, field) in &required {
                candidate.insert(*selector, field.as_str(), selector.compute(field, &refs)?);
            }
            if !query.having.matches(&key, &candidate) {
                continue;
            }
        }

        groups.push(GroupRow {
            key,
            aggregates: selected,
        });
    }

    groups.sort_by(|a, b| crate::query::window::compare(&query.order, &a.key, &b.key));

    let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
    let take = query
        .take
        .map(|t| usize::try_from(t).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);
    Ok(groups.into_iter().skip(skip).take(take).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::zoneminder;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn event(id: i64, monitor: i32, disk: Option<i64>, length: &str) -> Record {
        [
            ("Id", Value::BigInt(id)),
            ("MonitorId", Value::Int(monitor)),
            ("DiskSpace", disk.map(Value::BigInt).unwrap_or(Value::Null)),
            ("Length", Value::Decimal(length.parse().unwrap())),
        ]
        .into_iter()
        .collect()
    }

    fn events() -> Vec<Record> {
        vec![
            event(1, 1, Some(100), "1.5"),
            event(2, 1, None, "2.5"),
            event(3, 2, Some(50), "4.0"),
        ]
    }

    #[test]
    fn test_evaluate_selectors() {
        let entity = zoneminder::registry().unwrap().describe("Events").unwrap().clone();
        let count_all = json!(true);
        let count_fields = json!({"DiskSpace": true});
        let sums = json!({"DiskSpace": true, "Length": true});
        let avg = json!({"Length": true});
        let max = json!({"MonitorId": true});
        let selection = Selection::parse(
            &entity,
            &[
                (Selector::Count, &count_all),
                (Selector::Count, &count_fields),
                (Selector::Sum, &sums),
                (Selector::Avg, &avg),
                (Selector::Max, &max),
            ],
        )
        .unwrap();

        let values = evaluate(&selection, &events()).unwrap();
        assert_eq!(values.value(Selector::Count, COUNT_ALL), &Value::Int(3));
        assert_eq!(values.value(Selector::Count, "DiskSpace"), &Value::Int(2));
        assert_eq!(values.value(Selector::Sum, "DiskSpace"), &Value::BigInt(150));
        assert_eq!(
            values.value(Selector::Sum, "Length"),
            &Value::Decimal("8.0".parse().unwrap())
        );
        assert_eq!(
            values.value(Selector::Avg, "Length"),
            &Value::Decimal("8.0".parse::<Decimal>().unwrap() / Decimal::from(3))
        );
        assert_eq!(values.value(Selector::Max, "MonitorId"), &Value::Int(2));
    }

    #[test]
    fn test_empty_input_is_null_except_count() {
        let mut selection = Selection::default();
        selection.add(Selector::Count, COUNT_ALL);
        selection.add(Selector::Sum, "DiskSpace");
        let values = evaluate(&selection, &[]).unwrap();
        assert_eq!(values.value(Selector::Count, COUNT_ALL), &Value::Int(0));
        assert_eq!(values.value(Selector::Sum, "DiskSpace"), &Value::Null);
    }

    #[test]
    fn test_sum_overflow_is_reported() {
        let rows = vec![event(1, 1, Some(i64::MAX), "0"), event(2, 1, Some(1), "0")];
        let mut selection = Selection::default();
        selection.add(Selector::Sum, "DiskSpace");
        assert!(evaluate(&selection, &rows).is_err());
    }

    #[test]
    fn test_selection_rejects_unsupported() {
        let entity = zoneminder::registry().unwrap().describe("Events").unwrap().clone();
        let avg_name = json!({"Name": true});
        assert!(Selection::parse(&entity, &[(Selector::Avg, &avg_name)]).is_err());
        let min_locked = json!({"Locked": true});
        assert!(Selection::parse(&entity, &[(Selector::Min, &min_locked)]).is_err());
    }

    #[test]
    fn test_group_row_serializes_flat() {
        let mut aggregates = AggregateValues::default();
        aggregates.insert(Selector::Count, COUNT_ALL, Value::Int(2));
        let row = GroupRow {
            key: [("MonitorId", Value::Int(1))].into_iter().collect(),
            aggregates,
        };
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            json!({"MonitorId": 1, "_count": {"_all": 2}})
        );
    }
}
