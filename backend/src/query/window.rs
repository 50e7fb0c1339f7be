//! In-memory windowing
//!
//! Applies the ordering, cursor, distinct and page parts of a [`QueryPlan`]
//! to rows that already passed the filter. The memory backend runs every
//! read through here; the SQLite backend uses it to finish `distinct` reads.

use std::cmp::Ordering;
use std::collections::HashSet;

use super::{OrderDirection, OrderTerm, QueryPlan, ScanDirection};
use crate::record::Record;
use crate::value::Value;

/// Compare two records under `order` (nulls first ascending, last descending)
pub fn compare(order: &[OrderTerm], a: &Record, b: &Record) -> Ordering {
    for term in order {
        let ord = a.value(&term.field).sort_cmp(b.value(&term.field));
        let ord = match term.direction {
            OrderDirection::Asc => ord,
            OrderDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

pub fn sort(order: &[OrderTerm], rows: &mut [Record]) {
    rows.sort_by(|a, b| compare(order, a, b));
}

/// Apply cursor, distinct and page to rows sorted in plan order
pub fn apply(plan: &QueryPlan, mut rows: Vec<Record>) -> Vec<Record> {
    let backward = plan.page.direction == ScanDirection::Backward;

    if let Some(cursor) = &plan.cursor {
        match rows.iter().position(|r| cursor.matches(r)) {
            None => return Vec::new(),
            Some(pos) if backward => rows.truncate(pos + 1),
            Some(pos) => {
                rows.drain(..pos);
            }
        }
    }

    if backward {
        rows.reverse();
    }
    let mut rows = paginate(plan, rows);
    if backward {
        rows.reverse();
    }
    rows
}

/// Distinct, skip and take over rows already in scan order
pub fn paginate(plan: &QueryPlan, rows: Vec<Record>) -> Vec<Record> {
    let skip = usize::try_from(plan.page.skip).unwrap_or(usize::MAX);
    let take = plan
        .page
        .take
        .map(|t| usize::try_from(t).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);

    let mut seen: HashSet<String> = HashSet::new();
    rows.into_iter()
        .filter(|row| {
            if plan.distinct.is_empty() {
                return true;
            }
            seen.insert(distinct_key(row, &plan.distinct))
        })
        .skip(skip)
        .take(take)
        .collect()
}

fn distinct_key(row: &Record, fields: &[String]) -> String {
    let values: Vec<&Value> = fields.iter().map(|f| row.value(f)).collect();
    serde_json::to_string(&values).unwrap_or_default()
}
