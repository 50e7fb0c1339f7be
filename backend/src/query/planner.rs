//! Query planner
//!
//! Normalizes validated [`QueryArgs`] into a [`QueryPlan`]:
//! - `take` absent: the default page size for reads, unbounded for counts
//!   and aggregates
//! - negative `take`: the last N rows, read backwards from the cursor (or the
//!   end) and returned in the query's own order
//! - oversized `take` or `skip` is rejected, never truncated
//! - ordering always ends with the identity fields, so every page boundary
//!   is well defined

use serde::Serialize;

use super::{OrderTerm, QueryArgs};
use crate::error::ValidationError;
use crate::filters::FilterNode;
use crate::record::Identity;
use crate::schema::EntityDescriptor;

/// Pagination bounds applied to every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub default_page_size: u64,
    pub max_page_size: u64,
    pub max_skip: u64,
    pub max_filter_depth: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            max_page_size: 1000,
            max_skip: 100_000,
            max_filter_depth: 8,
        }
    }
}

/// Which end of the ordered set a page is read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanDirection {
    #[default]
    Forward,
    Backward,
}

/// Normalized window over the ordered, filtered rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Page {
    pub direction: ScanDirection,
    /// Rows dropped from the scan start (after cursor and distinct)
    pub skip: u64,
    /// `None` is unbounded
    pub take: Option<u64>,
}

/// Executable description of one read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    pub filter: FilterNode,
    /// Total order: requested terms followed by the identity fields
    pub order: Vec<OrderTerm>,
    pub cursor: Option<Identity>,
    pub page: Page,
    pub distinct: Vec<String>,
}

impl QueryPlan {
    /// Plan that scans every row matching `filter`
    pub fn scan(entity: &EntityDescriptor, filter: FilterNode) -> Self {
        Self {
            filter,
            order: canonical_order(entity, Vec::new()),
            cursor: None,
            page: Page::default(),
            distinct: Vec::new(),
        }
    }

    /// True when the plan cannot return any row
    pub fn is_empty_page(&self) -> bool {
        self.page.take == Some(0)
    }
}

/// Plan a record read (findMany, findFirst)
pub fn plan_find(
    entity: &EntityDescriptor,
    args: QueryArgs,
    limits: &QueryLimits,
) -> Result<QueryPlan, ValidationError> {
    plan(entity, args, limits, Some(limits.default_page_size))
}

/// Plan a window for count or aggregate: unbounded unless `take` is given
pub fn plan_window(
    entity: &EntityDescriptor,
    args: QueryArgs,
    limits: &QueryLimits,
) -> Result<QueryPlan, ValidationError> {
    plan(entity, args, limits, None)
}

fn plan(
    entity: &EntityDescriptor,
    args: QueryArgs,
    limits: &QueryLimits,
    default_take: Option<u64>,
) -> Result<QueryPlan, ValidationError> {
    let skip = match args.skip {
        None => 0,
        Some(s) if s < 0 => {
            return Err(ValidationError::pagination(format!(
                "skip must not be negative (got {})",
                s
            )));
        }
        Some(s) => s.unsigned_abs(),
    };
    if skip > limits.max_skip {
        return Err(ValidationError::pagination(format!(
            "skip {} exceeds the maximum of {}",
            skip, limits.max_skip
        )));
    }

    let (direction, take) = match args.take {
        None => (ScanDirection::Forward, default_take),
        Some(0) if args.cursor.is_some() => {
            return Err(ValidationError::pagination(
                "take must not be 0 together with a cursor",
            ));
        }
        Some(t) => {
            if t.unsigned_abs() > limits.max_page_size {
                return Err(ValidationError::pagination(format!(
                    "take {} exceeds the maximum page size of {}",
                    t, limits.max_page_size
                )));
            }
            let direction = if t < 0 {
                ScanDirection::Backward
            } else {
                ScanDirection::Forward
            };
            (direction, Some(t.unsigned_abs()))
        }
    };

    Ok(QueryPlan {
        filter: args.filter,
        order: canonical_order(entity, args.order),
        cursor: args.cursor,
        page: Page {
            direction,
            skip,
            take,
        },
        distinct: args.distinct,
    })
}

/// Append every identity field not already ordered on, ascending
pub fn canonical_order(entity: &EntityDescriptor, mut order: Vec<OrderTerm>) -> Vec<OrderTerm> {
    for field in &entity.identity {
        if !order.iter().any(|t| t.field == *field) {
            order.push(OrderTerm::asc(*field));
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FindManyArgs;
    use crate::schema::zoneminder;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn entity() -> std::sync::Arc<EntityDescriptor> {
        zoneminder::registry()
            .unwrap()
            .describe("ControlPresets")
            .unwrap()
            .clone()
    }

    fn args(raw: serde_json::Value) -> QueryArgs {
        let raw: FindManyArgs = serde_json::from_value(raw).unwrap();
        QueryArgs::validate(&entity(), &raw, &QueryLimits::default()).unwrap()
    }

    #[test]
    fn test_defaults() {
        let limits = QueryLimits::default();
        let plan = plan_find(&entity(), args(json!({})), &limits).unwrap();
        assert_eq!(
            plan.page,
            Page {
                direction: ScanDirection::Forward,
                skip: 0,
                take: Some(100)
            }
        );

        let window = plan_window(&entity(), args(json!({})), &limits).unwrap();
        assert_eq!(window.page.take, None);
    }

    #[test]
    fn test_identity_tiebreaker_appended() {
        let plan = plan_find(
            &entity(),
            args(json!({"orderBy": [{"Preset": "desc"}]})),
            &QueryLimits::default(),
        )
        .unwrap();
        assert_eq!(
            plan.order,
            vec![OrderTerm::desc("Preset"), OrderTerm::asc("MonitorId")]
        );
    }

    #[test]
    fn test_negative_take_reads_backwards() {
        let plan = plan_find(&entity(), args(json!({"take": -3, "skip": 1})), &QueryLimits::default())
            .unwrap();
        assert_eq!(
            plan.page,
            Page {
                direction: ScanDirection::Backward,
                skip: 1,
                take: Some(3)
            }
        );
    }

    #[test]
    fn test_pagination_bounds() {
        let limits = QueryLimits {
            max_page_size: 10,
            max_skip: 20,
            ..QueryLimits::default()
        };
        for raw in [
            json!({"take": 11}),
            json!({"take": -11}),
            json!({"skip": 21}),
            json!({"skip": -1}),
            json!({"take": 0, "cursor": {"MonitorId": 1, "Preset": 2}}),
        ] {
            assert_matches!(
                plan_find(&entity(), args(raw.clone()), &limits),
                Err(ValidationError::InvalidPagination { .. }),
                "{}",
                raw
            );
        }
        assert!(plan_find(&entity(), args(json!({"take": 0})), &limits).unwrap().is_empty_page());
    }
}
