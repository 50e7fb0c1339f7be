//! SQL generation for the SQLite backend
//!
//! Every operand is bound as a numbered `?N` parameter; identifiers come only
//! from entity descriptors and are always quoted. Storage conventions:
//! - booleans are `0`/`1` integers
//! - date-times are fixed-width UTC text, so text order is time order
//! - decimals are text; SQL never compares them (see [`exact`])

use sqlx::Sqlite;
use sqlx::query::{Query, QueryScalar};
use sqlx::sqlite::SqliteArguments;

use crate::filters::{CaseMode, Condition, FilterNode, FilterOp, Predicate, TextMatch};
use crate::query::{OrderDirection, OrderTerm, ScanDirection};
use crate::record::{Identity, Record};
use crate::schema::{DefaultValue, EntityDescriptor, FieldDef, ScalarKind};
use crate::value::{self, Value};

// ============================================================================
// Bound values
// ============================================================================

/// A value in the shape SQLite stores it.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl SqlValue {
    pub fn bind_to_query<'q>(
        &'q self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        match self {
            SqlValue::String(s) => query.bind(s.as_str()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Bool(b) => query.bind(if *b { 1i32 } else { 0i32 }),
            SqlValue::Null => query.bind(None::<String>),
        }
    }

    pub fn bind_to_scalar<'q, O: Send + Unpin>(
        &'q self,
        query: QueryScalar<'q, Sqlite, O, SqliteArguments<'q>>,
    ) -> QueryScalar<'q, Sqlite, O, SqliteArguments<'q>> {
        match self {
            SqlValue::String(s) => query.bind(s.as_str()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Bool(b) => query.bind(if *b { 1i32 } else { 0i32 }),
            SqlValue::Null => query.bind(None::<String>),
        }
    }
}

impl From<&Value> for SqlValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Int(i) => SqlValue::Int(i64::from(*i)),
            Value::BigInt(i) => SqlValue::Int(*i),
            Value::Float(f) => SqlValue::Float(*f),
            Value::Decimal(d) => SqlValue::String(d.to_string()),
            Value::DateTime(dt) => SqlValue::String(value::format_datetime(dt)),
            Value::String(s) | Value::Enum(s) => SqlValue::String(s.clone()),
        }
    }
}

// ============================================================================
// Identifiers
// ============================================================================

pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn is_decimal(entity: &EntityDescriptor, field: &str) -> bool {
    matches!(entity.field(field).map(|f| f.kind), Some(ScalarKind::Decimal))
}

/// True when the compiled `filter` selects exactly the rows it matches.
/// Otherwise it selects a superset and rows must be re-checked with
/// [`FilterNode::matches`].
pub fn exact(entity: &EntityDescriptor, filter: &FilterNode) -> bool {
    filter.leaves().iter().all(|c| !is_decimal(entity, &c.field))
}

/// True when SQL can produce `order` (and cursor positions along it)
pub fn orderable(entity: &EntityDescriptor, order: &[OrderTerm]) -> bool {
    order.iter().all(|term| !is_decimal(entity, &term.field))
}

/// Every column of `entity`, quoted, in declaration order
pub fn column_list(entity: &EntityDescriptor) -> String {
    entity
        .field_names()
        .map(quote)
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Statement builder
// ============================================================================

/// SQL text plus the parameters its `?N` placeholders refer to.
#[derive(Debug, Default)]
pub struct SqlBuilder {
    pub params: Vec<SqlValue>,
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter and return its placeholder
    pub fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        format!("?{}", self.params.len())
    }

    /// Compile a filter tree. Each leaf is wrapped in `COALESCE(.., 0)` so a
    /// comparison against NULL is false rather than unknown, which keeps
    /// `NOT` from dropping rows.
    ///
    /// Decimal leaves become constants chosen by polarity: false under an odd
    /// number of `NOT`s and true otherwise. The clause then selects a
    /// superset of the matching rows.
    pub fn filter(&mut self, entity: &EntityDescriptor, node: &FilterNode) -> String {
        self.node(entity, node, true)
    }

    fn node(&mut self, entity: &EntityDescriptor, node: &FilterNode, positive: bool) -> String {
        match node {
            Predicate::Leaf(condition) if is_decimal(entity, &condition.field) => {
                let constant = if positive { "1" } else { "0" };
                constant.to_string()
            }
            Predicate::Leaf(condition) => {
                format!("COALESCE(({}), 0)", self.condition(condition))
            }
            Predicate::And(children) if children.is_empty() => "1".to_string(),
            Predicate::Or(children) if children.is_empty() => "0".to_string(),
            Predicate::And(children) => self.join(entity, children, " AND ", positive),
            Predicate::Or(children) => self.join(entity, children, " OR ", positive),
            Predicate::Not(children) if children.is_empty() => "1".to_string(),
            Predicate::Not(children) => {
                format!("NOT {}", self.join(entity, children, " OR ", !positive))
            }
        }
    }

    fn join(
        &mut self,
        entity: &EntityDescriptor,
        children: &[FilterNode],
        sep: &str,
        positive: bool,
    ) -> String {
        let parts: Vec<String> = children
            .iter()
            .map(|c| self.node(entity, c, positive))
            .collect();
        format!("({})", parts.join(sep))
    }

    fn condition(&mut self, condition: &Condition) -> String {
        let field = condition.field.as_str();
        let column = quote(field);
        match &condition.op {
            FilterOp::Equals(Value::Null) => format!("{} IS NULL", column),
            FilterOp::Equals(v) => format!("{} = {}", column, self.bind(v.into())),
            FilterOp::Gt(v) => format!("{} > {}", column, self.bind(v.into())),
            FilterOp::Gte(v) => format!("{} >= {}", column, self.bind(v.into())),
            FilterOp::Lt(v) => format!("{} < {}", column, self.bind(v.into())),
            FilterOp::Lte(v) => format!("{} <= {}", column, self.bind(v.into())),
            FilterOp::In(values) => self.membership(field, values, false),
            FilterOp::NotIn(values) => self.membership(field, values, true),
            FilterOp::Contains(m) => {
                let (subject, pattern) = self.text(field, m);
                format!("instr({}, {}) > 0", subject, pattern)
            }
            FilterOp::StartsWith(m) => {
                let (subject, pattern) = self.text(field, m);
                format!("substr({}, 1, length({})) = {}", subject, pattern, pattern)
            }
            FilterOp::EndsWith(m) if m.pattern.is_empty() => {
                format!("{} IS NOT NULL", quote(field))
            }
            FilterOp::EndsWith(m) => {
                let (subject, pattern) = self.text(field, m);
                format!("substr({}, -length({})) = {}", subject, pattern, pattern)
            }
        }
    }

    /// A null field is in no list. Lists never hold nulls; validation
    /// rejects them.
    fn membership(&mut self, field: &str, values: &[Value], negated: bool) -> String {
        let column = quote(field);
        let placeholders: Vec<String> = values.iter().map(|v| self.bind(v.into())).collect();

        match (negated, placeholders.is_empty()) {
            (false, true) => "0".to_string(),
            (false, false) => format!("{} IN ({})", column, placeholders.join(", ")),
            (true, true) => format!("{} IS NOT NULL", quote(field)),
            (true, false) => format!(
                "{} IS NOT NULL AND {} NOT IN ({})",
                quote(field),
                column,
                placeholders.join(", ")
            ),
        }
    }

    fn text(&mut self, field: &str, m: &TextMatch) -> (String, String) {
        let placeholder = self.bind(SqlValue::String(m.pattern.clone()));
        match m.mode {
            CaseMode::Default => (quote(field), placeholder),
            CaseMode::Insensitive => (
                format!("lower({})", quote(field)),
                format!("lower({})", placeholder),
            ),
        }
    }

    /// `field = value` for every identity field
    pub fn identity(&mut self, identity: &Identity) -> String {
        let parts: Vec<String> = identity
            .iter()
            .map(|(field, value)| format!("{} = {}", quote(field), self.bind(value.into())))
            .collect();
        parts.join(" AND ")
    }

    /// Rows at or past `anchor` in scan order. `anchor` carries the order
    /// values of the cursor row; the order always ends with the identity, so
    /// exactly one row sits at the anchor. `order` must be [`orderable`].
    pub fn from_cursor(
        &mut self,
        order: &[OrderTerm],
        anchor: &Record,
        direction: ScanDirection,
    ) -> String {
        let mut branches = Vec::with_capacity(order.len() + 1);
        let mut prefix: Vec<String> = Vec::new();
        for term in order {
            let c = anchor.value(&term.field);
            let scan = match direction {
                ScanDirection::Forward => term.direction,
                ScanDirection::Backward => term.direction.reverse(),
            };
            let past = self.past(&term.field, c, scan);
            let mut branch = prefix.clone();
            branch.push(past);
            branches.push(format!("({})", branch.join(" AND ")));
            prefix.push(self.same(&term.field, c));
        }
        branches.push(format!("({})", prefix.join(" AND ")));
        format!("({})", branches.join(" OR "))
    }

    /// Strictly after `c` when scanning `field` in `direction`. Nulls sort
    /// first ascending and last descending.
    fn past(&mut self, field: &str, c: &Value, direction: OrderDirection) -> String {
        let column = quote(field);
        match (direction, c.is_null()) {
            (OrderDirection::Asc, true) => format!("{} IS NOT NULL", column),
            (OrderDirection::Asc, false) => format!("{} > {}", column, self.bind(c.into())),
            (OrderDirection::Desc, true) => "0".to_string(),
            (OrderDirection::Desc, false) => {
                let value = self.bind(c.into());
                format!("({} < {} OR {} IS NULL)", column, value, column)
            }
        }
    }

    fn same(&mut self, field: &str, c: &Value) -> String {
        if c.is_null() {
            format!("{} IS NULL", quote(field))
        } else {
            format!("{} = {}", quote(field), self.bind(c.into()))
        }
    }
}

/// `ORDER BY` body for `order` read in `direction`. `order` must be
/// [`orderable`].
pub fn order_by(order: &[OrderTerm], direction: ScanDirection) -> String {
    order
        .iter()
        .map(|term| {
            let dir = match direction {
                ScanDirection::Forward => term.direction,
                ScanDirection::Backward => term.direction.reverse(),
            };
            format!("{} {}", quote(&term.field), dir.to_sql())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Schema
// ============================================================================

/// Column definition for schema generation.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<String>,
}

impl ColumnDef {
    pub fn from_field(field: &FieldDef) -> Self {
        let default = match &field.default {
            Some(DefaultValue::Literal(v)) => Some(literal(v)),
            _ => None,
        };
        Self {
            name: field.name,
            sql_type: sql_type(field.kind),
            nullable: field.nullable,
            unique: field.unique,
            default,
        }
    }

    /// Generate the column definition SQL
    pub fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", quote(self.name), self.sql_type);

        if !self.nullable {
            sql.push_str(" NOT NULL");
        }

        if self.unique {
            sql.push_str(" UNIQUE");
        }

        if let Some(default) = &self.default {
            sql.push_str(&format!(" DEFAULT {}", default));
        }

        sql
    }
}

fn sql_type(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::String | ScalarKind::Enum(_) | ScalarKind::Decimal | ScalarKind::DateTime => {
            "TEXT"
        }
        ScalarKind::Int | ScalarKind::BigInt | ScalarKind::Boolean => "INTEGER",
        ScalarKind::Float => "REAL",
    }
}

fn literal(value: &Value) -> String {
    match SqlValue::from(value) {
        SqlValue::String(s) => format!("'{}'", s.replace('\'', "''")),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Bool(b) => if b { "1" } else { "0" }.to_string(),
        SqlValue::Null => "NULL".to_string(),
    }
}

/// Generate CREATE TABLE IF NOT EXISTS SQL
pub fn create_table_sql(entity: &EntityDescriptor) -> String {
    let mut defs: Vec<String> = entity
        .fields
        .iter()
        .map(|f| ColumnDef::from_field(f).to_sql())
        .collect();
    defs.push(format!(
        "PRIMARY KEY ({})",
        entity
            .identity
            .iter()
            .map(|f| quote(f))
            .collect::<Vec<_>>()
            .join(", ")
    ));

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quote(entity.name),
        defs.join(",\n  ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::validate_filter;
    use crate::schema::zoneminder;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn entity(name: &str) -> Arc<EntityDescriptor> {
        zoneminder::registry().unwrap().describe(name).unwrap().clone()
    }

    #[test]
    fn test_filter_binds_numbered_params() {
        let events = entity("Events");
        let filter = validate_filter(
            &events,
            &json!({"MonitorId": 3, "OR": [{"Name": {"contains": "x"}}, {"Notes": null}]}),
            8,
        )
        .unwrap();
        let mut sql = SqlBuilder::new();
        let clause = sql.filter(&events, &filter);
        assert_eq!(sql.params.len(), 2);
        assert!(clause.contains("\"MonitorId\" = ?1"), "{}", clause);
        assert!(clause.contains("instr(\"Name\", ?2) > 0"), "{}", clause);
        assert!(clause.contains("\"Notes\" IS NULL"), "{}", clause);
    }

    #[test]
    fn test_decimal_leaves_widen_by_polarity() {
        let events = entity("Events");
        let filter = validate_filter(&events, &json!({"Length": {"gt": "1.5"}}), 8).unwrap();
        let mut sql = SqlBuilder::new();
        assert_eq!(sql.filter(&events, &filter), "1");
        assert!(sql.params.is_empty());
        assert!(!exact(&events, &filter));

        let filter = validate_filter(
            &events,
            &json!({"NOT": [{"Length": {"equals": "0.1"}}, {"MonitorId": 2}]}),
            8,
        )
        .unwrap();
        let mut sql = SqlBuilder::new();
        assert_eq!(
            sql.filter(&events, &filter),
            "NOT (0 OR COALESCE((\"MonitorId\" = ?1), 0))"
        );

        let filter = validate_filter(&events, &json!({"MonitorId": {"in": [1, 2]}}), 8).unwrap();
        assert!(exact(&events, &filter));
        assert!(orderable(&events, &[OrderTerm::asc("Id")]));
        assert!(!orderable(&events, &[OrderTerm::desc("Length"), OrderTerm::asc("Id")]));
    }

    #[test]
    fn test_empty_membership() {
        let events = entity("Events");
        let filter = validate_filter(&events, &json!({"MonitorId": {"in": []}}), 8).unwrap();
        let mut sql = SqlBuilder::new();
        assert_eq!(sql.filter(&events, &filter), "COALESCE((0), 0)");
    }

    #[test]
    fn test_membership_binds_every_value() {
        let events = entity("Events");
        let filter = validate_filter(&events, &json!({"MonitorId": {"notIn": [1, 2]}}), 8).unwrap();
        let mut sql = SqlBuilder::new();
        assert_eq!(
            sql.filter(&events, &filter),
            "COALESCE((\"MonitorId\" IS NOT NULL AND \"MonitorId\" NOT IN (?1, ?2)), 0)"
        );
        assert_eq!(sql.params, vec![SqlValue::Int(1), SqlValue::Int(2)]);
    }

    #[test]
    fn test_create_table() {
        let config = entity("Config");
        let ddl = create_table_sql(&config);
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"Config\""));
        assert!(ddl.contains("\"Id\" INTEGER NOT NULL UNIQUE"), "{}", ddl);
        assert!(ddl.contains("\"Readonly\" INTEGER NOT NULL DEFAULT 0"), "{}", ddl);
        assert!(ddl.contains("PRIMARY KEY (\"Name\")"), "{}", ddl);

        let servers = create_table_sql(&entity("Servers"));
        assert!(servers.contains("\"Status\" TEXT NOT NULL DEFAULT 'Unknown'"), "{}", servers);
    }

    #[test]
    fn test_cursor_predicate_shape() {
        let anchor: Record = [("Name", Value::from("B"))].into_iter().collect();
        let mut sql = SqlBuilder::new();
        let clause = sql.from_cursor(&[OrderTerm::asc("Name")], &anchor, ScanDirection::Forward);
        assert_eq!(clause, "((\"Name\" > ?1) OR (\"Name\" = ?2))");
    }
}
