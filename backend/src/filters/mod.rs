//! Filter algebra
//!
//! Filters are predicate trees over typed leaf conditions:
//! - `AND` / `OR` / `NOT` composites ([`Predicate`])
//! - Equals, In, NotIn (every kind)
//! - Lt, Lte, Gt, Gte (ordered kinds)
//! - Contains, StartsWith, EndsWith with an optional case-insensitive mode (strings)
//!
//! Trees are only built by [`validate_filter`], so every leaf names a known
//! field and carries operands already coerced to that field's kind. Backends
//! either evaluate a tree in memory ([`FilterNode::matches`]) or translate it
//! to SQL; both follow the null rules documented on [`FilterOp::test`].

pub mod having;
mod validate;

pub use having::{HavingCondition, HavingNode, validate_having};
pub use validate::validate_filter;

use std::cmp::Ordering;

use serde::Serialize;

use crate::record::Record;
use crate::value::Value;

// ============================================================================
// Predicate tree
// ============================================================================

/// Boolean combination of leaf conditions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Predicate<L> {
    Leaf(L),
    /// True when every child holds (vacuously true when empty)
    And(Vec<Predicate<L>>),
    /// True when any child holds (false when empty)
    Or(Vec<Predicate<L>>),
    /// True when no child holds
    Not(Vec<Predicate<L>>),
}

impl<L> Predicate<L> {
    /// The predicate that matches everything
    pub fn always() -> Self {
        Predicate::And(Vec::new())
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Predicate::And(children) if children.is_empty())
    }

    /// Evaluate with `leaf` deciding each leaf condition
    pub fn eval<F>(&self, leaf: &F) -> bool
    where
        F: Fn(&L) -> bool,
    {
        match self {
            Predicate::Leaf(l) => leaf(l),
            Predicate::And(children) => children.iter().all(|c| c.eval(leaf)),
            Predicate::Or(children) => children.iter().any(|c| c.eval(leaf)),
            Predicate::Not(children) => !children.iter().any(|c| c.eval(leaf)),
        }
    }

    /// Composite nesting depth; a bare leaf has depth 0
    pub fn depth(&self) -> usize {
        match self {
            Predicate::Leaf(_) => 0,
            Predicate::And(children) | Predicate::Or(children) | Predicate::Not(children) => {
                1 + children.iter().map(Predicate::depth).max().unwrap_or(0)
            }
        }
    }

    pub fn leaves(&self) -> Vec<&L> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a L>) {
        match self {
            Predicate::Leaf(l) => out.push(l),
            Predicate::And(children) | Predicate::Or(children) | Predicate::Not(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// Rebuild the tree with every leaf mapped through `f`
    pub fn map<M, F>(self, f: &F) -> Predicate<M>
    where
        F: Fn(L) -> M,
    {
        match self {
            Predicate::Leaf(l) => Predicate::Leaf(f(l)),
            Predicate::And(children) => Predicate::And(children.into_iter().map(|c| c.map(f)).collect()),
            Predicate::Or(children) => Predicate::Or(children.into_iter().map(|c| c.map(f)).collect()),
            Predicate::Not(children) => Predicate::Not(children.into_iter().map(|c| c.map(f)).collect()),
        }
    }

    /// Collapse a list of conjuncts: one child stands alone, otherwise `And`
    pub(crate) fn conjunction(mut children: Vec<Predicate<L>>) -> Self {
        if children.len() == 1 {
            if let Some(only) = children.pop() {
                return only;
            }
        }
        Predicate::And(children)
    }
}

impl<L> Default for Predicate<L> {
    fn default() -> Self {
        Self::always()
    }
}

// ============================================================================
// Leaf conditions
// ============================================================================

/// Case handling for text operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CaseMode {
    #[default]
    Default,
    /// ASCII case folding on both sides
    Insensitive,
}

/// Pattern operand of a text operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextMatch {
    pub pattern: String,
    pub mode: CaseMode,
}

impl TextMatch {
    fn prepare<'a>(&self, subject: &'a str) -> (std::borrow::Cow<'a, str>, String) {
        match self.mode {
            CaseMode::Default => (subject.into(), self.pattern.clone()),
            CaseMode::Insensitive => (
                subject.to_ascii_lowercase().into(),
                self.pattern.to_ascii_lowercase(),
            ),
        }
    }
}

/// Operator and operand(s) of one leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOp {
    Equals(Value),
    Contains(TextMatch),
    StartsWith(TextMatch),
    EndsWith(TextMatch),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
}

impl FilterOp {
    pub fn name(&self) -> &'static str {
        match self {
            FilterOp::Equals(_) => "equals",
            FilterOp::Contains(_) => "contains",
            FilterOp::StartsWith(_) => "startsWith",
            FilterOp::EndsWith(_) => "endsWith",
            FilterOp::Gt(_) => "gt",
            FilterOp::Gte(_) => "gte",
            FilterOp::Lt(_) => "lt",
            FilterOp::Lte(_) => "lte",
            FilterOp::In(_) => "in",
            FilterOp::NotIn(_) => "notIn",
        }
    }

    /// Test a field value against this operator.
    ///
    /// A null field value only satisfies `Equals(Null)`; every other
    /// operator, `NotIn` included, is false on null.
    pub fn test(&self, value: &Value) -> bool {
        match self {
            FilterOp::Equals(expected) => value.same(expected),
            _ if value.is_null() => false,
            FilterOp::Contains(m) => text(value, m, |s, p| s.contains(p)),
            FilterOp::StartsWith(m) => text(value, m, |s, p| s.starts_with(p)),
            FilterOp::EndsWith(m) => text(value, m, |s, p| s.ends_with(p)),
            FilterOp::Gt(x) => value.compare(x) == Some(Ordering::Greater),
            FilterOp::Gte(x) => matches!(
                value.compare(x),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt(x) => value.compare(x) == Some(Ordering::Less),
            FilterOp::Lte(x) => matches!(value.compare(x), Some(Ordering::Less | Ordering::Equal)),
            FilterOp::In(xs) => xs.iter().any(|x| value.same(x)),
            FilterOp::NotIn(xs) => !xs.iter().any(|x| value.same(x)),
        }
    }
}

fn text(value: &Value, m: &TextMatch, f: impl Fn(&str, &str) -> bool) -> bool {
    match value.as_str() {
        Some(s) => {
            let (subject, pattern) = m.prepare(s);
            f(&subject, &pattern)
        }
        None => false,
    }
}

/// One field compared with one operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub field: String,
    pub op: FilterOp,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: FilterOp) -> Self {
        Self {
            field: field.into(),
            op,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.op.test(record.value(&self.field))
    }
}

/// A validated `where` tree.
pub type FilterNode = Predicate<Condition>;

impl FilterNode {
    pub fn matches(&self, record: &Record) -> bool {
        self.eval(&|c: &Condition| c.matches(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: Option<&str>, level: i32) -> Record {
        [
            ("Name", name.map(Value::from).unwrap_or(Value::Null)),
            ("Level", Value::Int(level)),
        ]
        .into_iter()
        .collect()
    }

    fn leaf(field: &str, op: FilterOp) -> FilterNode {
        Predicate::Leaf(Condition::new(field, op))
    }

    #[test]
    fn test_empty_composites() {
        let r = record(Some("a"), 1);
        assert!(FilterNode::And(vec![]).matches(&r));
        assert!(!FilterNode::Or(vec![]).matches(&r));
        assert!(FilterNode::Not(vec![]).matches(&r));
    }

    #[test]
    fn test_null_only_matches_equals_null() {
        let r = record(None, 1);
        assert!(leaf("Name", FilterOp::Equals(Value::Null)).matches(&r));
        assert!(!leaf("Name", FilterOp::NotIn(vec![Value::from("a")])).matches(&r));
        let text = TextMatch {
            pattern: String::new(),
            mode: CaseMode::Default,
        };
        assert!(!leaf("Name", FilterOp::Contains(text)).matches(&r));
        // NOT flips the null leaf
        let not_a = FilterNode::Not(vec![leaf("Name", FilterOp::Equals(Value::from("a")))]);
        assert!(not_a.matches(&r));
    }

    #[test]
    fn test_insensitive_text() {
        let r = record(Some("Front Door"), 1);
        let m = |pattern: &str, mode| TextMatch {
            pattern: pattern.to_string(),
            mode,
        };
        assert!(!leaf("Name", FilterOp::StartsWith(m("front", CaseMode::Default))).matches(&r));
        assert!(leaf("Name", FilterOp::StartsWith(m("front", CaseMode::Insensitive))).matches(&r));
        assert!(leaf("Name", FilterOp::EndsWith(m("DOOR", CaseMode::Insensitive))).matches(&r));
        assert!(leaf("Name", FilterOp::Contains(m("t D", CaseMode::Default))).matches(&r));
    }

    #[test]
    fn test_ordered_ops_and_depth() {
        let r = record(Some("x"), 5);
        let tree = FilterNode::Or(vec![
            leaf("Level", FilterOp::Gt(Value::Int(7))),
            FilterNode::And(vec![
                leaf("Level", FilterOp::Gte(Value::Int(5))),
                leaf("Level", FilterOp::Lt(Value::BigInt(6))),
            ]),
        ]);
        assert!(tree.matches(&r));
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.leaves().len(), 3);
    }
}
