//! Typed scalar values
//!
//! Every value that crosses the mediator (filter operands, mutation payloads,
//! record fields) is a [`Value`] already coerced to the kind declared by the
//! entity descriptor. Coercion from inbound JSON lives here so the filter
//! validator and the mutation validator agree on what each scalar kind accepts.
//!
//! 64-bit integers serialize as JSON strings: a JavaScript client reading a
//! disk-space total as a double would silently lose precision above 2^53.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::schema::ScalarKind;

/// Largest integer an IEEE double represents exactly.
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// A scalar value of one of the supported kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Float(f64),
    Decimal(Decimal),
    DateTime(DateTime<Utc>),
    String(String),
    Enum(String),
}

/// Why a raw JSON value could not be coerced to a scalar kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub expected: String,
    pub actual: String,
}

/// Arithmetic applied by relative field updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arith {
    Add,
    Sub,
    Mul,
    Div,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the value's kind, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "int",
            Value::BigInt(_) => "bigint",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::DateTime(_) => "datetime",
            Value::String(_) => "string",
            Value::Enum(_) => "enum",
        }
    }

    /// Borrow textual content (strings and enum variants)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i64::from(*i)),
            Value::BigInt(i) => Some(*i),
            _ => None,
        }
    }

    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(f64::from(*i)),
            Value::BigInt(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Coerce a raw JSON value to the given scalar kind.
    ///
    /// JSON `null` always coerces to [`Value::Null`]; callers decide whether
    /// null is acceptable for the field in question.
    pub fn coerce(kind: ScalarKind, raw: &JsonValue) -> Result<Value, Mismatch> {
        if raw.is_null() {
            return Ok(Value::Null);
        }

        let mismatch = || Mismatch {
            expected: kind.to_string(),
            actual: describe_json(raw).to_string(),
        };

        match kind {
            ScalarKind::String => raw
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(mismatch),

            ScalarKind::Int => {
                if raw.is_string() {
                    return Err(mismatch());
                }
                let n = whole_number(raw).ok_or_else(mismatch)?;
                i32::try_from(n).map(Value::Int).map_err(|_| Mismatch {
                    expected: kind.to_string(),
                    actual: format!("{} (out of range)", n),
                })
            }

            ScalarKind::BigInt => match raw {
                JsonValue::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::BigInt)
                    .map_err(|_| Mismatch {
                        expected: kind.to_string(),
                        actual: "non-integer string".to_string(),
                    }),
                _ => whole_number(raw).map(Value::BigInt).ok_or_else(mismatch),
            },

            ScalarKind::Float => raw.as_f64().map(Value::Float).ok_or_else(mismatch),

            ScalarKind::Decimal => {
                let text = match raw {
                    JsonValue::Number(n) => n.to_string(),
                    JsonValue::String(s) => s.trim().to_string(),
                    _ => return Err(mismatch()),
                };
                Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .map(Value::Decimal)
                    .map_err(|_| mismatch())
            }

            ScalarKind::Boolean => raw.as_bool().map(Value::Bool).ok_or_else(mismatch),

            ScalarKind::DateTime => raw
                .as_str()
                .and_then(parse_datetime)
                .map(Value::DateTime)
                .ok_or_else(mismatch),

            ScalarKind::Enum(variants) => match raw.as_str() {
                Some(s) if variants.contains(&s) => Ok(Value::Enum(s.to_string())),
                Some(s) => Err(Mismatch {
                    expected: kind.to_string(),
                    actual: format!("unknown variant '{}'", s),
                }),
                None => Err(mismatch()),
            },
        }
    }

    /// Compare two non-null values. Returns `None` when either side is null
    /// or the kinds are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::String(a) | Value::Enum(a), Value::String(b) | Value::Enum(b)) => {
                Some(a.cmp(b))
            }
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), other) => match other.as_i64() {
                Some(i) => Some(a.cmp(&Decimal::from(i))),
                None => a.to_f64()?.partial_cmp(&other.to_f64()?),
            },
            (_, Value::Decimal(_)) => other.compare(self).map(Ordering::reverse),
            _ => match (self.as_i64(), other.as_i64()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => self.to_f64()?.partial_cmp(&other.to_f64()?),
            },
        }
    }

    /// Equality used by filters: nulls are only equal to nulls.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }

    /// Total order used for sorting: nulls first, incomparable values tie.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }

    /// Apply checked arithmetic. Null stays null; `None` means overflow,
    /// division by zero, or a non-numeric operand.
    pub fn arith(&self, op: Arith, rhs: &Value) -> Option<Value> {
        match (self, rhs) {
            (Value::Null, _) => Some(Value::Null),
            (Value::Int(a), Value::Int(b)) => match op {
                Arith::Add => a.checked_add(*b),
                Arith::Sub => a.checked_sub(*b),
                Arith::Mul => a.checked_mul(*b),
                Arith::Div => a.checked_div(*b),
            }
            .map(Value::Int),
            (Value::BigInt(a), Value::BigInt(b)) => match op {
                Arith::Add => a.checked_add(*b),
                Arith::Sub => a.checked_sub(*b),
                Arith::Mul => a.checked_mul(*b),
                Arith::Div => a.checked_div(*b),
            }
            .map(Value::BigInt),
            (Value::Float(a), Value::Float(b)) => {
                let result = match op {
                    Arith::Add => a + b,
                    Arith::Sub => a - b,
                    Arith::Mul => a * b,
                    Arith::Div if *b == 0.0 => return None,
                    Arith::Div => a / b,
                };
                result.is_finite().then_some(Value::Float(result))
            }
            (Value::Decimal(a), Value::Decimal(b)) => match op {
                Arith::Add => a.checked_add(*b),
                Arith::Sub => a.checked_sub(*b),
                Arith::Mul => a.checked_mul(*b),
                Arith::Div => a.checked_div(*b),
            }
            .map(Value::Decimal),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::BigInt(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::DateTime(dt) => write!(f, "{}", format_datetime(dt)),
            Value::String(s) | Value::Enum(s) => write!(f, "{}", s),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i32(*i),
            Value::BigInt(i) => serializer.collect_str(i),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Decimal(d) => serializer.collect_str(d),
            Value::DateTime(dt) => serializer.serialize_str(&format_datetime(dt)),
            Value::String(s) | Value::Enum(s) => serializer.serialize_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::BigInt(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

// ============================================================================
// Date-time helpers
// ============================================================================

/// Parse an RFC 3339 timestamp, a `YYYY-MM-DD HH:MM:SS[.f]` timestamp (taken
/// as UTC), or a bare date. Sub-microsecond precision is dropped.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    let parsed = DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                .ok()
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })?;
    Some(parsed.trunc_subsecs(6))
}

/// Fixed-width UTC rendering; lexical order equals chronological order.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Current time at the precision values are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn whole_number(raw: &JsonValue) -> Option<i64> {
    if let Some(i) = raw.as_i64() {
        return Some(i);
    }
    if raw.as_u64().is_some() {
        return None;
    }
    let f = raw.as_f64()?;
    if !f.is_finite() || f.fract() != 0.0 || f.abs() > MAX_SAFE_INTEGER as f64 {
        return None;
    }
    Some(f as i64)
}

fn describe_json(raw: &JsonValue) -> &'static str {
    match raw {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_i64() => "integer",
        JsonValue::Number(n) if n.is_u64() => "integer (out of range)",
        JsonValue::Number(n) => match n.as_f64() {
            Some(f) if f.fract() != 0.0 => "fractional number",
            Some(f) if f.abs() > MAX_SAFE_INTEGER as f64 => "imprecise number",
            _ => "number",
        },
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_int_rejects_fractions_and_strings() {
        assert_eq!(Value::coerce(ScalarKind::Int, &json!(7)), Ok(Value::Int(7)));
        assert_eq!(Value::coerce(ScalarKind::Int, &json!(7.0)), Ok(Value::Int(7)));

        let err = Value::coerce(ScalarKind::Int, &json!(1.5)).unwrap_err();
        assert_eq!(err.actual, "fractional number");

        let err = Value::coerce(ScalarKind::Int, &json!("not-a-number")).unwrap_err();
        assert_eq!(err.expected, "int");
        assert_eq!(err.actual, "string");

        assert!(Value::coerce(ScalarKind::Int, &json!(3_000_000_000i64)).is_err());
    }

    #[test]
    fn test_bigint_keeps_full_range() {
        let big = json!("9223372036854775807");
        assert_eq!(
            Value::coerce(ScalarKind::BigInt, &big),
            Ok(Value::BigInt(i64::MAX))
        );
        assert_eq!(
            Value::coerce(ScalarKind::BigInt, &json!(9_007_199_254_740_993i64)),
            Ok(Value::BigInt(9_007_199_254_740_993))
        );

        // A double beyond 2^53 has already lost precision on the wire
        let err = Value::coerce(ScalarKind::BigInt, &json!(1.0e17)).unwrap_err();
        assert_eq!(err.actual, "imprecise number");

        assert_eq!(
            serde_json::to_value(Value::BigInt(i64::MAX)).unwrap(),
            json!("9223372036854775807")
        );
    }

    #[test]
    fn test_enum_and_datetime() {
        const FUNCTIONS: &[&str] = &["None", "Monitor", "Modect"];
        let kind = ScalarKind::Enum(FUNCTIONS);
        assert_eq!(
            Value::coerce(kind, &json!("Modect")),
            Ok(Value::Enum("Modect".into()))
        );
        assert!(Value::coerce(kind, &json!("Record")).is_err());

        let dt = Value::coerce(ScalarKind::DateTime, &json!("2024-03-01 12:30:00")).unwrap();
        assert_eq!(dt.to_string(), "2024-03-01T12:30:00.000000Z");
        let same = Value::coerce(ScalarKind::DateTime, &json!("2024-03-01T12:30:00Z")).unwrap();
        assert!(dt.same(&same));
    }

    #[test]
    fn test_compare_and_sort() {
        assert_eq!(
            Value::Int(2).compare(&Value::BigInt(10)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Decimal(Decimal::new(25, 1)).compare(&Value::Int(2)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Null.compare(&Value::Int(1)), None);
        assert_eq!(Value::Null.sort_cmp(&Value::Int(1)), Ordering::Less);
        assert!(Value::Null.same(&Value::Null));
    }

    #[test]
    fn test_arith() {
        assert_eq!(
            Value::Int(2).arith(Arith::Add, &Value::Int(3)),
            Some(Value::Int(5))
        );
        assert_eq!(Value::Int(i32::MAX).arith(Arith::Add, &Value::Int(1)), None);
        assert_eq!(Value::Int(1).arith(Arith::Div, &Value::Int(0)), None);
        assert_eq!(
            Value::Null.arith(Arith::Mul, &Value::Int(4)),
            Some(Value::Null)
        );
    }
}
