//! Row decoding
//!
//! Columns are read by declared field kind rather than by SQLite's dynamic
//! type, so a row always decodes to the same [`Value`] variants the memory
//! backend produces.

use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::error::BackendError;
use crate::record::Record;
use crate::schema::{EntityDescriptor, FieldDef, ScalarKind};
use crate::value::{self, Value};

/// Decode a row selected with [`super::sql::column_list`]
pub fn decode(entity: &EntityDescriptor, row: &SqliteRow) -> Result<Record, BackendError> {
    let mut record = Record::new();
    for (index, field) in entity.fields.iter().enumerate() {
        record.insert(field.name, decode_column(field, row, index)?);
    }
    Ok(record)
}

fn decode_column(field: &FieldDef, row: &SqliteRow, index: usize) -> Result<Value, BackendError> {
    let bad = |detail: String| BackendError::query(format!("column {}: {}", field.name, detail));

    let value = match field.kind {
        ScalarKind::String => text(row, index)?.map(Value::String),
        ScalarKind::Enum(_) => text(row, index)?.map(Value::Enum),
        ScalarKind::Int => match integer(row, index)? {
            Some(i) => Some(Value::Int(
                i32::try_from(i).map_err(|_| bad(format!("{} out of range", i)))?,
            )),
            None => None,
        },
        ScalarKind::BigInt => integer(row, index)?.map(Value::BigInt),
        ScalarKind::Boolean => integer(row, index)?.map(|i| Value::Bool(i != 0)),
        ScalarKind::Float => row
            .try_get_unchecked::<Option<f64>, _>(index)
            .map_err(|e| bad(e.to_string()))?
            .map(Value::Float),
        ScalarKind::Decimal => match text(row, index)? {
            Some(s) => Some(Value::Decimal(
                Decimal::from_str(&s).map_err(|e| bad(format!("'{}': {}", s, e)))?,
            )),
            None => None,
        },
        ScalarKind::DateTime => match text(row, index)? {
            Some(s) => Some(Value::DateTime(
                value::parse_datetime(&s).ok_or_else(|| bad(format!("invalid timestamp '{}'", s)))?,
            )),
            None => None,
        },
    };
    Ok(value.unwrap_or(Value::Null))
}

fn text(row: &SqliteRow, index: usize) -> Result<Option<String>, BackendError> {
    row.try_get_unchecked::<Option<String>, _>(index)
        .map_err(|e| BackendError::query(e.to_string()))
}

fn integer(row: &SqliteRow, index: usize) -> Result<Option<i64>, BackendError> {
    row.try_get_unchecked::<Option<i64>, _>(index)
        .map_err(|e| BackendError::query(e.to_string()))
}
