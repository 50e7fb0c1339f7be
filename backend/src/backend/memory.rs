//! In-memory backend
//!
//! Tables are vectors of complete rows behind one `RwLock`. Every call runs
//! to completion without awaiting while the lock is held, and multi-row
//! mutations work on a copy of the table that is only swapped in on success,
//! so a failed batch leaves no partial writes.
//!
//! [`MemoryBackend::set_available`] simulates an outage: while unavailable
//! every call fails with [`BackendError::Unavailable`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Backend, BackendError, key_name};
use crate::aggregate::{self, AggregateQuery, AggregateValues, GroupByQuery, GroupRow};
use crate::filters::FilterNode;
use crate::mutation::{CreateData, UpdateData};
use crate::query::{QueryPlan, window};
use crate::record::{Identity, Record};
use crate::schema::{EntityDescriptor, ScalarKind};
use crate::value::Value;

/// Process-local storage.
#[derive(Debug)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<&'static str, Vec<Record>>>,
    available: AtomicBool,
    calls: AtomicU64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            calls: AtomicU64::new(0),
        }
    }

    /// Toggle simulated availability
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of backend calls received so far
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of rows currently stored for `entity`
    pub fn row_count(&self, entity: &str) -> usize {
        self.tables.read().get(entity).map_or(0, Vec::len)
    }

    fn enter(&self, operation: &'static str, entity: &EntityDescriptor) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(backend = "memory", entity = entity.name, operation, "Backend call");
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Unavailable {
                reason: "memory backend switched off".to_string(),
            })
        }
    }

    /// Filtered rows in plan order, windowed
    fn select(&self, entity: &EntityDescriptor, plan: &QueryPlan) -> Vec<Record> {
        let tables = self.tables.read();
        let mut rows: Vec<Record> = tables
            .get(entity.name)
            .map(|rows| rows.iter().filter(|r| plan.filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        window::sort(&plan.order, &mut rows);
        window::apply(plan, rows)
    }
}

// ============================================================================
// Table helpers
// ============================================================================

fn position(rows: &[Record], identity: &Identity) -> Option<usize> {
    rows.iter().position(|r| identity.matches(r))
}

/// Fail when `candidate` shares a unique key with any row except `except`.
/// Keys containing a null never collide.
fn check_unique(
    entity: &EntityDescriptor,
    rows: &[Record],
    candidate: &Record,
    except: Option<usize>,
) -> Result<(), BackendError> {
    for key in entity.unique_keys() {
        let Some(address) = Identity::of(candidate, &key) else {
            continue;
        };
        let collides = rows
            .iter()
            .enumerate()
            .any(|(i, row)| Some(i) != except && address.matches(row));
        if collides {
            return Err(BackendError::UniqueConstraintViolation {
                field: key_name(&key),
            });
        }
    }
    Ok(())
}

/// Build a complete row for `data` and append it
fn insert(
    entity: &EntityDescriptor,
    rows: &mut Vec<Record>,
    data: &CreateData,
) -> Result<Record, BackendError> {
    let mut record = data.with_defaults(entity);
    for field in data.pending_sequences(entity) {
        let next = rows
            .iter()
            .filter_map(|r| r.value(field).as_i64())
            .max()
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| BackendError::query(format!("sequence {} exhausted", field)))?;
        let value = match entity.field(field).map(|f| f.kind) {
            Some(ScalarKind::Int) => i32::try_from(next)
                .map(Value::Int)
                .map_err(|_| BackendError::query(format!("sequence {} exhausted", field)))?,
            _ => Value::BigInt(next),
        };
        record.insert(field, value);
    }
    check_unique(entity, rows, &record, None)?;
    rows.push(record.clone());
    Ok(record)
}

fn apply_update(
    entity: &EntityDescriptor,
    rows: &mut [Record],
    index: usize,
    data: &UpdateData,
) -> Result<Record, BackendError> {
    let next = data.apply(&rows[index])?;
    check_unique(entity, rows, &next, Some(index))?;
    rows[index] = next.clone();
    Ok(next)
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn find_unique(
        &self,
        entity: &EntityDescriptor,
        identity: &Identity,
    ) -> Result<Option<Record>, BackendError> {
        self.enter("find_unique", entity)?;
        let tables = self.tables.read();
        Ok(tables
            .get(entity.name)
            .and_then(|rows| rows.iter().find(|r| identity.matches(r)).cloned()))
    }

    async fn find_many(
        &self,
        entity: &EntityDescriptor,
        plan: &QueryPlan,
    ) -> Result<Vec<Record>, BackendError> {
        self.enter("find_many", entity)?;
        Ok(self.select(entity, plan))
    }

    async fn count(&self, entity: &EntityDescriptor, plan: &QueryPlan) -> Result<u64, BackendError> {
        self.enter("count", entity)?;
        Ok(self.select(entity, plan).len() as u64)
    }

    async fn create(
        &self,
        entity: &EntityDescriptor,
        data: &CreateData,
    ) -> Result<Record, BackendError> {
        self.enter("create", entity)?;
        let mut tables = self.tables.write();
        insert(entity, tables.entry(entity.name).or_default(), data)
    }

    async fn create_many(
        &self,
        entity: &EntityDescriptor,
        data: &[CreateData],
        skip_duplicates: bool,
    ) -> Result<u64, BackendError> {
        self.enter("create_many", entity)?;
        let mut tables = self.tables.write();
        let table = tables.entry(entity.name).or_default();
        let mut staged = table.clone();
        let mut inserted = 0;
        for item in data {
            match insert(entity, &mut staged, item) {
                Ok(_) => inserted += 1,
                Err(BackendError::UniqueConstraintViolation { .. }) if skip_duplicates => {}
                Err(e) => return Err(e),
            }
        }
        *table = staged;
        Ok(inserted)
    }

    async fn update(
        &self,
        entity: &EntityDescriptor,
        identity: &Identity,
        data: &UpdateData,
    ) -> Result<Record, BackendError> {
        self.enter("update", entity)?;
        let mut tables = self.tables.write();
        let rows = tables.entry(entity.name).or_default();
        let index = position(rows, identity).ok_or_else(|| BackendError::not_found(entity.name))?;
        apply_update(entity, rows, index, data)
    }

    async fn update_many(
        &self,
        entity: &EntityDescriptor,
        filter: &FilterNode,
        data: &UpdateData,
    ) -> Result<u64, BackendError> {
        self.enter("update_many", entity)?;
        let mut tables = self.tables.write();
        let table = tables.entry(entity.name).or_default();
        let targets: Vec<usize> = table
            .iter()
            .enumerate()
            .filter(|(_, r)| filter.matches(r))
            .map(|(i, _)| i)
            .collect();
        let mut staged = table.clone();
        for &index in &targets {
            apply_update(entity, &mut staged, index, data)?;
        }
        *table = staged;
        Ok(targets.len() as u64)
    }

    async fn upsert(
        &self,
        entity: &EntityDescriptor,
        identity: &Identity,
        create: &CreateData,
        update: &UpdateData,
    ) -> Result<Record, BackendError> {
        self.enter("upsert", entity)?;
        let mut tables = self.tables.write();
        let rows = tables.entry(entity.name).or_default();
        match position(rows, identity) {
            Some(index) => apply_update(entity, rows, index, update),
            None => insert(entity, rows, create),
        }
    }

    async fn delete(
        &self,
        entity: &EntityDescriptor,
        identity: &Identity,
    ) -> Result<Record, BackendError> {
        self.enter("delete", entity)?;
        let mut tables = self.tables.write();
        let rows = tables.entry(entity.name).or_default();
        let index = position(rows, identity).ok_or_else(|| BackendError::not_found(entity.name))?;
        Ok(rows.remove(index))
    }

    async fn delete_many(
        &self,
        entity: &EntityDescriptor,
        filter: &FilterNode,
    ) -> Result<u64, BackendError> {
        self.enter("delete_many", entity)?;
        let mut tables = self.tables.write();
        let rows = tables.entry(entity.name).or_default();
        let before = rows.len();
        rows.retain(|r| !filter.matches(r));
        Ok((before - rows.len()) as u64)
    }

    async fn aggregate(
        &self,
        entity: &EntityDescriptor,
        query: &AggregateQuery,
    ) -> Result<AggregateValues, BackendError> {
        self.enter("aggregate", entity)?;
        let rows = self.select(entity, &query.plan);
        aggregate::evaluate(&query.selection, &rows)
    }

    async fn group_by(
        &self,
        entity: &EntityDescriptor,
        query: &GroupByQuery,
    ) -> Result<Vec<GroupRow>, BackendError> {
        self.enter("group_by", entity)?;
        let rows: Vec<Record> = {
            let tables = self.tables.read();
            tables
                .get(entity.name)
                .map(|rows| rows.iter().filter(|r| query.filter.matches(r)).cloned().collect())
                .unwrap_or_default()
        };
        aggregate::group(query, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{validate_create, validate_identity, validate_update};
    use crate::schema::zoneminder;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::Arc;

    fn entity(name: &str) -> Arc<EntityDescriptor> {
        zoneminder::registry().unwrap().describe(name).unwrap().clone()
    }

    fn user(name: &str) -> CreateData {
        validate_create(
            &entity("Users"),
            &json!({"Username": name, "Password": "x"}),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_sequence_and_defaults() {
        let backend = MemoryBackend::new();
        let users = entity("Users");
        let first = backend.create(&users, &user("admin")).await.unwrap();
        let second = backend.create(&users, &user("viewer")).await.unwrap();
        assert_eq!(first.get("Id"), Some(&Value::Int(1)));
        assert_eq!(second.get("Id"), Some(&Value::Int(2)));
        assert_eq!(first.get("Enabled"), Some(&Value::Int(1)));
        assert_eq!(first.get("Language"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_unique_violation_names_field() {
        let backend = MemoryBackend::new();
        let users = entity("Users");
        backend.create(&users, &user("admin")).await.unwrap();
        assert_matches!(
            backend.create(&users, &user("admin")).await,
            Err(BackendError::UniqueConstraintViolation { field }) if field == "Username"
        );
    }

    #[tokio::test]
    async fn test_create_many_is_all_or_nothing() {
        let backend = MemoryBackend::new();
        let users = entity("Users");
        let batch = vec![user("a"), user("b"), user("a")];
        assert!(backend.create_many(&users, &batch, false).await.is_err());
        assert_eq!(backend.row_count("Users"), 0);

        assert_eq!(backend.create_many(&users, &batch, true).await.unwrap(), 2);
        assert_eq!(backend.row_count("Users"), 2);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing() {
        let backend = MemoryBackend::new();
        let config = entity("Config");
        let id = validate_identity(&config, &json!({"Name": "X"})).unwrap();
        let data = validate_update(&config, &json!({"Value": {"set": "2"}})).unwrap();
        assert_matches!(
            backend.update(&config, &id, &data).await,
            Err(BackendError::RecordNotFound { .. })
        );
        assert_matches!(
            backend.delete(&config, &id).await,
            Err(BackendError::RecordNotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_unavailable_switch() {
        let backend = MemoryBackend::new();
        backend.set_available(false);
        let users = entity("Users");
        assert_matches!(
            backend.create(&users, &user("a")).await,
            Err(BackendError::Unavailable { .. })
        );
        assert_eq!(backend.call_count(), 1);
    }
}
