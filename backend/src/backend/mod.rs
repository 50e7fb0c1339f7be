//! Persistence backends
//!
//! The mediator talks to storage only through the [`Backend`] trait. Every
//! argument arrives validated and planned, so an implementation only has to
//! execute it:
//! - [`MemoryBackend`] - process-local tables, the reference semantics
//! - [`SqliteBackend`] - sqlx over SQLite

mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

pub use crate::error::BackendError;

use async_trait::async_trait;

use crate::aggregate::{AggregateQuery, AggregateValues, GroupByQuery, GroupRow};
use crate::filters::FilterNode;
use crate::mutation::{CreateData, UpdateData};
use crate::query::QueryPlan;
use crate::record::{Identity, Record};
use crate::schema::EntityDescriptor;

/// Storage operations the mediator dispatches to. One mediator operation maps
/// to exactly one call.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Row addressed by `identity`, if any
    async fn find_unique(
        &self,
        entity: &EntityDescriptor,
        identity: &Identity,
    ) -> Result<Option<Record>, BackendError>;

    /// Rows selected by a plan, in plan order
    async fn find_many(
        &self,
        entity: &EntityDescriptor,
        plan: &QueryPlan,
    ) -> Result<Vec<Record>, BackendError>;

    /// Number of rows a plan selects
    async fn count(&self, entity: &EntityDescriptor, plan: &QueryPlan) -> Result<u64, BackendError>;

    /// Insert one row, filling defaults; returns the stored row
    async fn create(
        &self,
        entity: &EntityDescriptor,
        data: &CreateData,
    ) -> Result<Record, BackendError>;

    /// Insert rows atomically. With `skip_duplicates`, rows that would violate
    /// a unique key are skipped instead of failing the batch. Returns the
    /// number of rows inserted.
    async fn create_many(
        &self,
        entity: &EntityDescriptor,
        data: &[CreateData],
        skip_duplicates: bool,
    ) -> Result<u64, BackendError>;

    /// Update the row addressed by `identity`; `RecordNotFound` if missing
    async fn update(
        &self,
        entity: &EntityDescriptor,
        identity: &Identity,
        data: &UpdateData,
    ) -> Result<Record, BackendError>;

    /// Update every row matching `filter`; returns the number updated
    async fn update_many(
        &self,
        entity: &EntityDescriptor,
        filter: &FilterNode,
        data: &UpdateData,
    ) -> Result<u64, BackendError>;

    /// Update the addressed row, or create it when missing
    async fn upsert(
        &self,
        entity: &EntityDescriptor,
        identity: &Identity,
        create: &CreateData,
        update: &UpdateData,
    ) -> Result<Record, BackendError>;

    /// Delete the addressed row and return it; `RecordNotFound` if missing
    async fn delete(
        &self,
        entity: &EntityDescriptor,
        identity: &Identity,
    ) -> Result<Record, BackendError>;

    /// Delete every row matching `filter`; returns the number deleted
    async fn delete_many(
        &self,
        entity: &EntityDescriptor,
        filter: &FilterNode,
    ) -> Result<u64, BackendError>;

    /// Reduce the rows of a window to the selected aggregates
    async fn aggregate(
        &self,
        entity: &EntityDescriptor,
        query: &AggregateQuery,
    ) -> Result<AggregateValues, BackendError>;

    /// Group filtered rows and reduce each group
    async fn group_by(
        &self,
        entity: &EntityDescriptor,
        query: &GroupByQuery,
    ) -> Result<Vec<GroupRow>, BackendError>;
}

/// Name of the unique key a row collides on, fields joined by `,`
pub(crate) fn key_name(key: &[&str]) -> String {
    key.join(",")
}
