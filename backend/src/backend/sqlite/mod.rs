//! SQLite backend
//!
//! Filters, ordering, cursors and pages are compiled to SQL (see [`sql`]).
//! Field update operators and aggregates are evaluated in Rust over rows read
//! inside the same transaction, so both backends share one arithmetic.
//!
//! Decimals are stored as text, which SQL cannot compare exactly. A plan that
//! filters or orders on a decimal field is narrowed in SQL and then decided
//! in Rust, the same way the memory backend decides it.

mod row;
pub mod sql;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteQueryResult, SqliteRow};
use sqlx::{Executor, Sqlite};

use self::sql::{SqlBuilder, SqlValue, column_list, create_table_sql, exact, order_by, orderable, quote};
use super::{Backend, BackendError};
use crate::aggregate::{self, AggregateQuery, AggregateValues, GroupByQuery, GroupRow};
use crate::filters::FilterNode;
use crate::mutation::{CreateData, UpdateData};
use crate::query::{QueryPlan, ScanDirection, window};
use crate::record::{Identity, Record};
use crate::schema::{EntityDescriptor, EntityRegistry};

/// sqlx-backed storage over one SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Create a new connection pool. The database file is created if missing.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, BackendError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(map_err)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(map_err)?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create any missing table of `registry`. Existing tables are left as
    /// they are.
    pub async fn ensure_schema(&self, registry: &EntityRegistry) -> Result<(), BackendError> {
        for entity in registry.iter() {
            let ddl = create_table_sql(entity);
            tracing::debug!(entity = entity.name, "Ensuring table");
            self.pool.execute(ddl.as_str()).await.map_err(map_err)?;
        }
        tracing::info!(tables = registry.len(), "SQLite schema ready");
        Ok(())
    }

    /// Rows of a plan: filter, cursor and order in SQL, then distinct and
    /// page in SQL or, with `distinct`, in Rust. A plan SQL cannot decide
    /// exactly is narrowed in SQL and windowed entirely in Rust.
    async fn window(&self, entity: &EntityDescriptor, plan: &QueryPlan) -> Result<Vec<Record>, BackendError> {
        if plan.is_empty_page() {
            return Ok(Vec::new());
        }
        if !Self::compiles(entity, plan) {
            let mut rows = self.matching(entity, &plan.filter).await?;
            window::sort(&plan.order, &mut rows);
            return Ok(window::apply(plan, rows));
        }
        let Some(statement) = self
            .window_statement(entity, plan, &column_list(entity), plan.distinct.is_empty())
            .await?
        else {
            return Ok(Vec::new());
        };

        let rows = statement
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|r| row::decode(entity, r))
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = if plan.distinct.is_empty() {
            rows
        } else {
            window::paginate(plan, rows)
        };
        if plan.page.direction == ScanDirection::Backward {
            rows.reverse();
        }
        Ok(rows)
    }

    /// Whether SQL alone decides the filter, order and cursor of `plan`
    fn compiles(entity: &EntityDescriptor, plan: &QueryPlan) -> bool {
        exact(entity, &plan.filter) && orderable(entity, &plan.order)
    }

    /// Rows matching `filter`, unordered
    async fn matching(&self, entity: &EntityDescriptor, filter: &FilterNode) -> Result<Vec<Record>, BackendError> {
        let rows = select_matching(entity, filter).fetch_all(&self.pool).await?;
        decode_matching(entity, filter, &rows)
    }

    /// SELECT for a plan in scan order, `None` when the cursor row does not
    /// match. With `paged`, skip and take become LIMIT/OFFSET.
    async fn window_statement(
        &self,
        entity: &EntityDescriptor,
        plan: &QueryPlan,
        select: &str,
        paged: bool,
    ) -> Result<Option<Statement>, BackendError> {
        let mut sql = SqlBuilder::new();
        let mut clauses = Vec::new();
        if !plan.filter.is_always() {
            clauses.push(sql.filter(entity, &plan.filter));
        }
        if let Some(cursor) = &plan.cursor {
            let Some(anchor) = self.anchor(entity, &plan.filter, cursor).await? else {
                return Ok(None);
            };
            clauses.push(sql.from_cursor(&plan.order, &anchor, plan.page.direction));
        }

        let mut text = format!("SELECT {} FROM {}", select, quote(entity.name));
        if !clauses.is_empty() {
            text.push_str(" WHERE ");
            text.push_str(&clauses.join(" AND "));
        }
        text.push_str(" ORDER BY ");
        text.push_str(&order_by(&plan.order, plan.page.direction));

        if paged {
            match (plan.page.take, plan.page.skip) {
                (Some(take), skip) => text.push_str(&format!(" LIMIT {} OFFSET {}", take, skip)),
                (None, skip) if skip > 0 => text.push_str(&format!(" LIMIT -1 OFFSET {}", skip)),
                _ => {}
            }
        }
        Ok(Some(Statement::new(text, sql.params)))
    }

    /// The cursor row, if it exists and passes the filter
    async fn anchor(
        &self,
        entity: &EntityDescriptor,
        filter: &FilterNode,
        cursor: &Identity,
    ) -> Result<Option<Record>, BackendError> {
        let mut sql = SqlBuilder::new();
        let mut clauses = vec![sql.identity(cursor)];
        if !filter.is_always() {
            clauses.push(sql.filter(entity, filter));
        }
        let text = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 1",
            column_list(entity),
            quote(entity.name),
            clauses.join(" AND ")
        );
        Statement::new(text, sql.params)
            .fetch_optional(&self.pool)
            .await?
            .map(|r| row::decode(entity, &r))
            .transpose()
    }
}

// ============================================================================
// Statements
// ============================================================================

/// SQL text with its bound parameters.
struct Statement {
    sql: String,
    params: Vec<SqlValue>,
}

impl Statement {
    fn new(sql: String, params: Vec<SqlValue>) -> Self {
        Self { sql, params }
    }

    fn query(&self) -> sqlx::query::Query<'_, Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
        tracing::debug!(sql = %self.sql, params = self.params.len(), "Executing statement");
        let mut query = sqlx::query(&self.sql);
        for value in &self.params {
            query = value.bind_to_query(query);
        }
        query
    }

    async fn fetch_all<'c, E>(&self, executor: E) -> Result<Vec<SqliteRow>, BackendError>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        self.query().fetch_all(executor).await.map_err(map_err)
    }

    async fn fetch_optional<'c, E>(&self, executor: E) -> Result<Option<SqliteRow>, BackendError>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        self.query().fetch_optional(executor).await.map_err(map_err)
    }

    async fn execute<'c, E>(&self, executor: E) -> Result<SqliteQueryResult, BackendError>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        self.query().execute(executor).await.map_err(map_err)
    }

    async fn fetch_count<'c, E>(&self, executor: E) -> Result<u64, BackendError>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        tracing::debug!(sql = %self.sql, "Executing count query");
        let mut query = sqlx::query_scalar::<_, i64>(&self.sql);
        for value in &self.params {
            query = value.bind_to_scalar(query);
        }
        let count = query.fetch_one(executor).await.map_err(map_err)?;
        Ok(count.max(0).unsigned_abs())
    }
}

/// INSERT for one row. Missing auto-increment fields take the next value of
/// the column inside the statement itself.
fn insert_statement(entity: &EntityDescriptor, data: &CreateData, or_ignore: bool) -> Statement {
    let record = data.with_defaults(entity);
    let mut sql = SqlBuilder::new();
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for (field, value) in record.iter() {
        columns.push(quote(field));
        values.push(sql.bind(value.into()));
    }
    for field in data.pending_sequences(entity) {
        columns.push(quote(field));
        values.push(format!(
            "(SELECT IFNULL(MAX({}), 0) + 1 FROM {})",
            quote(field),
            quote(entity.name)
        ));
    }
    let text = format!(
        "INSERT {}INTO {} ({}) VALUES ({}) RETURNING {}",
        if or_ignore { "OR IGNORE " } else { "" },
        quote(entity.name),
        columns.join(", "),
        values.join(", "),
        column_list(entity)
    );
    Statement::new(text, sql.params)
}

fn select_unique(entity: &EntityDescriptor, identity: &Identity) -> Statement {
    let mut sql = SqlBuilder::new();
    let clause = sql.identity(identity);
    let text = format!(
        "SELECT {} FROM {} WHERE {}",
        column_list(entity),
        quote(entity.name),
        clause
    );
    Statement::new(text, sql.params)
}

/// SELECT narrowed by `filter`; re-check rows unless the filter is [`exact`]
fn select_matching(entity: &EntityDescriptor, filter: &FilterNode) -> Statement {
    let mut sql = SqlBuilder::new();
    let mut text = format!("SELECT {} FROM {}", column_list(entity), quote(entity.name));
    if !filter.is_always() {
        text.push_str(" WHERE ");
        text.push_str(&sql.filter(entity, filter));
    }
    Statement::new(text, sql.params)
}

/// UPDATE writing the fields `data` touches, addressed by the row's
/// identity before the change
fn update_statement(
    entity: &EntityDescriptor,
    before: &Record,
    after: &Record,
    data: &UpdateData,
) -> Result<Statement, BackendError> {
    let identity = Identity::of(before, &entity.identity)
        .ok_or_else(|| BackendError::query(format!("{} row without identity", entity.name)))?;
    let mut sql = SqlBuilder::new();
    let assignments: Vec<String> = data
        .iter()
        .map(|(field, _)| format!("{} = {}", quote(field), sql.bind(after.value(field).into())))
        .collect();
    let clause = sql.identity(&identity);
    let text = format!(
        "UPDATE {} SET {} WHERE {}",
        quote(entity.name),
        assignments.join(", "),
        clause
    );
    Ok(Statement::new(text, sql.params))
}

fn delete_statement(entity: &EntityDescriptor, identity: &Identity) -> Statement {
    let mut sql = SqlBuilder::new();
    let clause = sql.identity(identity);
    let text = format!(
        "DELETE FROM {} WHERE {} RETURNING {}",
        quote(entity.name),
        clause,
        column_list(entity)
    );
    Statement::new(text, sql.params)
}

/// Decode rows read through [`select_matching`], keeping those `filter`
/// matches
fn decode_matching(
    entity: &EntityDescriptor,
    filter: &FilterNode,
    rows: &[SqliteRow],
) -> Result<Vec<Record>, BackendError> {
    let mut records = rows
        .iter()
        .map(|r| row::decode(entity, r))
        .collect::<Result<Vec<_>, _>>()?;
    if !exact(entity, filter) {
        records.retain(|r| filter.matches(r));
    }
    Ok(records)
}

fn decode_one(entity: &EntityDescriptor, row: Option<SqliteRow>) -> Result<Option<Record>, BackendError> {
    row.map(|r| row::decode(entity, &r)).transpose()
}

// ============================================================================
// Error mapping
// ============================================================================

/// Translate a driver error into the backend error vocabulary
fn map_err(e: sqlx::Error) -> BackendError {
    match &e {
        sqlx::Error::Database(db) => {
            let message = db.message();
            if db.is_unique_violation() || message.starts_with(UNIQUE_FAILED) {
                return BackendError::UniqueConstraintViolation {
                    field: unique_field(message),
                };
            }
            // SQLITE_BUSY, SQLITE_LOCKED and their extended codes
            if matches!(db.code().as_deref(), Some("5" | "6" | "261" | "262" | "517")) {
                return BackendError::Unavailable {
                    reason: message.to_string(),
                };
            }
            BackendError::query(message)
        }
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => BackendError::Unavailable {
            reason: e.to_string(),
        },
        _ => BackendError::query(e.to_string()),
    }
}

const UNIQUE_FAILED: &str = "UNIQUE constraint failed: ";

/// `UNIQUE constraint failed: T.a, T.b` names the key `a,b`
fn unique_field(message: &str) -> String {
    message
        .strip_prefix(UNIQUE_FAILED)
        .unwrap_or(message)
        .split(", ")
        .map(|column| column.rsplit_once('.').map_or(column, |(_, name)| name))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn find_unique(
        &self,
        entity: &EntityDescriptor,
        identity: &Identity,
    ) -> Result<Option<Record>, BackendError> {
        let row = select_unique(entity, identity).fetch_optional(&self.pool).await?;
        decode_one(entity, row)
    }

    async fn find_many(
        &self,
        entity: &EntityDescriptor,
        plan: &QueryPlan,
    ) -> Result<Vec<Record>, BackendError> {
        self.window(entity, plan).await
    }

    async fn count(&self, entity: &EntityDescriptor, plan: &QueryPlan) -> Result<u64, BackendError> {
        if plan.is_empty_page() {
            return Ok(0);
        }
        if !plan.distinct.is_empty() || !Self::compiles(entity, plan) {
            return Ok(self.window(entity, plan).await?.len() as u64);
        }
        let Some(inner) = self.window_statement(entity, plan, "1", true).await? else {
            return Ok(0);
        };
        let statement = Statement::new(format!("SELECT COUNT(*) FROM ({})", inner.sql), inner.params);
        statement.fetch_count(&self.pool).await
    }

    async fn create(
        &self,
        entity: &EntityDescriptor,
        data: &CreateData,
    ) -> Result<Record, BackendError> {
        let row = insert_statement(entity, data, false)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| BackendError::query("INSERT returned no row"))?;
        row::decode(entity, &row)
    }

    async fn create_many(
        &self,
        entity: &EntityDescriptor,
        data: &[CreateData],
        skip_duplicates: bool,
    ) -> Result<u64, BackendError> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        let mut inserted = 0;
        for item in data {
            let result = insert_statement(entity, item, skip_duplicates)
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await.map_err(map_err)?;
        Ok(inserted)
    }

    async fn update(
        &self,
        entity: &EntityDescriptor,
        identity: &Identity,
        data: &UpdateData,
    ) -> Result<Record, BackendError> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        let row = select_unique(entity, identity).fetch_optional(&mut *tx).await?;
        let before = decode_one(entity, row)?.ok_or_else(|| BackendError::not_found(entity.name))?;
        let after = data.apply(&before)?;
        update_statement(entity, &before, &after, data)?
            .execute(&mut *tx)
            .await?;
        tx.commit().await.map_err(map_err)?;
        Ok(after)
    }

    async fn update_many(
        &self,
        entity: &EntityDescriptor,
        filter: &FilterNode,
        data: &UpdateData,
    ) -> Result<u64, BackendError> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        let rows = select_matching(entity, filter).fetch_all(&mut *tx).await?;
        let mut updated = 0;
        for before in decode_matching(entity, filter, &rows)? {
            let after = data.apply(&before)?;
            update_statement(entity, &before, &after, data)?
                .execute(&mut *tx)
                .await?;
            updated += 1;
        }
        tx.commit().await.map_err(map_err)?;
        Ok(updated)
    }

    async fn upsert(
        &self,
        entity: &EntityDescriptor,
        identity: &Identity,
        create: &CreateData,
        update: &UpdateData,
    ) -> Result<Record, BackendError> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        let row = select_unique(entity, identity).fetch_optional(&mut *tx).await?;
        let record = match decode_one(entity, row)? {
            Some(before) if update.is_empty() => before,
            Some(before) => {
                let after = update.apply(&before)?;
                update_statement(entity, &before, &after, update)?
                    .execute(&mut *tx)
                    .await?;
                after
            }
            None => {
                let row = insert_statement(entity, create, false)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| BackendError::query("INSERT returned no row"))?;
                row::decode(entity, &row)?
            }
        };
        tx.commit().await.map_err(map_err)?;
        Ok(record)
    }

    async fn delete(
        &self,
        entity: &EntityDescriptor,
        identity: &Identity,
    ) -> Result<Record, BackendError> {
        let row = delete_statement(entity, identity)
            .fetch_optional(&self.pool)
            .await?;
        decode_one(entity, row)?.ok_or_else(|| BackendError::not_found(entity.name))
    }

    async fn delete_many(
        &self,
        entity: &EntityDescriptor,
        filter: &FilterNode,
    ) -> Result<u64, BackendError> {
        if exact(entity, filter) {
            let mut sql = SqlBuilder::new();
            let mut text = format!("DELETE FROM {}", quote(entity.name));
            if !filter.is_always() {
                text.push_str(" WHERE ");
                text.push_str(&sql.filter(entity, filter));
            }
            let result = Statement::new(text, sql.params).execute(&self.pool).await?;
            return Ok(result.rows_affected());
        }

        let mut tx = self.pool.begin().await.map_err(map_err)?;
        let rows = select_matching(entity, filter).fetch_all(&mut *tx).await?;
        let mut deleted = 0;
        for record in decode_matching(entity, filter, &rows)? {
            let identity = Identity::of(&record, &entity.identity)
                .ok_or_else(|| BackendError::query(format!("{} row without identity", entity.name)))?;
            if delete_statement(entity, &identity)
                .fetch_optional(&mut *tx)
                .await?
                .is_some()
            {
                deleted += 1;
            }
        }
        tx.commit().await.map_err(map_err)?;
        Ok(deleted)
    }

    async fn aggregate(
        &self,
        entity: &EntityDescriptor,
        query: &AggregateQuery,
    ) -> Result<AggregateValues, BackendError> {
        let rows = self.window(entity, &query.plan).await?;
        aggregate::evaluate(&query.selection, &rows)
    }

    async fn group_by(
        &self,
        entity: &EntityDescriptor,
        query: &GroupByQuery,
    ) -> Result<Vec<GroupRow>, BackendError> {
        let rows = self.matching(entity, &query.filter).await?;
        aggregate::group(query, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_field_from_message() {
        assert_eq!(unique_field("UNIQUE constraint failed: Users.Username"), "Username");
        assert_eq!(
            unique_field("UNIQUE constraint failed: ControlPresets.MonitorId, ControlPresets.Preset"),
            "MonitorId,Preset"
        );
    }
}
