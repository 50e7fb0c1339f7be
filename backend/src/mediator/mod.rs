//! CRUD mediator
//!
//! Turns one inbound [`Request`] into exactly one [`Backend`] call:
//!
//! 1. look up the entity descriptor
//! 2. parse the operation and validate its arguments against the descriptor
//! 3. plan reads (pagination, ordering, cursor)
//! 4. dispatch to the backend on a spawned task
//! 5. complete returned records with declared defaults
//!
//! Validation failures and cancellation never reach the backend. Backend
//! failures are passed through unchanged; the mediator never retries.

pub mod state;

pub use state::{Lifecycle, Phase};

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;

use crate::aggregate::{AggregateArgs, AggregateQuery, AggregateValues, GroupByArgs, GroupByQuery, GroupRow};
use crate::backend::Backend;
use crate::error::{BackendError, MediatorError, Result, ValidationError};
use crate::filters::{FilterNode, validate_filter};
use crate::mutation::{
    CreateData, UpdateData, validate_create, validate_identity, validate_update, validate_upsert,
};
use crate::query::{FindManyArgs, QueryArgs, QueryLimits, QueryPlan, plan_find, plan_window};
use crate::record::{Identity, Record};
use crate::schema::{EntityDescriptor, EntityRegistry};

// ============================================================================
// Inbound shapes
// ============================================================================

/// One inbound operation on one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub entity: String,
    pub operation: String,
    #[serde(default)]
    pub args: JsonValue,
}

impl Request {
    pub fn new(entity: impl Into<String>, operation: impl Into<String>, args: JsonValue) -> Self {
        Self {
            entity: entity.into(),
            operation: operation.into(),
            args,
        }
    }
}

/// Arguments addressing one row.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhereUniqueArgs {
    #[serde(rename = "where")]
    pub filter: JsonValue,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateArgs {
    pub data: JsonValue,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateManyArgs {
    pub data: Vec<JsonValue>,
    #[serde(default)]
    pub skip_duplicates: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateArgs {
    #[serde(rename = "where")]
    pub filter: JsonValue,
    pub data: JsonValue,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateManyArgs {
    #[serde(rename = "where", default)]
    pub filter: Option<JsonValue>,
    pub data: JsonValue,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpsertArgs {
    #[serde(rename = "where")]
    pub filter: JsonValue,
    pub create: JsonValue,
    pub update: JsonValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteManyArgs {
    #[serde(rename = "where", default)]
    pub filter: Option<JsonValue>,
}

/// A parsed operation with its raw, not yet validated, arguments.
#[derive(Debug, Clone)]
pub enum Operation {
    FindUnique(WhereUniqueArgs),
    FindUniqueOrThrow(WhereUniqueArgs),
    FindFirst(FindManyArgs),
    FindMany(FindManyArgs),
    Count(FindManyArgs),
    Create(CreateArgs),
    CreateMany(CreateManyArgs),
    Update(UpdateArgs),
    UpdateMany(UpdateManyArgs),
    Upsert(UpsertArgs),
    Delete(WhereUniqueArgs),
    DeleteMany(DeleteManyArgs),
    Aggregate(AggregateArgs),
    GroupBy(GroupByArgs),
}

impl Operation {
    /// Parse an operation name (aliases included) and its arguments. Absent
    /// or null arguments read as `{}`.
    pub fn from_parts(name: &str, args: JsonValue) -> Result<Self, ValidationError> {
        let args = match args {
            JsonValue::Null => JsonValue::Object(Default::default()),
            other => other,
        };
        Ok(match name {
            "findUnique" | "findOne" => Operation::FindUnique(parse(name, args)?),
            "findUniqueOrThrow" => Operation::FindUniqueOrThrow(parse(name, args)?),
            "findFirst" => Operation::FindFirst(parse(name, args)?),
            "findMany" | "findAll" => Operation::FindMany(parse(name, args)?),
            "count" => Operation::Count(parse(name, args)?),
            "create" => Operation::Create(parse(name, args)?),
            "createMany" => Operation::CreateMany(parse(name, args)?),
            "update" => Operation::Update(parse(name, args)?),
            "updateMany" => Operation::UpdateMany(parse(name, args)?),
            "upsert" => Operation::Upsert(parse(name, args)?),
            "delete" | "remove" => Operation::Delete(parse(name, args)?),
            "deleteMany" => Operation::DeleteMany(parse(name, args)?),
            "aggregate" => Operation::Aggregate(parse(name, args)?),
            "groupBy" => Operation::GroupBy(parse(name, args)?),
            other => {
                return Err(ValidationError::arguments(format!("unknown operation '{}'", other)));
            }
        })
    }

    /// Canonical operation name
    pub fn name(&self) -> &'static str {
        match self {
            Operation::FindUnique(_) => "findUnique",
            Operation::FindUniqueOrThrow(_) => "findUniqueOrThrow",
            Operation::FindFirst(_) => "findFirst",
            Operation::FindMany(_) => "findMany",
            Operation::Count(_) => "count",
            Operation::Create(_) => "create",
            Operation::CreateMany(_) => "createMany",
            Operation::Update(_) => "update",
            Operation::UpdateMany(_) => "updateMany",
            Operation::Upsert(_) => "upsert",
            Operation::Delete(_) => "delete",
            Operation::DeleteMany(_) => "deleteMany",
            Operation::Aggregate(_) => "aggregate",
            Operation::GroupBy(_) => "groupBy",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Operation::FindUnique(_)
                | Operation::FindUniqueOrThrow(_)
                | Operation::FindFirst(_)
                | Operation::FindMany(_)
                | Operation::Count(_)
                | Operation::Aggregate(_)
                | Operation::GroupBy(_)
        )
    }

    /// Validate the arguments against `entity` and plan reads
    fn validate(self, entity: &EntityDescriptor, limits: &QueryLimits) -> Result<Command, ValidationError> {
        let filter = |raw: Option<&JsonValue>| {
            validate_filter(entity, raw.unwrap_or(&JsonValue::Null), limits.max_filter_depth)
        };

        Ok(match self {
            Operation::FindUnique(args) => Command::FindUnique {
                identity: validate_identity(entity, &args.filter)?,
                or_throw: false,
            },
            Operation::FindUniqueOrThrow(args) => Command::FindUnique {
                identity: validate_identity(entity, &args.filter)?,
                or_throw: true,
            },
            Operation::FindFirst(mut args) => {
                args.take.get_or_insert(1);
                let query = QueryArgs::validate(entity, &args, limits)?;
                Command::FindMany {
                    plan: plan_find(entity, query, limits)?,
                    first: true,
                }
            }
            Operation::FindMany(args) => {
                let query = QueryArgs::validate(entity, &args, limits)?;
                Command::FindMany {
                    plan: plan_find(entity, query, limits)?,
                    first: false,
                }
            }
            Operation::Count(args) => {
                let query = QueryArgs::validate(entity, &args, limits)?;
                Command::Count(plan_window(entity, query, limits)?)
            }
            Operation::Create(args) => Command::Create(validate_create(entity, &args.data)?),
            Operation::CreateMany(args) => Command::CreateMany {
                data: args
                    .data
                    .iter()
                    .map(|item| validate_create(entity, item))
                    .collect::<Result<_, _>>()?,
                skip_duplicates: args.skip_duplicates,
            },
            Operation::Update(args) => Command::Update {
                identity: validate_identity(entity, &args.filter)?,
                data: validate_update(entity, &args.data)?,
            },
            Operation::UpdateMany(args) => Command::UpdateMany {
                filter: filter(args.filter.as_ref())?,
                data: validate_update(entity, &args.data)?,
            },
            Operation::Upsert(args) => {
                let (identity, create, update) =
                    validate_upsert(entity, &args.filter, &args.create, &args.update)?;
                Command::Upsert {
                    identity,
                    create,
                    update,
                }
            }
            Operation::Delete(args) => Command::Delete(validate_identity(entity, &args.filter)?),
            Operation::DeleteMany(args) => Command::DeleteMany(filter(args.filter.as_ref())?),
            Operation::Aggregate(args) => Command::Aggregate(args.validate(entity, limits)?),
            Operation::GroupBy(args) => Command::GroupBy(args.validate(entity, limits)?),
        })
    }
}

fn parse<T: DeserializeOwned>(operation: &str, args: JsonValue) -> Result<T, ValidationError> {
    serde_json::from_value(args)
        .map_err(|e| ValidationError::arguments(format!("{} arguments: {}", operation, e)))
}

// ============================================================================
// Validated commands
// ============================================================================

/// A fully validated operation: one backend call away from its outcome.
#[derive(Debug, Clone)]
enum Command {
    FindUnique { identity: Identity, or_throw: bool },
    FindMany { plan: QueryPlan, first: bool },
    Count(QueryPlan),
    Create(CreateData),
    CreateMany { data: Vec<CreateData>, skip_duplicates: bool },
    Update { identity: Identity, data: UpdateData },
    UpdateMany { filter: FilterNode, data: UpdateData },
    Upsert { identity: Identity, create: CreateData, update: UpdateData },
    Delete(Identity),
    DeleteMany(FilterNode),
    Aggregate(AggregateQuery),
    GroupBy(GroupByQuery),
}

impl Command {
    async fn run(self, backend: &dyn Backend, entity: &EntityDescriptor) -> Result<Outcome, BackendError> {
        let complete = |record: Record| entity.complete_record(record);

        Ok(match self {
            Command::FindUnique { identity, or_throw } => {
                match backend.find_unique(entity, &identity).await? {
                    Some(record) => Outcome::Record(Some(complete(record))),
                    None if or_throw => return Err(BackendError::not_found(entity.name)),
                    None => Outcome::Record(None),
                }
            }
            Command::FindMany { plan, first } => {
                let rows = backend.find_many(entity, &plan).await?;
                let mut rows = rows.into_iter().map(complete);
                if first {
                    Outcome::Record(rows.next())
                } else {
                    Outcome::Records(rows.collect())
                }
            }
            Command::Count(plan) => Outcome::Count(backend.count(entity, &plan).await?),
            Command::Create(data) => Outcome::Record(Some(complete(backend.create(entity, &data).await?))),
            Command::CreateMany {
                data,
                skip_duplicates,
            } => Outcome::Batch {
                count: backend.create_many(entity, &data, skip_duplicates).await?,
            },
            Command::Update { identity, data } => {
                Outcome::Record(Some(complete(backend.update(entity, &identity, &data).await?)))
            }
            Command::UpdateMany { filter, data } => Outcome::Batch {
                count: backend.update_many(entity, &filter, &data).await?,
            },
            Command::Upsert {
                identity,
                create,
                update,
            } => Outcome::Record(Some(complete(
                backend.upsert(entity, &identity, &create, &update).await?,
            ))),
            Command::Delete(identity) => {
                Outcome::Record(Some(complete(backend.delete(entity, &identity).await?)))
            }
            Command::DeleteMany(filter) => Outcome::Batch {
                count: backend.delete_many(entity, &filter).await?,
            },
            Command::Aggregate(query) => Outcome::Aggregate(backend.aggregate(entity, &query).await?),
            Command::GroupBy(query) => Outcome::Groups(backend.group_by(entity, &query).await?),
        })
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Result of a completed operation, serialized without a tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    /// findUnique, findFirst, create, update, upsert, delete
    Record(Option<Record>),
    /// findMany
    Records(Vec<Record>),
    /// count
    Count(u64),
    /// createMany, updateMany, deleteMany
    Batch { count: u64 },
    Aggregate(AggregateValues),
    Groups(Vec<GroupRow>),
}

impl Outcome {
    pub fn into_record(self) -> Option<Record> {
        match self {
            Outcome::Record(record) => record,
            _ => None,
        }
    }

    pub fn into_records(self) -> Option<Vec<Record>> {
        match self {
            Outcome::Records(records) => Some(records),
            _ => None,
        }
    }

    /// Row count of a count or batch outcome
    pub fn count(&self) -> Option<u64> {
        match self {
            Outcome::Count(count) | Outcome::Batch { count } => Some(*count),
            _ => None,
        }
    }

    pub fn into_aggregate(self) -> Option<AggregateValues> {
        match self {
            Outcome::Aggregate(values) => Some(values),
            _ => None,
        }
    }

    pub fn into_groups(self) -> Option<Vec<GroupRow>> {
        match self {
            Outcome::Groups(groups) => Some(groups),
            _ => None,
        }
    }
}

// ============================================================================
// Mediator
// ============================================================================

/// Stateless dispatcher from requests to one backend.
#[derive(Clone)]
pub struct Mediator {
    registry: Arc<EntityRegistry>,
    backend: Arc<dyn Backend>,
    limits: QueryLimits,
}

impl Mediator {
    pub fn new(registry: Arc<EntityRegistry>, backend: Arc<dyn Backend>) -> Self {
        Self {
            registry,
            backend,
            limits: QueryLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    /// Execute one request
    pub async fn execute(&self, request: Request) -> Result<Outcome> {
        self.execute_with_cancel(request, &CancellationToken::new()).await
    }

    /// Execute one request unless `cancel` fires before dispatch. Once
    /// dispatched, the backend call runs to completion on its own task even
    /// if this future is dropped.
    pub async fn execute_with_cancel(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let mut lifecycle = Lifecycle::new(request.entity.as_str(), request.operation.as_str());
        if cancel.is_cancelled() {
            return Err(lifecycle.fail(MediatorError::Cancelled));
        }

        let (entity, command) = match self.prepare(request) {
            Ok(prepared) => prepared,
            Err(e) => return Err(lifecycle.fail(e)),
        };
        lifecycle.advance(Phase::Validated)?;
        self.dispatch(&mut lifecycle, entity, command, cancel).await
    }

    fn prepare(&self, request: Request) -> Result<(Arc<EntityDescriptor>, Command)> {
        let entity = Arc::clone(self.registry.describe(&request.entity)?);
        let operation = Operation::from_parts(&request.operation, request.args)?;
        let command = operation.validate(&entity, &self.limits)?;
        Ok((entity, command))
    }

    /// Hand a validated command to the backend. The cancellation check here
    /// is the last point at which no backend call has been issued.
    async fn dispatch(
        &self,
        lifecycle: &mut Lifecycle,
        entity: Arc<EntityDescriptor>,
        command: Command,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        if cancel.is_cancelled() {
            return Err(lifecycle.fail(MediatorError::Cancelled));
        }
        lifecycle.advance(Phase::Dispatched)?;

        let backend = Arc::clone(&self.backend);
        let task = tokio::spawn(async move { command.run(backend.as_ref(), &entity).await });
        let result = match task.await {
            Ok(result) => result.map_err(MediatorError::from),
            Err(e) => Err(MediatorError::Internal {
                reason: format!("backend task failed: {}", e),
            }),
        };

        match result {
            Ok(outcome) => {
                lifecycle.advance(Phase::Completed)?;
                Ok(outcome)
            }
            Err(e) => Err(lifecycle.fail(e)),
        }
    }
}
