//! Schema layer
//!
//! Holds the declarative description of every entity:
//! - [`EntityDescriptor`] / [`FieldDef`] / [`ScalarKind`] - one table's shape
//! - [`EntityRegistry`] - descriptors addressable by name
//! - [`zoneminder`] - the ZoneMinder table, consumed by every generic layer

mod descriptor;
mod registry;
pub mod zoneminder;

pub use descriptor::{DefaultValue, EntityBuilder, EntityDescriptor, FieldDef, ScalarKind};
pub use registry::EntityRegistry;

use thiserror::Error;

/// Errors raised while defining or looking up entity descriptors.
///
/// These are programming-time errors: the schema is built once at startup
/// and any failure there is fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Entity not found: {entity}")]
    NotFound { entity: String },

    #[error("Entity {entity} is registered twice")]
    DuplicateEntity { entity: &'static str },

    #[error("Entity {entity} declares field {field} twice")]
    DuplicateField {
        entity: &'static str,
        field: &'static str,
    },

    #[error("Entity {entity} has no identity fields")]
    EmptyIdentity { entity: &'static str },

    #[error("Entity {entity} identity references unknown field {field}")]
    UnknownIdentityField {
        entity: &'static str,
        field: &'static str,
    },

    #[error("Entity {entity} identity field {field} is nullable")]
    NullableIdentity {
        entity: &'static str,
        field: &'static str,
    },

    #[error("Invalid default for {entity}.{field}: {reason}")]
    InvalidDefault {
        entity: &'static str,
        field: &'static str,
        reason: String,
    },
}
