//! zmdata - typed CRUD data layer for the ZoneMinder schema
//!
//! Every ZoneMinder table is described once in [`schema::zoneminder`]. A
//! single [`mediator::Mediator`] validates requests against those
//! descriptors and hands each one to a [`backend::Backend`] as exactly one
//! call.
//!
//! ```text
//! Request ─→ registry ─→ filters / mutation / query / aggregate ─→ Backend
//!                              (validate + plan)                  memory | sqlite
//! ```

pub mod aggregate;
pub mod backend;
pub mod config;
pub mod error;
pub mod filters;
pub mod mediator;
pub mod mutation;
pub mod query;
pub mod record;
pub mod schema;
pub mod value;

pub use backend::{Backend, MemoryBackend};
pub use error::{BackendError, MediatorError, ValidationError};
pub use mediator::{Mediator, Outcome, Request};
pub use record::{Identity, Record};
pub use schema::{EntityDescriptor, EntityRegistry};
pub use value::Value;
