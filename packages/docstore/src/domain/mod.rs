//! Domain layer
//!
//! # Domain Models
//!
//! - `EntityKind`, `Scope`, `EntityId`, `Container`: document addressing
//! - `SchemaRegistry` / `Template`: current default document per (scope, kind)
//! - `merge_documents`: template-driven migration of stale documents
//! - `Filter`: equality query filters
//!
//! # Port Trait
//!
//! - `DocumentBackend`: uniform contract every storage adapter implements

pub mod filter;
pub mod merge;
pub mod models;
pub mod ports;
pub mod schema;

pub use filter::Filter;
pub use merge::merge_documents;
pub use models::{
    document_id, document_version, stamp_id, stamp_version, Container, Document, EntityId,
    EntityKind, Scope, GLOBAL_COLLECTION, ID_FIELD, VERSION_FIELD,
};
pub use ports::{resolve, DocumentBackend, DocumentCursor, Resolution};
pub use schema::{SchemaRegistry, SchemaRegistryBuilder, Template};
