//! API layer - Store Façade

pub mod document_store;

pub use document_store::{DocumentStore, MessageContext, Prefix, FALLBACK_PREFIX};
