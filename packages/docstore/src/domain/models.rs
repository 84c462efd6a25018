//! Domain models: entity kinds, scopes, identifiers and documents

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored configuration document.
///
/// Leaves are scalars (null, bool, number, string), `Value::Array` is a
/// sequence and `Value::Object` a nested mapping.
pub type Document = Map<String, Value>;

/// Identity field every stored document carries
pub const ID_FIELD: &str = "_id";

/// Schema version field every stored document carries
pub const VERSION_FIELD: &str = "ver";

/// Collection name conventionally used for cross-deployment data
pub const GLOBAL_COLLECTION: &str = "global";

// ═══════════════════════════════════════════════════════════════════════════
// EntityKind
// ═══════════════════════════════════════════════════════════════════════════

/// Category of a stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Per-group documents
    Guilds,
    /// Per-individual documents
    Users,
    /// Internal catch-all (global scope only)
    Default,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Guilds, EntityKind::Users, EntityKind::Default];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Guilds => "guilds",
            EntityKind::Users => "users",
            EntityKind::Default => "default",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guilds" => Ok(EntityKind::Guilds),
            "users" => Ok(EntityKind::Users),
            "default" => Ok(EntityKind::Default),
            other => Err(format!("unknown entity kind '{}'", other)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Scope
// ═══════════════════════════════════════════════════════════════════════════

/// Storage partition selecting which template registry applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Data owned by a single deployment
    Local,
    /// Data shared across deployments
    Global,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Local => "local",
            Scope::Global => "global",
        }
    }

    /// Scope implied by a collection name (`"global"` is the shared one)
    pub fn for_collection(collection: &str) -> Self {
        if collection == GLOBAL_COLLECTION {
            Scope::Global
        } else {
            Scope::Local
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// EntityId
// ═══════════════════════════════════════════════════════════════════════════

/// Caller-supplied identifier, stored stringified as `_id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&EntityId> for EntityId {
    fn from(id: &EntityId) -> Self {
        id.clone()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Container
// ═══════════════════════════════════════════════════════════════════════════

/// Physical address of a set of documents: (collection, kind)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Container {
    pub collection: String,
    pub kind: EntityKind,
}

impl Container {
    pub fn new(collection: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            collection: collection.into(),
            kind,
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.kind)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Document helpers
// ═══════════════════════════════════════════════════════════════════════════

/// `_id` of a document, if it carries a string one
pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// Stored schema version. Missing or non-numeric `ver` reads as `0.0`.
pub fn document_version(doc: &Document) -> f64 {
    doc.get(VERSION_FIELD).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Overwrite `_id` with the stringified identifier
pub fn stamp_id(doc: &mut Document, id: &str) {
    doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
}

/// Overwrite `ver` with the given version
pub fn stamp_version(doc: &mut Document, version: f64) {
    let value = serde_json::Number::from_f64(version)
        .map(Value::Number)
        .unwrap_or(Value::Null);
    doc.insert(VERSION_FIELD.to_string(), value);
}
