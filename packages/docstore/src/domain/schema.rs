//! Schema Registry
//!
//! Holds the current default document for every (scope, kind) pair.
//! Templates are append-only across releases: fields get added and `ver`
//! is bumped, existing fields stay.
//!
//! The registry is built once at startup and shared read-only; there is no
//! ambient global lookup.

use std::collections::HashMap;

use serde_json::{json, Value};

use super::models::{Document, EntityKind, Scope, VERSION_FIELD};
use crate::error::{Result, StorageError};

/// Default document plus its version
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    document: Document,
    version: f64,
}

impl Template {
    /// Build a template from a JSON object carrying a numeric `ver`
    pub fn from_value(value: Value) -> Result<Self> {
        let document = match value {
            Value::Object(map) => map,
            other => {
                return Err(StorageError::config(format!(
                    "template must be a mapping, got {}",
                    other
                )))
            }
        };
        let version = document
            .get(VERSION_FIELD)
            .and_then(Value::as_f64)
            .ok_or_else(|| StorageError::config("template is missing a numeric 'ver' field"))?;

        Ok(Self { document, version })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn version(&self) -> f64 {
        self.version
    }

    /// Fresh copy of the default document
    pub fn instantiate(&self) -> Document {
        self.document.clone()
    }
}

/// Immutable (scope, kind) → template lookup
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    templates: HashMap<(Scope, EntityKind), Template>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// Registry with the shipped templates for both scopes
    pub fn builtin() -> Self {
        let mut builder = Self::builder();
        for (scope, kind, value) in builtin_templates() {
            // Shipped templates are constants with a numeric `ver`.
            if let Ok(template) = Template::from_value(value) {
                builder.templates.insert((scope, kind), template);
            }
        }
        builder.build()
    }

    /// Current template for (scope, kind)
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::UnknownKind` if the pair is not registered
    pub fn default_for(&self, scope: Scope, kind: EntityKind) -> Result<&Template> {
        self.templates
            .get(&(scope, kind))
            .ok_or_else(|| StorageError::unknown_kind(scope, kind))
    }

    pub fn contains(&self, scope: Scope, kind: EntityKind) -> bool {
        self.templates.contains_key(&(scope, kind))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Builder collecting templates before the registry is frozen
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    templates: HashMap<(Scope, EntityKind), Template>,
}

impl SchemaRegistryBuilder {
    /// Register (or replace) the template for (scope, kind)
    pub fn register(mut self, scope: Scope, kind: EntityKind, template: Value) -> Result<Self> {
        let template = Template::from_value(template)?;
        self.templates.insert((scope, kind), template);
        Ok(self)
    }

    pub fn build(self) -> SchemaRegistry {
        SchemaRegistry {
            templates: self.templates,
        }
    }
}

fn builtin_templates() -> Vec<(Scope, EntityKind, Value)> {
    vec![
        (
            Scope::Local,
            EntityKind::Guilds,
            json!({
                "ver": 1.7,
                "player_controller": {
                    "channel": null,
                    "message_id": null,
                    "skin": null,
                    "static_skin": null,
                    "fav_links": {}
                },
                "check_other_bots_in_vc": false,
                "enable_prefixed_commands": true,
                "djroles": []
            }),
        ),
        (
            Scope::Local,
            EntityKind::Users,
            json!({
                "ver": 1.0,
                "fav_links": {}
            }),
        ),
        (
            Scope::Global,
            EntityKind::Users,
            json!({
                "ver": 1.1,
                "fav_links": {},
                "token": ""
            }),
        ),
        (
            Scope::Global,
            EntityKind::Guilds,
            json!({
                "ver": 1.2,
                "prefix": "",
                "global_skin": false,
                "player_skin": null,
                "player_skin_static": null,
                "custom_skins": {},
                "custom_skins_static": {}
            }),
        ),
        (
            Scope::Global,
            EntityKind::Default,
            json!({
                "ver": 1.0,
                "extra_tokens": {}
            }),
        ),
    ]
}
