//! Structural Merge Engine
//!
//! Upgrades a stored document to the shape of a newer template.
//!
//! # Rules
//!
//! Walking every key `k` of the template:
//!
//! - mapping → recurse with the stored sub-document (`{}` if absent or not a mapping)
//! - sequence → keep the stored value untouched; if the stored document has
//!   no value, the key stays absent
//! - scalar → take the **template's** value
//!
//! Keys that only exist in the stored document are dropped.
//!
//! # Known quirks
//!
//! Scalars are overwritten by the template and sequences are never re-seeded
//! once a document exists. `ver` and `_id` are not special-cased here;
//! callers re-stamp them after merging.

use serde_json::Value;

use super::models::Document;

/// Merge `existing` into the shape of `template`
///
/// # Examples
///
/// ```rust
/// use docstore::domain::merge_documents;
/// use serde_json::json;
///
/// let template = json!({"ver": 1.2, "prefix": "", "custom_skins": {}});
/// let stored = json!({"_id": "1", "ver": 1.0, "prefix": "!!"});
///
/// let merged = merge_documents(
///     template.as_object().unwrap(),
///     stored.as_object().unwrap(),
/// );
/// assert_eq!(serde_json::Value::Object(merged), json!({"ver": 1.2, "prefix": "", "custom_skins": {}}));
/// ```
pub fn merge_documents(template: &Document, existing: &Document) -> Document {
    let empty = Document::new();
    let mut merged = Document::new();

    for (key, default) in template {
        match default {
            Value::Object(default_sub) => {
                let existing_sub = existing
                    .get(key)
                    .and_then(Value::as_object)
                    .unwrap_or(&empty);
                merged.insert(
                    key.clone(),
                    Value::Object(merge_documents(default_sub, existing_sub)),
                );
            }
            Value::Array(_) => {
                if let Some(current) = existing.get(key) {
                    merged.insert(key.clone(), current.clone());
                }
            }
            scalar => {
                merged.insert(key.clone(), scalar.clone());
            }
        }
    }

    merged
}
