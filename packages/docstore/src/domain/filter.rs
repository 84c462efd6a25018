//! Equality filters for `query`

use serde_json::Value;

use super::models::Document;

/// Conjunction of `field == value` clauses
///
/// Field names may be dotted paths into nested mappings
/// (`player_controller.skin`). An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    /// Filter matching everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Add an equality clause
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    /// Build from a mapping of field → expected value
    pub fn from_document(doc: &Document) -> Self {
        Self {
            clauses: doc.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses
            .iter()
            .all(|(field, expected)| lookup(doc, field) == Some(expected))
    }

    /// Nested-object form of the clauses, e.g. `{"a": {"b": 1}}` for `a.b == 1`.
    ///
    /// Used by SQL backends as a containment pre-filter; the final decision
    /// is always [`Filter::matches`].
    pub fn to_containment(&self) -> Value {
        let mut root = Document::new();
        for (field, expected) in &self.clauses {
            insert_path(&mut root, field, expected.clone());
        }
        Value::Object(root)
    }
}

fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn insert_path(root: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            root.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = root
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !child.is_object() {
                *child = Value::Object(Document::new());
            }
            if let Value::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_empty_filter_matches_all() {
        assert!(Filter::all().matches(&doc(json!({}))));
        assert!(Filter::all().matches(&doc(json!({"x": 1}))));
    }

    #[test]
    fn test_top_level_equality() {
        let d = doc(json!({"prefix": "!!", "global_skin": false}));
        assert!(Filter::all().eq("prefix", "!!").matches(&d));
        assert!(!Filter::all().eq("prefix", "?").matches(&d));
        assert!(!Filter::all().eq("missing", Value::Null).matches(&d));
    }

    #[test]
    fn test_conjunction() {
        let d = doc(json!({"prefix": "!!", "global_skin": true}));
        let f = Filter::all().eq("prefix", "!!").eq("global_skin", false);
        assert!(!f.matches(&d));
    }

    #[test]
    fn test_dotted_path() {
        let d = doc(json!({"player_controller": {"skin": "classic", "channel": 9}}));
        assert!(Filter::all().eq("player_controller.skin", "classic").matches(&d));
        assert!(!Filter::all().eq("player_controller.skin.name", "classic").matches(&d));
    }

    #[test]
    fn test_from_document() {
        let f = Filter::from_document(&doc(json!({"token": ""})));
        assert_eq!(f.clauses().len(), 1);
        assert!(f.matches(&doc(json!({"token": "", "ver": 1.1}))));
    }

    #[test]
    fn test_to_containment() {
        let f = Filter::all()
            .eq("prefix", "!!")
            .eq("player_controller.skin", "classic")
            .eq("player_controller.channel", 3);
        assert_eq!(
            f.to_containment(),
            json!({"prefix": "!!", "player_controller": {"skin": "classic", "channel": 3}})
        );
    }
}
