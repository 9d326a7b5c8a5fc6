//! Helpers for editing JSON configuration documents inside migrations.
//!
//! Paths are dotted (`"turtle.maxIslands"`). Helpers that write create missing
//! intermediate objects; helpers that read or remove return `None`/`false`
//! when any segment is missing or is not an object.

use aethelon_domain::{
    MigrationHistoryEntry, SemanticVersion, CONFIG_VERSION_KEY, LEGACY_CONFIG_VERSION,
    MIGRATION_HISTORY_KEY,
};
use serde_json::{Map, Value};

use super::MigrationError;

/// Raw version string, if the document carries one
pub fn get_version(doc: &Value) -> Option<&str> {
    doc.get(CONFIG_VERSION_KEY).and_then(Value::as_str)
}

/// Parsed document version. Documents without the field are treated as the
/// legacy version; a present but malformed field is an error.
pub fn document_version(doc: &Value) -> Result<SemanticVersion, MigrationError> {
    match doc.get(CONFIG_VERSION_KEY) {
        None | Some(Value::Null) => Ok(LEGACY_CONFIG_VERSION),
        Some(Value::String(raw)) => {
            SemanticVersion::parse(raw).map_err(|source| MigrationError::InvalidVersion {
                value: raw.clone(),
                source,
            })
        }
        Some(other) => Err(MigrationError::InvalidVersion {
            value: other.to_string(),
            source: aethelon_domain::VersionError::InvalidFormat(
                "version field is not a string".to_string(),
            ),
        }),
    }
}

pub fn set_version(doc: &mut Value, version: &SemanticVersion) {
    if let Some(obj) = doc.as_object_mut() {
        obj.insert(
            CONFIG_VERSION_KEY.to_string(),
            Value::String(version.to_string()),
        );
    }
}

pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |node, key| node.get(key))
}

/// Object at `path`, created (along with any parents) if absent. Returns
/// `None` if an existing segment is not an object.
pub fn ensure_object<'a>(doc: &'a mut Value, path: &str) -> Option<&'a mut Map<String, Value>> {
    let mut node = doc;
    if !path.is_empty() {
        for key in path.split('.') {
            node = node
                .as_object_mut()?
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
    }
    node.as_object_mut()
}

fn split_parent(path: &str) -> (&str, &str) {
    match path.rsplit_once('.') {
        Some((parent, leaf)) => (parent, leaf),
        None => ("", path),
    }
}

fn parent_object_mut<'a>(doc: &'a mut Value, parent: &str) -> Option<&'a mut Map<String, Value>> {
    if parent.is_empty() {
        return doc.as_object_mut();
    }
    parent
        .split('.')
        .try_fold(doc, |node, key| node.get_mut(key))?
        .as_object_mut()
}

/// Insert `value` at `path` unless something is already there.
/// Returns true if the field was added.
pub fn add_field_if_missing(doc: &mut Value, path: &str, value: Value) -> bool {
    let (parent, leaf) = split_parent(path);
    let Some(obj) = ensure_object(doc, parent) else {
        return false;
    };
    if obj.contains_key(leaf) {
        return false;
    }
    obj.insert(leaf.to_string(), value);
    true
}

/// Overwrite (or create) the field at `path`.
pub fn set_field(doc: &mut Value, path: &str, value: Value) -> bool {
    let (parent, leaf) = split_parent(path);
    match ensure_object(doc, parent) {
        Some(obj) => {
            obj.insert(leaf.to_string(), value);
            true
        }
        None => false,
    }
}

pub fn remove_field(doc: &mut Value, path: &str) -> Option<Value> {
    let (parent, leaf) = split_parent(path);
    parent_object_mut(doc, parent)?.remove(leaf)
}

/// True when `set_field` could write `path`: every existing ancestor is an
/// object. Missing ancestors are fine since they get created.
fn is_writable(doc: &Value, path: &str) -> bool {
    let (parent, _) = split_parent(path);
    let mut node = doc;
    if !parent.is_empty() {
        for key in parent.split('.') {
            match node.as_object() {
                Some(obj) => match obj.get(key) {
                    Some(child) => node = child,
                    None => return true,
                },
                None => return false,
            }
        }
    }
    node.is_object()
}

/// Move a value between two dotted paths. Does nothing (and returns false)
/// if the source is missing, the destination is already occupied, or the
/// destination sits under a value that is not an object.
pub fn move_field(doc: &mut Value, from: &str, to: &str) -> bool {
    if get_path(doc, from).is_none() || get_path(doc, to).is_some() || !is_writable(doc, to) {
        return false;
    }
    match remove_field(doc, from) {
        Some(value) => set_field(doc, to, value),
        None => false,
    }
}

/// Rename a top-level or nested field within the same parent object.
pub fn rename_field(doc: &mut Value, path: &str, new_name: &str) -> bool {
    let (parent, _) = split_parent(path);
    let target = if parent.is_empty() {
        new_name.to_string()
    } else {
        format!("{}.{}", parent, new_name)
    };
    move_field(doc, path, &target)
}

/// Record an applied migration under `migrationHistory.<id>`.
///
/// A history field that is not an object is replaced so the entry is never
/// lost.
pub fn record_history(doc: &mut Value, id: &str, entry: &MigrationHistoryEntry) {
    let value = match serde_json::to_value(entry) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(migration = %id, error = %e, "Failed to serialize migration history entry");
            return;
        }
    };
    if let Some(obj) = doc.as_object_mut() {
        let history = obj
            .entry(MIGRATION_HISTORY_KEY.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !history.is_object() {
            tracing::warn!(
                migration = %id,
                found = %history,
                "Replacing malformed migration history"
            );
            *history = Value::Object(Map::new());
        }
        if let Some(history) = history.as_object_mut() {
            history.insert(id.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_version_is_legacy() {
        let doc = json!({});
        assert_eq!(document_version(&doc).unwrap(), LEGACY_CONFIG_VERSION);
    }

    #[test]
    fn test_malformed_version_fails() {
        let doc = json!({"configVersion": "one"});
        assert!(matches!(
            document_version(&doc),
            Err(MigrationError::InvalidVersion { .. })
        ));
        let doc = json!({"configVersion": 3});
        assert!(document_version(&doc).is_err());
    }

    #[test]
    fn test_add_field_if_missing_creates_parents() {
        let mut doc = json!({"turtle": {"maxIslands": 4}});
        assert!(add_field_if_missing(&mut doc, "turtle.speed", json!(0.2)));
        assert!(!add_field_if_missing(&mut doc, "turtle.maxIslands", json!(9)));
        assert!(add_field_if_missing(&mut doc, "dependencyInjection.enabled", json!(true)));
        assert_eq!(doc["turtle"]["maxIslands"], 4);
        assert_eq!(doc["dependencyInjection"]["enabled"], true);
    }

    #[test]
    fn test_add_field_refuses_non_object_parent() {
        let mut doc = json!({"turtle": 5});
        assert!(!add_field_if_missing(&mut doc, "turtle.speed", json!(1)));
        assert_eq!(doc["turtle"], 5);
    }

    #[test]
    fn test_rename_and_move() {
        let mut doc = json!({"enableDebugLogging": true, "a": {"b": 1}});
        assert!(rename_field(&mut doc, "enableDebugLogging", "debugMode"));
        assert_eq!(doc["debugMode"], true);
        assert!(doc.get("enableDebugLogging").is_none());

        assert!(move_field(&mut doc, "a.b", "c.d"));
        assert_eq!(doc["c"]["d"], 1);
        assert!(get_path(&doc, "a.b").is_none());

        // destination taken
        assert!(!move_field(&mut doc, "debugMode", "c.d"));
        assert_eq!(doc["debugMode"], true);
    }

    #[test]
    fn test_move_into_non_object_keeps_source() {
        let mut doc = json!({"a": 42, "b": 5});
        assert!(!move_field(&mut doc, "a", "b.c"));
        assert_eq!(doc, json!({"a": 42, "b": 5}));

        let mut doc = json!({"a": {"x": 1}, "b": [1, 2]});
        assert!(!move_field(&mut doc, "a.x", "b.y.z"));
        assert_eq!(doc["a"]["x"], 1);
    }

    #[test]
    fn test_move_into_missing_parents() {
        let mut doc = json!({"a": 42, "b": {}});
        assert!(move_field(&mut doc, "a", "b.c.d"));
        assert_eq!(doc, json!({"b": {"c": {"d": 42}}}));
    }

    #[test]
    fn test_get_version_raw_string() {
        assert_eq!(get_version(&json!({"configVersion": "1.2.0"})), Some("1.2.0"));
        assert_eq!(get_version(&json!({"configVersion": "not-a-version"})), Some("not-a-version"));
        assert_eq!(get_version(&json!({"configVersion": 3})), None);
        assert_eq!(get_version(&json!({})), None);
    }

    #[test]
    fn test_remove_missing_field_is_none() {
        let mut doc = json!({"a": 1});
        assert_eq!(remove_field(&mut doc, "x.y"), None);
        assert_eq!(remove_field(&mut doc, "a"), Some(json!(1)));
    }

    #[test]
    fn test_record_history() {
        let mut doc = json!({"configVersion": "1.0.0"});
        let entry = MigrationHistoryEntry {
            from: "0.9.0".into(),
            to: "1.0.0".into(),
            description: "d".into(),
            timestamp: "2024-01-01T00:00:00+00:00".into(),
        };
        record_history(&mut doc, "m1", &entry);
        assert_eq!(doc["migrationHistory"]["m1"]["from"], "0.9.0");
        assert_eq!(doc["migrationHistory"]["m1"]["to"], "1.0.0");
    }

    #[test]
    fn test_record_history_replaces_non_object_history() {
        let entry = MigrationHistoryEntry {
            from: "1.0.0".into(),
            to: "1.1.0".into(),
            description: "d".into(),
            timestamp: "2024-01-01T00:00:00+00:00".into(),
        };
        for malformed in [json!("oops"), json!([1, 2]), json!(null)] {
            let mut doc = json!({"configVersion": "1.0.0", "migrationHistory": malformed});
            record_history(&mut doc, "m2", &entry);
            assert_eq!(doc["migrationHistory"]["m2"]["to"], "1.1.0");
        }
    }
}
