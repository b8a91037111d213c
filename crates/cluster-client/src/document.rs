//! Addressable document
//!
//! Dynamic objects (subscriptions, compliance records, remediation targets)
//! are handled as JSON trees. `Document` wraps the tree and provides typed
//! accessors so callers never re-derive nested structure by hand.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A dynamic cluster object
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Value);

impl Document {
    /// Wraps a JSON value. Non-object values are replaced with an empty object.
    #[must_use]
    pub fn new(value: Value) -> Self {
        match value {
            Value::Object(_) => Self(value),
            _ => Self(Value::Object(Map::new())),
        }
    }

    /// Builds a document with `apiVersion`, `kind` and `metadata.name` set
    #[must_use]
    pub fn with_type(api_version: &str, kind: &str, name: &str) -> Self {
        let mut doc = Self::default();
        doc.set_nested(&["apiVersion"], Value::from(api_version));
        doc.set_nested(&["kind"], Value::from(kind));
        doc.set_name(name);
        doc
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Value at `path`, if every segment resolves
    #[must_use]
    pub fn nested(&self, path: &[&str]) -> Option<&Value> {
        path.iter().try_fold(&self.0, |current, key| current.get(*key))
    }

    /// String at `path`; `None` when absent or not a string
    #[must_use]
    pub fn nested_str(&self, path: &[&str]) -> Option<&str> {
        self.nested(path).and_then(Value::as_str)
    }

    /// String at `path`, or empty
    #[must_use]
    pub fn nested_string(&self, path: &[&str]) -> String {
        self.nested_str(path).unwrap_or_default().to_string()
    }

    #[must_use]
    pub fn nested_bool(&self, path: &[&str]) -> Option<bool> {
        self.nested(path).and_then(Value::as_bool)
    }

    /// Array at `path`; empty when absent
    #[must_use]
    pub fn nested_slice(&self, path: &[&str]) -> &[Value] {
        self.nested(path)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Embedded object at `path` as its own document
    #[must_use]
    pub fn nested_document(&self, path: &[&str]) -> Option<Document> {
        self.nested(path)
            .filter(|value| value.is_object())
            .cloned()
            .map(Document)
    }

    /// Sets `value` at `path`, creating intermediate objects and replacing
    /// any non-object value found on the way.
    pub fn set_nested(&mut self, path: &[&str], value: Value) {
        if path.is_empty() {
            return;
        }
        insert_path(&mut self.0, path, value);
    }

    /// Removes the value at `path`
    pub fn remove_nested(&mut self, path: &[&str]) -> Option<Value> {
        let (last, parents) = path.split_last()?;
        let mut current = &mut self.0;
        for key in parents {
            current = current.get_mut(*key)?;
        }
        current.as_object_mut()?.remove(*last)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.nested_str(&["metadata", "name"]).unwrap_or_default()
    }

    pub fn set_name(&mut self, name: &str) {
        self.set_nested(&["metadata", "name"], Value::from(name));
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.nested_str(&["metadata", "namespace"])
            .filter(|ns| !ns.is_empty())
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.set_nested(&["metadata", "namespace"], Value::from(namespace));
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        self.nested_str(&["kind"]).unwrap_or_default()
    }

    #[must_use]
    pub fn api_version(&self) -> &str {
        self.nested_str(&["apiVersion"]).unwrap_or_default()
    }

    #[must_use]
    pub fn resource_version(&self) -> Option<&str> {
        self.nested_str(&["metadata", "resourceVersion"])
    }

    pub fn set_resource_version(&mut self, version: &str) {
        self.set_nested(&["metadata", "resourceVersion"], Value::from(version));
    }

    /// `metadata.labels` as an ordered map; non-string values are skipped
    #[must_use]
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.string_map(&["metadata", "labels"])
    }

    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.nested(&["metadata", "labels", key]).and_then(Value::as_str)
    }

    #[must_use]
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.string_map(&["metadata", "annotations"])
    }

    fn string_map(&self, path: &[&str]) -> BTreeMap<String, String> {
        self.nested(path)
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn insert_path(target: &mut Value, path: &[&str], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        *target = value;
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        let child = map.entry((*first).to_string()).or_insert(Value::Null);
        insert_path(child, rest, value);
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
