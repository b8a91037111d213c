//! In-memory object store for MockClusterClient

use crate::document::Document;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

type ObjectKey = (String, String, String);

#[derive(Debug, Default)]
pub(crate) struct ObjectStore {
    objects: BTreeMap<ObjectKey, Value>,
    next_version: u64,
}

impl ObjectStore {
    pub(crate) fn get(&self, resource: &str, namespace: &str, name: &str) -> Option<Value> {
        self.objects
            .get(&(resource.to_string(), namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Objects of `resource` in `namespace`; an empty namespace lists all
    pub(crate) fn list(&self, resource: &str, namespace: &str) -> Vec<Value> {
        self.objects
            .iter()
            .filter(|((r, ns, _), _)| r == resource && (namespace.is_empty() || ns == namespace))
            .map(|(_, value)| value.clone())
            .collect()
    }

    /// Stores `value`, stamping namespace and a fresh resource version
    pub(crate) fn put(&mut self, resource: &str, namespace: &str, value: Value) -> Value {
        self.next_version += 1;
        let mut doc = Document::new(value);
        if !namespace.is_empty() {
            doc.set_namespace(namespace);
        }
        doc.set_resource_version(&self.next_version.to_string());
        let key = (resource.to_string(), namespace.to_string(), doc.name().to_string());
        let value = doc.into_value();
        self.objects.insert(key, value.clone());
        value
    }

    pub(crate) fn remove(&mut self, resource: &str, namespace: &str, name: &str) -> Option<Value> {
        self.objects
            .remove(&(resource.to_string(), namespace.to_string(), name.to_string()))
    }
}

/// RFC 7386 JSON merge patch
pub(crate) fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                apply_merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// Equality-only label selector: `k=v,k2=v2`
pub(crate) fn selector_matches(selector: &str, doc: &Document) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => doc.label(key.trim()) == Some(value.trim()),
            None => doc.label(term).is_some(),
        })
}
