//! In-memory object store.
//!
//! Objects are kept as JSON documents keyed by kind, namespace and name. The
//! store assigns UIDs and resource versions, rejects stale replaces, applies
//! status merge patches and can simulate owner-reference garbage collection.
//! Every write made through [`ObjectStore`] is recorded so tests can assert on
//! what the controller did.

use super::{ObjectStore, StoreFuture, StoredObject};
use crate::crd::{SqliteDatabase, SqliteDatabaseStatus};
use crate::error::{OperatorError, OperatorResult};
use kube::ResourceExt;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::future;

/// Store operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Read an object.
    Get,
    /// Create an object.
    Create,
    /// Replace an object.
    Replace,
    /// Patch the status subresource.
    PatchStatus,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verb::Get => write!(f, "get"),
            Verb::Create => write!(f, "create"),
            Verb::Replace => write!(f, "replace"),
            Verb::PatchStatus => write!(f, "patch_status"),
        }
    }
}

/// A write performed through the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// Operation.
    pub verb: Verb,
    /// Object kind.
    pub kind: String,
    /// Object name.
    pub name: String,
}

type Key = (String, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, Value>,
    writes: Vec<WriteRecord>,
    failures: HashSet<(Verb, String)>,
    next_id: u64,
}

impl State {
    fn check(&self, verb: Verb, kind: &str) -> OperatorResult<()> {
        if self.failures.contains(&(verb, kind.to_string())) {
            return Err(OperatorError::ApiError(format!(
                "injected {} failure for {}",
                verb, kind
            )));
        }
        Ok(())
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, verb: Verb, kind: &str, name: &str) {
        self.writes.push(WriteRecord {
            verb,
            kind: kind.to_string(),
            name: name.to_string(),
        });
    }

    fn insert<K: StoredObject>(&mut self, namespace: &str, object: &K) -> OperatorResult<K> {
        let kind = K::kind(&()).to_string();
        let name = object.name_any();
        let key = (kind.clone(), namespace.to_string(), name.clone());
        if self.objects.contains_key(&key) {
            return Err(OperatorError::AlreadyExists {
                kind,
                name,
                namespace: namespace.to_string(),
            });
        }

        let id = self.next_id();
        let mut stored = object.clone();
        let meta = stored.meta_mut();
        meta.namespace = Some(namespace.to_string());
        meta.uid = Some(format!("{:08x}-0000-4000-8000-000000000000", id));
        meta.resource_version = Some(id.to_string());
        meta.generation = Some(meta.generation.unwrap_or(1));

        self.objects.insert(key, serde_json::to_value(&stored)?);
        Ok(stored)
    }

    /// Store `value` over the existing document, bumping the resource version
    /// and, when the spec changed, the generation.
    fn overwrite(&mut self, key: &Key, mut value: Value) -> OperatorResult<Value> {
        let id = self.next_id();
        let existing = self.objects.get(key).ok_or_else(|| OperatorError::NotFound {
            kind: key.0.clone(),
            name: key.2.clone(),
            namespace: key.1.clone(),
        })?;

        let generation = existing["metadata"]["generation"].as_i64().unwrap_or(1);
        let generation = if value.get("spec") != existing.get("spec") {
            generation + 1
        } else {
            generation
        };
        let uid = existing["metadata"]["uid"].clone();

        value["metadata"]["uid"] = uid;
        value["metadata"]["generation"] = Value::from(generation);
        value["metadata"]["resourceVersion"] = Value::from(id.to_string());

        self.objects.insert(key.clone(), value.clone());
        Ok(value)
    }
}

/// In-memory [`ObjectStore`] for tests and local experiments.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without recording a write.
    pub fn insert<K: StoredObject>(&self, namespace: &str, object: K) -> OperatorResult<K> {
        self.state.lock().insert(namespace, &object)
    }

    /// Read an object synchronously.
    pub fn object<K: StoredObject>(&self, namespace: &str, name: &str) -> Option<K> {
        let key = key::<K>(namespace, name);
        let state = self.state.lock();
        state
            .objects
            .get(&key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Whether an object exists.
    pub fn contains<K: StoredObject>(&self, namespace: &str, name: &str) -> bool {
        self.state
            .lock()
            .objects
            .contains_key(&key::<K>(namespace, name))
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.state.lock().objects.len()
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Modify a stored object as an external actor would, without recording a
    /// write. Status changes made here are kept.
    pub fn mutate<K, F>(&self, namespace: &str, name: &str, f: F) -> OperatorResult<K>
    where
        K: StoredObject,
        F: FnOnce(&mut K),
    {
        let key = key::<K>(namespace, name);
        let mut state = self.state.lock();
        let current = state.objects.get(&key).cloned().ok_or_else(|| OperatorError::NotFound {
            kind: key.0.clone(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        })?;

        let mut object: K = serde_json::from_value(current)?;
        f(&mut object);
        let stored = state.overwrite(&key, serde_json::to_value(&object)?)?;
        Ok(serde_json::from_value(stored)?)
    }

    /// Delete an object and, transitively, every object it controls.
    ///
    /// Returns the number of objects removed.
    pub fn delete_cascade<K: StoredObject>(&self, namespace: &str, name: &str) -> usize {
        let mut state = self.state.lock();
        let Some(root) = state.objects.remove(&key::<K>(namespace, name)) else {
            return 0;
        };

        let mut removed = 1;
        let mut owners: Vec<String> = uid_of(&root).into_iter().collect();
        while let Some(owner) = owners.pop() {
            let dependents: Vec<Key> = state
                .objects
                .iter()
                .filter(|(_, v)| is_owned_by(v, &owner))
                .map(|(k, _)| k.clone())
                .collect();

            for dependent in dependents {
                if let Some(value) = state.objects.remove(&dependent) {
                    owners.extend(uid_of(&value));
                    removed += 1;
                }
            }
        }

        removed
    }

    /// Make every future `verb` on `kind` fail with an API error.
    pub fn fail_on(&self, verb: Verb, kind: &str) {
        self.state.lock().failures.insert((verb, kind.to_string()));
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Writes recorded so far, in order.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    /// Forget recorded writes.
    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    fn get_now<K: StoredObject>(&self, namespace: &str, name: &str) -> OperatorResult<Option<K>> {
        let key = key::<K>(namespace, name);
        let state = self.state.lock();
        state.check(Verb::Get, &key.0)?;
        match state.objects.get(&key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    fn create_now<K: StoredObject>(&self, namespace: &str, object: &K) -> OperatorResult<K> {
        let kind = K::kind(&()).to_string();
        let mut state = self.state.lock();
        state.check(Verb::Create, &kind)?;
        let created = state.insert(namespace, object)?;
        state.record(Verb::Create, &kind, &created.name_any());
        Ok(created)
    }

    fn replace_now<K: StoredObject>(&self, namespace: &str, object: &K) -> OperatorResult<K> {
        let name = object.name_any();
        let key = key::<K>(namespace, &name);
        let mut state = self.state.lock();
        state.check(Verb::Replace, &key.0)?;

        let existing = state.objects.get(&key).ok_or_else(|| OperatorError::NotFound {
            kind: key.0.clone(),
            name: name.clone(),
            namespace: namespace.to_string(),
        })?;

        let stored_version = existing["metadata"]["resourceVersion"].as_str();
        if let Some(version) = object.meta().resource_version.as_deref() {
            if stored_version != Some(version) {
                return Err(OperatorError::Conflict {
                    kind: key.0.clone(),
                    name,
                });
            }
        }

        // Status is owned by the status subresource.
        let status = existing.get("status").cloned();
        let mut value = serde_json::to_value(object)?;
        if let Some(fields) = value.as_object_mut() {
            match status {
                Some(status) => fields.insert("status".to_string(), status),
                None => fields.remove("status"),
            };
        }

        let stored = state.overwrite(&key, value)?;
        state.record(Verb::Replace, &key.0, &name);
        Ok(serde_json::from_value(stored)?)
    }

    fn patch_status_now(
        &self,
        namespace: &str,
        name: &str,
        status: &SqliteDatabaseStatus,
    ) -> OperatorResult<()> {
        let key = key::<SqliteDatabase>(namespace, name);
        let mut state = self.state.lock();
        state.check(Verb::PatchStatus, &key.0)?;

        let mut value = state.objects.get(&key).cloned().ok_or_else(|| OperatorError::NotFound {
            kind: key.0.clone(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        })?;

        merge_patch(&mut value, &serde_json::json!({ "status": status }));
        state.overwrite(&key, value)?;
        state.record(Verb::PatchStatus, &key.0, name);
        Ok(())
    }
}

impl ObjectStore for MemoryStore {
    fn get<'a, K: StoredObject>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> StoreFuture<'a, Option<K>> {
        Box::pin(future::ready(self.get_now(namespace, name)))
    }

    fn create<'a, K: StoredObject>(
        &'a self,
        namespace: &'a str,
        object: &'a K,
    ) -> StoreFuture<'a, K> {
        Box::pin(future::ready(self.create_now(namespace, object)))
    }

    fn replace<'a, K: StoredObject>(
        &'a self,
        namespace: &'a str,
        object: &'a K,
    ) -> StoreFuture<'a, K> {
        Box::pin(future::ready(self.replace_now(namespace, object)))
    }

    fn patch_status<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
        status: &'a SqliteDatabaseStatus,
    ) -> StoreFuture<'a, ()> {
        Box::pin(future::ready(self.patch_status_now(namespace, name, status)))
    }
}

fn key<K: StoredObject>(namespace: &str, name: &str) -> Key {
    (
        K::kind(&()).to_string(),
        namespace.to_string(),
        name.to_string(),
    )
}

fn uid_of(value: &Value) -> Option<String> {
    value["metadata"]["uid"].as_str().map(str::to_string)
}

fn is_owned_by(value: &Value, owner_uid: &str) -> bool {
    value["metadata"]["ownerReferences"]
        .as_array()
        .is_some_and(|refs| refs.iter().any(|r| r["uid"].as_str() == Some(owner_uid)))
}

/// JSON merge patch: objects merge recursively, `null` deletes a key, anything
/// else replaces the target.
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(fields) = target {
        for (key, value) in patch {
            if value.is_null() {
                fields.remove(key);
            } else {
                merge_patch(fields.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
