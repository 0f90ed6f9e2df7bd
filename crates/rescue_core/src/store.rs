//! Document-store collaborator: path-keyed JSON documents.
//!
//! The engine never talks to a concrete database; it is handed a
//! `Arc<dyn DocumentStore>` supporting read / write / merge (partial update)
//! by slash-separated path, plus a children listing — the minimal surface of
//! a realtime-database-style document tree. [`InMemoryStore`] is the bundled
//! implementation used for development and tests.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};

use crate::error::{CoreError, StoreError};
use crate::model::{Assignment, HelpRequest, RequestStatus, Responder};

/// Path-keyed JSON document store.
pub trait DocumentStore: Send + Sync {
    /// Read the document at `path`; `None` when nothing is stored there.
    fn read(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Overwrite the document at `path`.
    fn write(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Shallow-merge `patch` into the object at `path`, creating it if
    /// missing. Non-object targets are replaced.
    fn merge(&self, path: &str, patch: Value) -> Result<(), StoreError>;

    /// List `(child_key, document)` pairs under `path`.
    fn read_children(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// JSON tree behind a mutex. Paths are slash-separated; empty segments are
/// ignored.
#[derive(Default)]
pub struct InMemoryStore {
    root: Mutex<Value>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Value::Object(Map::new())),
        }
    }

    fn segments(path: &str) -> Vec<&str> {
        path.split('/').filter(|s| !s.is_empty()).collect()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Value>, StoreError> {
        self.root
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))
    }
}

/// Walk to the node at `segments`, creating intermediate objects.
fn node_mut<'a>(root: &'a mut Value, segments: &[&str]) -> &'a mut Value {
    let mut node = root;
    for seg in segments {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = node
            .as_object_mut()
            .expect("node was just made an object")
            .entry(seg.to_string())
            .or_insert(Value::Object(Map::new()));
    }
    node
}

fn node_at<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for seg in segments {
        node = node.as_object()?.get(*seg)?;
    }
    Some(node)
}

impl DocumentStore for InMemoryStore {
    fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let root = self.lock()?;
        Ok(node_at(&root, &Self::segments(path)).cloned())
    }

    fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let mut root = self.lock()?;
        *node_mut(&mut root, &Self::segments(path)) = value;
        Ok(())
    }

    fn merge(&self, path: &str, patch: Value) -> Result<(), StoreError> {
        let mut root = self.lock()?;
        let node = node_mut(&mut root, &Self::segments(path));
        match (node.as_object_mut(), patch) {
            (Some(target), Value::Object(fields)) => {
                for (k, v) in fields {
                    target.insert(k, v);
                }
            }
            (_, patch) => *node = patch,
        }
        Ok(())
    }

    fn read_children(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let root = self.lock()?;
        Ok(node_at(&root, &Self::segments(path))
            .and_then(Value::as_object)
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Typed repository layer
// ---------------------------------------------------------------------------

const REQUESTS: &str = "requests";
const RESPONDERS: &str = "responders";
const ASSIGNMENTS: &str = "assignments";

/// Typed access to requests, responders, and assignments over any
/// [`DocumentStore`].
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn DocumentStore>,
}

impl Repository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>, CoreError> {
        let path = format!("{collection}/{id}");
        match self.store.read(&path).map_err(CoreError::Store)? {
            Some(value) => Ok(Some(
                serde_json::from_value(value).map_err(StoreError::Serde)?,
            )),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, collection: &str, id: &str, record: &T) -> Result<(), CoreError> {
        let path = format!("{collection}/{id}");
        let value = serde_json::to_value(record).map_err(StoreError::Serde)?;
        self.store.write(&path, value).map_err(CoreError::Store)
    }

    fn all<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>, CoreError> {
        let children = self.store.read_children(collection).map_err(CoreError::Store)?;
        let mut records = Vec::with_capacity(children.len());
        for (_, value) in children {
            records.push(serde_json::from_value(value).map_err(StoreError::Serde)?);
        }
        Ok(records)
    }

    pub fn get_request(&self, id: &str) -> Result<Option<HelpRequest>, CoreError> {
        self.get(REQUESTS, id)
    }

    pub fn put_request(&self, request: &HelpRequest) -> Result<(), CoreError> {
        self.put(REQUESTS, &request.id, request)
    }

    pub fn all_requests(&self) -> Result<Vec<HelpRequest>, CoreError> {
        self.all(REQUESTS)
    }

    pub fn open_requests(&self) -> Result<Vec<HelpRequest>, CoreError> {
        let mut requests = self.all_requests()?;
        requests.retain(|r| r.status == RequestStatus::Open);
        // Stable order for deterministic aggregation/cluster output.
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(requests)
    }

    pub fn get_responder(&self, id: &str) -> Result<Option<Responder>, CoreError> {
        self.get(RESPONDERS, id)
    }

    pub fn put_responder(&self, responder: &Responder) -> Result<(), CoreError> {
        self.put(RESPONDERS, &responder.id, responder)
    }

    pub fn all_responders(&self) -> Result<Vec<Responder>, CoreError> {
        self.all(RESPONDERS)
    }

    pub fn get_assignment(&self, id: &str) -> Result<Option<Assignment>, CoreError> {
        self.get(ASSIGNMENTS, id)
    }

    pub fn put_assignment(&self, assignment: &Assignment) -> Result<(), CoreError> {
        self.put(ASSIGNMENTS, &assignment.id, assignment)
    }

    pub fn assignments_for_request(&self, request_id: &str) -> Result<Vec<Assignment>, CoreError> {
        let mut assignments: Vec<Assignment> = self.all(ASSIGNMENTS)?;
        assignments.retain(|a| a.request_id == request_id);
        Ok(assignments)
    }

    pub fn assignments_for_responder(
        &self,
        responder_id: &str,
    ) -> Result<Vec<Assignment>, CoreError> {
        let mut assignments: Vec<Assignment> = self.all(ASSIGNMENTS)?;
        assignments.retain(|a| a.responder_id == responder_id);
        assignments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(assignments)
    }
}
