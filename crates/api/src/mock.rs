//! In-memory collaborators for tests and offline runs.
//!
//! [`MockClient`] behaves like a tiny apiserver for every Archon kind: it
//! assigns server metadata on create, applies `replace` patches, reports
//! absent objects as not found and records every call it receives.
//! [`MockEvents`] serves a fixed list of warning events.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use archon_apply::PatchOperation;
use archon_core::model::{Event, ObjectMeta, Resource, API_GROUP, API_VERSION};
use archon_core::{EventSource, PatchKind, ProviderError, ProviderResult, ResourceClient};
use serde_json::{json, Value as Json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Create,
    Get,
    Patch,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub verb: Verb,
    pub kind: &'static str,
    pub namespace: String,
    pub name: String,
    /// Parsed patch body for `Patch` calls.
    pub body: Option<Json>,
}

type Key = (&'static str, String, String);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(|e| e.into_inner()) }

#[derive(Default)]
pub struct MockClient {
    objects: Mutex<BTreeMap<Key, Json>>,
    calls: Mutex<Vec<Call>>,
    phases: Mutex<HashMap<(String, String), VecDeque<String>>>,
    failures: Mutex<HashMap<Verb, String>>,
    rv: AtomicU64,
}

impl MockClient {
    pub fn new() -> Self { Self::default() }

    /// Insert an object as if another client had created it.
    pub fn seed<R: Resource>(&self, obj: &R) -> ProviderResult<()> {
        let meta = obj.metadata();
        let v = serde_json::to_value(obj)?;
        lock(&self.objects).insert((R::KIND, meta.namespace.clone(), meta.name.clone()), v);
        Ok(())
    }

    /// Drop an object behind the coordinator's back.
    pub fn remove_out_of_band<R: Resource>(&self, namespace: &str, name: &str) -> bool {
        lock(&self.objects).remove(&(R::KIND, namespace.to_string(), name.to_string())).is_some()
    }

    pub fn stored<R: Resource>(&self, namespace: &str, name: &str) -> Option<R> {
        let v = lock(&self.objects).get(&(R::KIND, namespace.to_string(), name.to_string())).cloned()?;
        serde_json::from_value(v).ok()
    }

    /// Status phases reported by successive `get` calls on one object; the
    /// last one sticks.
    pub fn script_phases(&self, namespace: &str, name: &str, phases: &[&str]) {
        lock(&self.phases).insert((namespace.to_string(), name.to_string()), phases.iter().map(|p| p.to_string()).collect());
    }

    /// Every `verb` call fails with a transport error until cleared.
    pub fn fail(&self, verb: Verb, message: &str) { lock(&self.failures).insert(verb, message.to_string()); }

    pub fn clear_failures(&self) { lock(&self.failures).clear(); }

    pub fn calls(&self) -> Vec<Call> { lock(&self.calls).clone() }

    /// Calls that would change server state.
    pub fn mutations(&self) -> usize { lock(&self.calls).iter().filter(|c| c.verb != Verb::Get).count() }

    fn record(&self, verb: Verb, kind: &'static str, namespace: &str, name: &str, body: Option<Json>) -> ProviderResult<()> {
        lock(&self.calls).push(Call { verb, kind, namespace: namespace.to_string(), name: name.to_string(), body });
        match lock(&self.failures).get(&verb) {
            Some(msg) => Err(ProviderError::Transport(anyhow!("{msg}"))),
            None => Ok(()),
        }
    }

    fn next_rv(&self) -> String { (self.rv.fetch_add(1, Ordering::SeqCst) + 1).to_string() }
}

/// Lenient `replace`: missing intermediate objects are created.
fn replace_at(root: &mut Json, path: &str, value: Json) -> ProviderResult<()> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err(ProviderError::Transport(anyhow!("empty patch path")));
    };
    let mut cur = root;
    for seg in parents {
        if !(cur.is_object() || cur.is_null()) {
            return Err(ProviderError::Transport(anyhow!("patch path {path} crosses a non-object")));
        }
        cur = &mut cur[*seg];
    }
    if !(cur.is_object() || cur.is_null()) {
        return Err(ProviderError::Transport(anyhow!("patch path {path} crosses a non-object")));
    }
    cur[*last] = value;
    Ok(())
}

#[async_trait::async_trait]
impl<R: Resource> ResourceClient<R> for MockClient {
    async fn create(&self, obj: &R) -> ProviderResult<R> {
        let meta = obj.metadata();
        let namespace = if meta.namespace.is_empty() { "default".to_string() } else { meta.namespace.clone() };
        self.record(Verb::Create, R::KIND, &namespace, &meta.name, None)?;
        let name = match (meta.name.is_empty(), meta.generate_name.is_empty()) {
            (false, _) => meta.name.clone(),
            (true, false) => format!("{}{}", meta.generate_name, &uuid::Uuid::new_v4().simple().to_string()[..5]),
            (true, true) => return Err(ProviderError::Transport(anyhow!("name or generateName is required"))),
        };
        let key = (R::KIND, namespace.clone(), name.clone());
        let mut objects = lock(&self.objects);
        if objects.contains_key(&key) {
            return Err(ProviderError::Transport(anyhow!("{} {namespace}/{name} already exists", R::KIND)));
        }
        let mut v = serde_json::to_value(obj)?;
        let server = ObjectMeta {
            name: name.clone(),
            namespace: namespace.clone(),
            generation: 1,
            resource_version: self.next_rv(),
            self_link: format!("/apis/{API_GROUP}/{API_VERSION}/namespaces/{namespace}/{}/{name}", R::PLURAL),
            uid: uuid::Uuid::new_v4().to_string(),
            ..meta.for_submit()
        };
        v["metadata"] = serde_json::to_value(&server)?;
        if R::READINESS.is_some() {
            v["status"] = json!({"phase": "Pending"});
        }
        objects.insert(key, v.clone());
        Ok(serde_json::from_value(v)?)
    }

    async fn get(&self, namespace: &str, name: &str) -> ProviderResult<R> {
        self.record(Verb::Get, R::KIND, namespace, name, None)?;
        let mut objects = lock(&self.objects);
        let v = objects
            .get_mut(&(R::KIND, namespace.to_string(), name.to_string()))
            .ok_or_else(|| ProviderError::not_found(R::KIND, namespace, name))?;
        let mut phases = lock(&self.phases);
        if let Some(queue) = phases.get_mut(&(namespace.to_string(), name.to_string())) {
            let next = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
            if let Some(phase) = next {
                v["status"]["phase"] = Json::String(phase);
            }
        }
        Ok(serde_json::from_value(v.clone())?)
    }

    async fn patch(&self, namespace: &str, name: &str, _kind: PatchKind, body: &[u8]) -> ProviderResult<R> {
        let parsed: Json = serde_json::from_slice(body)?;
        self.record(Verb::Patch, R::KIND, namespace, name, Some(parsed.clone()))?;
        let ops: Vec<PatchOperation> = serde_json::from_value(parsed)?;
        let mut objects = lock(&self.objects);
        let v = objects
            .get_mut(&(R::KIND, namespace.to_string(), name.to_string()))
            .ok_or_else(|| ProviderError::not_found(R::KIND, namespace, name))?;
        for op in &ops {
            replace_at(v, &op.path, op.value.clone())?;
        }
        v["metadata"]["resourceVersion"] = Json::String(self.next_rv());
        if ops.iter().any(|op| op.path.starts_with("/spec")) {
            let generation = v["metadata"]["generation"].as_i64().unwrap_or_default();
            v["metadata"]["generation"] = json!(generation + 1);
        }
        Ok(serde_json::from_value(v.clone())?)
    }

    async fn delete(&self, namespace: &str, name: &str) -> ProviderResult<()> {
        self.record(Verb::Delete, R::KIND, namespace, name, None)?;
        match lock(&self.objects).remove(&(R::KIND, namespace.to_string(), name.to_string())) {
            Some(_) => Ok(()),
            None => Err(ProviderError::not_found(R::KIND, namespace, name)),
        }
    }
}

#[derive(Default)]
pub struct MockEvents {
    events: Mutex<Vec<Event>>,
    failure: Mutex<Option<String>>,
    requests: AtomicUsize,
}

impl MockEvents {
    pub fn with_events(events: Vec<Event>) -> Self { Self { events: Mutex::new(events), ..Self::default() } }

    pub fn warning(reason: &str, message: &str) -> Event {
        Event { reason: reason.to_string(), message: message.to_string(), count: 1, last_timestamp: None }
    }

    pub fn fail(&self, message: &str) { *lock(&self.failure) = Some(message.to_string()); }

    pub fn requests(&self) -> usize { self.requests.load(Ordering::SeqCst) }
}

#[async_trait::async_trait]
impl EventSource for MockEvents {
    async fn list_recent_warnings(&self, _meta: &ObjectMeta, _kind: &str, limit: usize) -> ProviderResult<Vec<Event>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = lock(&self.failure).clone() {
            return Err(ProviderError::Transport(anyhow!(msg)));
        }
        Ok(lock(&self.events).iter().take(limit).cloned().collect())
    }
}
