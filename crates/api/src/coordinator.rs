//! Per-kind resource lifecycle: create, read, update, delete, exists, import.

use std::sync::Arc;
use std::time::Instant;

use archon_apply::{expand, flatten, plan_update, PatchOperation, Translate};
use archon_core::ident;
use archon_core::model::Resource;
use archon_core::tree::Block;
use archon_core::{EventSource, PatchKind, ProviderError, ProviderResult, ResourceClient};
use archon_schema::ResourceSchema;
use async_trait::async_trait;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::poller::{Poller, PollerConfig};

/// What the host persists between operations: the identifier (absent once the
/// object is gone) and the last observed tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceState {
    pub id: Option<String>,
    pub attrs: Block,
}

impl ResourceState {
    pub fn desired(attrs: Block) -> Self { Self { id: None, attrs } }

    fn clear(&mut self) {
        self.id = None;
        self.attrs = Block::new();
    }
}

/// Object-safe lifecycle surface, one per resource type.
///
/// Callers serialize operations per identifier; coordinators hold no locks.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    fn schema(&self) -> &'static ResourceSchema;

    fn type_name(&self) -> &'static str { self.schema().type_name }

    /// `state.attrs` holds the desired tree on entry and the observed tree on
    /// success. The identifier is set as soon as the server accepted the
    /// object, so a failed convergence still leaves it recorded.
    async fn create(&self, state: &mut ResourceState) -> ProviderResult<()>;

    /// Refresh from the server. An object deleted out of band clears the state.
    async fn read(&self, state: &mut ResourceState) -> ProviderResult<()>;

    /// Patch the fields that differ between `state.attrs` and `desired`. No
    /// request is made when nothing patchable changed.
    async fn update(&self, state: &mut ResourceState, desired: &Block) -> ProviderResult<()>;

    /// Operations `update` would send from `prior` to `desired`.
    fn planned_patch(&self, prior: &Block, desired: &Block) -> Vec<PatchOperation>;

    /// Idempotent: an already-absent object, or a state without identifier,
    /// counts as deleted.
    async fn delete(&self, state: &mut ResourceState) -> ProviderResult<()>;

    async fn exists(&self, state: &ResourceState) -> ProviderResult<bool>;

    /// Adopt an existing object by identifier.
    async fn import(&self, id: &str) -> ProviderResult<ResourceState>;
}

pub struct Coordinator<R: Resource> {
    schema: &'static ResourceSchema,
    client: Arc<dyn ResourceClient<R>>,
    events: Arc<dyn EventSource>,
    poller: Poller,
}

impl<R: Translate> Coordinator<R> {
    pub fn new(schema: &'static ResourceSchema, client: Arc<dyn ResourceClient<R>>, events: Arc<dyn EventSource>, poller: PollerConfig) -> Self {
        Self { schema, client, events, poller: Poller::new(poller) }
    }

    fn parse_id(state: &ResourceState) -> ProviderResult<(String, String)> {
        ident::parse(state.id.as_deref().unwrap_or_default())
    }
}

#[async_trait]
impl<R: Translate> Lifecycle for Coordinator<R> {
    fn schema(&self) -> &'static ResourceSchema { self.schema }

    async fn create(&self, state: &mut ResourceState) -> ProviderResult<()> {
        let t0 = Instant::now();
        let obj: R = expand(&state.attrs);
        info!(kind = R::KIND, ns = %obj.metadata().namespace, name = %obj.metadata().name, "api: create start");
        let out = self.client.create(&obj).await?;
        counter!("archon_create_total", 1u64);
        let meta = out.metadata().clone();
        state.id = Some(ident::compose(&meta.namespace, &meta.name));
        debug!(kind = R::KIND, id = ?state.id, "api: create submitted");

        if let Some(readiness) = R::READINESS {
            self.poller.wait(self.client.as_ref(), self.events.as_ref(), &meta, readiness).await?;
        }
        self.read(state).await?;
        info!(kind = R::KIND, id = ?state.id, took_ms = %t0.elapsed().as_millis(), "api: create ok");
        Ok(())
    }

    async fn read(&self, state: &mut ResourceState) -> ProviderResult<()> {
        let (namespace, name) = Self::parse_id(state)?;
        match self.client.get(&namespace, &name).await {
            Ok(obj) => {
                state.attrs = flatten(&obj);
                debug!(kind = R::KIND, ns = %namespace, name = %name, attrs = %state.attrs.to_json(), "api: read ok");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!(kind = R::KIND, ns = %namespace, name = %name, "api: object gone, clearing state");
                state.clear();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn update(&self, state: &mut ResourceState, desired: &Block) -> ProviderResult<()> {
        let t0 = Instant::now();
        let (namespace, name) = Self::parse_id(state)?;
        let ops = plan_update::<R>(&state.attrs, desired);
        if ops.is_empty() {
            debug!(kind = R::KIND, ns = %namespace, name = %name, "api: update has nothing to patch");
            return Ok(());
        }
        let count = ops.len();
        let body = ops.into_wire_payload()?;
        info!(kind = R::KIND, ns = %namespace, name = %name, ops = count, "api: update start");
        let out = self.client.patch(&namespace, &name, PatchKind::Json, &body).await?;
        counter!("archon_update_total", 1u64);
        counter!("archon_patch_ops_total", count as u64);
        state.id = Some(ident::compose(&out.metadata().namespace, &out.metadata().name));
        self.read(state).await?;
        info!(kind = R::KIND, id = ?state.id, took_ms = %t0.elapsed().as_millis(), "api: update ok");
        Ok(())
    }

    fn planned_patch(&self, prior: &Block, desired: &Block) -> Vec<PatchOperation> {
        plan_update::<R>(prior, desired).into_operations()
    }

    async fn delete(&self, state: &mut ResourceState) -> ProviderResult<()> {
        if state.id.is_none() {
            return Ok(());
        }
        let (namespace, name) = Self::parse_id(state)?;
        match self.client.delete(&namespace, &name).await {
            Ok(()) => info!(kind = R::KIND, ns = %namespace, name = %name, "api: delete ok"),
            Err(e) if e.is_not_found() => warn!(kind = R::KIND, ns = %namespace, name = %name, "api: delete found nothing"),
            Err(e) => return Err(e),
        }
        counter!("archon_delete_total", 1u64);
        state.clear();
        Ok(())
    }

    async fn exists(&self, state: &ResourceState) -> ProviderResult<bool> {
        let (namespace, name) = Self::parse_id(state)?;
        match self.client.get(&namespace, &name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn import(&self, id: &str) -> ProviderResult<ResourceState> {
        let (namespace, name) = ident::parse(id)?;
        let mut state = ResourceState { id: Some(id.to_string()), attrs: Block::new() };
        self.read(&mut state).await?;
        if state.id.is_none() {
            return Err(ProviderError::not_found(R::KIND, &namespace, &name));
        }
        info!(kind = R::KIND, id = %id, "api: import ok");
        Ok(state)
    }
}
