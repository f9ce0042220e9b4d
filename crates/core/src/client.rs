//! Collaborator seams: the per-kind REST capability and the diagnostics source.

use async_trait::async_trait;

use crate::error::ProviderResult;
use crate::model::{Event, ObjectMeta, Resource};

/// Body encoding of a patch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    /// RFC 6902 operation array.
    Json,
}

impl PatchKind {
    pub fn content_type(self) -> &'static str {
        match self { PatchKind::Json => "application/json-patch+json" }
    }
}

/// Create/Get/Patch/Delete against one resource kind. `get` and `delete`
/// report an absent object as [`crate::ProviderError::NotFound`].
#[async_trait]
pub trait ResourceClient<R: Resource>: Send + Sync {
    async fn create(&self, obj: &R) -> ProviderResult<R>;
    async fn get(&self, namespace: &str, name: &str) -> ProviderResult<R>;
    async fn patch(&self, namespace: &str, name: &str, kind: PatchKind, body: &[u8]) -> ProviderResult<R>;
    async fn delete(&self, namespace: &str, name: &str) -> ProviderResult<()>;
}

/// Warning events recorded against an object, newest first.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn list_recent_warnings(&self, meta: &ObjectMeta, kind: &str, limit: usize) -> ProviderResult<Vec<Event>>;
}
