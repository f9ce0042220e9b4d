//! Archon provider core: attribute trees, typed domain objects, the identity
//! codec, the error taxonomy and the collaborator traits every other crate
//! builds on.

#![forbid(unsafe_code)]

pub mod client;
pub mod error;
pub mod ident;
pub mod model;
pub mod tree;

pub use client::{EventSource, PatchKind, ResourceClient};
pub use error::{ProviderError, ProviderResult};
pub use model::{Event, ObjectMeta, Readiness, Resource};
pub use tree::{AttrValue, Block, Scalar};

pub mod prelude {
    pub use super::client::{EventSource, PatchKind, ResourceClient};
    pub use super::error::{ProviderError, ProviderResult};
    pub use super::ident;
    pub use super::model::*;
    pub use super::tree::{AttrValue, Block, Scalar};
}
