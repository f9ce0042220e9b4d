//! Archon apply: translators between attribute trees and domain objects, plus
//! the minimal replace-only patches sent on update.

#![forbid(unsafe_code)]

use archon_core::model::Resource;
use archon_core::tree::{Block, EMPTY};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

pub mod changes;
pub mod instance;
pub mod instance_group;
pub mod metadata;
pub mod network;
pub mod patch;
pub mod user;

pub use changes::Changes;
pub use metadata::{expand_metadata, flatten_metadata, patch_metadata, DEFAULT_NAMESPACE};
pub use patch::{Op, PatchBuilder, PatchOperation};

/// Per-kind spec conversion. `expand_spec` never fails: fields of the wrong
/// shape are skipped, so strict checking belongs to the schema decoder.
pub trait Translate: Resource {
    fn flatten_spec(spec: &Self::Spec) -> Block;
    fn expand_spec(block: &Block) -> Self::Spec;
    /// Operations for changed spec fields, paths rooted at `/spec`.
    fn patch_spec(changes: &Changes<'_>, out: &mut PatchBuilder);
}

/// Full tree (`metadata` + `spec`) of an observed object.
pub fn flatten<R: Translate>(obj: &R) -> Block {
    Block::new()
        .with("metadata", flatten_metadata(obj.metadata()))
        .with("spec", R::flatten_spec(obj.spec()))
}

/// Domain object to submit on create. A missing namespace becomes `default`.
pub fn expand<R: Translate>(attrs: &Block) -> R {
    let mut meta = expand_metadata(attrs.block("metadata").unwrap_or(&EMPTY));
    if meta.namespace.is_empty() { meta.namespace = DEFAULT_NAMESPACE.to_string(); }
    R::new(meta, R::expand_spec(attrs.block("spec").unwrap_or(&EMPTY)))
}

/// Metadata operations first, then spec operations; the spec translator only
/// runs when the spec block changed at all.
pub fn plan_update<R: Translate>(prior: &Block, desired: &Block) -> PatchBuilder {
    let mut out = PatchBuilder::new();
    let meta = Changes::new(prior.block("metadata"), desired.block("metadata"));
    if meta.any() { patch_metadata(&meta, &mut out); }
    let spec = Changes::new(prior.block("spec"), desired.block("spec"));
    if spec.any() { R::patch_spec(&spec, &mut out); }
    debug!(kind = R::KIND, ops = out.len(), "apply: planned update");
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary { pub adds: usize, pub updates: usize, pub removes: usize }

/// Leaf-level counts of what moving from `prior` to `desired` touches.
pub fn diff_summary(desired: &Block, prior: &Block) -> DiffSummary {
    fn walk(a: &Json, b: &Json, s: &mut DiffSummary) {
        match (a, b) {
            (Json::Object(ao), Json::Object(bo)) => {
                for (k, av) in ao {
                    match bo.get(k) {
                        Some(bv) if av == bv => {}
                        Some(bv) => walk(av, bv, s),
                        None => s.adds += 1,
                    }
                }
                s.removes += bo.keys().filter(|k| !ao.contains_key(*k)).count();
            }
            (Json::Array(aa), Json::Array(bb)) => {
                s.updates += aa.iter().zip(bb).filter(|(x, y)| x != y).count();
                s.adds += aa.len().saturating_sub(bb.len());
                s.removes += bb.len().saturating_sub(aa.len());
            }
            (av, bv) => if av != bv { s.updates += 1 },
        }
    }
    let mut s = DiffSummary::default();
    walk(&desired.to_json(), &prior.to_json(), &mut s);
    s
}
