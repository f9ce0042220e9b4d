//! Object metadata <-> `metadata` block, and metadata patch operations.

use archon_core::model::ObjectMeta;
use archon_core::tree::{AttrValue, Block};

use crate::changes::Changes;
use crate::patch::PatchBuilder;

pub const DEFAULT_NAMESPACE: &str = "default";

/// `name` and `namespace` are always present; everything else only when set.
pub fn flatten_metadata(meta: &ObjectMeta) -> Block {
    let mut b = Block::new()
        .with("name", AttrValue::string(&meta.name))
        .with("namespace", AttrValue::string(&meta.namespace));
    if !meta.generate_name.is_empty() { b.insert("generate_name", AttrValue::string(&meta.generate_name)); }
    if !meta.labels.is_empty() { b.insert("labels", meta.labels.clone()); }
    if !meta.annotations.is_empty() { b.insert("annotations", meta.annotations.clone()); }
    if meta.generation != 0 { b.insert("generation", AttrValue::int(meta.generation)); }
    if !meta.resource_version.is_empty() { b.insert("resource_version", AttrValue::string(&meta.resource_version)); }
    if !meta.self_link.is_empty() { b.insert("self_link", AttrValue::string(&meta.self_link)); }
    if !meta.uid.is_empty() { b.insert("uid", AttrValue::string(&meta.uid)); }
    b
}

/// Metadata embedded in a template or secret: omitted entirely when empty.
pub fn flatten_nested_metadata(meta: &ObjectMeta) -> Option<Block> {
    (*meta != ObjectMeta::default()).then(|| flatten_metadata(meta))
}

/// Reads only the user-settable fields; server-assigned ones stay empty.
pub fn expand_metadata(block: &Block) -> ObjectMeta {
    ObjectMeta {
        name: block.str("name").unwrap_or_default().to_string(),
        generate_name: block.str("generate_name").unwrap_or_default().to_string(),
        namespace: block.str("namespace").unwrap_or_default().to_string(),
        labels: block.map("labels").cloned().unwrap_or_default(),
        annotations: block.map("annotations").cloned().unwrap_or_default(),
        ..ObjectMeta::default()
    }
}

/// Whole-map replaces for `labels` and `annotations`.
pub fn patch_metadata(changes: &Changes<'_>, out: &mut PatchBuilder) {
    for key in ["labels", "annotations"] {
        if changes.changed(key) {
            out.replace(format!("/metadata/{key}"), changes.map(key));
        }
    }
}
