//! Archon schema: static field tables per resource type, strict decoding of
//! user configuration into attribute trees, validation, and replacement planning.

#![forbid(unsafe_code)]

use archon_core::tree::{equivalent, AttrValue, Block};
use tracing::debug;

mod codec;
mod fields;
mod validate;

pub use codec::{decode, encode, encode_redacted, restore, DecodeError};
pub use fields::{INSTANCE, INSTANCE_GROUP, NETWORK, USER};
pub use validate::{validate, ValidationIssue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Str(&'static str),
    Int(i64),
    Bool(bool),
}

/// What a metadata-ish string or map must look like beyond its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// DNS-1123 subdomain (object names).
    Subdomain,
    /// Like `Subdomain` but may end in `-` (server appends a suffix).
    NamePrefix,
    /// DNS-1123 label (namespaces).
    Label,
    /// Qualified keys, label-value values.
    LabelMap,
    /// Qualified keys, free-form values.
    AnnotationMap,
}

#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    String,
    Int,
    Bool,
    StringSet,
    StringMap,
    /// 0..1 nested block.
    Block(&'static [Field]),
    /// 0..N nested blocks, order preserved.
    BlockList(&'static [Field]),
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    pub computed: bool,
    pub force_new: bool,
    pub sensitive: bool,
    /// Reported by the server only; rejected in user configuration.
    pub read_only: bool,
    pub default: Option<DefaultValue>,
    pub check: Option<Check>,
}

impl Field {
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty, required: false, computed: false, force_new: false, sensitive: false, read_only: false, default: None, check: None }
    }

    pub const fn string(name: &'static str) -> Self { Self::new(name, FieldType::String) }
    pub const fn int(name: &'static str) -> Self { Self::new(name, FieldType::Int) }
    pub const fn string_set(name: &'static str) -> Self { Self::new(name, FieldType::StringSet) }
    pub const fn string_map(name: &'static str) -> Self { Self::new(name, FieldType::StringMap) }
    pub const fn block(name: &'static str, fields: &'static [Field]) -> Self { Self::new(name, FieldType::Block(fields)) }
    pub const fn block_list(name: &'static str, fields: &'static [Field]) -> Self { Self::new(name, FieldType::BlockList(fields)) }

    pub const fn required(self) -> Self { Self { required: true, ..self } }
    pub const fn computed(self) -> Self { Self { computed: true, ..self } }
    pub const fn force_new(self) -> Self { Self { force_new: true, ..self } }
    pub const fn sensitive(self) -> Self { Self { sensitive: true, ..self } }
    pub const fn read_only(self) -> Self { Self { read_only: true, computed: true, ..self } }
    pub const fn default_str(self, v: &'static str) -> Self { Self { default: Some(DefaultValue::Str(v)), ..self } }
    pub const fn check(self, c: Check) -> Self { Self { check: Some(c), ..self } }
}

/// Declared shape of one resource type.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSchema {
    /// Host-facing type name, e.g. `archon_instance`.
    pub type_name: &'static str,
    pub kind: &'static str,
    pub fields: &'static [Field],
}

impl ResourceSchema {
    pub fn field(&self, name: &str) -> Option<&'static Field> { self.fields.iter().find(|f| f.name == name) }
}

pub static ALL: [&ResourceSchema; 4] = [&INSTANCE, &INSTANCE_GROUP, &NETWORK, &USER];

pub fn by_type_name(type_name: &str) -> Option<&'static ResourceSchema> {
    ALL.iter().copied().find(|s| s.type_name == type_name)
}

/// Dotted paths of force-new fields whose desired value differs from the
/// prior state. Computed fields the user left unset keep the server's value
/// and never force replacement.
pub fn requires_replacement(schema: &ResourceSchema, prior: &Block, desired: &Block) -> Vec<String> {
    let mut out = Vec::new();
    walk(schema.fields, prior, desired, "", false, &mut out);
    if !out.is_empty() { debug!(type_name = schema.type_name, paths = ?out, "schema: replacement required"); }
    out
}

fn walk(fields: &[Field], prior: &Block, desired: &Block, base: &str, inherited: bool, out: &mut Vec<String>) {
    let empty = Block::new();
    for f in fields {
        let path = if base.is_empty() { f.name.to_string() } else { format!("{base}.{}", f.name) };
        let (p, d) = (prior.get(f.name), desired.get(f.name));
        if d.is_none() && f.computed { continue; }
        let force_new = inherited || f.force_new;
        match f.ty {
            FieldType::Block(sub) => {
                let pb = p.and_then(AttrValue::as_block).unwrap_or(&empty);
                let db = d.and_then(AttrValue::as_block).unwrap_or(&empty);
                walk(sub, pb, db, &path, force_new, out);
            }
            FieldType::BlockList(sub) => {
                let pl = p.and_then(AttrValue::as_block_list).unwrap_or(&[]);
                let dl = d.and_then(AttrValue::as_block_list).unwrap_or(&[]);
                if pl.len() != dl.len() {
                    if force_new || has_force_new(sub) { out.push(path); }
                    continue;
                }
                for (i, (pb, db)) in pl.iter().zip(dl).enumerate() {
                    walk(sub, pb, db, &format!("{path}.{i}"), force_new, out);
                }
            }
            _ => {
                if force_new && !equivalent(p, d) { out.push(path); }
            }
        }
    }
}

fn has_force_new(fields: &[Field]) -> bool {
    fields.iter().any(|f| {
        f.force_new
            || match f.ty {
                FieldType::Block(sub) | FieldType::BlockList(sub) => has_force_new(sub),
                _ => false,
            }
    })
}
