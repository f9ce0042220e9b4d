//! JSON <-> attribute tree. Decoding is strict: unknown keys, type mismatches,
//! missing required fields and read-only fields all fail with the offending path.

use archon_core::tree::{AttrValue, Block, Scalar};
use archon_core::ProviderError;
use serde_json::Value as Json;

use crate::{DefaultValue, Field, FieldType, ResourceSchema};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: {reason}")]
pub struct DecodeError {
    pub path: String,
    pub reason: String,
}

impl From<DecodeError> for ProviderError {
    fn from(e: DecodeError) -> Self { ProviderError::Schema(e.to_string()) }
}

fn fail<T>(path: &str, reason: impl Into<String>) -> Result<T, DecodeError> {
    Err(DecodeError { path: path.to_string(), reason: reason.into() })
}

fn join(base: &str, key: &str) -> String {
    if base.is_empty() { key.to_string() } else { format!("{base}.{key}") }
}

/// Decode one resource document (`{"metadata": {..}, "spec": {..}}`).
pub fn decode(schema: &ResourceSchema, doc: &Json) -> Result<Block, DecodeError> {
    decode_block(schema.fields, doc, "", true)
}

/// Decode a previously persisted tree. Read-only fields are accepted; defaults
/// and required checks are skipped since the server already settled them.
pub fn restore(schema: &ResourceSchema, doc: &Json) -> Result<Block, DecodeError> {
    decode_block(schema.fields, doc, "", false)
}

/// Plain JSON rendering of a tree.
pub fn encode(block: &Block) -> Json { block.to_json() }

/// Like [`encode`], with sensitive values masked.
pub fn encode_redacted(schema: &ResourceSchema, block: &Block) -> Json { redact(schema.fields, block) }

fn redact(fields: &[Field], block: &Block) -> Json {
    let mut out = serde_json::Map::new();
    for (key, value) in block.iter() {
        let field = fields.iter().find(|f| f.name == key);
        let rendered = match (field, value) {
            (Some(f), _) if f.sensitive => Json::String("(sensitive)".into()),
            (Some(Field { ty: FieldType::Block(sub), .. }), AttrValue::Block(b)) => redact(sub, b),
            (Some(Field { ty: FieldType::BlockList(sub), .. }), AttrValue::BlockList(list)) => {
                Json::Array(list.iter().map(|b| redact(sub, b)).collect())
            }
            _ => value.to_json(),
        };
        out.insert(key.to_string(), rendered);
    }
    Json::Object(out)
}

fn decode_block(fields: &[Field], value: &Json, path: &str, strict: bool) -> Result<Block, DecodeError> {
    let Some(obj) = value.as_object() else {
        return fail(path, "expected an object");
    };
    if let Some(unknown) = obj.keys().find(|k| !fields.iter().any(|f| f.name == k.as_str())) {
        return fail(&join(path, unknown), "unknown field");
    }
    let mut out = Block::new();
    for f in fields {
        let p = join(path, f.name);
        match obj.get(f.name) {
            None | Some(Json::Null) if !strict => {}
            None | Some(Json::Null) => {
                if let Some(d) = f.default {
                    out.insert(f.name, default_value(d));
                } else if f.required {
                    return fail(&p, "required field is missing");
                }
            }
            Some(_) if strict && f.read_only => return fail(&p, "field is read-only"),
            Some(v) => out.insert(f.name, decode_value(f.ty, v, &p, strict)?),
        }
    }
    Ok(out)
}

fn default_value(d: DefaultValue) -> AttrValue {
    match d {
        DefaultValue::Str(s) => AttrValue::string(s),
        DefaultValue::Int(i) => AttrValue::int(i),
        DefaultValue::Bool(b) => AttrValue::Scalar(Scalar::Bool(b)),
    }
}

fn decode_value(ty: FieldType, v: &Json, path: &str, strict: bool) -> Result<AttrValue, DecodeError> {
    match ty {
        FieldType::String => match v.as_str() {
            Some(s) => Ok(AttrValue::string(s)),
            None => fail(path, "expected a string"),
        },
        FieldType::Int => match v.as_i64() {
            Some(i) => Ok(AttrValue::int(i)),
            None => fail(path, "expected an integer"),
        },
        FieldType::Bool => match v.as_bool() {
            Some(b) => Ok(AttrValue::Scalar(Scalar::Bool(b))),
            None => fail(path, "expected a boolean"),
        },
        FieldType::StringSet => {
            let Some(items) = v.as_array() else { return fail(path, "expected a list of strings") };
            let mut set = std::collections::BTreeSet::new();
            for (i, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(s) => { set.insert(Scalar::from(s)); }
                    None => return fail(&join(path, &i.to_string()), "expected a string"),
                }
            }
            Ok(AttrValue::Set(set))
        }
        FieldType::StringMap => {
            let Some(obj) = v.as_object() else { return fail(path, "expected a map of strings") };
            let mut map = std::collections::BTreeMap::new();
            for (k, item) in obj {
                match item.as_str() {
                    Some(s) => { map.insert(k.clone(), s.to_string()); }
                    None => return fail(&join(path, k), "expected a string"),
                }
            }
            Ok(AttrValue::Map(map))
        }
        FieldType::Block(sub) => decode_block(sub, v, path, strict).map(AttrValue::Block),
        FieldType::BlockList(sub) => {
            let Some(items) = v.as_array() else { return fail(path, "expected a list of objects") };
            items
                .iter()
                .enumerate()
                .map(|(i, item)| decode_block(sub, item, &join(path, &i.to_string()), strict))
                .collect::<Result<Vec<_>, _>>()
                .map(AttrValue::BlockList)
        }
    }
}
