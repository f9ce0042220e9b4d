//! Configuration documents: one or more `{type, name, metadata, spec}` entries
//! in YAML (multi-document) or JSON (object or array).

use anyhow::{anyhow, bail, Context, Result};
use archon_core::tree::Block;
use archon_schema::{ResourceSchema, ValidationIssue};
use serde::Deserialize;
use serde_json::Value as Json;

fn max_doc_bytes() -> usize {
    std::env::var("ARCHON_MAX_DOC_BYTES").ok().and_then(|s| s.parse::<usize>().ok()).unwrap_or(1_000_000)
}

fn max_doc_nodes() -> usize {
    std::env::var("ARCHON_MAX_DOC_NODES").ok().and_then(|s| s.parse::<usize>().ok()).unwrap_or(100_000)
}

fn node_budget_exceeded(v: &Json, max: usize) -> bool {
    fn walk(v: &Json, cur: &mut usize, max: usize) {
        if *cur > max { return; }
        *cur += 1;
        match v {
            Json::Object(map) => map.values().for_each(|vv| walk(vv, cur, max)),
            Json::Array(arr) => arr.iter().for_each(|vv| walk(vv, cur, max)),
            _ => {}
        }
    }
    let mut cur = 0usize;
    walk(v, &mut cur, max);
    cur > max
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDoc {
    #[serde(rename = "type")]
    type_name: String,
    name: String,
    #[serde(default)]
    metadata: Json,
    #[serde(default)]
    spec: Json,
}

/// A decoded configuration entry.
#[derive(Debug, Clone)]
pub struct Declared {
    pub schema: &'static ResourceSchema,
    pub name: String,
    pub attrs: Block,
}

impl Declared {
    pub fn address(&self) -> String { address(self.schema.type_name, &self.name) }
}

pub fn address(type_name: &str, name: &str) -> String { format!("{type_name}.{name}") }

/// Split `archon_network.main` into type name and local name.
pub fn split_address(addr: &str) -> Result<(&str, &str)> {
    match addr.split_once('.') {
        Some((t, n)) if !t.is_empty() && !n.is_empty() => Ok((t, n)),
        _ => Err(anyhow!("invalid address {addr:?}; expected <type>.<name>")),
    }
}

fn raw_values(text: &str) -> Result<Vec<Json>> {
    if text.trim_start().starts_with(['{', '[']) {
        return match serde_json::from_str::<Json>(text).context("parsing JSON")? {
            Json::Array(items) => Ok(items),
            other => Ok(vec![other]),
        };
    }
    let mut out = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(text) {
        let val = serde_yaml::Value::deserialize(doc).context("parsing YAML")?;
        if val.is_null() { continue; }
        out.push(serde_json::to_value(val).context("converting YAML to JSON")?);
    }
    Ok(out)
}

fn render_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| match &i.hint {
            Some(h) => format!("  {}: {} ({h})", i.path, i.error),
            None => format!("  {}: {}", i.path, i.error),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse, decode and validate every entry. Local names must be unique per type.
pub fn load(text: &str) -> Result<Vec<Declared>> {
    if text.len() > max_doc_bytes() {
        bail!("configuration too large (>{} bytes)", max_doc_bytes());
    }
    let mut out: Vec<Declared> = Vec::new();
    for (idx, value) in raw_values(text)?.into_iter().enumerate() {
        if node_budget_exceeded(&value, max_doc_nodes()) {
            bail!("document {idx} too complex (>{} nodes)", max_doc_nodes());
        }
        let raw: RawDoc = serde_json::from_value(value).with_context(|| format!("document {idx}"))?;
        let schema = archon_schema::by_type_name(&raw.type_name)
            .ok_or_else(|| anyhow!("document {idx}: unknown resource type {:?}", raw.type_name))?;
        let body = serde_json::json!({"metadata": raw.metadata, "spec": raw.spec});
        let attrs = archon_schema::decode(schema, &body).with_context(|| format!("{}.{}", raw.type_name, raw.name))?;
        let issues = archon_schema::validate(schema, &attrs);
        if !issues.is_empty() {
            bail!("{}.{} is invalid:\n{}", raw.type_name, raw.name, render_issues(&issues));
        }
        let decl = Declared { schema, name: raw.name, attrs };
        if out.iter().any(|d| d.address() == decl.address()) {
            bail!("duplicate address {}", decl.address());
        }
        out.push(decl);
    }
    Ok(out)
}
