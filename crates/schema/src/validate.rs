//! Name, label and annotation validation on decoded trees.

use archon_core::tree::{AttrValue, Block};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Check, Field, FieldType, ResourceSchema};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub error: String,
    pub hint: Option<String>,
}

const DNS1123_LABEL: &str = "[a-z0-9]([-a-z0-9]*[a-z0-9])?";
const QUALIFIED_NAME: &str = "([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]";

static LABEL_RE: Lazy<Option<Regex>> = Lazy::new(|| anchored(DNS1123_LABEL));
static SUBDOMAIN_RE: Lazy<Option<Regex>> = Lazy::new(|| anchored(&format!("{DNS1123_LABEL}(\\.{DNS1123_LABEL})*")));
static QUALIFIED_RE: Lazy<Option<Regex>> = Lazy::new(|| anchored(QUALIFIED_NAME));

fn anchored(pattern: &str) -> Option<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).ok()
}

/// A pattern that failed to compile matches nothing, so input is rejected.
fn full_match(re: &Lazy<Option<Regex>>, s: &str) -> bool {
    re.as_ref().is_some_and(|r| r.is_match(s))
}

/// Check every constrained field of a decoded tree. Empty on success.
pub fn validate(schema: &ResourceSchema, block: &Block) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    walk(schema.fields, block, "", &mut issues);
    if let Some(meta) = block.block("metadata") {
        let has = |k: &str| meta.str(k).is_some_and(|s| !s.is_empty());
        if !has("name") && !has("generate_name") {
            issues.push(issue("metadata", "one of name or generate_name is required", None));
        }
    }
    issues
}

fn issue(path: &str, error: impl Into<String>, hint: Option<&str>) -> ValidationIssue {
    ValidationIssue { path: path.to_string(), error: error.into(), hint: hint.map(str::to_string) }
}

fn walk(fields: &[Field], block: &Block, base: &str, out: &mut Vec<ValidationIssue>) {
    for f in fields {
        let Some(value) = block.get(f.name) else { continue };
        let path = if base.is_empty() { f.name.to_string() } else { format!("{base}.{}", f.name) };
        match (f.ty, value) {
            (FieldType::Block(sub), AttrValue::Block(b)) => walk(sub, b, &path, out),
            (FieldType::BlockList(sub), AttrValue::BlockList(list)) => {
                for (i, b) in list.iter().enumerate() {
                    walk(sub, b, &format!("{path}.{i}"), out);
                }
            }
            _ => {
                if let Some(check) = f.check { apply(check, value, &path, out); }
            }
        }
    }
}

fn apply(check: Check, value: &AttrValue, path: &str, out: &mut Vec<ValidationIssue>) {
    match (check, value) {
        (Check::Subdomain, AttrValue::Scalar(_)) => {
            let s = value.as_str().unwrap_or_default();
            if let Some(e) = subdomain_error(s) { out.push(issue(path, e, Some("lowercase alphanumerics, '-' and '.'"))); }
        }
        (Check::NamePrefix, AttrValue::Scalar(_)) => {
            let s = value.as_str().unwrap_or_default();
            // The server appends a random suffix, so a trailing '-' is fine.
            let masked = match s.strip_suffix('-') { Some(head) => format!("{head}a"), None => s.to_string() };
            if !s.is_empty() {
                if let Some(e) = subdomain_error(&masked) { out.push(issue(path, e, None)); }
            }
        }
        (Check::Label, AttrValue::Scalar(_)) => {
            let s = value.as_str().unwrap_or_default();
            if s.len() > 63 || !full_match(&LABEL_RE, s) {
                out.push(issue(path, format!("{s:?} is not a valid DNS-1123 label"), Some("at most 63 lowercase alphanumerics or '-'")));
            }
        }
        (Check::LabelMap, AttrValue::Map(m)) => {
            for (k, v) in m {
                if let Some(e) = qualified_name_error(k) { out.push(issue(&format!("{path}.{k}"), e, None)); }
                if !(v.is_empty() || (v.len() <= 63 && full_match(&QUALIFIED_RE, v))) {
                    out.push(issue(&format!("{path}.{k}"), format!("{v:?} is not a valid label value"), Some("at most 63 alphanumerics, '-', '_' or '.'")));
                }
            }
        }
        (Check::AnnotationMap, AttrValue::Map(m)) => {
            for k in m.keys() {
                if let Some(e) = qualified_name_error(k) { out.push(issue(&format!("{path}.{k}"), e, None)); }
            }
        }
        _ => {}
    }
}

fn subdomain_error(s: &str) -> Option<String> {
    if s.len() > 253 || !full_match(&SUBDOMAIN_RE, s) {
        return Some(format!("{s:?} is not a valid DNS-1123 subdomain"));
    }
    None
}

fn qualified_name_error(key: &str) -> Option<String> {
    let (prefix, name) = match key.split_once('/') {
        Some((p, n)) => (Some(p), n),
        None => (None, key),
    };
    if let Some(p) = prefix {
        if p.is_empty() || subdomain_error(p).is_some() {
            return Some(format!("key {key:?} has an invalid prefix"));
        }
    }
    if name.is_empty() || name.len() > 63 || !full_match(&QUALIFIED_RE, name) {
        return Some(format!("key {key:?} is not a qualified name"));
    }
    None
}
