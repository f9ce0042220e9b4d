//! InstanceGroup spec translator. Everything but `replicas` is fixed at creation.

use archon_core::model::{InstanceGroup, InstanceGroupSpec, InstanceTemplateSpec, LabelSelector, LabelSelectorRequirement, ObjectMeta, Secret};
use archon_core::tree::{AttrValue, Block};

use crate::changes::Changes;
use crate::instance::{expand_instance_spec, flatten_instance_spec};
use crate::metadata::{expand_metadata, flatten_nested_metadata};
use crate::patch::PatchBuilder;
use crate::Translate;

pub fn flatten_instance_group_spec(spec: &InstanceGroupSpec) -> Block {
    let mut b = Block::new();
    if spec.replicas != 0 { b.insert("replicas", AttrValue::int(i64::from(spec.replicas))); }
    if !spec.provision_policy.is_empty() { b.insert("provision_policy", AttrValue::string(&spec.provision_policy)); }
    if let Some(sel) = spec.selector.as_ref().map(flatten_selector).filter(|s| !s.is_empty()) {
        b.insert("selector", sel);
    }
    if let Some(sel) = spec.reserved_instance_selector.as_ref().map(flatten_selector).filter(|s| !s.is_empty()) {
        b.insert("reserved_instance_selector", sel);
    }
    let template = flatten_template(&spec.template);
    if !template.is_empty() { b.insert("template", template); }
    b
}

pub fn expand_instance_group_spec(b: &Block) -> InstanceGroupSpec {
    InstanceGroupSpec {
        // Out-of-range values are dropped like any other malformed input.
        replicas: b.int("replicas").and_then(|r| i32::try_from(r).ok()).unwrap_or_default(),
        provision_policy: b.str("provision_policy").unwrap_or_default().to_string(),
        selector: b.block("selector").map(expand_selector),
        reserved_instance_selector: b.block("reserved_instance_selector").map(expand_selector),
        template: b.block("template").map(expand_template).unwrap_or_default(),
    }
}

fn flatten_template(t: &InstanceTemplateSpec) -> Block {
    let mut b = Block::new();
    if let Some(meta) = flatten_nested_metadata(&t.metadata) { b.insert("metadata", meta); }
    let spec = flatten_instance_spec(&t.spec);
    if !spec.is_empty() { b.insert("spec", spec); }
    if !t.secrets.is_empty() {
        b.insert("secrets", AttrValue::BlockList(t.secrets.iter().map(flatten_secret).collect()));
    }
    b
}

fn expand_template(b: &Block) -> InstanceTemplateSpec {
    InstanceTemplateSpec {
        metadata: b.block("metadata").map(expand_metadata).unwrap_or_default(),
        spec: b.block("spec").map(expand_instance_spec).unwrap_or_default(),
        secrets: b.blocks("secrets").iter().map(expand_secret).collect(),
    }
}

/// Reports what the server holds: decoded `data` overlaid with any `string_data`.
fn flatten_secret(s: &Secret) -> Block {
    let mut b = Block::new();
    if let Some(meta) = flatten_nested_metadata(&s.metadata) { b.insert("metadata", meta); }
    let data = s.text_data();
    if !data.is_empty() { b.insert("data", data); }
    if !s.type_.is_empty() { b.insert("type", AttrValue::string(&s.type_)); }
    b
}

/// Submits plain text through `string_data`; the server encodes it.
fn expand_secret(b: &Block) -> Secret {
    Secret {
        metadata: b.block("metadata").map(expand_metadata).unwrap_or_else(ObjectMeta::default),
        string_data: b.map("data").cloned().unwrap_or_default(),
        type_: b.str("type").unwrap_or_default().to_string(),
        ..Secret::default()
    }
}

fn flatten_selector(s: &LabelSelector) -> Block {
    let mut b = Block::new();
    if !s.match_expressions.is_empty() {
        let exprs = s
            .match_expressions
            .iter()
            .map(|e| {
                let mut r = Block::new();
                if !e.key.is_empty() { r.insert("key", AttrValue::string(&e.key)); }
                if !e.operator.is_empty() { r.insert("operator", AttrValue::string(&e.operator)); }
                if !e.values.is_empty() { r.insert("values", AttrValue::string_set(e.values.iter().cloned())); }
                r
            })
            .collect();
        b.insert("match_expressions", AttrValue::BlockList(exprs));
    }
    if !s.match_labels.is_empty() { b.insert("match_labels", s.match_labels.clone()); }
    b
}

fn expand_selector(b: &Block) -> LabelSelector {
    LabelSelector {
        match_labels: b.map("match_labels").cloned().unwrap_or_default(),
        match_expressions: b
            .blocks("match_expressions")
            .iter()
            .map(|r| LabelSelectorRequirement {
                key: r.str("key").unwrap_or_default().to_string(),
                operator: r.str("operator").unwrap_or_default().to_string(),
                values: r
                    .set("values")
                    .map(|set| set.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default(),
            })
            .collect(),
    }
}

impl Translate for InstanceGroup {
    fn flatten_spec(spec: &InstanceGroupSpec) -> Block { flatten_instance_group_spec(spec) }

    fn expand_spec(block: &Block) -> InstanceGroupSpec { expand_instance_group_spec(block) }

    fn patch_spec(changes: &Changes<'_>, out: &mut PatchBuilder) {
        if changes.changed("replicas") {
            out.replace("/spec/replicas", changes.int("replicas"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archon_core::model::InstanceSpec;
    use std::collections::BTreeMap;

    fn group(replicas: i32) -> InstanceGroupSpec {
        InstanceGroupSpec {
            replicas,
            provision_policy: "DynamicOnly".into(),
            selector: Some(LabelSelector {
                match_labels: BTreeMap::from([("app".to_string(), "web".to_string())]),
                match_expressions: vec![LabelSelectorRequirement {
                    key: "tier".into(),
                    operator: "In".into(),
                    values: vec!["a".into(), "b".into()],
                }],
            }),
            reserved_instance_selector: None,
            template: InstanceTemplateSpec {
                metadata: ObjectMeta { labels: BTreeMap::from([("app".to_string(), "web".to_string())]), ..Default::default() },
                spec: InstanceSpec { os: "CoreOS".into(), network_name: "net".into(), ..Default::default() },
                secrets: vec![Secret {
                    metadata: ObjectMeta { name: "tok".into(), ..Default::default() },
                    string_data: BTreeMap::from([("token".to_string(), "s3cr3t".to_string())]),
                    type_: "Opaque".into(),
                    ..Default::default()
                }],
            },
        }
    }

    #[test]
    fn nested_template_round_trips() {
        let spec = group(2);
        assert_eq!(expand_instance_group_spec(&flatten_instance_group_spec(&spec)), spec);
    }

    #[test]
    fn server_secret_bytes_come_back_as_text() {
        let mut spec = group(1);
        spec.template.secrets[0].string_data.clear();
        spec.template.secrets[0].data = BTreeMap::from([("token".to_string(), b"s3cr3t".to_vec())]);
        let back = expand_instance_group_spec(&flatten_instance_group_spec(&spec));
        assert_eq!(back.template.secrets[0].text_data(), spec.template.secrets[0].text_data());
    }

    #[test]
    fn zero_replicas_are_omitted_and_absent_template_stays_out() {
        let b = flatten_instance_group_spec(&InstanceGroupSpec::default());
        assert!(b.is_empty());
    }

    #[test]
    fn replicas_change_is_the_only_operation() {
        let prior = flatten_instance_group_spec(&group(2));
        let mut changed = group(3);
        changed.provision_policy = "ReservedOnly".into();
        let desired = flatten_instance_group_spec(&changed);
        let mut out = PatchBuilder::new();
        InstanceGroup::patch_spec(&Changes::new(Some(&prior), Some(&desired)), &mut out);
        let ops = out.into_operations();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path, "/spec/replicas");
        assert_eq!(ops[0].value, serde_json::json!(3));
    }
}
