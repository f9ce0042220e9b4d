//! Instance spec translator. The spec is immutable after creation, so it never
//! produces patch operations; only metadata is patched for instances.

use archon_core::model::{ConfigSpec, FileSpec, Instance, InstanceSpec, LocalObjectReference};
use archon_core::tree::{AttrValue, Block};

use crate::changes::Changes;
use crate::patch::PatchBuilder;
use crate::Translate;

fn put_str(b: &mut Block, key: &str, v: &str) {
    if !v.is_empty() { b.insert(key, AttrValue::string(v)); }
}

fn put_int(b: &mut Block, key: &str, v: i64) {
    if v != 0 { b.insert(key, AttrValue::int(v)); }
}

fn put_list(b: &mut Block, key: &str, list: Vec<Block>) {
    if !list.is_empty() { b.insert(key, AttrValue::BlockList(list)); }
}

fn text(b: &Block, key: &str) -> String { b.str(key).unwrap_or_default().to_string() }

pub fn flatten_instance_spec(spec: &InstanceSpec) -> Block {
    let mut b = Block::new();
    put_str(&mut b, "os", &spec.os);
    put_str(&mut b, "image", &spec.image);
    put_str(&mut b, "instance_type", &spec.instance_type);
    put_str(&mut b, "network_name", &spec.network_name);
    put_str(&mut b, "reclaim_policy", &spec.reclaim_policy);
    put_list(&mut b, "files", spec.files.iter().map(flatten_file).collect());
    put_list(&mut b, "secrets", flatten_references(&spec.secrets));
    put_list(&mut b, "configs", spec.configs.iter().map(flatten_config).collect());
    put_list(&mut b, "users", flatten_references(&spec.users));
    put_str(&mut b, "hostname", &spec.hostname);
    if let Some(r) = spec.reserved_instance_ref.as_ref().filter(|r| !r.name.is_empty()) {
        b.insert("reserved_instance_ref", Block::new().with("name", AttrValue::string(&r.name)));
    }
    b
}

pub fn expand_instance_spec(b: &Block) -> InstanceSpec {
    InstanceSpec {
        os: text(b, "os"),
        image: text(b, "image"),
        instance_type: text(b, "instance_type"),
        network_name: text(b, "network_name"),
        reclaim_policy: text(b, "reclaim_policy"),
        files: b.blocks("files").iter().map(expand_file).collect(),
        secrets: expand_references(b.blocks("secrets")),
        configs: b.blocks("configs").iter().map(expand_config).collect(),
        users: expand_references(b.blocks("users")),
        hostname: text(b, "hostname"),
        reserved_instance_ref: b.block("reserved_instance_ref").map(|r| LocalObjectReference { name: text(r, "name") }),
    }
}

fn flatten_file(f: &FileSpec) -> Block {
    let mut b = Block::new();
    put_str(&mut b, "name", &f.name);
    put_str(&mut b, "encoding", &f.encoding);
    put_str(&mut b, "content", &f.content);
    put_str(&mut b, "template", &f.template);
    put_str(&mut b, "owner", &f.owner);
    put_int(&mut b, "user_id", f.user_id);
    put_int(&mut b, "group_id", f.group_id);
    put_str(&mut b, "filesystem", &f.filesystem);
    put_str(&mut b, "path", &f.path);
    put_str(&mut b, "raw_file_permissions", &f.raw_file_permissions);
    b
}

fn expand_file(b: &Block) -> FileSpec {
    FileSpec {
        name: text(b, "name"),
        encoding: text(b, "encoding"),
        content: text(b, "content"),
        template: text(b, "template"),
        owner: text(b, "owner"),
        user_id: b.int("user_id").unwrap_or_default(),
        group_id: b.int("group_id").unwrap_or_default(),
        filesystem: text(b, "filesystem"),
        path: text(b, "path"),
        raw_file_permissions: text(b, "raw_file_permissions"),
    }
}

fn flatten_config(c: &ConfigSpec) -> Block {
    let mut b = Block::new();
    put_str(&mut b, "name", &c.name);
    if !c.data.is_empty() { b.insert("data", c.data.clone()); }
    b
}

fn expand_config(b: &Block) -> ConfigSpec {
    ConfigSpec { name: text(b, "name"), data: b.map("data").cloned().unwrap_or_default() }
}

fn flatten_references(refs: &[LocalObjectReference]) -> Vec<Block> {
    refs.iter().map(|r| Block::new().with("name", AttrValue::string(&r.name))).collect()
}

fn expand_references(blocks: &[Block]) -> Vec<LocalObjectReference> {
    blocks.iter().map(|b| LocalObjectReference { name: text(b, "name") }).collect()
}

impl Translate for Instance {
    fn flatten_spec(spec: &InstanceSpec) -> Block { flatten_instance_spec(spec) }

    fn expand_spec(block: &Block) -> InstanceSpec { expand_instance_spec(block) }

    fn patch_spec(_changes: &Changes<'_>, _out: &mut PatchBuilder) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn full_spec() -> InstanceSpec {
        InstanceSpec {
            os: "CoreOS".into(),
            image: "ami-123".into(),
            instance_type: "t2.small".into(),
            network_name: "net".into(),
            reclaim_policy: "Delete".into(),
            files: vec![FileSpec {
                name: "units".into(),
                encoding: "base64".into(),
                content: "Zm9v".into(),
                template: "{{.Hostname}}".into(),
                owner: "core".into(),
                user_id: 500,
                group_id: 500,
                filesystem: "root".into(),
                path: "/etc/motd".into(),
                raw_file_permissions: "0644".into(),
            }],
            secrets: vec![LocalObjectReference { name: "tls".into() }],
            configs: vec![ConfigSpec {
                name: "cfg".into(),
                data: BTreeMap::from([("k".to_string(), "v".to_string())]),
            }],
            users: vec![LocalObjectReference { name: "core".into() }],
            hostname: "web-0".into(),
            reserved_instance_ref: Some(LocalObjectReference { name: "ri-1".into() }),
        }
    }

    #[test]
    fn every_file_field_round_trips_to_itself() {
        let spec = full_spec();
        assert_eq!(expand_instance_spec(&flatten_instance_spec(&spec)), spec);
    }

    #[test]
    fn zero_values_are_not_emitted() {
        let b = flatten_instance_spec(&InstanceSpec { os: "CoreOS".into(), network_name: "n".into(), ..Default::default() });
        assert_eq!(b.keys().collect::<Vec<_>>(), vec!["network_name", "os"]);
    }

    #[test]
    fn expand_skips_mismatched_shapes() {
        let b = Block::new()
            .with("os", AttrValue::int(7))
            .with("files", AttrValue::string("not a list"))
            .with("hostname", AttrValue::string("h"));
        let spec = expand_instance_spec(&b);
        assert_eq!(spec.os, "");
        assert!(spec.files.is_empty());
        assert_eq!(spec.hostname, "h");
        assert!(spec.reserved_instance_ref.is_none());
    }

    #[test]
    fn spec_changes_produce_no_operations() {
        let prior = flatten_instance_spec(&full_spec());
        let desired = flatten_instance_spec(&InstanceSpec { image: "ami-999".into(), ..full_spec() });
        let mut out = PatchBuilder::new();
        Instance::patch_spec(&Changes::new(Some(&prior), Some(&desired)), &mut out);
        assert!(out.is_empty());
    }
}
