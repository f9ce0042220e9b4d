//! User spec translator. Every field is patchable in place.

use archon_core::model::{User, UserSpec};
use archon_core::tree::{AttrValue, Block};

use crate::changes::Changes;
use crate::patch::PatchBuilder;
use crate::Translate;

impl Translate for User {
    fn flatten_spec(spec: &UserSpec) -> Block {
        let mut b = Block::new();
        if !spec.name.is_empty() { b.insert("name", AttrValue::string(&spec.name)); }
        if !spec.password_hash.is_empty() { b.insert("password_hash", AttrValue::string(&spec.password_hash)); }
        if !spec.ssh_authorized_keys.is_empty() {
            b.insert("ssh_authorized_keys", AttrValue::string_set(spec.ssh_authorized_keys.iter().cloned()));
        }
        if !spec.sudo.is_empty() { b.insert("sudo", AttrValue::string(&spec.sudo)); }
        if !spec.shell.is_empty() { b.insert("shell", AttrValue::string(&spec.shell)); }
        b
    }

    fn expand_spec(b: &Block) -> UserSpec {
        let text = |k: &str| b.str(k).unwrap_or_default().to_string();
        UserSpec {
            name: text("name"),
            password_hash: text("password_hash"),
            ssh_authorized_keys: b
                .set("ssh_authorized_keys")
                .map(|set| set.iter().filter_map(|k| k.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
            sudo: text("sudo"),
            shell: text("shell"),
        }
    }

    fn patch_spec(changes: &Changes<'_>, out: &mut PatchBuilder) {
        if changes.changed("name") { out.replace("/spec/name", changes.string("name")); }
        if changes.changed("password_hash") { out.replace("/spec/passwordHash", changes.string("password_hash")); }
        if changes.changed("ssh_authorized_keys") { out.replace("/spec/sshAuthorizedKeys", changes.set("ssh_authorized_keys")); }
        if changes.changed("sudo") { out.replace("/spec/sudo", changes.string("sudo")); }
        if changes.changed("shell") { out.replace("/spec/shell", changes.string("shell")); }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> UserSpec {
        UserSpec {
            name: "core".into(),
            password_hash: "$6$abc".into(),
            ssh_authorized_keys: vec!["ssh-ed25519 AAAA a@b".into(), "ssh-rsa BBBB c@d".into()],
            sudo: "ALL=(ALL) NOPASSWD:ALL".into(),
            shell: "/bin/bash".into(),
        }
    }

    #[test]
    fn keys_are_read_from_their_own_slot() {
        let b = User::flatten_spec(&spec());
        assert_eq!(User::expand_spec(&b), spec());
    }

    #[test]
    fn patch_uses_wire_field_names() {
        let prior = User::flatten_spec(&spec());
        let desired = User::flatten_spec(&UserSpec {
            password_hash: "$6$new".into(),
            ssh_authorized_keys: vec!["ssh-rsa BBBB c@d".into()],
            ..spec()
        });
        let mut out = PatchBuilder::new();
        User::patch_spec(&Changes::new(Some(&prior), Some(&desired)), &mut out);
        let paths: Vec<&str> = out.operations().iter().map(|o| o.path.as_str()).collect();
        assert_eq!(paths, vec!["/spec/passwordHash", "/spec/sshAuthorizedKeys"]);
        assert_eq!(out.operations()[1].value, serde_json::json!(["ssh-rsa BBBB c@d"]));
    }
}
