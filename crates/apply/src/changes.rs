//! Field-level change tracking between the prior and desired tree of one block.

use archon_core::tree::{equivalent, AttrValue, Block, EMPTY};
use serde_json::Value as Json;

#[derive(Debug, Clone, Copy)]
pub struct Changes<'a> {
    prior: &'a Block,
    desired: &'a Block,
}

impl<'a> Changes<'a> {
    /// An absent block compares as an empty one.
    pub fn new(prior: Option<&'a Block>, desired: Option<&'a Block>) -> Self {
        Self { prior: prior.unwrap_or(&EMPTY), desired: desired.unwrap_or(&EMPTY) }
    }

    /// Zero values and absent slots compare equal on both checks.
    pub fn any(&self) -> bool { !self.prior.equivalent(self.desired) }

    pub fn changed(&self, key: &str) -> bool { !equivalent(self.prior.get(key), self.desired.get(key)) }

    /// Desired string, `""` when unset.
    pub fn string(&self, key: &str) -> Json { Json::String(self.desired.str(key).unwrap_or_default().to_string()) }

    /// Desired integer, `0` when unset.
    pub fn int(&self, key: &str) -> Json { Json::from(self.desired.int(key).unwrap_or_default()) }

    /// Desired set as an array (set order), `[]` when unset.
    pub fn set(&self, key: &str) -> Json {
        self.desired.get(key).filter(|v| matches!(v, AttrValue::Set(_))).map(AttrValue::to_json).unwrap_or(Json::Array(Vec::new()))
    }

    /// Desired map, `{}` when unset.
    pub fn map(&self, key: &str) -> Json {
        self.desired.get(key).filter(|v| matches!(v, AttrValue::Map(_))).map(AttrValue::to_json).unwrap_or(Json::Object(Default::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_fields_read_as_zero_values() {
        let prior = Block::new()
            .with("zone", AttrValue::string("a"))
            .with("keys", AttrValue::string_set(["k"]));
        let desired = Block::new();
        let c = Changes::new(Some(&prior), Some(&desired));
        assert!(c.any());
        assert!(c.changed("zone"));
        assert!(!c.changed("region"));
        assert_eq!(c.string("zone"), Json::String(String::new()));
        assert_eq!(c.set("keys"), serde_json::json!([]));
        assert_eq!(c.map("labels"), serde_json::json!({}));
        assert_eq!(c.int("replicas"), serde_json::json!(0));
    }

    #[test]
    fn absent_blocks_compare_equal() {
        let c = Changes::new(None, Some(&EMPTY));
        assert!(!c.any());
    }

    #[test]
    fn explicit_zeros_are_not_changes() {
        let prior = Block::new().with("zone", AttrValue::string("a"));
        let desired = Block::new()
            .with("zone", AttrValue::string("a"))
            .with("replicas", AttrValue::int(0))
            .with("labels", AttrValue::Map(Default::default()));
        let c = Changes::new(Some(&prior), Some(&desired));
        assert!(!c.any());
        assert!(!c.changed("replicas"));
        assert!(!c.changed("labels"));

        let scaled = Block::new().with("replicas", AttrValue::int(1));
        assert!(Changes::new(Some(&desired), Some(&scaled)).changed("replicas"));
    }
}
