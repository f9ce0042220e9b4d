//! Network spec translator.

use archon_core::model::{Network, NetworkSpec};
use archon_core::tree::{AttrValue, Block};

use crate::changes::Changes;
use crate::patch::PatchBuilder;
use crate::Translate;

const FIELDS: [&str; 3] = ["region", "zone", "subnet"];

impl Translate for Network {
    fn flatten_spec(spec: &NetworkSpec) -> Block {
        let mut b = Block::new();
        for (key, value) in FIELDS.into_iter().zip([&spec.region, &spec.zone, &spec.subnet]) {
            if !value.is_empty() { b.insert(key, AttrValue::string(value)); }
        }
        b
    }

    fn expand_spec(b: &Block) -> NetworkSpec {
        let text = |k: &str| b.str(k).unwrap_or_default().to_string();
        NetworkSpec { region: text("region"), zone: text("zone"), subnet: text("subnet") }
    }

    fn patch_spec(changes: &Changes<'_>, out: &mut PatchBuilder) {
        for key in FIELDS {
            if changes.changed(key) {
                out.replace(format!("/spec/{key}"), changes.string(key));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(region: &str, zone: &str, subnet: &str) -> NetworkSpec {
        NetworkSpec { region: region.into(), zone: zone.into(), subnet: subnet.into() }
    }

    #[test]
    fn round_trip_keeps_exactly_three_fields() {
        let s = spec("first", "second", "10.0.0.0/24");
        let b = Network::flatten_spec(&s);
        assert_eq!(b.len(), 3);
        assert_eq!(Network::expand_spec(&b), s);
    }

    #[test]
    fn patches_follow_declaration_order() {
        let prior = Network::flatten_spec(&spec("r1", "z1", "s1"));
        let desired = Network::flatten_spec(&spec("r1", "z2", ""));
        let mut out = PatchBuilder::new();
        Network::patch_spec(&Changes::new(Some(&prior), Some(&desired)), &mut out);
        let ops: Vec<(String, serde_json::Value)> = out.into_operations().into_iter().map(|o| (o.path, o.value)).collect();
        assert_eq!(ops, vec![
            ("/spec/zone".to_string(), serde_json::json!("z2")),
            ("/spec/subnet".to_string(), serde_json::json!("")),
        ]);
    }
}
