//! Replace-only JSON patch operations and their single-use builder.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Replace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: Op,
    pub path: String,
    pub value: Json,
}

/// Accumulates operations in the order fields are visited. Operations are
/// never dropped once pushed; the builder is consumed by serialization.
#[derive(Debug, Default)]
pub struct PatchBuilder {
    ops: Vec<PatchOperation>,
}

impl PatchBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn replace(&mut self, path: impl Into<String>, value: impl Into<Json>) {
        self.ops.push(PatchOperation { op: Op::Replace, path: path.into(), value: value.into() });
    }

    pub fn len(&self) -> usize { self.ops.len() }

    pub fn is_empty(&self) -> bool { self.ops.is_empty() }

    pub fn operations(&self) -> &[PatchOperation] { &self.ops }

    pub fn into_operations(self) -> Vec<PatchOperation> { self.ops }

    /// JSON array body for a `PatchKind::Json` request.
    pub fn into_wire_payload(self) -> Result<Vec<u8>, serde_json::Error> { serde_json::to_vec(&self.ops) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_payload_is_an_ordered_array() {
        let mut b = PatchBuilder::new();
        b.replace("/metadata/labels", serde_json::json!({"a": "1"}));
        b.replace("/spec/replicas", 3);
        assert_eq!(b.len(), 2);
        let body = b.into_wire_payload().unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            r#"[{"op":"replace","path":"/metadata/labels","value":{"a":"1"}},{"op":"replace","path":"/spec/replicas","value":3}]"#
        );
    }

    #[test]
    fn empty_builder_serializes_to_empty_array() {
        assert_eq!(PatchBuilder::new().into_wire_payload().unwrap(), b"[]".to_vec());
    }
}
