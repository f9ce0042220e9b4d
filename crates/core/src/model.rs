//! Typed domain objects of the `archon.kubeup.com/v1` API group.
//!
//! Field names follow the wire (camelCase) representation. Server-assigned
//! metadata (`generation`, `resourceVersion`, `selfLink`, `uid`) is carried for
//! reads but stripped by [`ObjectMeta::for_submit`] before create bodies go out.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};

pub const API_GROUP: &str = "archon.kubeup.com";
pub const API_VERSION: &str = "v1";

fn is_zero_i64(v: &i64) -> bool { *v == 0 }
fn is_zero_i32(v: &i32) -> bool { *v == 0 }

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectMeta {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub generate_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub generation: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub self_link: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub uid: String,
}

impl ObjectMeta {
    /// Copy with the server-assigned, read-only fields cleared.
    pub fn for_submit(&self) -> Self {
        Self {
            name: self.name.clone(),
            generate_name: self.generate_name.clone(),
            namespace: self.namespace.clone(),
            labels: self.labels.clone(),
            annotations: self.annotations.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalObjectReference {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileSpec {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub encoding: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub template: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub owner: String,
    #[serde(rename = "userID", skip_serializing_if = "is_zero_i64")]
    pub user_id: i64,
    #[serde(rename = "groupID", skip_serializing_if = "is_zero_i64")]
    pub group_id: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub filesystem: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(rename = "permissions", skip_serializing_if = "String::is_empty")]
    pub raw_file_permissions: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSpec {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceSpec {
    #[serde(rename = "os", skip_serializing_if = "String::is_empty")]
    pub os: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub instance_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub network_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reclaim_policy: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<LocalObjectReference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub configs: Vec<ConfigSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<LocalObjectReference>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_instance_ref: Option<LocalObjectReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceStatus {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub phase: String,
    #[serde(rename = "privateIP", skip_serializing_if = "String::is_empty")]
    pub private_ip: String,
    #[serde(rename = "publicIP", skip_serializing_if = "String::is_empty")]
    pub public_ip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Instance {
    pub metadata: ObjectMeta,
    pub spec: InstanceSpec,
    #[serde(skip_serializing_if = "is_default_status")]
    pub status: InstanceStatus,
}

fn is_default_status(s: &InstanceStatus) -> bool { *s == InstanceStatus::default() }

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabelSelector {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

/// Secret attached to an instance template. `data` is what the server reports
/// (base64 on the wire); `string_data` is what we submit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", with = "base64_map")]
    pub data: BTreeMap<String, Vec<u8>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub string_data: BTreeMap<String, String>,
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub type_: String,
}

impl Secret {
    /// Effective textual payload: decoded `data` overlaid with `string_data`.
    pub fn text_data(&self) -> BTreeMap<String, String> {
        let mut out: BTreeMap<String, String> = self
            .data
            .iter()
            .map(|(k, v)| (k.clone(), String::from_utf8_lossy(v).into_owned()))
            .collect();
        out.extend(self.string_data.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }
}

mod base64_map {
    use super::*;
    use base64::Engine as _;

    pub fn serialize<S: Serializer>(map: &BTreeMap<String, Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        let encoded: BTreeMap<&String, String> = map
            .iter()
            .map(|(k, v)| (k, base64::engine::general_purpose::STANDARD.encode(v)))
            .collect();
        encoded.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        let raw = BTreeMap::<String, String>::deserialize(d)?;
        raw.into_iter()
            .map(|(k, v)| {
                base64::engine::general_purpose::STANDARD
                    .decode(v.as_bytes())
                    .map(|bytes| (k, bytes))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceTemplateSpec {
    pub metadata: ObjectMeta,
    pub spec: InstanceSpec,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<Secret>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceGroupSpec {
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub replicas: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub provision_policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_instance_selector: Option<LabelSelector>,
    pub template: InstanceTemplateSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceGroup {
    pub metadata: ObjectMeta,
    pub spec: InstanceGroupSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSpec {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub region: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub zone: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subnet: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub metadata: ObjectMeta,
    pub spec: NetworkSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSpec {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password_hash: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_authorized_keys: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sudo: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub shell: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub metadata: ObjectMeta,
    pub spec: UserSpec,
}

/// Phases a resource passes through while it is provisioned asynchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub target: &'static [&'static str],
    pub pending: &'static [&'static str],
}

/// A remote object kind the provider manages.
pub trait Resource: Clone + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Spec: Clone + std::fmt::Debug + Default + PartialEq + Send + Sync;

    const KIND: &'static str;
    const PLURAL: &'static str;
    /// `Some` for kinds whose readiness trails the create call.
    const READINESS: Option<Readiness> = None;

    fn new(metadata: ObjectMeta, spec: Self::Spec) -> Self;
    fn metadata(&self) -> &ObjectMeta;
    fn spec(&self) -> &Self::Spec;

    /// Observed status phase, for kinds that report one.
    fn phase(&self) -> Option<&str> { None }
}

impl Resource for Instance {
    type Spec = InstanceSpec;
    const KIND: &'static str = "Instance";
    const PLURAL: &'static str = "instances";
    // An instance that has not been picked up yet reports an empty phase.
    const READINESS: Option<Readiness> = Some(Readiness { target: &["Running"], pending: &["Pending", ""] });

    fn new(metadata: ObjectMeta, spec: InstanceSpec) -> Self { Self { metadata, spec, status: InstanceStatus::default() } }
    fn metadata(&self) -> &ObjectMeta { &self.metadata }
    fn spec(&self) -> &InstanceSpec { &self.spec }
    fn phase(&self) -> Option<&str> { Some(&self.status.phase) }
}

impl Resource for InstanceGroup {
    type Spec = InstanceGroupSpec;
    const KIND: &'static str = "InstanceGroup";
    const PLURAL: &'static str = "instancegroups";

    fn new(metadata: ObjectMeta, spec: InstanceGroupSpec) -> Self { Self { metadata, spec } }
    fn metadata(&self) -> &ObjectMeta { &self.metadata }
    fn spec(&self) -> &InstanceGroupSpec { &self.spec }
}

impl Resource for Network {
    type Spec = NetworkSpec;
    const KIND: &'static str = "Network";
    const PLURAL: &'static str = "networks";

    fn new(metadata: ObjectMeta, spec: NetworkSpec) -> Self { Self { metadata, spec } }
    fn metadata(&self) -> &ObjectMeta { &self.metadata }
    fn spec(&self) -> &NetworkSpec { &self.spec }
}

impl Resource for User {
    type Spec = UserSpec;
    const KIND: &'static str = "User";
    const PLURAL: &'static str = "users";

    fn new(metadata: ObjectMeta, spec: UserSpec) -> Self { Self { metadata, spec } }
    fn metadata(&self) -> &ObjectMeta { &self.metadata }
    fn spec(&self) -> &UserSpec { &self.spec }
}

/// A diagnostic event reported against an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub reason: String,
    pub message: String,
    pub count: i32,
    pub last_timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_copy_drops_server_fields() {
        let meta = ObjectMeta {
            name: "a".into(),
            namespace: "ns".into(),
            generation: 4,
            resource_version: "99".into(),
            self_link: "/apis/x".into(),
            uid: "u-1".into(),
            ..Default::default()
        };
        let v = serde_json::to_value(meta.for_submit()).unwrap();
        assert_eq!(v, serde_json::json!({"name": "a", "namespace": "ns"}));
    }

    #[test]
    fn secret_data_is_base64_on_the_wire() {
        let raw = serde_json::json!({
            "metadata": {"name": "s"},
            "data": {"token": "aGVsbG8="},
            "type": "Opaque"
        });
        let s: Secret = serde_json::from_value(raw).unwrap();
        assert_eq!(s.data.get("token").map(Vec::as_slice), Some(&b"hello"[..]));
        assert_eq!(s.text_data().get("token").map(String::as_str), Some("hello"));
        let back = serde_json::to_value(&s).unwrap();
        assert_eq!(back["data"]["token"], "aGVsbG8=");
    }

    #[test]
    fn instance_reads_status_phase() {
        let raw = serde_json::json!({
            "metadata": {"name": "i", "namespace": "default", "resourceVersion": "7"},
            "spec": {"os": "CoreOS", "networkName": "net"},
            "status": {"phase": "Pending"}
        });
        let i: Instance = serde_json::from_value(raw).unwrap();
        assert_eq!(i.phase(), Some("Pending"));
        assert_eq!(i.metadata.resource_version, "7");
        assert_eq!(i.spec.network_name, "net");
    }
}
