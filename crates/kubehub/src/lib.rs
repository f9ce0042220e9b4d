//! Archon kubehub: the `archon.kubeup.com/v1` resources and core/v1 warning
//! events, reached through a kube client.

#![forbid(unsafe_code)]

use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use archon_core::model::{Event, ObjectMeta, Resource, API_GROUP, API_VERSION};
use archon_core::{EventSource, PatchKind, ProviderError, ProviderResult, ResourceClient};
use k8s_openapi::api::core::v1 as corev1;
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    config::KubeConfigOptions,
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Client, Config,
};
use metrics::{counter, histogram};
use serde_json::Value as Json;
use tracing::{debug, info};

/// Client from the default kubeconfig inference, or from a named context.
pub async fn get_kube_client(context: Option<&str>) -> Result<Client> {
    let Some(ctx) = context else {
        return Client::try_default().await.context("building kube client");
    };
    let opts = KubeConfigOptions { context: Some(ctx.to_string()), ..Default::default() };
    let config = Config::from_kubeconfig(&opts).await.with_context(|| format!("loading kubeconfig context {ctx}"))?;
    Client::try_from(config).context("building kube client")
}

#[derive(Clone)]
pub struct KubeArchon {
    client: Client,
}

impl KubeArchon {
    pub fn new(client: Client) -> Self { Self { client } }

    pub async fn connect(context: Option<&str>) -> Result<Self> {
        let client = get_kube_client(context).await?;
        info!(context = ?context, "kubehub: connected");
        Ok(Self::new(client))
    }

    fn api<R: Resource>(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &api_resource::<R>())
    }
}

pub fn api_resource<R: Resource>() -> ApiResource {
    ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(API_GROUP, API_VERSION, R::KIND), R::PLURAL)
}

/// Create body: server-assigned metadata and status stripped, type meta added.
fn to_dynamic<R: Resource>(obj: &R) -> ProviderResult<DynamicObject> {
    let mut v = serde_json::to_value(obj)?;
    if let Some(map) = v.as_object_mut() {
        map.remove("status");
        map.insert("metadata".into(), serde_json::to_value(obj.metadata().for_submit())?);
        map.insert("apiVersion".into(), Json::String(format!("{API_GROUP}/{API_VERSION}")));
        map.insert("kind".into(), Json::String(R::KIND.to_string()));
    }
    Ok(serde_json::from_value(v)?)
}

fn from_dynamic<R: Resource>(obj: DynamicObject) -> ProviderResult<R> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

fn map_kube_err(kind: &str, namespace: &str, name: &str, e: kube::Error) -> ProviderError {
    match &e {
        kube::Error::Api(resp) if resp.code == 404 => ProviderError::not_found(kind, namespace, name),
        _ => {
            counter!("kubehub_errors_total", 1u64);
            ProviderError::Transport(anyhow!(e))
        }
    }
}

#[async_trait::async_trait]
impl<R: Resource> ResourceClient<R> for KubeArchon {
    async fn create(&self, obj: &R) -> ProviderResult<R> {
        let t0 = Instant::now();
        let meta = obj.metadata();
        let body = to_dynamic(obj)?;
        let out = self
            .api::<R>(&meta.namespace)
            .create(&PostParams::default(), &body)
            .await
            .map_err(|e| map_kube_err(R::KIND, &meta.namespace, &meta.name, e))?;
        histogram!("kubehub_request_ms", t0.elapsed().as_secs_f64() * 1000.0);
        debug!(kind = R::KIND, ns = %meta.namespace, took_ms = %t0.elapsed().as_millis(), "kubehub: create ok");
        from_dynamic(out)
    }

    async fn get(&self, namespace: &str, name: &str) -> ProviderResult<R> {
        let t0 = Instant::now();
        let out = self.api::<R>(namespace).get(name).await.map_err(|e| map_kube_err(R::KIND, namespace, name, e))?;
        histogram!("kubehub_request_ms", t0.elapsed().as_secs_f64() * 1000.0);
        from_dynamic(out)
    }

    async fn patch(&self, namespace: &str, name: &str, kind: PatchKind, body: &[u8]) -> ProviderResult<R> {
        let t0 = Instant::now();
        let patch = match kind {
            PatchKind::Json => Patch::Json::<()>(serde_json::from_slice::<json_patch::Patch>(body)?),
        };
        let out = self
            .api::<R>(namespace)
            .patch(name, &PatchParams::default(), &patch)
            .await
            .map_err(|e| map_kube_err(R::KIND, namespace, name, e))?;
        histogram!("kubehub_request_ms", t0.elapsed().as_secs_f64() * 1000.0);
        debug!(kind = R::KIND, ns = %namespace, name = %name, content_type = kind.content_type(), "kubehub: patch ok");
        from_dynamic(out)
    }

    async fn delete(&self, namespace: &str, name: &str) -> ProviderResult<()> {
        self.api::<R>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_kube_err(R::KIND, namespace, name, e))?;
        Ok(())
    }
}

pub fn warning_selector(meta: &ObjectMeta, kind: &str) -> String {
    format!(
        "involvedObject.name={},involvedObject.namespace={},involvedObject.kind={},type=Warning",
        meta.name, meta.namespace, kind
    )
}

fn to_event(e: corev1::Event) -> Event {
    Event {
        reason: e.reason.unwrap_or_default(),
        message: e.message.unwrap_or_default(),
        count: e.count.unwrap_or_default(),
        last_timestamp: e.last_timestamp.map(|t| t.0).or(e.event_time.map(|t| t.0)),
    }
}

/// Newest first, then truncated to `limit`.
fn newest(mut events: Vec<Event>, limit: usize) -> Vec<Event> {
    events.sort_by(|a, b| b.last_timestamp.cmp(&a.last_timestamp));
    events.truncate(limit);
    events
}

#[async_trait::async_trait]
impl EventSource for KubeArchon {
    async fn list_recent_warnings(&self, meta: &ObjectMeta, kind: &str, limit: usize) -> ProviderResult<Vec<Event>> {
        let api: Api<corev1::Event> = Api::namespaced(self.client.clone(), &meta.namespace);
        let lp = ListParams::default().fields(&warning_selector(meta, kind));
        let list = api.list(&lp).await.map_err(|e| ProviderError::Transport(anyhow!(e).context("listing warning events")))?;
        Ok(newest(list.items.into_iter().map(to_event).collect(), limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archon_core::model::{Instance, InstanceSpec, InstanceStatus, Network};
    use chrono::TimeZone;

    #[test]
    fn create_body_strips_server_fields() {
        let inst = Instance {
            metadata: ObjectMeta { name: "i".into(), namespace: "ns".into(), uid: "u".into(), resource_version: "9".into(), ..Default::default() },
            spec: InstanceSpec { os: "CoreOS".into(), network_name: "n".into(), ..Default::default() },
            status: InstanceStatus { phase: "Running".into(), ..Default::default() },
        };
        let dynobj = to_dynamic(&inst).unwrap();
        let v = serde_json::to_value(&dynobj).unwrap();
        assert_eq!(v["apiVersion"], "archon.kubeup.com/v1");
        assert_eq!(v["kind"], "Instance");
        assert!(v["metadata"].get("uid").is_none());
        assert!(v["metadata"].get("resourceVersion").is_none());
        assert!(v.get("status").is_none());
        assert_eq!(v["spec"]["networkName"], "n");
    }

    #[test]
    fn dynamic_objects_decode_into_domain_types() {
        let raw = serde_json::json!({
            "apiVersion": "archon.kubeup.com/v1",
            "kind": "Network",
            "metadata": {"name": "net", "namespace": "default", "uid": "123", "creationTimestamp": "2020-01-01T00:00:00Z"},
            "spec": {"region": "first", "zone": "second", "subnet": "10.0.0.0/24"}
        });
        let dynobj: DynamicObject = serde_json::from_value(raw).unwrap();
        let net: Network = from_dynamic(dynobj).unwrap();
        assert_eq!(net.metadata.uid, "123");
        assert_eq!(net.spec.subnet, "10.0.0.0/24");
    }

    #[test]
    fn plural_paths_match_the_api_group() {
        let ar = api_resource::<Instance>();
        assert_eq!(ar.group, "archon.kubeup.com");
        assert_eq!(ar.plural, "instances");
        assert_eq!(ar.api_version, "archon.kubeup.com/v1");
    }

    #[test]
    fn warnings_are_newest_first_and_limited() {
        let at = |s: i64| Some(chrono::Utc.timestamp_opt(s, 0).unwrap());
        let ev = |m: &str, ts| Event { reason: "R".into(), message: m.into(), count: 1, last_timestamp: ts };
        let out = newest(vec![ev("old", at(10)), ev("none", None), ev("new", at(30)), ev("mid", at(20))], 3);
        let msgs: Vec<&str> = out.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(msgs, vec!["new", "mid", "old"]);
    }

    #[test]
    fn selector_targets_warning_events_of_the_object() {
        let meta = ObjectMeta { name: "web".into(), namespace: "prod".into(), ..Default::default() };
        assert_eq!(
            warning_selector(&meta, "Instance"),
            "involvedObject.name=web,involvedObject.namespace=prod,involvedObject.kind=Instance,type=Warning"
        );
    }
}
