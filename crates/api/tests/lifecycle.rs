use std::sync::Arc;
use std::time::Duration;

use archon_api::mock::{MockEvents, MockClient, Verb};
use archon_api::{Lifecycle, PollerConfig, Provider, ResourceState};
use archon_core::model::{InstanceGroup, Network};
use archon_core::tree::{AttrValue, Block};
use archon_core::ProviderError;
use serde_json::json;

fn poller() -> PollerConfig { PollerConfig { timeout: Duration::from_secs(30), interval: Duration::from_secs(1), warning_events: 3 } }

fn setup() -> (Arc<MockClient>, Arc<MockEvents>, Provider) {
    setup_with(MockEvents::default())
}

fn setup_with(events: MockEvents) -> (Arc<MockClient>, Arc<MockEvents>, Provider) {
    setup_cfg(events, poller())
}

fn setup_cfg(events: MockEvents, cfg: PollerConfig) -> (Arc<MockClient>, Arc<MockEvents>, Provider) {
    let store = Arc::new(MockClient::new());
    let events = Arc::new(events);
    let provider = Provider::new(store.clone(), events.clone(), cfg);
    (store, events, provider)
}

fn meta(name: &str) -> Block { Block::new().with("name", AttrValue::string(name)).with("namespace", AttrValue::string("default")) }

fn network(name: &str) -> Block {
    Block::new().with("metadata", meta(name)).with(
        "spec",
        Block::new()
            .with("region", AttrValue::string("first"))
            .with("zone", AttrValue::string("second"))
            .with("subnet", AttrValue::string("10.0.0.0/24")),
    )
}

fn instance(name: &str) -> Block {
    Block::new()
        .with("metadata", meta(name))
        .with("spec", Block::new().with("os", AttrValue::string("CoreOS")).with("network_name", AttrValue::string("net")))
}

fn group(name: &str, replicas: i64) -> Block {
    let template = Block::new().with("spec", Block::new().with("os", AttrValue::string("CoreOS")).with("network_name", AttrValue::string("net")));
    Block::new()
        .with("metadata", meta(name))
        .with("spec", Block::new().with("replicas", AttrValue::int(replicas)).with("template", template))
}

fn lifecycle<'a>(p: &'a Provider, type_name: &str) -> &'a dyn Lifecycle { p.resource(type_name).unwrap() }

#[tokio::test]
async fn network_create_reads_back_exactly_the_three_fields() {
    let (_store, _events, p) = setup();
    let mut state = ResourceState::desired(network("net"));
    lifecycle(&p, "archon_network").create(&mut state).await.unwrap();

    assert_eq!(state.id.as_deref(), Some("default/net"));
    let spec = state.attrs.block("spec").unwrap();
    assert_eq!(spec.len(), 3);
    assert_eq!(spec.str("region"), Some("first"));
    assert_eq!(spec.str("zone"), Some("second"));
    assert_eq!(spec.str("subnet"), Some("10.0.0.0/24"));
    let md = state.attrs.block("metadata").unwrap();
    assert!(!md.str("uid").unwrap_or_default().is_empty());
    assert_eq!(md.str("self_link"), Some("/apis/archon.kubeup.com/v1/namespaces/default/networks/net"));
}

#[tokio::test]
async fn replica_change_sends_a_single_replace() {
    let (store, _events, p) = setup();
    let lc = lifecycle(&p, "archon_instancegroup");
    let mut state = ResourceState::desired(group("web", 2));
    lc.create(&mut state).await.unwrap();

    let mut desired = state.attrs.clone();
    let spec = desired.block("spec").unwrap().clone().with("replicas", AttrValue::int(3));
    desired.insert("spec", spec);
    lc.update(&mut state, &desired).await.unwrap();

    let patches: Vec<_> = store.calls().into_iter().filter(|c| c.verb == Verb::Patch).collect();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].body, Some(json!([{"op": "replace", "path": "/spec/replicas", "value": 3}])));
    assert_eq!(state.attrs.block("spec").unwrap().int("replicas"), Some(3));
    assert_eq!(store.stored::<InstanceGroup>("default", "web").unwrap().spec.replicas, 3);
}

#[tokio::test]
async fn unchanged_update_makes_no_calls() {
    let (store, _events, p) = setup();
    let lc = lifecycle(&p, "archon_network");
    let mut state = ResourceState::desired(network("net"));
    lc.create(&mut state).await.unwrap();
    let before = store.calls().len();
    let snapshot = state.clone();

    lc.update(&mut state, &snapshot.attrs).await.unwrap();
    assert_eq!(store.calls().len(), before);
    assert_eq!(state, snapshot);
}

#[tokio::test]
async fn out_of_band_delete_is_observed() {
    let (store, _events, p) = setup();
    let lc = lifecycle(&p, "archon_network");
    let mut state = ResourceState::desired(network("net"));
    lc.create(&mut state).await.unwrap();
    assert!(lc.exists(&state).await.unwrap());

    assert!(store.remove_out_of_band::<Network>("default", "net"));
    assert!(!lc.exists(&state).await.unwrap());
    lc.read(&mut state).await.unwrap();
    assert_eq!(state.id, None);
    assert!(state.attrs.is_empty());
}

#[tokio::test]
async fn exists_propagates_transport_errors() {
    let (store, _events, p) = setup();
    let lc = lifecycle(&p, "archon_network");
    let mut state = ResourceState::desired(network("net"));
    lc.create(&mut state).await.unwrap();

    store.fail(Verb::Get, "connection refused");
    let err = lc.exists(&state).await.unwrap_err();
    assert!(matches!(err, ProviderError::Transport(_)));
}

#[tokio::test]
async fn delete_of_a_vanished_object_succeeds() {
    let (store, _events, p) = setup();
    let lc = lifecycle(&p, "archon_network");
    let mut state = ResourceState::desired(network("net"));
    lc.create(&mut state).await.unwrap();
    store.remove_out_of_band::<Network>("default", "net");

    lc.delete(&mut state).await.unwrap();
    assert_eq!(state.id, None);
    assert_eq!(store.calls().iter().filter(|c| c.verb == Verb::Delete).count(), 1);
}

#[tokio::test]
async fn deleting_the_same_identifier_twice_succeeds() {
    let (store, _events, p) = setup();
    let lc = lifecycle(&p, "archon_network");
    let mut state = ResourceState::desired(network("net"));
    lc.create(&mut state).await.unwrap();
    let mut again = state.clone();

    lc.delete(&mut state).await.unwrap();
    lc.delete(&mut again).await.unwrap();
    assert_eq!(store.calls().iter().filter(|c| c.verb == Verb::Delete).count(), 2);
    // a cleared state has nothing left to delete
    lc.delete(&mut state).await.unwrap();
    assert_eq!(store.calls().iter().filter(|c| c.verb == Verb::Delete).count(), 2);
}

#[tokio::test(start_paused = true)]
async fn instance_create_waits_for_running() {
    let (store, _events, p) = setup();
    store.script_phases("default", "vm", &["", "Pending", "Running"]);
    let mut state = ResourceState::desired(instance("vm"));
    lifecycle(&p, "archon_instance").create(&mut state).await.unwrap();

    assert_eq!(state.id.as_deref(), Some("default/vm"));
    assert_eq!(state.attrs.block("spec").unwrap().str("os"), Some("CoreOS"));
    let gets = store.calls().iter().filter(|c| c.verb == Verb::Get).count();
    // three polls plus the final read
    assert_eq!(gets, 4);
}

#[tokio::test(start_paused = true)]
async fn convergence_timeout_carries_warning_events() {
    let (_store, _events, p) = setup_with(MockEvents::with_events(vec![
        MockEvents::warning("FailedScheduling", "no capacity in zone"),
    ]));
    let mut state = ResourceState::desired(instance("vm"));
    let err = lifecycle(&p, "archon_instance").create(&mut state).await.unwrap_err();

    assert!(matches!(err, ProviderError::ConvergenceTimeout { .. }));
    let text = err.to_string();
    assert!(text.contains("timeout while waiting for state to become 'Running' (last state: 'Pending', timeout: 30s)"), "{text}");
    assert!(text.contains("Recent warning events:\n- FailedScheduling: no capacity in zone"), "{text}");
    assert_eq!(state.id.as_deref(), Some("default/vm"));
}

#[tokio::test(start_paused = true)]
async fn unexpected_phase_fails_immediately() {
    let (store, _events, p) = setup();
    store.script_phases("default", "vm", &["Failed"]);
    let mut state = ResourceState::desired(instance("vm"));
    let err = lifecycle(&p, "archon_instance").create(&mut state).await.unwrap_err();

    assert!(matches!(err, ProviderError::ConvergenceObserved { .. }));
    assert!(err.to_string().starts_with("unexpected state 'Failed', wanted target 'Running'"));
}

#[tokio::test(start_paused = true)]
async fn failed_event_fetch_keeps_the_root_cause() {
    let (_store, events, p) = setup();
    events.fail("events is forbidden");
    let mut state = ResourceState::desired(instance("vm"));
    let err = lifecycle(&p, "archon_instance").create(&mut state).await.unwrap_err();

    let text = err.to_string();
    assert!(text.starts_with("timeout while waiting for state to become 'Running'"), "{text}");
    assert!(text.contains("could not fetch warning events: events is forbidden"), "{text}");
    assert_eq!(events.requests(), 1);
}

#[tokio::test]
async fn import_adopts_existing_objects() {
    let (_store, _events, p) = setup();
    let lc = lifecycle(&p, "archon_network");
    let mut created = ResourceState::desired(network("net"));
    lc.create(&mut created).await.unwrap();

    let imported = lc.import("default/net").await.unwrap();
    assert_eq!(imported, created);

    assert!(lc.import("default/missing").await.unwrap_err().is_not_found());
    assert!(matches!(lc.import("net").await.unwrap_err(), ProviderError::MalformedIdentifier(_)));
}

#[tokio::test]
async fn generated_names_flow_into_the_identifier() {
    let (_store, _events, p) = setup();
    let md = Block::new().with("generate_name", AttrValue::string("net-")).with("namespace", AttrValue::string("default"));
    let attrs = network("unused").with("metadata", md);
    let mut state = ResourceState::desired(attrs);
    lifecycle(&p, "archon_network").create(&mut state).await.unwrap();

    let id = state.id.unwrap();
    assert!(id.starts_with("default/net-"), "{id}");
    assert_eq!(state.attrs.block("metadata").unwrap().str("generate_name"), Some("net-"));
}

#[tokio::test]
async fn failed_patch_leaves_state_untouched() {
    let (store, _events, p) = setup();
    let lc = lifecycle(&p, "archon_instancegroup");
    let mut state = ResourceState::desired(group("web", 2));
    lc.create(&mut state).await.unwrap();
    let snapshot = state.clone();

    store.fail(Verb::Patch, "etcdserver: request timed out");
    let desired = group("web", 3);
    let err = lc.update(&mut state, &desired).await.unwrap_err();
    assert!(matches!(err, ProviderError::Transport(_)));
    assert_eq!(state, snapshot);
    assert_eq!(store.stored::<InstanceGroup>("default", "web").unwrap().spec.replicas, 2);
}

#[tokio::test(start_paused = true)]
async fn refresh_failure_while_polling_carries_events() {
    let (store, _events, p) = setup_with(MockEvents::with_events(vec![
        MockEvents::warning("FailedAttach", "volume busy"),
    ]));
    store.fail(Verb::Get, "connection reset by peer");
    let mut state = ResourceState::desired(instance("vm"));
    let err = lifecycle(&p, "archon_instance").create(&mut state).await.unwrap_err();

    assert!(matches!(err, ProviderError::ConvergenceObserved { .. }));
    let text = err.to_string();
    assert!(text.starts_with("error while waiting for state to become 'Running': connection reset by peer"), "{text}");
    assert!(text.contains("- FailedAttach: volume busy"), "{text}");
    assert_eq!(state.id.as_deref(), Some("default/vm"));
}

#[tokio::test]
async fn failed_create_assigns_no_identifier() {
    let (store, _events, p) = setup();
    store.fail(Verb::Create, "admission webhook denied the request");
    let mut state = ResourceState::desired(network("net"));
    let err = lifecycle(&p, "archon_network").create(&mut state).await.unwrap_err();

    assert!(matches!(err, ProviderError::Transport(_)));
    assert!(err.to_string().contains("admission webhook denied"));
    assert_eq!(state.id, None);
    assert!(store.stored::<Network>("default", "net").is_none());
}

#[tokio::test(start_paused = true)]
async fn extreme_poller_settings_still_converge() {
    let cfg = PollerConfig { timeout: Duration::MAX, interval: Duration::ZERO, warning_events: 3 };
    let (store, _events, p) = setup_cfg(MockEvents::default(), cfg);
    store.script_phases("default", "vm", &["Pending", "Pending", "Running"]);
    let mut state = ResourceState::desired(instance("vm"));
    lifecycle(&p, "archon_instance").create(&mut state).await.unwrap();
    assert_eq!(state.id.as_deref(), Some("default/vm"));
}
