//! Registry of the four resource types, each backed by its own coordinator.

use std::collections::BTreeMap;
use std::sync::Arc;

use archon_core::model::{Instance, InstanceGroup, Network, User};
use archon_core::{EventSource, ResourceClient};
use archon_schema::ResourceSchema;

use crate::coordinator::{Coordinator, Lifecycle};
use crate::poller::PollerConfig;

/// A client able to serve every Archon kind.
pub trait ArchonClient:
    ResourceClient<Instance> + ResourceClient<InstanceGroup> + ResourceClient<Network> + ResourceClient<User> + 'static
{
}

impl<T> ArchonClient for T where
    T: ResourceClient<Instance> + ResourceClient<InstanceGroup> + ResourceClient<Network> + ResourceClient<User> + 'static
{
}

pub struct Provider {
    resources: BTreeMap<&'static str, Arc<dyn Lifecycle>>,
}

impl Provider {
    pub fn new<C: ArchonClient>(client: Arc<C>, events: Arc<dyn EventSource>, poller: PollerConfig) -> Self {
        let mut resources: BTreeMap<&'static str, Arc<dyn Lifecycle>> = BTreeMap::new();
        let instance: Arc<dyn ResourceClient<Instance>> = client.clone();
        let group: Arc<dyn ResourceClient<InstanceGroup>> = client.clone();
        let network: Arc<dyn ResourceClient<Network>> = client.clone();
        let user: Arc<dyn ResourceClient<User>> = client;
        let all: [Arc<dyn Lifecycle>; 4] = [
            Arc::new(Coordinator::<Instance>::new(&archon_schema::INSTANCE, instance, events.clone(), poller)),
            Arc::new(Coordinator::<InstanceGroup>::new(&archon_schema::INSTANCE_GROUP, group, events.clone(), poller)),
            Arc::new(Coordinator::<Network>::new(&archon_schema::NETWORK, network, events.clone(), poller)),
            Arc::new(Coordinator::<User>::new(&archon_schema::USER, user, events, poller)),
        ];
        for lc in all {
            resources.insert(lc.type_name(), lc);
        }
        Self { resources }
    }

    pub fn resource(&self, type_name: &str) -> Option<&dyn Lifecycle> { self.resources.get(type_name).map(|r| r.as_ref()) }

    pub fn schema(&self, type_name: &str) -> Option<&'static ResourceSchema> { self.resource(type_name).map(|r| r.schema()) }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ { self.resources.keys().copied() }
}
