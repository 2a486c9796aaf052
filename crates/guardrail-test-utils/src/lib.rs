//! Testing utilities for the guardrail workspace
//!
//! Shared fixtures: canned actions and cluster topologies.

#![allow(missing_docs)]

use guardrail_kernel::blast_radius::{DependencyKind, ResourceNode, TopologySnapshot};
use guardrail_kernel::coordinator::TopologyProvider;
use guardrail_kernel::error::TopologyError;
use guardrail_kernel::types::{Action, ActionKind, ResourceRef};

/// Provider that always serves the same snapshot.
pub struct FixedTopology(pub TopologySnapshot);

#[async_trait::async_trait]
impl TopologyProvider for FixedTopology {
    async fn snapshot(&self) -> Result<TopologySnapshot, TopologyError> {
        Ok(self.0.clone())
    }
}

/// Provider whose every query fails, for fail-closed tests.
pub struct UnavailableTopology;

#[async_trait::async_trait]
impl TopologyProvider for UnavailableTopology {
    async fn snapshot(&self) -> Result<TopologySnapshot, TopologyError> {
        Err(TopologyError::QueryFailed("collector offline".into()))
    }
}

pub fn deployment(namespace: &str, name: &str) -> ResourceRef {
    ResourceRef::namespaced("Deployment", namespace, name)
}

pub fn action(kind: ActionKind, target: ResourceRef) -> Action {
    Action::new(kind, target, "test-user")
}

pub fn scale_action(target: ResourceRef, replicas: u32) -> Action {
    let mut action = action(ActionKind::Scale, target);
    action.params.replicas = Some(replicas);
    action
}

pub fn delete_action(target: ResourceRef) -> Action {
    action(ActionKind::Delete, target)
}

pub fn drain_action(nodes: &[&str]) -> Action {
    let mut action = action(
        ActionKind::Drain,
        ResourceRef::cluster("Node", nodes.first().copied().unwrap_or("n1")),
    );
    action.params.nodes = nodes.iter().map(|n| (*n).to_string()).collect();
    action
}

/// Empty cluster: the action target is unknown to the topology.
pub fn empty_topology() -> TopologySnapshot {
    TopologySnapshot::new()
}

/// One deployment owning a replica set owning `pod_count` pods.
pub fn deployment_chain(namespace: &str, name: &str, pod_count: usize) -> TopologySnapshot {
    let mut topology = TopologySnapshot::new();
    let dep = deployment(namespace, name);
    let rs = ResourceRef::namespaced("ReplicaSet", namespace, format!("{name}-7d9f8"));
    topology.insert(ResourceNode::new(dep.clone()).with_replicas(pod_count as u32));
    topology.insert(ResourceNode::new(rs.clone()));
    topology
        .add_dependency(&dep, &rs, DependencyKind::Owns)
        .unwrap();
    for i in 0..pod_count {
        let pod = ResourceRef::namespaced("Pod", namespace, format!("{name}-7d9f8-{i}"));
        topology.insert(ResourceNode::new(pod.clone()));
        topology
            .add_dependency(&rs, &pod, DependencyKind::Owns)
            .unwrap();
    }
    topology
}

/// A production cluster slice with one critical payments service.
pub fn production_topology() -> TopologySnapshot {
    let mut topology = deployment_chain("prod", "payments", 3);
    let payments = deployment("prod", "payments");
    topology.insert(
        ResourceNode::new(payments.clone())
            .critical()
            .production()
            .with_replicas(3),
    );

    let service = ResourceRef::namespaced("Service", "prod", "payments");
    topology.insert(ResourceNode::new(service.clone()).production());
    topology
        .add_dependency(&service, &payments, DependencyKind::Selects)
        .unwrap();

    for name in ["n1", "n2", "n3"] {
        topology.insert(ResourceNode::new(ResourceRef::cluster("Node", name)));
    }
    topology
}
