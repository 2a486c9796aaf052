//! Read-only resource-dependency snapshot.
//!
//! Supplied by the cluster-state collaborator at evaluation start. Edges
//! point from a resource to the resources its mutation affects (owner to
//! owned, selector to selected). Ownership graphs observed in real
//! clusters contain cycles, so every traversal over this structure uses
//! an explicit visited set.

use crate::error::TopologyError;
use crate::types::ResourceRef;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Why one resource affects another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Owner/controller relationship (Deployment owns ReplicaSet).
    Owns,
    /// Label-selector relationship (Service selects Pods).
    Selects,
}

/// One resource in the snapshot, with the markings the safety rules read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub reference: ResourceRef,
    /// Tagged critical by the operator; protected by immutable rules.
    #[serde(default)]
    pub critical: bool,
    /// Lives in a production-marked namespace or carries a production tag.
    #[serde(default)]
    pub production: bool,
    /// Current replica count, where the kind has one.
    #[serde(default)]
    pub replicas: Option<u32>,
}

impl ResourceNode {
    pub fn new(reference: ResourceRef) -> Self {
        Self {
            reference,
            critical: false,
            production: false,
            replicas: None,
        }
    }

    #[must_use]
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    #[must_use]
    pub fn production(mut self) -> Self {
        self.production = true;
        self
    }

    #[must_use]
    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = Some(replicas);
        self
    }
}

/// Point-in-time dependency graph. The kernel only ever reads it.
#[derive(Debug, Clone, Default)]
pub struct TopologySnapshot {
    graph: DiGraph<ResourceNode, DependencyKind>,
    index: HashMap<ResourceRef, NodeIndex>,
}

impl TopologySnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource. Re-inserting an existing reference replaces its
    /// markings and keeps its edges.
    pub fn insert(&mut self, node: ResourceNode) {
        match self.index.get(&node.reference) {
            Some(&idx) => self.graph[idx] = node,
            None => {
                let reference = node.reference.clone();
                let idx = self.graph.add_node(node);
                self.index.insert(reference, idx);
            }
        }
    }

    /// Add a dependency edge: mutating `from` affects `to`.
    pub fn add_dependency(
        &mut self,
        from: &ResourceRef,
        to: &ResourceRef,
        kind: DependencyKind,
    ) -> Result<(), TopologyError> {
        let from_idx = self.lookup(from)?;
        let to_idx = self.lookup(to)?;
        self.graph.add_edge(from_idx, to_idx, kind);
        Ok(())
    }

    fn lookup(&self, reference: &ResourceRef) -> Result<NodeIndex, TopologyError> {
        self.index
            .get(reference)
            .copied()
            .ok_or_else(|| TopologyError::ResourceNotFound(reference.to_string()))
    }

    #[must_use]
    pub fn get(&self, reference: &ResourceRef) -> Option<&ResourceNode> {
        self.index.get(reference).map(|&idx| &self.graph[idx])
    }

    #[must_use]
    pub fn contains(&self, reference: &ResourceRef) -> bool {
        self.index.contains_key(reference)
    }

    #[must_use]
    pub fn is_critical(&self, reference: &ResourceRef) -> bool {
        self.get(reference).is_some_and(|n| n.critical)
    }

    #[must_use]
    pub fn replicas(&self, reference: &ResourceRef) -> Option<u32> {
        self.get(reference).and_then(|n| n.replicas)
    }

    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Names of all resources of a kind (case-insensitive).
    #[must_use]
    pub fn names_of_kind(&self, kind: &str) -> Vec<String> {
        self.graph
            .node_weights()
            .filter(|n| n.reference.is_kind(kind))
            .map(|n| n.reference.name.clone())
            .collect()
    }

    /// Transitive dependents of `target`: every resource reachable along
    /// affect edges, breadth-first, bounded by `max_depth`.
    ///
    /// Cycle-safe: each node is visited at most once. A target missing
    /// from the snapshot has no known dependents.
    #[must_use]
    pub fn transitive_dependents(
        &self,
        target: &ResourceRef,
        max_depth: usize,
    ) -> Vec<ResourceRef> {
        let Some(&start) = self.index.get(target) else {
            return Vec::new();
        };

        let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::from([(start, 0)]);
        let mut dependents = Vec::new();

        while let Some((idx, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if visited.insert(neighbor) {
                    dependents.push(self.graph[neighbor].reference.clone());
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }

        dependents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment(ns: &str, name: &str) -> ResourceRef {
        ResourceRef::namespaced("Deployment", ns, name)
    }

    #[test]
    fn insert_and_lookup() {
        let mut topology = TopologySnapshot::new();
        topology.insert(ResourceNode::new(deployment("prod", "payments")).critical());

        assert!(topology.contains(&deployment("prod", "payments")));
        assert!(topology.is_critical(&deployment("prod", "payments")));
        assert!(!topology.is_critical(&deployment("prod", "other")));
    }

    #[test]
    fn reinsert_updates_markings() {
        let mut topology = TopologySnapshot::new();
        topology.insert(ResourceNode::new(deployment("prod", "payments")));
        assert!(!topology.is_critical(&deployment("prod", "payments")));

        topology.insert(ResourceNode::new(deployment("prod", "payments")).critical());
        assert!(topology.is_critical(&deployment("prod", "payments")));
        assert_eq!(topology.resource_count(), 1);
    }

    #[test]
    fn dependents_follow_edges_transitively() {
        let mut topology = TopologySnapshot::new();
        let dep = deployment("prod", "payments");
        let rs = ResourceRef::namespaced("ReplicaSet", "prod", "payments-7d9");
        let pod = ResourceRef::namespaced("Pod", "prod", "payments-7d9-x");
        topology.insert(ResourceNode::new(dep.clone()));
        topology.insert(ResourceNode::new(rs.clone()));
        topology.insert(ResourceNode::new(pod.clone()));
        topology
            .add_dependency(&dep, &rs, DependencyKind::Owns)
            .unwrap();
        topology
            .add_dependency(&rs, &pod, DependencyKind::Owns)
            .unwrap();

        let dependents = topology.transitive_dependents(&dep, 8);
        assert_eq!(dependents.len(), 2);
        assert!(dependents.contains(&rs));
        assert!(dependents.contains(&pod));
    }

    #[test]
    fn traversal_terminates_on_cycle() {
        let mut topology = TopologySnapshot::new();
        let a = deployment("prod", "a");
        let b = deployment("prod", "b");
        let c = deployment("prod", "c");
        for r in [&a, &b, &c] {
            topology.insert(ResourceNode::new(r.clone()));
        }
        topology.add_dependency(&a, &b, DependencyKind::Owns).unwrap();
        topology.add_dependency(&b, &c, DependencyKind::Owns).unwrap();
        topology.add_dependency(&c, &a, DependencyKind::Owns).unwrap();

        let dependents = topology.transitive_dependents(&a, 16);
        assert_eq!(dependents.len(), 2, "cycle must not revisit the start node");
    }

    #[test]
    fn depth_bound_limits_traversal() {
        let mut topology = TopologySnapshot::new();
        let refs: Vec<ResourceRef> = (0..5).map(|i| deployment("ns", &format!("r{i}"))).collect();
        for r in &refs {
            topology.insert(ResourceNode::new(r.clone()));
        }
        for pair in refs.windows(2) {
            topology
                .add_dependency(&pair[0], &pair[1], DependencyKind::Owns)
                .unwrap();
        }

        assert_eq!(topology.transitive_dependents(&refs[0], 2).len(), 2);
        assert_eq!(topology.transitive_dependents(&refs[0], 10).len(), 4);
    }

    #[test]
    fn missing_target_has_no_dependents() {
        let topology = TopologySnapshot::new();
        assert!(topology
            .transitive_dependents(&deployment("ns", "ghost"), 8)
            .is_empty());
    }

    #[test]
    fn edge_to_unknown_resource_fails() {
        let mut topology = TopologySnapshot::new();
        let a = deployment("ns", "a");
        topology.insert(ResourceNode::new(a.clone()));
        let err = topology
            .add_dependency(&a, &deployment("ns", "ghost"), DependencyKind::Selects)
            .unwrap_err();
        assert!(matches!(err, TopologyError::ResourceNotFound(_)));
    }
}
