//! Blast-radius calculation: which resources an action touches, how bad
//! it gets, and for how long.
//!
//! The calculator is strictly read-only over the supplied
//! [`TopologySnapshot`]. Severity combines the affected-resource count,
//! critical/production markings, and whether the action removes capacity
//! versus adds it. The downtime estimate is a per-kind heuristic scaled
//! by replica count; its parameters are configuration, not constants.

pub mod topology;

pub use topology::{DependencyKind, ResourceNode, TopologySnapshot};

use crate::config::BlastConfig;
use crate::types::{Action, ActionKind, BlastRadius, RiskLevel};

/// Computes the impact of a proposed action against a topology snapshot.
#[derive(Debug, Clone)]
pub struct BlastRadiusCalculator {
    config: BlastConfig,
}

impl BlastRadiusCalculator {
    #[must_use]
    pub fn new(config: BlastConfig) -> Self {
        Self { config }
    }

    /// Compute the full blast radius for an action.
    #[must_use]
    pub fn calculate(&self, action: &Action, topology: &TopologySnapshot) -> BlastRadius {
        let dependents = topology.transitive_dependents(&action.target, self.config.max_depth);

        let severity = self.classify(action, &dependents, topology);
        let estimated_downtime_secs = self.estimate_downtime(action, topology);

        tracing::debug!(
            target = %action.target,
            kind = %action.kind,
            dependents = dependents.len(),
            severity = %severity,
            "blast radius computed"
        );

        BlastRadius {
            direct_target: action.target.clone(),
            dependents,
            severity,
            estimated_downtime_secs,
        }
    }

    /// Whether the action removes capacity, resolved against the live
    /// replica count where the action alone is ambiguous.
    #[must_use]
    pub fn removes_capacity(&self, action: &Action, topology: &TopologySnapshot) -> bool {
        match action.kind {
            ActionKind::Delete | ActionKind::Drain | ActionKind::Cordon => true,
            ActionKind::Scale => match (action.params.replicas, topology.replicas(&action.target))
            {
                (Some(0), _) => true,
                (Some(target), Some(current)) => target < current,
                _ => false,
            },
            ActionKind::Create | ActionKind::Update | ActionKind::Restart => false,
        }
    }

    fn classify(
        &self,
        action: &Action,
        dependents: &[crate::types::ResourceRef],
        topology: &TopologySnapshot,
    ) -> RiskLevel {
        let destructive = self.removes_capacity(action, topology);

        let any_critical = topology.is_critical(&action.target)
            || dependents.iter().any(|r| topology.is_critical(r));
        let any_production = topology
            .get(&action.target)
            .is_some_and(|n| n.production)
            || dependents
                .iter()
                .any(|r| topology.get(r).is_some_and(|n| n.production));

        // Affected count includes the direct target.
        let affected = 1 + dependents.len();

        if destructive && any_critical {
            return RiskLevel::Critical;
        }

        let base = match action.kind {
            ActionKind::Delete | ActionKind::Drain => RiskLevel::High,
            ActionKind::Scale | ActionKind::Update | ActionKind::Restart | ActionKind::Cordon => {
                RiskLevel::Medium
            }
            ActionKind::Create => RiskLevel::Low,
        };

        // Additive changes stay low regardless of the dependency fan-out.
        if !destructive && matches!(action.kind, ActionKind::Create | ActionKind::Scale) {
            return RiskLevel::Low;
        }

        if destructive && (affected > self.config.high_count_threshold || any_production) {
            return base.max(RiskLevel::High);
        }

        base
    }

    /// Estimated disruption window in seconds (min, max).
    #[must_use]
    pub fn estimate_downtime(&self, action: &Action, topology: &TopologySnapshot) -> (u64, u64) {
        if !self.removes_capacity(action, topology) && action.kind != ActionKind::Restart {
            return (0, 0);
        }

        let base = self.config.downtime.base_secs(&action.target.kind);
        let replicas = topology
            .replicas(&action.target)
            .or(action.params.replicas)
            .unwrap_or(1)
            .max(1) as u64;

        // Drains over multiple nodes disrupt each in sequence.
        let unit_count = if action.kind == ActionKind::Drain && !action.params.nodes.is_empty() {
            action.params.nodes.len() as u64
        } else {
            1
        };

        let max = base
            .saturating_mul(replicas.saturating_mul(self.config.downtime.replica_factor).max(1))
            .saturating_mul(unit_count);
        (base.min(max), max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceRef;

    fn calculator() -> BlastRadiusCalculator {
        BlastRadiusCalculator::new(BlastConfig::default())
    }

    fn scale_action(ns: &str, name: &str, replicas: u32) -> Action {
        let mut action = Action::new(
            ActionKind::Scale,
            ResourceRef::namespaced("Deployment", ns, name),
            "user-1",
        );
        action.params.replicas = Some(replicas);
        action
    }

    fn topology_with(node: ResourceNode) -> TopologySnapshot {
        let mut topology = TopologySnapshot::new();
        topology.insert(node);
        topology
    }

    #[test]
    fn scale_up_is_low_and_free() {
        let target = ResourceRef::namespaced("Deployment", "staging", "web");
        let topology = topology_with(ResourceNode::new(target.clone()).with_replicas(2));
        let action = scale_action("staging", "web", 5);

        let radius = calculator().calculate(&action, &topology);
        assert_eq!(radius.severity, RiskLevel::Low);
        assert_eq!(radius.estimated_downtime_secs, (0, 0));
    }

    #[test]
    fn scale_down_against_live_replicas_is_destructive() {
        let target = ResourceRef::namespaced("Deployment", "staging", "web");
        let topology = topology_with(ResourceNode::new(target.clone()).with_replicas(5));
        let action = scale_action("staging", "web", 2);

        let calc = calculator();
        assert!(calc.removes_capacity(&action, &topology));
        assert_eq!(calc.calculate(&action, &topology).severity, RiskLevel::Medium);
    }

    #[test]
    fn destructive_on_critical_is_critical() {
        let target = ResourceRef::namespaced("Deployment", "prod", "payments");
        let topology = topology_with(
            ResourceNode::new(target.clone()).critical().with_replicas(3),
        );
        let action = scale_action("prod", "payments", 0);

        let radius = calculator().calculate(&action, &topology);
        assert_eq!(radius.severity, RiskLevel::Critical);
    }

    #[test]
    fn delete_with_wide_fanout_is_high() {
        let mut topology = TopologySnapshot::new();
        let target = ResourceRef::namespaced("Deployment", "staging", "web");
        topology.insert(ResourceNode::new(target.clone()));
        for i in 0..6 {
            let dep = ResourceRef::namespaced("Pod", "staging", format!("web-{i}"));
            topology.insert(ResourceNode::new(dep.clone()));
            topology
                .add_dependency(&target, &dep, DependencyKind::Owns)
                .unwrap();
        }

        let action = Action::new(ActionKind::Delete, target, "user-1");
        let radius = calculator().calculate(&action, &topology);
        assert_eq!(radius.affected_count(), 7);
        assert_eq!(radius.severity, RiskLevel::High);
    }

    #[test]
    fn cyclic_ownership_still_classifies() {
        let mut topology = TopologySnapshot::new();
        let a = ResourceRef::namespaced("Deployment", "ns", "a");
        let b = ResourceRef::namespaced("ReplicaSet", "ns", "b");
        topology.insert(ResourceNode::new(a.clone()));
        topology.insert(ResourceNode::new(b.clone()));
        topology.add_dependency(&a, &b, DependencyKind::Owns).unwrap();
        topology.add_dependency(&b, &a, DependencyKind::Selects).unwrap();

        let action = Action::new(ActionKind::Delete, a, "user-1");
        let radius = calculator().calculate(&action, &topology);
        assert_eq!(radius.dependents.len(), 1);
    }

    #[test]
    fn drain_downtime_scales_with_node_count() {
        let target = ResourceRef::cluster("Node", "n1");
        let topology = topology_with(ResourceNode::new(target.clone()));
        let mut action = Action::new(ActionKind::Drain, target, "user-1");
        action.params.nodes = vec!["n1".into(), "n2".into(), "n3".into()];

        let (min, max) = calculator().estimate_downtime(&action, &topology);
        assert_eq!(min, 300);
        assert_eq!(max, 900);
    }

    #[test]
    fn restart_has_downtime_but_is_not_destructive() {
        let target = ResourceRef::namespaced("Pod", "default", "app");
        let topology = topology_with(ResourceNode::new(target.clone()));
        let action = Action::new(ActionKind::Restart, target, "user-1");

        let calc = calculator();
        assert!(!calc.removes_capacity(&action, &topology));
        let (min, _) = calc.estimate_downtime(&action, &topology);
        assert_eq!(min, 30);
    }
}
