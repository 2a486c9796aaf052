//! The immutable rule set.
//!
//! These rules are compiled in, evaluated on every action, and cannot be
//! disabled, reordered, or overridden by configuration. Each is a pure
//! predicate over the action and the topology snapshot. The
//! destructive-action rate limit also belongs to the immutable set but
//! carries state, so it lives in the engine rather than here.

use super::{RuleEffect, Violation};
use crate::blast_radius::TopologySnapshot;
use crate::types::{Action, ActionKind, RiskLevel};

/// Namespaces no mutation may touch.
const PROTECTED_NAMESPACES: [&str; 3] = ["kube-system", "kube-public", "kube-node-lease"];

/// Kinds whose deletion or drain requires a confirmed backup.
const BACKUP_REQUIRED_KINDS: [&str; 3] =
    ["statefulset", "persistentvolumeclaim", "persistentvolume"];

/// Kinds that grant access; self-referential mutations risk lockout.
const RBAC_KINDS: [&str; 4] = [
    "rolebinding",
    "clusterrolebinding",
    "role",
    "clusterrole",
];

/// Compiled-in, non-overridable safety rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmutableRule {
    ProtectedNamespace,
    CriticalWorkloadProtection,
    DrainAllNodes,
    RbacSelfLockout,
    BackupRequired,
}

impl ImmutableRule {
    /// All pure immutable rules, in evaluation order.
    pub const ALL: [ImmutableRule; 5] = [
        ImmutableRule::ProtectedNamespace,
        ImmutableRule::CriticalWorkloadProtection,
        ImmutableRule::DrainAllNodes,
        ImmutableRule::RbacSelfLockout,
        ImmutableRule::BackupRequired,
    ];

    /// Stable identifier surfaced in decisions and the operator API.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            ImmutableRule::ProtectedNamespace => "protected_namespace",
            ImmutableRule::CriticalWorkloadProtection => "critical_workload_protection",
            ImmutableRule::DrainAllNodes => "drain_all_nodes",
            ImmutableRule::RbacSelfLockout => "rbac_self_lockout",
            ImmutableRule::BackupRequired => "backup_required",
        }
    }

    /// Evaluate the rule. `None` means the rule passes.
    #[must_use]
    pub fn check(self, action: &Action, topology: &TopologySnapshot) -> Option<Violation> {
        match self {
            ImmutableRule::ProtectedNamespace => check_protected_namespace(action),
            ImmutableRule::CriticalWorkloadProtection => {
                check_critical_workload(action, topology)
            }
            ImmutableRule::DrainAllNodes => check_drain_all_nodes(action, topology),
            ImmutableRule::RbacSelfLockout => check_rbac_self_lockout(action),
            ImmutableRule::BackupRequired => check_backup_required(action),
        }
    }
}

fn check_protected_namespace(action: &Action) -> Option<Violation> {
    if action.kind == ActionKind::Create {
        return None;
    }
    let namespace = action.target.namespace.as_deref()?;
    if !PROTECTED_NAMESPACES.contains(&namespace) {
        return None;
    }
    let severity = if action.kind == ActionKind::Delete {
        RiskLevel::Critical
    } else {
        RiskLevel::High
    };
    Some(Violation {
        rule_id: ImmutableRule::ProtectedNamespace.id().to_string(),
        reason: format!(
            "namespace {namespace} is protected: {} is not permitted",
            action.kind
        ),
        effect: RuleEffect::Deny,
        severity,
    })
}

fn check_critical_workload(action: &Action, topology: &TopologySnapshot) -> Option<Violation> {
    if !topology.is_critical(&action.target) {
        return None;
    }
    match action.kind {
        ActionKind::Delete => Some(Violation {
            rule_id: ImmutableRule::CriticalWorkloadProtection.id().to_string(),
            reason: format!(
                "{} is tagged critical: deletion is blocked",
                action.target
            ),
            effect: RuleEffect::Deny,
            severity: RiskLevel::Critical,
        }),
        ActionKind::Scale if action.params.replicas == Some(0) => Some(Violation {
            rule_id: ImmutableRule::CriticalWorkloadProtection.id().to_string(),
            reason: format!(
                "{} is tagged critical: scale to zero is blocked",
                action.target
            ),
            effect: RuleEffect::Deny,
            severity: RiskLevel::Critical,
        }),
        _ => None,
    }
}

fn check_drain_all_nodes(action: &Action, topology: &TopologySnapshot) -> Option<Violation> {
    if action.kind != ActionKind::Drain && action.kind != ActionKind::Cordon {
        return None;
    }

    let covers_cluster = if action.params.all_nodes {
        true
    } else {
        let known = topology.names_of_kind("node");
        !known.is_empty()
            && known
                .iter()
                .all(|name| action.params.nodes.contains(name))
            && !action.params.nodes.is_empty()
    };

    if !covers_cluster {
        return None;
    }
    Some(Violation {
        rule_id: ImmutableRule::DrainAllNodes.id().to_string(),
        reason: format!(
            "{} of every node would take the whole cluster offline",
            action.kind
        ),
        effect: RuleEffect::Deny,
        severity: RiskLevel::Critical,
    })
}

fn check_rbac_self_lockout(action: &Action) -> Option<Violation> {
    if !matches!(action.kind, ActionKind::Delete | ActionKind::Update) {
        return None;
    }
    if !RBAC_KINDS.iter().any(|k| action.target.is_kind(k)) {
        return None;
    }
    if !action
        .params
        .subjects
        .iter()
        .any(|s| s == action.requester.as_str())
    {
        return None;
    }
    Some(Violation {
        rule_id: ImmutableRule::RbacSelfLockout.id().to_string(),
        reason: format!(
            "{} on {} would revoke the requester's own access",
            action.kind, action.target
        ),
        effect: RuleEffect::Deny,
        severity: RiskLevel::High,
    })
}

fn check_backup_required(action: &Action) -> Option<Violation> {
    if !matches!(action.kind, ActionKind::Delete | ActionKind::Drain) {
        return None;
    }
    if !BACKUP_REQUIRED_KINDS.iter().any(|k| action.target.is_kind(k)) {
        return None;
    }
    if action.params.backup_confirmed {
        return None;
    }
    Some(Violation {
        rule_id: ImmutableRule::BackupRequired.id().to_string(),
        reason: format!(
            "{} holds persistent state: a confirmed backup is required before {}",
            action.target, action.kind
        ),
        effect: RuleEffect::Deny,
        severity: RiskLevel::High,
    })
}
