//! Shared data model for the safety kernel.
//!
//! Everything an evaluation consumes or produces lives here: the immutable
//! [`Action`] request, resource references, risk levels, and the final
//! [`Decision`]. These types are plain data: all behavior (rule checks,
//! traversal, gating) belongs to the component modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a proposed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionId(pub Uuid);

impl ActionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a rollback checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CheckpointId(pub Uuid);

impl CheckpointId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CheckpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the principal requesting an action (user or agent).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequesterId(pub String);

impl RequesterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a cluster resource: kind, optional namespace, name.
///
/// Cluster-scoped resources (nodes, persistent volumes) carry no namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceRef {
    /// Reference to a namespaced resource.
    pub fn namespaced(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Reference to a cluster-scoped resource.
    pub fn cluster(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: None,
            name: name.into(),
        }
    }

    /// Case-insensitive kind comparison ("StatefulSet" == "statefulset").
    #[must_use]
    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind.eq_ignore_ascii_case(kind)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// The kind of mutation an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Update,
    Scale,
    Delete,
    Drain,
    Restart,
    Cordon,
}

impl ActionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Scale => "scale",
            ActionKind::Delete => "delete",
            ActionKind::Drain => "drain",
            ActionKind::Restart => "restart",
            ActionKind::Cordon => "cordon",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed parameters attached to an action.
///
/// Fields the safety rules inspect are typed; anything else rides along in
/// `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionParams {
    /// Target replica count for scale actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    /// Node names targeted by drain/cordon actions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,
    /// Explicit "drain everything" marker.
    #[serde(default)]
    pub all_nodes: bool,
    /// Set by the requester after verifying a backup exists.
    #[serde(default)]
    pub backup_confirmed: bool,
    /// RBAC subjects affected by a role/binding mutation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,
    /// Pass-through parameters the kernel does not interpret.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A proposed cluster mutation. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub kind: ActionKind,
    pub target: ResourceRef,
    #[serde(default)]
    pub params: ActionParams,
    pub requester: RequesterId,
    pub submitted_at: DateTime<Utc>,
}

impl Action {
    pub fn new(kind: ActionKind, target: ResourceRef, requester: impl Into<String>) -> Self {
        Self {
            id: ActionId::new(),
            kind,
            target,
            params: ActionParams::default(),
            requester: RequesterId::new(requester),
            submitted_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: ActionParams) -> Self {
        self.params = params;
        self
    }

    /// Whether this action can remove capacity or data.
    ///
    /// Scale counts as destructive only when the target is zero replicas;
    /// scale-downs against a live topology are classified by the blast
    /// radius calculator, which can see current replica counts.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        match self.kind {
            ActionKind::Delete | ActionKind::Drain | ActionKind::Cordon => true,
            ActionKind::Scale => self.params.replicas == Some(0),
            ActionKind::Create | ActionKind::Update | ActionKind::Restart => false,
        }
    }
}

/// Ordinal risk classification, lowest to highest.
///
/// Also used as blast-radius severity: both share the same four-value
/// domain and ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final verdict of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionResult {
    Approve,
    Deny,
    RequestApproval,
    Warn,
}

impl DecisionResult {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionResult::Approve => "approve",
            DecisionResult::Deny => "deny",
            DecisionResult::RequestApproval => "request_approval",
            DecisionResult::Warn => "warn",
        }
    }

    /// Whether the action may proceed to execution (possibly with a warning).
    #[must_use]
    pub fn is_approved(self) -> bool {
        matches!(self, DecisionResult::Approve | DecisionResult::Warn)
    }
}

impl fmt::Display for DecisionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one rule evaluation, surfaced to API consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyCheck {
    pub rule_id: String,
    pub passed: bool,
    pub reason: String,
    pub severity: RiskLevel,
}

/// Impact assessment: the direct target plus everything transitively
/// affected, with a severity classification and downtime estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlastRadius {
    pub direct_target: ResourceRef,
    pub dependents: Vec<ResourceRef>,
    pub severity: RiskLevel,
    /// Estimated service disruption in seconds (min, max).
    pub estimated_downtime_secs: (u64, u64),
}

impl BlastRadius {
    /// Direct target plus transitive dependents.
    #[must_use]
    pub fn affected_count(&self) -> usize {
        1 + self.dependents.len()
    }
}

/// The outcome of a safety evaluation. Produced exactly once per action
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action_id: ActionId,
    pub result: DecisionResult,
    pub reason: String,
    pub risk_level: RiskLevel,
    pub blast_radius: Option<BlastRadius>,
    pub requires_human: bool,
    pub policy_checks: Vec<PolicyCheck>,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    /// Whether the action may proceed to execution.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.result.is_approved()
    }
}
