//! The safety kernel: one entry point that runs every evaluation stage
//! in order and always produces a decision.
//!
//! Stage order is fixed: validation, topology fetch, immutable policy,
//! configurable policy, blast radius, autonomy gating. An immutable
//! violation ends the pipeline with a deny that nothing downstream can
//! override. Any internal fault degrades to a conservative decision
//! rather than an error: destructive actions are denied, everything else
//! is routed to a human (fail closed, never fail open).
//!
//! Policy and autonomy configuration are snapshotted once at evaluation
//! start, so concurrent operator updates never produce a decision that
//! mixes old and new rules.

use crate::autonomy::{self, ApprovalRequirement, AutonomyLevel};
use crate::blast_radius::{BlastRadiusCalculator, TopologySnapshot};
use crate::config::KernelConfig;
use crate::error::{KernelError, TopologyError, ValidationError};
use crate::policy::{PolicyEngine, PolicySet, RuleEffect};
use crate::rollback::{RollbackEvent, RollbackManager};
use crate::state_machine::{EvaluationProgress, EvaluationState};
use crate::types::{Action, ActionKind, Decision, DecisionResult, RiskLevel};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Supplies point-in-time cluster topology. Implemented by the
/// cluster-state collaborator; tests supply fixtures.
#[async_trait]
pub trait TopologyProvider: Send + Sync {
    async fn snapshot(&self) -> Result<TopologySnapshot, TopologyError>;
}

/// An action waiting on a human, emitted on the approval channel.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub action: Action,
    pub risk_level: RiskLevel,
    pub reason: String,
    pub requested_at: chrono::DateTime<Utc>,
}

/// Receiving ends of the kernel's outbound channels.
pub struct KernelChannels {
    pub approvals: mpsc::UnboundedReceiver<ApprovalRequest>,
    pub rollback_events: mpsc::UnboundedReceiver<RollbackEvent>,
}

/// Coordinates every evaluation stage and owns the mutable kernel state.
pub struct SafetyKernel {
    config: KernelConfig,
    topology: Arc<dyn TopologyProvider>,
    policy_engine: PolicyEngine,
    calculator: BlastRadiusCalculator,
    rollback: RollbackManager,
    policy: RwLock<Arc<PolicySet>>,
    autonomy: RwLock<AutonomyLevel>,
    approvals: mpsc::UnboundedSender<ApprovalRequest>,
}

impl SafetyKernel {
    /// Build a kernel and the receivers for its outbound channels.
    pub fn new(
        config: KernelConfig,
        topology: Arc<dyn TopologyProvider>,
    ) -> Result<(Self, KernelChannels), KernelError> {
        config.validate()?;
        let (rollback, rollback_events) = RollbackManager::new(config.rollback.clone());
        let (approvals, approvals_rx) = mpsc::unbounded_channel();
        let kernel = Self {
            policy_engine: PolicyEngine::new(config.rate_limit),
            calculator: BlastRadiusCalculator::new(config.blast.clone()),
            rollback,
            topology,
            policy: RwLock::new(Arc::new(PolicySet::new())),
            autonomy: RwLock::new(AutonomyLevel::default()),
            config,
            approvals,
        };
        Ok((
            kernel,
            KernelChannels {
                approvals: approvals_rx,
                rollback_events,
            },
        ))
    }

    /// Evaluate a proposed action. Infallible by construction: any
    /// internal fault becomes a conservative decision.
    pub async fn evaluate(&self, action: &Action) -> Decision {
        match self.try_evaluate(action).await {
            Ok(decision) => decision,
            Err(err) => {
                tracing::error!(
                    action = %action.id,
                    error = %err,
                    "evaluation failed, degrading to conservative decision"
                );
                self.conservative_decision(action, &err)
            }
        }
    }

    async fn try_evaluate(&self, action: &Action) -> Result<Decision, KernelError> {
        validate(action)?;

        // Pin the configuration this evaluation runs against.
        let policy = Arc::clone(&self.policy.read());
        let level = *self.autonomy.read();
        let now = Utc::now();

        let mut progress = EvaluationProgress::new();

        let topology = self.fetch_topology().await?;

        let immutable = self.policy_engine.evaluate_immutable(action, &topology, now);
        progress.advance(EvaluationState::PolicyChecked)?;

        let first_deny = immutable.first_deny().cloned();
        let mut checks = immutable.checks;
        if let Some(deny) = first_deny {
            progress.advance(EvaluationState::Decided)?;
            return Ok(Decision {
                action_id: action.id,
                result: DecisionResult::Deny,
                reason: deny.reason.clone(),
                risk_level: deny.severity,
                blast_radius: None,
                requires_human: false,
                policy_checks: checks,
                decided_at: Utc::now(),
            });
        }

        let configurable = self.policy_engine.evaluate_configurable(&policy, action, &topology);
        checks.extend(configurable.checks.iter().cloned());
        if let Some(deny) = configurable.first_deny() {
            progress.advance(EvaluationState::Decided)?;
            return Ok(Decision {
                action_id: action.id,
                result: DecisionResult::Deny,
                reason: deny.reason.clone(),
                risk_level: deny.severity,
                blast_radius: None,
                requires_human: false,
                policy_checks: checks,
                decided_at: Utc::now(),
            });
        }

        let blast_radius = self.calculator.calculate(action, &topology);
        progress.advance(EvaluationState::BlastRadiusComputed)?;

        let requirement = autonomy::approval_requirement(level, blast_radius.severity);
        progress.advance(EvaluationState::AutonomyEvaluated)?;

        let forced_approval = configurable.requires_approval();
        let (result, requires_human, reason) = match requirement {
            ApprovalRequirement::Deny => (
                DecisionResult::Deny,
                false,
                autonomy::requirement_reason(level, blast_radius.severity),
            ),
            ApprovalRequirement::RequireApproval => (
                DecisionResult::RequestApproval,
                true,
                autonomy::requirement_reason(level, blast_radius.severity),
            ),
            ApprovalRequirement::AutoApprove if forced_approval => {
                let rule = configurable
                    .violations
                    .iter()
                    .find(|v| v.effect == RuleEffect::RequireApproval)
                    .map_or_else(String::new, |v| v.reason.clone());
                (DecisionResult::RequestApproval, true, rule)
            }
            ApprovalRequirement::AutoApprove => match configurable.max_warn_severity() {
                Some(_) => {
                    let warned = configurable
                        .violations
                        .iter()
                        .filter(|v| v.effect == RuleEffect::Warn)
                        .map(|v| v.reason.as_str())
                        .collect::<Vec<_>>()
                        .join("; ");
                    (DecisionResult::Warn, false, warned)
                }
                None => (
                    DecisionResult::Approve,
                    false,
                    autonomy::requirement_reason(level, blast_radius.severity),
                ),
            },
        };

        if result == DecisionResult::RequestApproval {
            // A closed approval channel means no operator is listening;
            // the pending decision itself still records the requirement.
            let _ = self.approvals.send(ApprovalRequest {
                action: action.clone(),
                risk_level: blast_radius.severity,
                reason: reason.clone(),
                requested_at: Utc::now(),
            });
        }

        progress.advance(EvaluationState::Decided)?;
        tracing::info!(
            action = %action.id,
            kind = %action.kind,
            target = %action.target,
            result = result.as_str(),
            risk = blast_radius.severity.as_str(),
            "action evaluated"
        );

        Ok(Decision {
            action_id: action.id,
            result,
            reason,
            risk_level: blast_radius.severity,
            blast_radius: Some(blast_radius),
            requires_human,
            policy_checks: checks,
            decided_at: Utc::now(),
        })
    }

    async fn fetch_topology(&self) -> Result<TopologySnapshot, KernelError> {
        let timeout = Duration::from_secs(self.config.topology_timeout_secs);
        match tokio::time::timeout(timeout, self.topology.snapshot()).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(TopologyError::Timeout {
                timeout_secs: self.config.topology_timeout_secs,
            }
            .into()),
        }
    }

    /// Fail-closed decision used when any stage faults: deny destructive
    /// actions, route everything else to a human. Never approve.
    fn conservative_decision(&self, action: &Action, err: &KernelError) -> Decision {
        let (result, requires_human) = if action.is_destructive() {
            (DecisionResult::Deny, false)
        } else {
            (DecisionResult::RequestApproval, true)
        };

        if requires_human {
            let _ = self.approvals.send(ApprovalRequest {
                action: action.clone(),
                risk_level: RiskLevel::High,
                reason: format!("evaluation degraded: {err}"),
                requested_at: Utc::now(),
            });
        }

        Decision {
            action_id: action.id,
            result,
            reason: format!("evaluation could not complete ({err}); failing closed"),
            risk_level: RiskLevel::High,
            blast_radius: None,
            requires_human,
            policy_checks: Vec::new(),
            decided_at: Utc::now(),
        }
    }

    // Operator surface.

    /// Current autonomy level.
    #[must_use]
    pub fn autonomy_level(&self) -> AutonomyLevel {
        *self.autonomy.read()
    }

    /// Set the autonomy level. Operator-only: nothing in the evaluation
    /// path ever calls this.
    pub fn set_autonomy_level(&self, level: AutonomyLevel) {
        let previous = {
            let mut guard = self.autonomy.write();
            std::mem::replace(&mut *guard, level)
        };
        if previous != level {
            tracing::info!(from = %previous, to = %level, "autonomy level changed");
        }
    }

    /// Current configurable policy snapshot.
    #[must_use]
    pub fn policy_snapshot(&self) -> Arc<PolicySet> {
        Arc::clone(&self.policy.read())
    }

    /// Insert or replace a configurable rule.
    pub fn upsert_rule(&self, rule: crate::policy::ConfigurableRule) -> u64 {
        let mut guard = self.policy.write();
        let next = guard.upsert(rule);
        let version = next.version();
        *guard = Arc::new(next);
        version
    }

    /// Remove a configurable rule by id.
    pub fn remove_rule(&self, rule_id: &str) -> Option<u64> {
        let mut guard = self.policy.write();
        let next = guard.remove(rule_id)?;
        let version = next.version();
        *guard = Arc::new(next);
        Some(version)
    }

    /// Identifiers of the compiled-in rules, for display only.
    #[must_use]
    pub fn immutable_rule_ids(&self) -> Vec<&'static str> {
        self.policy_engine.immutable_rule_ids()
    }

    /// Rollback bookkeeping for executed actions.
    #[must_use]
    pub fn rollback(&self) -> &RollbackManager {
        &self.rollback
    }

    #[must_use]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }
}

/// Reject structurally malformed actions before any stage runs.
fn validate(action: &Action) -> Result<(), ValidationError> {
    if action.target.kind.trim().is_empty() {
        return Err(ValidationError::MissingKind);
    }
    if action.target.name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }
    if action.requester.as_str().trim().is_empty() {
        return Err(ValidationError::MissingRequester);
    }
    if action.kind == ActionKind::Scale && action.params.replicas.is_none() {
        return Err(ValidationError::MissingReplicas);
    }
    Ok(())
}
