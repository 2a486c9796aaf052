//! Deterministic policy evaluation.
//!
//! Two layers, evaluated in order. The immutable layer is compiled in and
//! always runs first: any failure there denies the action outright and no
//! later stage may override it. The configurable layer is an
//! operator-managed set of condition rules read through versioned
//! snapshots, so a policy update landing mid-evaluation never mixes old
//! and new rules in one decision.

pub mod rate_limit;
pub mod rules;

pub use rate_limit::{RateLimitVerdict, RateLimiter};
pub use rules::ImmutableRule;

use crate::blast_radius::TopologySnapshot;
use crate::config::RateLimitConfig;
use crate::types::{Action, PolicyCheck, RiskLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a failed rule does to the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleEffect {
    /// Refuse the action.
    Deny,
    /// Allow, but attach a warning to the decision.
    Warn,
    /// Force human approval regardless of autonomy level.
    RequireApproval,
}

/// A failed rule, with everything the decision record needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub reason: String,
    pub effect: RuleEffect,
    pub severity: RiskLevel,
}

impl Violation {
    /// Render as a decision-record check entry.
    #[must_use]
    pub fn to_check(&self) -> PolicyCheck {
        PolicyCheck {
            rule_id: self.rule_id.clone(),
            passed: false,
            reason: self.reason.clone(),
            severity: self.severity,
        }
    }
}

/// One operator-defined rule. The condition is a comma-separated list of
/// `field=value` clauses, all of which must match; recognized fields are
/// `namespace`, `action`, `kind`, `name`, `requester`, and `critical`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurableRule {
    pub id: String,
    pub condition: String,
    pub effect: RuleEffect,
    pub reason: String,
    pub severity: RiskLevel,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Versioned snapshot of the configurable rules. Every mutation produces
/// a new version; evaluations pin the snapshot they started with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySet {
    version: u64,
    rules: Vec<ConfigurableRule>,
}

impl PolicySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn rules(&self) -> &[ConfigurableRule] {
        &self.rules
    }

    /// Insert or replace a rule by id. Returns the new snapshot.
    #[must_use]
    pub fn upsert(&self, rule: ConfigurableRule) -> Self {
        let mut next = self.clone();
        match next.rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => next.rules.push(rule),
        }
        next.version += 1;
        next
    }

    /// Remove a rule by id. Returns the new snapshot, or `None` when no
    /// such rule exists.
    #[must_use]
    pub fn remove(&self, rule_id: &str) -> Option<Self> {
        if !self.rules.iter().any(|r| r.id == rule_id) {
            return None;
        }
        let mut next = self.clone();
        next.rules.retain(|r| r.id != rule_id);
        next.version += 1;
        Some(next)
    }
}

/// Result of running one policy layer over an action.
#[derive(Debug, Clone, Default)]
pub struct PolicyOutcome {
    /// One entry per evaluated rule, pass or fail.
    pub checks: Vec<PolicyCheck>,
    /// Failed rules, in evaluation order.
    pub violations: Vec<Violation>,
}

impl PolicyOutcome {
    /// The first deny violation, which pre-empts everything downstream.
    #[must_use]
    pub fn first_deny(&self) -> Option<&Violation> {
        self.violations.iter().find(|v| v.effect == RuleEffect::Deny)
    }

    #[must_use]
    pub fn requires_approval(&self) -> bool {
        self.violations
            .iter()
            .any(|v| v.effect == RuleEffect::RequireApproval)
    }

    /// Highest severity among warn-effect violations, if any.
    #[must_use]
    pub fn max_warn_severity(&self) -> Option<RiskLevel> {
        self.violations
            .iter()
            .filter(|v| v.effect == RuleEffect::Warn)
            .map(|v| v.severity)
            .max()
    }
}

/// Evaluates both policy layers. Stateless except for the rate limiter.
#[derive(Debug)]
pub struct PolicyEngine {
    rate_limiter: RateLimiter,
}

impl PolicyEngine {
    #[must_use]
    pub fn new(rate_limit: RateLimitConfig) -> Self {
        Self {
            rate_limiter: RateLimiter::new(rate_limit),
        }
    }

    /// Identifiers of every immutable rule, for the operator surface.
    #[must_use]
    pub fn immutable_rule_ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<&'static str> =
            ImmutableRule::ALL.iter().map(|r| r.id()).collect();
        ids.push("destructive_rate_limit");
        ids
    }

    /// Run the immutable layer. The rate limit runs last and only records
    /// an attempt for destructive actions that pass every pure rule, so
    /// evaluating a non-destructive action never consumes quota.
    pub fn evaluate_immutable(
        &self,
        action: &Action,
        topology: &TopologySnapshot,
        now: DateTime<Utc>,
    ) -> PolicyOutcome {
        let mut outcome = PolicyOutcome::default();

        for rule in ImmutableRule::ALL {
            match rule.check(action, topology) {
                Some(violation) => {
                    tracing::warn!(
                        rule = rule.id(),
                        action = %action.id,
                        reason = %violation.reason,
                        "immutable rule violated"
                    );
                    outcome.checks.push(violation.to_check());
                    outcome.violations.push(violation);
                }
                None => outcome.checks.push(PolicyCheck {
                    rule_id: rule.id().to_string(),
                    passed: true,
                    reason: String::new(),
                    severity: RiskLevel::Low,
                }),
            }
        }

        if action.is_destructive() && outcome.first_deny().is_none() {
            match self.rate_limiter.check_and_record(&action.requester, now) {
                RateLimitVerdict::Allowed { .. } => outcome.checks.push(PolicyCheck {
                    rule_id: "destructive_rate_limit".to_string(),
                    passed: true,
                    reason: String::new(),
                    severity: RiskLevel::Low,
                }),
                RateLimitVerdict::Exceeded { limit } => {
                    let violation = Violation {
                        rule_id: "destructive_rate_limit".to_string(),
                        reason: format!(
                            "requester {} exceeded {limit} destructive actions in the rolling window",
                            action.requester
                        ),
                        effect: RuleEffect::Deny,
                        severity: RiskLevel::High,
                    };
                    tracing::warn!(
                        requester = %action.requester,
                        limit,
                        "destructive-action rate limit exceeded"
                    );
                    outcome.checks.push(violation.to_check());
                    outcome.violations.push(violation);
                }
            }
        }

        outcome
    }

    /// Run the configurable layer against a pinned policy snapshot.
    /// Disabled rules are skipped; a rule whose condition fails to parse
    /// is logged and skipped rather than silently matching everything.
    pub fn evaluate_configurable(
        &self,
        policy: &Arc<PolicySet>,
        action: &Action,
        topology: &TopologySnapshot,
    ) -> PolicyOutcome {
        let mut outcome = PolicyOutcome::default();

        for rule in policy.rules() {
            if !rule.enabled {
                continue;
            }
            let matched = match condition_matches(&rule.condition, action, topology) {
                Ok(matched) => matched,
                Err(err) => {
                    tracing::warn!(
                        rule = %rule.id,
                        condition = %rule.condition,
                        error = %err,
                        "skipping rule with malformed condition"
                    );
                    continue;
                }
            };

            if matched {
                let violation = Violation {
                    rule_id: rule.id.clone(),
                    reason: rule.reason.clone(),
                    effect: rule.effect,
                    severity: rule.severity,
                };
                outcome.checks.push(violation.to_check());
                outcome.violations.push(violation);
            } else {
                outcome.checks.push(PolicyCheck {
                    rule_id: rule.id.clone(),
                    passed: true,
                    reason: String::new(),
                    severity: RiskLevel::Low,
                });
            }
        }

        outcome
    }
}

/// Match a `field=value[,field=value...]` condition against an action.
/// All clauses must hold. Unknown fields and clauses without `=` are
/// errors so a typo cannot turn into an always-true or always-false rule
/// unnoticed.
fn condition_matches(
    condition: &str,
    action: &Action,
    topology: &TopologySnapshot,
) -> Result<bool, String> {
    if condition.trim().is_empty() {
        return Err("empty condition".to_string());
    }

    for clause in condition.split(',') {
        let clause = clause.trim();
        let (field, value) = clause
            .split_once('=')
            .ok_or_else(|| format!("clause {clause:?} is not field=value"))?;
        let (field, value) = (field.trim(), value.trim());

        let holds = match field {
            "namespace" => action.target.namespace.as_deref() == Some(value),
            "action" => action.kind.as_str() == value,
            "kind" => action.target.is_kind(value),
            "name" => action.target.name == value,
            "requester" => action.requester.as_str() == value,
            "critical" => {
                let expected: bool = value
                    .parse()
                    .map_err(|_| format!("critical takes true/false, got {value:?}"))?;
                topology.is_critical(&action.target) == expected
            }
            other => return Err(format!("unknown condition field {other:?}")),
        };

        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}
