//! Autonomy levels and the approval-requirement table.
//!
//! A single process-wide [`AutonomyLevel`] (operator-set, never writable
//! by the agent under evaluation) maps a computed risk level to an
//! [`ApprovalRequirement`]. The mapping is a pure lookup table: no
//! nested conditionals, trivially exhaustive, and property-tested for
//! monotonic relaxation: raising the level never adds approval burden
//! for a fixed risk.
//!
//! Immutable policy denials are decided before this stage and always
//! pre-empt it.

use crate::types::RiskLevel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trust tier controlling how much human approval automated execution
/// requires. Ordinal 1–5.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Read-only: every mutating action is denied.
    Observe,
    /// Suggestions only: every mutating action requires approval.
    Recommend,
    /// Default for most deployments: every action is proposed for
    /// explicit approval regardless of risk.
    #[default]
    Propose,
    /// Low/medium risk auto-approved; high/critical requires approval.
    ActWithGuard,
    /// Auto-approved unless a policy rule denies.
    FullAutonomous,
}

impl AutonomyLevel {
    /// All levels, lowest trust first.
    pub const ALL: [AutonomyLevel; 5] = [
        AutonomyLevel::Observe,
        AutonomyLevel::Recommend,
        AutonomyLevel::Propose,
        AutonomyLevel::ActWithGuard,
        AutonomyLevel::FullAutonomous,
    ];

    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            AutonomyLevel::Observe => 1,
            AutonomyLevel::Recommend => 2,
            AutonomyLevel::Propose => 3,
            AutonomyLevel::ActWithGuard => 4,
            AutonomyLevel::FullAutonomous => 5,
        }
    }

    /// Parse an ordinal 1–5.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AutonomyLevel::Observe),
            2 => Some(AutonomyLevel::Recommend),
            3 => Some(AutonomyLevel::Propose),
            4 => Some(AutonomyLevel::ActWithGuard),
            5 => Some(AutonomyLevel::FullAutonomous),
            _ => None,
        }
    }

    /// Human-readable description for the configuration surface.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            AutonomyLevel::Observe => "Observe: read-only, all mutating actions denied",
            AutonomyLevel::Recommend => {
                "Recommend: suggestions only, every mutating action requires approval"
            }
            AutonomyLevel::Propose => {
                "Propose: every action is proposed for human approval regardless of risk"
            }
            AutonomyLevel::ActWithGuard => {
                "Act-with-Guard: low/medium risk auto-approved, high/critical requires approval"
            }
            AutonomyLevel::FullAutonomous => {
                "Full-Autonomous: auto-approved unless a policy rule denies"
            }
        }
    }
}

impl fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level {}", self.as_u8())
    }
}

/// What an action needs before it may execute, as decided by the
/// autonomy stage alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalRequirement {
    /// Proceed without a human.
    AutoApprove,
    /// A human must approve before execution.
    RequireApproval,
    /// The action is refused outright at this autonomy level.
    Deny,
}

impl ApprovalRequirement {
    /// Ordering used by the monotonicity invariant: a higher burden means
    /// more human involvement. Deny > RequireApproval > AutoApprove.
    #[must_use]
    pub fn burden(self) -> u8 {
        match self {
            ApprovalRequirement::AutoApprove => 0,
            ApprovalRequirement::RequireApproval => 1,
            ApprovalRequirement::Deny => 2,
        }
    }
}

/// The (autonomy level × risk level) → approval requirement table.
#[must_use]
pub fn approval_requirement(level: AutonomyLevel, risk: RiskLevel) -> ApprovalRequirement {
    use ApprovalRequirement::{AutoApprove, Deny, RequireApproval};
    use AutonomyLevel::{ActWithGuard, FullAutonomous, Observe, Propose, Recommend};
    use RiskLevel::{Critical, High, Low, Medium};

    match (level, risk) {
        (Observe, _) => Deny,
        (Recommend | Propose, _) => RequireApproval,
        (ActWithGuard, Low | Medium) => AutoApprove,
        (ActWithGuard, High | Critical) => RequireApproval,
        (FullAutonomous, _) => AutoApprove,
    }
}

/// Reason string attached to decisions shaped by the autonomy stage.
#[must_use]
pub fn requirement_reason(level: AutonomyLevel, risk: RiskLevel) -> String {
    match approval_requirement(level, risk) {
        ApprovalRequirement::Deny => format!(
            "autonomy {level} is read-only: mutating actions are denied"
        ),
        ApprovalRequirement::RequireApproval => format!(
            "autonomy {level} requires human approval for {risk}-risk actions"
        ),
        ApprovalRequirement::AutoApprove => format!(
            "autonomy {level} auto-approves {risk}-risk actions"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_round_trip() {
        for level in AutonomyLevel::ALL {
            assert_eq!(AutonomyLevel::from_u8(level.as_u8()), Some(level));
        }
        assert_eq!(AutonomyLevel::from_u8(0), None);
        assert_eq!(AutonomyLevel::from_u8(6), None);
    }

    #[test]
    fn observe_denies_everything() {
        for risk in [
            RiskLevel::Low,
            RiskLevel::Medium,
            RiskLevel::High,
            RiskLevel::Critical,
        ] {
            assert_eq!(
                approval_requirement(AutonomyLevel::Observe, risk),
                ApprovalRequirement::Deny
            );
        }
    }

    #[test]
    fn act_with_guard_splits_on_risk() {
        assert_eq!(
            approval_requirement(AutonomyLevel::ActWithGuard, RiskLevel::Low),
            ApprovalRequirement::AutoApprove
        );
        assert_eq!(
            approval_requirement(AutonomyLevel::ActWithGuard, RiskLevel::Medium),
            ApprovalRequirement::AutoApprove
        );
        assert_eq!(
            approval_requirement(AutonomyLevel::ActWithGuard, RiskLevel::High),
            ApprovalRequirement::RequireApproval
        );
        assert_eq!(
            approval_requirement(AutonomyLevel::ActWithGuard, RiskLevel::Critical),
            ApprovalRequirement::RequireApproval
        );
    }

    #[test]
    fn full_autonomous_auto_approves() {
        assert_eq!(
            approval_requirement(AutonomyLevel::FullAutonomous, RiskLevel::Critical),
            ApprovalRequirement::AutoApprove
        );
    }

    #[test]
    fn raising_level_never_raises_burden() {
        for risk in [
            RiskLevel::Low,
            RiskLevel::Medium,
            RiskLevel::High,
            RiskLevel::Critical,
        ] {
            let mut prev = approval_requirement(AutonomyLevel::Observe, risk).burden();
            for level in &AutonomyLevel::ALL[1..] {
                let burden = approval_requirement(*level, risk).burden();
                assert!(
                    burden <= prev,
                    "burden rose from {prev} to {burden} at {level} for {risk}"
                );
                prev = burden;
            }
        }
    }

    #[test]
    fn descriptions_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for level in AutonomyLevel::ALL {
            assert!(seen.insert(level.description()));
        }
    }
}
