//! Guardrail Kernel (guardrail-kernel)
//!
//! Deterministic safety evaluation for cluster-mutating actions. Every
//! proposed action passes through the same pipeline (policy rules,
//! blast-radius analysis, autonomy gating) and comes out as a decision
//! record. No stage consults a model; two identical actions against the
//! same cluster state and configuration produce the same decision.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use guardrail_kernel::prelude::*;
//!
//! let (kernel, channels) = SafetyKernel::new(KernelConfig::default(), topology)?;
//!
//! let action = Action::new(
//!     ActionKind::Scale,
//!     ResourceRef::namespaced("Deployment", "prod", "web"),
//!     "release-bot",
//! );
//! let decision = kernel.evaluate(&action).await;
//!
//! if decision.result.is_approved() {
//!     // execute, then checkpoint and report health for rollback cover
//! }
//! ```

pub mod autonomy;
pub mod blast_radius;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod policy;
pub mod rollback;
pub mod state_machine;
pub mod types;

// Re-exports
pub use coordinator::{SafetyKernel, TopologyProvider};
pub use error::*;
pub use types::*;

/// One-stop imports for kernel users.
pub mod prelude {
    pub use crate::autonomy::{approval_requirement, ApprovalRequirement, AutonomyLevel};
    pub use crate::blast_radius::{
        BlastRadiusCalculator, DependencyKind, ResourceNode, TopologySnapshot,
    };
    pub use crate::config::KernelConfig;
    pub use crate::coordinator::{ApprovalRequest, KernelChannels, SafetyKernel, TopologyProvider};
    pub use crate::error::{KernelError, RollbackError, TopologyError, ValidationError};
    pub use crate::policy::{ConfigurableRule, PolicySet, RuleEffect, Violation};
    pub use crate::rollback::{
        HealthOutcome, HealthSignal, PreState, RollbackEvent, RollbackManager,
    };
    pub use crate::types::{
        Action, ActionId, ActionKind, BlastRadius, CheckpointId, Decision, DecisionResult,
        PolicyCheck, RequesterId, ResourceRef, RiskLevel,
    };
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
