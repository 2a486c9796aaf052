//! Error types for the safety kernel.
//!
//! Every fault the evaluation pipeline can hit maps to a variant here.
//! The coordinator never propagates these to the caller raw: evaluation
//! errors degrade to a conservative [`Decision`](crate::types::Decision)
//! (fail-closed), with the originating error attached as diagnostic
//! context.

use crate::types::{ActionId, CheckpointId};

/// Top-level kernel error.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// Malformed or missing policy / autonomy configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The topology snapshot could not be fetched; blast radius cannot
    /// be computed.
    #[error("topology unavailable: {0}")]
    TopologyUnavailable(#[from] TopologyError),

    /// The submitted action is malformed.
    #[error("invalid action: {0}")]
    Validation(#[from] ValidationError),

    /// Rollback bookkeeping failure.
    #[error("rollback error: {0}")]
    Rollback(#[from] RollbackError),

    /// Illegal evaluation state transition.
    #[error("state machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    /// Unexpected fault in any stage.
    #[error("internal evaluation failure: {0}")]
    Internal(String),
}

impl KernelError {
    /// Whether retrying the same evaluation could succeed.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TopologyUnavailable(_) | Self::Internal(_))
    }
}

/// Topology snapshot acquisition failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    /// The cluster-state collaborator did not answer in time.
    #[error("topology query timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The collaborator answered with an error.
    #[error("topology query failed: {0}")]
    QueryFailed(String),

    /// The action target does not exist in the snapshot.
    #[error("resource not found in topology: {0}")]
    ResourceNotFound(String),
}

/// Action validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("target resource kind is empty")]
    MissingKind,

    #[error("target resource name is empty")]
    MissingName,

    #[error("requester identity is empty")]
    MissingRequester,

    #[error("scale action is missing a target replica count")]
    MissingReplicas,
}

/// Rollback manager failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RollbackError {
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(CheckpointId),

    #[error("no checkpoint tracks action {0}")]
    NoCheckpointForAction(ActionId),

    #[error("rollback event channel closed")]
    ChannelClosed,
}

/// Illegal evaluation state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition: {from:?} -> {to:?}")]
pub struct StateMachineError {
    pub from: crate::state_machine::EvaluationState,
    pub to: crate::state_machine::EvaluationState,
}
