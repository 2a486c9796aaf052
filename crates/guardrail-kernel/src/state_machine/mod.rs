//! Evaluation pipeline state machine.
//!
//! Every evaluation walks the same five states in order; the only
//! shortcut is straight to `Decided`, used when an immutable policy
//! violation or an evaluation fault ends the pipeline early. `Decided`
//! is terminal.

use crate::error::StateMachineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline position of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationState {
    /// Action accepted and validated.
    Received,
    /// Policy layers have run.
    PolicyChecked,
    /// Blast radius is computed.
    BlastRadiusComputed,
    /// The autonomy table has been consulted.
    AutonomyEvaluated,
    /// Terminal: a decision record exists.
    Decided,
}

impl EvaluationState {
    /// States reachable in one step.
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [EvaluationState] {
        match self {
            EvaluationState::Received => {
                &[EvaluationState::PolicyChecked, EvaluationState::Decided]
            }
            EvaluationState::PolicyChecked => &[
                EvaluationState::BlastRadiusComputed,
                EvaluationState::Decided,
            ],
            EvaluationState::BlastRadiusComputed => &[
                EvaluationState::AutonomyEvaluated,
                EvaluationState::Decided,
            ],
            EvaluationState::AutonomyEvaluated => &[EvaluationState::Decided],
            EvaluationState::Decided => &[],
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, EvaluationState::Decided)
    }
}

impl fmt::Display for EvaluationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvaluationState::Received => "received",
            EvaluationState::PolicyChecked => "policy_checked",
            EvaluationState::BlastRadiusComputed => "blast_radius_computed",
            EvaluationState::AutonomyEvaluated => "autonomy_evaluated",
            EvaluationState::Decided => "decided",
        };
        f.write_str(name)
    }
}

/// Check a single transition.
pub fn validate_transition(
    from: EvaluationState,
    to: EvaluationState,
) -> Result<(), StateMachineError> {
    if from.allowed_transitions().contains(&to) {
        Ok(())
    } else {
        Err(StateMachineError { from, to })
    }
}

/// Tracks one evaluation's position and rejects illegal moves.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationProgress {
    state: EvaluationState,
}

impl EvaluationProgress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: EvaluationState::Received,
        }
    }

    #[must_use]
    pub fn state(&self) -> EvaluationState {
        self.state
    }

    /// Advance to `to`, or fail without changing state.
    pub fn advance(&mut self, to: EvaluationState) -> Result<(), StateMachineError> {
        validate_transition(self.state, to)?;
        tracing::trace!(from = %self.state, to = %to, "evaluation advanced");
        self.state = to;
        Ok(())
    }
}

impl Default for EvaluationProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [EvaluationState; 5] = [
        EvaluationState::Received,
        EvaluationState::PolicyChecked,
        EvaluationState::BlastRadiusComputed,
        EvaluationState::AutonomyEvaluated,
        EvaluationState::Decided,
    ];

    #[test]
    fn happy_path_walks_every_state() {
        let mut progress = EvaluationProgress::new();
        for state in &ALL[1..] {
            progress.advance(*state).unwrap();
        }
        assert!(progress.state().is_terminal());
    }

    #[test]
    fn decided_is_reachable_from_every_non_terminal_state() {
        for state in ALL {
            if state.is_terminal() {
                continue;
            }
            validate_transition(state, EvaluationState::Decided).unwrap();
        }
    }

    #[test]
    fn decided_is_terminal() {
        for state in ALL {
            assert!(validate_transition(EvaluationState::Decided, state).is_err());
        }
    }

    #[test]
    fn skipping_forward_is_rejected() {
        let err = validate_transition(
            EvaluationState::Received,
            EvaluationState::AutonomyEvaluated,
        )
        .unwrap_err();
        assert_eq!(err.from, EvaluationState::Received);

        let mut progress = EvaluationProgress::new();
        assert!(progress.advance(EvaluationState::BlastRadiusComputed).is_err());
        // Failed advance leaves the state untouched.
        assert_eq!(progress.state(), EvaluationState::Received);
    }

    #[test]
    fn moving_backward_is_rejected() {
        assert!(validate_transition(
            EvaluationState::BlastRadiusComputed,
            EvaluationState::PolicyChecked
        )
        .is_err());
    }
}
