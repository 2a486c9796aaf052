//! Checkpoints, post-action health monitoring, and automatic rollback.
//!
//! Before an approved mutating action executes, a checkpoint captures the
//! state needed to reverse it. Health signals reported inside the
//! observation window compare against the configured degradation
//! thresholds; a degraded signal consumes the checkpoint exactly once and
//! emits the inverse action on the rollback channel. Signals arriving
//! after the window closes, or after the checkpoint is consumed, are
//! recorded and otherwise ignored.
//!
//! The dead man's switch covers the silent-failure case: a checkpoint
//! that hears nothing at all for too long escalates to a human instead of
//! rolling back on no evidence.

use crate::config::RollbackConfig;
use crate::error::RollbackError;
use crate::types::{Action, ActionId, ActionKind, CheckpointId, RequesterId};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::mpsc;

/// Identity attached to kernel-initiated inverse actions.
const ROLLBACK_REQUESTER: &str = "guardrail-rollback";

/// State captured before execution, sufficient to build the inverse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreState {
    /// Replica count before a scale.
    #[serde(default)]
    pub replicas: Option<u32>,
    /// Full manifest before a delete or update.
    #[serde(default)]
    pub manifest: Option<serde_json::Value>,
}

/// A health observation for one executed action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthSignal {
    /// Error-rate fraction before and after the action.
    ErrorRate { before: f64, after: f64 },
    /// Containers in a crash loop since the action.
    CrashLoops { count: u32 },
    /// Ready-replica fraction before and after the action.
    ReadinessRegression { before: f64, after: f64 },
}

impl HealthSignal {
    /// Whether the signal crosses a degradation threshold.
    #[must_use]
    pub fn degraded(&self, config: &RollbackConfig) -> bool {
        match *self {
            HealthSignal::ErrorRate { before, after } => {
                after - before > config.error_rate_threshold
            }
            HealthSignal::CrashLoops { count } => count >= config.crash_loop_threshold,
            HealthSignal::ReadinessRegression { before, after } => {
                before - after > config.readiness_drop_threshold
            }
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match *self {
            HealthSignal::ErrorRate { before, after } => {
                format!("error rate rose from {before:.3} to {after:.3}")
            }
            HealthSignal::CrashLoops { count } => format!("{count} containers crash-looping"),
            HealthSignal::ReadinessRegression { before, after } => {
                format!("ready fraction fell from {before:.3} to {after:.3}")
            }
        }
    }
}

/// Outcome of reporting a health signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOutcome {
    /// Signal within thresholds; nothing to do.
    Healthy,
    /// Degradation detected; the inverse action was emitted.
    RolledBack,
    /// The checkpoint was already consumed; the signal is a no-op.
    AlreadyConsumed,
    /// The observation window has closed; the signal is a no-op.
    WindowClosed,
}

/// Events the kernel emits for an executor or operator to act on.
#[derive(Debug, Clone)]
pub enum RollbackEvent {
    /// Execute this inverse action to restore the checkpointed state.
    InverseAction {
        checkpoint_id: CheckpointId,
        original_action_id: ActionId,
        inverse: Action,
        trigger: String,
    },
    /// No health signal arrived for too long; a human must look.
    Escalate {
        checkpoint_id: CheckpointId,
        original_action_id: ActionId,
        silent_secs: u64,
    },
}

/// How a checkpoint left the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    RolledBack { trigger: String },
    Escalated,
    Dismissed,
    Expired,
}

/// Bounded audit record of checkpoint outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub checkpoint_id: CheckpointId,
    pub action_id: ActionId,
    pub kind: HistoryKind,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Checkpoint {
    id: CheckpointId,
    action: Action,
    pre_state: PreState,
    created_at: DateTime<Utc>,
    /// Last time any signal mentioned this checkpoint.
    last_heard_at: DateTime<Utc>,
    consumed: bool,
    escalated: bool,
}

/// Tracks checkpoints and turns degradation into inverse actions.
#[derive(Debug)]
pub struct RollbackManager {
    config: RollbackConfig,
    checkpoints: DashMap<CheckpointId, Checkpoint>,
    by_action: DashMap<ActionId, CheckpointId>,
    events: mpsc::UnboundedSender<RollbackEvent>,
    history: Mutex<VecDeque<HistoryEntry>>,
}

impl RollbackManager {
    /// Build a manager and the receiving end of its event channel.
    #[must_use]
    pub fn new(config: RollbackConfig) -> (Self, mpsc::UnboundedReceiver<RollbackEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Self {
                config,
                checkpoints: DashMap::new(),
                by_action: DashMap::new(),
                events,
                history: Mutex::new(VecDeque::new()),
            },
            receiver,
        )
    }

    /// Capture pre-execution state for an approved action.
    pub fn create_checkpoint(&self, action: &Action, pre_state: PreState) -> CheckpointId {
        self.create_checkpoint_at(action, pre_state, Utc::now())
    }

    pub fn create_checkpoint_at(
        &self,
        action: &Action,
        pre_state: PreState,
        now: DateTime<Utc>,
    ) -> CheckpointId {
        let id = CheckpointId::new();
        tracing::info!(checkpoint = %id, action = %action.id, "checkpoint created");
        self.checkpoints.insert(
            id,
            Checkpoint {
                id,
                action: action.clone(),
                pre_state,
                created_at: now,
                last_heard_at: now,
                consumed: false,
                escalated: false,
            },
        );
        self.by_action.insert(action.id, id);
        id
    }

    /// Report a health signal for a checkpoint.
    pub fn report_health(
        &self,
        checkpoint_id: CheckpointId,
        signal: HealthSignal,
    ) -> Result<HealthOutcome, RollbackError> {
        self.report_health_at(checkpoint_id, signal, Utc::now())
    }

    /// Report a health signal for an executed action, for collaborators
    /// that track actions rather than checkpoints.
    pub fn report_health_for_action(
        &self,
        action_id: ActionId,
        signal: HealthSignal,
    ) -> Result<HealthOutcome, RollbackError> {
        self.report_health_for_action_at(action_id, signal, Utc::now())
    }

    pub fn report_health_for_action_at(
        &self,
        action_id: ActionId,
        signal: HealthSignal,
        now: DateTime<Utc>,
    ) -> Result<HealthOutcome, RollbackError> {
        let checkpoint_id = self
            .by_action
            .get(&action_id)
            .map(|entry| *entry.value())
            .ok_or(RollbackError::NoCheckpointForAction(action_id))?;
        self.report_health_at(checkpoint_id, signal, now)
    }

    /// Deterministic variant taking an explicit clock reading.
    ///
    /// Consumption is at-most-once: the checkpoint entry stays locked from
    /// the degradation check through the consumed flag, so two concurrent
    /// degraded signals produce exactly one inverse action.
    pub fn report_health_at(
        &self,
        checkpoint_id: CheckpointId,
        signal: HealthSignal,
        now: DateTime<Utc>,
    ) -> Result<HealthOutcome, RollbackError> {
        let mut entry = self
            .checkpoints
            .get_mut(&checkpoint_id)
            .ok_or(RollbackError::CheckpointNotFound(checkpoint_id))?;

        entry.last_heard_at = now;

        if entry.consumed {
            return Ok(HealthOutcome::AlreadyConsumed);
        }

        let window = Duration::seconds(self.config.observation_window_secs as i64);
        if now - entry.created_at > window {
            tracing::debug!(
                checkpoint = %checkpoint_id,
                "signal after observation window, ignoring"
            );
            return Ok(HealthOutcome::WindowClosed);
        }

        if !signal.degraded(&self.config) {
            return Ok(HealthOutcome::Healthy);
        }

        entry.consumed = true;
        let action_id = entry.action.id;
        let trigger = signal.describe();
        let event = RollbackEvent::InverseAction {
            checkpoint_id,
            original_action_id: action_id,
            inverse: inverse_of(&entry.action, &entry.pre_state),
            trigger: trigger.clone(),
        };
        drop(entry);

        tracing::warn!(
            checkpoint = %checkpoint_id,
            action = %action_id,
            trigger = %trigger,
            "degradation detected, rolling back"
        );
        self.events
            .send(event)
            .map_err(|_| RollbackError::ChannelClosed)?;
        self.record(checkpoint_id, action_id, HistoryKind::RolledBack { trigger }, now);
        Ok(HealthOutcome::RolledBack)
    }

    /// Operator confirms the action is healthy; drop the checkpoint.
    pub fn dismiss(&self, checkpoint_id: CheckpointId) -> Result<(), RollbackError> {
        self.dismiss_at(checkpoint_id, Utc::now())
    }

    pub fn dismiss_at(
        &self,
        checkpoint_id: CheckpointId,
        now: DateTime<Utc>,
    ) -> Result<(), RollbackError> {
        let (_, checkpoint) = self
            .checkpoints
            .remove(&checkpoint_id)
            .ok_or(RollbackError::CheckpointNotFound(checkpoint_id))?;
        self.by_action.remove(&checkpoint.action.id);
        self.record(checkpoint_id, checkpoint.action.id, HistoryKind::Dismissed, now);
        Ok(())
    }

    /// Periodic maintenance: escalate silent checkpoints past the dead
    /// man's switch timeout, discard checkpoints past retention.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let deadman = Duration::seconds(self.config.deadman_timeout_secs as i64);
        let retention = Duration::seconds(self.config.retention_secs as i64);

        let mut escalations = Vec::new();
        let mut expired = Vec::new();

        for mut entry in self.checkpoints.iter_mut() {
            if now - entry.created_at > retention {
                expired.push((entry.id, entry.action.id));
                continue;
            }
            if !entry.consumed && !entry.escalated && now - entry.last_heard_at > deadman {
                entry.escalated = true;
                escalations.push((
                    entry.id,
                    entry.action.id,
                    (now - entry.last_heard_at).num_seconds().max(0) as u64,
                ));
            }
        }

        for (checkpoint_id, action_id, silent_secs) in escalations {
            tracing::warn!(
                checkpoint = %checkpoint_id,
                action = %action_id,
                silent_secs,
                "no health signal, escalating to operator"
            );
            // A send failure here means no listener remains; the escalated
            // flag still prevents repeats.
            let _ = self.events.send(RollbackEvent::Escalate {
                checkpoint_id,
                original_action_id: action_id,
                silent_secs,
            });
            self.record(checkpoint_id, action_id, HistoryKind::Escalated, now);
        }

        for (checkpoint_id, action_id) in expired {
            self.checkpoints.remove(&checkpoint_id);
            self.by_action.remove(&action_id);
            self.record(checkpoint_id, action_id, HistoryKind::Expired, now);
        }
    }

    /// Checkpoint ids currently live, for the operator surface.
    #[must_use]
    pub fn active_checkpoints(&self) -> Vec<CheckpointId> {
        self.checkpoints.iter().map(|e| e.id).collect()
    }

    /// Recent checkpoint outcomes, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().iter().cloned().collect()
    }

    fn record(
        &self,
        checkpoint_id: CheckpointId,
        action_id: ActionId,
        kind: HistoryKind,
        at: DateTime<Utc>,
    ) {
        let mut history = self.history.lock();
        history.push_back(HistoryEntry {
            checkpoint_id,
            action_id,
            kind,
            at,
        });
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }
}

/// Build the action that restores checkpointed state.
fn inverse_of(action: &Action, pre_state: &PreState) -> Action {
    let (kind, params_replicas, manifest) = match action.kind {
        ActionKind::Scale => (ActionKind::Scale, pre_state.replicas, None),
        ActionKind::Delete => (ActionKind::Create, None, pre_state.manifest.clone()),
        ActionKind::Create => (ActionKind::Delete, None, None),
        ActionKind::Update => (ActionKind::Update, None, pre_state.manifest.clone()),
        // Re-enable scheduling on the node; the executor interprets the
        // uncordon marker.
        ActionKind::Cordon | ActionKind::Drain => (ActionKind::Update, None, None),
        // A bad restart is reversed by restarting onto the prior revision.
        ActionKind::Restart => (ActionKind::Restart, None, pre_state.manifest.clone()),
    };

    let mut inverse = Action::new(kind, action.target.clone(), ROLLBACK_REQUESTER);
    inverse.params.replicas = params_replicas;
    if let Some(manifest) = manifest {
        inverse.params.extra.insert("manifest".to_string(), manifest);
    }
    if matches!(action.kind, ActionKind::Cordon | ActionKind::Drain) {
        inverse
            .params
            .extra
            .insert("uncordon".to_string(), serde_json::Value::Bool(true));
    }
    inverse
}

impl RequesterId {
    /// Whether this identity belongs to the kernel's own rollback path.
    #[must_use]
    pub fn is_rollback_agent(&self) -> bool {
        self.as_str() == ROLLBACK_REQUESTER
    }
}
