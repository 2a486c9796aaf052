//! Kernel configuration.
//!
//! Everything the safety rules treat as tunable lives here: downtime
//! heuristics, degradation thresholds, the dead-man's-switch timeout,
//! rate-limit quotas, traversal bounds. Defaults are conservative; an
//! operator overrides them from a JSON file or programmatically.
//!
//! Configuration is read through a point-in-time snapshot taken at
//! evaluation start (see the coordinator), so concurrent updates never
//! produce a decision mixing old and new values.

use crate::error::KernelError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level kernel tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Seconds to wait for the cluster-state collaborator before the
    /// fail-closed rule applies.
    pub topology_timeout_secs: u64,
    pub blast: BlastConfig,
    pub rate_limit: RateLimitConfig,
    pub rollback: RollbackConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            topology_timeout_secs: 10,
            blast: BlastConfig::default(),
            rate_limit: RateLimitConfig::default(),
            rollback: RollbackConfig::default(),
        }
    }
}

impl KernelConfig {
    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, KernelError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| KernelError::Configuration(format!("read config: {e}")))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| KernelError::Configuration(format!("parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would disable safety behavior.
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.blast.max_depth == 0 {
            return Err(KernelError::Configuration(
                "blast.max_depth must be at least 1".into(),
            ));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(KernelError::Configuration(
                "rate_limit.window_secs must be non-zero".into(),
            ));
        }
        if self.rate_limit.max_destructive == 0 {
            return Err(KernelError::Configuration(
                "rate_limit.max_destructive must be at least 1".into(),
            ));
        }
        if self.rollback.deadman_timeout_secs == 0 {
            return Err(KernelError::Configuration(
                "rollback.deadman_timeout_secs must be non-zero".into(),
            ));
        }
        if self.rollback.retention_secs < self.rollback.deadman_timeout_secs {
            return Err(KernelError::Configuration(
                "rollback.retention_secs must cover the dead-man's-switch timeout".into(),
            ));
        }
        Ok(())
    }
}

/// Blast-radius traversal and severity tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlastConfig {
    /// Bound on transitive-dependent traversal depth. Ownership graphs can
    /// contain cycles; the visited set guarantees termination and this
    /// bound keeps the affected set reviewable.
    pub max_depth: usize,
    /// Affected-resource count at which a destructive action escalates
    /// from medium to high severity.
    pub high_count_threshold: usize,
    pub downtime: DowntimeParams,
}

impl Default for BlastConfig {
    fn default() -> Self {
        Self {
            max_depth: 8,
            high_count_threshold: 5,
            downtime: DowntimeParams::default(),
        }
    }
}

/// Downtime estimate heuristics: per-kind base seconds scaled by replica
/// count. The exact formula is deliberately a tunable, not a constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DowntimeParams {
    /// Base disruption seconds for kinds not listed in `per_kind`.
    pub default_secs: u64,
    /// Base disruption seconds per resource kind (lowercase).
    pub per_kind: BTreeMap<String, u64>,
    /// Upper-bound multiplier applied per replica of the direct target.
    pub replica_factor: u64,
}

impl Default for DowntimeParams {
    fn default() -> Self {
        let mut per_kind = BTreeMap::new();
        per_kind.insert("pod".to_string(), 30);
        per_kind.insert("deployment".to_string(), 60);
        per_kind.insert("statefulset".to_string(), 120);
        per_kind.insert("node".to_string(), 300);
        Self {
            default_secs: 60,
            per_kind,
            replica_factor: 1,
        }
    }
}

impl DowntimeParams {
    /// Base seconds for a resource kind.
    #[must_use]
    pub fn base_secs(&self, kind: &str) -> u64 {
        self.per_kind
            .get(&kind.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default_secs)
    }
}

/// Destructive-action quota per requester per rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_destructive: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_destructive: 10,
            window_secs: 3600,
        }
    }
}

/// Rollback monitoring tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackConfig {
    /// Error-rate increase that triggers automatic rollback.
    pub error_rate_threshold: f64,
    /// Crash-loop count that triggers automatic rollback.
    pub crash_loop_threshold: u32,
    /// Ready-replica fraction drop that triggers automatic rollback.
    pub readiness_drop_threshold: f64,
    /// Seconds after checkpoint creation during which a degraded signal
    /// triggers rollback.
    pub observation_window_secs: u64,
    /// Dead man's switch: seconds of silence after which the kernel
    /// escalates to a human operator.
    pub deadman_timeout_secs: u64,
    /// Seconds an unconsumed checkpoint is retained before discard.
    pub retention_secs: u64,
    /// Bounded in-memory rollback/escalation history.
    pub history_limit: usize,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            error_rate_threshold: 0.05,
            crash_loop_threshold: 3,
            readiness_drop_threshold: 0.02,
            observation_window_secs: 300,
            deadman_timeout_secs: 600,
            retention_secs: 3600,
            history_limit: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        KernelConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_window_rejected() {
        let mut config = KernelConfig::default();
        config.rate_limit.window_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn retention_must_cover_deadman() {
        let mut config = KernelConfig::default();
        config.rollback.retention_secs = 10;
        config.rollback.deadman_timeout_secs = 600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn serde_round_trip() {
        let config = KernelConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: KernelConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: KernelConfig =
            serde_json::from_str(r#"{"rate_limit":{"max_destructive":3}}"#).unwrap();
        assert_eq!(config.rate_limit.max_destructive, 3);
        assert_eq!(config.rate_limit.window_secs, 3600);
        assert_eq!(config.blast.max_depth, 8);
    }

    #[test]
    fn downtime_base_lookup_is_case_insensitive() {
        let params = DowntimeParams::default();
        assert_eq!(params.base_secs("StatefulSet"), 120);
        assert_eq!(params.base_secs("CustomThing"), params.default_secs);
    }
}
