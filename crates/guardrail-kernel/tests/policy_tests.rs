//! Policy engine integration tests: immutable precedence, configurable
//! rule lifecycle, and quota behavior over time.

use chrono::{Duration, Utc};
use guardrail_kernel::blast_radius::{ResourceNode, TopologySnapshot};
use guardrail_kernel::config::RateLimitConfig;
use guardrail_kernel::policy::{ConfigurableRule, PolicyEngine, PolicySet, RuleEffect};
use guardrail_kernel::types::{Action, ActionKind, ResourceRef, RiskLevel};
use guardrail_test_utils::{delete_action, deployment, production_topology};
use std::sync::Arc;

fn engine() -> PolicyEngine {
    PolicyEngine::new(RateLimitConfig::default())
}

fn rule(id: &str, condition: &str, effect: RuleEffect) -> ConfigurableRule {
    ConfigurableRule {
        id: id.into(),
        condition: condition.into(),
        effect,
        reason: format!("{id} matched"),
        severity: RiskLevel::Medium,
        enabled: true,
    }
}

#[test]
fn immutable_ids_cover_every_compiled_rule() {
    let ids = engine().immutable_rule_ids();
    for expected in [
        "protected_namespace",
        "critical_workload_protection",
        "drain_all_nodes",
        "rbac_self_lockout",
        "backup_required",
        "destructive_rate_limit",
    ] {
        assert!(ids.contains(&expected), "missing {expected}");
    }
    assert_eq!(ids.len(), 6);
}

#[test]
fn every_immutable_violation_denies() {
    let engine = engine();
    let topology = production_topology();
    let now = Utc::now();

    let cases: Vec<Action> = vec![
        delete_action(ResourceRef::namespaced("Deployment", "kube-system", "coredns")),
        delete_action(deployment("prod", "payments")),
        guardrail_test_utils::drain_action(&["n1", "n2", "n3"]),
        {
            let mut a = delete_action(ResourceRef::cluster("ClusterRoleBinding", "admin"));
            a.params.subjects = vec!["test-user".into()];
            a
        },
        delete_action(ResourceRef::namespaced("StatefulSet", "prod", "db")),
    ];

    for action in cases {
        let outcome = engine.evaluate_immutable(&action, &topology, now);
        assert!(
            outcome.first_deny().is_some(),
            "expected deny for {} on {}",
            action.kind,
            action.target
        );
    }
}

#[test]
fn quota_recovers_as_the_window_slides() {
    let engine = PolicyEngine::new(RateLimitConfig {
        max_destructive: 2,
        window_secs: 600,
    });
    let topology = TopologySnapshot::new();
    let start = Utc::now();

    for _ in 0..2 {
        let action = delete_action(deployment("staging", "web"));
        assert!(engine
            .evaluate_immutable(&action, &topology, start)
            .first_deny()
            .is_none());
    }

    let action = delete_action(deployment("staging", "web"));
    assert!(engine
        .evaluate_immutable(&action, &topology, start)
        .first_deny()
        .is_some());

    // Eleven minutes later the earlier attempts age out.
    let later = start + Duration::seconds(660);
    let action = delete_action(deployment("staging", "web"));
    assert!(engine
        .evaluate_immutable(&action, &topology, later)
        .first_deny()
        .is_none());
}

#[test]
fn configurable_layer_cannot_shadow_immutable_rules() {
    // An operator rule that would allow kube-system deletes simply does
    // not exist as a concept: the immutable layer runs first and its
    // denies are final. Verify the immutable deny survives a permissive
    // configurable set.
    let engine = engine();
    let policy = Arc::new(PolicySet::new().upsert(rule(
        "noop",
        "namespace=nowhere",
        RuleEffect::Deny,
    )));
    let action = delete_action(ResourceRef::namespaced("Deployment", "kube-system", "coredns"));
    let topology = TopologySnapshot::new();

    let immutable = engine.evaluate_immutable(&action, &topology, Utc::now());
    assert!(immutable.first_deny().is_some());

    let configurable = engine.evaluate_configurable(&policy, &action, &topology);
    assert!(configurable.first_deny().is_none());
}

#[test]
fn snapshot_isolation_pins_the_rule_set() {
    let engine = engine();
    let topology = TopologySnapshot::new();
    let action = delete_action(deployment("prod", "web"));

    let v1 = Arc::new(PolicySet::new().upsert(rule(
        "freeze-prod",
        "namespace=prod",
        RuleEffect::Deny,
    )));
    // A later update removes the rule, but the pinned snapshot still has it.
    let v2 = Arc::new(v1.remove("freeze-prod").unwrap());

    assert!(engine
        .evaluate_configurable(&v1, &action, &topology)
        .first_deny()
        .is_some());
    assert!(engine
        .evaluate_configurable(&v2, &action, &topology)
        .first_deny()
        .is_none());
    assert!(v2.version() > v1.version());
}

#[test]
fn condition_fields_cover_the_action_surface() {
    let engine = engine();
    let mut topology = TopologySnapshot::new();
    let target = deployment("prod", "payments");
    topology.insert(ResourceNode::new(target.clone()).critical());

    let action = Action::new(ActionKind::Restart, target, "sre-bot");

    for (condition, expect_match) in [
        ("namespace=prod", true),
        ("namespace=staging", false),
        ("action=restart", true),
        ("kind=deployment", true),
        ("name=payments", true),
        ("requester=sre-bot", true),
        ("requester=other", false),
        ("critical=true", true),
        ("critical=false", false),
        ("namespace=prod,action=restart,critical=true", true),
        ("namespace=prod,action=delete", false),
    ] {
        let policy = Arc::new(PolicySet::new().upsert(rule("probe", condition, RuleEffect::Warn)));
        let outcome = engine.evaluate_configurable(&policy, &action, &topology);
        assert_eq!(
            outcome.violations.len() == 1,
            expect_match,
            "condition {condition:?}"
        );
    }
}
