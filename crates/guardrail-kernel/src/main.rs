use anyhow::Context;
use clap::{Arg, ArgAction, Command, value_parser};
use guardrail_kernel::autonomy::AutonomyLevel;
use guardrail_kernel::blast_radius::{DependencyKind, ResourceNode, TopologySnapshot};
use guardrail_kernel::config::KernelConfig;
use guardrail_kernel::coordinator::{SafetyKernel, TopologyProvider};
use guardrail_kernel::error::TopologyError;
use guardrail_kernel::types::{Action, ResourceRef};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Topology fixture file: resources plus dependency edges.
#[derive(Debug, Deserialize)]
struct TopologyFile {
    #[serde(default)]
    resources: Vec<ResourceNode>,
    #[serde(default)]
    dependencies: Vec<DependencyEdge>,
}

#[derive(Debug, Deserialize)]
struct DependencyEdge {
    from: ResourceRef,
    to: ResourceRef,
    kind: DependencyKind,
}

impl TopologyFile {
    fn build(self) -> anyhow::Result<TopologySnapshot> {
        let mut snapshot = TopologySnapshot::new();
        for resource in self.resources {
            snapshot.insert(resource);
        }
        for edge in self.dependencies {
            snapshot
                .add_dependency(&edge.from, &edge.to, edge.kind)
                .with_context(|| format!("edge {} -> {}", edge.from, edge.to))?;
        }
        Ok(snapshot)
    }
}

struct FileTopology(TopologySnapshot);

#[async_trait::async_trait]
impl TopologyProvider for FileTopology {
    async fn snapshot(&self) -> Result<TopologySnapshot, TopologyError> {
        Ok(self.0.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("guardrail_kernel=info")),
        )
        .init();

    let cli = Command::new("guardrail")
        .version(guardrail_kernel::VERSION)
        .about("Deterministic safety evaluation for cluster-mutating actions")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("evaluate")
                .about("Evaluate one proposed action and print the decision")
                .arg(
                    Arg::new("action")
                        .long("action")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON file describing the proposed action"),
                )
                .arg(
                    Arg::new("topology")
                        .long("topology")
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON file with cluster resources and dependency edges"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Kernel configuration JSON (defaults apply when omitted)"),
                )
                .arg(
                    Arg::new("level")
                        .long("level")
                        .default_value("3")
                        .value_parser(value_parser!(u8).range(1..=5))
                        .help("Autonomy level 1-5"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the full decision record as JSON"),
                ),
        )
        .subcommand(Command::new("rules").about("List the compiled-in immutable rules"))
        .subcommand(Command::new("levels").about("List autonomy levels and their meaning"));

    match cli.get_matches().subcommand() {
        Some(("evaluate", args)) => {
            let action_path = args.get_one::<PathBuf>("action").cloned().unwrap_or_default();
            let raw = std::fs::read_to_string(&action_path)
                .with_context(|| format!("read action file {}", action_path.display()))?;
            let action: Action = serde_json::from_str(&raw).context("parse action")?;

            let topology = match args.get_one::<PathBuf>("topology") {
                Some(path) => {
                    let raw = std::fs::read_to_string(path)
                        .with_context(|| format!("read topology file {}", path.display()))?;
                    let file: TopologyFile =
                        serde_json::from_str(&raw).context("parse topology")?;
                    file.build()?
                }
                None => TopologySnapshot::new(),
            };

            let config = match args.get_one::<PathBuf>("config") {
                Some(path) => KernelConfig::from_json_file(path)?,
                None => KernelConfig::default(),
            };

            let level = args
                .get_one::<u8>("level")
                .copied()
                .and_then(AutonomyLevel::from_u8)
                .unwrap_or_default();

            let (kernel, _channels) = SafetyKernel::new(config, Arc::new(FileTopology(topology)))?;
            kernel.set_autonomy_level(level);

            let decision = kernel.evaluate(&action).await;

            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&decision)?);
            } else {
                println!("Decision: {}", decision.result.as_str());
                println!("Risk: {}", decision.risk_level.as_str());
                println!("Reason: {}", decision.reason);
                if let Some(radius) = &decision.blast_radius {
                    println!("Affected resources: {}", radius.affected_count());
                    let (min, max) = radius.estimated_downtime_secs;
                    println!("Estimated downtime: {min}-{max}s");
                }
                println!("Requires human: {}", decision.requires_human);
            }

            std::process::exit(if decision.result.is_approved() { 0 } else { 1 });
        }
        Some(("rules", _)) => {
            let (kernel, _channels) = SafetyKernel::new(
                KernelConfig::default(),
                Arc::new(FileTopology(TopologySnapshot::new())),
            )?;
            println!("Immutable rules (always enforced, never overridable):");
            for id in kernel.immutable_rule_ids() {
                println!("  {id}");
            }
            Ok(())
        }
        Some(("levels", _)) => {
            for level in AutonomyLevel::ALL {
                println!("{}. {}", level.as_u8(), level.description());
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
