//! `policy-sim`: run one policy through the simulation pipeline

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use policy_simulator_core_rs::config::PipelineConfig;
use policy_simulator_core_rs::models::SimulationRequest;
use policy_simulator_core_rs::orchestrator::Pipeline;
use policy_simulator_core_rs::region::StaticRegionalData;
use policy_simulator_core_rs::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "policy-sim", version, about = "Simulate the impact of a public policy")]
struct Args {
    /// Policy text, e.g. "Add 2 lanes and 50 charging stations with a ₹10 crore budget"
    #[arg(required_unless_present = "list_states")]
    policy: Option<String>,

    /// Indian state or union territory
    #[arg(short, long, default_value = "Karnataka")]
    state: String,

    /// Skip the optimization stage
    #[arg(long)]
    no_optimize: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print only the narrative instead of the full JSON context
    #[arg(long)]
    narrative: bool,

    /// List the regions with baseline data and exit
    #[arg(long)]
    list_states: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = PipelineConfig::load(args.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.logging.filter);

    if args.list_states {
        for state in StaticRegionalData::new().states() {
            println!("{}", state);
        }
        return Ok(());
    }

    let policy = args.policy.unwrap_or_default();
    let pipeline = Pipeline::new(config).context("building pipeline")?;
    let request = SimulationRequest::new(policy, args.state).with_optimization(!args.no_optimize);

    let ctx = pipeline.run(request).await.context("running pipeline")?;
    info!(
        request_id = %ctx.request_id,
        artifact_loads = pipeline.cache().load_count(),
        "simulation complete"
    );

    if args.narrative {
        if let Some(report) = ctx.explanation() {
            println!("{}", report.narrative);
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&ctx)?);
    }
    Ok(())
}
