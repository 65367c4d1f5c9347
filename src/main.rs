//! ALM Operator - lifecycle management for packaged Kubernetes operators

use std::collections::BTreeMap;
use std::sync::Arc;

use clap::Parser;
use kube::{Client, CustomResourceExt};
use tokio::sync::RwLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use alm::config::{parse_annotation, OperatorConfig};
use alm::controller::{runner, Context, PlanContext};
use alm::crd::{ClusterServiceVersion, InstallPlan};

/// ALM - Kubernetes operator for installing and upgrading packaged operators
#[derive(Parser, Debug)]
#[command(name = "alm", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Re-check interval for healthy CSVs, in seconds; negative values fall
    /// back to the default of 30
    #[arg(long, env = "ALM_WAKEUP_INTERVAL_SECS", default_value = "30")]
    wakeup_interval_secs: i64,

    /// Namespace to watch (repeatable); watches all namespaces when omitted
    #[arg(long = "namespace", env = "ALM_NAMESPACES", value_delimiter = ',')]
    namespaces: Vec<String>,

    /// Annotation applied to managed namespaces, as key=value (repeatable)
    #[arg(long = "annotation", value_parser = parse_annotation)]
    annotations: Vec<(String, String)>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        // Generate CRD YAML for cluster registration
        let csv_crd = serde_yaml::to_string(&ClusterServiceVersion::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize ClusterServiceVersion CRD: {e}"))?;
        let plan_crd = serde_yaml::to_string(&InstallPlan::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize InstallPlan CRD: {e}"))?;
        println!("{csv_crd}---\n{plan_crd}");
        return Ok(());
    }

    let config = OperatorConfig::new(
        cli.wakeup_interval_secs,
        cli.namespaces,
        cli.annotations.into_iter().collect::<BTreeMap<_, _>>(),
    );
    tracing::info!(
        wakeup_interval = ?config.wakeup_interval,
        namespaces = ?config.watched_namespaces,
        "starting ALM operator"
    );

    let client = Client::try_default().await?;

    let ctx = Arc::new(Context::new(client.clone(), config.wakeup_interval));
    // catalog sources register at runtime; plans resolved before any
    // registration fail with not-found and are re-created by their owners
    let sources = Arc::new(RwLock::new(Vec::new()));
    let plan_ctx = Arc::new(PlanContext::new(client.clone(), sources));

    runner::run_controllers(client, &config, ctx, plan_ctx).await;
    Ok(())
}
