//! Falcon pull secret controller

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use falcon_pull_secrets::config::{PullSecretConfig, CRITICAL_NAMESPACE};
use falcon_pull_secrets::controller::{
    error_policy, owning_falcon_containers, reconcile, run_pass, Context, REQUEUE_SUCCESS_SECS,
};
use falcon_pull_secrets::crd::FalconContainer;
use falcon_pull_secrets::FIELD_MANAGER;

/// Keeps the CrowdStrike registry pull secret present in every eligible namespace
#[derive(Parser, Debug)]
#[command(name = "falcon-pull-secrets", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    options: RuntimeOptions,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Installs the FalconContainer CRD, then reconciles every
    /// FalconContainer until a shutdown signal arrives.
    Controller,

    /// Run a single pass for one FalconContainer and print the report
    ///
    /// Does not update the resource's status.
    Sync {
        /// Name of the FalconContainer
        name: String,
    },
}

/// Options shared by every mode
#[derive(Args, Debug)]
struct RuntimeOptions {
    /// Seconds between passes for a healthy FalconContainer
    #[arg(
        long,
        env = "FALCON_REQUEUE_SECS",
        default_value_t = REQUEUE_SUCCESS_SECS,
        global = true
    )]
    requeue_secs: u64,

    /// Namespace whose pull secret must be created for a pass to succeed
    #[arg(
        long,
        env = "FALCON_CRITICAL_NAMESPACE",
        default_value = CRITICAL_NAMESPACE,
        global = true
    )]
    critical_namespace: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&FalconContainer::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Sync { name }) => run_sync(&name, &cli.options).await,
        Some(Commands::Controller) | None => run_controller(&cli.options).await,
    }
}

fn build_context(client: &Client, options: &RuntimeOptions) -> anyhow::Result<Context> {
    let config = PullSecretConfig::default().with_critical_namespace(&options.critical_namespace);
    Context::builder(client.clone())
        .config(config)
        .requeue(Duration::from_secs(options.requeue_secs))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build controller context: {}", e))
}

/// Ensure the FalconContainer CRD is installed, using server-side apply
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing FalconContainer CRD...");
    crds.patch(
        "falconcontainers.falcon.crowdstrike.com",
        &params,
        &Patch::Apply(&FalconContainer::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install FalconContainer CRD: {}", e))?;

    tracing::info!("FalconContainer CRD installed/updated");
    Ok(())
}

async fn run_controller(options: &RuntimeOptions) -> anyhow::Result<()> {
    tracing::info!("Falcon pull secret controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crd_installed(&client).await?;

    let ctx = Arc::new(build_context(&client, options)?);
    let selector = ctx.config.label_selector();

    let falcon_containers: Api<FalconContainer> = Api::all(client.clone());
    let secrets: Api<Secret> = Api::all(client);

    tracing::info!(
        requeue_secs = options.requeue_secs,
        critical_namespace = %options.critical_namespace,
        "Starting FalconContainer controller"
    );

    // Deleted pull secrets trigger a pass for their owner
    Controller::new(falcon_containers, WatcherConfig::default())
        .watches(
            secrets,
            WatcherConfig::default().labels(&selector),
            owning_falcon_containers,
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "FalconContainer reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "FalconContainer reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Controller shut down");
    Ok(())
}

async fn run_sync(name: &str, options: &RuntimeOptions) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let falcon_containers: Api<FalconContainer> = Api::all(client.clone());
    let fc = falcon_containers
        .get(name)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read FalconContainer {}: {}", name, e))?;

    let ctx = build_context(&client, options)?;
    let report = run_pass(&fc, &ctx)
        .await
        .map_err(|e| anyhow::anyhow!("Pass for FalconContainer {} failed: {}", name, e))?;

    println!("created: {}", report.created.join(", "));
    println!("already present: {}", report.already_present.join(", "));
    for failure in &report.failed {
        println!("failed: {} ({})", failure.namespace, failure.error);
    }
    for (ns, warning) in &report.owner_warnings {
        println!("no owner reference: {} ({})", ns, warning);
    }
    if report.is_noop() {
        println!("nothing to do");
    }
    Ok(())
}
