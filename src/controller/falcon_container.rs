//! FalconContainer controller
//!
//! Each reconcile validates the parent's Falcon API credentials, runs one pull
//! secret pass and records the outcome on the parent's status. The pass
//! itself lives in [`crate::reconcile`]; this module only wires it to the
//! controller runtime.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::cluster::{ClusterClient, KubeClusterClient};
use crate::config::PullSecretConfig;
use crate::crd::{FalconContainer, FalconContainerStatus, PullSecretPhase};
use crate::reconcile::{upsert_pull_secrets, PassReport};
use crate::token::{FalconTokenIssuer, TokenIssuer};
use crate::Error;

/// Default interval between passes for a healthy FalconContainer
pub const REQUEUE_SUCCESS_SECS: u64 = 300;

/// Interval before retrying a failed reconcile
pub const REQUEUE_ERROR_SECS: u64 = 60;

/// Interval before retrying a reconcile that failed with a non-retryable error
pub const REQUEUE_NON_RETRYABLE_SECS: u64 = 600;

/// Controller context containing shared state and clients
///
/// The collaborators are trait objects so tests can substitute mocks.
pub struct Context {
    /// Cluster object store (trait object for testability)
    pub cluster: Arc<dyn ClusterClient>,
    /// Registry pull token issuer
    pub issuer: Arc<dyn TokenIssuer>,
    /// Fixed pull secret shape and namespace policy
    pub config: PullSecretConfig,
    /// Delay before the next pass after a successful one
    pub requeue: Duration,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with custom mock clients
    ///
    /// For production code, use [`Context::builder`].
    #[cfg(test)]
    pub fn for_testing(cluster: Arc<dyn ClusterClient>, issuer: Arc<dyn TokenIssuer>) -> Self {
        Self {
            cluster,
            issuer,
            config: PullSecretConfig::default(),
            requeue: Duration::from_secs(REQUEUE_SUCCESS_SECS),
        }
    }
}

/// Builder for constructing [`Context`] instances
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .requeue(Duration::from_secs(120))
///     .config(PullSecretConfig::default().with_critical_namespace("falcon-system"))
///     .build()?;
/// ```
pub struct ContextBuilder {
    client: Client,
    cluster: Option<Arc<dyn ClusterClient>>,
    issuer: Option<Arc<dyn TokenIssuer>>,
    config: PullSecretConfig,
    requeue: Duration,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            cluster: None,
            issuer: None,
            config: PullSecretConfig::default(),
            requeue: Duration::from_secs(REQUEUE_SUCCESS_SECS),
        }
    }

    /// Set the pull secret configuration
    pub fn config(mut self, config: PullSecretConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the interval between passes
    pub fn requeue(mut self, requeue: Duration) -> Self {
        self.requeue = requeue;
        self
    }

    /// Override the cluster client (primarily for testing)
    pub fn cluster_client(mut self, cluster: Arc<dyn ClusterClient>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Override the token issuer (primarily for testing)
    pub fn token_issuer(mut self, issuer: Arc<dyn TokenIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Build the Context
    ///
    /// Fails only if the default HTTP client for the token issuer cannot be
    /// constructed.
    pub fn build(self) -> Result<Context, Error> {
        let issuer: Arc<dyn TokenIssuer> = match self.issuer {
            Some(issuer) => issuer,
            None => Arc::new(FalconTokenIssuer::new()?),
        };
        Ok(Context {
            cluster: self
                .cluster
                .unwrap_or_else(|| Arc::new(KubeClusterClient::new(self.client.clone()))),
            issuer,
            config: self.config,
            requeue: self.requeue,
        })
    }
}

/// Run one pass for `fc` without touching its status
///
/// Validation errors are returned before any cluster call.
pub async fn run_pass(fc: &FalconContainer, ctx: &Context) -> Result<PassReport, Error> {
    let api = fc.spec.falcon_api.to_api_config()?;
    upsert_pull_secrets(
        ctx.cluster.as_ref(),
        ctx.issuer.as_ref(),
        &ctx.config,
        fc,
        &api,
    )
    .await
}

/// Status describing a successful pass
pub fn status_for_report(report: &PassReport) -> FalconContainerStatus {
    let failed = report.failed_namespaces();
    if failed.is_empty() {
        FalconContainerStatus::with_phase(PullSecretPhase::Ready)
            .message("Pull secret present in every eligible namespace")
    } else {
        FalconContainerStatus::with_phase(PullSecretPhase::Degraded)
            .message(format!("Pull secret missing in {} namespace(s)", failed.len()))
            .failed_namespaces(failed)
    }
}

/// Reconcile a FalconContainer resource
///
/// Spec validation failures mark the resource Failed and wait for a spec
/// change. A failed pass marks it Failed and hands the error to
/// [`error_policy`]. A successful pass records Ready or Degraded and requeues
/// after the configured interval.
#[instrument(skip(fc, ctx), fields(falcon_container = %fc.name_any()))]
pub async fn reconcile(fc: Arc<FalconContainer>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = fc.name_any();
    info!("reconciling falcon container");

    let api = match fc.spec.falcon_api.to_api_config() {
        Ok(api) => api,
        Err(e) => {
            warn!(error = %e, "falcon container validation failed");
            let status = FalconContainerStatus::with_phase(PullSecretPhase::Failed)
                .message(e.to_string())
                .synced_now();
            update_status(&fc, &ctx, status).await?;
            return Ok(Action::await_change());
        }
    };

    let report = match upsert_pull_secrets(
        ctx.cluster.as_ref(),
        ctx.issuer.as_ref(),
        &ctx.config,
        &fc,
        &api,
    )
    .await
    {
        Ok(report) => report,
        Err(e) => {
            let status = FalconContainerStatus::with_phase(PullSecretPhase::Failed)
                .message(e.to_string())
                .synced_now();
            if let Err(patch_err) = update_status(&fc, &ctx, status).await {
                warn!(error = %patch_err, "failed to record pass failure in status");
            }
            return Err(e);
        }
    };

    update_status(&fc, &ctx, status_for_report(&report).synced_now()).await?;

    debug!(%name, created = report.created.len(), "pass finished");
    Ok(Action::requeue(ctx.requeue))
}

/// Error policy for the controller
///
/// Transient errors requeue after [`REQUEUE_ERROR_SECS`]. Errors that need an
/// operator to fix RBAC or the spec back off to [`REQUEUE_NON_RETRYABLE_SECS`].
pub fn error_policy(fc: Arc<FalconContainer>, error: &Error, _ctx: Arc<Context>) -> Action {
    let retryable = error.is_retryable();
    error!(
        ?error,
        falcon_container = %fc.name_any(),
        retryable,
        "reconciliation failed"
    );

    let secs = if retryable {
        REQUEUE_ERROR_SECS
    } else {
        REQUEUE_NON_RETRYABLE_SECS
    };
    Action::requeue(Duration::from_secs(secs))
}

/// FalconContainers that control `secret`
///
/// FalconContainer is cluster-scoped, so the returned references carry no
/// namespace even though the secret has one.
pub fn owning_falcon_containers(secret: Secret) -> Vec<ObjectRef<FalconContainer>> {
    let kind = FalconContainer::kind(&());
    let api_version = FalconContainer::api_version(&());
    secret
        .metadata
        .owner_references
        .unwrap_or_default()
        .into_iter()
        .filter(|r| {
            r.controller == Some(true) && r.kind == kind && r.api_version == api_version
        })
        .map(|r| ObjectRef::new(&r.name))
        .collect()
}

/// Patch the status unless the outcome is unchanged
async fn update_status(
    fc: &FalconContainer,
    ctx: &Context,
    status: FalconContainerStatus,
) -> Result<(), Error> {
    if let Some(current) = fc.status.as_ref() {
        if current.same_outcome(&status) {
            debug!("status unchanged, skipping patch");
            return Ok(());
        }
    }
    ctx.cluster.patch_status(&fc.name_any(), &status).await
}
