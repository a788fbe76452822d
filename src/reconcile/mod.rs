//! Pull secret reconciliation pass
//!
//! One pass detects the namespaces missing a pull secret, fetches a single
//! fresh token if there are any, and creates the secret in each of them in
//! namespace order. The critical namespace must succeed; every other
//! namespace is best effort.

mod gaps;
mod materialize;

#[cfg(test)]
pub(crate) mod fake;

pub use gaps::{detect_gaps, eligible_namespaces, is_eligible};
pub use materialize::{build_pull_secret, materialize, MaterializeOutcome, Materialized};

use tracing::{debug, error, info, warn};

use crate::cluster::ClusterClient;
use crate::config::{FalconApiConfig, NamespacePolicy, PullSecretConfig};
use crate::crd::FalconContainer;
use crate::owner::OwnerRefWarning;
use crate::token::TokenIssuer;
use crate::Error;

/// A best-effort namespace whose create failed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceFailure {
    /// Namespace that still lacks a pull secret
    pub namespace: String,
    /// Rendered error
    pub error: String,
}

/// What a successful pass did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    /// True if a token was fetched (there was at least one gap)
    pub token_fetched: bool,
    /// Namespaces where the secret was created
    pub created: Vec<String>,
    /// Namespaces where the secret turned out to exist already
    pub already_present: Vec<String>,
    /// Best-effort namespaces that failed
    pub failed: Vec<NamespaceFailure>,
    /// Namespaces whose secret was created without an owner reference
    pub owner_warnings: Vec<(String, OwnerRefWarning)>,
}

impl PassReport {
    /// True if there was nothing to do
    pub fn is_noop(&self) -> bool {
        !self.token_fetched
    }

    /// Names of the failed best-effort namespaces
    pub fn failed_namespaces(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.namespace.clone()).collect()
    }
}

/// Run one reconciliation pass
///
/// Returns the first namespace-list, secret-list, token or critical-create
/// error. Best-effort create failures are logged and recorded in the report;
/// the pass still succeeds.
pub async fn upsert_pull_secrets(
    cluster: &dyn ClusterClient,
    issuer: &dyn TokenIssuer,
    config: &PullSecretConfig,
    parent: &FalconContainer,
    api: &FalconApiConfig,
) -> Result<PassReport, Error> {
    let mut report = PassReport::default();

    let gaps = detect_gaps(cluster, config).await?;
    if gaps.is_empty() {
        debug!("every eligible namespace has a pull secret");
        return Ok(report);
    }

    info!(count = gaps.len(), "namespaces missing pull secret");
    let token = issuer.fetch_token(api).await?;
    report.token_fetched = true;

    for ns in gaps {
        match materialize(cluster, config, parent, &ns, &token).await {
            Ok(outcome) => {
                if let Some(w) = outcome.owner_warning {
                    report.owner_warnings.push((ns.clone(), w));
                }
                match outcome.state {
                    Materialized::Created => report.created.push(ns),
                    Materialized::AlreadyPresent => report.already_present.push(ns),
                }
            }
            Err(e) => match config.policy_for(&ns) {
                NamespacePolicy::Critical => {
                    error!(
                        namespace = %ns,
                        error = %e,
                        "failed to create pull secret in critical namespace"
                    );
                    return Err(e);
                }
                NamespacePolicy::BestEffort => {
                    warn!(namespace = %ns, error = %e, "failed to create pull secret, continuing");
                    report.failed.push(NamespaceFailure {
                        namespace: ns,
                        error: e.to_string(),
                    });
                }
            },
        }
    }

    info!(
        created = report.created.len(),
        already_present = report.already_present.len(),
        failed = report.failed.len(),
        "pull secret pass complete"
    );
    Ok(report)
}
