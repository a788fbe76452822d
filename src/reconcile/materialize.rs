//! Pull secret materialization
//!
//! Creates the pull secret in a single namespace. Creation is idempotent: an
//! existing object with the same name counts as success and is left as is.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use tracing::{info, warn};

use crate::cluster::{ClusterClient, CreateOutcome};
use crate::config::PullSecretConfig;
use crate::crd::FalconContainer;
use crate::owner::{attach_owner, OwnerRefWarning};
use crate::token::PullToken;
use crate::Error;

/// Terminal state of a namespace that did not fail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Materialized {
    /// The pull secret was created in this pass
    Created,
    /// A pull secret with the same name was already there
    AlreadyPresent,
}

/// Successful materialization, possibly without an owner reference
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterializeOutcome {
    /// What happened to the namespace
    pub state: Materialized,
    /// Set when the owner reference could not be attached
    pub owner_warning: Option<OwnerRefWarning>,
}

/// Build the pull secret for a namespace, without owner references
pub fn build_pull_secret(
    config: &PullSecretConfig,
    namespace: &str,
    token: &PullToken,
) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(config.secret_name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                config.label_key.clone(),
                config.label_value.clone(),
            )])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            config.payload_key.clone(),
            ByteString(token.as_bytes().to_vec()),
        )])),
        type_: Some(config.secret_type.clone()),
        ..Default::default()
    }
}

/// Create the pull secret in `namespace`
///
/// An owner reference to `parent` is attached when possible; failure to do so
/// is logged and returned in the outcome. Any create failure other than
/// already-exists is returned as an error.
pub async fn materialize(
    cluster: &dyn ClusterClient,
    config: &PullSecretConfig,
    parent: &FalconContainer,
    namespace: &str,
    token: &PullToken,
) -> Result<MaterializeOutcome, Error> {
    let mut secret = build_pull_secret(config, namespace, token);

    let owner_warning = match attach_owner(parent, &mut secret) {
        Ok(()) => None,
        Err(w) => {
            warn!(
                namespace = %namespace,
                warning = %w,
                "unable to assign controller reference to the pull secret"
            );
            Some(w)
        }
    };

    let state = match cluster.create_secret(&secret).await? {
        CreateOutcome::Created => {
            info!(
                namespace = %namespace,
                secret = %config.secret_name,
                "created pull secret"
            );
            Materialized::Created
        }
        CreateOutcome::AlreadyExists => Materialized::AlreadyPresent,
    };

    Ok(MaterializeOutcome {
        state,
        owner_warning,
    })
}
