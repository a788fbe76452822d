//! Pull-secret configuration
//!
//! Every fixed name used when discovering and creating pull secrets lives in
//! [`PullSecretConfig`], which is passed explicitly into the gap detector and
//! the materializer. Falcon API credentials live in [`FalconApiConfig`].

use std::fmt;
use std::str::FromStr;

use zeroize::Zeroizing;

use crate::Error;

/// Name of every pull secret created by this controller
pub const PULL_SECRET_NAME: &str = "crowdstrike-falcon-pull-secret";

/// Label key used to discover existing pull secrets
pub const PULL_SECRET_LABEL_KEY: &str = "crowdstrike.com/provider";

/// Label value used to discover existing pull secrets
pub const PULL_SECRET_LABEL_VALUE: &str = "crowdstrike";

/// Data key holding the registry credentials
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

/// Secret type for registry credentials
pub const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";

/// Namespace annotation that opts a namespace out of sensor injection
pub const INJECTION_ANNOTATION: &str = "sensor.falcon-system.crowdstrike.com/injection";

/// Annotation value that disables injection
pub const INJECTION_DISABLED: &str = "disabled";

/// Namespace whose pull secret the controller itself depends on
pub const CRITICAL_NAMESPACE: &str = "falcon-system-configure";

/// Namespaces that never receive a pull secret
pub const RESERVED_NAMESPACES: [&str; 2] = ["default", "kube-system"];

/// How a failed create in a namespace affects the whole pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamespacePolicy {
    /// Failure aborts the pass and is returned to the caller
    Critical,
    /// Failure is logged and the pass continues
    BestEffort,
}

/// Immutable description of the pull secret and the namespaces it targets
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullSecretConfig {
    /// Secret name in every namespace
    pub secret_name: String,
    /// Identifying label key
    pub label_key: String,
    /// Identifying label value
    pub label_value: String,
    /// Data key for the token payload
    pub payload_key: String,
    /// Secret `type` field
    pub secret_type: String,
    /// Namespaces excluded regardless of annotations
    pub reserved_namespaces: Vec<String>,
    /// Opt-out annotation key
    pub opt_out_annotation: String,
    /// Opt-out annotation value
    pub opt_out_value: String,
    /// The single must-succeed namespace
    pub critical_namespace: String,
}

impl Default for PullSecretConfig {
    fn default() -> Self {
        Self {
            secret_name: PULL_SECRET_NAME.to_string(),
            label_key: PULL_SECRET_LABEL_KEY.to_string(),
            label_value: PULL_SECRET_LABEL_VALUE.to_string(),
            payload_key: DOCKER_CONFIG_JSON_KEY.to_string(),
            secret_type: DOCKER_CONFIG_JSON_TYPE.to_string(),
            reserved_namespaces: RESERVED_NAMESPACES.iter().map(|s| s.to_string()).collect(),
            opt_out_annotation: INJECTION_ANNOTATION.to_string(),
            opt_out_value: INJECTION_DISABLED.to_string(),
            critical_namespace: CRITICAL_NAMESPACE.to_string(),
        }
    }
}

impl PullSecretConfig {
    /// Override the critical namespace
    pub fn with_critical_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.critical_namespace = namespace.into();
        self
    }

    /// Exact-match label selector for existing pull secrets
    pub fn label_selector(&self) -> String {
        format!("{}={}", self.label_key, self.label_value)
    }

    /// Returns true if the namespace is one of the reserved names
    pub fn is_reserved(&self, namespace: &str) -> bool {
        self.reserved_namespaces.iter().any(|r| r == namespace)
    }

    /// Failure policy for a namespace
    pub fn policy_for(&self, namespace: &str) -> NamespacePolicy {
        if namespace == self.critical_namespace {
            NamespacePolicy::Critical
        } else {
            NamespacePolicy::BestEffort
        }
    }
}

/// Falcon cloud region
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CloudRegion {
    /// US-1 (default)
    #[default]
    Us1,
    /// US-2
    Us2,
    /// EU-1
    Eu1,
    /// US-GOV-1
    UsGov1,
}

impl CloudRegion {
    /// Base URL of the Falcon API for this region
    pub fn api_base(&self) -> &'static str {
        match self {
            CloudRegion::Us1 => "https://api.crowdstrike.com",
            CloudRegion::Us2 => "https://api.us-2.crowdstrike.com",
            CloudRegion::Eu1 => "https://api.eu-1.crowdstrike.com",
            CloudRegion::UsGov1 => "https://api.laggar.gcw.crowdstrike.com",
        }
    }

    /// Container registry host for this region
    pub fn registry_host(&self) -> &'static str {
        match self {
            CloudRegion::UsGov1 => "registry.laggar.gcw.crowdstrike.com",
            _ => "registry.crowdstrike.com",
        }
    }
}

impl FromStr for CloudRegion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "us-1" => Ok(CloudRegion::Us1),
            "us-2" => Ok(CloudRegion::Us2),
            "eu-1" => Ok(CloudRegion::Eu1),
            "us-gov-1" => Ok(CloudRegion::UsGov1),
            other => Err(Error::validation(format!(
                "unknown cloud region '{other}' (expected us-1, us-2, eu-1 or us-gov-1)"
            ))),
        }
    }
}

impl fmt::Display for CloudRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloudRegion::Us1 => "us-1",
            CloudRegion::Us2 => "us-2",
            CloudRegion::Eu1 => "eu-1",
            CloudRegion::UsGov1 => "us-gov-1",
        };
        f.write_str(s)
    }
}

/// Credentials used by the token issuer
#[derive(Clone)]
pub struct FalconApiConfig {
    /// OAuth2 client ID
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: Zeroizing<String>,
    /// Falcon cloud region
    pub region: CloudRegion,
    /// Customer ID; looked up from the API when absent
    pub cid: Option<String>,
}

// Keep the client secret out of logs.
impl fmt::Debug for FalconApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FalconApiConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("region", &self.region)
            .field("cid", &self.cid)
            .finish()
    }
}
