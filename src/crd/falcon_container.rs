//! FalconContainer Custom Resource Definition
//!
//! A FalconContainer is the parent of every pull secret the controller
//! creates. Its spec carries the Falcon API credentials used to fetch the
//! registry pull token, and its status reports the outcome of the last pass.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::config::{CloudRegion, FalconApiConfig};

/// Specification for a FalconContainer
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "falcon.crowdstrike.com",
    version = "v1alpha1",
    kind = "FalconContainer",
    plural = "falconcontainers",
    shortname = "fc",
    status = "FalconContainerStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Region","type":"string","jsonPath":".spec.falconApi.cloudRegion"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FalconContainerSpec {
    /// Falcon API credentials used to fetch the registry pull token
    pub falcon_api: FalconApiSpec,
}

/// Falcon API credentials
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FalconApiSpec {
    /// OAuth2 client ID
    pub client_id: String,

    /// OAuth2 client secret
    pub client_secret: String,

    /// Falcon cloud region (us-1, us-2, eu-1, us-gov-1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_region: Option<String>,

    /// Customer ID with checksum; looked up from the API when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
}

impl FalconApiSpec {
    /// Validate the spec and convert it into token issuer configuration
    pub fn to_api_config(&self) -> Result<FalconApiConfig, crate::Error> {
        if self.client_id.trim().is_empty() {
            return Err(crate::Error::validation(
                "spec.falconApi.clientId must not be empty",
            ));
        }
        if self.client_secret.trim().is_empty() {
            return Err(crate::Error::validation(
                "spec.falconApi.clientSecret must not be empty",
            ));
        }

        let region = match self.cloud_region.as_deref() {
            Some(r) if !r.trim().is_empty() => r.trim().parse()?,
            _ => CloudRegion::default(),
        };

        let cid = self
            .cid
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Ok(FalconApiConfig {
            client_id: self.client_id.trim().to_string(),
            client_secret: Zeroizing::new(self.client_secret.clone()),
            region,
            cid,
        })
    }
}

/// Outcome of the most recent reconciliation pass
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum PullSecretPhase {
    /// No pass has completed yet
    #[default]
    Pending,
    /// Every eligible namespace holds a pull secret
    Ready,
    /// The pass succeeded but some best-effort namespaces failed
    Degraded,
    /// The pass failed
    Failed,
}

impl std::fmt::Display for PullSecretPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Ready => write!(f, "Ready"),
            Self::Degraded => write!(f, "Degraded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Status for a FalconContainer
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FalconContainerStatus {
    /// Outcome of the last pass
    #[serde(default)]
    pub phase: PullSecretPhase,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Namespaces whose pull secret could not be created in the last pass
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_namespaces: Vec<String>,

    /// When the last pass finished (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<String>,
}

impl FalconContainerStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: PullSecretPhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Set the failed namespaces and return self for chaining
    pub fn failed_namespaces(mut self, namespaces: Vec<String>) -> Self {
        self.failed_namespaces = namespaces;
        self
    }

    /// Stamp the sync time and return self for chaining
    pub fn synced_now(mut self) -> Self {
        self.last_synced = Some(chrono::Utc::now().to_rfc3339());
        self
    }

    /// True if both statuses match, ignoring the sync timestamp
    pub fn same_outcome(&self, other: &FalconContainerStatus) -> bool {
        self.phase == other.phase
            && self.message == other.message
            && self.failed_namespaces == other.failed_namespaces
    }
}
