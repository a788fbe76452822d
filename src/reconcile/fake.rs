//! In-memory cluster for pass-level tests
//!
//! Stores secrets by namespace, honours exact-match label selectors, reports
//! already-exists on duplicate creates, and can be told to fail creates in
//! specific namespaces. Every create attempt is recorded in order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::cluster::{ClusterClient, CreateOutcome};
use crate::config::{PullSecretConfig, INJECTION_ANNOTATION, INJECTION_DISABLED};
use crate::crd::{FalconApiSpec, FalconContainer, FalconContainerSpec, FalconContainerStatus};
use crate::error::api_error;
use crate::Error;

pub(crate) fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub(crate) fn opted_out_namespace(name: &str) -> Namespace {
    let mut ns = namespace(name);
    ns.metadata.annotations = Some(BTreeMap::from([(
        INJECTION_ANNOTATION.to_string(),
        INJECTION_DISABLED.to_string(),
    )]));
    ns
}

pub(crate) fn labelled_secret(ns: &str) -> Secret {
    let config = PullSecretConfig::default();
    Secret {
        metadata: ObjectMeta {
            name: Some(config.secret_name.clone()),
            namespace: Some(ns.to_string()),
            labels: Some(BTreeMap::from([(config.label_key, config.label_value)])),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub(crate) fn sample_parent(uid: Option<&str>) -> FalconContainer {
    let mut fc = FalconContainer::new(
        "falcon",
        FalconContainerSpec {
            falcon_api: FalconApiSpec {
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
                cloud_region: None,
                cid: Some("ABCDEF-12".to_string()),
            },
        },
    );
    fc.metadata.uid = uid.map(str::to_string);
    fc
}

fn matches_selector(secret: &Secret, selector: &str) -> bool {
    let Some((key, value)) = selector.split_once('=') else {
        return true;
    };
    secret
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(key))
        .map(|v| v == value)
        .unwrap_or(false)
}

#[derive(Default)]
pub(crate) struct FakeCluster {
    namespaces: Vec<Namespace>,
    secrets: Mutex<BTreeMap<(String, String), Secret>>,
    failing: BTreeSet<String>,
    attempts: Mutex<Vec<String>>,
    statuses: Mutex<Vec<(String, FalconContainerStatus)>>,
}

impl FakeCluster {
    pub(crate) fn new(names: &[&str]) -> Self {
        Self::with_namespaces(names.iter().map(|n| namespace(n)).collect())
    }

    pub(crate) fn with_namespaces(namespaces: Vec<Namespace>) -> Self {
        Self {
            namespaces,
            ..Default::default()
        }
    }

    /// Make every create in `ns` fail with a server error
    pub(crate) fn failing_in(mut self, ns: &str) -> Self {
        self.failing.insert(ns.to_string());
        self
    }

    /// Seed an existing secret
    pub(crate) fn with_secret(self, secret: Secret) -> Self {
        let key = (
            secret.metadata.namespace.clone().unwrap_or_default(),
            secret.metadata.name.clone().unwrap_or_default(),
        );
        self.secrets.lock().unwrap().insert(key, secret);
        self
    }

    pub(crate) fn secret(&self, ns: &str) -> Option<Secret> {
        let name = PullSecretConfig::default().secret_name;
        self.secrets
            .lock()
            .unwrap()
            .get(&(ns.to_string(), name))
            .cloned()
    }

    pub(crate) fn payload(&self, ns: &str) -> Option<Vec<u8>> {
        let key = PullSecretConfig::default().payload_key;
        self.secret(ns)
            .and_then(|s| s.data)
            .and_then(|d| d.get(&key).map(|b| b.0.clone()))
    }

    pub(crate) fn secret_count(&self) -> usize {
        self.secrets.lock().unwrap().len()
    }

    pub(crate) fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub(crate) fn last_status(&self) -> Option<(String, FalconContainerStatus)> {
        self.statuses.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>, Error> {
        Ok(self.namespaces.clone())
    }

    async fn list_secrets(&self, label_selector: &str) -> Result<Vec<Secret>, Error> {
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .values()
            .filter(|s| matches_selector(s, label_selector))
            .cloned()
            .collect())
    }

    async fn create_secret(&self, secret: &Secret) -> Result<CreateOutcome, Error> {
        let ns = secret.metadata.namespace.clone().unwrap_or_default();
        let name = secret.metadata.name.clone().unwrap_or_default();
        self.attempts.lock().unwrap().push(ns.clone());

        if self.failing.contains(&ns) {
            return Err(Error::Kube(api_error(500, "InternalError")));
        }

        let mut secrets = self.secrets.lock().unwrap();
        if secrets.contains_key(&(ns.clone(), name.clone())) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        secrets.insert((ns, name), secret.clone());
        Ok(CreateOutcome::Created)
    }

    async fn patch_status(
        &self,
        name: &str,
        status: &FalconContainerStatus,
    ) -> Result<(), Error> {
        self.statuses
            .lock()
            .unwrap()
            .push((name.to_string(), status.clone()));
        Ok(())
    }
}
