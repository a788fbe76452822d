//! Namespace gap detection
//!
//! The gap set is every eligible namespace that does not yet hold a labelled
//! pull secret.

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::Namespace;
use tracing::debug;

use crate::cluster::ClusterClient;
use crate::config::PullSecretConfig;
use crate::Error;

/// Returns true if the namespace should hold a pull secret
///
/// Reserved namespaces and namespaces annotated with the opt-out marker are
/// excluded.
pub fn is_eligible(namespace: &Namespace, config: &PullSecretConfig) -> bool {
    let Some(name) = namespace.metadata.name.as_deref() else {
        return false;
    };

    if config.is_reserved(name) {
        return false;
    }

    let opted_out = namespace
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(&config.opt_out_annotation))
        .map(|v| v == &config.opt_out_value)
        .unwrap_or(false);

    !opted_out
}

/// Names of all eligible namespaces
pub fn eligible_namespaces(
    namespaces: &[Namespace],
    config: &PullSecretConfig,
) -> BTreeSet<String> {
    namespaces
        .iter()
        .filter(|ns| is_eligible(ns, config))
        .filter_map(|ns| ns.metadata.name.clone())
        .collect()
}

/// Compute the namespaces that lack a pull secret
///
/// Any list failure aborts with the error unchanged. An empty set means
/// there is nothing to do.
pub async fn detect_gaps(
    cluster: &dyn ClusterClient,
    config: &PullSecretConfig,
) -> Result<BTreeSet<String>, Error> {
    let namespaces = cluster.list_namespaces().await?;
    let mut gaps = eligible_namespaces(&namespaces, config);

    let existing = cluster.list_secrets(&config.label_selector()).await?;
    for secret in &existing {
        if let Some(ns) = secret.metadata.namespace.as_deref() {
            gaps.remove(ns);
        }
    }

    debug!(
        namespaces = namespaces.len(),
        existing = existing.len(),
        gaps = gaps.len(),
        "computed pull secret gaps"
    );
    Ok(gaps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockClusterClient;
    use crate::error::api_error;
    use crate::reconcile::fake::{labelled_secret, namespace, opted_out_namespace};

    fn names(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[test]
    fn reserved_and_opted_out_namespaces_are_not_eligible() {
        let config = PullSecretConfig::default();
        assert!(!is_eligible(&namespace("default"), &config));
        assert!(!is_eligible(&namespace("kube-system"), &config));
        assert!(!is_eligible(&opted_out_namespace("team-b"), &config));
        assert!(is_eligible(&namespace("team-a"), &config));
    }

    #[test]
    fn opt_out_requires_the_disabled_value() {
        let config = PullSecretConfig::default();
        let mut ns = opted_out_namespace("team-c");
        ns.metadata
            .annotations
            .as_mut()
            .unwrap()
            .insert(config.opt_out_annotation.clone(), "enabled".to_string());
        assert!(is_eligible(&ns, &config));
    }

    #[test]
    fn unnamed_namespace_is_ignored() {
        let config = PullSecretConfig::default();
        assert!(!is_eligible(&Namespace::default(), &config));
    }

    #[tokio::test]
    async fn gaps_are_eligible_minus_existing() {
        let mut cluster = MockClusterClient::new();
        cluster.expect_list_namespaces().returning(|| {
            Ok(vec![
                namespace("default"),
                namespace("kube-system"),
                namespace("team-a"),
                namespace("team-b"),
                opted_out_namespace("team-c"),
                namespace("falcon-system-configure"),
            ])
        });
        cluster.expect_list_secrets().times(1).returning(|selector| {
            assert_eq!(selector, "crowdstrike.com/provider=crowdstrike");
            Ok(vec![labelled_secret("team-b")])
        });

        let gaps = detect_gaps(&cluster, &PullSecretConfig::default())
            .await
            .unwrap();

        assert_eq!(names(&gaps), vec!["falcon-system-configure", "team-a"]);
    }

    #[tokio::test]
    async fn all_covered_yields_empty_set_not_error() {
        let mut cluster = MockClusterClient::new();
        cluster
            .expect_list_namespaces()
            .returning(|| Ok(vec![namespace("team-a"), namespace("default")]));
        cluster
            .expect_list_secrets()
            .returning(|_| Ok(vec![labelled_secret("team-a")]));

        let gaps = detect_gaps(&cluster, &PullSecretConfig::default())
            .await
            .unwrap();

        assert!(gaps.is_empty());
    }

    #[tokio::test]
    async fn secrets_in_ineligible_namespaces_are_ignored() {
        let mut cluster = MockClusterClient::new();
        cluster
            .expect_list_namespaces()
            .returning(|| Ok(vec![namespace("team-a")]));
        cluster
            .expect_list_secrets()
            .returning(|_| Ok(vec![labelled_secret("kube-system")]));

        let gaps = detect_gaps(&cluster, &PullSecretConfig::default())
            .await
            .unwrap();

        assert_eq!(names(&gaps), vec!["team-a"]);
    }

    #[tokio::test]
    async fn namespace_list_failure_aborts_before_secret_list() {
        let mut cluster = MockClusterClient::new();
        cluster
            .expect_list_namespaces()
            .returning(|| Err(Error::Kube(api_error(403, "Forbidden"))));
        cluster.expect_list_secrets().never();

        let err = detect_gaps(&cluster, &PullSecretConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Kube(_)));
    }

    #[tokio::test]
    async fn secret_list_failure_is_returned_unchanged() {
        let mut cluster = MockClusterClient::new();
        cluster
            .expect_list_namespaces()
            .returning(|| Ok(vec![namespace("team-a")]));
        cluster
            .expect_list_secrets()
            .returning(|_| Err(Error::Kube(api_error(500, "InternalError"))));

        let err = detect_gaps(&cluster, &PullSecretConfig::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("InternalError"));
    }
}
