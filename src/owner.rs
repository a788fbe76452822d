//! Owner reference assignment
//!
//! Pull secrets are owned by their FalconContainer so the garbage collector
//! removes them when the parent is deleted. Attaching the reference can fail;
//! that failure is reported as an [`OwnerRefWarning`], never as an [`Error`],
//! so the secret is still created without the cascade-delete relationship.
//!
//! [`Error`]: crate::Error

use kube::Resource;
use thiserror::Error;

/// Why an owner reference could not be attached
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OwnerRefWarning {
    /// The parent has not been persisted yet (no name or uid)
    #[error("parent {kind} has no name or uid")]
    MissingIdentity {
        /// Kind of the parent resource
        kind: String,
    },

    /// The child is already controlled by a different owner
    #[error("object is already controlled by {kind}/{name}")]
    AlreadyOwned {
        /// Kind of the existing controller
        kind: String,
        /// Name of the existing controller
        name: String,
    },
}

/// Make `parent` the controller owner of `child`
///
/// The reference is marked `controller` and `blockOwnerDeletion`. A reference
/// to the same parent (by uid) is replaced; any other non-controller owner
/// references are kept.
pub fn attach_owner<P, C>(parent: &P, child: &mut C) -> Result<(), OwnerRefWarning>
where
    P: Resource<DynamicType = ()>,
    C: Resource,
{
    let mut owner = parent
        .controller_owner_ref(&())
        .ok_or_else(|| OwnerRefWarning::MissingIdentity {
            kind: P::kind(&()).to_string(),
        })?;

    let refs = child.meta_mut().owner_references.get_or_insert_with(Vec::new);

    if let Some(existing) = refs
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner.uid)
    {
        return Err(OwnerRefWarning::AlreadyOwned {
            kind: existing.kind.clone(),
            name: existing.name.clone(),
        });
    }

    owner.block_owner_deletion = Some(true);
    refs.retain(|r| r.uid != owner.uid);
    refs.push(owner);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{FalconApiSpec, FalconContainer, FalconContainerSpec};
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

    fn parent(uid: Option<&str>) -> FalconContainer {
        let mut fc = FalconContainer::new(
            "falcon",
            FalconContainerSpec {
                falcon_api: FalconApiSpec::default(),
            },
        );
        fc.metadata.uid = uid.map(str::to_string);
        fc
    }

    #[test]
    fn attaches_controller_reference() {
        let mut secret = Secret::default();
        attach_owner(&parent(Some("uid-1")), &mut secret).unwrap();

        let refs = secret.metadata.owner_references.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, "FalconContainer");
        assert_eq!(refs[0].name, "falcon");
        assert_eq!(refs[0].uid, "uid-1");
        assert_eq!(refs[0].controller, Some(true));
        assert_eq!(refs[0].block_owner_deletion, Some(true));
    }

    #[test]
    fn parent_without_uid_is_a_warning() {
        let mut secret = Secret::default();
        let warning = attach_owner(&parent(None), &mut secret).unwrap_err();
        assert_eq!(
            warning,
            OwnerRefWarning::MissingIdentity {
                kind: "FalconContainer".to_string()
            }
        );
        assert!(secret.metadata.owner_references.is_none());
    }

    #[test]
    fn foreign_controller_is_a_warning() {
        let mut secret = Secret {
            metadata: ObjectMeta {
                owner_references: Some(vec![OwnerReference {
                    api_version: "apps/v1".to_string(),
                    kind: "Deployment".to_string(),
                    name: "other".to_string(),
                    uid: "uid-other".to_string(),
                    controller: Some(true),
                    block_owner_deletion: None,
                }]),
                ..Default::default()
            },
            ..Default::default()
        };

        let warning = attach_owner(&parent(Some("uid-1")), &mut secret).unwrap_err();
        assert!(warning.to_string().contains("Deployment/other"));
        assert_eq!(secret.metadata.owner_references.unwrap().len(), 1);
    }

    #[test]
    fn reattaching_same_parent_does_not_duplicate() {
        let fc = parent(Some("uid-1"));
        let mut secret = Secret::default();
        attach_owner(&fc, &mut secret).unwrap();
        attach_owner(&fc, &mut secret).unwrap();
        assert_eq!(secret.metadata.owner_references.unwrap().len(), 1);
    }
}
