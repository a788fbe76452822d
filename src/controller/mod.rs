//! Controller for the FalconContainer CRD
//!
//! Follows the Kubernetes controller pattern: every reconcile observes the
//! namespaces and existing pull secrets, creates what is missing, and
//! records the outcome on the parent's status.

mod falcon_container;

pub use falcon_container::{
    error_policy, owning_falcon_containers, reconcile, run_pass, status_for_report, Context,
    ContextBuilder, REQUEUE_ERROR_SECS, REQUEUE_NON_RETRYABLE_SECS, REQUEUE_SUCCESS_SECS,
};
