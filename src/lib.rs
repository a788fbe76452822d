//! Falcon pull secrets - keeps the CrowdStrike registry pull secret present
//! in every eligible namespace
//!
//! A cluster-scoped `FalconContainer` resource carries Falcon API
//! credentials. For each one, the controller finds the namespaces that lack
//! the pull secret, fetches a single fresh registry token, and creates the
//! secret in each of them, owned by the `FalconContainer`.
//!
//! # Modules
//!
//! - [`crd`] - The FalconContainer Custom Resource Definition
//! - [`config`] - Fixed pull secret shape, namespace policy and Falcon regions
//! - [`cluster`] - Cluster object store abstraction over the Kubernetes API
//! - [`token`] - Falcon registry pull token issuer
//! - [`owner`] - Owner reference assignment
//! - [`reconcile`] - Gap detection, materialization and the pass that ties them
//! - [`controller`] - Controller runtime wiring and status reporting
//! - [`error`] - Error types for the controller

#![deny(missing_docs)]

pub mod cluster;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod owner;
pub mod reconcile;
pub mod token;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager name used for server-side apply and creates
pub const FIELD_MANAGER: &str = "falcon-pull-secret-controller";
