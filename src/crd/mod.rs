//! Custom Resource Definitions for the pull-secret controller

mod falcon_container;

pub use falcon_container::{
    FalconApiSpec, FalconContainer, FalconContainerSpec, FalconContainerStatus, PullSecretPhase,
};
