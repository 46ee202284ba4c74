//! Strata Types - Core types for the model-serving control plane
//!
//! Strata lets operators register clusters and roll out versioned serving
//! targets onto them. Kubernetes objects are created by an external
//! reconciler; this crate only describes the records the control plane keeps.
//!
//! ## Key Concepts
//!
//! - **Cluster**: a named Kubernetes installation with opaque credentials
//! - **Deployment**: a named serving endpoint in one namespace of one cluster
//! - **DeploymentRevision**: one rollout generation; at most one is active
//! - **DeploymentTarget**: one artifact-backed serving instance of a revision

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod cluster;
pub mod deployment;
pub mod ids;
pub mod revision;
pub mod target;
pub mod validation;

// Re-export main types
pub use cluster::{Cluster, ClusterPatch, NewCluster};
pub use deployment::{Deployment, DeploymentStatus, NewDeployment, StatusUpdate, UnknownStatus};
pub use ids::{ClusterId, DeploymentId, RevisionId, TargetId};
pub use revision::{DeploymentRevision, RevisionStatus};
pub use target::{
    DeploymentStrategy, DeploymentTarget, HpaConf, NewTarget, RemoteHandles, ResourceItem,
    Resources, TargetConfig, TargetSpec,
};
pub use validation::{validate_dns1035_label, ValidationError, DNS_LABEL_MAX_LEN};
