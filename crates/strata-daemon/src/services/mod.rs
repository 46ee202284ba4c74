//! Deployment lifecycle services
//!
//! The stores, ledger and registry operate inside a transaction handed to
//! them. The orchestrator and the cluster directory open or join one.

mod cluster;
mod deployment;
mod orchestrator;
mod revision;
mod target;

pub use cluster::ClusterDirectory;
pub use deployment::DeploymentStore;
pub use orchestrator::{
    CreateDeploymentRequest, DeploymentView, RevisionOrchestrator, RevisionView,
    UpdateDeploymentRequest,
};
pub use revision::RevisionLedger;
pub use target::TargetRegistry;
