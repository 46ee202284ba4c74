//! Client side of the external reconciler
//!
//! The reconciler turns resource descriptions into cluster workloads. Every
//! target is materialized as two resources: a serving instance and the
//! artifact-provisioning request behind it. The control plane only keeps the
//! opaque ids the reconciler hands back.

mod http;
mod request;

pub use http::HttpReconciler;
pub use request::{
    artifact_request, serving_instance_request, ArtifactRequestData, Autoscaling,
    CreateResourceRequest, Ingress, ResourceConfiguration, ResourceData, ResourceKind,
    ResourceResponse, ResourceStatus, ServingInstanceData,
};

use async_trait::async_trait;
use strata_types::{Deployment, DeploymentTarget, DNS_LABEL_MAX_LEN};
use thiserror::Error;

/// Errors from reconciler calls. No call is ever retried.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Connection failure, timeout, or a request that could not be built
    #[error("Reconciler transport error: {0}")]
    Transport(String),

    /// The reconciler answered with something other than 200
    #[error("Reconciler returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body was not the expected JSON
    #[error("Reconciler response could not be decoded: {0}")]
    Decode(String),
}

/// Result type for reconciler calls
pub type ReconcilerResult<T> = Result<T, ReconcilerError>;

/// Materializes and removes the remote resources behind a target
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Create both remote resources for `target` and record their ids on it.
    ///
    /// On error no id is recorded; a serving instance created before the
    /// failure has already been deleted again (best effort).
    async fn create(
        &self,
        deployment: &Deployment,
        target: &mut DeploymentTarget,
    ) -> ReconcilerResult<()>;

    /// Delete whichever remote resources `target` has ids for
    async fn delete(&self, target: &DeploymentTarget) -> ReconcilerResult<()>;
}

/// Turn an artifact tag into a usable resource name: `:` becomes `--` and
/// the result is cut to 63 characters.
pub fn sanitize_tag(tag: &str) -> String {
    tag.replace(':', "--")
        .chars()
        .take(DNS_LABEL_MAX_LEN)
        .collect()
}
