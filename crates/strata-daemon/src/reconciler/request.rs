//! Wire format of the reconciler's `/v1/deployments` resource API

use super::sanitize_tag;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_types::{Deployment, DeploymentTarget, Resources};

/// Configuration schema version sent with every resource
pub const RESOURCE_API_VERSION: &str = "v1alpha1";

/// Kind of remote resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    /// The running serving instance
    CompoundAINimDeployment,
    /// The artifact-provisioning request
    CompoundAINimRequest,
}

/// Body of `POST /v1/deployments`
#[derive(Debug, Clone, Serialize)]
pub struct CreateResourceRequest {
    pub name: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub configuration: ResourceConfiguration,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceConfiguration {
    pub version: &'static str,
    pub data: ResourceData,
}

/// Kind-specific payload, written without a tag
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResourceData {
    ServingInstance(ServingInstanceData),
    Artifact(ArtifactRequestData),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServingInstanceData {
    #[serde(rename = "compoundAINim")]
    pub artifact: String,
    pub resources: Resources,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoscaling: Option<Autoscaling>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress: Option<Ingress>,
}

/// Replica bounds of the serving instance
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Autoscaling {
    pub min_replicas: i32,
    pub max_replicas: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ingress {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactRequestData {
    #[serde(rename = "bentoTag")]
    pub artifact_tag: String,
}

/// Reconciler status of a resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResourceStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// Body of a successful create
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceResponse {
    pub id: String,
    #[serde(default)]
    pub status: ResourceStatus,
    #[serde(default)]
    pub configuration: Value,
}

/// The serving-instance resource for `target`, named after the deployment
pub fn serving_instance_request(
    deployment: &Deployment,
    target: &DeploymentTarget,
) -> CreateResourceRequest {
    let config = &target.config;
    let autoscaling = config.hpa_conf.as_ref().and_then(|hpa| {
        Some(Autoscaling {
            min_replicas: hpa.min_replicas?,
            max_replicas: hpa.max_replicas?,
        })
    });

    let data = ServingInstanceData {
        artifact: sanitize_tag(&target.artifact_tag),
        resources: config.resources.clone(),
        autoscaling,
        ingress: config.enable_ingress.map(|enabled| Ingress { enabled }),
    };

    CreateResourceRequest {
        name: deployment.name.clone(),
        namespace: deployment.kube_namespace.clone(),
        kind: ResourceKind::CompoundAINimDeployment,
        configuration: ResourceConfiguration {
            version: RESOURCE_API_VERSION,
            data: ResourceData::ServingInstance(data),
        },
    }
}

/// The artifact-provisioning resource for `target`, named after its sanitized tag
pub fn artifact_request(
    deployment: &Deployment,
    target: &DeploymentTarget,
) -> CreateResourceRequest {
    let data = ArtifactRequestData {
        artifact_tag: target.artifact_tag.clone(),
    };

    CreateResourceRequest {
        name: sanitize_tag(&target.artifact_tag),
        namespace: deployment.kube_namespace.clone(),
        kind: ResourceKind::CompoundAINimRequest,
        configuration: ResourceConfiguration {
            version: RESOURCE_API_VERSION,
            data: ResourceData::Artifact(data),
        },
    }
}
