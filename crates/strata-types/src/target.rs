//! Deployment targets
//!
//! A target is one artifact-backed serving instance inside a revision. Once
//! the external reconciler has materialized it, the target carries the two
//! opaque ids the reconciler handed back.

use crate::{DeploymentId, RevisionId, TargetId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default CPU request for targets created without a config
pub const DEFAULT_CPU_REQUEST: &str = "500m";
/// Default CPU limit for targets created without a config
pub const DEFAULT_CPU_LIMIT: &str = "1000m";
/// Default memory request for targets created without a config
pub const DEFAULT_MEMORY_REQUEST: &str = "1G";
/// Default memory limit for targets created without a config
pub const DEFAULT_MEMORY_LIMIT: &str = "2G";
/// Default autoscaling CPU utilisation threshold (percent)
pub const DEFAULT_HPA_CPU: i32 = 80;
/// Default autoscaling GPU utilisation threshold (percent)
pub const DEFAULT_HPA_GPU: i32 = 80;
pub const DEFAULT_MIN_REPLICAS: i32 = 2;
pub const DEFAULT_MAX_REPLICAS: i32 = 10;

/// A serving target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    pub id: TargetId,
    pub deployment_id: DeploymentId,
    pub revision_id: RevisionId,

    /// Artifact reference, `repository:version`
    pub artifact_tag: String,

    pub config: TargetConfig,

    /// Reconciler id of the serving-instance resource, empty until deployed
    pub kube_deployment_id: String,

    /// Reconciler id of the artifact-provisioning resource, empty until deployed
    pub kube_request_id: String,

    pub created_at: DateTime<Utc>,
}

impl DeploymentTarget {
    /// Whether the reconciler has handed back any remote id for this target
    pub fn has_remote_handles(&self) -> bool {
        !self.kube_deployment_id.is_empty() || !self.kube_request_id.is_empty()
    }
}

/// Fields of a target that have not been persisted yet
#[derive(Debug, Clone)]
pub struct NewTarget {
    pub deployment_id: DeploymentId,
    pub revision_id: RevisionId,
    pub artifact_tag: String,
    pub config: TargetConfig,
}

/// Remote ids assigned by the reconciler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHandles {
    pub kube_deployment_id: String,
    pub kube_request_id: String,
}

impl From<&DeploymentTarget> for RemoteHandles {
    fn from(target: &DeploymentTarget) -> Self {
        Self {
            kube_deployment_id: target.kube_deployment_id.clone(),
            kube_request_id: target.kube_request_id.clone(),
        }
    }
}

/// Serving configuration of a target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Correlation uid reported back by the cluster
    #[serde(rename = "kubeResourceUid", default)]
    pub kube_resource_uid: String,

    /// Correlation resource version reported back by the cluster
    #[serde(rename = "kubeResourceVersion", default)]
    pub kube_resource_version: String,

    #[serde(default)]
    pub resources: Resources,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hpa_conf: Option<HpaConf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_ingress: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_stealing_traffic_debug_mode: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_debug_mode: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_debug_pod_receive_production_traffic: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_strategy: Option<DeploymentStrategy>,
}

impl TargetConfig {
    /// Configuration applied to targets created without one
    pub fn serving_defaults() -> Self {
        Self {
            resources: Resources {
                requests: Some(ResourceItem::cpu_memory(
                    DEFAULT_CPU_REQUEST,
                    DEFAULT_MEMORY_REQUEST,
                )),
                limits: Some(ResourceItem::cpu_memory(DEFAULT_CPU_LIMIT, DEFAULT_MEMORY_LIMIT)),
            },
            hpa_conf: Some(HpaConf {
                cpu: Some(DEFAULT_HPA_CPU),
                gpu: Some(DEFAULT_HPA_GPU),
                min_replicas: Some(DEFAULT_MIN_REPLICAS),
                max_replicas: Some(DEFAULT_MAX_REPLICAS),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Copy only the cluster-reported correlation fields from `other`
    pub fn with_correlation_from(mut self, other: &TargetConfig) -> Self {
        self.kube_resource_uid = other.kube_resource_uid.clone();
        self.kube_resource_version = other.kube_resource_version.clone();
        self
    }
}

/// Resource requests and limits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceItem>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceItem>,
}

/// Quantities for one side of a resource spec
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceItem {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memory: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gpu: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, String>,
}

impl ResourceItem {
    pub fn cpu_memory(cpu: impl Into<String>, memory: impl Into<String>) -> Self {
        Self {
            cpu: cpu.into(),
            memory: memory.into(),
            ..Default::default()
        }
    }
}

/// Horizontal autoscaling bounds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HpaConf {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qps: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,
}

/// Rollout strategy requested for a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStrategy {
    RollingUpdate,
    Recreate,
    RampedSlowRollout,
    BestEffortControlledRollout,
}

/// A requested target, as carried by create and update requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    #[serde(alias = "bento_repository")]
    pub repository: String,

    #[serde(alias = "bento")]
    pub version: String,

    #[serde(default)]
    pub config: Option<TargetConfig>,
}

impl TargetSpec {
    pub fn new(repository: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            version: version.into(),
            config: None,
        }
    }

    pub fn with_config(mut self, config: TargetConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// `repository:version`
    pub fn artifact_tag(&self) -> String {
        format!("{}:{}", self.repository, self.version)
    }
}
