//! Deployment types
//!
//! A Deployment is a named serving endpoint inside one namespace of one
//! cluster. What it actually serves is described by its active revision.

use crate::{ClusterId, DeploymentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A deployment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,

    /// Owning cluster
    pub cluster_id: ClusterId,

    /// Namespace the serving resources live in
    pub kube_namespace: String,

    /// Name, unique within `(cluster_id, kube_namespace)`
    pub name: String,

    pub description: String,

    /// Current lifecycle status
    pub status: DeploymentStatus,

    /// When a status sync was last started
    pub status_syncing_at: Option<DateTime<Utc>>,

    /// When the status was last written by a sync
    pub status_updated_at: Option<DateTime<Utc>>,

    /// Opaque per-deployment token handed to the serving resources
    pub kube_deploy_token: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    /// Hard deletion is only allowed once termination has started
    pub fn is_deletable(&self) -> bool {
        matches!(
            self.status,
            DeploymentStatus::Terminating | DeploymentStatus::Terminated
        )
    }
}

/// Deployment lifecycle status
///
/// `non-deployed -> deploying -> running | unhealthy | failed`, and
/// `terminating -> terminated` from any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStatus {
    NonDeployed,
    Deploying,
    Running,
    Unhealthy,
    Failed,
    Terminating,
    Terminated,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::NonDeployed => "non-deployed",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Unhealthy => "unhealthy",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Terminating => "terminating",
            DeploymentStatus::Terminated => "terminated",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status string that does not name a known status
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for DeploymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "non-deployed" => Ok(DeploymentStatus::NonDeployed),
            "deploying" => Ok(DeploymentStatus::Deploying),
            "running" => Ok(DeploymentStatus::Running),
            "unhealthy" => Ok(DeploymentStatus::Unhealthy),
            "failed" => Ok(DeploymentStatus::Failed),
            "terminating" => Ok(DeploymentStatus::Terminating),
            "terminated" => Ok(DeploymentStatus::Terminated),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Fields of a deployment that have not been persisted yet
#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub cluster_id: ClusterId,
    pub kube_namespace: String,
    pub name: String,
    pub description: String,
    pub kube_deploy_token: String,
}

/// Partial update of the status columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub status: Option<DeploymentStatus>,
    pub syncing_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    pub fn status(status: DeploymentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.syncing_at.is_none() && self.updated_at.is_none()
    }

    /// Mirror the update onto an in-memory copy
    pub fn apply(&self, deployment: &mut Deployment) {
        if let Some(status) = self.status {
            deployment.status = status;
        }
        if let Some(syncing_at) = self.syncing_at {
            deployment.status_syncing_at = Some(syncing_at);
        }
        if let Some(updated_at) = self.updated_at {
            deployment.status_updated_at = Some(updated_at);
        }
    }
}
