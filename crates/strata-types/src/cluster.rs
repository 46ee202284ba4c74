//! Cluster records
//!
//! A cluster is a named Kubernetes installation that deployments are rolled
//! out to. The credential blob is opaque to the control plane.

use crate::ClusterId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,

    /// Unique, DNS-label formatted name
    pub name: String,

    pub description: String,

    /// Opaque kubeconfig used to reach the cluster
    pub kube_config: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields of a cluster that have not been persisted yet
#[derive(Debug, Clone)]
pub struct NewCluster {
    pub name: String,
    pub description: String,
    pub kube_config: String,
}

/// Partial update of a cluster; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct ClusterPatch {
    pub description: Option<String>,
    pub kube_config: Option<String>,
}

impl ClusterPatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.kube_config.is_none()
    }

    /// Mirror the patch onto an in-memory copy
    pub fn apply(&self, cluster: &mut Cluster) {
        if let Some(description) = &self.description {
            cluster.description = description.clone();
        }
        if let Some(kube_config) = &self.kube_config {
            cluster.kube_config = kube_config.clone();
        }
    }
}
