//! Storage trait definitions
//!
//! Every row operation lives on [`Transaction`]; there is no way to read or
//! write a row outside of one. Services receive `&mut dyn Transaction` and
//! never see a bare connection.

use crate::error::StorageError;
use async_trait::async_trait;
use strata_types::{
    Cluster, ClusterId, ClusterPatch, Deployment, DeploymentId, DeploymentRevision,
    DeploymentTarget, NewCluster, NewDeployment, NewTarget, RemoteHandles, RevisionId,
    RevisionStatus, StatusUpdate, TargetConfig, TargetId,
};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A store that hands out transactions
#[async_trait]
pub trait Database: Send + Sync {
    /// Start a new transaction
    async fn begin(&self) -> StorageResult<Box<dyn Transaction>>;

    /// Check that the store is reachable
    async fn ping(&self) -> StorageResult<()>;
}

/// An open transaction.
///
/// Dropping a transaction without calling [`Transaction::commit`] discards
/// every write made through it.
#[async_trait]
pub trait Transaction:
    ClusterStorage + DeploymentStorage + RevisionStorage + TargetStorage + Send
{
    /// Make all writes visible
    async fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Discard all writes
    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}

/// Cluster rows
#[async_trait]
pub trait ClusterStorage: Send {
    /// Insert a cluster; a duplicate name is a `Conflict`
    async fn insert_cluster(&mut self, cluster: NewCluster) -> StorageResult<Cluster>;

    async fn get_cluster(&mut self, id: ClusterId) -> StorageResult<Option<Cluster>>;

    async fn get_cluster_by_name(&mut self, name: &str) -> StorageResult<Option<Cluster>>;

    /// Apply a partial update and return the new row
    async fn update_cluster(
        &mut self,
        id: ClusterId,
        patch: &ClusterPatch,
    ) -> StorageResult<Cluster>;

    /// Page through clusters, newest first
    async fn list_clusters(&mut self, start: usize, count: usize) -> StorageResult<Vec<Cluster>>;
}

/// Deployment rows
#[async_trait]
pub trait DeploymentStorage: Send {
    /// Insert a deployment; a duplicate `(cluster, namespace, name)` is a `Conflict`
    async fn insert_deployment(&mut self, deployment: NewDeployment) -> StorageResult<Deployment>;

    async fn get_deployment(&mut self, id: DeploymentId) -> StorageResult<Option<Deployment>>;

    async fn get_deployment_by_name(
        &mut self,
        cluster_id: ClusterId,
        kube_namespace: &str,
        name: &str,
    ) -> StorageResult<Option<Deployment>>;

    /// Hold a row lock on the deployment until the transaction ends
    async fn lock_deployment(&mut self, id: DeploymentId) -> StorageResult<()>;

    /// Write only the fields present in `update`
    async fn update_deployment_status(
        &mut self,
        id: DeploymentId,
        update: &StatusUpdate,
    ) -> StorageResult<()>;

    async fn update_deployment_description(
        &mut self,
        id: DeploymentId,
        description: &str,
    ) -> StorageResult<()>;

    /// Page through a cluster's deployments, newest first
    async fn list_deployments(
        &mut self,
        cluster_id: ClusterId,
        start: usize,
        count: usize,
    ) -> StorageResult<Vec<Deployment>>;

    /// Hard delete, cascading to revisions and targets
    async fn delete_deployment(&mut self, id: DeploymentId) -> StorageResult<bool>;
}

/// Selects revisions; results are ordered by id ascending
#[derive(Debug, Clone)]
pub struct RevisionFilter {
    pub deployment_id: DeploymentId,
    pub status: Option<RevisionStatus>,
}

impl RevisionFilter {
    pub fn deployment(deployment_id: DeploymentId) -> Self {
        Self {
            deployment_id,
            status: None,
        }
    }

    pub fn active(deployment_id: DeploymentId) -> Self {
        Self {
            deployment_id,
            status: Some(RevisionStatus::Active),
        }
    }

    pub fn matches(&self, revision: &DeploymentRevision) -> bool {
        revision.deployment_id == self.deployment_id
            && self.status.map_or(true, |s| revision.status == s)
    }
}

/// Revision rows
#[async_trait]
pub trait RevisionStorage: Send {
    async fn insert_revision(
        &mut self,
        deployment_id: DeploymentId,
        status: RevisionStatus,
    ) -> StorageResult<DeploymentRevision>;

    async fn list_revisions(
        &mut self,
        filter: &RevisionFilter,
    ) -> StorageResult<Vec<DeploymentRevision>>;

    async fn update_revision_status(
        &mut self,
        id: RevisionId,
        status: RevisionStatus,
    ) -> StorageResult<()>;
}

/// Selects targets; every present field must match. Results are ordered by id
/// ascending.
#[derive(Debug, Clone, Default)]
pub struct TargetFilter {
    pub deployment_id: Option<DeploymentId>,
    pub revision_id: Option<RevisionId>,
    /// Status of the owning revision
    pub revision_status: Option<RevisionStatus>,
}

impl TargetFilter {
    pub fn revision(revision_id: RevisionId) -> Self {
        Self {
            revision_id: Some(revision_id),
            ..Default::default()
        }
    }

    pub fn deployment(deployment_id: DeploymentId) -> Self {
        Self {
            deployment_id: Some(deployment_id),
            ..Default::default()
        }
    }

    pub fn with_revision_status(mut self, status: RevisionStatus) -> Self {
        self.revision_status = Some(status);
        self
    }
}

/// Target rows
#[async_trait]
pub trait TargetStorage: Send {
    async fn insert_target(&mut self, target: NewTarget) -> StorageResult<DeploymentTarget>;

    async fn get_target(&mut self, id: TargetId) -> StorageResult<Option<DeploymentTarget>>;

    async fn list_targets(&mut self, filter: &TargetFilter) -> StorageResult<Vec<DeploymentTarget>>;

    /// Replace the config column; a missing row is `NotFound`
    async fn update_target_config(
        &mut self,
        id: TargetId,
        config: &TargetConfig,
    ) -> StorageResult<()>;

    /// Record the reconciler's ids; a missing row is `NotFound`
    async fn update_target_handles(
        &mut self,
        id: TargetId,
        handles: &RemoteHandles,
    ) -> StorageResult<()>;
}
