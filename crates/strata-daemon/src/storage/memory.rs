//! In-memory storage implementation

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_types::{
    Cluster, ClusterId, ClusterPatch, Deployment, DeploymentId, DeploymentRevision,
    DeploymentStatus, DeploymentTarget, NewCluster, NewDeployment, NewTarget, RemoteHandles,
    RevisionId, RevisionStatus, StatusUpdate, TargetConfig, TargetId,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// The full table set
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Tables {
    clusters: BTreeMap<ClusterId, Cluster>,
    deployments: BTreeMap<DeploymentId, Deployment>,
    revisions: BTreeMap<RevisionId, DeploymentRevision>,
    targets: BTreeMap<TargetId, DeploymentTarget>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    #[cfg(test)]
    pub(crate) fn clusters_len(&self) -> usize {
        self.clusters.len()
    }
}

/// In-memory storage for development and testing.
///
/// A transaction holds the table lock from `begin` until it is committed,
/// rolled back or dropped, so transactions never interleave.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatabase {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryDatabase {
    /// Create a new in-memory database
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed tables
    #[cfg(test)]
    pub(crate) async fn snapshot(&self) -> Tables {
        self.tables.lock().await.clone()
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn begin(&self) -> StorageResult<Box<dyn Transaction>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction { guard, working }))
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Transaction over a private copy of the tables
#[derive(Debug)]
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let InMemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}

fn page<T>(rows: impl DoubleEndedIterator<Item = T>, start: usize, count: usize) -> Vec<T> {
    rows.rev().skip(start).take(count).collect()
}

#[async_trait]
impl ClusterStorage for InMemoryTransaction {
    async fn insert_cluster(&mut self, cluster: NewCluster) -> StorageResult<Cluster> {
        let tables = &mut self.working;
        if tables.clusters.values().any(|c| c.name == cluster.name) {
            return Err(StorageError::Conflict(format!(
                "cluster {} already exists",
                cluster.name
            )));
        }

        let now = Utc::now();
        let row = Cluster {
            id: ClusterId::new(tables.next_id()),
            name: cluster.name,
            description: cluster.description,
            kube_config: cluster.kube_config,
            created_at: now,
            updated_at: now,
        };
        tables.clusters.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_cluster(&mut self, id: ClusterId) -> StorageResult<Option<Cluster>> {
        Ok(self.working.clusters.get(&id).cloned())
    }

    async fn get_cluster_by_name(&mut self, name: &str) -> StorageResult<Option<Cluster>> {
        Ok(self
            .working
            .clusters
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn update_cluster(
        &mut self,
        id: ClusterId,
        patch: &ClusterPatch,
    ) -> StorageResult<Cluster> {
        let cluster = self
            .working
            .clusters
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("cluster {}", id)))?;
        patch.apply(cluster);
        cluster.updated_at = Utc::now();
        Ok(cluster.clone())
    }

    async fn list_clusters(&mut self, start: usize, count: usize) -> StorageResult<Vec<Cluster>> {
        Ok(page(self.working.clusters.values().cloned(), start, count))
    }
}

#[async_trait]
impl DeploymentStorage for InMemoryTransaction {
    async fn insert_deployment(&mut self, deployment: NewDeployment) -> StorageResult<Deployment> {
        let tables = &mut self.working;
        if !tables.clusters.contains_key(&deployment.cluster_id) {
            return Err(StorageError::NotFound(format!(
                "cluster {}",
                deployment.cluster_id
            )));
        }
        if tables.deployments.values().any(|d| {
            d.cluster_id == deployment.cluster_id
                && d.kube_namespace == deployment.kube_namespace
                && d.name == deployment.name
        }) {
            return Err(StorageError::Conflict(format!(
                "deployment {}/{} already exists",
                deployment.kube_namespace, deployment.name
            )));
        }

        let now = Utc::now();
        let row = Deployment {
            id: DeploymentId::new(tables.next_id()),
            cluster_id: deployment.cluster_id,
            kube_namespace: deployment.kube_namespace,
            name: deployment.name,
            description: deployment.description,
            status: DeploymentStatus::NonDeployed,
            status_syncing_at: None,
            status_updated_at: None,
            kube_deploy_token: deployment.kube_deploy_token,
            created_at: now,
            updated_at: now,
        };
        tables.deployments.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_deployment(&mut self, id: DeploymentId) -> StorageResult<Option<Deployment>> {
        Ok(self.working.deployments.get(&id).cloned())
    }

    async fn get_deployment_by_name(
        &mut self,
        cluster_id: ClusterId,
        kube_namespace: &str,
        name: &str,
    ) -> StorageResult<Option<Deployment>> {
        Ok(self
            .working
            .deployments
            .values()
            .find(|d| {
                d.cluster_id == cluster_id && d.kube_namespace == kube_namespace && d.name == name
            })
            .cloned())
    }

    async fn lock_deployment(&mut self, id: DeploymentId) -> StorageResult<()> {
        // The whole table set is already held exclusively.
        if self.working.deployments.contains_key(&id) {
            Ok(())
        } else {
            Err(StorageError::NotFound(format!("deployment {}", id)))
        }
    }

    async fn update_deployment_status(
        &mut self,
        id: DeploymentId,
        update: &StatusUpdate,
    ) -> StorageResult<()> {
        let deployment = self
            .working
            .deployments
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("deployment {}", id)))?;
        update.apply(deployment);
        Ok(())
    }

    async fn update_deployment_description(
        &mut self,
        id: DeploymentId,
        description: &str,
    ) -> StorageResult<()> {
        let deployment = self
            .working
            .deployments
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("deployment {}", id)))?;
        deployment.description = description.to_string();
        deployment.updated_at = Utc::now();
        Ok(())
    }

    async fn list_deployments(
        &mut self,
        cluster_id: ClusterId,
        start: usize,
        count: usize,
    ) -> StorageResult<Vec<Deployment>> {
        let rows = self
            .working
            .deployments
            .values()
            .filter(|d| d.cluster_id == cluster_id)
            .cloned();
        Ok(page(rows, start, count))
    }

    async fn delete_deployment(&mut self, id: DeploymentId) -> StorageResult<bool> {
        let tables = &mut self.working;
        if tables.deployments.remove(&id).is_none() {
            return Ok(false);
        }
        tables.revisions.retain(|_, r| r.deployment_id != id);
        tables.targets.retain(|_, t| t.deployment_id != id);
        Ok(true)
    }
}

#[async_trait]
impl RevisionStorage for InMemoryTransaction {
    async fn insert_revision(
        &mut self,
        deployment_id: DeploymentId,
        status: RevisionStatus,
    ) -> StorageResult<DeploymentRevision> {
        let tables = &mut self.working;
        if !tables.deployments.contains_key(&deployment_id) {
            return Err(StorageError::NotFound(format!("deployment {}", deployment_id)));
        }

        let now = Utc::now();
        let row = DeploymentRevision {
            id: RevisionId::new(tables.next_id()),
            deployment_id,
            status,
            created_at: now,
            updated_at: now,
        };
        tables.revisions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn list_revisions(
        &mut self,
        filter: &RevisionFilter,
    ) -> StorageResult<Vec<DeploymentRevision>> {
        Ok(self
            .working
            .revisions
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn update_revision_status(
        &mut self,
        id: RevisionId,
        status: RevisionStatus,
    ) -> StorageResult<()> {
        let revision = self
            .working
            .revisions
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("revision {}", id)))?;
        revision.status = status;
        revision.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl TargetStorage for InMemoryTransaction {
    async fn insert_target(&mut self, target: NewTarget) -> StorageResult<DeploymentTarget> {
        let tables = &mut self.working;
        if !tables.revisions.contains_key(&target.revision_id) {
            return Err(StorageError::NotFound(format!("revision {}", target.revision_id)));
        }

        let row = DeploymentTarget {
            id: TargetId::new(tables.next_id()),
            deployment_id: target.deployment_id,
            revision_id: target.revision_id,
            artifact_tag: target.artifact_tag,
            config: target.config,
            kube_deployment_id: String::new(),
            kube_request_id: String::new(),
            created_at: Utc::now(),
        };
        tables.targets.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_target(&mut self, id: TargetId) -> StorageResult<Option<DeploymentTarget>> {
        Ok(self.working.targets.get(&id).cloned())
    }

    async fn list_targets(
        &mut self,
        filter: &TargetFilter,
    ) -> StorageResult<Vec<DeploymentTarget>> {
        let tables = &self.working;
        Ok(tables
            .targets
            .values()
            .filter(|t| filter.deployment_id.map_or(true, |id| t.deployment_id == id))
            .filter(|t| filter.revision_id.map_or(true, |id| t.revision_id == id))
            .filter(|t| {
                filter.revision_status.map_or(true, |status| {
                    tables
                        .revisions
                        .get(&t.revision_id)
                        .is_some_and(|r| r.status == status)
                })
            })
            .cloned()
            .collect())
    }

    async fn update_target_config(
        &mut self,
        id: TargetId,
        config: &TargetConfig,
    ) -> StorageResult<()> {
        let target = self
            .working
            .targets
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("target {}", id)))?;
        target.config = config.clone();
        Ok(())
    }

    async fn update_target_handles(
        &mut self,
        id: TargetId,
        handles: &RemoteHandles,
    ) -> StorageResult<()> {
        let target = self
            .working
            .targets
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("target {}", id)))?;
        target.kube_deployment_id = handles.kube_deployment_id.clone();
        target.kube_request_id = handles.kube_request_id.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_cluster(name: &str) -> NewCluster {
        NewCluster {
            name: name.to_string(),
            description: String::new(),
            kube_config: "apiVersion: v1".to_string(),
        }
    }

    fn new_deployment(cluster_id: ClusterId, name: &str) -> NewDeployment {
        NewDeployment {
            cluster_id,
            kube_namespace: "ns1".to_string(),
            name: name.to_string(),
            description: String::new(),
            kube_deploy_token: "token".to_string(),
        }
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let db = InMemoryDatabase::new();

        let mut tx = db.begin().await.unwrap();
        let cluster = tx.insert_cluster(new_cluster("c1")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let found = tx.get_cluster_by_name("c1").await.unwrap();
        assert_eq!(found.map(|c| c.id), Some(cluster.id));
    }

    #[tokio::test]
    async fn test_drop_discards_writes() {
        let db = InMemoryDatabase::new();

        {
            let mut tx = db.begin().await.unwrap();
            tx.insert_cluster(new_cluster("c1")).await.unwrap();
        }

        let mut tx = db.begin().await.unwrap();
        tx.insert_cluster(new_cluster("c2")).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(db.snapshot().await, Tables::default());
    }

    #[tokio::test]
    async fn test_unique_names() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();

        let cluster = tx.insert_cluster(new_cluster("c1")).await.unwrap();
        assert!(matches!(
            tx.insert_cluster(new_cluster("c1")).await,
            Err(StorageError::Conflict(_))
        ));

        tx.insert_deployment(new_deployment(cluster.id, "d1"))
            .await
            .unwrap();
        assert!(matches!(
            tx.insert_deployment(new_deployment(cluster.id, "d1")).await,
            Err(StorageError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_target_filters_and_order() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();

        let cluster = tx.insert_cluster(new_cluster("c1")).await.unwrap();
        let deployment = tx
            .insert_deployment(new_deployment(cluster.id, "d1"))
            .await
            .unwrap();
        let old = tx
            .insert_revision(deployment.id, RevisionStatus::Inactive)
            .await
            .unwrap();
        let new = tx
            .insert_revision(deployment.id, RevisionStatus::Active)
            .await
            .unwrap();

        for (revision, tag) in [(old.id, "a:1"), (new.id, "b:1"), (new.id, "a:2")] {
            tx.insert_target(NewTarget {
                deployment_id: deployment.id,
                revision_id: revision,
                artifact_tag: tag.to_string(),
                config: TargetConfig::default(),
            })
            .await
            .unwrap();
        }

        let all = tx
            .list_targets(&TargetFilter::deployment(deployment.id))
            .await
            .unwrap();
        let tags: Vec<_> = all.iter().map(|t| t.artifact_tag.as_str()).collect();
        assert_eq!(tags, ["a:1", "b:1", "a:2"]);

        let active = tx
            .list_targets(
                &TargetFilter::deployment(deployment.id)
                    .with_revision_status(RevisionStatus::Active),
            )
            .await
            .unwrap();
        let tags: Vec<_> = active.iter().map(|t| t.artifact_tag.as_str()).collect();
        assert_eq!(tags, ["b:1", "a:2"]);

        let by_revision = tx.list_targets(&TargetFilter::revision(old.id)).await.unwrap();
        assert_eq!(by_revision.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();

        let cluster = tx.insert_cluster(new_cluster("c1")).await.unwrap();
        let deployment = tx
            .insert_deployment(new_deployment(cluster.id, "d1"))
            .await
            .unwrap();
        let revision = tx
            .insert_revision(deployment.id, RevisionStatus::Active)
            .await
            .unwrap();
        tx.insert_target(NewTarget {
            deployment_id: deployment.id,
            revision_id: revision.id,
            artifact_tag: "a:1".to_string(),
            config: TargetConfig::default(),
        })
        .await
        .unwrap();

        assert!(tx.delete_deployment(deployment.id).await.unwrap());
        assert!(!tx.delete_deployment(deployment.id).await.unwrap());
        assert!(tx
            .list_revisions(&RevisionFilter::deployment(deployment.id))
            .await
            .unwrap()
            .is_empty());
        assert!(tx
            .list_targets(&TargetFilter::deployment(deployment.id))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_missing_target_update_is_not_found() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();

        let result = tx
            .update_target_handles(TargetId::new(404), &RemoteHandles::default())
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_clusters_newest_first() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();

        for name in ["c1", "c2", "c3"] {
            tx.insert_cluster(new_cluster(name)).await.unwrap();
        }

        let names: Vec<_> = tx
            .list_clusters(0, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["c3", "c2"]);

        let names: Vec<_> = tx
            .list_clusters(2, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["c1"]);
    }
}
