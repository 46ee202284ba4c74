//! Cluster directory

use crate::error::{ServiceError, ServiceResult};
use crate::storage::Transaction;
use crate::tx::TransactionCoordinator;
use strata_types::{validate_dns1035_label, Cluster, ClusterPatch, NewCluster};
use tracing::info;

/// Keyed store of clusters
#[derive(Clone)]
pub struct ClusterDirectory {
    coordinator: TransactionCoordinator,
}

impl ClusterDirectory {
    pub fn new(coordinator: TransactionCoordinator) -> Self {
        Self { coordinator }
    }

    pub async fn create(
        &self,
        outer: Option<&mut dyn Transaction>,
        cluster: NewCluster,
    ) -> ServiceResult<Cluster> {
        validate_dns1035_label("cluster name", &cluster.name)?;

        let mut scope = self.coordinator.begin(outer).await?;
        let result = scope
            .tx()
            .insert_cluster(cluster)
            .await
            .map_err(ServiceError::from);
        let cluster = scope.finish(result).await?;

        info!(cluster = %cluster.name, cluster_id = %cluster.id, "Cluster created");
        Ok(cluster)
    }

    pub async fn get_by_name(
        &self,
        outer: Option<&mut dyn Transaction>,
        name: &str,
    ) -> ServiceResult<Cluster> {
        let mut scope = self.coordinator.begin(outer).await?;
        let result = Self::find(scope.tx(), name).await;
        scope.finish(result).await
    }

    pub async fn update(
        &self,
        outer: Option<&mut dyn Transaction>,
        name: &str,
        patch: ClusterPatch,
    ) -> ServiceResult<Cluster> {
        let mut scope = self.coordinator.begin(outer).await?;
        let result = Self::patch(scope.tx(), name, &patch).await;
        scope.finish(result).await
    }

    /// Page through clusters, newest first
    pub async fn list(
        &self,
        outer: Option<&mut dyn Transaction>,
        start: usize,
        count: usize,
    ) -> ServiceResult<Vec<Cluster>> {
        let mut scope = self.coordinator.begin(outer).await?;
        let result = scope
            .tx()
            .list_clusters(start, count)
            .await
            .map_err(ServiceError::from);
        scope.finish(result).await
    }

    async fn find(tx: &mut dyn Transaction, name: &str) -> ServiceResult<Cluster> {
        tx.get_cluster_by_name(name)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("cluster {}", name)))
    }

    async fn patch(
        tx: &mut dyn Transaction,
        name: &str,
        patch: &ClusterPatch,
    ) -> ServiceResult<Cluster> {
        let cluster = Self::find(tx, name).await?;
        if patch.is_empty() {
            return Ok(cluster);
        }
        Ok(tx.update_cluster(cluster.id, patch).await?)
    }
}
