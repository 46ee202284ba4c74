//! Revision ledger

use super::target::TargetRegistry;
use crate::error::ServiceResult;
use crate::storage::{RevisionFilter, TargetFilter, Transaction};
use strata_types::{DeploymentId, DeploymentRevision, RevisionStatus};
use tracing::info;

/// Revision rows. The single-active-revision rule is kept by callers
/// deactivating before creating.
#[derive(Debug, Clone, Default)]
pub struct RevisionLedger;

impl RevisionLedger {
    pub async fn list_active(
        &self,
        tx: &mut dyn Transaction,
        deployment_id: DeploymentId,
    ) -> ServiceResult<Vec<DeploymentRevision>> {
        Ok(tx.list_revisions(&RevisionFilter::active(deployment_id)).await?)
    }

    /// Revision history, oldest first
    pub async fn list(
        &self,
        tx: &mut dyn Transaction,
        deployment_id: DeploymentId,
        status: Option<RevisionStatus>,
    ) -> ServiceResult<Vec<DeploymentRevision>> {
        let filter = RevisionFilter {
            deployment_id,
            status,
        };
        Ok(tx.list_revisions(&filter).await?)
    }

    /// Append a new active revision
    pub async fn create(
        &self,
        tx: &mut dyn Transaction,
        deployment_id: DeploymentId,
    ) -> ServiceResult<DeploymentRevision> {
        let revision = tx
            .insert_revision(deployment_id, RevisionStatus::Active)
            .await?;
        info!(deployment_id = %deployment_id, revision_id = %revision.id, "Revision created");
        Ok(revision)
    }

    pub async fn set_status(
        &self,
        tx: &mut dyn Transaction,
        revision: &mut DeploymentRevision,
        status: RevisionStatus,
    ) -> ServiceResult<()> {
        tx.update_revision_status(revision.id, status).await?;
        revision.status = status;
        info!(revision_id = %revision.id, status = %status, "Revision status changed");
        Ok(())
    }

    /// Release every target of the revision remotely, then deactivate it.
    ///
    /// Target rows stay; they go away with the deployment.
    pub async fn terminate(
        &self,
        tx: &mut dyn Transaction,
        targets: &TargetRegistry,
        revision: &mut DeploymentRevision,
    ) -> ServiceResult<()> {
        for target in targets
            .list(tx, &TargetFilter::revision(revision.id))
            .await?
        {
            targets.terminate(&target).await?;
        }

        self.set_status(tx, revision, RevisionStatus::Inactive).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, InMemoryDatabase};
    use crate::testing::RecordingReconciler;
    use std::sync::Arc;
    use strata_types::{NewCluster, NewDeployment};

    async fn deployment(tx: &mut dyn Transaction) -> DeploymentId {
        let cluster = tx
            .insert_cluster(NewCluster {
                name: "c1".to_string(),
                description: String::new(),
                kube_config: String::new(),
            })
            .await
            .unwrap();
        tx.insert_deployment(NewDeployment {
            cluster_id: cluster.id,
            kube_namespace: "ns1".to_string(),
            name: "d1".to_string(),
            description: String::new(),
            kube_deploy_token: "token".to_string(),
        })
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_deactivate_then_create_keeps_one_active() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let deployment_id = deployment(tx.as_mut()).await;
        let ledger = RevisionLedger;

        let mut first = ledger.create(tx.as_mut(), deployment_id).await.unwrap();
        ledger
            .set_status(tx.as_mut(), &mut first, RevisionStatus::Inactive)
            .await
            .unwrap();
        let second = ledger.create(tx.as_mut(), deployment_id).await.unwrap();

        let active = ledger.list_active(tx.as_mut(), deployment_id).await.unwrap();
        assert_eq!(active, vec![second.clone()]);

        let history = ledger.list(tx.as_mut(), deployment_id, None).await.unwrap();
        let ids: Vec<_> = history.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_terminate_releases_targets() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let deployment_id = deployment(tx.as_mut()).await;
        let ledger = RevisionLedger;
        let reconciler = Arc::new(RecordingReconciler::new());
        let registry = TargetRegistry::new(reconciler.clone());

        let mut revision = ledger.create(tx.as_mut(), deployment_id).await.unwrap();
        for tag in ["a:1", "b:1"] {
            registry
                .create(tx.as_mut(), deployment_id, revision.id, tag.to_string(), None)
                .await
                .unwrap();
        }

        ledger
            .terminate(tx.as_mut(), &registry, &mut revision)
            .await
            .unwrap();

        assert_eq!(revision.status, RevisionStatus::Inactive);
        assert_eq!(reconciler.deletes(), 2);
        assert!(ledger
            .list_active(tx.as_mut(), deployment_id)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            registry
                .list(tx.as_mut(), &TargetFilter::revision(revision.id))
                .await
                .unwrap()
                .len(),
            2
        );
    }
}
