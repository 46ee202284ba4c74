//! Deployment store: deployment rows and their status

use crate::error::{ServiceError, ServiceResult};
use crate::storage::Transaction;
use strata_types::{
    validate_dns1035_label, ClusterId, Deployment, NewDeployment, StatusUpdate,
};
use tracing::{debug, info};
use uuid::Uuid;

/// Deployment row operations, always run inside the caller's transaction
#[derive(Debug, Clone, Default)]
pub struct DeploymentStore;

impl DeploymentStore {
    /// Insert a new `non-deployed` deployment with a fresh deploy token
    pub async fn create(
        &self,
        tx: &mut dyn Transaction,
        cluster_id: ClusterId,
        kube_namespace: &str,
        name: &str,
        description: &str,
    ) -> ServiceResult<Deployment> {
        validate_dns1035_label("deployment name", name)?;
        validate_dns1035_label("namespace", kube_namespace)?;

        let deployment = tx
            .insert_deployment(NewDeployment {
                cluster_id,
                kube_namespace: kube_namespace.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                kube_deploy_token: Uuid::new_v4().to_string(),
            })
            .await?;

        info!(
            deployment = %deployment.name,
            namespace = %deployment.kube_namespace,
            deployment_id = %deployment.id,
            "Deployment created"
        );
        Ok(deployment)
    }

    pub async fn get_by_name(
        &self,
        tx: &mut dyn Transaction,
        cluster_id: ClusterId,
        kube_namespace: &str,
        name: &str,
    ) -> ServiceResult<Deployment> {
        tx.get_deployment_by_name(cluster_id, kube_namespace, name)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("deployment {}/{}", kube_namespace, name))
            })
    }

    /// Hold the deployment's row lock until the transaction ends
    pub async fn lock(
        &self,
        tx: &mut dyn Transaction,
        deployment: &Deployment,
    ) -> ServiceResult<()> {
        tx.lock_deployment(deployment.id).await?;
        debug!(deployment_id = %deployment.id, "Deployment locked");
        Ok(())
    }

    /// Write the present fields of `update` and mirror them onto `deployment`
    pub async fn update_status(
        &self,
        tx: &mut dyn Transaction,
        deployment: &mut Deployment,
        update: StatusUpdate,
    ) -> ServiceResult<()> {
        if update.is_empty() {
            return Ok(());
        }

        tx.update_deployment_status(deployment.id, &update).await?;
        update.apply(deployment);

        if let Some(status) = update.status {
            info!(deployment = %deployment.name, status = %status, "Deployment status changed");
        }
        Ok(())
    }

    pub async fn update_description(
        &self,
        tx: &mut dyn Transaction,
        deployment: &mut Deployment,
        description: Option<String>,
    ) -> ServiceResult<()> {
        let Some(description) = description else {
            return Ok(());
        };

        tx.update_deployment_description(deployment.id, &description)
            .await?;
        deployment.description = description;
        Ok(())
    }

    /// Page through a cluster's deployments, newest first
    pub async fn list(
        &self,
        tx: &mut dyn Transaction,
        cluster_id: ClusterId,
        start: usize,
        count: usize,
    ) -> ServiceResult<Vec<Deployment>> {
        Ok(tx.list_deployments(cluster_id, start, count).await?)
    }

    /// Hard delete. Only legal once termination has started.
    pub async fn delete(
        &self,
        tx: &mut dyn Transaction,
        deployment: &Deployment,
    ) -> ServiceResult<()> {
        if !deployment.is_deletable() {
            return Err(ServiceError::InvalidState(format!(
                "deployment {} is {}; terminate it before deleting",
                deployment.name, deployment.status
            )));
        }

        if !tx.delete_deployment(deployment.id).await? {
            return Err(ServiceError::NotFound(format!(
                "deployment {}/{}",
                deployment.kube_namespace, deployment.name
            )));
        }

        info!(deployment = %deployment.name, deployment_id = %deployment.id, "Deployment deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, InMemoryDatabase};
    use chrono::Utc;
    use strata_types::{DeploymentStatus, NewCluster};

    async fn setup() -> (Box<dyn Transaction>, ClusterId) {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let cluster = tx
            .insert_cluster(NewCluster {
                name: "c1".to_string(),
                description: String::new(),
                kube_config: String::new(),
            })
            .await
            .unwrap();
        (tx, cluster.id)
    }

    #[tokio::test]
    async fn test_create_starts_non_deployed() {
        let (mut tx, cluster_id) = setup().await;
        let store = DeploymentStore;

        let deployment = store
            .create(tx.as_mut(), cluster_id, "ns1", "d1", "first")
            .await
            .unwrap();
        assert_eq!(deployment.status, DeploymentStatus::NonDeployed);
        assert!(Uuid::parse_str(&deployment.kube_deploy_token).is_ok());

        let found = store
            .get_by_name(tx.as_mut(), cluster_id, "ns1", "d1")
            .await
            .unwrap();
        assert_eq!(found, deployment);
    }

    #[tokio::test]
    async fn test_create_validates_names() {
        let (mut tx, cluster_id) = setup().await;
        let store = DeploymentStore;

        for (namespace, name) in [("ns1", "D1"), ("ns_1", "d1"), ("ns1", "1d")] {
            let result = store
                .create(tx.as_mut(), cluster_id, namespace, name, "")
                .await;
            assert!(matches!(result, Err(ServiceError::Validation(_))));
        }
        assert!(store
            .list(tx.as_mut(), cluster_id, 0, 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_update_status_is_partial() {
        let (mut tx, cluster_id) = setup().await;
        let store = DeploymentStore;
        let mut deployment = store
            .create(tx.as_mut(), cluster_id, "ns1", "d1", "")
            .await
            .unwrap();

        let syncing_at = Utc::now();
        store
            .update_status(
                tx.as_mut(),
                &mut deployment,
                StatusUpdate {
                    syncing_at: Some(syncing_at),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(deployment.status, DeploymentStatus::NonDeployed);
        assert_eq!(deployment.status_syncing_at, Some(syncing_at));

        let stored = store
            .get_by_name(tx.as_mut(), cluster_id, "ns1", "d1")
            .await
            .unwrap();
        assert_eq!(stored, deployment);
    }

    #[tokio::test]
    async fn test_delete_requires_termination() {
        let (mut tx, cluster_id) = setup().await;
        let store = DeploymentStore;
        let mut deployment = store
            .create(tx.as_mut(), cluster_id, "ns1", "d1", "")
            .await
            .unwrap();

        store
            .update_status(
                tx.as_mut(),
                &mut deployment,
                StatusUpdate::status(DeploymentStatus::Running),
            )
            .await
            .unwrap();
        assert!(matches!(
            store.delete(tx.as_mut(), &deployment).await,
            Err(ServiceError::InvalidState(_))
        ));

        store
            .update_status(
                tx.as_mut(),
                &mut deployment,
                StatusUpdate::status(DeploymentStatus::Terminated),
            )
            .await
            .unwrap();
        store.delete(tx.as_mut(), &deployment).await.unwrap();
        assert!(matches!(
            store.get_by_name(tx.as_mut(), cluster_id, "ns1", "d1").await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
