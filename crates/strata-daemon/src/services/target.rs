//! Target registry
//!
//! Owns target rows, the default serving configuration, and the pairing of
//! reconciler calls with the rows that record their outcome.

use crate::error::{ServiceError, ServiceResult};
use crate::reconciler::Reconciler;
use crate::storage::{TargetFilter, Transaction};
use std::sync::Arc;
use strata_types::{
    Deployment, DeploymentId, DeploymentTarget, NewTarget, RemoteHandles, RevisionId,
    TargetConfig,
};
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct TargetRegistry {
    reconciler: Arc<dyn Reconciler>,
}

impl TargetRegistry {
    pub fn new(reconciler: Arc<dyn Reconciler>) -> Self {
        Self { reconciler }
    }

    /// Insert a target. Without a config the serving defaults apply.
    pub async fn create(
        &self,
        tx: &mut dyn Transaction,
        deployment_id: DeploymentId,
        revision_id: RevisionId,
        artifact_tag: String,
        config: Option<TargetConfig>,
    ) -> ServiceResult<DeploymentTarget> {
        let target = tx
            .insert_target(NewTarget {
                deployment_id,
                revision_id,
                artifact_tag,
                config: config.unwrap_or_else(TargetConfig::serving_defaults),
            })
            .await?;

        info!(
            target_id = %target.id,
            revision_id = %revision_id,
            artifact = %target.artifact_tag,
            "Target created"
        );
        Ok(target)
    }

    /// Targets matching `filter`, oldest first
    pub async fn list(
        &self,
        tx: &mut dyn Transaction,
        filter: &TargetFilter,
    ) -> ServiceResult<Vec<DeploymentTarget>> {
        Ok(tx.list_targets(filter).await?)
    }

    /// Replace the target's config when one is given
    pub async fn update(
        &self,
        tx: &mut dyn Transaction,
        target: &mut DeploymentTarget,
        config: Option<TargetConfig>,
    ) -> ServiceResult<()> {
        let Some(config) = config else {
            return Ok(());
        };

        tx.update_target_config(target.id, &config).await?;
        target.config = config;
        Ok(())
    }

    /// Materialize the target remotely and record the reconciler's ids.
    ///
    /// If the ids cannot be stored the remote resources are deleted again.
    /// When that delete fails too, both errors are returned and the remote
    /// resources are left behind.
    pub async fn deploy(
        &self,
        tx: &mut dyn Transaction,
        deployment: &Deployment,
        target: &mut DeploymentTarget,
    ) -> ServiceResult<()> {
        self.reconciler.create(deployment, target).await?;

        let handles = RemoteHandles::from(&*target);
        let source = match tx.update_target_handles(target.id, &handles).await {
            Ok(()) => {
                info!(
                    target_id = %target.id,
                    kube_deployment_id = %handles.kube_deployment_id,
                    kube_request_id = %handles.kube_request_id,
                    "Target deployed"
                );
                return Ok(());
            }
            Err(source) => source,
        };

        warn!(
            target_id = %target.id,
            error = %source,
            "Failed to record remote ids; deleting remote resources"
        );
        let compensation = match self.reconciler.delete(target).await {
            Ok(()) => {
                target.kube_deployment_id.clear();
                target.kube_request_id.clear();
                None
            }
            Err(err) => {
                error!(
                    target_id = %target.id,
                    kube_deployment_id = %handles.kube_deployment_id,
                    kube_request_id = %handles.kube_request_id,
                    error = %err,
                    "Compensating delete failed; remote resources left behind"
                );
                Some(err)
            }
        };

        Err(ServiceError::Persistence {
            target: target.id,
            source,
            compensation,
        })
    }

    /// Delete the target's remote resources. The row is left in place.
    pub async fn terminate(&self, target: &DeploymentTarget) -> ServiceResult<()> {
        self.reconciler.delete(target).await?;
        info!(target_id = %target.id, artifact = %target.artifact_tag, "Target terminated");
        Ok(())
    }
}
