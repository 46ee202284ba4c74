//! Revision orchestrator
//!
//! Composes the stores, the ledger and the target registry into the
//! deployment flows. Every flow runs in one transaction; a flow called from
//! another flow joins the caller's transaction.
//!
//! Deploy path: deactivate the active revision(s), append a new active
//! revision with one target per requested artifact, deploy every new target,
//! and only then terminate the old targets. Any error rolls back every row
//! written by the request; remote deletes already issued are not undone.

use super::{ClusterDirectory, DeploymentStore, RevisionLedger, TargetRegistry};
use crate::error::ServiceResult;
use crate::reconciler::Reconciler;
use crate::storage::{Database, TargetFilter, Transaction};
use crate::tx::TransactionCoordinator;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use strata_types::{
    Deployment, DeploymentRevision, DeploymentStatus, DeploymentTarget, RevisionStatus,
    StatusUpdate, TargetConfig, TargetSpec,
};
use tracing::{info, instrument};

/// Request to create a deployment and roll out its first revision
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDeploymentRequest {
    pub name: String,
    pub kube_namespace: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
}

/// Request to change a deployment
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDeploymentRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
    /// Only record the correlation fields reported for existing targets
    #[serde(default)]
    pub do_not_deploy: bool,
}

/// A revision with its targets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevisionView {
    #[serde(flatten)]
    pub revision: DeploymentRevision,
    pub targets: Vec<DeploymentTarget>,
}

/// A deployment with its active revision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentView {
    #[serde(flatten)]
    pub deployment: Deployment,
    pub active_revision: Option<RevisionView>,
}

#[derive(Clone)]
pub struct RevisionOrchestrator {
    coordinator: TransactionCoordinator,
    clusters: ClusterDirectory,
    deployments: DeploymentStore,
    revisions: RevisionLedger,
    targets: TargetRegistry,
}

impl RevisionOrchestrator {
    pub fn new(db: Arc<dyn Database>, reconciler: Arc<dyn Reconciler>) -> Self {
        let coordinator = TransactionCoordinator::new(db);
        Self {
            clusters: ClusterDirectory::new(coordinator.clone()),
            coordinator,
            deployments: DeploymentStore,
            revisions: RevisionLedger,
            targets: TargetRegistry::new(reconciler),
        }
    }

    pub fn clusters(&self) -> &ClusterDirectory {
        &self.clusters
    }

    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    /// Create a `non-deployed` deployment and run the deploy path for its
    /// initial targets in the same transaction.
    #[instrument(skip(self, outer, request), fields(deployment = %request.name))]
    pub async fn create_deployment(
        &self,
        outer: Option<&mut dyn Transaction>,
        cluster: &str,
        request: CreateDeploymentRequest,
    ) -> ServiceResult<DeploymentView> {
        let mut scope = self.coordinator.begin(outer).await?;
        let result = self.create_in(scope.tx(), cluster, request).await;
        scope.finish(result).await
    }

    /// Apply an update: the description patch, then either the deploy path
    /// or, with `do_not_deploy`, the correlation-only path.
    #[instrument(skip(self, outer, request), fields(deployment = %name))]
    pub async fn update_deployment(
        &self,
        outer: Option<&mut dyn Transaction>,
        cluster: &str,
        kube_namespace: &str,
        name: &str,
        request: UpdateDeploymentRequest,
    ) -> ServiceResult<DeploymentView> {
        let mut scope = self.coordinator.begin(outer).await?;
        let result = self
            .update_in(scope.tx(), cluster, kube_namespace, name, request)
            .await;
        scope.finish(result).await
    }

    /// Deploy path. Returns the new active revision.
    pub async fn deploy(
        &self,
        outer: Option<&mut dyn Transaction>,
        deployment: &Deployment,
        specs: Vec<TargetSpec>,
    ) -> ServiceResult<DeploymentRevision> {
        let mut scope = self.coordinator.begin(outer).await?;
        let result = self.deploy_in(scope.tx(), deployment, specs).await;
        scope.finish(result).await
    }

    /// Copy reported `kubeResourceUid`/`kubeResourceVersion` onto the active
    /// targets with a matching artifact tag. Returns how many were updated.
    pub async fn update_information(
        &self,
        outer: Option<&mut dyn Transaction>,
        deployment: &Deployment,
        specs: &[TargetSpec],
    ) -> ServiceResult<usize> {
        let mut scope = self.coordinator.begin(outer).await?;
        let result = self.update_information_in(scope.tx(), deployment, specs).await;
        scope.finish(result).await
    }

    /// Mark the deployment `terminating` and release the active revision's
    /// targets. No rows are removed.
    #[instrument(skip(self, outer), fields(deployment = %name))]
    pub async fn terminate(
        &self,
        outer: Option<&mut dyn Transaction>,
        cluster: &str,
        kube_namespace: &str,
        name: &str,
    ) -> ServiceResult<DeploymentView> {
        let mut scope = self.coordinator.begin(outer).await?;
        let result = self
            .terminate_in(scope.tx(), cluster, kube_namespace, name)
            .await;
        scope.finish(result).await
    }

    /// Hard delete, only once the deployment is `terminating` or `terminated`
    #[instrument(skip(self, outer), fields(deployment = %name))]
    pub async fn delete(
        &self,
        outer: Option<&mut dyn Transaction>,
        cluster: &str,
        kube_namespace: &str,
        name: &str,
    ) -> ServiceResult<()> {
        let mut scope = self.coordinator.begin(outer).await?;
        let result = self.delete_in(scope.tx(), cluster, kube_namespace, name).await;
        scope.finish(result).await
    }

    /// Record a sync and report the deployment as `deploying`.
    ///
    /// The reconciler is not asked for live status yet.
    pub async fn sync_status(
        &self,
        outer: Option<&mut dyn Transaction>,
        cluster: &str,
        kube_namespace: &str,
        name: &str,
    ) -> ServiceResult<DeploymentView> {
        let mut scope = self.coordinator.begin(outer).await?;
        let result = self
            .sync_status_in(scope.tx(), cluster, kube_namespace, name)
            .await;
        scope.finish(result).await
    }

    pub async fn get(
        &self,
        outer: Option<&mut dyn Transaction>,
        cluster: &str,
        kube_namespace: &str,
        name: &str,
    ) -> ServiceResult<DeploymentView> {
        let mut scope = self.coordinator.begin(outer).await?;
        let result = self.get_in(scope.tx(), cluster, kube_namespace, name).await;
        scope.finish(result).await
    }

    /// Page through a cluster's deployments, newest first
    pub async fn list(
        &self,
        outer: Option<&mut dyn Transaction>,
        cluster: &str,
        start: usize,
        count: usize,
    ) -> ServiceResult<Vec<DeploymentView>> {
        let mut scope = self.coordinator.begin(outer).await?;
        let result = self.list_in(scope.tx(), cluster, start, count).await;
        scope.finish(result).await
    }

    /// Full revision history with targets, oldest first
    pub async fn revisions(
        &self,
        outer: Option<&mut dyn Transaction>,
        cluster: &str,
        kube_namespace: &str,
        name: &str,
    ) -> ServiceResult<Vec<RevisionView>> {
        let mut scope = self.coordinator.begin(outer).await?;
        let result = self
            .revisions_in(scope.tx(), cluster, kube_namespace, name)
            .await;
        scope.finish(result).await
    }

    async fn find(
        &self,
        tx: &mut dyn Transaction,
        cluster: &str,
        kube_namespace: &str,
        name: &str,
    ) -> ServiceResult<Deployment> {
        let cluster = self.clusters.get_by_name(Some(&mut *tx), cluster).await?;
        self.deployments
            .get_by_name(tx, cluster.id, kube_namespace, name)
            .await
    }

    async fn create_in(
        &self,
        tx: &mut dyn Transaction,
        cluster: &str,
        request: CreateDeploymentRequest,
    ) -> ServiceResult<DeploymentView> {
        let cluster = self.clusters.get_by_name(Some(&mut *tx), cluster).await?;
        let deployment = self
            .deployments
            .create(
                tx,
                cluster.id,
                &request.kube_namespace,
                &request.name,
                request.description.as_deref().unwrap_or_default(),
            )
            .await?;

        self.deploy(Some(&mut *tx), &deployment, request.targets)
            .await?;
        self.view(tx, deployment).await
    }

    async fn update_in(
        &self,
        tx: &mut dyn Transaction,
        cluster: &str,
        kube_namespace: &str,
        name: &str,
        request: UpdateDeploymentRequest,
    ) -> ServiceResult<DeploymentView> {
        let mut deployment = self.find(tx, cluster, kube_namespace, name).await?;
        self.deployments
            .update_description(tx, &mut deployment, request.description)
            .await?;

        if request.do_not_deploy {
            self.update_information(Some(&mut *tx), &deployment, &request.targets)
                .await?;
        } else {
            self.deploy(Some(&mut *tx), &deployment, request.targets)
                .await?;
        }

        self.view(tx, deployment).await
    }

    async fn deploy_in(
        &self,
        tx: &mut dyn Transaction,
        deployment: &Deployment,
        specs: Vec<TargetSpec>,
    ) -> ServiceResult<DeploymentRevision> {
        // Serializes concurrent deploys of the same deployment.
        self.deployments.lock(tx, deployment).await?;

        let mut old_targets = Vec::new();
        for mut old in self.revisions.list_active(tx, deployment.id).await? {
            self.revisions
                .set_status(tx, &mut old, RevisionStatus::Inactive)
                .await?;
            old_targets.extend(
                self.targets
                    .list(tx, &TargetFilter::revision(old.id))
                    .await?,
            );
        }

        let revision = self.revisions.create(tx, deployment.id).await?;

        let mut new_targets = Vec::with_capacity(specs.len());
        for spec in specs {
            let artifact_tag = spec.artifact_tag();
            let target = self
                .targets
                .create(tx, deployment.id, revision.id, artifact_tag, spec.config)
                .await?;
            new_targets.push(target);
        }

        for target in &mut new_targets {
            self.targets.deploy(tx, deployment, target).await?;
        }
        for target in &old_targets {
            self.targets.terminate(target).await?;
        }

        info!(
            deployment = %deployment.name,
            revision_id = %revision.id,
            deployed = new_targets.len(),
            terminated = old_targets.len(),
            "Revision rolled out"
        );
        Ok(revision)
    }

    async fn update_information_in(
        &self,
        tx: &mut dyn Transaction,
        deployment: &Deployment,
        specs: &[TargetSpec],
    ) -> ServiceResult<usize> {
        let reported: HashMap<String, &TargetConfig> = specs
            .iter()
            .filter_map(|spec| spec.config.as_ref().map(|c| (spec.artifact_tag(), c)))
            .collect();

        let mut updated = 0;
        for revision in self.revisions.list_active(tx, deployment.id).await? {
            let targets = self
                .targets
                .list(tx, &TargetFilter::revision(revision.id))
                .await?;
            for mut target in targets {
                let Some(config) = reported.get(&target.artifact_tag) else {
                    continue;
                };
                let merged = target.config.clone().with_correlation_from(config);
                self.targets.update(tx, &mut target, Some(merged)).await?;
                updated += 1;
            }
        }

        info!(deployment = %deployment.name, updated, "Target correlation recorded");
        Ok(updated)
    }

    async fn terminate_in(
        &self,
        tx: &mut dyn Transaction,
        cluster: &str,
        kube_namespace: &str,
        name: &str,
    ) -> ServiceResult<DeploymentView> {
        let mut deployment = self.find(tx, cluster, kube_namespace, name).await?;
        self.deployments.lock(tx, &deployment).await?;
        self.deployments
            .update_status(
                tx,
                &mut deployment,
                StatusUpdate::status(DeploymentStatus::Terminating),
            )
            .await?;

        for mut revision in self.revisions.list_active(tx, deployment.id).await? {
            self.revisions
                .terminate(tx, &self.targets, &mut revision)
                .await?;
        }

        self.view(tx, deployment).await
    }

    async fn delete_in(
        &self,
        tx: &mut dyn Transaction,
        cluster: &str,
        kube_namespace: &str,
        name: &str,
    ) -> ServiceResult<()> {
        let deployment = self.find(tx, cluster, kube_namespace, name).await?;
        self.deployments.delete(tx, &deployment).await
    }

    async fn get_in(
        &self,
        tx: &mut dyn Transaction,
        cluster: &str,
        kube_namespace: &str,
        name: &str,
    ) -> ServiceResult<DeploymentView> {
        let deployment = self.find(tx, cluster, kube_namespace, name).await?;
        self.view(tx, deployment).await
    }

    async fn sync_status_in(
        &self,
        tx: &mut dyn Transaction,
        cluster: &str,
        kube_namespace: &str,
        name: &str,
    ) -> ServiceResult<DeploymentView> {
        let mut deployment = self.find(tx, cluster, kube_namespace, name).await?;
        self.deployments
            .update_status(
                tx,
                &mut deployment,
                StatusUpdate {
                    syncing_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;

        // TODO: query the reconciler for live status once it exposes one.
        self.deployments
            .update_status(
                tx,
                &mut deployment,
                StatusUpdate {
                    status: Some(DeploymentStatus::Deploying),
                    updated_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;

        self.view(tx, deployment).await
    }

    async fn list_in(
        &self,
        tx: &mut dyn Transaction,
        cluster: &str,
        start: usize,
        count: usize,
    ) -> ServiceResult<Vec<DeploymentView>> {
        let cluster = self.clusters.get_by_name(Some(&mut *tx), cluster).await?;
        let deployments = self.deployments.list(tx, cluster.id, start, count).await?;

        let mut views = Vec::with_capacity(deployments.len());
        for deployment in deployments {
            views.push(self.view(tx, deployment).await?);
        }
        Ok(views)
    }

    async fn revisions_in(
        &self,
        tx: &mut dyn Transaction,
        cluster: &str,
        kube_namespace: &str,
        name: &str,
    ) -> ServiceResult<Vec<RevisionView>> {
        let deployment = self.find(tx, cluster, kube_namespace, name).await?;
        let revisions = self.revisions.list(tx, deployment.id, None).await?;

        let mut views = Vec::with_capacity(revisions.len());
        for revision in revisions {
            let targets = self
                .targets
                .list(tx, &TargetFilter::revision(revision.id))
                .await?;
            views.push(RevisionView { revision, targets });
        }
        Ok(views)
    }

    async fn view(
        &self,
        tx: &mut dyn Transaction,
        deployment: Deployment,
    ) -> ServiceResult<DeploymentView> {
        let active_revision = match self.revisions.list_active(tx, deployment.id).await?.pop() {
            Some(revision) => {
                let targets = self
                    .targets
                    .list(tx, &TargetFilter::revision(revision.id))
                    .await?;
                Some(RevisionView { revision, targets })
            }
            None => None,
        };

        Ok(DeploymentView {
            deployment,
            active_revision,
        })
    }
}
