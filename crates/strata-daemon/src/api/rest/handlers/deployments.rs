//! Deployment handlers
//!
//! Each handler runs one orchestrator flow in its own transaction. Flows that
//! call the reconciler run on their own task and finish even if the client
//! goes away.

use super::Pagination;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult, ServiceResult};
use crate::services::{
    CreateDeploymentRequest, DeploymentView, RevisionView, UpdateDeploymentRequest,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::future::Future;

/// Path of a single deployment
#[derive(Debug, Deserialize)]
pub struct DeploymentPath {
    pub cluster: String,
    pub namespace: String,
    pub name: String,
}

/// Run `flow` on a spawned task and wait for it
async fn detached<T, F>(flow: F) -> ApiResult<T>
where
    F: Future<Output = ServiceResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::spawn(flow)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(result?)
}

pub async fn list_deployments(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<DeploymentView>>> {
    let deployments = state
        .orchestrator
        .list(None, &cluster, page.start, page.count)
        .await?;
    Ok(Json(deployments))
}

/// Create a deployment and roll out its initial targets
pub async fn create_deployment(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
    Json(request): Json<CreateDeploymentRequest>,
) -> ApiResult<(StatusCode, Json<DeploymentView>)> {
    let orchestrator = state.orchestrator.clone();
    let cluster_name = cluster.clone();
    let view = detached(async move {
        orchestrator
            .create_deployment(None, &cluster_name, request)
            .await
    })
    .await?;

    tracing::info!(
        cluster = %cluster,
        deployment_id = %view.deployment.id,
        "Created deployment"
    );
    Ok((StatusCode::CREATED, Json(view)))
}

/// Deployment with its active revision and that revision's targets
pub async fn get_deployment(
    State(state): State<AppState>,
    Path(path): Path<DeploymentPath>,
) -> ApiResult<Json<DeploymentView>> {
    let view = state
        .orchestrator
        .get(None, &path.cluster, &path.namespace, &path.name)
        .await?;
    Ok(Json(view))
}

pub async fn update_deployment(
    State(state): State<AppState>,
    Path(path): Path<DeploymentPath>,
    Json(request): Json<UpdateDeploymentRequest>,
) -> ApiResult<Json<DeploymentView>> {
    let orchestrator = state.orchestrator.clone();
    let view = detached(async move {
        orchestrator
            .update_deployment(None, &path.cluster, &path.namespace, &path.name, request)
            .await
    })
    .await?;
    Ok(Json(view))
}

pub async fn delete_deployment(
    State(state): State<AppState>,
    Path(path): Path<DeploymentPath>,
) -> ApiResult<StatusCode> {
    state
        .orchestrator
        .delete(None, &path.cluster, &path.namespace, &path.name)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_revisions(
    State(state): State<AppState>,
    Path(path): Path<DeploymentPath>,
) -> ApiResult<Json<Vec<RevisionView>>> {
    let revisions = state
        .orchestrator
        .revisions(None, &path.cluster, &path.namespace, &path.name)
        .await?;
    Ok(Json(revisions))
}

pub async fn terminate_deployment(
    State(state): State<AppState>,
    Path(path): Path<DeploymentPath>,
) -> ApiResult<Json<DeploymentView>> {
    let orchestrator = state.orchestrator.clone();
    let view = detached(async move {
        orchestrator
            .terminate(None, &path.cluster, &path.namespace, &path.name)
            .await
    })
    .await?;
    Ok(Json(view))
}

pub async fn sync_status(
    State(state): State<AppState>,
    Path(path): Path<DeploymentPath>,
) -> ApiResult<Json<DeploymentView>> {
    let view = state
        .orchestrator
        .sync_status(None, &path.cluster, &path.namespace, &path.name)
        .await?;
    Ok(Json(view))
}
