//! Cluster handlers

use super::Pagination;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use strata_types::{Cluster, ClusterPatch, NewCluster};

/// Create cluster request
#[derive(Debug, Deserialize)]
pub struct CreateClusterRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kube_config: String,
}

/// Update cluster request; absent fields are left unchanged
#[derive(Debug, Deserialize)]
pub struct UpdateClusterRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub kube_config: Option<String>,
}

pub async fn list_clusters(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Cluster>>> {
    let clusters = state.clusters().list(None, page.start, page.count).await?;
    Ok(Json(clusters))
}

pub async fn create_cluster(
    State(state): State<AppState>,
    Json(request): Json<CreateClusterRequest>,
) -> ApiResult<(StatusCode, Json<Cluster>)> {
    let cluster = state
        .clusters()
        .create(
            None,
            NewCluster {
                name: request.name,
                description: request.description,
                kube_config: request.kube_config,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(cluster)))
}

pub async fn get_cluster(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
) -> ApiResult<Json<Cluster>> {
    Ok(Json(state.clusters().get_by_name(None, &cluster).await?))
}

pub async fn update_cluster(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
    Json(request): Json<UpdateClusterRequest>,
) -> ApiResult<Json<Cluster>> {
    let patch = ClusterPatch {
        description: request.description,
        kube_config: request.kube_config,
    };
    Ok(Json(state.clusters().update(None, &cluster, patch).await?))
}
