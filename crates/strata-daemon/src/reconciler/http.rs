//! HTTP reconciler client

use super::{
    artifact_request, serving_instance_request, CreateResourceRequest, Reconciler,
    ReconcilerError, ReconcilerResult, ResourceResponse,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use strata_types::{Deployment, DeploymentTarget};
use tracing::{debug, warn};

/// Talks to the reconciler's `/v1/deployments` API
#[derive(Debug, Clone)]
pub struct HttpReconciler {
    client: Client,
    base_url: String,
}

impl HttpReconciler {
    /// `base_url` is the scheme, host and port, e.g. `http://reconciler:7070`.
    ///
    /// Calls carry no timeout; a call in flight is never abandoned.
    pub fn new(base_url: impl Into<String>) -> ReconcilerResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ReconcilerError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn create_resource(
        &self,
        request: &CreateResourceRequest,
    ) -> ReconcilerResult<ResourceResponse> {
        debug!(
            name = %request.name,
            namespace = %request.namespace,
            kind = ?request.kind,
            "Creating reconciler resource"
        );

        let response = self
            .client
            .post(format!("{}/v1/deployments", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| ReconcilerError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ReconcilerError::Transport(e.to_string()))?;

        if status != StatusCode::OK {
            return Err(ReconcilerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ReconcilerError::Decode(e.to_string()))
    }

    async fn delete_resource(&self, id: &str) -> ReconcilerResult<()> {
        debug!(resource_id = %id, "Deleting reconciler resource");

        let response = self
            .client
            .delete(format!("{}/v1/deployments/{}", self.base_url, id))
            .send()
            .await
            .map_err(|e| ReconcilerError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ReconcilerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Reconciler for HttpReconciler {
    async fn create(
        &self,
        deployment: &Deployment,
        target: &mut DeploymentTarget,
    ) -> ReconcilerResult<()> {
        let serving = self
            .create_resource(&serving_instance_request(deployment, target))
            .await?;

        let artifact = match self
            .create_resource(&artifact_request(deployment, target))
            .await
        {
            Ok(artifact) => artifact,
            Err(err) => {
                if let Err(cleanup) = self.delete_resource(&serving.id).await {
                    warn!(
                        resource_id = %serving.id,
                        error = %cleanup,
                        "Failed to remove serving instance after artifact request failed"
                    );
                }
                return Err(err);
            }
        };

        target.kube_deployment_id = serving.id;
        target.kube_request_id = artifact.id;
        Ok(())
    }

    async fn delete(&self, target: &DeploymentTarget) -> ReconcilerResult<()> {
        if !target.kube_deployment_id.is_empty() {
            self.delete_resource(&target.kube_deployment_id).await?;
        }
        if !target.kube_request_id.is_empty() {
            self.delete_resource(&target.kube_request_id).await?;
        }
        Ok(())
    }
}
