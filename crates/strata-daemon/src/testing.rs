//! In-process reconciler for unit tests

use crate::reconciler::{Reconciler, ReconcilerError, ReconcilerResult};
use async_trait::async_trait;
use std::sync::Mutex;
use strata_types::{Deployment, DeploymentTarget, TargetId};

/// One reconciler invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create {
        target: TargetId,
        artifact_tag: String,
    },
    Delete {
        target: TargetId,
        kube_deployment_id: String,
        kube_request_id: String,
    },
}

/// Records every call in order and hands out `dep-<id>` / `req-<id>` handles
#[derive(Debug, Default)]
pub struct RecordingReconciler {
    calls: Mutex<Vec<Call>>,
    fail_create_at: Option<usize>,
    fail_deletes: bool,
}

impl RecordingReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`-th create call (1-based)
    pub fn fail_create_at(mut self, n: usize) -> Self {
        self.fail_create_at = Some(n);
        self
    }

    pub fn fail_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn creates(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Create { .. }))
            .count()
    }

    pub fn deletes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Delete { .. }))
            .count()
    }
}

#[async_trait]
impl Reconciler for RecordingReconciler {
    async fn create(
        &self,
        _deployment: &Deployment,
        target: &mut DeploymentTarget,
    ) -> ReconcilerResult<()> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call::Create {
                target: target.id,
                artifact_tag: target.artifact_tag.clone(),
            });
            calls
                .iter()
                .filter(|c| matches!(c, Call::Create { .. }))
                .count()
        };

        if self.fail_create_at == Some(attempt) {
            return Err(ReconcilerError::Status {
                status: 500,
                body: format!("create #{} rejected", attempt),
            });
        }

        target.kube_deployment_id = format!("dep-{}", target.id);
        target.kube_request_id = format!("req-{}", target.id);
        Ok(())
    }

    async fn delete(&self, target: &DeploymentTarget) -> ReconcilerResult<()> {
        self.calls.lock().unwrap().push(Call::Delete {
            target: target.id,
            kube_deployment_id: target.kube_deployment_id.clone(),
            kube_request_id: target.kube_request_id.clone(),
        });

        if self.fail_deletes {
            return Err(ReconcilerError::Status {
                status: 503,
                body: "delete rejected".to_string(),
            });
        }
        Ok(())
    }
}
