//! Application state for API handlers

use crate::reconciler::Reconciler;
use crate::services::{ClusterDirectory, RevisionOrchestrator};
use crate::storage::Database;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Deployment flows
    pub orchestrator: Arc<RevisionOrchestrator>,

    /// Storage backend, for readiness checks
    pub db: Arc<dyn Database>,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: Arc<dyn Database>, reconciler: Arc<dyn Reconciler>) -> Self {
        Self {
            orchestrator: Arc::new(RevisionOrchestrator::new(db.clone(), reconciler)),
            db,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn clusters(&self) -> &ClusterDirectory {
        self.orchestrator.clusters()
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let secs = (Utc::now() - self.started_at).num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
