//! Strata daemon library
//!
//! The control plane for model-serving deployments:
//! - REST API handlers
//! - Storage backends and transaction scoping
//! - Deployment revision orchestration
//! - Client for the external reconciler

pub mod api;
pub mod config;
pub mod error;
pub mod reconciler;
pub mod server;
pub mod services;
pub mod storage;
pub mod tx;

#[cfg(test)]
mod testing;

pub use api::rest::router::RouterOptions;
pub use api::rest::AppState;
pub use api::create_router;
pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError, ServiceError, StorageError};
pub use reconciler::{HttpReconciler, Reconciler};
pub use server::Server;
pub use services::RevisionOrchestrator;
pub use storage::{Database, InMemoryDatabase, PostgresDatabase};
