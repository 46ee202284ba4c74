//! Storage layer for strata-daemon
//!
//! Provides transactional storage for clusters, deployments, revisions and
//! targets.

mod memory;
mod postgres;
mod traits;

pub use memory::{InMemoryDatabase, InMemoryTransaction};
pub use postgres::{PostgresDatabase, PostgresTransaction};
pub use traits::{
    ClusterStorage, Database, DeploymentStorage, RevisionFilter, RevisionStorage, StorageResult,
    TargetFilter, TargetStorage, Transaction,
};

#[cfg(test)]
pub(crate) use memory::Tables;
