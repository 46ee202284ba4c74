//! Transaction scoping for request flows
//!
//! A top-level flow opens a scope; any flow it calls joins that scope instead
//! of opening its own, so nested calls commit or roll back together.

use crate::error::StorageError;
use crate::storage::{Database, StorageResult, Transaction};
use std::sync::Arc;
use tracing::warn;

/// Hands out transaction scopes
#[derive(Clone)]
pub struct TransactionCoordinator {
    db: Arc<dyn Database>,
}

impl TransactionCoordinator {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Join `outer` if present, otherwise start a new transaction
    pub async fn begin<'a>(
        &self,
        outer: Option<&'a mut dyn Transaction>,
    ) -> StorageResult<TxScope<'a>> {
        match outer {
            Some(tx) => Ok(TxScope::Joined(tx)),
            None => Ok(TxScope::Owned(self.db.begin().await?)),
        }
    }
}

/// A transaction a flow is running in
pub enum TxScope<'a> {
    /// Started by this flow; `finish` ends it
    Owned(Box<dyn Transaction>),
    /// Borrowed from the caller; the caller ends it
    Joined(&'a mut dyn Transaction),
}

impl<'a> TxScope<'a> {
    pub fn tx(&mut self) -> &mut dyn Transaction {
        match self {
            TxScope::Owned(tx) => tx.as_mut(),
            TxScope::Joined(tx) => &mut **tx,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, TxScope::Owned(_))
    }

    /// Commit on `Ok`, roll back on `Err`. A joined scope is left alone.
    ///
    /// A failed commit turns `Ok` into the storage error.
    pub async fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E>
    where
        E: From<StorageError> + std::fmt::Display,
    {
        let tx = match self {
            TxScope::Joined(_) => return result,
            TxScope::Owned(tx) => tx,
        };

        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                warn!(error = %err, "Rolling back transaction");
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::storage::{InMemoryDatabase, Tables};
    use strata_types::NewCluster;

    fn cluster(name: &str) -> NewCluster {
        NewCluster {
            name: name.to_string(),
            description: String::new(),
            kube_config: String::new(),
        }
    }

    #[tokio::test]
    async fn test_owned_scope_commits_on_ok() {
        let db = InMemoryDatabase::new();
        let coordinator = TransactionCoordinator::new(Arc::new(db.clone()));

        let mut scope = coordinator.begin(None).await.unwrap();
        assert!(scope.is_owned());
        let result: Result<_, ServiceError> = scope
            .tx()
            .insert_cluster(cluster("c1"))
            .await
            .map_err(Into::into);
        scope.finish(result).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        assert!(tx.get_cluster_by_name("c1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_owned_scope_rolls_back_on_err() {
        let db = InMemoryDatabase::new();
        let coordinator = TransactionCoordinator::new(Arc::new(db.clone()));

        let mut scope = coordinator.begin(None).await.unwrap();
        scope.tx().insert_cluster(cluster("c1")).await.unwrap();
        let result: Result<(), ServiceError> =
            Err(ServiceError::InvalidState("boom".to_string()));
        assert!(scope.finish(result).await.is_err());

        assert_eq!(db.snapshot().await, Tables::default());
    }

    #[tokio::test]
    async fn test_joined_scope_leaves_outer_open() {
        let db = InMemoryDatabase::new();
        let coordinator = TransactionCoordinator::new(Arc::new(db.clone()));

        let mut outer = coordinator.begin(None).await.unwrap();
        {
            let mut inner = coordinator.begin(Some(outer.tx())).await.unwrap();
            assert!(!inner.is_owned());
            inner.tx().insert_cluster(cluster("c1")).await.unwrap();
            let result: Result<(), ServiceError> =
                Err(ServiceError::InvalidState("inner failure".to_string()));
            assert!(inner.finish(result).await.is_err());
        }

        // Inner error did not end the outer transaction.
        assert!(outer
            .tx()
            .get_cluster_by_name("c1")
            .await
            .unwrap()
            .is_some());
        outer.finish(Ok::<_, ServiceError>(())).await.unwrap();

        assert_eq!(db.snapshot().await.clusters_len(), 1);
    }

    #[tokio::test]
    async fn test_panic_discards_writes() {
        let db = InMemoryDatabase::new();
        let coordinator = TransactionCoordinator::new(Arc::new(db.clone()));

        let handle = tokio::spawn(async move {
            let mut scope = coordinator.begin(None).await.unwrap();
            scope.tx().insert_cluster(cluster("c1")).await.unwrap();
            panic!("flow panicked mid-transaction");
        });
        assert!(handle.await.unwrap_err().is_panic());

        assert_eq!(db.snapshot().await, Tables::default());
    }
}
