//! PostgreSQL storage implementation

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Postgres, Row};
use std::time::Duration;
use strata_types::{
    Cluster, ClusterId, ClusterPatch, Deployment, DeploymentId, DeploymentRevision,
    DeploymentStatus, DeploymentTarget, NewCluster, NewDeployment, NewTarget, RemoteHandles,
    RevisionId, RevisionStatus, StatusUpdate, TargetConfig, TargetId,
};

/// PostgreSQL-backed storage
#[derive(Debug, Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    /// Connect to PostgreSQL and initialize schema
    pub async fn new(
        url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let storage = Self { pool };
        storage.initialize_schema().await?;
        Ok(storage)
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS clusters (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                kube_config TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS deployments (
                id BIGSERIAL PRIMARY KEY,
                cluster_id BIGINT NOT NULL REFERENCES clusters(id) ON DELETE CASCADE,
                kube_namespace TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                status_syncing_at TIMESTAMPTZ,
                status_updated_at TIMESTAMPTZ,
                kube_deploy_token TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                UNIQUE (cluster_id, kube_namespace, name)
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS deployment_revisions (
                id BIGSERIAL PRIMARY KEY,
                deployment_id BIGINT NOT NULL REFERENCES deployments(id) ON DELETE CASCADE,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS deployment_revisions_deployment_id ON deployment_revisions(deployment_id, status);"#,
            r#"
            CREATE TABLE IF NOT EXISTS deployment_targets (
                id BIGSERIAL PRIMARY KEY,
                deployment_id BIGINT NOT NULL REFERENCES deployments(id) ON DELETE CASCADE,
                revision_id BIGINT NOT NULL REFERENCES deployment_revisions(id) ON DELETE CASCADE,
                artifact_tag TEXT NOT NULL,
                config JSONB NOT NULL,
                kube_deployment_id TEXT NOT NULL DEFAULT '',
                kube_request_id TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS deployment_targets_revision_id ON deployment_targets(revision_id);"#,
            r#"CREATE INDEX IF NOT EXISTS deployment_targets_deployment_id ON deployment_targets(deployment_id);"#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        Ok(())
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    async fn begin(&self) -> StorageResult<Box<dyn Transaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn ping(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}

/// A transaction on one pooled connection
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))
    }
}

fn query_error(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StorageError::Conflict(db.message().to_string());
        }
        if db.is_foreign_key_violation() {
            return StorageError::NotFound(db.message().to_string());
        }
    }
    StorageError::Query(e.to_string())
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> StorageResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(|e| StorageError::Query(e.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, StorageError> {
    serde_json::to_value(value)
        .map_err(|e| StorageError::InvalidData(format!("json serialize error: {}", e)))
}

fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, StorageError> {
    serde_json::from_value(value)
        .map_err(|e| StorageError::InvalidData(format!("json deserialize error: {}", e)))
}

fn parse_status<T: std::str::FromStr>(value: String) -> StorageResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| StorageError::InvalidData(e.to_string()))
}

fn offset(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn cluster_from_row(row: &PgRow) -> StorageResult<Cluster> {
    Ok(Cluster {
        id: ClusterId::new(column(row, "id")?),
        name: column(row, "name")?,
        description: column(row, "description")?,
        kube_config: column(row, "kube_config")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn deployment_from_row(row: &PgRow) -> StorageResult<Deployment> {
    Ok(Deployment {
        id: DeploymentId::new(column(row, "id")?),
        cluster_id: ClusterId::new(column(row, "cluster_id")?),
        kube_namespace: column(row, "kube_namespace")?,
        name: column(row, "name")?,
        description: column(row, "description")?,
        status: parse_status::<DeploymentStatus>(column(row, "status")?)?,
        status_syncing_at: column::<Option<DateTime<Utc>>>(row, "status_syncing_at")?,
        status_updated_at: column::<Option<DateTime<Utc>>>(row, "status_updated_at")?,
        kube_deploy_token: column(row, "kube_deploy_token")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn revision_from_row(row: &PgRow) -> StorageResult<DeploymentRevision> {
    Ok(DeploymentRevision {
        id: RevisionId::new(column(row, "id")?),
        deployment_id: DeploymentId::new(column(row, "deployment_id")?),
        status: parse_status::<RevisionStatus>(column(row, "status")?)?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn target_from_row(row: &PgRow) -> StorageResult<DeploymentTarget> {
    Ok(DeploymentTarget {
        id: TargetId::new(column(row, "id")?),
        deployment_id: DeploymentId::new(column(row, "deployment_id")?),
        revision_id: RevisionId::new(column(row, "revision_id")?),
        artifact_tag: column(row, "artifact_tag")?,
        config: from_json(column(row, "config")?)?,
        kube_deployment_id: column(row, "kube_deployment_id")?,
        kube_request_id: column(row, "kube_request_id")?,
        created_at: column(row, "created_at")?,
    })
}

const DEPLOYMENT_COLUMNS: &str = "id, cluster_id, kube_namespace, name, description, status, \
     status_syncing_at, status_updated_at, kube_deploy_token, created_at, updated_at";

const TARGET_COLUMNS: &str = "t.id, t.deployment_id, t.revision_id, t.artifact_tag, t.config, \
     t.kube_deployment_id, t.kube_request_id, t.created_at";

#[async_trait]
impl ClusterStorage for PostgresTransaction {
    async fn insert_cluster(&mut self, cluster: NewCluster) -> StorageResult<Cluster> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO clusters (name, description, kube_config, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING *
            "#,
        )
        .bind(&cluster.name)
        .bind(&cluster.description)
        .bind(&cluster.kube_config)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(query_error)?;

        cluster_from_row(&row)
    }

    async fn get_cluster(&mut self, id: ClusterId) -> StorageResult<Option<Cluster>> {
        let row = sqlx::query("SELECT * FROM clusters WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(query_error)?;

        row.as_ref().map(cluster_from_row).transpose()
    }

    async fn get_cluster_by_name(&mut self, name: &str) -> StorageResult<Option<Cluster>> {
        let row = sqlx::query("SELECT * FROM clusters WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(query_error)?;

        row.as_ref().map(cluster_from_row).transpose()
    }

    async fn update_cluster(
        &mut self,
        id: ClusterId,
        patch: &ClusterPatch,
    ) -> StorageResult<Cluster> {
        let row = sqlx::query(
            r#"
            UPDATE clusters
            SET description = COALESCE($2, description),
                kube_config = COALESCE($3, kube_config),
                updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.get())
        .bind(patch.description.as_deref())
        .bind(patch.kube_config.as_deref())
        .bind(Utc::now())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(query_error)?
        .ok_or_else(|| StorageError::NotFound(format!("cluster {}", id)))?;

        cluster_from_row(&row)
    }

    async fn list_clusters(&mut self, start: usize, count: usize) -> StorageResult<Vec<Cluster>> {
        let rows = sqlx::query("SELECT * FROM clusters ORDER BY id DESC OFFSET $1 LIMIT $2")
            .bind(offset(start))
            .bind(offset(count))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(query_error)?;

        rows.iter().map(cluster_from_row).collect()
    }
}

#[async_trait]
impl DeploymentStorage for PostgresTransaction {
    async fn insert_deployment(&mut self, deployment: NewDeployment) -> StorageResult<Deployment> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO deployments
                (cluster_id, kube_namespace, name, description, status, kube_deploy_token,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING {}
            "#,
            DEPLOYMENT_COLUMNS
        ))
        .bind(deployment.cluster_id.get())
        .bind(&deployment.kube_namespace)
        .bind(&deployment.name)
        .bind(&deployment.description)
        .bind(DeploymentStatus::NonDeployed.as_str())
        .bind(&deployment.kube_deploy_token)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(query_error)?;

        deployment_from_row(&row)
    }

    async fn get_deployment(&mut self, id: DeploymentId) -> StorageResult<Option<Deployment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM deployments WHERE id = $1",
            DEPLOYMENT_COLUMNS
        ))
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(query_error)?;

        row.as_ref().map(deployment_from_row).transpose()
    }

    async fn get_deployment_by_name(
        &mut self,
        cluster_id: ClusterId,
        kube_namespace: &str,
        name: &str,
    ) -> StorageResult<Option<Deployment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM deployments WHERE cluster_id = $1 AND kube_namespace = $2 AND name = $3",
            DEPLOYMENT_COLUMNS
        ))
        .bind(cluster_id.get())
        .bind(kube_namespace)
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(query_error)?;

        row.as_ref().map(deployment_from_row).transpose()
    }

    async fn lock_deployment(&mut self, id: DeploymentId) -> StorageResult<()> {
        sqlx::query("SELECT id FROM deployments WHERE id = $1 FOR UPDATE")
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(query_error)?
            .ok_or_else(|| StorageError::NotFound(format!("deployment {}", id)))?;
        Ok(())
    }

    async fn update_deployment_status(
        &mut self,
        id: DeploymentId,
        update: &StatusUpdate,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE deployments
            SET status = COALESCE($2, status),
                status_syncing_at = COALESCE($3, status_syncing_at),
                status_updated_at = COALESCE($4, status_updated_at)
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.syncing_at)
        .bind(update.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("deployment {}", id)));
        }
        Ok(())
    }

    async fn update_deployment_description(
        &mut self,
        id: DeploymentId,
        description: &str,
    ) -> StorageResult<()> {
        let result =
            sqlx::query("UPDATE deployments SET description = $2, updated_at = $3 WHERE id = $1")
                .bind(id.get())
                .bind(description)
                .bind(Utc::now())
                .execute(&mut *self.tx)
                .await
                .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("deployment {}", id)));
        }
        Ok(())
    }

    async fn list_deployments(
        &mut self,
        cluster_id: ClusterId,
        start: usize,
        count: usize,
    ) -> StorageResult<Vec<Deployment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM deployments WHERE cluster_id = $1 ORDER BY id DESC OFFSET $2 LIMIT $3",
            DEPLOYMENT_COLUMNS
        ))
        .bind(cluster_id.get())
        .bind(offset(start))
        .bind(offset(count))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(query_error)?;

        rows.iter().map(deployment_from_row).collect()
    }

    async fn delete_deployment(&mut self, id: DeploymentId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM deployments WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RevisionStorage for PostgresTransaction {
    async fn insert_revision(
        &mut self,
        deployment_id: DeploymentId,
        status: RevisionStatus,
    ) -> StorageResult<DeploymentRevision> {
        let row = sqlx::query(
            r#"
            INSERT INTO deployment_revisions (deployment_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            RETURNING *
            "#,
        )
        .bind(deployment_id.get())
        .bind(status.as_str())
        .bind(Utc::now())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(query_error)?;

        revision_from_row(&row)
    }

    async fn list_revisions(
        &mut self,
        filter: &RevisionFilter,
    ) -> StorageResult<Vec<DeploymentRevision>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM deployment_revisions
            WHERE deployment_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY id
            "#,
        )
        .bind(filter.deployment_id.get())
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(query_error)?;

        rows.iter().map(revision_from_row).collect()
    }

    async fn update_revision_status(
        &mut self,
        id: RevisionId,
        status: RevisionStatus,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE deployment_revisions SET status = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id.get())
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("revision {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl TargetStorage for PostgresTransaction {
    async fn insert_target(&mut self, target: NewTarget) -> StorageResult<DeploymentTarget> {
        let config = to_json(&target.config)?;
        let row = sqlx::query(
            r#"
            INSERT INTO deployment_targets
                (deployment_id, revision_id, artifact_tag, config, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(target.deployment_id.get())
        .bind(target.revision_id.get())
        .bind(&target.artifact_tag)
        .bind(config)
        .bind(Utc::now())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(query_error)?;

        target_from_row(&row)
    }

    async fn get_target(&mut self, id: TargetId) -> StorageResult<Option<DeploymentTarget>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM deployment_targets t WHERE t.id = $1",
            TARGET_COLUMNS
        ))
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(query_error)?;

        row.as_ref().map(target_from_row).transpose()
    }

    async fn list_targets(
        &mut self,
        filter: &TargetFilter,
    ) -> StorageResult<Vec<DeploymentTarget>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM deployment_targets t
            JOIN deployment_revisions r ON r.id = t.revision_id
            WHERE ($1::BIGINT IS NULL OR t.deployment_id = $1)
              AND ($2::BIGINT IS NULL OR t.revision_id = $2)
              AND ($3::TEXT IS NULL OR r.status = $3)
            ORDER BY t.id
            "#,
            TARGET_COLUMNS
        ))
        .bind(filter.deployment_id.map(DeploymentId::get))
        .bind(filter.revision_id.map(RevisionId::get))
        .bind(filter.revision_status.map(|s| s.as_str()))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(query_error)?;

        rows.iter().map(target_from_row).collect()
    }

    async fn update_target_config(
        &mut self,
        id: TargetId,
        config: &TargetConfig,
    ) -> StorageResult<()> {
        let result = sqlx::query("UPDATE deployment_targets SET config = $2 WHERE id = $1")
            .bind(id.get())
            .bind(to_json(config)?)
            .execute(&mut *self.tx)
            .await
            .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("target {}", id)));
        }
        Ok(())
    }

    async fn update_target_handles(
        &mut self,
        id: TargetId,
        handles: &RemoteHandles,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE deployment_targets SET kube_deployment_id = $2, kube_request_id = $3 WHERE id = $1",
        )
        .bind(id.get())
        .bind(&handles.kube_deployment_id)
        .bind(&handles.kube_request_id)
        .execute(&mut *self.tx)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("target {}", id)));
        }
        Ok(())
    }
}
