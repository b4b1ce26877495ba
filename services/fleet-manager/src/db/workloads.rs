//! Postgres-backed queue of workloads awaiting placement.

use async_trait::async_trait;
use fleet_id::{ClusterId, KafkaId};
use sqlx::PgPool;
use tracing::instrument;

use super::DbError;
use crate::cluster::{KafkaRequest, KafkaStatus};
use crate::error::{ServiceError, ServiceResult};
use crate::scheduler::WorkloadQueue;

/// Workload queue over the `kafka_requests` table.
#[derive(Debug, Clone)]
pub struct PgWorkloadQueue {
    pool: PgPool,
}

impl PgWorkloadQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a workload in the accepted state.
    pub async fn enqueue(&self, request: &KafkaRequest) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO kafka_requests (id, cloud_provider, region, multi_az, instance_type,
                                        size_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(request.id.to_string())
        .bind(&request.cloud_provider)
        .bind(&request.region)
        .bind(request.multi_az)
        .bind(&request.instance_type)
        .bind(&request.size_id)
        .bind(KafkaStatus::Accepted.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;
        Ok(())
    }

    /// Move a workload to a new status.
    pub async fn set_status(&self, kafka_id: &KafkaId, status: KafkaStatus) -> Result<(), DbError> {
        sqlx::query("UPDATE kafka_requests SET status = $2, updated_at = now() WHERE id = $1")
            .bind(kafka_id.to_string())
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }
}

#[async_trait]
impl WorkloadQueue for PgWorkloadQueue {
    async fn list_unassigned(&self, limit: usize) -> ServiceResult<Vec<KafkaRequest>> {
        let rows: Vec<KafkaRequestRow> = sqlx::query_as(
            r#"
            SELECT id, cloud_provider, region, multi_az, instance_type, size_id
            FROM kafka_requests
            WHERE status = $1 AND cluster_id IS NULL
            ORDER BY created_at, id
            LIMIT $2
            "#,
        )
        .bind(KafkaStatus::Accepted.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        rows.into_iter()
            .map(|row| row.into_request().map_err(ServiceError::from))
            .collect()
    }

    #[instrument(skip(self), fields(kafka_id = %kafka_id, cluster_id = %cluster_id))]
    async fn assign_cluster(
        &self,
        kafka_id: &KafkaId,
        cluster_id: &ClusterId,
        streaming_units: i32,
    ) -> ServiceResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE kafka_requests
            SET cluster_id = $2, streaming_units = $3, status = $4, updated_at = now()
            WHERE id = $1 AND cluster_id IS NULL
            "#,
        )
        .bind(kafka_id.to_string())
        .bind(cluster_id.as_str())
        .bind(streaming_units)
        .bind(KafkaStatus::Preparing.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::invalid_state(format!(
                "kafka request {kafka_id} is unknown or already placed"
            )));
        }
        Ok(())
    }
}

struct KafkaRequestRow {
    id: String,
    cloud_provider: String,
    region: String,
    multi_az: bool,
    instance_type: String,
    size_id: String,
}

impl KafkaRequestRow {
    fn into_request(self) -> Result<KafkaRequest, DbError> {
        Ok(KafkaRequest {
            id: KafkaId::parse(&self.id).map_err(|e| DbError::decode("id", e))?,
            cloud_provider: self.cloud_provider,
            region: self.region,
            multi_az: self.multi_az,
            instance_type: self.instance_type,
            size_id: self.size_id,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for KafkaRequestRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            id: row.try_get("id")?,
            cloud_provider: row.try_get("cloud_provider")?,
            region: row.try_get("region")?,
            multi_az: row.try_get("multi_az")?,
            instance_type: row.try_get("instance_type")?,
            size_id: row.try_get("size_id")?,
        })
    }
}
