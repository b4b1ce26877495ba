//! Postgres-backed cluster registry.

use async_trait::async_trait;
use fleet_id::ClusterId;
use sqlx::PgPool;
use tracing::{debug, instrument};

use super::DbError;
use crate::cluster::{
    Cluster, ClusterStatus, FindClusterCriteria, KafkaInstanceCount, StreamingUnitCount,
    StreamingUnitCountPerClusterList,
};
use crate::error::{ServiceError, ServiceResult};
use crate::registry::ClusterRegistry;

const CLUSTER_COLUMNS: &str = "cluster_id, provider, region, multi_az, status, \
     supported_instance_type, dynamic_capacity_info";

const CRITERIA_FILTER: &str = "provider = $1 AND region = $2 AND multi_az = $3 AND status = $4 \
     AND $5 = ANY(string_to_array(supported_instance_type, ','))";

/// Workload statuses that no longer hold capacity.
const RELEASED_STATUSES: [&str; 2] = ["deleting", "failed"];

/// Cluster registry over the `clusters` and `kafka_requests` tables.
#[derive(Debug, Clone)]
pub struct PgClusterRegistry {
    pool: PgPool,
}

impl PgClusterRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a cluster or overwrite the stored one.
    pub async fn upsert_cluster(&self, cluster: &Cluster) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO clusters (cluster_id, provider, region, multi_az, status,
                                  supported_instance_type, dynamic_capacity_info)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (cluster_id) DO UPDATE SET
                provider = EXCLUDED.provider,
                region = EXCLUDED.region,
                multi_az = EXCLUDED.multi_az,
                status = EXCLUDED.status,
                supported_instance_type = EXCLUDED.supported_instance_type,
                dynamic_capacity_info = EXCLUDED.dynamic_capacity_info,
                updated_at = now()
            "#,
        )
        .bind(cluster.cluster_id.as_str())
        .bind(&cluster.provider)
        .bind(&cluster.region)
        .bind(cluster.multi_az)
        .bind(cluster.status.as_str())
        .bind(cluster.supported_instance_type_list())
        .bind(&cluster.dynamic_capacity_info)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;
        Ok(())
    }

    /// Last compute-node count requested for a cluster.
    pub async fn compute_nodes(&self, cluster_id: &ClusterId) -> Result<Option<i32>, DbError> {
        let nodes: Option<Option<i32>> =
            sqlx::query_scalar("SELECT compute_nodes FROM clusters WHERE cluster_id = $1")
                .bind(cluster_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(DbError::Query)?;
        Ok(nodes.flatten())
    }
}

#[async_trait]
impl ClusterRegistry for PgClusterRegistry {
    #[instrument(skip(self))]
    async fn find_cluster(&self, criteria: &FindClusterCriteria) -> ServiceResult<Option<Cluster>> {
        let sql = format!(
            "SELECT {CLUSTER_COLUMNS} FROM clusters WHERE {CRITERIA_FILTER} \
             ORDER BY created_at, cluster_id LIMIT 1"
        );
        let row: Option<ClusterRow> = bind_criteria(sqlx::query_as(&sql), criteria)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(row.map(ClusterRow::into_cluster).transpose()?)
    }

    #[instrument(skip(self))]
    async fn find_all_clusters(&self, criteria: &FindClusterCriteria) -> ServiceResult<Vec<Cluster>> {
        let sql = format!(
            "SELECT {CLUSTER_COLUMNS} FROM clusters WHERE {CRITERIA_FILTER} \
             ORDER BY created_at, cluster_id"
        );
        let rows: Vec<ClusterRow> = bind_criteria(sqlx::query_as(&sql), criteria)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)?;
        let clusters = rows
            .into_iter()
            .map(ClusterRow::into_cluster)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = clusters.len(), "Found candidate clusters");
        Ok(clusters)
    }

    async fn find_kafka_instance_count(
        &self,
        cluster_ids: &[ClusterId],
    ) -> ServiceResult<Vec<KafkaInstanceCount>> {
        if cluster_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<&str> = cluster_ids.iter().map(ClusterId::as_str).collect();

        let rows: Vec<InstanceCountRow> = sqlx::query_as(
            r#"
            SELECT cluster_id, COUNT(*)::INTEGER AS count
            FROM kafka_requests
            WHERE cluster_id = ANY($1) AND status <> ALL($2)
            GROUP BY cluster_id
            "#,
        )
        .bind(&ids)
        .bind(&RELEASED_STATUSES[..])
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        rows.into_iter()
            .map(|row| -> ServiceResult<KafkaInstanceCount> {
                Ok(KafkaInstanceCount {
                    cluster_id: parse_cluster_id(&row.cluster_id)?,
                    count: row.count,
                })
            })
            .collect()
    }

    async fn find_streaming_unit_count_by_cluster_and_instance_type(
        &self,
    ) -> ServiceResult<StreamingUnitCountPerClusterList> {
        let rows: Vec<StreamingUnitRow> = sqlx::query_as(
            r#"
            SELECT cluster_id, instance_type, COALESCE(SUM(streaming_units), 0)::INTEGER AS count
            FROM kafka_requests
            WHERE cluster_id IS NOT NULL AND status <> ALL($1)
            GROUP BY cluster_id, instance_type
            "#,
        )
        .bind(&RELEASED_STATUSES[..])
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        let counts = rows
            .into_iter()
            .map(|row| -> Result<StreamingUnitCount, DbError> {
                Ok(StreamingUnitCount {
                    cluster_id: parse_cluster_id(&row.cluster_id)?,
                    instance_type: row.instance_type,
                    count: row.count,
                })
            })
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(StreamingUnitCountPerClusterList(counts))
    }

    #[instrument(skip(self), fields(cluster_id = %cluster_id))]
    async fn set_compute_nodes(&self, cluster_id: &ClusterId, nodes: i32) -> ServiceResult<()> {
        let result = sqlx::query(
            "UPDATE clusters SET compute_nodes = $2, updated_at = now() WHERE cluster_id = $1",
        )
        .bind(cluster_id.as_str())
        .bind(nodes)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found(format!("cluster {cluster_id}")));
        }
        Ok(())
    }

    #[instrument(skip(self, cluster), fields(cluster_id = %cluster.cluster_id))]
    async fn update_status(&self, cluster: &Cluster, status: ClusterStatus) -> ServiceResult<()> {
        let result = sqlx::query(
            "UPDATE clusters SET status = $2, updated_at = now() WHERE cluster_id = $1",
        )
        .bind(cluster.cluster_id.as_str())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found(format!("cluster {}", cluster.cluster_id)));
        }
        Ok(())
    }

    async fn find_cluster_by_id(&self, cluster_id: &ClusterId) -> ServiceResult<Option<Cluster>> {
        let sql = format!("SELECT {CLUSTER_COLUMNS} FROM clusters WHERE cluster_id = $1");
        let row: Option<ClusterRow> = sqlx::query_as(&sql)
            .bind(cluster_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(row.map(ClusterRow::into_cluster).transpose()?)
    }
}

fn bind_criteria<'q, O>(
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
    criteria: &'q FindClusterCriteria,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
    query
        .bind(&criteria.provider)
        .bind(&criteria.region)
        .bind(criteria.multi_az)
        .bind(criteria.status.as_str())
        .bind(&criteria.supported_instance_type)
}

fn parse_cluster_id(raw: &str) -> Result<ClusterId, DbError> {
    ClusterId::parse(raw).map_err(|e| DbError::decode("cluster_id", e))
}

struct ClusterRow {
    cluster_id: String,
    provider: String,
    region: String,
    multi_az: bool,
    status: String,
    supported_instance_type: String,
    dynamic_capacity_info: Option<serde_json::Value>,
}

impl ClusterRow {
    fn into_cluster(self) -> Result<Cluster, DbError> {
        Ok(Cluster {
            cluster_id: parse_cluster_id(&self.cluster_id)?,
            provider: self.provider,
            region: self.region,
            multi_az: self.multi_az,
            status: self
                .status
                .parse()
                .map_err(|e: String| DbError::decode("status", e))?,
            supported_instance_types: Cluster::parse_supported_instance_types(
                &self.supported_instance_type,
            ),
            dynamic_capacity_info: self.dynamic_capacity_info,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ClusterRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            cluster_id: row.try_get("cluster_id")?,
            provider: row.try_get("provider")?,
            region: row.try_get("region")?,
            multi_az: row.try_get("multi_az")?,
            status: row.try_get("status")?,
            supported_instance_type: row.try_get("supported_instance_type")?,
            dynamic_capacity_info: row.try_get("dynamic_capacity_info")?,
        })
    }
}

struct InstanceCountRow {
    cluster_id: String,
    count: i32,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for InstanceCountRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            cluster_id: row.try_get("cluster_id")?,
            count: row.try_get("count")?,
        })
    }
}

struct StreamingUnitRow {
    cluster_id: String,
    instance_type: String,
    count: i32,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StreamingUnitRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            cluster_id: row.try_get("cluster_id")?,
            instance_type: row.try_get("instance_type")?,
            count: row.try_get("count")?,
        })
    }
}
