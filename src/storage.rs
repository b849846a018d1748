//! SQLite storage layer for EcoCode.
//!
//! Records are append-only. The schema keeps:
//!
//! - `seq`: insertion order, used to break ties between records captured in
//!   the same microsecond
//! - `id`: the public UUID identifier
//! - `captured_at`: UTC capture time in microseconds since the epoch
//! - `additional_data`: free-form key/value metadata as JSON text
//!
//! Every `sqlx::Error` surfaces as [`MetricError::StorageUnavailable`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Row};

use crate::error::Result;
use crate::model::{CarbonScore, EndpointEmissions, MetricFilter, MetricRecord};

/// Raw sums over the whole collection, before unit conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CollectionTotals {
    pub energy_wh: f64,
    pub co2_grams: f64,
    pub requests: i64,
    pub records: i64,
    /// Mean score ordinal (A = 1 .. E = 5), 0 when empty.
    pub average_score: f64,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:ecocode.db" or "sqlite::memory:")
    /// * `max_connections` - Upper bound on pooled connections
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Create the database schema if it doesn't exist.
    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metric_records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                application_name TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                environment TEXT NOT NULL,
                version TEXT,
                cpu_usage_percent REAL NOT NULL,
                memory_used_mb INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                request_count INTEGER NOT NULL,
                operation_type TEXT NOT NULL,
                energy_consumed_wh REAL NOT NULL,
                emissions_co2_grams REAL NOT NULL,
                carbon_score TEXT NOT NULL,
                captured_at INTEGER NOT NULL,
                additional_data TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Newest-first listing
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_metric_records_captured_at
            ON metric_records(captured_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Listing filtered by application
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_metric_records_app_captured_at
            ON metric_records(application_name, captured_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Per-endpoint rollups
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_metric_records_endpoint
            ON metric_records(endpoint)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a fully computed record.
    pub async fn insert_record(&self, record: &MetricRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO metric_records (
                id, application_name, endpoint, environment, version,
                cpu_usage_percent, memory_used_mb, duration_ms, request_count,
                operation_type, energy_consumed_wh, emissions_co2_grams,
                carbon_score, captured_at, additional_data
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.application_name)
        .bind(&record.endpoint)
        .bind(&record.environment)
        .bind(&record.version)
        .bind(record.cpu_usage_percent)
        .bind(record.memory_used_mb)
        .bind(record.duration_ms)
        .bind(record.request_count)
        .bind(&record.operation_type)
        .bind(record.energy_consumed_wh)
        .bind(record.emissions_co2_grams)
        .bind(record.carbon_score.as_str())
        .bind(record.captured_at.timestamp_micros())
        .bind(record.additional_data.clone().map(Json))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch one page of records matching `filter`, newest first.
    ///
    /// # Arguments
    ///
    /// * `filter` - Conjunctive filter; absent fields impose no constraint
    /// * `offset` - Number of matching records to skip
    /// * `limit` - Maximum number of records to return
    pub async fn query_records(
        &self,
        filter: &MetricFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<MetricRecord>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT id, application_name, endpoint, environment, version,
                   cpu_usage_percent, memory_used_mb, duration_ms, request_count,
                   operation_type, energy_consumed_wh, emissions_co2_grams,
                   carbon_score, captured_at, additional_data
            FROM metric_records
            WHERE 1 = 1
            "#,
        );

        if let Some(application) = &filter.application {
            query.push(" AND application_name = ").push_bind(application);
        }
        if let Some(environment) = &filter.environment {
            query.push(" AND environment = ").push_bind(environment);
        }
        if let Some(start) = filter.start_time {
            query
                .push(" AND captured_at >= ")
                .push_bind(start.timestamp_micros());
        }
        if let Some(end) = filter.end_time {
            query
                .push(" AND captured_at <= ")
                .push_bind(end.timestamp_micros());
        }

        query
            .push(" ORDER BY captured_at DESC, seq DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = query.build().fetch_all(&self.pool).await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Get every distinct application name ever recorded, sorted.
    pub async fn get_distinct_applications(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT application_name
            FROM metric_records
            ORDER BY application_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("application_name")).collect())
    }

    /// Sum energy, emissions and requests and average the scores.
    ///
    /// # Returns
    ///
    /// All-zero totals when no records exist.
    pub async fn compute_totals(&self) -> Result<CollectionTotals> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(energy_consumed_wh), 0.0) AS energy_wh,
                COALESCE(SUM(emissions_co2_grams), 0.0) AS co2_grams,
                COALESCE(SUM(request_count), 0) AS requests,
                COUNT(*) AS records,
                COALESCE(AVG(CASE carbon_score
                    WHEN 'A' THEN 1.0
                    WHEN 'B' THEN 2.0
                    WHEN 'C' THEN 3.0
                    WHEN 'D' THEN 4.0
                    WHEN 'E' THEN 5.0
                END), 0.0) AS average_score
            FROM metric_records
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CollectionTotals {
            energy_wh: row.try_get("energy_wh")?,
            co2_grams: row.try_get("co2_grams")?,
            requests: row.try_get("requests")?,
            records: row.try_get("records")?,
            average_score: row.try_get("average_score")?,
        })
    }

    /// Rank endpoints by cumulative emissions, highest first.
    ///
    /// Ties are broken by endpoint name so the order is stable.
    pub async fn rank_endpoints(&self, limit: i64) -> Result<Vec<EndpointEmissions>> {
        let rows = sqlx::query(
            r#"
            SELECT endpoint,
                   SUM(emissions_co2_grams) AS total_co2,
                   SUM(energy_consumed_wh) AS total_energy,
                   SUM(request_count) AS total_requests,
                   COUNT(*) AS record_count
            FROM metric_records
            GROUP BY endpoint
            ORDER BY total_co2 DESC, endpoint ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<EndpointEmissions> {
                Ok(EndpointEmissions {
                    endpoint: row.try_get("endpoint")?,
                    total_emissions_co2_grams: row.try_get("total_co2")?,
                    total_energy_wh: row.try_get("total_energy")?,
                    total_requests: row.try_get("total_requests")?,
                    record_count: row.try_get("record_count")?,
                })
            })
            .collect()
    }

    /// Delete every record and return how many were removed.
    pub async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM metric_records")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Close the pool. Every later operation fails with `StorageUnavailable`.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn record_from_row(row: &SqliteRow) -> Result<MetricRecord> {
    let score: String = row.try_get("carbon_score")?;
    let carbon_score = CarbonScore::parse(&score).ok_or_else(|| {
        sqlx::Error::Decode(format!("unknown carbon score '{score}'").into())
    })?;

    let micros: i64 = row.try_get("captured_at")?;
    let captured_at = DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| {
        sqlx::Error::Decode(format!("capture time {micros} out of range").into())
    })?;

    let additional_data: Option<Json<BTreeMap<String, String>>> =
        row.try_get("additional_data")?;

    Ok(MetricRecord {
        id: row.try_get("id")?,
        application_name: row.try_get("application_name")?,
        endpoint: row.try_get("endpoint")?,
        environment: row.try_get("environment")?,
        version: row.try_get("version")?,
        cpu_usage_percent: row.try_get("cpu_usage_percent")?,
        memory_used_mb: row.try_get("memory_used_mb")?,
        duration_ms: row.try_get("duration_ms")?,
        request_count: row.try_get("request_count")?,
        operation_type: row.try_get("operation_type")?,
        energy_consumed_wh: row.try_get("energy_consumed_wh")?,
        emissions_co2_grams: row.try_get("emissions_co2_grams")?,
        carbon_score,
        captured_at,
        additional_data: additional_data.map(|Json(map)| map),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetricError;
    use chrono::Duration;

    async fn setup_test_storage() -> Storage {
        Storage::new("sqlite::memory:", 1).await.unwrap()
    }

    fn record(app: &str, endpoint: &str, co2: f64, captured_at: DateTime<Utc>) -> MetricRecord {
        MetricRecord {
            id: uuid::Uuid::new_v4().to_string(),
            application_name: app.to_string(),
            endpoint: endpoint.to_string(),
            environment: "production".to_string(),
            version: Some("1.0.0".to_string()),
            cpu_usage_percent: 50.0,
            memory_used_mb: 500,
            duration_ms: 200,
            request_count: 2,
            operation_type: "Query".to_string(),
            energy_consumed_wh: co2 / 0.0385,
            emissions_co2_grams: co2,
            carbon_score: CarbonScore::classify(co2 / 2.0),
            captured_at,
            additional_data: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_query() {
        let storage = setup_test_storage().await;
        let now = Utc::now();

        let mut original = record("shop", "/cart", 0.01, now);
        original.additional_data = Some(BTreeMap::from([(
            "region".to_string(),
            "eu-west".to_string(),
        )]));
        storage.insert_record(&original).await.unwrap();

        let rows = storage
            .query_records(&MetricFilter::default(), 0, 10)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        let stored = &rows[0];
        assert_eq!(stored.id, original.id);
        assert_eq!(stored.version.as_deref(), Some("1.0.0"));
        assert_eq!(stored.carbon_score, original.carbon_score);
        assert_eq!(
            stored.captured_at.timestamp_micros(),
            now.timestamp_micros()
        );
        assert_eq!(
            stored
                .additional_data
                .as_ref()
                .and_then(|m| m.get("region"))
                .map(String::as_str),
            Some("eu-west")
        );
    }

    #[tokio::test]
    async fn test_query_orders_newest_first_and_filters() {
        let storage = setup_test_storage().await;
        let now = Utc::now();

        for i in 0..4 {
            let app = if i % 2 == 0 { "shop" } else { "blog" };
            storage
                .insert_record(&record(app, "/x", 0.01, now - Duration::minutes(i)))
                .await
                .unwrap();
        }

        let all = storage
            .query_records(&MetricFilter::default(), 0, 10)
            .await
            .unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].captured_at >= w[1].captured_at));

        let filter = MetricFilter {
            application: Some("shop".to_string()),
            start_time: Some(now - Duration::minutes(2)),
            end_time: Some(now),
            ..Default::default()
        };
        let shop = storage.query_records(&filter, 0, 10).await.unwrap();
        assert_eq!(shop.len(), 2);
        assert!(shop.iter().all(|r| r.application_name == "shop"));
    }

    #[tokio::test]
    async fn test_totals_and_ranking() {
        let storage = setup_test_storage().await;

        let empty = storage.compute_totals().await.unwrap();
        assert_eq!(empty, CollectionTotals::default());
        assert!(storage.rank_endpoints(5).await.unwrap().is_empty());

        let now = Utc::now();
        storage
            .insert_record(&record("shop", "/cart", 0.5, now))
            .await
            .unwrap();
        storage
            .insert_record(&record("shop", "/search", 0.2, now))
            .await
            .unwrap();
        storage
            .insert_record(&record("blog", "/search", 0.4, now))
            .await
            .unwrap();

        let totals = storage.compute_totals().await.unwrap();
        assert_eq!(totals.records, 3);
        assert_eq!(totals.requests, 6);
        assert!((totals.co2_grams - 1.1).abs() < 1e-9);

        let ranking = storage.rank_endpoints(5).await.unwrap();
        assert_eq!(ranking[0].endpoint, "/search");
        assert_eq!(ranking[0].record_count, 2);
        assert_eq!(ranking[1].endpoint, "/cart");
    }

    #[tokio::test]
    async fn test_delete_all_reports_count() {
        let storage = setup_test_storage().await;
        let now = Utc::now();

        for _ in 0..3 {
            storage
                .insert_record(&record("shop", "/cart", 0.01, now))
                .await
                .unwrap();
        }

        assert_eq!(storage.delete_all().await.unwrap(), 3);
        assert_eq!(storage.delete_all().await.unwrap(), 0);
        assert!(storage.get_distinct_applications().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable_not_empty() {
        let storage = setup_test_storage().await;
        storage
            .insert_record(&record("shop", "/cart", 0.01, Utc::now()))
            .await
            .unwrap();

        storage.pool.close().await;

        assert!(matches!(
            storage.query_records(&MetricFilter::default(), 0, 10).await,
            Err(MetricError::StorageUnavailable(_))
        ));
        assert!(matches!(
            storage.compute_totals().await,
            Err(MetricError::StorageUnavailable(_))
        ));
        assert!(matches!(
            storage.delete_all().await,
            Err(MetricError::StorageUnavailable(_))
        ));
        assert!(matches!(
            storage.get_distinct_applications().await,
            Err(MetricError::StorageUnavailable(_))
        ));
    }
}
