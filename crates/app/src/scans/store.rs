//! Durable scan store.

use async_trait::async_trait;
use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use mockall::automock;
use sqlx::{FromRow, PgPool, Row, postgres::PgRow, query, query_as};
use thiserror::Error;
use uuid::Uuid;
use veritag::ids::{BatchUuid, ProductUuid, TagUuid};

use crate::scans::models::ScanResult;

const GET_SCAN_BY_TAG_ID_SQL: &str = include_str!("sql/get_scan_by_tag_id.sql");
const UPDATE_FIRST_SCAN_AND_COUNT_SQL: &str = include_str!("sql/update_first_scan_and_count.sql");
const INCREMENT_SCAN_COUNT_SQL: &str = include_str!("sql/increment_scan_count.sql");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error")]
    Sql(#[from] sqlx::Error),
}

/// Source of truth for scan rows.
#[automock]
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Fetch the row for a tag. An unknown tag is `Ok(None)`.
    async fn get_by_tag_id(&self, tag_id: TagUuid) -> Result<Option<ScanResult>, StoreError>;

    /// Record the first scan instant together with the new count.
    async fn update_first_scan_and_count(
        &self,
        tag_id: TagUuid,
        first_scan_at: Timestamp,
        scan_count: i64,
    ) -> Result<(), StoreError>;

    async fn increment_scan_count(&self, tag_id: TagUuid) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgScanStore {
    pool: PgPool,
}

impl PgScanStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScanStore for PgScanStore {
    async fn get_by_tag_id(&self, tag_id: TagUuid) -> Result<Option<ScanResult>, StoreError> {
        let result = query_as::<_, ScanResult>(GET_SCAN_BY_TAG_ID_SQL)
            .bind(tag_id.into_uuid())
            .fetch_optional(&self.pool)
            .await?;

        Ok(result)
    }

    async fn update_first_scan_and_count(
        &self,
        tag_id: TagUuid,
        first_scan_at: Timestamp,
        scan_count: i64,
    ) -> Result<(), StoreError> {
        query(UPDATE_FIRST_SCAN_AND_COUNT_SQL)
            .bind(tag_id.into_uuid())
            .bind(SqlxTimestamp::from(first_scan_at))
            .bind(scan_count)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn increment_scan_count(&self, tag_id: TagUuid) -> Result<(), StoreError> {
        query(INCREMENT_SCAN_COUNT_SQL)
            .bind(tag_id.into_uuid())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        query("SELECT 1").execute(&self.pool).await?;

        Ok(())
    }
}

impl<'r> FromRow<'r, PgRow> for ScanResult {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            tag_id: TagUuid::from_uuid(row.try_get::<Uuid, _>("tag_id")?),
            product_id: ProductUuid::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            batch_id: BatchUuid::from_uuid(row.try_get::<Uuid, _>("batch_id")?),
            first_scan_at: row
                .try_get::<Option<SqlxTimestamp>, _>("first_scan_at")?
                .map(SqlxTimestamp::to_jiff),
            scan_count: row.try_get("scan_count")?,
            valid: row.try_get("valid")?,
        })
    }
}
