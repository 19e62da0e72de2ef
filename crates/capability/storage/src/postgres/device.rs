//! Postgres 设备存储实现

use crate::error::StorageError;
use crate::models::DeviceRecord;
use crate::traits::DeviceStore;
use crate::validation::ensure_address;
use domain::{DeviceMetadata, DeviceState};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const DEVICE_COLUMNS: &str = "address, name, state, \
    (extract(epoch from last_seen_at) * 1000)::bigint as last_seen_at_ms, \
    metadata::text as metadata, error_count, last_error, \
    (extract(epoch from last_error_at) * 1000)::bigint as last_error_at_ms, \
    active, \
    (extract(epoch from created_at) * 1000)::bigint as created_at_ms, \
    (extract(epoch from updated_at) * 1000)::bigint as updated_at_ms";

pub struct PgDeviceStore {
    pub pool: PgPool,
}

impl PgDeviceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

fn map_device(row: PgRow) -> Result<DeviceRecord, StorageError> {
    let state: String = row.try_get("state")?;
    let state = DeviceState::parse(&state)
        .ok_or_else(|| StorageError::new(format!("unknown device state: {state}")))?;
    let metadata: String = row.try_get("metadata")?;
    let metadata: DeviceMetadata = serde_json::from_str(&metadata)
        .map_err(|err| StorageError::new(format!("invalid device metadata: {err}")))?;
    Ok(DeviceRecord {
        address: row.try_get("address")?,
        name: row.try_get("name")?,
        state,
        last_seen_at_ms: row.try_get("last_seen_at_ms")?,
        metadata,
        error_count: row.try_get("error_count")?,
        last_error: row.try_get("last_error")?,
        last_error_at_ms: row.try_get("last_error_at_ms")?,
        active: row.try_get("active")?,
        created_at_ms: row.try_get("created_at_ms")?,
        updated_at_ms: row.try_get("updated_at_ms")?,
    })
}

fn metadata_json(metadata: &DeviceMetadata) -> Result<String, StorageError> {
    serde_json::to_string(metadata)
        .map_err(|err| StorageError::new(format!("serialize metadata: {err}")))
}

#[async_trait::async_trait]
impl DeviceStore for PgDeviceStore {
    async fn create_device(&self, record: DeviceRecord) -> Result<DeviceRecord, StorageError> {
        ensure_address(&record.address)?;
        sqlx::query(
            "insert into devices \
             (address, name, state, last_seen_at, metadata, error_count, last_error, \
              last_error_at, active, created_at, updated_at) \
             values ($1, $2, $3, to_timestamp($4 / 1000.0), $5::jsonb, $6, $7, \
                     to_timestamp($8 / 1000.0), $9, to_timestamp($10 / 1000.0), \
                     to_timestamp($11 / 1000.0))",
        )
        .bind(&record.address)
        .bind(&record.name)
        .bind(record.state.as_str())
        .bind(record.last_seen_at_ms.map(|ms| ms as f64))
        .bind(metadata_json(&record.metadata)?)
        .bind(record.error_count)
        .bind(&record.last_error)
        .bind(record.last_error_at_ms.map(|ms| ms as f64))
        .bind(record.active)
        .bind(record.created_at_ms as f64)
        .bind(record.updated_at_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn find_device(&self, address: &str) -> Result<Option<DeviceRecord>, StorageError> {
        let row = sqlx::query(&format!(
            "select {DEVICE_COLUMNS} from devices where address = $1"
        ))
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        row.map(map_device).transpose()
    }

    async fn list_devices(&self) -> Result<Vec<DeviceRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "select {DEVICE_COLUMNS} from devices order by address"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_device).collect()
    }

    async fn list_by_state(&self, state: DeviceState) -> Result<Vec<DeviceRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "select {DEVICE_COLUMNS} from devices \
             where state = $1 and active order by address"
        ))
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_device).collect()
    }

    async fn apply_metadata(
        &self,
        address: &str,
        metadata: &DeviceMetadata,
        ts_ms: i64,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        // jsonb_strip_nulls 保证缺失字段不会覆盖既有值
        let row = sqlx::query(&format!(
            "update devices set \
             metadata = metadata || jsonb_strip_nulls($2::jsonb), \
             state = 'ONLINE', \
             last_seen_at = to_timestamp($3 / 1000.0), \
             updated_at = to_timestamp($3 / 1000.0) \
             where address = $1 \
             returning {DEVICE_COLUMNS}"
        ))
        .bind(address)
        .bind(metadata_json(metadata)?)
        .bind(ts_ms as f64)
        .fetch_optional(&self.pool)
        .await?;
        row.map(map_device).transpose()
    }

    async fn touch(&self, address: &str, ts_ms: i64) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "update devices set state = 'ONLINE', \
             last_seen_at = to_timestamp($2 / 1000.0), \
             updated_at = to_timestamp($2 / 1000.0) \
             where address = $1",
        )
        .bind(address)
        .bind(ts_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_offline(&self, address: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "update devices set state = 'OFFLINE' where address = $1 and state = 'ONLINE'",
        )
        .bind(address)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_error(
        &self,
        address: &str,
        message: &str,
        ts_ms: i64,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "update devices set error_count = error_count + 1, \
             last_error = $2, \
             last_error_at = to_timestamp($3 / 1000.0), \
             state = 'ERROR', \
             updated_at = to_timestamp($3 / 1000.0) \
             where address = $1",
        )
        .bind(address)
        .bind(message)
        .bind(ts_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_device(&self, address: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("update devices set active = false where address = $1")
            .bind(address)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
