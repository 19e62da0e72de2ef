//! Postgres 传感器读数实现

use crate::error::StorageError;
use crate::models::SensorReadingRecord;
use crate::traits::SensorReadingStore;
use crate::validation::clamp_limit;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const READING_COLUMNS: &str = "reading_id, device_address, temperature, water_level, \
    water_level2, feed_level, feed_level2, dissolved_oxygen, ph, battery, signal_strength, \
    device_timestamp, \
    (extract(epoch from received_at) * 1000)::bigint as received_at_ms";

pub struct PgSensorReadingStore {
    pub pool: PgPool,
}

impl PgSensorReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_reading(row: PgRow) -> Result<SensorReadingRecord, StorageError> {
    Ok(SensorReadingRecord {
        reading_id: row.try_get("reading_id")?,
        device_address: row.try_get("device_address")?,
        temperature: row.try_get("temperature")?,
        water_level: row.try_get("water_level")?,
        water_level2: row.try_get("water_level2")?,
        feed_level: row.try_get("feed_level")?,
        feed_level2: row.try_get("feed_level2")?,
        dissolved_oxygen: row.try_get("dissolved_oxygen")?,
        ph: row.try_get("ph")?,
        battery: row.try_get("battery")?,
        signal_strength: row.try_get("signal_strength")?,
        device_timestamp: row.try_get("device_timestamp")?,
        received_at_ms: row.try_get("received_at_ms")?,
    })
}

#[async_trait::async_trait]
impl SensorReadingStore for PgSensorReadingStore {
    async fn create_reading(
        &self,
        record: SensorReadingRecord,
    ) -> Result<SensorReadingRecord, StorageError> {
        sqlx::query(
            "insert into sensor_readings \
             (reading_id, device_address, temperature, water_level, water_level2, \
              feed_level, feed_level2, dissolved_oxygen, ph, battery, signal_strength, \
              device_timestamp, received_at) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
                     to_timestamp($13 / 1000.0))",
        )
        .bind(&record.reading_id)
        .bind(&record.device_address)
        .bind(record.temperature)
        .bind(record.water_level)
        .bind(record.water_level2)
        .bind(record.feed_level)
        .bind(record.feed_level2)
        .bind(record.dissolved_oxygen)
        .bind(record.ph)
        .bind(record.battery)
        .bind(record.signal_strength)
        .bind(&record.device_timestamp)
        .bind(record.received_at_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn list_recent(
        &self,
        address: &str,
        limit: i64,
    ) -> Result<Vec<SensorReadingRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "select {READING_COLUMNS} from sensor_readings \
             where device_address = $1 order by received_at desc limit $2"
        ))
        .bind(address)
        .bind(clamp_limit(limit) as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_reading).collect()
    }
}
