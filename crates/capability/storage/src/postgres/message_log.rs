//! Postgres 报文日志实现

use crate::error::StorageError;
use crate::models::MessageLogRecord;
use crate::traits::MessageLogStore;
use crate::validation::clamp_limit;
use domain::LogDirection;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const LOG_COLUMNS: &str = "message_id, device_address, topic, direction, \
    payload::text as payload, payload_size, success, error_message, correlation_id, \
    (extract(epoch from created_at) * 1000)::bigint as created_at_ms";

pub struct PgMessageLogStore {
    pub pool: PgPool,
}

impl PgMessageLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_log(row: PgRow) -> Result<MessageLogRecord, StorageError> {
    let direction: String = row.try_get("direction")?;
    let direction = LogDirection::parse(&direction)
        .ok_or_else(|| StorageError::new(format!("unknown log direction: {direction}")))?;
    let payload: String = row.try_get("payload")?;
    let payload: serde_json::Value = serde_json::from_str(&payload)
        .map_err(|err| StorageError::new(format!("invalid log payload: {err}")))?;
    Ok(MessageLogRecord {
        message_id: row.try_get("message_id")?,
        device_address: row.try_get("device_address")?,
        topic: row.try_get("topic")?,
        direction,
        payload,
        payload_size: row.try_get("payload_size")?,
        success: row.try_get("success")?,
        error_message: row.try_get("error_message")?,
        correlation_id: row.try_get("correlation_id")?,
        created_at_ms: row.try_get("created_at_ms")?,
    })
}

#[async_trait::async_trait]
impl MessageLogStore for PgMessageLogStore {
    async fn append(&self, record: MessageLogRecord) -> Result<MessageLogRecord, StorageError> {
        sqlx::query(
            "insert into message_logs \
             (message_id, device_address, topic, direction, payload, payload_size, \
              success, error_message, correlation_id, created_at) \
             values ($1, $2, $3, $4, $5::jsonb, $6, $7, $8, $9, to_timestamp($10 / 1000.0))",
        )
        .bind(&record.message_id)
        .bind(&record.device_address)
        .bind(&record.topic)
        .bind(record.direction.as_str())
        .bind(record.payload.to_string())
        .bind(record.payload_size)
        .bind(record.success)
        .bind(&record.error_message)
        .bind(&record.correlation_id)
        .bind(record.created_at_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<MessageLogRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "select {LOG_COLUMNS} from message_logs order by created_at desc limit $1"
        ))
        .bind(clamp_limit(limit) as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_log).collect()
    }

    async fn prune_older_than(&self, cutoff_ms: i64) -> Result<u64, StorageError> {
        let result =
            sqlx::query("delete from message_logs where created_at < to_timestamp($1 / 1000.0)")
                .bind(cutoff_ms as f64)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
