//! Postgres 命令存储实现

use crate::error::StorageError;
use crate::models::CommandRecord;
use crate::traits::CommandStore;
use crate::validation::clamp_limit;
use domain::{CommandStatus, CommandType};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const COMMAND_COLUMNS: &str = "command_id, device_address, position, command_type, \
    parameters::text as parameters, status, timeout_seconds, max_retries, retry_count, \
    success, result_message, error_code, error_details, execution_id, issued_by, \
    (extract(epoch from created_at) * 1000)::bigint as created_at_ms, \
    (extract(epoch from sent_at) * 1000)::bigint as sent_at_ms, \
    (extract(epoch from acknowledged_at) * 1000)::bigint as acknowledged_at_ms, \
    (extract(epoch from completed_at) * 1000)::bigint as completed_at_ms";

pub struct PgCommandStore {
    pub pool: PgPool,
}

impl PgCommandStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_command(row: PgRow) -> Result<CommandRecord, StorageError> {
    let command_type: String = row.try_get("command_type")?;
    let command_type = CommandType::parse(&command_type)
        .ok_or_else(|| StorageError::new(format!("unknown command type: {command_type}")))?;
    let status: String = row.try_get("status")?;
    let status = CommandStatus::parse(&status)
        .ok_or_else(|| StorageError::new(format!("unknown command status: {status}")))?;
    let parameters: String = row.try_get("parameters")?;
    let parameters: serde_json::Value = serde_json::from_str(&parameters)
        .map_err(|err| StorageError::new(format!("invalid command parameters: {err}")))?;
    let position: i16 = row.try_get("position")?;
    let timeout_seconds: i32 = row.try_get("timeout_seconds")?;
    let max_retries: i32 = row.try_get("max_retries")?;
    let retry_count: i32 = row.try_get("retry_count")?;
    Ok(CommandRecord {
        command_id: row.try_get("command_id")?,
        device_address: row.try_get("device_address")?,
        position: position as u8,
        command_type,
        parameters,
        status,
        timeout_seconds: timeout_seconds as u32,
        max_retries: max_retries as u32,
        retry_count: retry_count as u32,
        success: row.try_get("success")?,
        result_message: row.try_get("result_message")?,
        error_code: row.try_get("error_code")?,
        error_details: row.try_get("error_details")?,
        execution_id: row.try_get("execution_id")?,
        issued_by: row.try_get("issued_by")?,
        created_at_ms: row.try_get("created_at_ms")?,
        sent_at_ms: row.try_get("sent_at_ms")?,
        acknowledged_at_ms: row.try_get("acknowledged_at_ms")?,
        completed_at_ms: row.try_get("completed_at_ms")?,
    })
}

#[async_trait::async_trait]
impl CommandStore for PgCommandStore {
    async fn create_command(&self, record: CommandRecord) -> Result<CommandRecord, StorageError> {
        sqlx::query(
            "insert into commands \
             (command_id, device_address, position, command_type, parameters, status, \
              timeout_seconds, max_retries, retry_count, execution_id, issued_by, created_at) \
             values ($1, $2, $3, $4, $5::jsonb, $6, $7, $8, $9, $10, $11, \
                     to_timestamp($12 / 1000.0))",
        )
        .bind(&record.command_id)
        .bind(&record.device_address)
        .bind(record.position as i16)
        .bind(record.command_type.as_str())
        .bind(record.parameters.to_string())
        .bind(record.status.as_str())
        .bind(record.timeout_seconds as i32)
        .bind(record.max_retries as i32)
        .bind(record.retry_count as i32)
        .bind(&record.execution_id)
        .bind(&record.issued_by)
        .bind(record.created_at_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn find_command(&self, command_id: &str) -> Result<Option<CommandRecord>, StorageError> {
        let row = sqlx::query(&format!(
            "select {COMMAND_COLUMNS} from commands where command_id = $1"
        ))
        .bind(command_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(map_command).transpose()
    }

    async fn mark_sent(&self, command_id: &str, ts_ms: i64) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "update commands set status = 'SENT', sent_at = to_timestamp($2 / 1000.0) \
             where command_id = $1 and status = 'PENDING'",
        )
        .bind(command_id)
        .bind(ts_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn acknowledge(&self, command_id: &str, ts_ms: i64) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "update commands set status = 'ACKNOWLEDGED', \
             acknowledged_at = to_timestamp($2 / 1000.0) \
             where command_id = $1 and status = 'SENT'",
        )
        .bind(command_id)
        .bind(ts_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn begin_retry(&self, command_id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "update commands set status = 'PENDING', retry_count = retry_count + 1, \
             sent_at = null, acknowledged_at = null \
             where command_id = $1 and status = 'SENT'",
        )
        .bind(command_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn finalize_timeout(&self, command_id: &str, ts_ms: i64) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "update commands set status = 'TIMEOUT', \
             completed_at = to_timestamp($2 / 1000.0) \
             where command_id = $1 and status = 'SENT'",
        )
        .bind(command_id)
        .bind(ts_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete(
        &self,
        command_id: &str,
        success: bool,
        message: &str,
        error_code: Option<&str>,
        error_details: Option<&str>,
        ts_ms: i64,
    ) -> Result<bool, StorageError> {
        let status = if success { "COMPLETED" } else { "FAILED" };
        let result = sqlx::query(
            "update commands set status = $2, success = $3, result_message = $4, \
             error_code = $5, error_details = $6, completed_at = to_timestamp($7 / 1000.0) \
             where command_id = $1 \
             and status not in ('COMPLETED', 'FAILED', 'TIMEOUT')",
        )
        .bind(command_id)
        .bind(status)
        .bind(success)
        .bind(message)
        .bind(error_code)
        .bind(error_details)
        .bind(ts_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_status(
        &self,
        status: CommandStatus,
        limit: i64,
    ) -> Result<Vec<CommandRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "select {COMMAND_COLUMNS} from commands \
             where status = $1 order by created_at desc limit $2"
        ))
        .bind(status.as_str())
        .bind(clamp_limit(limit) as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_command).collect()
    }

    async fn list_expired_sent(&self, now_ms: i64) -> Result<Vec<CommandRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "select {COMMAND_COLUMNS} from commands \
             where status = 'SENT' \
             and sent_at + timeout_seconds * interval '1 second' <= to_timestamp($1 / 1000.0) \
             order by created_at"
        ))
        .bind(now_ms as f64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_command).collect()
    }
}
