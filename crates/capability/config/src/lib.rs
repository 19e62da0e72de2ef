//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 消息总线后端选择。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusBackend {
    Memory,
    Redis,
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_use_tls: bool,
    pub mqtt_topic_prefix: String,
    pub mqtt_keepalive_seconds: u64,
    pub mqtt_connect_timeout_seconds: u64,
    pub mqtt_reconnect_base_delay_ms: u64,
    pub mqtt_reconnect_max_delay_ms: u64,
    pub mqtt_max_reconnect_attempts: u32,
    pub command_timeout_seconds: u32,
    pub command_max_retries: u32,
    pub heartbeat_offline_threshold_seconds: u64,
    pub timeout_sweep_interval_seconds: u64,
    pub offline_sweep_interval_seconds: u64,
    pub log_retention_days: u64,
    pub log_prune_interval_seconds: u64,
    pub worker_pool_size: usize,
    pub threshold_dispatch_delay_ms: u64,
    pub bus_backend: BusBackend,
    pub redis_url: String,
    /// 未设置时使用内存存储运行。
    pub database_url: Option<String>,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let mqtt_host = env::var("POND_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_u16_with_default("POND_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional("POND_MQTT_USERNAME");
        let mqtt_password = read_optional("POND_MQTT_PASSWORD");
        let mqtt_use_tls = read_bool_with_default("POND_MQTT_USE_TLS", false);
        let mqtt_topic_prefix =
            env::var("POND_MQTT_TOPIC_PREFIX").unwrap_or_else(|_| "ff".to_string());
        let mqtt_keepalive_seconds = read_u64_with_default("POND_MQTT_KEEPALIVE_SECONDS", 60)?;
        let mqtt_connect_timeout_seconds =
            read_u64_with_default("POND_MQTT_CONNECT_TIMEOUT_SECONDS", 10)?;
        let mqtt_reconnect_base_delay_ms =
            read_u64_with_default("POND_MQTT_RECONNECT_BASE_DELAY_MS", 1_000)?;
        let mqtt_reconnect_max_delay_ms =
            read_u64_with_default("POND_MQTT_RECONNECT_MAX_DELAY_MS", 120_000)?;
        let mqtt_max_reconnect_attempts =
            read_u32_with_default("POND_MQTT_MAX_RECONNECT_ATTEMPTS", 10)?;
        let command_timeout_seconds = read_u32_with_default("POND_COMMAND_TIMEOUT_SECONDS", 10)?;
        let command_max_retries = read_u32_with_default("POND_COMMAND_MAX_RETRIES", 3)?;
        let heartbeat_offline_threshold_seconds =
            read_u64_with_default("POND_HEARTBEAT_OFFLINE_THRESHOLD_SECONDS", 30)?;
        let timeout_sweep_interval_seconds =
            read_u64_with_default("POND_TIMEOUT_SWEEP_INTERVAL_SECONDS", 10)?;
        let offline_sweep_interval_seconds =
            read_u64_with_default("POND_OFFLINE_SWEEP_INTERVAL_SECONDS", 30)?;
        let log_retention_days = read_u64_with_default("POND_LOG_RETENTION_DAYS", 30)?;
        let log_prune_interval_seconds =
            read_u64_with_default("POND_LOG_PRUNE_INTERVAL_SECONDS", 21_600)?;
        let worker_pool_size = read_u64_with_default("POND_WORKER_POOL_SIZE", 4)?.max(1) as usize;
        let threshold_dispatch_delay_ms =
            read_u64_with_default("POND_THRESHOLD_DISPATCH_DELAY_MS", 1_000)?;
        let bus_backend = read_bus_backend("POND_BUS")?;
        let redis_url =
            env::var("POND_REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let database_url = read_optional("POND_DATABASE_URL");

        Ok(Self {
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_use_tls,
            mqtt_topic_prefix,
            mqtt_keepalive_seconds,
            mqtt_connect_timeout_seconds,
            mqtt_reconnect_base_delay_ms,
            mqtt_reconnect_max_delay_ms,
            mqtt_max_reconnect_attempts,
            command_timeout_seconds,
            command_max_retries,
            heartbeat_offline_threshold_seconds,
            timeout_sweep_interval_seconds,
            offline_sweep_interval_seconds,
            log_retention_days,
            log_prune_interval_seconds,
            worker_pool_size,
            threshold_dispatch_delay_ms,
            bus_backend,
            redis_url,
            database_url,
        })
    }
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}

fn read_bus_backend(key: &str) -> Result<BusBackend, ConfigError> {
    match env::var(key) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "memory" => Ok(BusBackend::Memory),
            "redis" => Ok(BusBackend::Redis),
            _ => Err(ConfigError::Invalid(key.to_string(), value)),
        },
        Err(_) => Ok(BusBackend::Memory),
    }
}
