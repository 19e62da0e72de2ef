//! 协议层网关：装配存储、传输会话、调度与常驻扫描任务。

mod tasks;

use pond_config::{AppConfig, BusBackend};
use pond_control::{CommandLifecycle, LifecycleConfig, NoopObserver};
use pond_ingest::{NoopEvaluator, SensorIngest};
use pond_mqtt::{
    CommandChannel, Dispatcher, FrameProcessor, InMemoryBus, MessageBus, MqttSession, RedisBus,
    SessionConfig,
};
use pond_presence::PresenceTracker;
use pond_storage::{
    CommandStore, DeviceStore, InMemoryCommandStore, InMemoryDeviceStore, InMemoryMessageLogStore,
    InMemorySensorReadingStore, MessageLogStore, PgCommandStore, PgDeviceStore, PgMessageLogStore,
    PgSensorReadingStore, SensorReadingStore, connect_pool,
};
use pond_telemetry::init_tracing;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

const BUS_CHANNEL: &str = "pond:frames";

struct Stores {
    devices: Arc<dyn DeviceStore>,
    commands: Arc<dyn CommandStore>,
    message_log: Arc<dyn MessageLogStore>,
    readings: Arc<dyn SensorReadingStore>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    let stores = build_stores(&config).await?;

    let presence = Arc::new(PresenceTracker::new(
        stores.devices.clone(),
        (config.heartbeat_offline_threshold_seconds as i64) * 1000,
    ));
    let ingest = Arc::new(SensorIngest::new(
        stores.devices.clone(),
        stores.readings.clone(),
        Arc::new(NoopEvaluator),
        config.threshold_dispatch_delay_ms,
    ));
    // 命令通道先创建、后绑定会话（会话需要先拿到完整的入站处理链）
    let channel = Arc::new(CommandChannel::new(config.mqtt_topic_prefix.clone()));
    let lifecycle = Arc::new(CommandLifecycle::new(
        stores.commands.clone(),
        stores.message_log.clone(),
        channel.clone(),
        Arc::new(NoopObserver),
        LifecycleConfig {
            default_timeout_seconds: config.command_timeout_seconds,
            default_max_retries: config.command_max_retries,
        },
    ));
    let processor = Arc::new(FrameProcessor::new(
        presence.clone(),
        ingest,
        lifecycle.clone(),
        stores.message_log.clone(),
    ));

    let bus: Arc<dyn MessageBus> = match config.bus_backend {
        BusBackend::Memory => Arc::new(InMemoryBus::new()),
        BusBackend::Redis => Arc::new(RedisBus::connect(&config.redis_url, BUS_CHANNEL)?),
    };
    tokio::spawn(Dispatcher::run_bus_consumer(processor.clone(), bus.clone()));

    let dispatcher = Arc::new(Dispatcher::new(
        config.mqtt_topic_prefix.clone(),
        bus,
        processor,
        config.worker_pool_size,
    ));
    let session = Arc::new(
        MqttSession::connect(
            SessionConfig {
                host: config.mqtt_host.clone(),
                port: config.mqtt_port,
                username: config.mqtt_username.clone(),
                password: config.mqtt_password.clone(),
                use_tls: config.mqtt_use_tls,
                topic_prefix: config.mqtt_topic_prefix.clone(),
                keepalive_seconds: config.mqtt_keepalive_seconds,
                connect_timeout_seconds: config.mqtt_connect_timeout_seconds,
                reconnect_base_delay_ms: config.mqtt_reconnect_base_delay_ms,
                reconnect_max_delay_ms: config.mqtt_reconnect_max_delay_ms,
                max_reconnect_attempts: config.mqtt_max_reconnect_attempts,
            },
            dispatcher,
        )
        .await?,
    );
    channel.bind(session.clone());
    info!(
        target: "pond.gateway",
        host = %config.mqtt_host,
        port = config.mqtt_port,
        prefix = %config.mqtt_topic_prefix,
        "gateway_started"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeps = [
        tasks::spawn_timeout_sweep(
            lifecycle,
            config.timeout_sweep_interval_seconds,
            shutdown_rx.clone(),
        ),
        tasks::spawn_offline_sweep(
            presence,
            config.offline_sweep_interval_seconds,
            shutdown_rx.clone(),
        ),
        tasks::spawn_log_prune(
            stores.message_log.clone(),
            config.log_retention_days,
            config.log_prune_interval_seconds,
            shutdown_rx,
        ),
    ];

    tokio::signal::ctrl_c().await?;
    info!(target: "pond.gateway", "shutdown_requested");
    let _ = shutdown_tx.send(true);
    session.disconnect().await;
    for handle in sweeps {
        let _ = handle.await;
    }
    info!(target: "pond.gateway", "gateway_stopped");
    Ok(())
}

async fn build_stores(config: &AppConfig) -> Result<Stores, Box<dyn std::error::Error>> {
    match &config.database_url {
        Some(database_url) => {
            let pool = connect_pool(database_url).await?;
            info!(target: "pond.gateway", "postgres_stores_ready");
            Ok(Stores {
                devices: Arc::new(PgDeviceStore::new(pool.clone())),
                commands: Arc::new(PgCommandStore::new(pool.clone())),
                message_log: Arc::new(PgMessageLogStore::new(pool.clone())),
                readings: Arc::new(PgSensorReadingStore::new(pool)),
            })
        }
        None => {
            info!(target: "pond.gateway", "in_memory_stores_ready");
            Ok(Stores {
                devices: Arc::new(InMemoryDeviceStore::new()),
                commands: Arc::new(InMemoryCommandStore::new()),
                message_log: Arc::new(InMemoryMessageLogStore::new()),
                readings: Arc::new(InMemorySensorReadingStore::new()),
            })
        }
    }
}
