use pond_config::{AppConfig, BusBackend};

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("POND_MQTT_HOST", "broker.local");
        std::env::set_var("POND_MQTT_PORT", "8883");
        std::env::set_var("POND_MQTT_USE_TLS", "true");
        std::env::set_var("POND_COMMAND_TIMEOUT_SECONDS", "20");
        std::env::set_var("POND_BUS", "redis");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.mqtt_host, "broker.local");
    assert_eq!(config.mqtt_port, 8883);
    assert!(config.mqtt_use_tls);
    assert_eq!(config.mqtt_topic_prefix, "ff");
    assert_eq!(config.command_timeout_seconds, 20);
    assert_eq!(config.command_max_retries, 3);
    assert_eq!(config.bus_backend, BusBackend::Redis);
    assert!(config.database_url.is_none());
}
