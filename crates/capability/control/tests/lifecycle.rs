use async_trait::async_trait;
use domain::{AckFrame, CommandStatus, CommandType, wire::CommandEnvelope};
use pond_control::{
    CommandLifecycle, CommandPublisher, CommandRequest, ControlError, ExecutionObserver,
    LifecycleConfig,
};
use pond_storage::{
    CommandRecord, CommandStore, InMemoryCommandStore, InMemoryMessageLogStore, MessageLogStore,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

struct FakePublisher {
    connected: AtomicBool,
    fail_publish: AtomicBool,
    published: Mutex<Vec<CommandEnvelope>>,
}

impl FakePublisher {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            fail_publish: AtomicBool::new(false),
            published: Mutex::new(Vec::new()),
        }
    }

    async fn published(&self) -> Vec<CommandEnvelope> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl CommandPublisher for FakePublisher {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish_command(
        &self,
        device_address: &str,
        envelope: &CommandEnvelope,
    ) -> Result<String, ControlError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(ControlError::Dispatch("broker unavailable".to_string()));
        }
        self.published.lock().await.push(envelope.clone());
        Ok(format!("ff/{device_address}/commands"))
    }
}

#[derive(Default)]
struct RecordingObserver {
    resolved: Mutex<Vec<CommandRecord>>,
}

#[async_trait]
impl ExecutionObserver for RecordingObserver {
    async fn command_resolved(&self, command: &CommandRecord) {
        self.resolved.lock().await.push(command.clone());
    }
}

struct Harness {
    lifecycle: CommandLifecycle,
    store: Arc<InMemoryCommandStore>,
    log: Arc<InMemoryMessageLogStore>,
    publisher: Arc<FakePublisher>,
    observer: Arc<RecordingObserver>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryCommandStore::new());
    let log = Arc::new(InMemoryMessageLogStore::new());
    let publisher = Arc::new(FakePublisher::new());
    let observer = Arc::new(RecordingObserver::default());
    let lifecycle = CommandLifecycle::new(
        store.clone(),
        log.clone(),
        publisher.clone(),
        observer.clone(),
        LifecycleConfig {
            default_timeout_seconds: 10,
            default_max_retries: 3,
        },
    );
    Harness {
        lifecycle,
        store,
        log,
        publisher,
        observer,
    }
}

fn request() -> CommandRequest {
    CommandRequest {
        device_address: ADDRESS.to_string(),
        position: 1,
        command_type: CommandType::Feed,
        parameters: serde_json::json!({"duration": 5}),
        timeout_seconds: None,
        max_retries: None,
        execution_id: None,
        issued_by: Some("tester".to_string()),
    }
}

fn far_future_ms() -> i64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_millis() as i64;
    now + 3_600_000
}

#[tokio::test]
async fn send_publishes_and_indexes() {
    let h = harness();
    let record = h.lifecycle.send(request()).await.expect("send");

    assert_eq!(record.status, CommandStatus::Sent);
    assert_eq!(h.lifecycle.pending_len().await, 1);
    let published = h.publisher.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].command_id, record.command_id);
    assert_eq!(published[0].command_type, "FEED");

    // 出站帧进入报文日志并带关联命令 ID
    let logs = h.log.list_recent(10).await.expect("logs");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].correlation_id.as_deref(), Some(record.command_id.as_str()));
    assert_eq!(logs[0].topic, format!("ff/{ADDRESS}/commands"));
}

#[tokio::test]
async fn send_while_disconnected_fails_without_record() {
    let h = harness();
    h.publisher.connected.store(false, Ordering::SeqCst);

    let err = h.lifecycle.send(request()).await.expect_err("rejected");
    assert!(matches!(err, ControlError::NotConnected));
    assert_eq!(h.lifecycle.pending_len().await, 0);
    let pending = h
        .store
        .list_by_status(CommandStatus::Pending, 10)
        .await
        .expect("list");
    assert!(pending.is_empty());
}

#[tokio::test]
async fn invalid_position_is_rejected_without_record() {
    let h = harness();
    let mut bad = request();
    bad.position = 3;

    let err = h.lifecycle.send(bad).await.expect_err("rejected");
    assert!(matches!(err, ControlError::Payload(_)));
    assert_eq!(h.lifecycle.pending_len().await, 0);
    assert!(h.publisher.published().await.is_empty());
    let pending = h
        .store
        .list_by_status(CommandStatus::Pending, 10)
        .await
        .expect("list");
    assert!(pending.is_empty());
}

#[tokio::test]
async fn publish_failure_is_terminal_and_never_indexed() {
    let h = harness();
    h.publisher.fail_publish.store(true, Ordering::SeqCst);

    let err = h.lifecycle.send(request()).await.expect_err("publish fails");
    assert!(matches!(err, ControlError::Dispatch(_)));
    assert_eq!(h.lifecycle.pending_len().await, 0);

    let failed = h
        .store
        .list_by_status(CommandStatus::Failed, 10)
        .await
        .expect("list");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error_code.as_deref(), Some("E_PUBLISH"));
}

#[tokio::test]
async fn successful_ack_completes_command() {
    let h = harness();
    let record = h.lifecycle.send(request()).await.expect("send");

    h.lifecycle
        .on_ack(&AckFrame {
            command_id: record.command_id.clone(),
            success: true,
            message: "fed".to_string(),
            error_code: None,
            error_details: None,
        })
        .await
        .expect("ack");

    let command = h
        .store
        .find_command(&record.command_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(command.status, CommandStatus::Completed);
    assert_eq!(command.success, Some(true));
    assert!(command.acknowledged_at_ms.is_some());
    assert_eq!(h.lifecycle.pending_len().await, 0);

    let resolved = h.observer.resolved.lock().await;
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].command_id, record.command_id);
}

#[tokio::test]
async fn failed_ack_records_error_detail() {
    let h = harness();
    let record = h.lifecycle.send(request()).await.expect("send");

    h.lifecycle
        .on_ack(&AckFrame {
            command_id: record.command_id.clone(),
            success: false,
            message: "feeder jammed".to_string(),
            error_code: Some("E_FEEDER".to_string()),
            error_details: Some(serde_json::json!({"motor": "stalled"})),
        })
        .await
        .expect("ack");

    let command = h
        .store
        .find_command(&record.command_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(command.status, CommandStatus::Failed);
    assert_eq!(command.error_code.as_deref(), Some("E_FEEDER"));
    assert_eq!(h.lifecycle.pending_len().await, 0);
}

#[tokio::test]
async fn duplicate_ack_is_noop() {
    let h = harness();
    let record = h.lifecycle.send(request()).await.expect("send");
    let ack = AckFrame {
        command_id: record.command_id.clone(),
        success: true,
        message: "fed".to_string(),
        error_code: None,
        error_details: None,
    };
    h.lifecycle.on_ack(&ack).await.expect("first ack");
    h.lifecycle.on_ack(&ack).await.expect("second ack");

    let command = h
        .store
        .find_command(&record.command_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(command.status, CommandStatus::Completed);
    let resolved = h.observer.resolved.lock().await;
    assert_eq!(resolved.len(), 1);
}

#[tokio::test]
async fn unknown_ack_is_noop() {
    let h = harness();
    h.lifecycle
        .on_ack(&AckFrame {
            command_id: "no-such-command".to_string(),
            success: true,
            message: String::new(),
            error_code: None,
            error_details: None,
        })
        .await
        .expect("ack");
    assert_eq!(h.lifecycle.pending_len().await, 0);
}

#[tokio::test]
async fn sweep_before_deadline_changes_nothing() {
    let h = harness();
    let record = h.lifecycle.send(request()).await.expect("send");

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_millis() as i64;
    let processed = h.lifecycle.sweep_timeouts(now).await.expect("sweep");
    assert_eq!(processed, 0);
    let command = h
        .store
        .find_command(&record.command_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(command.status, CommandStatus::Sent);
}

#[tokio::test]
async fn sweep_retries_with_same_id_and_payload() {
    let h = harness();
    let record = h.lifecycle.send(request()).await.expect("send");

    let processed = h
        .lifecycle
        .sweep_timeouts(far_future_ms())
        .await
        .expect("sweep");
    assert_eq!(processed, 1);

    let command = h
        .store
        .find_command(&record.command_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(command.status, CommandStatus::Sent);
    assert_eq!(command.retry_count, 1);
    assert_eq!(h.lifecycle.pending_len().await, 1);

    let published = h.publisher.published().await;
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].command_id, published[1].command_id);
    assert_eq!(published[0].parameters, published[1].parameters);
}

#[tokio::test]
async fn exhausted_retries_time_out() {
    let store = Arc::new(InMemoryCommandStore::new());
    let log = Arc::new(InMemoryMessageLogStore::new());
    let publisher = Arc::new(FakePublisher::new());
    let observer = Arc::new(RecordingObserver::default());
    let lifecycle = CommandLifecycle::new(
        store.clone(),
        log,
        publisher.clone(),
        observer.clone(),
        LifecycleConfig {
            default_timeout_seconds: 10,
            default_max_retries: 1,
        },
    );

    let record = lifecycle.send(request()).await.expect("send");
    // 第一次越期：重试
    assert_eq!(lifecycle.sweep_timeouts(far_future_ms()).await.expect("sweep"), 1);
    // 第二次越期：预算耗尽，TIMEOUT
    assert_eq!(lifecycle.sweep_timeouts(far_future_ms()).await.expect("sweep"), 1);

    let command = store
        .find_command(&record.command_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(command.status, CommandStatus::Timeout);
    assert_eq!(command.retry_count, 1);
    assert_eq!(lifecycle.pending_len().await, 0);
    assert_eq!(publisher.published().await.len(), 2);

    let resolved = observer.resolved.lock().await;
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].status, CommandStatus::Timeout);
}

#[tokio::test]
async fn sweep_reconciles_orphaned_sent_commands() {
    let h = harness();
    // 直接写入持久层，模拟进程重启后丢失的挂起索引
    h.store
        .create_command(CommandRecord {
            command_id: "cmd-orphan".to_string(),
            device_address: ADDRESS.to_string(),
            position: 1,
            command_type: CommandType::Restart,
            parameters: serde_json::json!({}),
            status: CommandStatus::Pending,
            timeout_seconds: 10,
            max_retries: 3,
            retry_count: 0,
            success: None,
            result_message: None,
            error_code: None,
            error_details: None,
            execution_id: None,
            issued_by: None,
            created_at_ms: 1_000,
            sent_at_ms: None,
            acknowledged_at_ms: None,
            completed_at_ms: None,
        })
        .await
        .expect("create");
    h.store.mark_sent("cmd-orphan", 1_000).await.expect("sent");
    assert_eq!(h.lifecycle.pending_len().await, 0);

    let processed = h
        .lifecycle
        .sweep_timeouts(far_future_ms())
        .await
        .expect("sweep");
    assert_eq!(processed, 1);

    // 孤儿命令被重建并按同一策略重试
    let command = h
        .store
        .find_command("cmd-orphan")
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(command.status, CommandStatus::Sent);
    assert_eq!(command.retry_count, 1);
    assert_eq!(h.lifecycle.pending_len().await, 1);
    let published = h.publisher.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].command_id, "cmd-orphan");
    assert_eq!(published[0].command_type, "RESTART");
}
