//! Event pipeline 통합 테스트
//!
//! Host + EventDispatcher + Storage를 실제로 묶어 producer에서 저장소까지 확인

use async_trait::async_trait;
use plexus_core::{DispatcherState, Host};
use plexus_foundation::{
    ActivityRecord, Error, EventRecord, EventStore, PlexusConfig, Result, Storage,
};
use plexus_sdk::{
    CancellationToken, Event, EventEmitter, EventSink, Plugin, PluginError, PluginInfo,
    Result as PluginResult,
};
use serde_json::json;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;

// ============================================================================
// Fixtures
// ============================================================================

/// 시작 시 task.* 이벤트를 순서대로 내보내는 producer
struct TaskProducer {
    name: &'static str,
    events: Vec<&'static str>,
    starts: AtomicUsize,
}

impl TaskProducer {
    fn new(name: &'static str, events: Vec<&'static str>) -> Self {
        Self {
            name,
            events,
            starts: AtomicUsize::new(0),
        }
    }
}

impl Plugin for TaskProducer {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(self.name, "0.1.0")
    }

    fn as_event_emitter(&self) -> Option<&dyn EventEmitter> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl EventEmitter for TaskProducer {
    async fn start_event_stream(
        &self,
        _cancel: CancellationToken,
        sink: EventSink,
    ) -> PluginResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        for (i, event_type) in self.events.iter().enumerate() {
            sink.emit(
                Event::new(*event_type, self.name)
                    .with_session("s1")
                    .with_payload("seq", serde_json::json!(i)),
            )
            .await?;
        }
        Ok(())
    }

    async fn stop_event_stream(&self) -> PluginResult<()> {
        Ok(())
    }
}

/// start_event_stream에서 백그라운드 작업만 띄우고 바로 돌아오는 producer
///
/// `limit`이 없으면 취소될 때까지 계속 보냅니다.
struct BackgroundProducer {
    limit: Option<usize>,
    task: Mutex<Option<JoinHandle<usize>>>,
}

impl BackgroundProducer {
    fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            task: Mutex::new(None),
        }
    }

    /// 백그라운드 작업 핸들 (보낸 이벤트 수를 돌려줌)
    fn take_task(&self) -> JoinHandle<usize> {
        self.task.lock().unwrap().take().expect("stream was started")
    }
}

impl Plugin for BackgroundProducer {
    fn info(&self) -> PluginInfo {
        PluginInfo::new("background", "0.1.0")
    }

    fn as_event_emitter(&self) -> Option<&dyn EventEmitter> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl EventEmitter for BackgroundProducer {
    async fn start_event_stream(
        &self,
        cancel: CancellationToken,
        sink: EventSink,
    ) -> PluginResult<()> {
        let limit = self.limit;
        let handle = tokio::spawn(async move {
            let mut sent = 0usize;
            while limit.map_or(true, |limit| sent < limit) {
                let event = Event::new("custom.tick", "background")
                    .with_session("bg")
                    .with_payload("i", json!(sent));
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,

                    result = sink.emit(event) => {
                        if result.is_err() {
                            break;
                        }
                        sent += 1;
                    }
                }
            }
            sent
        });
        *self.task.lock().unwrap() = Some(handle);
        Ok(())
    }

    async fn stop_event_stream(&self) -> PluginResult<()> {
        Ok(())
    }
}

/// 쓰기마다 지연되고, 동시에 진행 중인 쓰기 수의 최댓값을 기록하는 저장소
struct SlowStore {
    inner: Storage,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowStore {
    fn new(delay: Duration) -> Self {
        Self {
            inner: Storage::in_memory().unwrap(),
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EventStore for SlowStore {
    async fn emit_event(&self, record: &EventRecord) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        let result = self.inner.emit_event(record).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn recent_events(&self, limit: u32) -> Result<Vec<EventRecord>> {
        self.inner.recent_events(limit).await
    }

    async fn session_events(&self, session_id: &str) -> Result<Vec<EventRecord>> {
        self.inner.session_events(session_id).await
    }

    async fn activity(&self, session_id: &str) -> Result<Option<ActivityRecord>> {
        self.inner.activity(session_id).await
    }

    async fn list_activity(&self, limit: Option<u32>) -> Result<Vec<ActivityRecord>> {
        EventStore::list_activity(&self.inner, limit).await
    }
}

/// `*.fail` 타입만 저장에 실패하는 저장소
struct FlakyStore {
    inner: Storage,
}

#[async_trait]
impl EventStore for FlakyStore {
    async fn emit_event(&self, record: &EventRecord) -> Result<()> {
        if record.event_type.ends_with(".fail") {
            return Err(Error::Storage("disk full".to_string()));
        }
        self.inner.emit_event(record).await
    }

    async fn recent_events(&self, limit: u32) -> Result<Vec<EventRecord>> {
        self.inner.recent_events(limit).await
    }

    async fn session_events(&self, session_id: &str) -> Result<Vec<EventRecord>> {
        self.inner.session_events(session_id).await
    }

    async fn activity(&self, session_id: &str) -> Result<Option<ActivityRecord>> {
        self.inner.activity(session_id).await
    }

    async fn list_activity(&self, limit: Option<u32>) -> Result<Vec<ActivityRecord>> {
        EventStore::list_activity(&self.inner, limit).await
    }
}

fn host() -> Host {
    Host::new(
        PlexusConfig::default(),
        Arc::new(Storage::in_memory().unwrap()),
    )
}

async fn push(host: &Host, session: &str, count: usize) {
    let sink = host.dispatcher().sink().await.unwrap();
    for i in 0..count {
        sink.emit(
            Event::new("custom.tick", "manual")
                .with_session(session)
                .with_payload("i", json!(i)),
        )
        .await
        .unwrap();
    }
}

fn assert_in_order(events: &[EventRecord]) {
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.payload_json().unwrap()["i"], i);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_producer_events_persisted_in_order() {
    let host = host();
    host.register(Arc::new(TaskProducer::new(
        "tasks",
        vec!["task.created", "task.updated", "task.deleted"],
    )))
    .await
    .unwrap();

    host.start().await.unwrap();
    host.stop().await.unwrap();

    let events = host.store().session_events("s1").await.unwrap();
    let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["task.created", "task.updated", "task.deleted"]);
    assert!(events.iter().all(|e| e.source == "tasks"));

    let metrics = host.dispatcher().metrics().await;
    assert_eq!(metrics.processed, 3);
    assert_eq!(metrics.failed, 0);
}

#[tokio::test]
async fn test_failed_writes_are_counted_and_skipped() {
    let store = Arc::new(FlakyStore {
        inner: Storage::in_memory().unwrap(),
    });
    let host = Host::new(PlexusConfig::default(), store);
    host.register(Arc::new(TaskProducer::new(
        "tasks",
        vec!["task.created", "task.fail", "task.completed", "task.fail"],
    )))
    .await
    .unwrap();

    host.start().await.unwrap();
    host.stop().await.unwrap();

    let metrics = host.dispatcher().metrics().await;
    assert_eq!(metrics.processed, 2);
    assert_eq!(metrics.failed, 2);
    assert_eq!(host.store().session_events("s1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_event_never_reaches_store() {
    let host = host();
    host.start().await.unwrap();

    let sink = host.dispatcher().sink().await.unwrap();
    let err = sink
        .emit(Event::new("  ", "manual").with_session("s1"))
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::InvalidArgument(_)));

    let err = sink.emit(Event::new("task.created", "manual")).await.unwrap_err();
    assert!(matches!(err, PluginError::InvalidArgument(_)));

    drop(sink);
    host.stop().await.unwrap();

    assert_eq!(host.store().recent_events(10).await.unwrap().len(), 0);
    let metrics = host.dispatcher().metrics().await;
    assert_eq!(metrics.processed, 0);
    assert_eq!(metrics.failed, 0);
}

#[tokio::test]
async fn test_restart_runs_producers_again() {
    let host = host();
    let producer = Arc::new(TaskProducer::new("tasks", vec!["task.created"]));
    host.register(producer.clone()).await.unwrap();

    host.start().await.unwrap();
    host.stop().await.unwrap();
    host.start().await.unwrap();
    host.stop().await.unwrap();

    assert_eq!(producer.starts.load(Ordering::SeqCst), 2);
    assert_eq!(host.dispatcher().metrics().await.processed, 2);
    assert_eq!(host.dispatcher().state().await, DispatcherState::Stopped);

    let activity = host.store().activity("s1").await.unwrap().unwrap();
    assert_eq!(activity.event_count, 2);
}

#[tokio::test]
async fn test_lifecycle_errors() {
    let host = host();
    assert!(matches!(host.stop().await, Err(Error::NotRunning(_))));

    tokio_test::assert_ok!(host.start().await);
    assert!(matches!(host.start().await, Err(Error::AlreadyRunning(_))));
    tokio_test::assert_ok!(host.stop().await);
    assert!(matches!(host.stop().await, Err(Error::NotRunning(_))));
}

#[tokio::test]
async fn test_duplicate_plugin_rejected() {
    let host = host();
    host.register(Arc::new(TaskProducer::new("tasks", vec![])))
        .await
        .unwrap();

    assert!(matches!(
        host.register(Arc::new(TaskProducer::new("tasks", vec![]))).await,
        Err(Error::AlreadyExists(_))
    ));
    assert_eq!(host.registry().len().await, 1);
    assert_eq!(host.dispatcher().metrics().await.producer_count, 1);
}

#[tokio::test]
async fn test_producer_registered_while_running_is_started() {
    let host = host();
    host.start().await.unwrap();

    let late = Arc::new(TaskProducer::new("late", vec!["task.created", "task.done"]));
    host.register(late.clone()).await.unwrap();
    assert_eq!(late.starts.load(Ordering::SeqCst), 1);

    host.stop().await.unwrap();
    assert_eq!(host.store().session_events("s1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_queued_events_drained_on_stop() {
    let host = host();
    host.start().await.unwrap();

    let sink = host.dispatcher().sink().await.unwrap();
    for i in 0..50 {
        sink.emit(
            Event::new("custom.tick", "manual")
                .with_session("bulk")
                .with_payload("i", serde_json::json!(i)),
        )
        .await
        .unwrap();
    }
    drop(sink);
    host.stop().await.unwrap();

    let events = host.store().session_events("bulk").await.unwrap();
    assert_eq!(events.len(), 50);
    assert_eq!(events[0].payload_json().unwrap()["i"], 0);
    assert_eq!(events[49].payload_json().unwrap()["i"], 49);
}

#[tokio::test]
async fn test_background_producer_stops_on_cancel() {
    let host = host();
    let producer = Arc::new(BackgroundProducer::new(None));
    host.register(producer.clone()).await.unwrap();

    timeout(Duration::from_secs(1), host.start())
        .await
        .expect("start returns while the producer keeps running")
        .unwrap();

    timeout(Duration::from_secs(5), async {
        while host.dispatcher().metrics().await.processed < 20 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
    host.stop().await.unwrap();

    // 취소 토큰을 보고 스스로 끝나야 함
    let sent = timeout(Duration::from_secs(1), producer.take_task())
        .await
        .expect("producer task observes cancellation")
        .unwrap();

    let processed = host.dispatcher().metrics().await.processed;
    assert!(processed >= 20);
    assert!(processed as usize <= sent);

    let events = host.store().session_events("bg").await.unwrap();
    assert_eq!(events.len() as u64, processed);
    assert_in_order(&events);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_backpressure_beyond_queue_capacity() {
    let host = Host::new(
        PlexusConfig::default().with_queue_capacity(4),
        Arc::new(Storage::in_memory().unwrap()),
    );
    let producer = Arc::new(BackgroundProducer::new(Some(250)));
    host.register(producer.clone()).await.unwrap();
    host.start().await.unwrap();

    let sent = timeout(Duration::from_secs(10), producer.take_task())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sent, 250);

    let metrics = host.dispatcher().metrics().await;
    assert_eq!(metrics.queue_capacity, 4);
    assert!(metrics.queue_len <= 4);

    host.stop().await.unwrap();
    assert_eq!(host.dispatcher().metrics().await.processed, 250);

    let events = host.store().session_events("bg").await.unwrap();
    assert_eq!(events.len(), 250);
    assert_in_order(&events);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_waits_for_consumer_left_by_timeout() {
    let store = Arc::new(SlowStore::new(Duration::from_millis(30)));
    let mut config = PlexusConfig::default();
    config.dispatcher.shutdown_timeout_ms = 10;
    let host = Host::new(config, store.clone());

    host.start().await.unwrap();
    push(&host, "first", 5).await;

    // consumer는 timeout 뒤에도 백그라운드에서 계속 비움
    host.stop().await.unwrap();
    assert_eq!(host.dispatcher().state().await, DispatcherState::Stopped);
    assert!(host.dispatcher().metrics().await.processed < 5);

    // 새 consumer는 이전 consumer가 끝난 뒤에 시작
    host.start().await.unwrap();
    assert_eq!(host.dispatcher().metrics().await.processed, 5);

    push(&host, "second", 5).await;
    host.stop().await.unwrap();
    host.start().await.unwrap();
    assert_eq!(host.dispatcher().metrics().await.processed, 10);
    host.stop().await.unwrap();

    assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 1);
    assert_in_order(&host.store().session_events("first").await.unwrap());
    assert_in_order(&host.store().session_events("second").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_metrics_readable_while_stopping() {
    let store = Arc::new(SlowStore::new(Duration::from_millis(30)));
    let host = Host::new(PlexusConfig::default(), store);

    host.start().await.unwrap();
    push(&host, "slow", 10).await;

    let dispatcher = Arc::clone(host.dispatcher());
    let stopping = tokio::spawn(async move { dispatcher.stop().await });

    timeout(Duration::from_secs(1), async {
        while host.dispatcher().state().await != DispatcherState::Stopping {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();

    let metrics = timeout(Duration::from_millis(50), host.dispatcher().metrics())
        .await
        .expect("metrics do not wait for the consumer join");
    assert_eq!(metrics.state, DispatcherState::Stopping);
    assert!(!metrics.running);

    stopping.await.unwrap().unwrap();
    assert_eq!(host.dispatcher().metrics().await.processed, 10);
}
