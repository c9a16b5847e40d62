//! Event Dispatcher - 다수 producer, 단일 consumer 파이프라인
//!
//! 상태 전이: `Stopped → Starting → Running → Stopping → Stopped`
//!
//! start/stop은 `lifecycle` 뮤텍스로 직렬화되고, 상태 조회(`state`, `sink`,
//! `metrics`)는 짧은 `status` 락만 잡으므로 stop이 consumer를 기다리는
//! 동안에도 막히지 않습니다.

use super::convert::to_record;
use plexus_foundation::{DispatcherConfig, Error, EventStore, Result};
use plexus_sdk::{Event, EventSink, Plugin};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ============================================================================
// State / Metrics
// ============================================================================

/// 디스패처 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl DispatcherState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 디스패처 지표 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatcherMetrics {
    pub state: DispatcherState,
    pub running: bool,
    pub producer_count: usize,
    /// 저장 성공 누적
    pub processed: u64,
    /// 저장 실패 누적 (이벤트는 버려짐)
    pub failed: u64,
    pub queue_len: usize,
    pub queue_capacity: usize,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
}

/// 조회용 상태 (await 중에는 잡지 않음)
struct Status {
    state: DispatcherState,
    producer_count: usize,
    sink: Option<EventSink>,
}

/// start/stop/register가 공유하는 상태
struct Lifecycle {
    producers: Vec<Arc<dyn Plugin>>,
    cancel: Option<CancellationToken>,
    consumer: Option<JoinHandle<()>>,
    /// shutdown_timeout 안에 끝나지 않은 이전 consumer
    lingering: Option<JoinHandle<()>>,
}

// ============================================================================
// EventDispatcher
// ============================================================================

pub struct EventDispatcher {
    store: Arc<dyn EventStore>,
    config: DispatcherConfig,
    /// start마다 이 토큰의 child를 사용
    root: CancellationToken,
    counters: Arc<Counters>,
    lifecycle: Mutex<Lifecycle>,
    status: RwLock<Status>,
}

impl EventDispatcher {
    pub fn new(store: Arc<dyn EventStore>, config: DispatcherConfig) -> Self {
        Self {
            store,
            config,
            root: CancellationToken::new(),
            counters: Arc::new(Counters::default()),
            lifecycle: Mutex::new(Lifecycle {
                producers: Vec::new(),
                cancel: None,
                consumer: None,
                lingering: None,
            }),
            status: RwLock::new(Status {
                state: DispatcherState::Stopped,
                producer_count: 0,
                sink: None,
            }),
        }
    }

    fn status(&self) -> RwLockReadGuard<'_, Status> {
        self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_status(&self, f: impl FnOnce(&mut Status)) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }

    fn set_state(&self, state: DispatcherState) {
        self.update_status(|status| status.state = state);
    }

    /// 이벤트 producer 등록
    ///
    /// 실행 중이면 즉시 스트림을 시작합니다.
    pub async fn register_producer(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let name = plugin.info().name;
        let Some(emitter) = plugin.as_event_emitter() else {
            return Err(Error::InvalidArgument(format!(
                "plugin '{}' is not an event emitter",
                name
            )));
        };

        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.producers.iter().any(|p| p.info().name == name) {
            return Err(Error::AlreadyExists(format!("producer '{}'", name)));
        }

        let sink = {
            let status = self.status();
            match status.state {
                DispatcherState::Running => status.sink.clone(),
                _ => None,
            }
        };
        if let (Some(cancel), Some(sink)) = (lifecycle.cancel.clone(), sink) {
            if let Err(e) = emitter.start_event_stream(cancel, sink).await {
                warn!(producer = %name, error = %e, "Failed to start event stream");
            }
        }

        debug!(producer = %name, "Registered event producer");
        lifecycle.producers.push(plugin);
        let count = lifecycle.producers.len();
        self.update_status(|status| status.producer_count = count);
        Ok(())
    }

    /// 파이프라인 시작
    ///
    /// 이전 stop에서 시간 초과로 남은 consumer가 있으면 그 작업이 끝난 뒤에
    /// 새 consumer를 띄웁니다. 저장소 쓰기는 항상 한 번에 하나입니다.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let state = self.status().state;
        if state != DispatcherState::Stopped {
            return Err(Error::AlreadyRunning(format!("dispatcher is {}", state)));
        }
        self.set_state(DispatcherState::Starting);

        if let Some(previous) = lifecycle.lingering.take() {
            debug!("Waiting for the previous event consumer to finish draining");
            if let Err(e) = previous.await {
                error!(error = %e, "Event consumer task failed");
            }
        }

        let (sink, rx) = EventSink::channel(self.config.queue_capacity);
        let cancel = self.root.child_token();

        let consumer = tokio::spawn(consume(
            rx,
            cancel.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.counters),
        ));

        for producer in &lifecycle.producers {
            let Some(emitter) = producer.as_event_emitter() else {
                continue;
            };
            if let Err(e) = emitter.start_event_stream(cancel.clone(), sink.clone()).await {
                warn!(
                    producer = %producer.info().name,
                    error = %e,
                    "Failed to start event stream"
                );
            }
        }

        lifecycle.cancel = Some(cancel);
        lifecycle.consumer = Some(consumer);
        self.update_status(|status| {
            status.sink = Some(sink);
            status.state = DispatcherState::Running;
        });

        info!(
            producers = lifecycle.producers.len(),
            capacity = self.config.queue_capacity,
            "Event dispatcher started"
        );
        Ok(())
    }

    /// 파이프라인 정지
    ///
    /// producer 정지 → 취소 → 큐 비우기 → consumer join (최대 shutdown_timeout)
    pub async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let state = self.status().state;
        if state != DispatcherState::Running {
            return Err(Error::NotRunning(format!("dispatcher is {}", state)));
        }
        self.set_state(DispatcherState::Stopping);

        for producer in &lifecycle.producers {
            let Some(emitter) = producer.as_event_emitter() else {
                continue;
            };
            if let Err(e) = emitter.stop_event_stream().await {
                warn!(
                    producer = %producer.info().name,
                    error = %e,
                    "Failed to stop event stream"
                );
            }
        }

        if let Some(cancel) = lifecycle.cancel.take() {
            cancel.cancel();
        }
        self.update_status(|status| status.sink = None);

        if let Some(mut consumer) = lifecycle.consumer.take() {
            let timeout = self.config.shutdown_timeout();
            let joined = tokio::time::timeout(timeout, &mut consumer).await;
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Event consumer task failed"),
                Err(_) => {
                    warn!(
                        timeout_ms = timeout.as_millis() as u64,
                        "Event consumer did not finish in time; it keeps draining in the background"
                    );
                    lifecycle.lingering = Some(consumer);
                }
            }
        }

        self.set_state(DispatcherState::Stopped);
        info!(
            processed = self.counters.processed.load(Ordering::Relaxed),
            failed = self.counters.failed.load(Ordering::Relaxed),
            "Event dispatcher stopped"
        );
        Ok(())
    }

    /// 큐 쓰기 핸들 (실행 중일 때만)
    pub async fn sink(&self) -> Result<EventSink> {
        let status = self.status();
        match (status.state, &status.sink) {
            (DispatcherState::Running, Some(sink)) => Ok(sink.clone()),
            _ => Err(Error::NotRunning("dispatcher is not running".to_string())),
        }
    }

    pub async fn state(&self) -> DispatcherState {
        self.status().state
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == DispatcherState::Running
    }

    pub async fn metrics(&self) -> DispatcherMetrics {
        let status = self.status();
        DispatcherMetrics {
            state: status.state,
            running: status.state == DispatcherState::Running,
            producer_count: status.producer_count,
            processed: self.counters.processed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            queue_len: status.sink.as_ref().map(EventSink::queued).unwrap_or(0),
            queue_capacity: self.config.queue_capacity,
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

// ============================================================================
// Consumer
// ============================================================================

async fn consume(
    mut rx: mpsc::Receiver<Event>,
    cancel: CancellationToken,
    store: Arc<dyn EventStore>,
    counters: Arc<Counters>,
) {
    debug!("Event consumer started");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            received = rx.recv() => match received {
                Some(event) => persist(&event, store.as_ref(), &counters).await,
                None => break,
            },
        }
    }

    // Drain mode
    let mut drained = 0usize;
    while let Ok(event) = rx.try_recv() {
        persist(&event, store.as_ref(), &counters).await;
        drained += 1;
    }

    debug!(drained, "Event consumer finished");
}

async fn persist(event: &Event, store: &dyn EventStore, counters: &Counters) {
    let result = match to_record(event) {
        Ok(record) => store.emit_event(&record).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            counters.processed.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                event_type = %event.event_type,
                source = %event.source,
                error = %e,
                "Dropping event after persistence failure"
            );
        }
    }
}
