//! Stdio Transport - 서브프로세스 플러그인과의 NDJSON 통신
//!
//! 한 줄에 JSON 객체 하나:
//! - 요청: `{"id": n, "method": m, "params": p}`
//! - 응답: `{"id": n, "result": r}` 또는 `{"id": n, "error": {"code": c, "message": s}}`
//! - 알림 (자식 → 호스트): `{"method": "event", "params": <event>}`

use plexus_sdk::{EventSink, PluginError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// 요청 타임아웃 기본값
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRequest {
    pub id: u64,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<WireError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub code: i64,
    pub message: String,
}

impl WireError {
    pub const NOT_FOUND: i64 = -32001;
    pub const INVALID_ARGUMENT: i64 = -32602;
    pub const PERMISSION_DENIED: i64 = -32003;
    pub const READ_ONLY: i64 = -32004;

    /// 에러 코드를 PluginError로
    pub fn into_plugin_error(self) -> PluginError {
        match self.code {
            Self::NOT_FOUND => PluginError::NotFound(self.message),
            Self::INVALID_ARGUMENT => PluginError::InvalidArgument(self.message),
            Self::PERMISSION_DENIED => PluginError::PermissionDenied(self.message),
            Self::READ_ONLY => PluginError::ReadOnly(self.message),
            code => PluginError::Internal(format!("plugin error {}: {}", code, self.message)),
        }
    }
}

type Pending = Arc<RwLock<HashMap<u64, oneshot::Sender<std::result::Result<Value, WireError>>>>>;

// ============================================================================
// StdioTransport
// ============================================================================

/// 프로세스 기반 통신
pub struct StdioTransport {
    /// 플러그인 이름 (로그, 이벤트 source 기본값)
    name: String,

    request_id: AtomicU64,

    child: Mutex<Option<Child>>,

    /// stdin writer
    outgoing: mpsc::Sender<String>,

    pending: Pending,

    /// start_events 이후 이벤트 알림이 흘러갈 곳
    events: Arc<RwLock<Option<EventSink>>>,

    connected: Arc<AtomicBool>,

    timeout: Duration,
}

impl StdioTransport {
    /// 프로세스 시작 후 transport 생성
    pub async fn spawn(
        name: &str,
        program: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        info!(plugin = %name, "Spawning plugin process: {} {:?}", program, args);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            PluginError::Internal(format!("Failed to spawn plugin process '{}': {}", program, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PluginError::internal("Failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PluginError::internal("Failed to capture stdout"))?;

        // stderr는 진단 로그로만
        if let Some(stderr) = child.stderr.take() {
            let plugin = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(plugin = %plugin, "stderr: {}", line);
                }
            });
        }

        let transport = Self::from_streams(name, stdin, stdout);
        *transport.child.lock().await = Some(child);
        Ok(transport)
    }

    /// 임의 스트림 위에 transport 구성 (테스트, 인-프로세스 연결)
    pub fn from_streams<W, R>(name: &str, writer: W, reader: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (outgoing, mut outgoing_rx) = mpsc::channel::<String>(32);
        let pending: Pending = Arc::new(RwLock::new(HashMap::new()));
        let events: Arc<RwLock<Option<EventSink>>> = Arc::new(RwLock::new(None));
        let connected = Arc::new(AtomicBool::new(true));

        // writer task
        let connected_for_writer = Arc::clone(&connected);
        let mut writer = writer;
        tokio::spawn(async move {
            while let Some(line) = outgoing_rx.recv().await {
                let written = async {
                    writer.write_all(line.as_bytes()).await?;
                    writer.flush().await
                }
                .await;
                if let Err(e) = written {
                    error!("Failed to write to plugin stdin: {}", e);
                    connected_for_writer.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        // reader task
        let plugin = name.to_string();
        let pending_for_reader = Arc::clone(&pending);
        let events_for_reader = Arc::clone(&events);
        let connected_for_reader = Arc::clone(&connected);
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                let message = match serde_json::from_str::<WireMessage>(&line) {
                    Ok(message) => message,
                    Err(e) => {
                        debug!(plugin = %plugin, "Ignoring non-protocol line: {}", e);
                        continue;
                    }
                };

                match (message.id, message.method.as_deref()) {
                    (Some(id), None) => {
                        let outcome = match message.error {
                            Some(err) => Err(err),
                            None => Ok(message.result.unwrap_or(Value::Null)),
                        };
                        if let Some(sender) = pending_for_reader.write().await.remove(&id) {
                            let _ = sender.send(outcome);
                        }
                    }
                    (None, Some("event")) => {
                        let sink = events_for_reader.read().await.clone();
                        forward_event(&plugin, sink, message.params).await;
                    }
                    _ => debug!(plugin = %plugin, "Ignoring unexpected message"),
                }
            }

            connected_for_reader.store(false, Ordering::SeqCst);
            // 남은 요청은 채널 종료로 깨어남
            pending_for_reader.write().await.clear();
            info!(plugin = %plugin, "Plugin stdout closed");
        });

        Self {
            name: name.to_string(),
            request_id: AtomicU64::new(1),
            child: Mutex::new(None),
            outgoing,
            pending,
            events,
            connected,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// 요청 전송 및 응답 수신
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.request_with_timeout(method, params, self.timeout).await
    }

    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        if !self.is_connected() {
            return Err(PluginError::Internal(format!(
                "plugin '{}' is not connected",
                self.name
            )));
        }

        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.write().await.insert(id, tx);

        let line = serde_json::to_string(&WireRequest {
            id,
            method: method.to_string(),
            params,
        })?;
        debug!(plugin = %self.name, method, id, "Sending request");

        if self.outgoing.send(format!("{}\n", line)).await.is_err() {
            self.pending.write().await.remove(&id);
            return Err(PluginError::Internal(format!(
                "plugin '{}' stdin is closed",
                self.name
            )));
        }

        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                return Err(PluginError::Internal(format!(
                    "plugin '{}' closed before answering '{}'",
                    self.name, method
                )))
            }
            Err(_) => {
                self.pending.write().await.remove(&id);
                return Err(PluginError::Internal(format!(
                    "plugin '{}' timed out on '{}'",
                    self.name, method
                )));
            }
        };

        outcome.map_err(WireError::into_plugin_error)
    }

    /// 이벤트 알림 연결
    pub async fn attach_events(&self, sink: EventSink) {
        *self.events.write().await = Some(sink);
    }

    /// 이벤트 알림 해제 (이후 이벤트는 버려짐)
    pub async fn detach_events(&self) {
        *self.events.write().await = None;
    }

    /// 연결 종료
    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.detach_events().await;

        let mut child = self.child.lock().await;
        if let Some(mut child) = child.take() {
            let _ = child.kill().await;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// 자식이 보낸 이벤트를 파이프라인에 넣기
///
/// `source`가 없으면 플러그인 이름으로 채웁니다.
async fn forward_event(plugin: &str, sink: Option<EventSink>, params: Option<Value>) {
    let Some(sink) = sink else {
        debug!(plugin = %plugin, "Event received while not streaming; dropped");
        return;
    };

    let mut value = params.unwrap_or(Value::Null);
    if let Some(object) = value.as_object_mut() {
        let missing_source = object
            .get("source")
            .and_then(Value::as_str)
            .map_or(true, |s| s.trim().is_empty());
        if missing_source {
            object.insert("source".to_string(), Value::String(plugin.to_string()));
        }
    }

    if let Err(e) = sink.emit_json(value).await {
        warn!(plugin = %plugin, error = %e, "Rejected event from plugin");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader, DuplexStream};

    /// (transport, 자식 쪽 stdin 리더, 자식 쪽 stdout 라이터)
    fn pair() -> (StdioTransport, BufReader<DuplexStream>, DuplexStream) {
        let (host_out, child_in) = duplex(4096);
        let (child_out, host_in) = duplex(4096);
        let transport = StdioTransport::from_streams("fake", host_out, host_in);
        (transport, BufReader::new(child_in), child_out)
    }

    async fn read_request(reader: &mut BufReader<DuplexStream>) -> WireRequest {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_request_response() {
        let (transport, mut child_in, mut child_out) = pair();

        let child = tokio::spawn(async move {
            let request = read_request(&mut child_in).await;
            assert_eq!(request.method, "info");
            let reply = json!({"id": request.id, "result": {"name": "fake"}});
            child_out
                .write_all(format!("{}\n", reply).as_bytes())
                .await
                .unwrap();
            (child_in, child_out)
        });

        let result = transport.request("info", Value::Null).await.unwrap();
        assert_eq!(result["name"], "fake");
        child.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_codes_map() {
        let (transport, mut child_in, mut child_out) = pair();

        tokio::spawn(async move {
            for code in [-32001, -32004, -1] {
                let request = read_request(&mut child_in).await;
                let reply = json!({"id": request.id, "error": {"code": code, "message": "nope"}});
                child_out
                    .write_all(format!("{}\n", reply).as_bytes())
                    .await
                    .unwrap();
            }
        });

        assert!(matches!(
            transport.request("get_entity", json!({"id": "x"})).await,
            Err(PluginError::NotFound(_))
        ));
        assert!(matches!(
            transport.request("update_entity", json!({})).await,
            Err(PluginError::ReadOnly(_))
        ));
        assert!(matches!(
            transport.request("query", json!({})).await,
            Err(PluginError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_event_notifications() {
        let (transport, _child_in, mut child_out) = pair();
        let (sink, mut rx) = EventSink::channel(8);

        // not attached: dropped
        let early = json!({"method": "event", "params": {"type": "a.b", "metadata": {"session_id": "s"}}});
        child_out
            .write_all(format!("{}\n", early).as_bytes())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        transport.attach_events(sink).await;

        let event = json!({"method": "event", "params": {"type": "task.created", "metadata": {"session_id": "s"}}});
        let invalid = json!({"method": "event", "params": {"type": "", "metadata": {"session_id": "s"}}});
        child_out
            .write_all(format!("{}\n{}\n{}\n", invalid, "not json", event).as_bytes())
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, "task.created");
        assert_eq!(received.source, "fake");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_child_fails_pending() {
        let (transport, child_in, child_out) = pair();
        drop(child_out);
        drop(child_in);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!transport.is_connected());
        assert!(transport.request("info", Value::Null).await.is_err());
    }
}
