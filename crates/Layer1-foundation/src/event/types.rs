//! Event Record Types - 호스트 영속화 포맷
//!
//! 플러그인이 보낸 이벤트는 디스패처에서 `EventRecord`로 변환되어 저장됩니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Event Kind
// ============================================================================

/// `event_type` 문자열 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionStarted,
    SessionEnded,
    ChatStarted,
    /// `chat.ended` 와 `chat.end` 둘 다
    ChatEnded,
    ToolUsed,
    FileChanged,
    /// `task.*`
    Task,
    Custom,
}

impl EventKind {
    /// 이벤트 타입 문자열에서 분류
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            "session.started" | "session.start" => Self::SessionStarted,
            "session.ended" | "session.end" => Self::SessionEnded,
            "chat.started" | "chat.start" => Self::ChatStarted,
            "chat.ended" | "chat.end" => Self::ChatEnded,
            "tool.used" | "tool.pre_use" | "tool.post_use" => Self::ToolUsed,
            "file.changed" | "file.created" | "file.deleted" => Self::FileChanged,
            t if t.starts_with("task.") => Self::Task,
            _ => Self::Custom,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStarted => "session_started",
            Self::SessionEnded => "session_ended",
            Self::ChatStarted => "chat_started",
            Self::ChatEnded => "chat_ended",
            Self::ToolUsed => "tool_used",
            Self::FileChanged => "file_changed",
            Self::Task => "task",
            Self::Custom => "custom",
        }
    }

    /// 저장된 문자열에서 복원 (알 수 없으면 Custom)
    pub fn parse(s: &str) -> Self {
        match s {
            "session_started" => Self::SessionStarted,
            "session_ended" => Self::SessionEnded,
            "chat_started" => Self::ChatStarted,
            "chat_ended" => Self::ChatEnded,
            "tool_used" => Self::ToolUsed,
            "file_changed" => Self::FileChanged,
            "task" => Self::Task,
            _ => Self::Custom,
        }
    }

    /// 세션 종료로 취급되는 이벤트인지
    pub fn ends_session(&self) -> bool {
        matches!(self, Self::SessionEnded | Self::ChatEnded)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// EventRecord
// ============================================================================

/// 저장 포맷 이벤트
///
/// `payload`/`metadata`는 JSON 텍스트로 보관합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// UUID v4
    pub id: String,
    pub event_type: String,
    pub kind: EventKind,
    pub source: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: String,
    pub metadata: String,
    pub version: String,
}

impl EventRecord {
    /// 새 레코드 (id 자동 생성, kind는 event_type에서 분류)
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        let event_type = event_type.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: EventKind::from_type(&event_type),
            event_type,
            source: source.into(),
            session_id: session_id.into(),
            timestamp: Utc::now(),
            payload: "{}".to_string(),
            metadata: "{}".to_string(),
            version: "1.0".to_string(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// payload 파싱
    pub fn payload_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.payload)
    }

    /// metadata 파싱
    pub fn metadata_map(&self) -> serde_json::Result<HashMap<String, String>> {
        serde_json::from_str(&self.metadata)
    }
}

// ============================================================================
// ActivityRecord
// ============================================================================

/// 세션별 활동 집계 (스토어가 유지)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub session_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub event_count: u64,
    pub last_event_type: String,
    pub ended: bool,
}

impl ActivityRecord {
    /// 첫 이벤트로 집계 시작
    pub fn first(record: &EventRecord) -> Self {
        Self {
            session_id: record.session_id.clone(),
            first_seen: record.timestamp,
            last_seen: record.timestamp,
            event_count: 1,
            last_event_type: record.event_type.clone(),
            ended: record.kind.ends_session(),
        }
    }

    /// 이벤트 하나 반영
    pub fn observe(&mut self, record: &EventRecord) {
        self.event_count += 1;
        if record.timestamp < self.first_seen {
            self.first_seen = record.timestamp;
        }
        if record.timestamp >= self.last_seen {
            self.last_seen = record.timestamp;
            self.last_event_type = record.event_type.clone();
        }
        if record.kind.ends_session() {
            self.ended = true;
        }
    }
}
