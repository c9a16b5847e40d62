//! # plexus-sdk
//!
//! Plugin SDK for Plexus. Plugins depend on this crate only; the host
//! adapts these types into its own representations.
//!
//! - `plugin`: 기본 계약 (`Plugin`) 과 capability trait들
//! - `entity`: SDK 엔티티 계약, 쿼리, `RecordEntity`
//! - `event`: 도메인 이벤트 (`Event`)
//! - `sink`: 호스트 이벤트 큐 쓰기 핸들 (`EventSink`)
//! - `command`: CLI 명령어와 실행 컨텍스트
//! - `activity`: 세션 활동 요약
//!
//! ## 아키텍처
//!
//! ```text
//! ┌──────────────┐   as_event_emitter()   ┌───────────────────┐
//! │   Plugin     │ ─────────────────────▶ │ host dispatcher   │
//! │ (SDK traits) │   EventSink::emit()    │ (bounded queue)   │
//! │              │ ─────────────────────▶ │  └─ consumer ──▶ store
//! └──────────────┘                        └───────────────────┘
//! ```

pub mod activity;
pub mod command;
pub mod entity;
pub mod error;
pub mod event;
pub mod plugin;
pub mod sink;

pub use activity::ActivityRecord;
pub use command::{Command, CommandContext};
pub use entity::{
    entity_supports, field_value, value_as_string, Contextual, Entity, EntityLink, EntityQuery,
    EntityTypeDescriptor, EntityUpdate, RecordEntity, Relatable, Schedulable, SortOrder,
    Trackable, CAP_CONTEXTUAL, CAP_RELATABLE, CAP_SCHEDULABLE, CAP_TRACKABLE,
};
pub use error::{PluginError, Result};
pub use event::{Event, DEFAULT_EVENT_VERSION, SESSION_ID_KEY};
pub use plugin::{
    Capability, CommandProvider, EntityProvider, EntityUpdater, EventEmitter, Plugin, PluginInfo,
};
pub use sink::EventSink;

/// Re-exported so plugins don't need a direct tokio-util dependency
pub use tokio_util::sync::CancellationToken;
