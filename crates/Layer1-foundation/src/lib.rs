//! # plexus-foundation
//!
//! Foundation layer for Plexus:
//! - Error: 호스트 에러 분류 (`Error`, `Result`)
//! - Config: 통합 설정 (PlexusConfig, DispatcherConfig, ExternalPluginConfig)
//! - Event: 영속화 포맷 (EventRecord, EventKind, ActivityRecord)
//! - Storage: 이벤트 영속화 포트 (`EventStore`), SQLite (`Storage`), JsonStore (범용)
//!
//! ## 아키텍처
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  dispatcher consumer (plexus-core)           │
//! │            │ EventRecord                     │
//! │            ▼                                 │
//! │  EventStore::emit_event ──▶ Storage (SQLite) │
//! │                               ├── events     │
//! │                               └── activity   │
//! │                                              │
//! │  PlexusConfig ◀── JsonStore (global/project) │
//! └──────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    DispatcherConfig, ExternalPluginConfig, PlexusConfig, LOG_FILE, PLEXUS_CONFIG_FILE,
};

// ============================================================================
// Event (영속화 포맷)
// ============================================================================
pub use event::{ActivityRecord, EventKind, EventRecord};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{EventStore, JsonStore, Storage, DB_FILE};
