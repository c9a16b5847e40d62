//! plexus-core: Plexus 호스트 런타임
//!
//! Layer2 - 플러그인을 모아 하나의 호스트로 묶는 레이어
//!
//! # 주요 모듈
//!
//! - `plugin`: 플러그인 레지스트리 (이름/capability 인덱스)
//! - `entity`: 호스트 엔티티 모델 + 플러그인 간 질의 라우팅
//! - `command`: 명령 목록/해석/실행
//! - `dispatch`: 이벤트 파이프라인 (producer → 큐 → EventStore)
//! - `external`: stdio 서브프로세스 플러그인
//! - `builtin`: core 플러그인 (`hooks`, `sessions`)
//! - `host`: 위 구성요소를 한 번에 묶는 구성 루트
//!
//! # 사용 예시
//!
//! ```ignore
//! use plexus_core::{Host, EntityQuery};
//! use plexus_foundation::PlexusConfig;
//!
//! let host = Host::open(PlexusConfig::load()?).await?;
//!
//! // 모든 플러그인의 엔티티 질의
//! let sessions = host
//!     .entities()
//!     .query(&EntityQuery::of_type("session").with_filter("status", "active"))
//!     .await?;
//!
//! // 명령 실행 (이벤트는 파이프라인을 거쳐 저장됨)
//! host.run_command("emit", &args, ctx).await?;
//! host.shutdown().await;
//! ```

pub mod builtin;
pub mod command;
pub mod dispatch;
pub mod entity;
pub mod external;
pub mod host;
pub mod plugin;

// Re-exports: Host
pub use host::Host;

// Re-exports: Plugin registry
pub use plugin::PluginRegistry;

// Re-exports: Entity
pub use entity::{
    Contextual, Entity, EntityAdapter, EntityLink, EntityQuery, EntityService, EntityTypeInfo,
    Relatable, Schedulable, Trackable,
};

// Re-exports: Command
pub use command::{CommandInfo, CommandRouter};

// Re-exports: Dispatch
pub use dispatch::{to_record, DispatcherMetrics, DispatcherState, EventDispatcher};

// Re-exports: External plugins
pub use external::{ExternalPlugin, StdioTransport};

// Re-exports: Builtin plugins
pub use builtin::{HooksPlugin, SessionsPlugin};
