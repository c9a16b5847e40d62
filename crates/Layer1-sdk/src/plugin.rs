//! Plugin traits - 플러그인 기능(capability) 계약
//!
//! 플러그인은 필요한 capability trait만 구현합니다. 공통 베이스 클래스는 없고,
//! 호스트는 `as_*` probe로 지원 여부를 확인합니다.
//!
//! ```ignore
//! struct TaskPlugin { /* ... */ }
//!
//! impl Plugin for TaskPlugin {
//!     fn info(&self) -> PluginInfo { PluginInfo::new("tasks", "0.1.0") }
//!     fn as_entity_provider(&self) -> Option<&dyn EntityProvider> { Some(self) }
//!     fn as_any(&self) -> &dyn Any { self }
//! }
//!
//! #[async_trait]
//! impl EntityProvider for TaskPlugin { /* ... */ }
//! ```

use crate::command::Command;
use crate::entity::{Entity, EntityQuery, EntityTypeDescriptor, EntityUpdate};
use crate::{EventSink, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ============================================================================
// PluginInfo
// ============================================================================

/// Plugin identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Shipped with the host rather than installed separately
    #[serde(default)]
    pub is_core: bool,
}

impl PluginInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            is_core: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn core(mut self) -> Self {
        self.is_core = true;
        self
    }
}

// ============================================================================
// Capability
// ============================================================================

/// Optional plugin capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    EntityProvider,
    EntityUpdater,
    CommandProvider,
    EventEmitter,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::EntityProvider,
        Capability::EntityUpdater,
        Capability::CommandProvider,
        Capability::EventEmitter,
    ];

    /// Wire name used in capability lists and the subprocess protocol
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntityProvider => "IEntityProvider",
            Self::EntityUpdater => "IEntityUpdater",
            Self::CommandProvider => "ICommandProvider",
            Self::EventEmitter => "IEventEmitter",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// Probe a plugin for this capability
    pub fn is_supported_by(&self, plugin: &dyn Plugin) -> bool {
        match self {
            Self::EntityProvider => plugin.as_entity_provider().is_some(),
            Self::EntityUpdater => plugin.as_entity_updater().is_some(),
            Self::CommandProvider => plugin.as_command_provider().is_some(),
            Self::EventEmitter => plugin.as_event_emitter().is_some(),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Plugin - 기본 계약
// ============================================================================

/// Base identity contract every plugin implements
pub trait Plugin: Send + Sync {
    fn info(&self) -> PluginInfo;

    /// Declared capability names, for display and introspection
    ///
    /// The default reports whatever the probes say.
    fn capabilities(&self) -> Vec<String> {
        let probes = [
            (Capability::EntityProvider, self.as_entity_provider().is_some()),
            (Capability::EntityUpdater, self.as_entity_updater().is_some()),
            (Capability::CommandProvider, self.as_command_provider().is_some()),
            (Capability::EventEmitter, self.as_event_emitter().is_some()),
        ];
        probes
            .into_iter()
            .filter(|(_, supported)| *supported)
            .map(|(cap, _)| cap.as_str().to_string())
            .collect()
    }

    fn as_entity_provider(&self) -> Option<&dyn EntityProvider> {
        None
    }

    fn as_entity_updater(&self) -> Option<&dyn EntityUpdater> {
        None
    }

    fn as_command_provider(&self) -> Option<&dyn CommandProvider> {
        None
    }

    fn as_event_emitter(&self) -> Option<&dyn EventEmitter> {
        None
    }

    /// 타입 캐스팅을 위한 헬퍼 (다운캐스팅 지원)
    fn as_any(&self) -> &dyn Any;
}

// ============================================================================
// Capability traits
// ============================================================================

/// Serves entities of one or more types
#[async_trait]
pub trait EntityProvider: Send + Sync {
    fn entity_types(&self) -> Vec<EntityTypeDescriptor>;

    async fn query(&self, query: &EntityQuery) -> Result<Vec<Box<dyn Entity>>>;

    async fn get_entity(&self, id: &str) -> Result<Box<dyn Entity>>;
}

/// Accepts field updates on entities it owns
#[async_trait]
pub trait EntityUpdater: Send + Sync {
    async fn update_entity(&self, update: &EntityUpdate) -> Result<Box<dyn Entity>>;
}

/// Exposes CLI commands
pub trait CommandProvider: Send + Sync {
    fn commands(&self) -> Vec<Arc<dyn Command>>;
}

/// Streams events into the host queue
#[async_trait]
pub trait EventEmitter: Send + Sync {
    /// Begin producing. Must return promptly and stop pushing once `cancel` fires.
    async fn start_event_stream(&self, cancel: CancellationToken, sink: EventSink) -> Result<()>;

    /// Best-effort halt of production
    async fn stop_event_stream(&self) -> Result<()>;
}
