//! Entity - 호스트 엔티티 계약과 쿼리 라우팅
//!
//! 플러그인이 돌려준 SDK 엔티티는 `EntityAdapter`로 감싸져 호스트 계약을
//! 구현합니다. 지원하지 않는 refinement는 빈 값으로 응답합니다.
//!
//! ```text
//! EntityService::query(EntityQuery)
//!     │ query_to_sdk
//!     ▼
//! plugin A ─┐
//! plugin B ─┼─▶ Box<dyn sdk::Entity> ──▶ EntityAdapter ──▶ filter/sort/page
//! plugin C ─┘
//! ```

mod adapter;
mod service;

pub use adapter::{
    activity_from_sdk, activity_to_sdk, query_to_sdk, type_info_from_sdk, EntityAdapter,
};
pub use service::EntityService;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

// ============================================================================
// Host contracts
// ============================================================================

/// 기본 엔티티 계약
pub trait Entity: Send + Sync {
    fn id(&self) -> &str;

    fn entity_type(&self) -> &str;

    /// 엔티티를 돌려준 플러그인
    fn plugin(&self) -> &str;

    fn capabilities(&self) -> Vec<String>;

    fn field(&self, name: &str) -> Option<Value>;

    fn fields(&self) -> Map<String, Value>;
}

pub trait Contextual {
    fn is_contextual(&self) -> bool;

    fn context(&self) -> String;

    fn related_entities(&self) -> Vec<String>;
}

pub trait Trackable {
    fn is_trackable(&self) -> bool;

    fn status(&self) -> String;

    fn progress(&self) -> f64;
}

pub trait Schedulable {
    fn is_schedulable(&self) -> bool;

    fn start_date(&self) -> Option<DateTime<Utc>>;

    fn due_date(&self) -> Option<DateTime<Utc>>;
}

pub trait Relatable {
    fn is_relatable(&self) -> bool;

    fn links(&self) -> Vec<EntityLink>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLink {
    pub target_id: String,
    pub relation: String,
}

// ============================================================================
// Query / type info
// ============================================================================

/// 호스트 쪽 엔티티 쿼리
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityQuery {
    pub entity_type: Option<String>,

    /// 모두 만족해야 함
    pub capabilities: Vec<String>,

    pub filters: HashMap<String, String>,

    pub limit: Option<usize>,

    pub offset: usize,

    pub sort_by: Option<String>,

    pub descending: bool,
}

impl EntityQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: Some(entity_type.into()),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn sorted_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.sort_by = Some(field.into());
        self.descending = descending;
        self
    }
}

/// 엔티티 타입 정보 (제공 플러그인 포함)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTypeInfo {
    pub name: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub plugin: String,
}
