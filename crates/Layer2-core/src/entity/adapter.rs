//! SDK ↔ host 변환
//!
//! 모든 변환은 필드 단위 복사이며 경계를 넘어 참조를 공유하지 않습니다.

use super::{
    Contextual, Entity, EntityLink, EntityQuery, EntityTypeInfo, Relatable, Schedulable,
    Trackable,
};
use chrono::{DateTime, Utc};
use plexus_foundation::ActivityRecord;
use plexus_sdk as sdk;
use serde_json::{json, Map, Value};

/// SDK 엔티티를 호스트 계약으로 감싸는 어댑터
pub struct EntityAdapter {
    inner: Box<dyn sdk::Entity>,
    plugin: String,
}

impl EntityAdapter {
    pub fn new(inner: Box<dyn sdk::Entity>, plugin: impl Into<String>) -> Self {
        Self {
            inner,
            plugin: plugin.into(),
        }
    }

    /// 원본 SDK 엔티티
    pub fn inner(&self) -> &dyn sdk::Entity {
        self.inner.as_ref()
    }

    /// CLI 출력용 JSON
    pub fn to_json(&self) -> Value {
        let mut value = json!({
            "id": self.id(),
            "type": self.entity_type(),
            "plugin": self.plugin,
            "capabilities": Entity::capabilities(self),
            "fields": Value::Object(self.fields()),
        });

        if self.is_trackable() {
            value["status"] = json!(self.status());
            value["progress"] = json!(self.progress());
        }
        if self.is_schedulable() {
            value["start_date"] = json!(self.start_date());
            value["due_date"] = json!(self.due_date());
        }
        if self.is_relatable() {
            value["links"] = json!(self.links());
        }
        value
    }
}

impl std::fmt::Debug for EntityAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityAdapter")
            .field("plugin", &self.plugin)
            .field("id", &self.id())
            .field("type", &self.entity_type())
            .finish()
    }
}

impl Entity for EntityAdapter {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn entity_type(&self) -> &str {
        self.inner.entity_type()
    }

    fn plugin(&self) -> &str {
        &self.plugin
    }

    fn capabilities(&self) -> Vec<String> {
        self.inner.capabilities()
    }

    fn field(&self, name: &str) -> Option<Value> {
        sdk::field_value(self.inner.as_ref(), name)
    }

    fn fields(&self) -> Map<String, Value> {
        self.inner.fields()
    }
}

impl Contextual for EntityAdapter {
    fn is_contextual(&self) -> bool {
        self.inner.as_contextual().is_some()
    }

    fn context(&self) -> String {
        self.inner
            .as_contextual()
            .map(|c| c.context())
            .unwrap_or_default()
    }

    fn related_entities(&self) -> Vec<String> {
        self.inner
            .as_contextual()
            .map(|c| c.related_entities())
            .unwrap_or_default()
    }
}

impl Trackable for EntityAdapter {
    fn is_trackable(&self) -> bool {
        self.inner.as_trackable().is_some()
    }

    fn status(&self) -> String {
        self.inner
            .as_trackable()
            .map(|t| t.status())
            .unwrap_or_default()
    }

    fn progress(&self) -> f64 {
        self.inner.as_trackable().map(|t| t.progress()).unwrap_or(0.0)
    }
}

impl Schedulable for EntityAdapter {
    fn is_schedulable(&self) -> bool {
        self.inner.as_schedulable().is_some()
    }

    fn start_date(&self) -> Option<DateTime<Utc>> {
        self.inner.as_schedulable().and_then(|s| s.start_date())
    }

    fn due_date(&self) -> Option<DateTime<Utc>> {
        self.inner.as_schedulable().and_then(|s| s.due_date())
    }
}

impl Relatable for EntityAdapter {
    fn is_relatable(&self) -> bool {
        self.inner.as_relatable().is_some()
    }

    fn links(&self) -> Vec<EntityLink> {
        self.inner
            .as_relatable()
            .map(|r| {
                r.links()
                    .into_iter()
                    .map(|link| EntityLink {
                        target_id: link.target_id,
                        relation: link.relation,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ============================================================================
// Query / type / activity translation
// ============================================================================

pub fn query_to_sdk(query: &EntityQuery) -> sdk::EntityQuery {
    sdk::EntityQuery {
        entity_type: query.entity_type.clone(),
        capabilities: query.capabilities.clone(),
        filters: query.filters.clone(),
        limit: query.limit,
        offset: query.offset,
        sort_by: query.sort_by.clone(),
        sort_order: if query.descending {
            sdk::SortOrder::Desc
        } else {
            sdk::SortOrder::Asc
        },
    }
}

pub fn type_info_from_sdk(descriptor: &sdk::EntityTypeDescriptor, plugin: &str) -> EntityTypeInfo {
    EntityTypeInfo {
        name: descriptor.name.clone(),
        description: descriptor.description.clone(),
        capabilities: descriptor.capabilities.clone(),
        plugin: plugin.to_string(),
    }
}

pub fn activity_to_sdk(record: &ActivityRecord) -> sdk::ActivityRecord {
    sdk::ActivityRecord {
        session_id: record.session_id.clone(),
        first_seen: record.first_seen,
        last_seen: record.last_seen,
        event_count: record.event_count,
        last_event_type: record.last_event_type.clone(),
        ended: record.ended,
    }
}

pub fn activity_from_sdk(record: &sdk::ActivityRecord) -> ActivityRecord {
    ActivityRecord {
        session_id: record.session_id.clone(),
        first_seen: record.first_seen,
        last_seen: record.last_seen,
        event_count: record.event_count,
        last_event_type: record.last_event_type.clone(),
        ended: record.ended,
    }
}
