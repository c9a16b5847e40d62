//! Sessions plugin - 세션 활동 집계를 엔티티로 노출

use crate::entity::activity_to_sdk;
use async_trait::async_trait;
use plexus_foundation::EventStore;
use plexus_sdk::{
    ActivityRecord, Entity, EntityProvider, EntityQuery, EntityTypeDescriptor, Plugin,
    PluginError, PluginInfo, RecordEntity, Result, CAP_CONTEXTUAL, CAP_SCHEDULABLE,
    CAP_TRACKABLE,
};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;

pub const SESSIONS_PLUGIN: &str = "sessions";
pub const SESSION_ENTITY: &str = "session";

pub struct SessionsPlugin {
    store: Arc<dyn EventStore>,
}

impl SessionsPlugin {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }
}

/// 활동 레코드 → `session` 엔티티
///
/// status/progress, start_date, context 필드를 채워 Trackable·Schedulable·Contextual로 보임
pub fn session_entity(activity: &ActivityRecord) -> RecordEntity {
    RecordEntity::new(&activity.session_id, SESSION_ENTITY)
        .with_field("status", json!(activity.status()))
        .with_field("progress", json!(if activity.ended { 1.0 } else { 0.0 }))
        .with_field("start_date", json!(activity.first_seen.to_rfc3339()))
        .with_field("first_seen", json!(activity.first_seen.to_rfc3339()))
        .with_field("last_seen", json!(activity.last_seen.to_rfc3339()))
        .with_field("event_count", json!(activity.event_count))
        .with_field("last_event_type", json!(activity.last_event_type))
        .with_field("duration_secs", json!(activity.duration_secs()))
        .with_field(
            "context",
            json!(format!(
                "{} events, last {}",
                activity.event_count, activity.last_event_type
            )),
        )
}

fn storage_error(e: plexus_foundation::Error) -> PluginError {
    PluginError::Internal(e.to_string())
}

impl Plugin for SessionsPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(SESSIONS_PLUGIN, env!("CARGO_PKG_VERSION"))
            .with_description("Session activity recorded by the event pipeline")
            .core()
    }

    fn as_entity_provider(&self) -> Option<&dyn EntityProvider> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl EntityProvider for SessionsPlugin {
    fn entity_types(&self) -> Vec<EntityTypeDescriptor> {
        vec![EntityTypeDescriptor::new(SESSION_ENTITY, "Sessions seen by the event pipeline")
            .with_capability(CAP_TRACKABLE)
            .with_capability(CAP_SCHEDULABLE)
            .with_capability(CAP_CONTEXTUAL)]
    }

    async fn query(&self, query: &EntityQuery) -> Result<Vec<Box<dyn Entity>>> {
        let activity = self.store.list_activity(None).await.map_err(storage_error)?;

        let entities: Vec<Box<dyn Entity>> = activity
            .iter()
            .map(|record| Box::new(session_entity(&activity_to_sdk(record))) as Box<dyn Entity>)
            .collect();

        Ok(query.apply(entities))
    }

    async fn get_entity(&self, id: &str) -> Result<Box<dyn Entity>> {
        let activity = self
            .store
            .activity(id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| PluginError::not_found(format!("session '{}'", id)))?;

        Ok(Box::new(session_entity(&activity_to_sdk(&activity))))
    }
}
