//! Event - 플러그인이 발행하는 도메인 이벤트
//!
//! An event is created once by a producer, validated by the [`EventSink`]
//! on its way into the host queue and never mutated afterwards.
//!
//! [`EventSink`]: crate::EventSink

use crate::{PluginError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Default schema version stamped on events that do not carry one
pub const DEFAULT_EVENT_VERSION: &str = "1.0";

/// Metadata key holding the session / correlation identifier
pub const SESSION_ID_KEY: &str = "session_id";

/// A domain event emitted by a plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Namespaced, dot-separated type (e.g. "task.created")
    #[serde(rename = "type", default)]
    pub event_type: String,

    /// Name of the emitting plugin
    #[serde(default)]
    pub source: String,

    #[serde(default = "Utc::now", deserialize_with = "null_as_now")]
    pub timestamp: DateTime<Utc>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub payload: Map<String, Value>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: HashMap<String, String>,

    #[serde(default = "default_version", deserialize_with = "null_as_version")]
    pub version: String,
}

fn default_version() -> String {
    DEFAULT_EVENT_VERSION.to_string()
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_now<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<DateTime<Utc>>::deserialize(deserializer)?.unwrap_or_else(Utc::now))
}

fn null_as_version<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_version))
}

impl Event {
    /// 새 이벤트 생성
    pub fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            timestamp: Utc::now(),
            payload: Map::new(),
            metadata: HashMap::new(),
            version: default_version(),
        }
    }

    /// Set the session / correlation id
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.metadata
            .insert(SESSION_ID_KEY.to_string(), session_id.into());
        self
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Session id from metadata, if present and non-empty
    pub fn session_id(&self) -> Option<&str> {
        self.metadata
            .get(SESSION_ID_KEY)
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// Parse an event from loosely-typed JSON (subprocess plugins, hooks)
    ///
    /// Missing or null `timestamp`, `version`, `payload` and `metadata` are
    /// filled with defaults. The result is normalized and validated.
    pub fn from_json(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(PluginError::invalid("event must be a JSON object"));
        }
        let event: Event = serde_json::from_value(value)
            .map_err(|e| PluginError::invalid(format!("malformed event: {}", e)))?;
        event.normalize()
    }

    /// Fill defaults and enforce the enqueue invariants
    ///
    /// Rejects events without a type, a source, or a session id.
    pub fn normalize(mut self) -> Result<Self> {
        self.event_type = self.event_type.trim().to_string();
        self.source = self.source.trim().to_string();
        if self.version.trim().is_empty() {
            self.version = default_version();
        }
        if self.timestamp.timestamp() == 0 {
            self.timestamp = Utc::now();
        }

        if self.event_type.is_empty() {
            return Err(PluginError::invalid("event type is empty"));
        }
        if self.source.is_empty() {
            return Err(PluginError::invalid(format!(
                "event '{}' has no source",
                self.event_type
            )));
        }
        if self.session_id().is_none() {
            return Err(PluginError::invalid(format!(
                "event '{}' from '{}' has no {}",
                self.event_type, self.source, SESSION_ID_KEY
            )));
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_defaults() {
        let event = Event::new("task.created", "tasks").with_session("s-1");
        assert_eq!(event.version, DEFAULT_EVENT_VERSION);
        assert_eq!(event.session_id(), Some("s-1"));
        assert!(event.payload.is_empty());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let event = Event::from_json(json!({
            "type": " file.changed ",
            "source": "watcher",
            "timestamp": null,
            "payload": null,
            "metadata": {"session_id": "abc"},
            "version": null
        }))
        .unwrap();

        assert_eq!(event.event_type, "file.changed");
        assert_eq!(event.version, "1.0");
        assert!(event.payload.is_empty());
        assert!(event.timestamp.timestamp() > 0);
    }

    #[test]
    fn test_rejects_missing_fields() {
        let missing_type = Event::new("", "src").with_session("s");
        assert!(matches!(
            missing_type.normalize(),
            Err(PluginError::InvalidArgument(_))
        ));

        let missing_source = Event::new("a.b", "  ").with_session("s");
        assert!(missing_source.normalize().is_err());

        let missing_session = Event::new("a.b", "src");
        assert!(missing_session.normalize().is_err());

        assert!(Event::from_json(json!("not an object")).is_err());
    }
}
