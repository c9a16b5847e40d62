//! Entity - 플러그인이 소유하는 다형 엔티티
//!
//! Every entity implements the base [`Entity`] contract. Refinements
//! ([`Contextual`], [`Trackable`], [`Schedulable`], [`Relatable`]) are
//! optional and discovered through the `as_*` probes, which return `None`
//! unless the entity overrides them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

// ============================================================================
// Entity capability names
// ============================================================================

pub const CAP_CONTEXTUAL: &str = "IContextProvider";
pub const CAP_TRACKABLE: &str = "ITrackable";
pub const CAP_SCHEDULABLE: &str = "ISchedulable";
pub const CAP_RELATABLE: &str = "IRelatable";

// ============================================================================
// Contracts
// ============================================================================

/// Base contract every entity satisfies
pub trait Entity: Send + Sync {
    fn id(&self) -> &str;

    fn entity_type(&self) -> &str;

    /// Self-reported capability names (advisory, for display)
    fn capabilities(&self) -> Vec<String> {
        let mut caps = Vec::new();
        if self.as_contextual().is_some() {
            caps.push(CAP_CONTEXTUAL.to_string());
        }
        if self.as_trackable().is_some() {
            caps.push(CAP_TRACKABLE.to_string());
        }
        if self.as_schedulable().is_some() {
            caps.push(CAP_SCHEDULABLE.to_string());
        }
        if self.as_relatable().is_some() {
            caps.push(CAP_RELATABLE.to_string());
        }
        caps
    }

    /// Single field by name
    fn field(&self, name: &str) -> Option<Value>;

    /// Snapshot of all fields
    fn fields(&self) -> Map<String, Value>;

    fn as_contextual(&self) -> Option<&dyn Contextual> {
        None
    }

    fn as_trackable(&self) -> Option<&dyn Trackable> {
        None
    }

    fn as_schedulable(&self) -> Option<&dyn Schedulable> {
        None
    }

    fn as_relatable(&self) -> Option<&dyn Relatable> {
        None
    }
}

/// Context text and related entity ids
pub trait Contextual: Send + Sync {
    fn context(&self) -> String;

    fn related_entities(&self) -> Vec<String>;
}

/// Status and progress tracking
pub trait Trackable: Send + Sync {
    fn status(&self) -> String;

    /// Completion ratio in `0.0..=1.0`
    fn progress(&self) -> f64;
}

/// Start and due dates
pub trait Schedulable: Send + Sync {
    fn start_date(&self) -> Option<DateTime<Utc>>;

    fn due_date(&self) -> Option<DateTime<Utc>>;
}

/// Typed links to other entities
pub trait Relatable: Send + Sync {
    fn links(&self) -> Vec<EntityLink>;
}

/// Link from one entity to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLink {
    pub target_id: String,
    pub relation: String,
}

/// Whether an entity satisfies a capability, by probe
///
/// Unknown names fall back to the entity's self-reported list.
pub fn entity_supports(entity: &dyn Entity, capability: &str) -> bool {
    match capability {
        CAP_CONTEXTUAL => entity.as_contextual().is_some(),
        CAP_TRACKABLE => entity.as_trackable().is_some(),
        CAP_SCHEDULABLE => entity.as_schedulable().is_some(),
        CAP_RELATABLE => entity.as_relatable().is_some(),
        other => entity.capabilities().iter().any(|c| c == other),
    }
}

// ============================================================================
// Descriptors, queries, updates
// ============================================================================

/// Describes an entity type a provider serves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTypeDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl EntityTypeDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            capabilities: Vec::new(),
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Entity query parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Every listed capability must be satisfied
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Field name -> expected value (string form)
    #[serde(default)]
    pub filters: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    #[serde(default)]
    pub offset: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,

    #[serde(default)]
    pub sort_order: SortOrder,
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

    pub fn sorted_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(field.into());
        self.sort_order = order;
        self
    }

    /// Type, capability and field filters (no paging)
    pub fn matches(&self, entity: &dyn Entity) -> bool {
        if let Some(ref wanted) = self.entity_type {
            if entity.entity_type() != wanted {
                return false;
            }
        }

        if !self
            .capabilities
            .iter()
            .all(|cap| entity_supports(entity, cap))
        {
            return false;
        }

        self.filters.iter().all(|(key, expected)| {
            field_value(entity, key)
                .map(|v| value_as_string(&v) == *expected)
                .unwrap_or(false)
        })
    }

    /// Compare two entities by `sort_by`, honoring `sort_order`
    pub fn compare(&self, a: &dyn Entity, b: &dyn Entity) -> Ordering {
        let Some(ref key) = self.sort_by else {
            return Ordering::Equal;
        };
        let ordering = compare_values(field_value(a, key).as_ref(), field_value(b, key).as_ref());
        match self.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }

    /// Apply offset and limit to an already filtered, sorted list
    pub fn page<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }

    /// Filter, sort and page a provider's entities in one go
    pub fn apply(&self, entities: Vec<Box<dyn Entity>>) -> Vec<Box<dyn Entity>> {
        let mut matched: Vec<_> = entities
            .into_iter()
            .filter(|e| self.matches(e.as_ref()))
            .collect();
        if self.sort_by.is_some() {
            matched.sort_by(|a, b| self.compare(a.as_ref(), b.as_ref()));
        }
        self.page(matched)
    }
}

/// Field lookup that also resolves `id` and `type`
pub fn field_value(entity: &dyn Entity, key: &str) -> Option<Value> {
    match key {
        "id" => Some(Value::String(entity.id().to_string())),
        "type" => Some(Value::String(entity.entity_type().to_string())),
        _ => entity.field(key),
    }
}

/// String form used for filter comparison
pub fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Numbers compare numerically, everything else by string form; missing sorts last
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(x), Some(y)) => value_as_string(x).cmp(&value_as_string(y)),
    }
}

/// Field changes requested on an entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl EntityUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

// ============================================================================
// RecordEntity - 필드 맵 기반 범용 엔티티
// ============================================================================

/// Generic entity backed by a JSON field map
///
/// Refinements are derived from well-known fields:
/// - `context` / `related` → [`Contextual`]
/// - `status` (+ optional `progress`) → [`Trackable`]
/// - `start_date` / `due_date` (RFC 3339) → [`Schedulable`]
/// - `links` (array of `{target_id, relation}`) → [`Relatable`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl RecordEntity {
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn apply_update(&mut self, update: &EntityUpdate) {
        for (key, value) in &update.fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    fn date_field(&self, key: &str) -> Option<DateTime<Utc>> {
        self.str_field(key)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
    }
}

impl Entity for RecordEntity {
    fn id(&self) -> &str {
        &self.id
    }

    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    fn fields(&self) -> Map<String, Value> {
        self.fields.clone()
    }

    fn as_contextual(&self) -> Option<&dyn Contextual> {
        (self.fields.contains_key("context") || self.fields.contains_key("related"))
            .then_some(self as &dyn Contextual)
    }

    fn as_trackable(&self) -> Option<&dyn Trackable> {
        self.fields
            .contains_key("status")
            .then_some(self as &dyn Trackable)
    }

    fn as_schedulable(&self) -> Option<&dyn Schedulable> {
        (self.fields.contains_key("start_date") || self.fields.contains_key("due_date"))
            .then_some(self as &dyn Schedulable)
    }

    fn as_relatable(&self) -> Option<&dyn Relatable> {
        self.fields
            .get("links")
            .filter(|v| v.is_array())
            .map(|_| self as &dyn Relatable)
    }
}

impl Contextual for RecordEntity {
    fn context(&self) -> String {
        self.str_field("context").unwrap_or_default().to_string()
    }

    fn related_entities(&self) -> Vec<String> {
        self.fields
            .get("related")
            .and_then(|v| v.as_array())
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Trackable for RecordEntity {
    fn status(&self) -> String {
        self.str_field("status").unwrap_or_default().to_string()
    }

    fn progress(&self) -> f64 {
        self.fields
            .get("progress")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0)
    }
}

impl Schedulable for RecordEntity {
    fn start_date(&self) -> Option<DateTime<Utc>> {
        self.date_field("start_date")
    }

    fn due_date(&self) -> Option<DateTime<Utc>> {
        self.date_field("due_date")
    }
}

impl Relatable for RecordEntity {
    fn links(&self) -> Vec<EntityLink> {
        self.fields
            .get("links")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }
}
