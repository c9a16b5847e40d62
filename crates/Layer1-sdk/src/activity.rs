//! Activity records handed to plugins

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-session activity summary, as seen by plugins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub session_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub event_count: u64,
    pub last_event_type: String,
    /// A session/chat end event has been recorded
    pub ended: bool,
}

impl ActivityRecord {
    pub fn status(&self) -> &'static str {
        if self.ended {
            "ended"
        } else {
            "active"
        }
    }

    /// Wall-clock span between the first and last event
    pub fn duration_secs(&self) -> i64 {
        (self.last_seen - self.first_seen).num_seconds().max(0)
    }
}
