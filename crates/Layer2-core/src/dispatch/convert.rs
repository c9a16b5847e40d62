//! SDK `Event` → `EventRecord`

use plexus_foundation::{Error, EventRecord, Result};
use plexus_sdk::Event;

/// 큐에서 꺼낸 이벤트를 저장 포맷으로 변환
///
/// 새 UUID를 부여하고 payload/metadata는 JSON 텍스트로 직렬화합니다.
pub fn to_record(event: &Event) -> Result<EventRecord> {
    let session_id = event.session_id().ok_or_else(|| {
        Error::InvalidArgument(format!(
            "event '{}' from '{}' has no session id",
            event.event_type, event.source
        ))
    })?;

    Ok(EventRecord::new(&event.event_type, &event.source, session_id)
        .with_timestamp(event.timestamp)
        .with_payload(serde_json::to_string(&event.payload)?)
        .with_metadata(serde_json::to_string(&event.metadata)?)
        .with_version(&event.version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_foundation::EventKind;
    use serde_json::json;

    #[test]
    fn test_to_record() {
        let event = Event::new("chat.end", "hooks")
            .with_session("s1")
            .with_payload("prompt", json!("hi"));

        let record = to_record(&event).unwrap();
        assert_eq!(record.kind, EventKind::ChatEnded);
        assert_eq!(record.session_id, "s1");
        assert_eq!(record.timestamp, event.timestamp);
        assert_eq!(record.payload_json().unwrap()["prompt"], "hi");
        assert_eq!(record.metadata_map().unwrap()["session_id"], "s1");
        assert_eq!(record.version, "1.0");
    }

    #[test]
    fn test_missing_session_rejected() {
        let event = Event::new("task.created", "tasks");
        assert!(matches!(to_record(&event), Err(Error::InvalidArgument(_))));
    }
}
