//! Storage module for Plexus
//!
//! - `db`: SQLite - 이벤트와 세션 활동 집계
//! - `json`: JSON - 범용 파일 저장/로드 (설정)

mod db;
mod json;

use crate::event::{ActivityRecord, EventRecord};
use crate::Result;
use async_trait::async_trait;

// SQLite Storage (런타임 데이터)
pub use db::{Storage, DB_FILE};

// JSON Storage (범용)
pub use json::JsonStore;

/// 이벤트 영속화 포트
///
/// 디스패처의 consumer는 `emit_event`만 사용하고, 나머지 조회 메서드는
/// `sessions` 플러그인과 CLI에서 사용합니다.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// 단일 이벤트 upsert (레코드 id 기준)
    async fn emit_event(&self, record: &EventRecord) -> Result<()>;

    /// 최근 이벤트 (최신순)
    async fn recent_events(&self, limit: u32) -> Result<Vec<EventRecord>>;

    /// 한 세션의 이벤트 (도착 순)
    async fn session_events(&self, session_id: &str) -> Result<Vec<EventRecord>>;

    async fn activity(&self, session_id: &str) -> Result<Option<ActivityRecord>>;

    /// 마지막 활동 기준 최신순
    async fn list_activity(&self, limit: Option<u32>) -> Result<Vec<ActivityRecord>>;
}
