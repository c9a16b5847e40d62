//! Builtin - 호스트와 함께 배포되는 core 플러그인
//!
//! - `hooks`: 훅 페이로드 → 이벤트 (`emit` 명령)
//! - `sessions`: 세션 활동 집계 → `session` 엔티티

mod hooks;
mod sessions;

pub use hooks::{hook_event_type, HooksPlugin, HOOKS_PLUGIN, SESSION_ENV};
pub use sessions::{session_entity, SessionsPlugin, SESSIONS_PLUGIN, SESSION_ENTITY};
