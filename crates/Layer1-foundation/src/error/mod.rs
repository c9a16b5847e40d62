//! Error types for Plexus
//!
//! 모든 호스트 에러를 중앙에서 관리

use plexus_sdk::PluginError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Plexus 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 조회 / 입력
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ========================================================================
    // 상태 위반
    // ========================================================================
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Already running: {0}")]
    AlreadyRunning(String),

    #[error("Not running: {0}")]
    NotRunning(String),

    // ========================================================================
    // 권한 / 정책
    // ========================================================================
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Read-only: {0}")]
    ReadOnly(String),

    // ========================================================================
    // 설정 / 저장소
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 사용자에게 보여줄 수 있는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::InvalidArgument(_)
                | Error::AlreadyExists(_)
                | Error::PermissionDenied(_)
                | Error::ReadOnly(_)
        )
    }

    /// State-machine violations (double start, stop while stopped)
    pub fn is_state_violation(&self) -> bool {
        matches!(self, Error::AlreadyRunning(_) | Error::NotRunning(_))
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<PluginError> for Error {
    fn from(e: PluginError) -> Self {
        match e {
            PluginError::NotFound(s) => Error::NotFound(s),
            PluginError::InvalidArgument(s) => Error::InvalidArgument(s),
            PluginError::PermissionDenied(s) => Error::PermissionDenied(s),
            PluginError::ReadOnly(s) => Error::ReadOnly(s),
            PluginError::Unsupported(s) => Error::InvalidArgument(s),
            PluginError::Io(e) => Error::Io(e),
            PluginError::Json(e) => Error::Json(e),
            PluginError::Internal(s) => Error::Internal(s),
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_error_mapping() {
        let err: Error = PluginError::ReadOnly("tasks".into()).into();
        assert!(matches!(err, Error::ReadOnly(_)));

        let err: Error = PluginError::not_found("t-1").into();
        assert!(err.is_user_facing());
        assert_eq!(err.to_string(), "Not found: t-1");
    }

    #[test]
    fn test_state_violation() {
        assert!(Error::AlreadyRunning("dispatcher".into()).is_state_violation());
        assert!(!Error::Internal("x".into()).is_state_violation());
    }
}
