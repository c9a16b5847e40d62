//! Plugin-facing error type
//!
//! 플러그인이 호스트에 돌려주는 에러. 호스트는 이 값을 자체 에러 분류로 변환합니다.

use thiserror::Error;

/// Result type alias for plugin operations
pub type Result<T> = std::result::Result<T, PluginError>;

/// Errors a plugin may report back to the host
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Read-only: {0}")]
    ReadOnly(String),

    /// The operation is part of a capability the plugin does not implement
    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PluginError {
    pub fn not_found(what: impl Into<String>) -> Self {
        PluginError::NotFound(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        PluginError::InvalidArgument(what.into())
    }

    pub fn internal(what: impl Into<String>) -> Self {
        PluginError::Internal(what.into())
    }
}

impl From<String> for PluginError {
    fn from(s: String) -> Self {
        PluginError::Internal(s)
    }
}

impl From<&str> for PluginError {
    fn from(s: &str) -> Self {
        PluginError::Internal(s.to_string())
    }
}
