//! Plexus Config - 통합 설정
//!
//! 글로벌 (`<config_dir>/plexus/config.json`) 과 프로젝트
//! (`.plexus/config.json`) 설정을 병합합니다. 프로젝트가 우선.

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 설정 파일명
pub const PLEXUS_CONFIG_FILE: &str = "config.json";

/// 진단 로그 파일명 (data_dir 안)
pub const LOG_FILE: &str = "plexus.log";

// ============================================================================
// Plexus Config (통합)
// ============================================================================

/// Plexus 통합 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlexusConfig {
    /// 버전 (마이그레이션용)
    #[serde(default = "default_version")]
    pub version: u32,

    /// 데이터 디렉토리 (기본: ~/.plexus)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// tracing 필터 (`RUST_LOG` 가 우선)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 이벤트 디스패처
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// 서브프로세스 플러그인
    #[serde(default)]
    pub external_plugins: Vec<ExternalPluginConfig>,
}

impl Default for PlexusConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            data_dir: None,
            log_level: default_log_level(),
            dispatcher: DispatcherConfig::default(),
            external_plugins: Vec::new(),
        }
    }
}

impl PlexusConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드
    pub fn load() -> Result<Self> {
        let mut config = Self::new();

        // 1. 글로벌 설정
        if let Ok(global) = JsonStore::global() {
            if let Some(global_config) = global.load_optional::<PlexusConfig>(PLEXUS_CONFIG_FILE)? {
                config.merge(global_config);
            }
        }

        // 2. 프로젝트 설정
        if let Ok(project) = JsonStore::current_project() {
            if let Some(project_config) =
                project.load_optional::<PlexusConfig>(PLEXUS_CONFIG_FILE)?
            {
                config.merge(project_config);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// 지정한 파일 하나만 로드 (`--config`)
    pub fn load_from(path: &Path) -> Result<Self> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Config(format!("Invalid config path: {}", path.display())))?;

        let mut config = Self::new();
        config.merge(JsonStore::new(dir).load::<PlexusConfig>(filename)?);
        config.validate()?;
        Ok(config)
    }

    /// 글로벌 설정 저장
    pub fn save_global(&self) -> Result<()> {
        let store = JsonStore::global()?;
        store.save(PLEXUS_CONFIG_FILE, self)
    }

    /// 프로젝트 설정 저장
    pub fn save_project(&self) -> Result<()> {
        let store = JsonStore::current_project()?;
        store.save(PLEXUS_CONFIG_FILE, self)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// 다른 설정과 병합 (other가 우선)
    pub fn merge(&mut self, other: PlexusConfig) {
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
        if other.log_level != default_log_level() {
            self.log_level = other.log_level;
        }

        self.dispatcher.merge(other.dispatcher);

        // 같은 이름이면 교체, 아니면 추가
        for plugin in other.external_plugins {
            match self
                .external_plugins
                .iter_mut()
                .find(|p| p.name == plugin.name)
            {
                Some(existing) => *existing = plugin,
                None => self.external_plugins.push(plugin),
            }
        }
    }

    /// 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.dispatcher.queue_capacity == 0 {
            return Err(Error::Config("dispatcher.queueCapacity must be > 0".into()));
        }
        for plugin in &self.external_plugins {
            if plugin.name.trim().is_empty() {
                return Err(Error::Config("external plugin without a name".into()));
            }
            if plugin.command.trim().is_empty() {
                return Err(Error::Config(format!(
                    "external plugin '{}' has no command",
                    plugin.name
                )));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Paths
    // ========================================================================

    /// 데이터 디렉토리 (설정값 또는 ~/.plexus)
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::home_dir()
                .map(|home| home.join(".plexus"))
                .ok_or_else(|| Error::Config("Cannot find home directory".to_string())),
        }
    }

    /// 진단 로그 파일 경로
    pub fn log_file(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(LOG_FILE))
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.dispatcher.queue_capacity = capacity;
        self
    }

    pub fn with_external_plugin(mut self, plugin: ExternalPluginConfig) -> Self {
        self.external_plugins.push(plugin);
        self
    }
}

// ============================================================================
// Dispatcher Config
// ============================================================================

/// 이벤트 디스패처 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherConfig {
    /// bounded queue 크기
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// stop 시 consumer join 최대 대기 (ms)
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl DispatcherConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    fn merge(&mut self, other: DispatcherConfig) {
        if other.queue_capacity != default_queue_capacity() {
            self.queue_capacity = other.queue_capacity;
        }
        if other.shutdown_timeout_ms != default_shutdown_timeout_ms() {
            self.shutdown_timeout_ms = other.shutdown_timeout_ms;
        }
    }
}

// ============================================================================
// External Plugin Config
// ============================================================================

/// 서브프로세스 플러그인 정의
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalPluginConfig {
    pub name: String,

    /// 실행 명령 (args가 비어 있으면 shell-style로 분리)
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ExternalPluginConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            enabled: true,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// (program, args)
    pub fn command_line(&self) -> Result<(String, Vec<String>)> {
        if !self.args.is_empty() {
            return Ok((self.command.clone(), self.args.clone()));
        }

        let mut parts = shlex::split(&self.command).ok_or_else(|| {
            Error::Config(format!(
                "external plugin '{}': cannot parse command '{}'",
                self.name, self.command
            ))
        })?;

        if parts.is_empty() {
            return Err(Error::Config(format!(
                "external plugin '{}' has no command",
                self.name
            )));
        }

        let program = parts.remove(0);
        Ok((program, parts))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn default_version() -> u32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_queue_capacity() -> usize {
    100
}

fn default_shutdown_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_plexus_config_default() {
        let config = PlexusConfig::new();
        assert_eq!(config.version, 1);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.dispatcher.queue_capacity, 100);
        assert_eq!(config.dispatcher.shutdown_timeout(), Duration::from_secs(5));
        assert!(config.external_plugins.is_empty());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: PlexusConfig =
            serde_json::from_str(r#"{"dispatcher": {"queueCapacity": 8}}"#).unwrap();
        assert_eq!(config.dispatcher.queue_capacity, 8);
        assert_eq!(config.dispatcher.shutdown_timeout_ms, 5000);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_config_merge() {
        let mut base = PlexusConfig::new()
            .with_external_plugin(ExternalPluginConfig::new("jira", "jira-plugin"))
            .with_external_plugin(ExternalPluginConfig::new("notes", "notes-plugin"));

        let mut overlay = PlexusConfig::new()
            .with_data_dir("/tmp/plexus")
            .with_queue_capacity(16)
            .with_external_plugin(ExternalPluginConfig::new("jira", "jira-plugin --v2"));
        overlay.log_level = "debug".into();

        base.merge(overlay);

        assert_eq!(base.data_dir, Some(PathBuf::from("/tmp/plexus")));
        assert_eq!(base.dispatcher.queue_capacity, 16);
        assert_eq!(base.log_level, "debug");
        assert_eq!(base.external_plugins.len(), 2);
        assert_eq!(base.external_plugins[0].command, "jira-plugin --v2");
    }

    #[test]
    fn test_validate() {
        assert!(PlexusConfig::new().validate().is_ok());
        assert!(PlexusConfig::new().with_queue_capacity(0).validate().is_err());
        assert!(PlexusConfig::new()
            .with_external_plugin(ExternalPluginConfig::new("x", "  "))
            .validate()
            .is_err());
    }

    #[test]
    fn test_command_line() {
        let plugin = ExternalPluginConfig::new("notes", "python3 -u 'my plugin.py'");
        let (program, args) = plugin.command_line().unwrap();
        assert_eq!(program, "python3");
        assert_eq!(args, vec!["-u", "my plugin.py"]);

        let explicit = ExternalPluginConfig::new("notes", "node")
            .with_args(vec!["plugin.js".into()]);
        assert_eq!(explicit.command_line().unwrap().1, vec!["plugin.js"]);

        assert!(ExternalPluginConfig::new("bad", "'unterminated")
            .command_line()
            .is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(
            &path,
            r#"{"dataDir": "/var/lib/plexus", "externalPlugins": [{"name": "a", "command": "a-bin"}]}"#,
        )
        .unwrap();

        let config = PlexusConfig::load_from(&path).unwrap();
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/var/lib/plexus"));
        assert_eq!(config.log_file().unwrap(), PathBuf::from("/var/lib/plexus/plexus.log"));
        assert!(config.external_plugins[0].enabled);
    }
}
