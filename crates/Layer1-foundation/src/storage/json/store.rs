//! JSON 파일 저장소
//!
//! 두 위치를 사용합니다:
//! - 글로벌: `<config_dir>/plexus/`
//! - 프로젝트: 현재 디렉토리에서 위로 올라가며 처음 만나는 `.plexus/`
//!
//! 훅은 프로젝트 하위 디렉토리에서 실행되는 경우가 많아서 프로젝트 위치는
//! 상위 탐색으로 찾습니다.

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const GLOBAL_DIR_NAME: &str = "plexus";
pub const PROJECT_DIR_NAME: &str = ".plexus";

#[derive(Debug, Clone)]
pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn global() -> Result<Self> {
        dirs::config_dir()
            .map(|dir| Self::new(dir.join(GLOBAL_DIR_NAME)))
            .ok_or_else(|| Error::Config("no platform config directory".to_string()))
    }

    /// `start`에서 루트까지 올라가며 `.plexus/` 탐색
    ///
    /// 없으면 `start/.plexus` (저장 시 생성됨)
    pub fn discover_project(start: &Path) -> Self {
        let found = start
            .ancestors()
            .map(|dir| dir.join(PROJECT_DIR_NAME))
            .find(|candidate| candidate.is_dir());

        Self::new(found.unwrap_or_else(|| start.join(PROJECT_DIR_NAME)))
    }

    pub fn current_project() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self::discover_project(&cwd))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }

    pub fn load<T: DeserializeOwned>(&self, filename: &str) -> Result<T> {
        self.load_optional(filename)?.ok_or_else(|| {
            Error::Config(format!("{} does not exist", self.file_path(filename).display()))
        })
    }

    /// 파일이 없으면 `None`, 깨진 JSON은 `Error::Config`
    pub fn load_optional<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        let path = self.file_path(filename);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Config(format!("{}: {}", path.display(), e))),
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// 임시 파일에 쓴 뒤 rename (동시에 읽는 프로세스가 반쯤 쓴 파일을 보지 않도록)
    pub fn save<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;

        let path = self.file_path(filename);
        let tmp = self.base_dir.join(format!(".{}.tmp", filename));
        let mut content = serde_json::to_string_pretty(data)?;
        content.push('\n');

        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            Error::Config(format!("{}: {}", path.display(), e))
        })
    }
}
