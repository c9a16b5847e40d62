//! Plugin - 플러그인 등록과 capability 인덱스
//!
//! 플러그인 계약 자체는 `plexus-sdk`에 있고, 여기서는 호스트 쪽 저장소만 관리합니다.

mod registry;

pub use registry::PluginRegistry;
