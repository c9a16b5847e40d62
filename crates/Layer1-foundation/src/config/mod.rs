//! Config - 통합 설정 관리
//!
//! - `plexus.rs` - PlexusConfig 통합 설정 (디스패처, 서브프로세스 플러그인, 경로)

mod plexus;

pub use plexus::{
    DispatcherConfig, ExternalPluginConfig, PlexusConfig, LOG_FILE, PLEXUS_CONFIG_FILE,
};
