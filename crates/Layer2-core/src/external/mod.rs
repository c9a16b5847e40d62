//! External - 서브프로세스 플러그인
//!
//! stdio 위 NDJSON 프로토콜로 통신하는 실행 파일을 인-프로세스 플러그인과
//! 같은 capability 계약으로 노출합니다.

mod plugin;
mod transport;

pub use plugin::ExternalPlugin;
pub use transport::{StdioTransport, WireError, WireMessage, WireRequest, DEFAULT_REQUEST_TIMEOUT};
