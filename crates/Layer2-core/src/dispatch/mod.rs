//! Dispatch - 이벤트 디스패치 엔진
//!
//! ## 아키텍처
//!
//! ```text
//! producer A ──┐                                   ┌──────────────┐
//! producer B ──┼─ EventSink ─▶ bounded mpsc ─▶ consumer ─▶ EventStore │
//! command    ──┘   (send().await)                  └──────────────┘
//! ```
//!
//! 큐가 가득 차면 producer가 대기합니다. 저장 실패는 로그 후 버립니다.

mod convert;
mod dispatcher;

pub use convert::to_record;
pub use dispatcher::{DispatcherMetrics, DispatcherState, EventDispatcher};
