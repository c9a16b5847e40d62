//! Event Records - 영속화 포맷
//!
//! ```text
//! plexus_sdk::Event ──(dispatcher)──▶ EventRecord ──▶ EventStore
//!                                          │
//!                                          └──▶ ActivityRecord (세션 집계)
//! ```

pub mod types;

pub use types::{ActivityRecord, EventKind, EventRecord};
