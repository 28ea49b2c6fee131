//! Data models for resumex entities.

mod session;

pub use session::{SessionRecord, SessionStatus};
