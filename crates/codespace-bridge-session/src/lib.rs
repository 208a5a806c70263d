//! Async terminal sessions on the remote target.
//!
//! Provides:
//! - `SessionManager` - Start, drive, read, stop and list tmux sessions
//! - Input mini-language for control keys (`{enter}`, `{up}`, ...)
//! - Local session registry with its state machine

pub mod input;
pub mod manager;
pub mod registry;

pub use input::{ControlKey, InputSegment, parse_input};
pub use manager::{SESSION_PREFIX, SessionError, SessionInfo, SessionManager};
pub use registry::{SessionRecord, SessionState};
