//! Transport to a remote codespace.
//!
//! Provides:
//! - `Connection` - One multiplexed SSH channel per target, with direct fallback
//! - `GhCodespaceDiscovery` - Target discovery through the `gh` CLI
//! - Local executable resolution

pub mod connection;
pub mod discovery;
mod process;
pub mod resolve;
pub mod ssh_config;

pub use connection::{Connection, Mode};
pub use discovery::GhCodespaceDiscovery;
pub use resolve::resolve_executable_path;
