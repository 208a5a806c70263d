//! Remote operation executor.
//!
//! Stateless file and command operations, each implemented as one or two
//! round trips over a `RemoteShell`:
//! - view, edit and create files
//! - run commands with a working directory and environment
//! - search file contents and find files by glob

mod error;
mod executor;
mod files;
mod search;

pub use error::ExecutorError;
pub use executor::RemoteExecutor;
pub use search::NO_MATCHES;

#[cfg(test)]
pub(crate) mod testing;
