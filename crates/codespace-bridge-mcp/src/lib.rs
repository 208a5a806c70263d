//! Tool protocol server.
//!
//! Provides:
//! - JSON-RPC 2.0 line protocol over stdio (MCP framing)
//! - `ToolRegistry` - Data-driven `{name, schema, handler}` tool table
//! - Typed request validation for every tool
//! - The `remote_*` tools backed by the executor and session manager

pub mod error;
pub mod protocol;
pub mod registry;
pub mod requests;
pub mod server;
pub mod tools;

pub use error::ToolError;
pub use registry::{ToolDescriptor, ToolRegistry};
pub use server::{McpServer, ServerError};
pub use tools::{ToolContext, build_registry};
