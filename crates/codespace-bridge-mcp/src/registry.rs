//! Tool table: name, schema and handler per tool.

use std::{future::Future, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use serde_json::{Value, json};

use crate::{ToolError, protocol::ToolResult};

/// Bound tool implementation.
pub type ToolHandler<C> =
    Arc<dyn Fn(Arc<C>, Value) -> BoxFuture<'static, Result<String, ToolError>> + Send + Sync>;

/// Wrap an async function as a tool handler.
pub fn handler<C, F, Fut>(f: F) -> ToolHandler<C>
where
    F: Fn(Arc<C>, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
{
    Arc::new(move |ctx, args| f(ctx, args).boxed())
}

/// One tool as advertised by `tools/list`.
pub struct ToolDescriptor<C> {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
    pub handler: ToolHandler<C>,
}

/// Tools registered at startup; never mutated while serving.
pub struct ToolRegistry<C> {
    tools: Vec<ToolDescriptor<C>>,
}

impl<C> Default for ToolRegistry<C> {
    fn default() -> Self {
        Self { tools: Vec::new() }
    }
}

impl<C: Send + Sync + 'static> ToolRegistry<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A later registration with the same name replaces the
    /// earlier one.
    pub fn register(&mut self, descriptor: ToolDescriptor<C>) {
        self.tools.retain(|t| t.name != descriptor.name);
        self.tools.push(descriptor);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor<C>> {
        self.tools.iter().find(|t| t.name == name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name).collect()
    }

    /// `tools/list` payload.
    #[must_use]
    pub fn list(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": t.input_schema,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    /// Dispatch a call. Every failure, including an unknown name, comes
    /// back as an error result rather than a protocol error.
    pub async fn call(&self, ctx: Arc<C>, name: &str, args: Value) -> ToolResult {
        let Some(tool) = self.get(name) else {
            return ToolResult::error(ToolError::UnknownTool(name.to_string()).to_string());
        };
        match (tool.handler)(ctx, args).await {
            Ok(text) => ToolResult::text(text),
            Err(e) => {
                tracing::debug!(tool = name, error = %e, "Tool call failed");
                ToolResult::error(e.to_string())
            }
        }
    }
}
