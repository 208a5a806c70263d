//! Line-delimited JSON-RPC server.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::Mutex,
    task::JoinSet,
};

use crate::{
    ToolRegistry,
    protocol::{
        INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, json_error,
        negotiate_version, rpc_response,
    },
};

/// Server error.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serves a tool registry over a byte stream pair.
pub struct McpServer<C> {
    registry: ToolRegistry<C>,
    ctx: Arc<C>,
    name: String,
    version: String,
}

impl<C: Send + Sync + 'static> McpServer<C> {
    #[must_use]
    pub fn new(registry: ToolRegistry<C>, ctx: Arc<C>) -> Self {
        Self {
            registry,
            ctx,
            name: "codespace-bridge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Read requests until EOF, answering each on its own task.
    ///
    /// Responses go through one shared writer so lines never interleave.
    /// Requests still in flight at EOF are allowed to finish.
    ///
    /// # Errors
    /// Returns error if reading the input fails.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let writer = Arc::new(Mutex::new(writer));
        let mut reader = BufReader::new(reader);
        let mut buffer = String::new();
        let mut tasks = JoinSet::new();

        loop {
            buffer.clear();
            if reader.read_line(&mut buffer).await? == 0 {
                break;
            }
            let line = buffer.trim();
            if line.is_empty() {
                continue;
            }

            let server = Arc::clone(&self);
            let writer = Arc::clone(&writer);
            let line = line.to_string();
            tasks.spawn(async move {
                if let Some(response) = server.handle_message(&line).await {
                    if let Err(e) = send_json(&writer, &response).await {
                        tracing::error!("Failed to write response: {e}");
                    }
                }
            });

            while let Some(done) = tasks.try_join_next() {
                if let Err(e) = done {
                    tracing::error!("Request task failed: {e}");
                }
            }
        }

        tracing::debug!(pending = tasks.len(), "Input closed, draining requests");
        while let Some(done) = tasks.join_next().await {
            if let Err(e) = done {
                tracing::error!("Request task failed: {e}");
            }
        }
        Ok(())
    }

    /// Answer one line. `None` for notifications and stray responses.
    pub async fn handle_message(&self, line: &str) -> Option<Value> {
        let request: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Unparsable request line");
                return Some(json_error(Value::Null, PARSE_ERROR, &format!("Parse error: {e}")));
            }
        };

        let Some(object) = request.as_object() else {
            return Some(json_error(Value::Null, INVALID_REQUEST, "Invalid request: expected a JSON object"));
        };
        let id = object.get("id").cloned();
        let Some(method) = object.get("method").and_then(Value::as_str) else {
            if object.contains_key("result") || object.contains_key("error") {
                return None;
            }
            return Some(json_error(
                id.unwrap_or(Value::Null),
                INVALID_REQUEST,
                "Invalid request: missing method",
            ));
        };
        let params = object.get("params").cloned().unwrap_or(Value::Null);

        let Some(id) = id else {
            tracing::debug!(method, "Notification");
            return None;
        };

        tracing::debug!(method, %id, "Request");
        Some(match method {
            "initialize" => {
                let requested = params.get("protocolVersion").and_then(Value::as_str);
                rpc_response(
                    id,
                    json!({
                        "protocolVersion": negotiate_version(requested),
                        "capabilities": { "tools": { "listChanged": false } },
                        "serverInfo": { "name": self.name, "version": self.version }
                    }),
                )
            }
            "ping" => rpc_response(id, json!({})),
            "tools/list" => rpc_response(id, self.registry.list()),
            "tools/call" => {
                let Some(name) = params.get("name").and_then(Value::as_str) else {
                    return Some(json_error(id, INVALID_PARAMS, "Invalid params: missing tool name"));
                };
                let args = params.get("arguments").cloned().unwrap_or(Value::Null);
                tracing::info!(tool = name, "Tool call");
                let result = self.registry.call(Arc::clone(&self.ctx), name, args).await;
                match serde_json::to_value(result) {
                    Ok(result) => rpc_response(id, result),
                    Err(e) => json_error(id, INVALID_PARAMS, &e.to_string()),
                }
            }
            other => json_error(id, METHOD_NOT_FOUND, &format!("Method not found: {other}")),
        })
    }
}

async fn send_json<W, T>(writer: &Mutex<W>, message: &T) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let json = serde_json::to_string(message)?;
    let mut writer = writer.lock().await;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::{
        ToolError,
        registry::{ToolDescriptor, handler},
    };

    async fn wait(_ctx: Arc<()>, args: Value) -> Result<String, ToolError> {
        let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(format!("waited {ms}"))
    }

    fn server() -> Arc<McpServer<()>> {
        let mut registry = ToolRegistry::new();
        registry.register(ToolDescriptor {
            name: "wait",
            description: "Sleep then answer",
            input_schema: json!({"type": "object"}),
            handler: handler(wait),
        });
        Arc::new(McpServer::new(registry, Arc::new(())))
    }

    async fn ask(line: &str) -> Option<Value> {
        server().handle_message(line).await
    }

    #[tokio::test]
    async fn test_initialize() {
        let resp = ask(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26"}}"#)
            .await
            .unwrap();
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(resp["result"]["serverInfo"]["name"], "codespace-bridge");
        assert_eq!(resp["result"]["capabilities"]["tools"]["listChanged"], false);

        let resp = ask(r#"{"jsonrpc":"2.0","id":2,"method":"initialize","params":{"protocolVersion":"0.1"}}"#)
            .await
            .unwrap();
        assert_eq!(resp["result"]["protocolVersion"], "2024-11-05");
    }

    #[tokio::test]
    async fn test_notifications_get_no_reply() {
        assert!(ask(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await.is_none());
        assert!(ask(r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{}}"#).await.is_none());
        assert!(ask(r#"{"jsonrpc":"2.0","id":9,"result":{}}"#).await.is_none());
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let resp = ask("{not json").await.unwrap();
        assert_eq!(resp["error"]["code"], PARSE_ERROR);
        assert_eq!(resp["id"], Value::Null);

        let resp = ask(r#"{"jsonrpc":"2.0","id":"a","method":"resources/list"}"#).await.unwrap();
        assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(resp["id"], "a");

        let resp = ask(r#"{"jsonrpc":"2.0","id":3}"#).await.unwrap();
        assert_eq!(resp["error"]["code"], INVALID_REQUEST);

        let resp = ask("[1,2]").await.unwrap();
        assert_eq!(resp["error"]["code"], INVALID_REQUEST);

        let resp = ask(r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{}}"#).await.unwrap();
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_ping_list_and_call() {
        let resp = ask(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).await.unwrap();
        assert_eq!(resp["result"], json!({}));

        let resp = ask(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#).await.unwrap();
        assert_eq!(resp["result"]["tools"][0]["name"], "wait");

        let resp = ask(r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"wait","arguments":{"ms":1}}}"#)
            .await
            .unwrap();
        assert_eq!(resp["result"]["content"][0]["text"], "waited 1");
        assert_eq!(resp["result"]["isError"], false);

        let resp = ask(r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"missing"}}"#)
            .await
            .unwrap();
        assert_eq!(resp["result"]["isError"], true);
    }

    #[tokio::test]
    async fn test_serve_answers_concurrently_without_interleaving() {
        let (mut client, server_io) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let serving = tokio::spawn(server().serve(server_read, server_write));

        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"wait","arguments":{"ms":300}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        );
        client.write_all(input.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();

        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();
        serving.await.unwrap().unwrap();

        let responses: Vec<Value> = output.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 2);
        assert_eq!(responses[1]["id"], 1);
        assert_eq!(responses[1]["result"]["content"][0]["text"], "waited 300");
    }
}
