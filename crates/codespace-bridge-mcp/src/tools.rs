//! The `remote_*` tools.

use std::{fmt::Write as _, sync::Arc, time::Duration};

use codespace_bridge_core::{BridgeConfig, RemoteOperation, RemoteShell};
use codespace_bridge_executor::RemoteExecutor;
use codespace_bridge_session::{SessionManager, SessionState};
use serde_json::{Value, json};

use crate::{
    ToolError,
    registry::{ToolDescriptor, ToolRegistry, handler},
    requests::{
        BashMode, BashRequest, CreateRequest, EditRequest, GlobRequest, GrepRequest,
        ListBashRequest, ReadBashRequest, StopBashRequest, ViewRequest, WriteBashRequest, parse,
    },
};

/// Everything a tool handler needs.
pub struct ToolContext<S> {
    pub executor: RemoteExecutor<S>,
    pub sessions: SessionManager<S>,
    /// Wait between starting an async command and its first read.
    pub start_grace: Duration,
    /// Default wait before reading a session.
    pub read_delay: Duration,
}

impl<S: RemoteShell> ToolContext<S> {
    #[must_use]
    pub fn new(shell: Arc<S>, config: &BridgeConfig) -> Self {
        Self {
            executor: RemoteExecutor::new(Arc::clone(&shell), config),
            sessions: SessionManager::new(shell, config.workdir.clone()),
            start_grace: config.start_grace,
            read_delay: config.read_delay,
        }
    }

    fn delay(&self, secs: Option<u64>) -> Duration {
        secs.map_or(self.read_delay, Duration::from_secs)
    }
}

/// Registry with every remote tool.
#[must_use]
pub fn build_registry<S: RemoteShell + 'static>() -> ToolRegistry<ToolContext<S>> {
    let mut registry = ToolRegistry::new();
    let shell_id = json!({"type": "string", "description": "Session identifier ([A-Za-z0-9_-], up to 64 characters)"});
    let delay = json!({"type": "integer", "minimum": 0, "maximum": 60, "description": "Seconds to wait before reading output (default 2)"});

    registry.register(ToolDescriptor {
        name: "remote_view",
        description: "View a file with line numbers, or list a directory, on the remote codespace.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File or directory path (relative paths resolve against the workspace root)"},
                "view_range": {
                    "type": "array",
                    "items": {"type": "integer"},
                    "minItems": 2,
                    "maxItems": 2,
                    "description": "[start, end] 1-based inclusive line range; end = -1 reads to the end"
                }
            },
            "required": ["path"]
        }),
        handler: handler(remote_view::<S>),
    });

    registry.register(ToolDescriptor {
        name: "remote_edit",
        description: "Replace exactly one occurrence of old_str with new_str in a remote file.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "old_str": {"type": "string", "description": "Text to replace; must occur exactly once"},
                "new_str": {"type": "string"}
            },
            "required": ["path", "old_str", "new_str"]
        }),
        handler: handler(remote_edit::<S>),
    });

    registry.register(ToolDescriptor {
        name: "remote_create",
        description: "Create or overwrite a remote file, creating parent directories as needed.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "file_text": {"type": "string"}
            },
            "required": ["path", "file_text"]
        }),
        handler: handler(remote_create::<S>),
    });

    registry.register(ToolDescriptor {
        name: "remote_bash",
        description: "Run a shell command in the remote workspace. Sync mode returns its output; async mode starts a session you can drive with remote_write_bash and remote_read_bash.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "command": {"type": "string"},
                "description": {"type": "string", "description": "Short description of what the command does"},
                "mode": {"type": "string", "enum": ["sync", "async"], "default": "sync"},
                "shellId": shell_id.clone(),
                "timeout": {"type": "integer", "minimum": 1, "description": "Seconds to wait for a sync command"}
            },
            "required": ["command"]
        }),
        handler: handler(remote_bash::<S>),
    });

    registry.register(ToolDescriptor {
        name: "remote_grep",
        description: "Search file contents in the remote workspace (ripgrep when available, grep otherwise).",
        input_schema: json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Regular expression"},
                "path": {"type": "string", "description": "Directory or file to search (default: workspace root)"},
                "glob": {"type": "string", "description": "Only search files matching this glob"}
            },
            "required": ["pattern"]
        }),
        handler: handler(remote_grep::<S>),
    });

    registry.register(ToolDescriptor {
        name: "remote_glob",
        description: "Find files by glob pattern in the remote workspace.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Glob such as **/*.rs"},
                "path": {"type": "string", "description": "Directory to search (default: workspace root)"}
            },
            "required": ["pattern"]
        }),
        handler: handler(remote_glob::<S>),
    });

    registry.register(ToolDescriptor {
        name: "remote_write_bash",
        description: "Send input to an async session, then return its recent output. Use {enter}, {up}, {down}, {left}, {right}, {backspace} for keys.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "shellId": shell_id.clone(),
                "input": {"type": "string"},
                "delay": delay.clone()
            },
            "required": ["shellId"]
        }),
        handler: handler(remote_write_bash::<S>),
    });

    registry.register(ToolDescriptor {
        name: "remote_read_bash",
        description: "Return the recent output of an async session.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "shellId": shell_id.clone(),
                "delay": delay.clone()
            },
            "required": ["shellId"]
        }),
        handler: handler(remote_read_bash::<S>),
    });

    registry.register(ToolDescriptor {
        name: "remote_stop_bash",
        description: "Terminate an async session.",
        input_schema: json!({
            "type": "object",
            "properties": {"shellId": shell_id.clone()},
            "required": ["shellId"]
        }),
        handler: handler(remote_stop_bash::<S>),
    });

    registry.register(ToolDescriptor {
        name: "remote_list_bash",
        description: "List active async sessions.",
        input_schema: json!({"type": "object", "properties": {}}),
        handler: handler(remote_list_bash::<S>),
    });

    registry
}

async fn remote_view<S: RemoteShell>(ctx: Arc<ToolContext<S>>, args: Value) -> Result<String, ToolError> {
    let req: ViewRequest = parse(args)?;
    Ok(ctx.executor.view(&req.path, req.view_range).await?)
}

async fn remote_edit<S: RemoteShell>(ctx: Arc<ToolContext<S>>, args: Value) -> Result<String, ToolError> {
    let req: EditRequest = parse(args)?;
    ctx.executor.edit(&req.path, &req.old_str, &req.new_str).await?;
    Ok(format!("Successfully edited {}", req.path))
}

async fn remote_create<S: RemoteShell>(ctx: Arc<ToolContext<S>>, args: Value) -> Result<String, ToolError> {
    let req: CreateRequest = parse(args)?;
    ctx.executor.create(&req.path, &req.file_text).await?;
    Ok(format!("Created {}", req.path))
}

async fn remote_bash<S: RemoteShell>(ctx: Arc<ToolContext<S>>, args: Value) -> Result<String, ToolError> {
    let req = parse::<BashRequest>(args)?.validated()?;
    if let Some(description) = &req.description {
        tracing::info!(command = %req.command, description, "remote_bash");
    }

    if req.mode == BashMode::Async {
        let id = req.shell_id.unwrap_or_else(SessionManager::<S>::generate_id);
        ctx.sessions.start(&id, &req.command).await?;
        tokio::time::sleep(ctx.start_grace).await;
        let output = ctx.sessions.read(&id).await?;
        return Ok(format!("Started async session: {id}\n\n{output}"));
    }

    let mut op = RemoteOperation::new(req.command);
    if let Some(secs) = req.timeout {
        op = op.with_timeout(Duration::from_secs(secs));
    }
    let output = ctx.executor.run(&op).await?;

    let mut text = output.stdout;
    if !output.stderr.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str("STDERR:\n");
        text.push_str(&output.stderr);
    }
    if output.exit_code != 0 {
        let _ = write!(text, "\n[exit code: {}]", output.exit_code);
    }
    Ok(text)
}

async fn remote_grep<S: RemoteShell>(ctx: Arc<ToolContext<S>>, args: Value) -> Result<String, ToolError> {
    let req: GrepRequest = parse(args)?;
    Ok(ctx
        .executor
        .search(&req.pattern, req.path.as_deref(), req.glob.as_deref())
        .await?)
}

async fn remote_glob<S: RemoteShell>(ctx: Arc<ToolContext<S>>, args: Value) -> Result<String, ToolError> {
    let req: GlobRequest = parse(args)?;
    Ok(ctx.executor.find(&req.pattern, req.path.as_deref()).await?)
}

async fn remote_write_bash<S: RemoteShell>(ctx: Arc<ToolContext<S>>, args: Value) -> Result<String, ToolError> {
    let req = parse::<WriteBashRequest>(args)?.validated()?;
    if let Some(input) = req.input.as_deref().filter(|i| !i.is_empty()) {
        ctx.sessions.write(&req.shell_id, input).await?;
    }
    tokio::time::sleep(ctx.delay(req.delay)).await;
    Ok(ctx.sessions.read(&req.shell_id).await?)
}

async fn remote_read_bash<S: RemoteShell>(ctx: Arc<ToolContext<S>>, args: Value) -> Result<String, ToolError> {
    let req = parse::<ReadBashRequest>(args)?.validated()?;
    tokio::time::sleep(ctx.delay(req.delay)).await;
    Ok(ctx.sessions.read(&req.shell_id).await?)
}

async fn remote_stop_bash<S: RemoteShell>(ctx: Arc<ToolContext<S>>, args: Value) -> Result<String, ToolError> {
    let req: StopBashRequest = parse(args)?;
    ctx.sessions.stop(&req.shell_id).await?;
    Ok(format!("Stopped session {}", req.shell_id))
}

async fn remote_list_bash<S: RemoteShell>(ctx: Arc<ToolContext<S>>, args: Value) -> Result<String, ToolError> {
    let _: ListBashRequest = parse(args)?;
    let sessions = ctx.sessions.list().await?;
    if sessions.is_empty() {
        return Ok("No active sessions.".to_string());
    }

    let mut text = String::new();
    for session in sessions {
        let state = match session.state {
            Some(SessionState::ExitedRemaining) => " (exited)",
            Some(SessionState::Running) => " (running)",
            _ => "",
        };
        let _ = writeln!(
            text,
            "{}  created {}  last activity {}{state}",
            session.id, session.created_at, session.last_activity
        );
    }
    Ok(text.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use codespace_bridge_core::{ExecOutput, TransportError};

    use super::*;

    /// Answers with canned outputs chosen by substring and records every call.
    #[derive(Default)]
    struct FakeShell {
        rules: Vec<(&'static str, ExecOutput)>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeShell {
        fn with(rules: Vec<(&'static str, ExecOutput)>) -> Arc<Self> {
            Arc::new(Self {
                rules,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteShell for FakeShell {
        async fn exec_with_stdin(&self, command: &str, _stdin: Option<&[u8]>) -> Result<ExecOutput, TransportError> {
            self.calls.lock().unwrap().push(command.to_string());
            Ok(self
                .rules
                .iter()
                .find(|(needle, _)| command.contains(needle))
                .map(|(_, out)| out.clone())
                .unwrap_or_default())
        }
    }

    fn context(shell: Arc<FakeShell>) -> Arc<ToolContext<FakeShell>> {
        let mut config = BridgeConfig::new("cs").with_workdir("/workspaces/app");
        config.start_grace = Duration::ZERO;
        config.read_delay = Duration::ZERO;
        Arc::new(ToolContext::new(shell, &config))
    }

    async fn call(shell: Arc<FakeShell>, name: &str, args: Value) -> (bool, String) {
        let result = build_registry::<FakeShell>().call(context(shell), name, args).await;
        (result.is_error, result.content[0].text.clone())
    }

    #[test]
    fn test_registry_has_every_tool() {
        let registry = build_registry::<FakeShell>();
        assert_eq!(
            registry.names(),
            [
                "remote_view",
                "remote_edit",
                "remote_create",
                "remote_bash",
                "remote_grep",
                "remote_glob",
                "remote_write_bash",
                "remote_read_bash",
                "remote_stop_bash",
                "remote_list_bash",
            ]
        );
        let listed = registry.list();
        for tool in listed["tools"].as_array().unwrap() {
            assert_eq!(tool["inputSchema"]["type"], "object");
        }
    }

    #[tokio::test]
    async fn test_bash_sync_output_format() {
        let shell = FakeShell::with(vec![("make", ExecOutput::new("built\n", "warning: x\n", 2))]);
        let (is_error, text) = call(shell.clone(), "remote_bash", json!({"command": "make"})).await;
        assert!(!is_error);
        assert_eq!(text, "built\nSTDERR:\nwarning: x\n\n[exit code: 2]");
        assert_eq!(shell.calls(), ["cd /workspaces/app && make"]);

        let shell = FakeShell::with(vec![("true", ExecOutput::new("ok\n", "", 0))]);
        let (_, text) = call(shell, "remote_bash", json!({"command": "true"})).await;
        assert_eq!(text, "ok\n");
    }

    #[tokio::test]
    async fn test_bash_async_starts_and_reads() {
        let shell = FakeShell::with(vec![
            ("command -v tmux", ExecOutput::default()),
            ("capture-pane", ExecOutput::new("hello\n", "__pane_dead=1\n", 0)),
            ("has-session", ExecOutput::new("", "", 1)),
        ]);
        let (is_error, text) = call(
            shell.clone(),
            "remote_bash",
            json!({"command": "echo hello", "mode": "async", "shellId": "demo"}),
        )
        .await;
        assert!(!is_error, "{text}");
        assert_eq!(text, "Started async session: demo\n\nhello\n[session exited]");
        assert!(shell.calls().iter().any(|c| c.contains("new-session -d -s bridge-demo")));
    }

    #[tokio::test]
    async fn test_malformed_request_never_reaches_remote() {
        let shell = FakeShell::with(Vec::new());
        let (is_error, text) = call(shell.clone(), "remote_edit", json!({"path": "a.rs"})).await;
        assert!(is_error);
        assert!(text.starts_with("Malformed request:"), "{text}");

        let (is_error, _) = call(shell.clone(), "remote_read_bash", json!({"shellId": "x", "delay": 600})).await;
        assert!(is_error);
        let (is_error, text) = call(shell.clone(), "remote_bash", json!({"command": "ls", "timeout": 0})).await;
        assert!(is_error);
        assert!(text.contains("timeout must be at least 1 second"), "{text}");
        assert!(shell.calls().is_empty());
    }

    #[tokio::test]
    async fn test_domain_errors_are_tool_errors() {
        let shell = FakeShell::with(vec![("exit 44", ExecOutput::new("", "", 44))]);
        let (is_error, text) = call(shell, "remote_view", json!({"path": "missing.rs"})).await;
        assert!(is_error);
        assert_eq!(text, "Not found: missing.rs");
    }

    #[tokio::test]
    async fn test_list_bash_empty() {
        let shell = FakeShell::with(vec![("list-sessions", ExecOutput::new("", "no server running on /tmp/tmux", 1))]);
        let (is_error, text) = call(shell, "remote_list_bash", json!({})).await;
        assert!(!is_error);
        assert_eq!(text, "No active sessions.");
    }

    #[tokio::test]
    async fn test_list_bash_formats_sessions() {
        let shell = FakeShell::with(vec![(
            "list-sessions",
            ExecOutput::new("bridge-dev 1700000000 1700000050\nmain 1 2\n", "", 0),
        )]);
        let (_, text) = call(shell, "remote_list_bash", Value::Null).await;
        assert_eq!(text, "dev  created 1700000000  last activity 1700000050");
    }

    #[tokio::test]
    async fn test_edit_and_create_messages() {
        let shell = FakeShell::with(vec![("mkdir -p", ExecOutput::default())]);
        let (is_error, text) = call(shell, "remote_create", json!({"path": "src/new.rs", "file_text": "x"})).await;
        assert!(!is_error);
        assert_eq!(text, "Created src/new.rs");
    }
}
