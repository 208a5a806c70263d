//! Session manager for long-lived remote commands.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use codespace_bridge_core::{ExecOutput, RemoteShell, TransportError, quote};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    input::{InputSegment, parse_input},
    registry::{SessionRecord, SessionState},
};

/// Prefix of every tmux session this bridge owns.
pub const SESSION_PREFIX: &str = "bridge-";

/// Makes user-level tool installs (mise shims) visible to tmux calls.
const TOOL_PATH: &str = r#"PATH="$HOME/.local/bin:$HOME/.local/share/mise/shims:$PATH""#;

const MISSING_STATUS: i32 = 44;
const COMMAND_NOT_FOUND: i32 = 127;
const DEAD_MARKER: &str = "__pane_dead=";
const EXITED_NOTICE: &str = "[session exited]";
const MAX_ID_LEN: usize = 64;

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid session id {0:?}: use 1-64 characters from [A-Za-z0-9_-]")]
    InvalidId(String),
    #[error("Session already exists: {0}")]
    AlreadyExists(String),
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Unsupported environment: {0}")]
    UnsupportedEnvironment(String),
    #[error("{context} failed (exit {exit_code}): {stderr}")]
    RemoteCommand {
        context: &'static str,
        exit_code: i32,
        stderr: String,
    },
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Cannot quote argument: {0}")]
    Quote(#[from] shlex::QuoteError),
}

/// A live remote session as reported by tmux.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: String,
    /// Unix epoch seconds.
    pub created_at: i64,
    /// Unix epoch seconds of the last activity.
    pub last_activity: i64,
    /// Local state, when this process started the session.
    pub state: Option<SessionState>,
}

/// Manages tmux sessions on the target.
pub struct SessionManager<S> {
    shell: Arc<S>,
    workdir: String,
    tmux_ready: AtomicBool,
    active_sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl<S: RemoteShell> SessionManager<S> {
    /// Create a manager whose sessions start in `workdir`.
    #[must_use]
    pub fn new(shell: Arc<S>, workdir: impl Into<String>) -> Self {
        Self {
            shell,
            workdir: workdir.into(),
            tmux_ready: AtomicBool::new(false),
            active_sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Fresh identifier of the form `sh-xxxxxxxx`.
    #[must_use]
    pub fn generate_id() -> String {
        let uuid = Uuid::new_v4().simple().to_string();
        format!("sh-{}", &uuid[..8])
    }

    /// Start `command` in a new session.
    ///
    /// The pane stays around after the command exits so its output can
    /// still be read.
    ///
    /// # Errors
    /// Returns `InvalidId` or `AlreadyExists` for a bad id,
    /// `UnsupportedEnvironment` if tmux cannot be made available, and
    /// `RemoteCommand` if tmux refuses to start the session.
    pub async fn start(&self, id: &str, command: &str) -> Result<(), SessionError> {
        validate_id(id)?;
        self.ensure_tmux().await?;

        let name = session_name(id);
        {
            let mut registry = self.active_sessions.write().await;
            if registry.contains_key(id) {
                return Err(SessionError::AlreadyExists(id.to_string()));
            }
            registry.insert(id.to_string(), SessionRecord::new(id, &name));
        }

        if let Err(e) = self.create_remote(id, &name, command).await {
            self.release(id).await;
            return Err(e);
        }

        self.set_state(id, SessionState::Running).await;
        tracing::info!(id, session = %name, "Started remote session");
        Ok(())
    }

    /// Create the tmux session for a reserved id.
    async fn create_remote(&self, id: &str, name: &str, command: &str) -> Result<(), SessionError> {
        if self.has_session(name).await? {
            return Err(SessionError::AlreadyExists(id.to_string()));
        }

        let pane = exact_pane(name)?;
        let script = format!(
            "tmux new-session -d -s {} -x 200 -y 50 \\; set-window-option -t {pane} remain-on-exit on \\; respawn-pane -k -t {pane} {}",
            quote(name)?,
            quote(&format!("cd {} && {command}", quote(&self.workdir)?))?,
        );
        let output = self.tmux(&script).await?;
        if !output.success() {
            return Err(SessionError::RemoteCommand {
                context: "start session",
                exit_code: output.exit_code,
                stderr: output.failure_detail(),
            });
        }
        Ok(())
    }

    /// Drop a reservation left by a failed start.
    ///
    /// Only `Created` records are removed; they belong to the start call in
    /// flight and nothing else touches them.
    async fn release(&self, id: &str) {
        let mut registry = self.active_sessions.write().await;
        if registry.get(id).is_some_and(|r| r.state == SessionState::Created) {
            registry.remove(id);
        }
    }

    /// Send keystrokes to a session, one remote call per segment.
    ///
    /// # Errors
    /// Returns `NotFound` if the session does not exist.
    pub async fn write(&self, id: &str, input: &str) -> Result<(), SessionError> {
        validate_id(id)?;
        let name = session_name(id);
        if !self.has_session(&name).await? {
            return Err(SessionError::NotFound(id.to_string()));
        }

        let pane = exact_pane(&name)?;
        for segment in parse_input(input) {
            let script = match &segment {
                InputSegment::Literal(text) => {
                    format!("tmux send-keys -t {pane} -l -- {}", quote(text)?)
                }
                InputSegment::Key(key) => format!("tmux send-keys -t {pane} {}", key.tmux_name()),
            };
            let output = self.tmux(&script).await?;
            if !output.success() {
                return Err(not_found_or(id, &output, "write session"));
            }
        }
        Ok(())
    }

    /// Capture the last 100 lines of a session's pane.
    ///
    /// A pane whose command has exited is marked with a trailing
    /// `[session exited]` line.
    ///
    /// # Errors
    /// Returns `NotFound` if the session does not exist.
    pub async fn read(&self, id: &str) -> Result<String, SessionError> {
        validate_id(id)?;
        let name = session_name(id);
        let pane = exact_pane(&name)?;
        let script = format!(
            "tmux has-session -t {} 2>/dev/null || exit {MISSING_STATUS}; \
             tmux capture-pane -p -J -t {pane} -S -100 && \
             tmux display-message -p -t {pane} '{DEAD_MARKER}#{{pane_dead}}' >&2",
            exact_session(&name)?
        );
        let output = self.tmux(&script).await?;
        match output.exit_code {
            0 => {}
            MISSING_STATUS => {
                self.forget(id).await;
                return Err(SessionError::NotFound(id.to_string()));
            }
            _ => return Err(not_found_or(id, &output, "read session")),
        }

        let dead = output
            .stderr
            .lines()
            .filter_map(|line| line.strip_prefix(DEAD_MARKER))
            .any(|flag| flag.trim() == "1");

        let mut text = output.stdout.trim_end().to_string();
        if dead {
            self.set_state(id, SessionState::ExitedRemaining).await;
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(EXITED_NOTICE);
        }
        Ok(text)
    }

    /// Kill a session.
    ///
    /// # Errors
    /// Returns `NotFound` if the session does not exist.
    pub async fn stop(&self, id: &str) -> Result<(), SessionError> {
        validate_id(id)?;
        let name = session_name(id);
        let output = self
            .tmux(&format!("tmux kill-session -t {}", exact_session(&name)?))
            .await?;
        if !output.success() {
            let err = not_found_or(id, &output, "stop session");
            if matches!(err, SessionError::NotFound(_)) {
                self.forget(id).await;
            }
            return Err(err);
        }

        self.set_state(id, SessionState::Stopped).await;
        self.active_sessions.write().await.remove(id);
        tracing::info!(id, "Stopped remote session");
        Ok(())
    }

    /// List live sessions owned by this bridge, oldest first.
    ///
    /// Registry entries whose session no longer exists remotely are dropped.
    ///
    /// # Errors
    /// Returns `RemoteCommand` if tmux fails for a reason other than having
    /// no server running or not being installed.
    pub async fn list(&self) -> Result<Vec<SessionInfo>, SessionError> {
        let output = self
            .tmux("tmux list-sessions -F '#{session_name} #{session_created} #{session_activity}'")
            .await?;
        if !output.success() {
            if no_server(&output) || output.exit_code == COMMAND_NOT_FOUND {
                self.active_sessions
                    .write()
                    .await
                    .retain(|_, record| record.state == SessionState::Created);
                return Ok(Vec::new());
            }
            return Err(SessionError::RemoteCommand {
                context: "list sessions",
                exit_code: output.exit_code,
                stderr: output.failure_detail(),
            });
        }

        let mut sessions: Vec<SessionInfo> = output.stdout.lines().filter_map(parse_list_line).collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let live: HashSet<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        let mut registry = self.active_sessions.write().await;
        registry.retain(|id, record| {
            let keep = record.state == SessionState::Created || live.contains(id.as_str());
            if !keep {
                tracing::debug!(id, state = ?record.state, "Dropping stale session record");
            }
            keep
        });
        for session in &mut sessions {
            session.state = registry.get(&session.id).map(|r| r.state);
        }
        drop(registry);

        Ok(sessions)
    }

    /// Registry entry for `id`, if this process started it.
    pub async fn record(&self, id: &str) -> Option<SessionRecord> {
        self.active_sessions.read().await.get(id).cloned()
    }

    /// Make sure tmux is runnable on the target, installing it with mise
    /// when missing.
    async fn ensure_tmux(&self) -> Result<(), SessionError> {
        if self.tmux_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        if !self.tmux("command -v tmux >/dev/null 2>&1").await?.success() {
            tracing::warn!("tmux not found on target, installing via mise");
            let install = self
                .tmux(
                    "(command -v mise >/dev/null 2>&1 || curl -fsSL https://mise.jdx.dev/install.sh | sh) && mise use -g tmux",
                )
                .await?;
            if !install.success() {
                return Err(SessionError::UnsupportedEnvironment(format!(
                    "tmux is not installed and installing it failed: {}",
                    install.failure_detail()
                )));
            }
            if !self.tmux("command -v tmux >/dev/null 2>&1").await?.success() {
                return Err(SessionError::UnsupportedEnvironment(
                    "tmux still not available after install".to_string(),
                ));
            }
        }
        self.tmux_ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Drop the record of a session that is gone remotely, unless a start
    /// for it is still in flight.
    async fn forget(&self, id: &str) {
        let mut registry = self.active_sessions.write().await;
        if registry.get(id).is_some_and(|r| r.state != SessionState::Created) {
            registry.remove(id);
        }
    }

    async fn has_session(&self, name: &str) -> Result<bool, SessionError> {
        let script = format!("tmux has-session -t {} 2>/dev/null", exact_session(name)?);
        Ok(self.tmux(&script).await?.success())
    }

    async fn set_state(&self, id: &str, state: SessionState) {
        if let Some(record) = self.active_sessions.write().await.get_mut(id) {
            record.transition(state);
        }
    }

    async fn tmux(&self, script: &str) -> Result<ExecOutput, SessionError> {
        Ok(self.shell.exec(&format!("{TOOL_PATH} && {script}")).await?)
    }
}

/// tmux session name for a session id.
#[must_use]
pub fn session_name(id: &str) -> String {
    format!("{SESSION_PREFIX}{id}")
}

fn validate_id(id: &str) -> Result<(), SessionError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(SessionError::InvalidId(id.to_string()))
    }
}

/// Exact-match session target, so `bridge-a` never resolves to `bridge-ab`.
fn exact_session(name: &str) -> Result<String, shlex::QuoteError> {
    quote(&format!("={name}"))
}

/// Active pane of the exact-match session.
fn exact_pane(name: &str) -> Result<String, shlex::QuoteError> {
    quote(&format!("={name}:"))
}

fn parse_list_line(line: &str) -> Option<SessionInfo> {
    let mut fields = line.split_whitespace();
    let id = fields.next()?.strip_prefix(SESSION_PREFIX)?;
    if validate_id(id).is_err() {
        return None;
    }
    Some(SessionInfo {
        id: id.to_string(),
        created_at: fields.next().and_then(|v| v.parse().ok()).unwrap_or(0),
        last_activity: fields.next().and_then(|v| v.parse().ok()).unwrap_or(0),
        state: None,
    })
}

fn no_server(output: &ExecOutput) -> bool {
    let stderr = output.stderr.to_lowercase();
    stderr.contains("no server running") || stderr.contains("error connecting")
}

fn not_found_or(id: &str, output: &ExecOutput, context: &'static str) -> SessionError {
    let stderr = output.stderr.to_lowercase();
    if stderr.contains("can't find") || stderr.contains("no such session") || no_server(output) {
        SessionError::NotFound(id.to_string())
    } else {
        SessionError::RemoteCommand {
            context,
            exit_code: output.exit_code,
            stderr: output.failure_detail(),
        }
    }
}
