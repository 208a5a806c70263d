//! Whole-document rewriting for tool server and hook configuration files.

use serde_json::{Map, Value, json};

use crate::{
    ForwardError, Rewriter,
    descriptor::{HookDescriptor, ServerDescriptor},
};

/// Name of our own entry in the agent's tool server configuration.
pub const BRIDGE_SERVER_NAME: &str = "codespace";

/// Rewrite every command-launched server in `{"mcpServers": {...}}`.
///
/// Servers reached over a URL have nothing to forward and are kept as they
/// are. Unknown keys survive; `env` and `cwd` move into the forwarded
/// command.
///
/// # Errors
/// Returns `Malformed` if the document does not have the expected shape,
/// or the rewriter's error for an invalid server.
pub fn rewrite_server_config(document: &Value, rewriter: &Rewriter) -> Result<Value, ForwardError> {
    let mut document = document.clone();
    let servers = document
        .get_mut("mcpServers")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| ForwardError::Malformed("expected an \"mcpServers\" object".to_string()))?;

    for (name, entry) in servers.iter_mut() {
        rewrite_server_entry(name, entry, rewriter)?;
    }
    Ok(document)
}

fn rewrite_server_entry(name: &str, entry: &mut Value, rewriter: &Rewriter) -> Result<(), ForwardError> {
    let Some(object) = entry.as_object_mut() else {
        return Err(ForwardError::Malformed(format!("server {name:?} is not an object")));
    };
    if !object.contains_key("command") {
        tracing::debug!(server = name, "No command, keeping server as is");
        return Ok(());
    }

    let descriptor: ServerDescriptor = serde_json::from_value(Value::Object(object.clone()))
        .map_err(|e| ForwardError::Malformed(format!("server {name:?}: {e}")))?;
    let rule = rewriter.rewrite_server(&descriptor)?;

    object.insert("type".to_string(), json!("local"));
    object.insert("command".to_string(), json!(rule.forwarded.program));
    object.insert("args".to_string(), json!(rule.forwarded.args));
    object.remove("env");
    object.remove("cwd");
    tracing::debug!(server = name, "Forwarded server");
    Ok(())
}

/// Rewrite every hook in `{"hooks": {"<event>": [{bash, cwd, env, ...}]}}`.
///
/// Each hook's `bash` becomes the forwarded command line and its `cwd` and
/// `env` are dropped. Entries without `bash` are kept.
///
/// # Errors
/// Returns `NothingToRewrite` if no hook was forwarded, so the caller can
/// skip installing hooks that would run locally. Returns `Malformed` if the
/// document does not have the expected shape.
pub fn rewrite_hooks_config(document: &Value, rewriter: &Rewriter) -> Result<Value, ForwardError> {
    let mut document = document.clone();
    let events = document
        .get_mut("hooks")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| ForwardError::Malformed("expected a \"hooks\" object".to_string()))?;

    let mut forwarded = 0usize;
    for (event, hooks) in events.iter_mut() {
        let Some(hooks) = hooks.as_array_mut() else {
            return Err(ForwardError::Malformed(format!("hooks for {event:?} are not a list")));
        };
        for hook in hooks.iter_mut().filter_map(Value::as_object_mut) {
            if !hook.get("bash").is_some_and(Value::is_string) {
                continue;
            }
            let descriptor: HookDescriptor = serde_json::from_value(Value::Object(hook.clone()))
                .map_err(|e| ForwardError::Malformed(format!("hook for {event:?}: {e}")))?;
            let rule = rewriter.rewrite_hook(&descriptor)?;

            hook.insert("bash".to_string(), json!(rule.command_line()?));
            hook.remove("cwd");
            hook.remove("env");
            forwarded += 1;
        }
    }

    if forwarded == 0 {
        return Err(ForwardError::NothingToRewrite);
    }
    tracing::info!(forwarded, "Forwarded hooks");
    Ok(document)
}

/// Assemble the agent's tool server configuration.
///
/// Our own server comes first under `codespace`; remote servers follow in
/// forwarded form. A remote server named `codespace` is dropped.
///
/// # Errors
/// Returns the rewriter's error for an invalid remote server document.
pub fn build_agent_config(
    self_binary: &str,
    target: &str,
    workdir: &str,
    remote_servers: Option<&Value>,
    rewriter: &Rewriter,
) -> Result<Value, ForwardError> {
    let mut servers = Map::new();
    servers.insert(
        BRIDGE_SERVER_NAME.to_string(),
        json!({
            "type": "local",
            "command": self_binary,
            "args": ["serve"],
            "env": {
                "CODESPACE_NAME": target,
                "CODESPACE_WORKDIR": workdir,
            },
            "tools": ["*"],
        }),
    );

    if let Some(document) = remote_servers {
        let rewritten = rewrite_server_config(document, rewriter)?;
        if let Some(remote) = rewritten.get("mcpServers").and_then(Value::as_object) {
            for (name, entry) in remote {
                if name == BRIDGE_SERVER_NAME {
                    tracing::warn!("Remote server named {BRIDGE_SERVER_NAME:?} ignored");
                    continue;
                }
                servers.insert(name.clone(), entry.clone());
            }
        }
    }

    Ok(json!({ "mcpServers": servers }))
}
