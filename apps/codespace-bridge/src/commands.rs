//! Subcommand implementations.

use std::{
    path::{Path, PathBuf},
    process::Command,
    sync::Arc,
};

use anyhow::Context;
use codespace_bridge_core::BridgeConfig;
use codespace_bridge_forward::{
    ForwardError, IdeForward, Rewriter, Strategy, build_agent_config, build_command,
    default_lock_dir, deploy_helper, forward_ide_connections, remove_forwards,
    rewrite_hooks_config, rewrite_server_config,
};
use codespace_bridge_mcp::{McpServer, ToolContext, build_registry};
use codespace_bridge_transport::{Connection, GhCodespaceDiscovery, resolve_executable_path};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::cli::{DocumentKind, StrategyChoice, TargetArgs};

/// Serve the tools on stdio until the client closes its end.
///
/// Unless `no_ide` is set, IDE connections on the target are forwarded for
/// as long as the server runs.
pub async fn serve(target: &TargetArgs, no_ide: bool) -> anyhow::Result<()> {
    let config = target.config();
    let ssh = resolve_executable_path(&target.ssh)
        .await
        .with_context(|| format!("SSH client not found: {}", target.ssh))?;

    let mut connection = open_connection(target, &config)
        .await?
        .with_ssh_program(ssh.to_string_lossy());
    connection.establish().await;
    let forwards = if no_ide {
        Vec::new()
    } else {
        forward_ide(&connection, &config).await
    };
    let connection = Arc::new(connection);

    let ctx = Arc::new(ToolContext::new(Arc::clone(&connection), &config));
    let server = Arc::new(McpServer::new(build_registry::<Connection>(), ctx));
    tracing::info!(
        codespace = %config.target,
        workdir = %config.workdir,
        multiplexed = connection.is_multiplexed(),
        "Serving tools on stdio"
    );

    let served = server.serve(tokio::io::stdin(), tokio::io::stdout()).await;
    remove_forwards(&forwards).await;
    connection.close().await;
    served.context("Tool server failed")
}

/// Forward the target's IDE sockets over the SSH master. Failures only warn.
async fn forward_ide(connection: &Connection, config: &BridgeConfig) -> Vec<IdeForward> {
    if !connection.is_multiplexed() {
        tracing::debug!("No SSH master, skipping IDE forwarding");
        return Vec::new();
    }
    let Some(lock_dir) = default_lock_dir() else {
        tracing::debug!("No home directory, skipping IDE forwarding");
        return Vec::new();
    };
    let workdir = std::env::current_dir()
        .map(|dir| dir.to_string_lossy().into_owned())
        .unwrap_or_default();

    match forward_ide_connections(connection, &config.target, &workdir, &lock_dir, &std::env::temp_dir()).await {
        Ok(forwards) => forwards,
        Err(e) => {
            tracing::warn!("IDE forwarding skipped: {e:#}");
            Vec::new()
        }
    }
}

/// Replace this process with `argv`, run in `workdir` with `env` added.
pub fn exec(workdir: Option<&str>, env: &[String], argv: &[String]) -> anyhow::Result<()> {
    let command = build_command(workdir, env, argv)?;
    replace_process(command)
}

#[cfg(unix)]
fn replace_process(mut command: Command) -> anyhow::Result<()> {
    use std::os::unix::process::CommandExt;

    let program = command.get_program().to_string_lossy().into_owned();
    let err = command.exec();
    Err(err).with_context(|| format!("Cannot exec {program}"))
}

#[cfg(not(unix))]
fn replace_process(mut command: Command) -> anyhow::Result<()> {
    let program = command.get_program().to_string_lossy().into_owned();
    let status = command
        .status()
        .with_context(|| format!("Cannot run {program}"))?;
    std::process::exit(status.code().unwrap_or(1))
}

/// Forward a hooks or tool server document.
pub async fn rewrite(
    target: &TargetArgs,
    kind: DocumentKind,
    input: &Path,
    output: Option<&Path>,
    choice: StrategyChoice,
) -> anyhow::Result<()> {
    let config = target.config();
    let document = read_json(input).await?;
    let connection = open_connection(target, &config).await?;
    let rewriter = rewriter(&connection, &config, choice).await?;

    let rewritten = match kind {
        DocumentKind::Hooks => match rewrite_hooks_config(&document, &rewriter) {
            Ok(rewritten) => rewritten,
            Err(ForwardError::NothingToRewrite) => {
                tracing::warn!(input = %input.display(), "No bash hooks to forward, skipping");
                return Ok(());
            }
            Err(e) => return Err(e).with_context(|| format!("Cannot rewrite {}", input.display())),
        },
        DocumentKind::Servers => rewrite_server_config(&document, &rewriter)
            .with_context(|| format!("Cannot rewrite {}", input.display()))?,
    };
    write_json(&rewritten, output).await
}

/// Emit the agent's tool server configuration.
pub async fn config(
    target: &TargetArgs,
    servers: Option<&Path>,
    output: Option<&Path>,
    choice: StrategyChoice,
) -> anyhow::Result<()> {
    let config = target.config();
    let remote = match servers {
        Some(path) => Some(read_json(path).await?),
        None => None,
    };
    // Nothing to forward without remote servers, so skip the helper upload.
    let choice = if remote.is_some() { choice } else { StrategyChoice::Shell };

    let connection = open_connection(target, &config).await?;
    let rewriter = rewriter(&connection, &config, choice).await?;
    let self_binary = self_binary()?;

    let agent = build_agent_config(
        &self_binary.to_string_lossy(),
        &config.target,
        &config.workdir,
        remote.as_ref(),
        &rewriter,
    )?;
    write_json(&agent, output).await
}

/// A connection in direct mode, addressing the target through `gh`.
async fn open_connection(target: &TargetArgs, config: &BridgeConfig) -> anyhow::Result<Connection> {
    let gh = resolve_executable_path(&target.gh)
        .await
        .with_context(|| format!("GitHub CLI not found: {}", target.gh))?;
    let discovery = Arc::new(GhCodespaceDiscovery::new(gh.to_string_lossy()));
    Ok(Connection::new(config, discovery))
}

async fn rewriter(connection: &Connection, config: &BridgeConfig, choice: StrategyChoice) -> anyhow::Result<Rewriter> {
    let strategy = match choice {
        StrategyChoice::Shell => Strategy::ShellAssembly,
        StrategyChoice::Structured => Strategy::Structured {
            helper: deploy(connection).await?,
        },
        StrategyChoice::Auto => match deploy(connection).await {
            Ok(helper) => Strategy::Structured { helper },
            Err(e) => {
                tracing::warn!("Exec helper unavailable, using shell assembly: {e:#}");
                Strategy::ShellAssembly
            }
        },
    };
    Ok(Rewriter::new(connection.addressing(), &config.workdir, strategy))
}

async fn deploy(connection: &Connection) -> anyhow::Result<String> {
    let binary = self_binary()?;
    deploy_helper(connection, &binary)
        .await
        .context("Cannot deploy exec helper")
}

fn self_binary() -> anyhow::Result<PathBuf> {
    std::env::current_exe().context("Cannot locate own binary")
}

async fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

async fn write_json(value: &Value, output: Option<&Path>) -> anyhow::Result<()> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    match output {
        Some(path) => tokio::fs::write(path, text)
            .await
            .with_context(|| format!("Cannot write {}", path.display()))?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(text.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
