//! Argument handling for the exec helper (`codespace-bridge exec`).

use std::process::Command;

use codespace_bridge_core::is_env_name;

use crate::ForwardError;

/// Split a `K=V` assignment. The value may itself contain `=`.
///
/// # Errors
/// Returns `InvalidEnvPair` without `=` and `InvalidEnvName` for a key that
/// is not an identifier.
pub fn parse_env_pair(pair: &str) -> Result<(String, String), ForwardError> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| ForwardError::InvalidEnvPair(pair.to_string()))?;
    if !is_env_name(key) {
        return Err(ForwardError::InvalidEnvName(key.to_string()));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Build the command the helper replaces itself with.
///
/// # Errors
/// Returns `MissingCommand` if `argv` is empty, or a parse error for any
/// environment assignment.
pub fn build_command(workdir: Option<&str>, env: &[String], argv: &[String]) -> Result<Command, ForwardError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(ForwardError::MissingCommand);
    };

    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = workdir {
        command.current_dir(dir);
    }
    for pair in env {
        let (key, value) = parse_env_pair(pair)?;
        command.env(key, value);
    }
    Ok(command)
}
