//! Generated SSH config for the multiplexed connection.

use std::{path::Path, time::Duration};

use codespace_bridge_core::ConnectionProfile;

/// Build a profile from SSH config text, taking the alias of the first
/// `Host` block.
#[must_use]
pub fn parse_profile(config: &str) -> Option<ConnectionProfile> {
    let host_alias = config.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("Host ")?;
        rest.split_whitespace().next().map(str::to_string)
    })?;
    Some(ConnectionProfile {
        host_alias,
        ssh_config: config.to_string(),
    })
}

/// Append `ControlPath` and `ControlPersist` unless the profile sets them.
#[must_use]
pub fn with_control_options(config: &str, control_path: &Path, persist: Duration) -> String {
    let mut out = config.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    if !config.contains("ControlPath") {
        out.push_str(&format!("\tControlPath {}\n", control_path.display()));
    }
    if !config.contains("ControlPersist") {
        out.push_str(&format!("\tControlPersist {}\n", persist.as_secs()));
    }
    out
}

/// Write `contents` readable by the owner only.
///
/// # Errors
/// Returns error if the file cannot be written.
pub async fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    tokio::fs::write(path, contents).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    Ok(())
}
