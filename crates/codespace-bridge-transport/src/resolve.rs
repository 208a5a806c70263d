//! Local executable resolution.

use std::path::{Path, PathBuf};

/// Resolve an executable by name.
///
/// Explicit paths are taken as they are when they point at a file;
/// bare names are looked up on `PATH` via `which`.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.components().count() > 1 || path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }

    which_async(executable).await
}

async fn which_async(executable: &str) -> Option<PathBuf> {
    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_from_path() {
        let sh = resolve_executable_path("sh").await.unwrap();
        assert!(sh.is_absolute());
    }

    #[tokio::test]
    async fn test_explicit_path() {
        assert_eq!(
            resolve_executable_path("/bin/sh").await,
            Some(PathBuf::from("/bin/sh"))
        );
        assert!(resolve_executable_path("/nonexistent/dir/ssh").await.is_none());
    }

    #[tokio::test]
    async fn test_missing_and_empty() {
        assert!(resolve_executable_path("no-such-tool-4d1c").await.is_none());
        assert!(resolve_executable_path("  ").await.is_none());
    }
}
