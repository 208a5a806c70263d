//! File viewing and editing.

use std::path::Path;

use codespace_bridge_core::{RemoteShell, codec, quote};

use crate::{ExecutorError, RemoteExecutor, executor::MISSING_STATUS};

impl<S: RemoteShell> RemoteExecutor<S> {
    /// Show a file with `N. ` line prefixes, or list a directory.
    ///
    /// `range` is `(start, end)` with 1-based inclusive lines; `end == -1`
    /// reads to the end of the file.
    ///
    /// # Errors
    /// Returns `NotFound` if the path does not exist and `InvalidArgument`
    /// for a malformed range.
    pub async fn view(&self, path: &str, range: Option<(i64, i64)>) -> Result<String, ExecutorError> {
        let filter = match range {
            None => String::new(),
            Some((start, -1)) if start >= 1 => format!("NR>={start} "),
            Some((start, end)) if start >= 1 && end >= start => format!("NR>={start} && NR<={end} "),
            Some((start, end)) => {
                return Err(ExecutorError::InvalidArgument(format!(
                    "view_range [{start}, {end}] must satisfy 1 <= start <= end, or end = -1"
                )));
            }
        };
        let program = format!("{filter}{{print NR\". \"$0}}");
        let p = quote(path)?;
        let script = format!(
            "if [ -d {p} ]; then ls -la {p}; elif [ -e {p} ]; then awk {} < {p}; else exit {MISSING_STATUS}; fi",
            quote(&program)?
        );

        let output = self.shell.exec(&self.in_workdir(&script)?).await?;
        match output.exit_code {
            0 => Ok(output.stdout),
            MISSING_STATUS => Err(ExecutorError::NotFound(path.to_string())),
            exit_code => Err(ExecutorError::RemoteCommand {
                context: "view",
                exit_code,
                stderr: output.failure_detail(),
            }),
        }
    }

    /// Replace the single occurrence of `old` with `new`.
    ///
    /// The file is left untouched unless `old` occurs exactly once.
    ///
    /// # Errors
    /// Returns `NotFound` if the file or `old` is absent, `AmbiguousMatch`
    /// if `old` occurs more than once, and `InvalidArgument` for an empty
    /// `old` or a file that is not UTF-8.
    pub async fn edit(&self, path: &str, old: &str, new: &str) -> Result<(), ExecutorError> {
        if old.is_empty() {
            return Err(ExecutorError::InvalidArgument("old_str must not be empty".to_string()));
        }

        let p = quote(path)?;
        let read = format!("if [ -f {p} ]; then base64 < {p}; else exit {MISSING_STATUS}; fi");
        let output = self.shell.exec(&self.in_workdir(&read)?).await?;
        match output.exit_code {
            0 => {}
            MISSING_STATUS => return Err(ExecutorError::NotFound(path.to_string())),
            exit_code => {
                return Err(ExecutorError::RemoteCommand {
                    context: "edit (read)",
                    exit_code,
                    stderr: output.failure_detail(),
                });
            }
        }

        let bytes = codec::decode(&output.stdout).map_err(|e| ExecutorError::RemoteCommand {
            context: "edit (decode)",
            exit_code: 0,
            stderr: e.to_string(),
        })?;
        let content = String::from_utf8(bytes)
            .map_err(|_| ExecutorError::InvalidArgument(format!("{path} is not a UTF-8 text file")))?;

        match content.matches(old).count() {
            0 => return Err(ExecutorError::NotFound(format!("old_str in {path}"))),
            1 => {}
            count => {
                return Err(ExecutorError::AmbiguousMatch {
                    path: path.to_string(),
                    count,
                });
            }
        }

        let updated = content.replacen(old, new, 1);
        self.upload(&format!("base64 -d > {p}"), &updated, "edit (write)")
            .await?;
        tracing::debug!(path, "Edited remote file");
        Ok(())
    }

    /// Create or overwrite a file, creating parent directories.
    ///
    /// # Errors
    /// Returns error if the remote write fails.
    pub async fn create(&self, path: &str, content: &str) -> Result<(), ExecutorError> {
        let parent = Path::new(path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| ".".to_string());
        let script = format!("mkdir -p {} && base64 -d > {}", quote(&parent)?, quote(path)?);
        self.upload(&script, content, "create").await
    }

    /// Run `script` with `content` base64-encoded on its stdin.
    async fn upload(&self, script: &str, content: &str, context: &'static str) -> Result<(), ExecutorError> {
        let payload = codec::encode(content.as_bytes());
        let output = self
            .shell
            .exec_with_stdin(&self.in_workdir(script)?, Some(payload.as_bytes()))
            .await?;
        if output.success() {
            Ok(())
        } else {
            Err(ExecutorError::RemoteCommand {
                context,
                exit_code: output.exit_code,
                stderr: output.failure_detail(),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;

    use codespace_bridge_core::{BridgeConfig, ExecOutput};

    use crate::testing::{ScriptedShell, local_executor};

    use super::*;

    #[tokio::test]
    async fn test_view_numbers_lines() {
        let (dir, exec) = local_executor();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\n").unwrap();

        assert_eq!(exec.view("a.txt", None).await.unwrap(), "1. one\n2. two\n3. three\n");
        assert_eq!(exec.view("a.txt", Some((2, 2))).await.unwrap(), "2. two\n");
        assert_eq!(exec.view("a.txt", Some((2, -1))).await.unwrap(), "2. two\n3. three\n");
    }

    #[tokio::test]
    async fn test_view_absolute_path_with_spaces() {
        let (dir, exec) = local_executor();
        let path = dir.path().join("my notes.md");
        std::fs::write(&path, "it's here\n").unwrap();
        let out = exec.view(&path.to_string_lossy(), None).await.unwrap();
        assert_eq!(out, "1. it's here\n");
    }

    #[tokio::test]
    async fn test_view_directory_lists_entries() {
        let (dir, exec) = local_executor();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        let out = exec.view("src", None).await.unwrap();
        assert!(out.contains("main.rs"));
    }

    #[tokio::test]
    async fn test_view_errors() {
        let (_dir, exec) = local_executor();
        assert!(matches!(
            exec.view("missing.txt", None).await,
            Err(ExecutorError::NotFound(p)) if p == "missing.txt"
        ));
        assert!(matches!(
            exec.view("a.txt", Some((0, 3))).await,
            Err(ExecutorError::InvalidArgument(_))
        ));
        assert!(matches!(
            exec.view("a.txt", Some((5, 2))).await,
            Err(ExecutorError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_edit_then_view() {
        let (dir, exec) = local_executor();
        std::fs::write(dir.path().join("lib.rs"), "fn a() {}\nfn b() {}\n").unwrap();

        exec.edit("lib.rs", "fn b() {}", "fn b() -> u8 { 1 }").await.unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("lib.rs")).unwrap(),
            "fn a() {}\nfn b() -> u8 { 1 }\n"
        );
        assert_eq!(
            exec.view("lib.rs", Some((2, 2))).await.unwrap(),
            "2. fn b() -> u8 { 1 }\n"
        );
    }

    #[tokio::test]
    async fn test_edit_refuses_missing_and_ambiguous() {
        let (dir, exec) = local_executor();
        let path = dir.path().join("dup.txt");
        std::fs::write(&path, "x = 1\nx = 1\n").unwrap();

        let err = exec.edit("dup.txt", "y = 2", "z").await.unwrap_err();
        assert!(matches!(err, ExecutorError::NotFound(_)));

        let err = exec.edit("dup.txt", "x = 1", "x = 2").await.unwrap_err();
        assert!(matches!(err, ExecutorError::AmbiguousMatch { count: 2, .. }));

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "x = 1\nx = 1\n");
    }

    #[tokio::test]
    async fn test_edit_invalid_inputs() {
        let (dir, exec) = local_executor();
        assert!(matches!(
            exec.edit("a.txt", "", "x").await,
            Err(ExecutorError::InvalidArgument(_))
        ));
        assert!(matches!(
            exec.edit("nope.txt", "a", "b").await,
            Err(ExecutorError::NotFound(p)) if p == "nope.txt"
        ));

        std::fs::write(dir.path().join("bin.dat"), [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            exec.edit("bin.dat", "a", "b").await,
            Err(ExecutorError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_create_makes_parents_and_overwrites() {
        let (dir, exec) = local_executor();
        exec.create("deep/nested/file.txt", "first\n").await.unwrap();
        exec.create("deep/nested/file.txt", "second $HOME `x`\n").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("deep/nested/file.txt")).unwrap(),
            "second $HOME `x`\n"
        );

        exec.create("empty.txt", "").await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("empty.txt")).unwrap(), "");
    }

    #[tokio::test]
    async fn test_write_sends_content_on_stdin() {
        let shell = Arc::new(ScriptedShell::new(vec![ExecOutput::new("", "", 0)]));
        let exec = RemoteExecutor::new(shell.clone(), &BridgeConfig::new("cs").with_workdir("/workspaces/app"));
        exec.create("/tmp/x/y.txt", "hello").await.unwrap();

        let calls = shell.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "cd /workspaces/app && mkdir -p /tmp/x && base64 -d > /tmp/x/y.txt");
        assert_eq!(calls[0].1.as_deref(), Some(codec::encode(b"hello").as_bytes()));
        assert!(!calls[0].0.contains(&codec::encode(b"hello")));
    }

    #[tokio::test]
    async fn test_remote_failure_is_surfaced() {
        let shell = Arc::new(ScriptedShell::new(vec![ExecOutput::new("", "Permission denied", 1)]));
        let exec = RemoteExecutor::new(shell, &BridgeConfig::new("cs"));
        let err = exec.view("/root/secret", None).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::RemoteCommand { context: "view", exit_code: 1, ref stderr } if stderr == "Permission denied"
        ));
    }
}
