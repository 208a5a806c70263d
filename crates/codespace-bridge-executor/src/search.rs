//! Content search and file finding.

use codespace_bridge_core::{ExecOutput, RemoteShell, quote};

use crate::{ExecutorError, RemoteExecutor};

/// Reply for a search or find with no results.
pub const NO_MATCHES: &str = "No matches found.";

/// Stderr marker carrying the status of the producer side of a pipeline.
const STATUS_MARKER: &str = "__search_status=";

impl<S: RemoteShell> RemoteExecutor<S> {
    /// Search file contents under `path` (default: the remote root).
    ///
    /// Uses `rg` when the target has it and `grep -r` otherwise. Lines come
    /// back as `<path>:<line>:<content>`, capped at the configured maximum.
    /// Past the cap, a blank line and a `[results truncated at N lines]`
    /// trailer follow the result lines; the trailer is not a result.
    ///
    /// # Errors
    /// Returns `RemoteCommand` when the search fails without producing
    /// output (bad pattern, unreadable path).
    pub async fn search(
        &self,
        pattern: &str,
        path: Option<&str>,
        glob: Option<&str>,
    ) -> Result<String, ExecutorError> {
        let p = quote(pattern)?;
        let dir = quote(path.unwrap_or("."))?;
        let (rg_glob, grep_glob) = match glob {
            Some(g) => {
                let g = quote(g)?;
                (format!(" --glob {g}"), format!(" --include={g}"))
            }
            None => (String::new(), String::new()),
        };
        let search = format!(
            "if command -v rg >/dev/null 2>&1; then rg --color=never -n -H{rg_glob} -e {p} -- {dir}; \
             else grep -rnH{grep_glob} -e {p} -- {dir}; fi"
        );
        let output = self.capped(&search).await?;
        self.collect(output, "search")
    }

    /// Find files matching `glob` under `path` (default: the remote root).
    ///
    /// Uses `fd` (or `fdfind`) when available. The `find` fallback only
    /// matches the last path segment of the glob. Capped like [`Self::search`],
    /// with the same truncation trailer.
    ///
    /// # Errors
    /// Returns `RemoteCommand` when the listing fails without output.
    pub async fn find(&self, glob: &str, path: Option<&str>) -> Result<String, ExecutorError> {
        let dir = quote(path.unwrap_or("."))?;
        let fd_args = if glob.contains('/') {
            let anchored = if glob.starts_with("**") || glob.starts_with('/') {
                glob.to_string()
            } else {
                format!("**/{glob}")
            };
            format!("--full-path --glob {}", quote(&anchored)?)
        } else {
            format!("--glob {}", quote(glob)?)
        };
        let name = quote(last_segment(glob))?;
        let search = format!(
            "cd {dir} && if command -v fd >/dev/null 2>&1; then fd --type f {fd_args} --exclude .git; \
             elif command -v fdfind >/dev/null 2>&1; then fdfind --type f {fd_args} --exclude .git; \
             else find . -type f -name {name} -not -path '*/.git/*'; fi"
        );
        let output = self.capped(&search).await?;
        self.collect(output, "find")
    }

    /// Run `search` with its output cut one line past the cap, reporting
    /// the search's own status on stderr.
    async fn capped(&self, search: &str) -> Result<ExecOutput, ExecutorError> {
        let script = format!(
            "{{ {search}; echo \"{STATUS_MARKER}$?\" >&2; }} | head -n {}",
            self.max_results + 1
        );
        Ok(self.shell.exec(&self.in_workdir(&script)?).await?)
    }

    fn collect(&self, output: ExecOutput, context: &'static str) -> Result<String, ExecutorError> {
        let (status, stderr) = split_status(&output.stderr);
        let status = status.unwrap_or(output.exit_code);

        if output.stdout.trim().is_empty() {
            return match status {
                0 | 1 => Ok(NO_MATCHES.to_string()),
                exit_code => Err(ExecutorError::RemoteCommand {
                    context,
                    exit_code,
                    stderr: if stderr.is_empty() {
                        format!("{context} exited with {exit_code}")
                    } else {
                        stderr
                    },
                }),
            };
        }

        let lines: Vec<&str> = output.stdout.lines().collect();
        if lines.len() > self.max_results {
            let mut text = lines[..self.max_results].join("\n");
            text.push_str(&format!(
                "\n\n[results truncated at {} lines]",
                self.max_results
            ));
            Ok(text)
        } else {
            Ok(lines.join("\n"))
        }
    }
}

/// Pull the status marker out of stderr.
fn split_status(stderr: &str) -> (Option<i32>, String) {
    let mut status = None;
    let mut rest = Vec::new();
    for line in stderr.lines() {
        match line.strip_prefix(STATUS_MARKER) {
            Some(code) => status = code.trim().parse().ok(),
            None => rest.push(line),
        }
    }
    (status, rest.join("\n").trim().to_string())
}

fn last_segment(glob: &str) -> &str {
    glob.rsplit('/').next().unwrap_or(glob)
}
