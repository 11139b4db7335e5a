/*!
Best-effort external tool discovery and invocation.

Absence of a tool is a normal outcome to branch on, not an error: every tier
that shells out gets back `Unavailable`, `Failed` or the captured output and
decides for itself whether to fall through to the next tier.
*/

use std::path::PathBuf;
use std::process::{Command, Output};

use thiserror::Error;
use tracing::debug;

/// Why an external tool invocation produced no usable result.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The binary is not discoverable on this host
    #[error("tool not found on this host")]
    Unavailable,
    /// The process ran but exited unsuccessfully or could not be spawned
    #[error("{0}")]
    Failed(String),
}

/// Outcome of attempting an external tool.
pub type ToolResult<T> = std::result::Result<T, ToolError>;

/// Locate a binary on the search path.
pub fn find_tool(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Run a prepared command to completion, capturing output. Blocking, no
/// timeout; export/import of large sites can legitimately run for a long
/// time.
pub fn run_tool(command: &mut Command) -> ToolResult<Output> {
    debug!(?command, "running external tool");
    let output = command
        .output()
        .map_err(|e| ToolError::Failed(format!("spawn failed: {e}")))?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(ToolError::Failed(format!(
            "exit status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_tool_missing() {
        assert!(find_tool("definitely-not-a-real-binary-sitevault").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_success() {
        let out = run_tool(Command::new("true").arg("--")).unwrap();
        assert!(out.status.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_failure_is_failed() {
        match run_tool(&mut Command::new("false")) {
            Err(ToolError::Failed(_)) => {}
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}
