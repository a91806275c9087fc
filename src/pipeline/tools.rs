//! Child-process invocation for the external acquisition tools.
//!
//! Tools are always invoked with an argument vector, never through a
//! shell, since URLs and filenames flow into these calls. Every run is
//! bounded by a timeout and the child is killed when it fires.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Errors from running an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },
}

/// Captured output of a finished tool run.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Trimmed stderr for error messages, bounded to keep logs readable.
    pub fn stderr_excerpt(&self) -> String {
        let trimmed = self.stderr.trim();
        if trimmed.len() > 500 {
            format!("{}...", &trimmed[..500])
        } else {
            trimmed.to_string()
        }
    }
}

/// Runs external commands. The seam exists so tests can script tool
/// behavior without the real binaries installed.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, ToolError>;
}

/// CommandRunner backed by real child processes.
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, ToolError> {
        debug!("Executing: {} {}", program, args.join(" "));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ToolError::Spawn {
                    program: program.to_string(),
                    source,
                })
            }
            // kill_on_drop reaps the child when the future is dropped.
            Err(_) => {
                return Err(ToolError::Timeout {
                    program: program.to_string(),
                    timeout,
                })
            }
        };

        Ok(CommandOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
