//! Subprocess executor for generated tool code.
//!
//! Every run writes the code to one fixed scratch file, starts
//! `<interpreter> <scratch file>` in its own process group with piped output
//! and waits under a wall-clock timeout covering the exit and both pipes. The
//! scratch file is removed once the run ends. The exit status decides the outcome: zero returns the
//! trimmed stdout, anything else returns stderr. Nothing here returns an
//! error to the caller; launch problems, I/O failures and timeouts all become
//! failed [`ExecutionResult`]s.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::error::SandboxError;
use crate::sandbox::config::{ExecutionMode, SandboxConfig};
use crate::sandbox::credentials::{
    CREDENTIAL_PLACEHOLDER, CredentialSource, needs_credential, substitute_credential,
};

/// Environment variable carrying tool-call arguments as JSON.
pub const TOOL_ARGS_ENV: &str = "TOOL_ARGS";

/// Outcome of one execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// True only for exit status 0.
    pub success: bool,
    /// Trimmed stdout on success, stderr (or a failure description) otherwise.
    pub output: String,
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub timed_out: bool,
}

impl ExecutionResult {
    fn failure(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            output: message.into(),
            exit_code: None,
            duration,
            timed_out: false,
        }
    }

    /// Text handed back to the model or the user.
    pub fn to_context(&self) -> String {
        if self.success {
            self.output.clone()
        } else {
            format!("Error: {}", self.output)
        }
    }
}

/// Runs generated code as a child process.
pub struct SandboxExecutor {
    config: SandboxConfig,
    credentials: Arc<dyn CredentialSource>,
    // One scratch path, so runs are serialised.
    scratch_lock: Mutex<()>,
}

impl SandboxExecutor {
    pub fn new(config: SandboxConfig, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            config,
            credentials,
            scratch_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Execute `code`, passing `args` (if any) through [`TOOL_ARGS_ENV`].
    pub async fn execute(
        &self,
        code: &str,
        args: Option<&serde_json::Value>,
        mode: ExecutionMode,
    ) -> ExecutionResult {
        let started = Instant::now();
        let timeout = mode.timeout(&self.config);

        let result = match self.prepare(code).await {
            Ok(code) => self.run(&code, args, timeout).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(result) => {
                tracing::info!(
                    %mode,
                    success = result.success,
                    exit_code = ?result.exit_code,
                    elapsed_ms = result.duration.as_millis() as u64,
                    "Tool execution finished"
                );
                result
            }
            Err(SandboxError::Timeout(limit)) => {
                tracing::warn!(%mode, ?limit, "Tool execution timed out");
                ExecutionResult {
                    timed_out: true,
                    ..ExecutionResult::failure(
                        format!("execution timed out after {}s", limit.as_secs_f64()),
                        started.elapsed(),
                    )
                }
            }
            Err(e) => {
                tracing::warn!(%mode, "Tool execution failed: {}", e);
                ExecutionResult::failure(format!("Execution failed: {e}"), started.elapsed())
            }
        }
    }

    /// Resolve the credential placeholder, blocking on the source if needed.
    async fn prepare(&self, code: &str) -> Result<String, SandboxError> {
        if !needs_credential(code) {
            return Ok(code.to_string());
        }

        let source = Arc::clone(&self.credentials);
        let value = tokio::task::spawn_blocking(move || source.credential(CREDENTIAL_PLACEHOLDER))
            .await
            .map_err(|e| SandboxError::Io(std::io::Error::other(e)))?;

        match value {
            Some(value) => Ok(substitute_credential(code, &value)),
            None => Err(SandboxError::MissingCredential {
                placeholder: CREDENTIAL_PLACEHOLDER.to_string(),
            }),
        }
    }

    async fn run(
        &self,
        code: &str,
        args: Option<&serde_json::Value>,
        timeout: Duration,
    ) -> Result<ExecutionResult, SandboxError> {
        let _guard = self.scratch_lock.lock().await;
        let started = Instant::now();

        let path = self.config.scratch_path();
        tokio::fs::create_dir_all(&self.config.scratch_dir)
            .await
            .map_err(|source| SandboxError::ScratchWrite {
                path: path.clone(),
                source,
            })?;
        tokio::fs::write(&path, code)
            .await
            .map_err(|source| SandboxError::ScratchWrite {
                path: path.clone(),
                source,
            })?;

        let result = self.run_child(&path, args, timeout).await;

        // The scratch file may hold a substituted credential.
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::debug!(path = %path.display(), "Scratch file not removed: {}", e);
        }

        let (status, stdout, stderr) = result?;
        let exit_code = status.code();

        let (success, output) = if status.success() {
            (true, stdout.trim().to_string())
        } else {
            let stderr = stderr.trim();
            let output = if stderr.is_empty() {
                match exit_code {
                    Some(code) => format!("process exited with status {code}"),
                    None => "process terminated by signal".to_string(),
                }
            } else {
                stderr.to_string()
            };
            (false, output)
        };

        Ok(ExecutionResult {
            success,
            output,
            exit_code,
            duration: started.elapsed(),
            timed_out: false,
        })
    }

    /// Spawn the interpreter and collect its exit status and output.
    ///
    /// One deadline covers the exit and both pipes: a background process
    /// left behind by the tool keeps the pipes open after the tool exits.
    async fn run_child(
        &self,
        path: &Path,
        args: Option<&serde_json::Value>,
        timeout: Duration,
    ) -> Result<(ExitStatus, String, String), SandboxError> {
        let mut command = Command::new(&self.config.interpreter);
        command
            .arg(path)
            .current_dir(&self.config.scratch_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        if let Some(args) = args {
            command.env(TOOL_ARGS_ENV, args.to_string());
        }

        let mut child = command.spawn().map_err(|source| SandboxError::Spawn {
            interpreter: self.config.interpreter.clone(),
            source,
        })?;
        let pid = child.id();

        let limit = self.config.max_output_bytes;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let collected = tokio::time::timeout(timeout, async {
            let (status, stdout, stderr) = tokio::join!(
                child.wait(),
                read_stream(stdout, limit),
                read_stream(stderr, limit)
            );
            status.map(|status| (status, stdout, stderr))
        })
        .await;

        match collected {
            Ok(collected) => Ok(collected?),
            Err(_) => {
                kill_process_group(pid);
                let _ = child.kill().await;
                Err(SandboxError::Timeout(timeout))
            }
        }
    }
}

/// Kill the tool and everything it started.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers; the group was created at spawn.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

async fn read_stream<R: AsyncRead + Unpin>(reader: Option<R>, limit: usize) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut buf = Vec::new();
    if reader.read_to_end(&mut buf).await.is_err() && buf.is_empty() {
        return String::new();
    }
    truncate_output(&String::from_utf8_lossy(&buf), limit)
}

/// Keep the head and tail of oversized output, cut on char boundaries.
fn truncate_output(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_string();
    }
    let half = limit / 2;
    let mut head_end = half;
    while !s.is_char_boundary(head_end) {
        head_end -= 1;
    }
    let mut tail_start = s.len() - half;
    while !s.is_char_boundary(tail_start) {
        tail_start += 1;
    }
    format!(
        "{}\n\n... [truncated {} bytes] ...\n\n{}",
        &s[..head_end],
        tail_start - head_end,
        &s[tail_start..]
    )
}
