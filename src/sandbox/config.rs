//! Configuration for the subprocess sandbox.

use std::path::PathBuf;
use std::time::Duration;

/// Interpreter used when none is configured.
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Wall-clock limit for tool runs during task execution.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(60);

/// Wall-clock limit for validation runs during synthesis.
pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Maximum captured output per stream (64 KiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Name of the scratch source file inside the scratch directory.
pub const SCRATCH_FILE_NAME: &str = "generated_tool.py";

/// Configuration for the sandboxed executor.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Program that runs the scratch file (`<interpreter> <scratch file>`).
    pub interpreter: String,
    /// Directory holding the scratch file. Also the child's working directory.
    pub scratch_dir: PathBuf,
    /// Timeout in the task-execution path.
    pub exec_timeout: Duration,
    /// Timeout in the validation path.
    pub validation_timeout: Duration,
    pub max_output_bytes: usize,
}

impl SandboxConfig {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.to_string(),
            scratch_dir: scratch_dir.into(),
            exec_timeout: DEFAULT_EXEC_TIMEOUT,
            validation_timeout: DEFAULT_VALIDATION_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    pub fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }

    /// Fixed path every execution writes its code to.
    pub fn scratch_path(&self) -> PathBuf {
        self.scratch_dir.join(SCRATCH_FILE_NAME)
    }
}

/// Which path an execution belongs to. Selects the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Running an approved tool while solving the task.
    Task,
    /// Trial run of freshly generated code during synthesis.
    Validation,
}

impl ExecutionMode {
    pub fn timeout(&self, config: &SandboxConfig) -> Duration {
        match self {
            ExecutionMode::Task => config.exec_timeout,
            ExecutionMode::Validation => config.validation_timeout,
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Task => write!(f, "task"),
            ExecutionMode::Validation => write!(f, "validation"),
        }
    }
}
