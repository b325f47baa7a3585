use std::time::Duration;

use thiserror::Error;

/// Why a single attempt of an external command failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecFailure {
    #[error("exited with status {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },
    #[error("timed out after {}s", after.as_secs())]
    TimedOut { after: Duration },
    #[error("failed to launch: {reason}")]
    Launch { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Execution(#[from] ExecFailure),
    #[error("command `{command}` failed after {attempts} attempt(s): {last_error}")]
    ExhaustedRetries {
        command: String,
        attempts: u32,
        last_error: ExecFailure,
    },
    #[error("snapshot of tool '{tool}' failed: {reason}")]
    SnapshotFailure { tool: String, reason: String },
    #[error("rollback of tool '{tool}' failed: {reason}")]
    RollbackFailure { tool: String, reason: String },
    #[error("invalid tool source on line {line}: {reason}")]
    InvalidToolSource { line: usize, reason: String },
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Execution(_) => "transient-execution-failure",
            Self::ExhaustedRetries { .. } => "exhausted-retries",
            Self::SnapshotFailure { .. } => "snapshot-failure",
            Self::RollbackFailure { .. } => "rollback-failure",
            Self::InvalidToolSource { .. } => "invalid-tool-source",
        }
    }
}
