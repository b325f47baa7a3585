use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use provkit_core::{
    AuditLog, CommandLine, CommandOutput, CommandRunner, EngineConfig, EngineError, RetryPolicy,
    SystemCommandRunner,
};

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Runs between failed attempts so the next attempt sees a refreshed index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// `script` runs if it is executable when recovery happens; `fallback`
    /// runs otherwise.
    MaintenanceScript {
        script: PathBuf,
        fallback: Option<CommandLine>,
    },
    Command(CommandLine),
    Nothing,
}

impl RecoveryAction {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::MaintenanceScript {
            script: config.paths.maintenance_script.clone(),
            fallback: CommandLine::parse(&config.index_refresh_command),
        }
    }

    /// The command recovery would run right now.
    pub fn command(&self) -> Option<CommandLine> {
        match self {
            Self::MaintenanceScript { script, fallback } => {
                if is_executable(script) {
                    Some(CommandLine::new(script.to_string_lossy()))
                } else {
                    fallback.clone()
                }
            }
            Self::Command(command) => Some(command.clone()),
            Self::Nothing => None,
        }
    }
}

pub struct Executor<R = SystemCommandRunner, S = ThreadSleeper> {
    runner: R,
    sleeper: S,
    audit: AuditLog,
    recovery: RecoveryAction,
}

impl<R: CommandRunner, S: Sleeper> Executor<R, S> {
    pub fn new(runner: R, sleeper: S, audit: AuditLog, recovery: RecoveryAction) -> Self {
        Self {
            runner,
            sleeper,
            audit,
            recovery,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn recovery(&self) -> &RecoveryAction {
        &self.recovery
    }

    /// Runs `command` until it succeeds or the policy's attempts are used up.
    /// Between attempts the recovery action runs and the executor sleeps for
    /// `base_backoff * 2^(attempt-1)`.
    pub fn run_with_retry(
        &self,
        command: &CommandLine,
        policy: &RetryPolicy,
    ) -> Result<CommandOutput, EngineError> {
        let attempts = policy.attempts();
        let rendered = command.to_shell_string();
        let mut attempt = 1;

        loop {
            self.audit.record(&format!("[TRY {attempt}/{attempts}] {rendered}"));
            tracing::info!("[TRY {attempt}/{attempts}] {rendered}");

            let failure = match self.runner.run(command, policy.timeout) {
                Ok(output) => {
                    self.audit.record(&format!("[OK {attempt}/{attempts}] {rendered}"));
                    return Ok(output);
                }
                Err(failure) => failure,
            };

            let notice = format!("[FAIL {attempt}/{attempts}] {rendered}: {failure}");
            self.audit.record(&notice);
            tracing::warn!("{notice}");

            if attempt >= attempts {
                let err = EngineError::ExhaustedRetries {
                    command: rendered,
                    attempts,
                    last_error: failure,
                };
                self.audit.record(&format!("[GIVE-UP] {err}"));
                return Err(err);
            }

            self.recover(policy.timeout);
            let backoff = policy.backoff_for(attempt);
            self.audit
                .record(&format!("[RETRY] {rendered} in {}s", backoff.as_secs_f64()));
            tracing::debug!("retrying `{rendered}` in {backoff:?}");
            self.sleeper.sleep(backoff);
            attempt += 1;
        }
    }

    pub fn run_once(
        &self,
        command: &CommandLine,
        timeout: Duration,
    ) -> Result<CommandOutput, EngineError> {
        self.run_with_retry(command, &RetryPolicy::single_attempt(timeout))
    }

    fn recover(&self, timeout: Duration) {
        let Some(command) = self.recovery.command() else {
            return;
        };
        self.audit.record(&format!("[RECOVER] {command}"));
        if let Err(err) = self.runner.run(&command, timeout) {
            tracing::debug!("recovery action `{command}` failed: {err}");
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}
