use std::fs;
use std::path::Path;

use provkit_core::{CommandLine, CommandRunner, EngineError, RetryPolicy};
use provkit_registry::{
    clone_command, download_command, is_git_checkout, pull_command, ToolSource, ToolSourceKind,
};
use provkit_resolver::Candidate;

use crate::{Executor, Sleeper, SnapshotManager, UpdateOutcome};

/// Tried in order; the first present script is the tool's health check.
const HEALTH_CHECK_SCRIPTS: &[&str] = &["test.sh", "tests.sh", "run_tests.sh"];
const SETUP_SCRIPTS: &[&str] = &["setup.sh", "install.sh"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolAction {
    Cloned,
    Downloaded,
    Updated,
    RolledBack { reason: String },
    Skipped { reason: String },
}

impl From<UpdateOutcome> for ToolAction {
    fn from(outcome: UpdateOutcome) -> Self {
        match outcome {
            UpdateOutcome::Updated => Self::Updated,
            UpdateOutcome::RolledBack { reason } => Self::RolledBack { reason },
        }
    }
}

/// Acquires and refreshes tools under the tools directory.
pub struct ToolSync<'a, R, S> {
    executor: &'a Executor<R, S>,
    snapshots: &'a SnapshotManager,
    retry: RetryPolicy,
}

impl<'a, R: CommandRunner, S: Sleeper> ToolSync<'a, R, S> {
    pub fn new(
        executor: &'a Executor<R, S>,
        snapshots: &'a SnapshotManager,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            executor,
            snapshots,
            retry,
        }
    }

    pub fn executor(&self) -> &Executor<R, S> {
        self.executor
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        self.snapshots
    }

    /// Clones an absent checkout, pulls a present one under a guarded update,
    /// and (re)downloads `url+` sources.
    pub fn sync(&self, source: &ToolSource) -> Result<ToolAction, EngineError> {
        let tool_dir = self.snapshots.layout().tool_dir(&source.name);
        match source.kind {
            ToolSourceKind::Git | ToolSourceKind::Gist => {
                if is_git_checkout(&tool_dir) {
                    return self.update_checkout(&source.name, &tool_dir);
                }
                if has_entries(&tool_dir) {
                    return Ok(ToolAction::Skipped {
                        reason: format!("{} exists but is not a git checkout", tool_dir.display()),
                    });
                }
                self.clone_into(&source.locator, &tool_dir)?;
                Ok(ToolAction::Cloned)
            }
            ToolSourceKind::Url => self.download(source, &tool_dir),
        }
    }

    /// Clones a repository chosen from a code-host search, then runs its
    /// dependency manifest and setup script when present.
    pub fn clone_candidate(&self, candidate: &Candidate) -> Result<ToolAction, EngineError> {
        let name = candidate
            .identifier
            .rsplit('/')
            .next()
            .unwrap_or(&candidate.identifier);
        let tool_dir = self.snapshots.layout().tool_dir(name);
        if tool_dir.exists() {
            return Ok(ToolAction::Skipped {
                reason: format!("{} already exists", tool_dir.display()),
            });
        }

        self.clone_into(&candidate.locator, &tool_dir)?;
        self.post_clone_setup(&tool_dir);
        Ok(ToolAction::Cloned)
    }

    /// Runs the first of `test.sh`, `tests.sh`, `run_tests.sh` found in the
    /// tool directory, once. A tool without one is healthy.
    pub fn health_check(&self, tool_dir: &Path) -> Result<(), EngineError> {
        let Some(script) = first_present(tool_dir, HEALTH_CHECK_SCRIPTS) else {
            return Ok(());
        };
        let command = in_dir(tool_dir, CommandLine::new("bash").arg(script));
        self.executor.run_once(&command, self.retry.timeout).map(drop)
    }

    fn clone_into(&self, locator: &str, tool_dir: &Path) -> Result<(), EngineError> {
        self.executor
            .run_with_retry(&clone_command(locator, tool_dir), &self.retry)
            .map(drop)
    }

    fn update_checkout(&self, name: &str, tool_dir: &Path) -> Result<ToolAction, EngineError> {
        let outcome = self.snapshots.guarded_update(
            name,
            || {
                self.executor
                    .run_with_retry(&pull_command(tool_dir), &self.retry)
                    .map(drop)
            },
            || self.health_check(tool_dir),
        )?;
        Ok(outcome.into())
    }

    fn download(&self, source: &ToolSource, tool_dir: &Path) -> Result<ToolAction, EngineError> {
        let target = tool_dir.join(source.download_file_name());
        let command = download_command(&source.locator, &target);
        if tool_dir.exists() {
            let outcome = self.snapshots.guarded_update(
                &source.name,
                || self.executor.run_with_retry(&command, &self.retry).map(drop),
                || self.health_check(tool_dir),
            )?;
            return Ok(outcome.into());
        }

        if let Err(err) = self.executor.run_with_retry(&command, &self.retry) {
            let _ = fs::remove_dir_all(tool_dir);
            return Err(err);
        }
        Ok(ToolAction::Downloaded)
    }

    fn post_clone_setup(&self, tool_dir: &Path) {
        if tool_dir.join("requirements.txt").is_file() {
            let command = in_dir(
                tool_dir,
                CommandLine::new("pip").args(["install", "-r", "requirements.txt"]),
            );
            if let Err(err) = self.executor.run_once(&command, self.retry.timeout) {
                tracing::warn!("dependency install in {} failed: {err}", tool_dir.display());
            }
        }

        if let Some(script) = first_present(tool_dir, SETUP_SCRIPTS) {
            let command = in_dir(tool_dir, CommandLine::new("bash").arg(script));
            if let Err(err) = self.executor.run_once(&command, self.retry.timeout) {
                tracing::warn!("{script} in {} failed: {err}", tool_dir.display());
            }
        }
    }
}

fn first_present(dir: &Path, candidates: &[&'static str]) -> Option<&'static str> {
    candidates
        .iter()
        .copied()
        .find(|name| dir.join(name).is_file())
}

fn in_dir(dir: &Path, command: CommandLine) -> CommandLine {
    CommandLine::new("cd")
        .arg(dir.to_string_lossy())
        .arg("&&")
        .args(command.into_tokens())
}

fn has_entries(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
