use std::fmt;

use provkit_core::{CommandLine, CommandRunner, EngineError, RetryPolicy};
use provkit_registry::ToolSource;
use provkit_resolver::{
    Candidate, PendingDecision, PreparedCommand, Resolution, ResolutionPolicy, Selection,
};

use crate::{Sleeper, ToolAction, ToolSync};

/// Answers the questions a resolution may suspend on.
pub trait OperatorDecisions {
    fn confirm_correction(&mut self, original: &CommandLine, proposed: &CommandLine) -> bool;
    fn select_candidates(&mut self, token: &str, candidates: &[Candidate]) -> Selection;
}

/// Accepts every correction and never picks a candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unattended;

impl OperatorDecisions for Unattended {
    fn confirm_correction(&mut self, _original: &CommandLine, _proposed: &CommandLine) -> bool {
        true
    }

    fn select_candidates(&mut self, _token: &str, _candidates: &[Candidate]) -> Selection {
        Selection::none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded,
    Skipped(String),
    Failed(String),
    RolledBack(String),
    RollbackFailed(String),
}

impl ItemOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
            Self::RolledBack(_) => "rolled-back",
            Self::RollbackFailed(_) => "rollback-failed",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Succeeded => None,
            Self::Skipped(reason)
            | Self::Failed(reason)
            | Self::RolledBack(reason)
            | Self::RollbackFailed(reason) => Some(reason),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::RollbackFailed(_))
    }

    fn from_error(err: &EngineError) -> Self {
        match err {
            EngineError::RollbackFailure { .. } => Self::RollbackFailed(err.to_string()),
            _ => Self::Failed(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub item: String,
    pub outcome: ItemOutcome,
}

impl fmt::Display for ItemReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome.reason() {
            Some(reason) => write!(f, "{}: {} ({reason})", self.item, self.outcome.label()),
            None => write!(f, "{}: {}", self.item, self.outcome.label()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub items: Vec<ItemReport>,
}

impl RunSummary {
    pub fn record(&mut self, item: impl Into<String>, outcome: ItemOutcome) {
        self.items.push(ItemReport {
            item: item.into(),
            outcome,
        });
    }

    pub fn extend(&mut self, other: RunSummary) {
        self.items.extend(other.items);
    }

    pub fn count(&self, label: &str) -> usize {
        self.items
            .iter()
            .filter(|report| report.outcome.label() == label)
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.items.iter().any(|report| report.outcome.is_failure())
    }
}

/// Drives commands and tool entries one at a time. A failing item is recorded
/// and the run moves on.
pub struct Provisioner<'a, R, S> {
    policy: ResolutionPolicy<'a>,
    tools: ToolSync<'a, R, S>,
    retry: RetryPolicy,
    dry_run: bool,
}

impl<'a, R: CommandRunner, S: Sleeper> Provisioner<'a, R, S> {
    pub fn new(
        policy: ResolutionPolicy<'a>,
        tools: ToolSync<'a, R, S>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            policy,
            tools,
            retry,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn tools(&self) -> &ToolSync<'a, R, S> {
        &self.tools
    }

    /// Rotates an oversized audit log and marks the start of a run.
    pub fn start_run(&self) {
        let audit = self.tools.executor().audit();
        match audit.rotate_if_needed() {
            Ok(Some(rotated)) => tracing::info!("audit log rotated to {}", rotated.display()),
            Ok(None) => {}
            Err(err) => tracing::warn!("audit log rotation failed: {err:#}"),
        }
        audit.record(&format!(
            "[run] start (mode={}, dry_run={})",
            self.policy.mode().as_str(),
            self.dry_run
        ));
    }

    pub fn run_commands(
        &self,
        commands: &[String],
        decisions: &mut dyn OperatorDecisions,
    ) -> RunSummary {
        let mut summary = RunSummary::default();
        for raw in commands {
            summary.extend(self.run_command(raw, decisions));
        }
        summary
    }

    /// Resolves `raw`, clones chosen repositories, then runs the resulting
    /// command with retries.
    pub fn run_command(&self, raw: &str, decisions: &mut dyn OperatorDecisions) -> RunSummary {
        let mut summary = RunSummary::default();
        let prepared = self.resolve(raw, decisions);

        for candidate in &prepared.clones {
            let item = format!("clone {}", candidate.identifier);
            if self.dry_run {
                tracing::info!("dry run: would clone {}", candidate.locator);
                summary.record(item, ItemOutcome::Skipped("dry run".to_string()));
                continue;
            }
            let outcome = match self.tools.clone_candidate(candidate) {
                Ok(action) => action_outcome(action),
                Err(err) => ItemOutcome::from_error(&err),
            };
            summary.record(item, outcome);
        }

        let Some(command) = prepared.command else {
            if prepared.clones.is_empty() {
                summary.record(raw.trim(), ItemOutcome::Skipped("nothing to run".to_string()));
            }
            return summary;
        };
        let item = command.to_shell_string();
        if self.dry_run {
            tracing::info!("dry run: would run `{item}`");
            summary.record(item, ItemOutcome::Skipped("dry run".to_string()));
            return summary;
        }

        let outcome = match self.tools.executor().run_with_retry(&command, &self.retry) {
            Ok(_) => ItemOutcome::Succeeded,
            Err(err) => ItemOutcome::from_error(&err),
        };
        summary.record(item, outcome);
        summary
    }

    /// Walks the resolution state machine, asking `decisions` at every
    /// suspension.
    pub fn resolve(&self, raw: &str, decisions: &mut dyn OperatorDecisions) -> PreparedCommand {
        let mut resolution = self.policy.prepare(raw);
        loop {
            match resolution {
                Resolution::Ready(prepared) => return prepared,
                Resolution::Pending(PendingDecision::Confirm(pending)) => {
                    let accepted =
                        decisions.confirm_correction(&pending.original, &pending.proposed);
                    return self.policy.confirm(pending, accepted);
                }
                Resolution::Pending(PendingDecision::Select(pending)) => {
                    let selection =
                        decisions.select_candidates(&pending.token, &pending.candidates);
                    resolution = self.policy.select(pending, &selection);
                }
            }
        }
    }

    pub fn sync_tools(&self, sources: &[ToolSource]) -> RunSummary {
        let mut summary = RunSummary::default();
        for source in sources {
            let item = format!("tool {}", source.name);
            if self.dry_run {
                tracing::info!("dry run: would sync {} from {}", source.name, source.locator);
                summary.record(item, ItemOutcome::Skipped("dry run".to_string()));
                continue;
            }
            let outcome = match self.tools.sync(source) {
                Ok(action) => action_outcome(action),
                Err(err) => {
                    tracing::warn!("tool '{}' failed: {err}", source.name);
                    ItemOutcome::from_error(&err)
                }
            };
            summary.record(item, outcome);
        }
        summary
    }
}

fn action_outcome(action: ToolAction) -> ItemOutcome {
    match action {
        ToolAction::Cloned | ToolAction::Downloaded | ToolAction::Updated => ItemOutcome::Succeeded,
        ToolAction::RolledBack { reason } => ItemOutcome::RolledBack(reason),
        ToolAction::Skipped { reason } => ItemOutcome::Skipped(reason),
    }
}
