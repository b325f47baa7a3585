//! Versioned tool-directory snapshots and the backup/update/rollback cycle.
//!
//! A snapshot is `backups_dir/<tool>-<YYYYmmdd-HHMMSS>[-N].tar.gz` plus a
//! `.sha256` sidecar. Archives are written under a temporary name and renamed
//! into place, so a listed archive is always complete. Restores extract into a
//! staging directory next to the tool and only then swap it in.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use provkit_core::{AuditLog, EngineError};

use crate::checksum::{verify_sidecar, write_sidecar};
use crate::ToolLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolState {
    Absent,
    PresentClean,
    BackedUp,
    Updating,
    Restoring,
}

impl ToolState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::PresentClean => "present-clean",
            Self::BackedUp => "backed-up",
            Self::Updating => "updating",
            Self::Restoring => "restoring",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub tool: String,
    pub archive_path: PathBuf,
    /// `YYYYmmdd-HHMMSS`, optionally followed by `-N` when several snapshots
    /// were taken within one second.
    pub created_at: String,
}

impl Snapshot {
    fn sort_key(&self) -> (String, u32) {
        let (stamp, rest) =
            split_stamp(&self.created_at).unwrap_or((self.created_at.as_str(), ""));
        let sequence = rest
            .strip_prefix('-')
            .and_then(|sequence| sequence.parse().ok())
            .unwrap_or(0);
        (stamp.to_string(), sequence)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    RolledBack { reason: String },
}

const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const STAMP_LEN: usize = 15;
const ARCHIVE_SUFFIX: &str = ".tar.gz";

pub struct SnapshotManager {
    layout: ToolLayout,
    audit: AuditLog,
    keep: usize,
}

impl SnapshotManager {
    pub fn new(layout: ToolLayout, audit: AuditLog, keep: usize) -> Self {
        Self {
            layout,
            audit,
            keep,
        }
    }

    pub fn layout(&self) -> &ToolLayout {
        &self.layout
    }

    pub fn state_of(&self, tool: &str) -> ToolState {
        if self.layout.tool_dir(tool).exists() {
            ToolState::PresentClean
        } else {
            ToolState::Absent
        }
    }

    pub fn create_snapshot(&self, tool: &str) -> Result<Snapshot, EngineError> {
        self.write_snapshot(tool).map_err(|err| EngineError::SnapshotFailure {
            tool: tool.to_string(),
            reason: format!("{err:#}"),
        })
    }

    fn write_snapshot(&self, tool: &str) -> Result<Snapshot> {
        let tool_dir = self.layout.tool_dir(tool);
        if !tool_dir.is_dir() {
            anyhow::bail!("tool directory does not exist: {}", tool_dir.display());
        }
        let backups_dir = self.layout.backups_dir();
        fs::create_dir_all(backups_dir)
            .with_context(|| format!("failed to create {}", backups_dir.display()))?;

        let (created_at, archive_path) = self.next_snapshot_path(tool);
        let tmp_path = self.layout.snapshot_tmp_path(tool);
        let archived = run_tar(
            Command::new("tar")
                .arg("-czf")
                .arg(&tmp_path)
                .arg("-C")
                .arg(self.layout.tools_dir())
                .arg(tool),
            "failed to archive tool directory",
        )
        .and_then(|()| {
            fs::rename(&tmp_path, &archive_path).with_context(|| {
                format!(
                    "failed to move snapshot into place: {}",
                    archive_path.display()
                )
            })
        });
        if let Err(err) = archived {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }

        let sidecar = self.layout.checksum_path(&archive_path);
        if let Err(err) = write_sidecar(&archive_path, &sidecar) {
            let _ = fs::remove_file(&archive_path);
            return Err(err);
        }

        self.audit
            .record(&format!("[snapshot] {tool}: {}", archive_path.display()));
        tracing::debug!("snapshot of '{tool}' written to {}", archive_path.display());
        Ok(Snapshot {
            tool: tool.to_string(),
            archive_path,
            created_at,
        })
    }

    fn next_snapshot_path(&self, tool: &str) -> (String, PathBuf) {
        let stamp = Local::now().format(STAMP_FORMAT).to_string();
        let mut created_at = stamp.clone();
        let mut sequence = 0_u32;
        loop {
            let path = self.layout.snapshot_path(tool, &created_at);
            if !path.exists() {
                return (created_at, path);
            }
            sequence += 1;
            created_at = format!("{stamp}-{sequence}");
        }
    }

    /// Oldest first.
    pub fn list_snapshots(&self, tool: &str) -> Result<Vec<Snapshot>> {
        let backups_dir = self.layout.backups_dir();
        if !backups_dir.exists() {
            return Ok(Vec::new());
        }

        let prefix = format!("{tool}-");
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(backups_dir)
            .with_context(|| format!("failed to read {}", backups_dir.display()))?
        {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(created_at) = file_name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(ARCHIVE_SUFFIX))
            else {
                continue;
            };
            if !is_snapshot_stamp(created_at) {
                continue;
            }
            snapshots.push(Snapshot {
                tool: tool.to_string(),
                archive_path: entry.path(),
                created_at: created_at.to_string(),
            });
        }

        snapshots.sort_by_key(Snapshot::sort_key);
        Ok(snapshots)
    }

    pub fn latest_snapshot(&self, tool: &str) -> Result<Option<Snapshot>> {
        Ok(self.list_snapshots(tool)?.pop())
    }

    /// Replaces the tool directory with the snapshot's contents after the
    /// archive passes its checksum.
    pub fn restore(&self, snapshot: &Snapshot) -> Result<(), EngineError> {
        self.extract_snapshot(snapshot).map_err(|err| EngineError::RollbackFailure {
            tool: snapshot.tool.clone(),
            reason: format!("{err:#}"),
        })
    }

    fn extract_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let archive = &snapshot.archive_path;
        if !archive.is_file() {
            anyhow::bail!("snapshot is missing: {}", archive.display());
        }
        verify_sidecar(archive, &self.layout.checksum_path(archive))?;

        let staging = self.layout.restore_staging_dir(&snapshot.tool);
        fs::create_dir_all(&staging)
            .with_context(|| format!("failed to create {}", staging.display()))?;
        let restored = run_tar(
            Command::new("tar")
                .arg("-xzf")
                .arg(archive)
                .arg("-C")
                .arg(&staging),
            "failed to extract snapshot",
        )
        .and_then(|()| self.swap_in(&staging.join(&snapshot.tool), &snapshot.tool));
        let _ = fs::remove_dir_all(&staging);
        restored
    }

    fn swap_in(&self, staged_tool: &Path, tool: &str) -> Result<()> {
        if !staged_tool.is_dir() {
            return Err(anyhow!("snapshot does not contain a '{tool}' directory"));
        }
        let destination = self.layout.tool_dir(tool);
        if destination.exists() {
            fs::remove_dir_all(&destination)
                .with_context(|| format!("failed to remove {}", destination.display()))?;
        }
        fs::rename(staged_tool, &destination)
            .with_context(|| format!("failed to restore {}", destination.display()))
    }

    /// Manual rollback to the newest snapshot.
    pub fn restore_latest(&self, tool: &str) -> Result<Snapshot, EngineError> {
        let latest = self
            .latest_snapshot(tool)
            .map_err(|err| EngineError::RollbackFailure {
                tool: tool.to_string(),
                reason: format!("{err:#}"),
            })?
            .ok_or_else(|| EngineError::RollbackFailure {
                tool: tool.to_string(),
                reason: "no snapshot available".to_string(),
            })?;
        self.restore(&latest)?;
        self.audit.record(&format!(
            "[rollback] {tool}: restored {}",
            latest.archive_path.display()
        ));
        Ok(latest)
    }

    /// Deletes all but the newest `keep` snapshots of `tool` and returns the
    /// removed archive paths.
    pub fn prune(&self, tool: &str) -> Result<Vec<PathBuf>> {
        let snapshots = self.list_snapshots(tool)?;
        let excess = snapshots.len().saturating_sub(self.keep);
        let mut removed = Vec::new();
        for snapshot in snapshots.into_iter().take(excess) {
            fs::remove_file(&snapshot.archive_path).with_context(|| {
                format!("failed to remove {}", snapshot.archive_path.display())
            })?;
            let sidecar = self.layout.checksum_path(&snapshot.archive_path);
            if sidecar.exists() {
                fs::remove_file(&sidecar)
                    .with_context(|| format!("failed to remove {}", sidecar.display()))?;
            }
            removed.push(snapshot.archive_path);
        }
        Ok(removed)
    }

    /// Snapshots `tool`, runs `update` then `health_check`, and restores the
    /// snapshot when either fails. A failed snapshot leaves the tool untouched.
    pub fn guarded_update<U, H>(
        &self,
        tool: &str,
        update: U,
        health_check: H,
    ) -> Result<UpdateOutcome, EngineError>
    where
        U: FnOnce() -> Result<(), EngineError>,
        H: FnOnce() -> Result<(), EngineError>,
    {
        let snapshot = self.create_snapshot(tool)?;
        self.transition(tool, ToolState::PresentClean, ToolState::BackedUp);
        self.transition(tool, ToolState::BackedUp, ToolState::Updating);

        let failure = match update().and_then(|()| health_check()) {
            Ok(()) => {
                self.transition(tool, ToolState::Updating, ToolState::PresentClean);
                if let Err(err) = self.prune(tool) {
                    tracing::debug!("snapshot pruning for '{tool}' skipped: {err:#}");
                }
                return Ok(UpdateOutcome::Updated);
            }
            Err(err) => err,
        };

        self.transition(tool, ToolState::Updating, ToolState::Restoring);
        if let Err(err) = self.restore(&snapshot) {
            self.audit.record(&format!("[rollback] {tool}: {err}"));
            tracing::warn!("{err}; '{tool}' needs manual attention");
            return Err(err);
        }
        self.transition(tool, ToolState::Restoring, ToolState::PresentClean);

        let reason = failure.to_string();
        self.audit.record(&format!(
            "[rollback] {tool}: restored {} after: {reason}",
            snapshot.archive_path.display()
        ));
        tracing::warn!("'{tool}' rolled back to snapshot {}: {reason}", snapshot.created_at);
        Ok(UpdateOutcome::RolledBack { reason })
    }

    fn transition(&self, tool: &str, from: ToolState, to: ToolState) {
        self.audit.record(&format!(
            "[tool] {tool}: {} -> {}",
            from.as_str(),
            to.as_str()
        ));
        tracing::debug!("tool '{tool}': {} -> {}", from.as_str(), to.as_str());
    }
}

fn split_stamp(created_at: &str) -> Option<(&str, &str)> {
    Some((created_at.get(..STAMP_LEN)?, created_at.get(STAMP_LEN..)?))
}

fn is_snapshot_stamp(created_at: &str) -> bool {
    let Some((stamp, rest)) = split_stamp(created_at) else {
        return false;
    };
    let stamp_ok = stamp.char_indices().all(|(index, ch)| {
        if index == 8 {
            ch == '-'
        } else {
            ch.is_ascii_digit()
        }
    });
    let rest_ok = rest.is_empty()
        || rest.strip_prefix('-').is_some_and(|sequence| {
            !sequence.is_empty() && sequence.chars().all(|ch| ch.is_ascii_digit())
        });
    stamp_ok && rest_ok
}

fn run_tar(command: &mut Command, context_message: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: tar failed to start"))?;
    if output.status.success() {
        return Ok(());
    }
    Err(anyhow!(
        "{context_message}: status={} stderr='{}'",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    ))
}
