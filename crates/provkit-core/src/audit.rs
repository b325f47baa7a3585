use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

/// Append-only `[timestamp] message` log shared by every engine component.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    rotate_bytes: u64,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>, rotate_bytes: u64) -> Self {
        Self {
            path: path.into(),
            rotate_bytes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rotated_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "audit".to_string());
        let file_name = match self.path.extension() {
            Some(ext) => format!("{stem}.old.{}", ext.to_string_lossy()),
            None => format!("{stem}.old"),
        };
        self.path.with_file_name(file_name)
    }

    /// Renames the log aside once it has grown past the threshold. A previous
    /// rotated file is replaced.
    pub fn rotate_if_needed(&self) -> Result<Option<PathBuf>> {
        let size = match fs::metadata(&self.path) {
            Ok(metadata) => metadata.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to stat audit log: {}", self.path.display()))
            }
        };
        if size <= self.rotate_bytes {
            return Ok(None);
        }

        let rotated = self.rotated_path();
        fs::rename(&self.path, &rotated).with_context(|| {
            format!(
                "failed to rotate audit log {} to {}",
                self.path.display(),
                rotated.display()
            )
        })?;
        Ok(Some(rotated))
    }

    pub fn try_record(&self, message: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open audit log: {}", self.path.display()))?;
        writeln!(file, "{}", format_audit_line(&timestamp, message))
            .with_context(|| format!("failed to append audit log: {}", self.path.display()))
    }

    /// Best-effort append; a log that cannot be written never stops a run.
    pub fn record(&self, message: &str) {
        if let Err(err) = self.try_record(message) {
            tracing::debug!("audit log write skipped: {err:#}");
        }
    }
}

pub fn format_audit_line(timestamp: &str, message: &str) -> String {
    // One event per line even when a command's stderr spans several.
    let flattened = message.replace(['\r', '\n'], " ");
    format!("[{timestamp}] {flattened}")
}
