use anyhow::{Context, Result};
use provkit_core::PathsConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolLayout {
    tools_dir: PathBuf,
    backups_dir: PathBuf,
}

impl ToolLayout {
    pub fn new(tools_dir: impl Into<PathBuf>, backups_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools_dir: tools_dir.into(),
            backups_dir: backups_dir.into(),
        }
    }

    pub fn from_paths(paths: &PathsConfig) -> Self {
        Self::new(&paths.tools_dir, &paths.backups_dir)
    }

    pub fn tools_dir(&self) -> &Path {
        &self.tools_dir
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    pub fn tool_dir(&self, name: &str) -> PathBuf {
        self.tools_dir.join(name)
    }

    pub fn snapshot_path(&self, tool: &str, stamp: &str) -> PathBuf {
        self.backups_dir.join(format!("{tool}-{stamp}.tar.gz"))
    }

    pub fn checksum_path(&self, archive: &Path) -> PathBuf {
        let mut file_name = archive
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        file_name.push(".sha256");
        archive.with_file_name(file_name)
    }

    pub fn snapshot_tmp_path(&self, tool: &str) -> PathBuf {
        self.backups_dir.join(format!(".{tool}-{}.tar.gz.tmp", unique_suffix()))
    }

    pub fn restore_staging_dir(&self, tool: &str) -> PathBuf {
        self.tools_dir.join(format!(".restore-{tool}-{}", unique_suffix()))
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [&self.tools_dir, &self.backups_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

pub(crate) fn unique_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{}-{nanos}", std::process::id())
}
