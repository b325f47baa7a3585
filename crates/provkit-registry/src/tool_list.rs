use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use provkit_core::EngineError;

use crate::GIST_HOST;

pub const TOOL_LIST_HEADER: &str = "# provkit tool list: one locator per line.\n\
# Prefixes: git+<url>, url+<url>, gist+<id-or-url>; a bare URL is cloned with git.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSourceKind {
    Git,
    Url,
    Gist,
}

impl ToolSourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Url => "url",
            Self::Gist => "gist",
        }
    }

    pub fn is_checkout(self) -> bool {
        matches!(self, Self::Git | Self::Gist)
    }
}

/// One entry of the persisted tool list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSource {
    pub kind: ToolSourceKind,
    /// Clone or download URL, with any kind prefix removed.
    pub locator: String,
    /// Directory name under the tools directory.
    pub name: String,
}

impl ToolSource {
    /// Parses a single non-blank, non-comment entry. `line` is 1-based and
    /// only used for error reporting.
    pub fn parse(line: usize, entry: &str) -> Result<Self, EngineError> {
        let entry = entry.trim();
        let invalid = |reason: String| EngineError::InvalidToolSource { line, reason };

        let (kind, rest) = if let Some(rest) = entry.strip_prefix("git+") {
            (ToolSourceKind::Git, rest)
        } else if let Some(rest) = entry.strip_prefix("url+") {
            (ToolSourceKind::Url, rest)
        } else if let Some(rest) = entry.strip_prefix("gist+") {
            (ToolSourceKind::Gist, rest)
        } else {
            (ToolSourceKind::Git, entry)
        };
        let rest = rest.trim();
        if rest.is_empty() {
            return Err(invalid(format!("'{entry}' has no locator")));
        }
        if rest.chars().any(char::is_whitespace) {
            return Err(invalid(format!("locator '{rest}' contains whitespace")));
        }

        let locator = match kind {
            ToolSourceKind::Gist if !rest.contains('/') => format!("{GIST_HOST}/{rest}.git"),
            _ => rest.to_string(),
        };
        if kind == ToolSourceKind::Url && !locator.contains("://") {
            return Err(invalid(format!("download locator '{locator}' is not a URL")));
        }

        let name = derive_tool_name(kind, &locator);
        if !is_valid_tool_name(&name) {
            return Err(invalid(format!("cannot derive a tool name from '{locator}'")));
        }

        Ok(Self {
            kind,
            locator,
            name,
        })
    }

    /// File name a `url+` source is saved under inside its tool directory.
    pub fn download_file_name(&self) -> &str {
        last_segment(&self.locator)
    }
}

/// Parsed entries plus per-line rejections; one bad line never hides the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolList {
    pub sources: Vec<ToolSource>,
    pub rejected: Vec<EngineError>,
}

pub fn parse_tool_list(content: &str) -> ToolList {
    let mut list = ToolList::default();
    for (index, raw) in content.lines().enumerate() {
        let entry = raw.trim();
        if entry.is_empty() || entry.starts_with('#') {
            continue;
        }
        match ToolSource::parse(index + 1, entry) {
            Ok(source) => list.sources.push(source),
            Err(err) => {
                tracing::warn!("skipping tool list entry: {err}");
                list.rejected.push(err);
            }
        }
    }
    list
}

/// A missing file is an empty list.
pub fn load_tool_list(path: &Path) -> Result<ToolList> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(parse_tool_list(&content)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(ToolList::default()),
        Err(err) => {
            Err(err).with_context(|| format!("failed reading tool list: {}", path.display()))
        }
    }
}

/// Appends `locator` after validating it, creating the file with a header
/// comment when needed. A tool name that is already listed is rejected.
pub fn add_tool(path: &Path, locator: &str) -> Result<ToolSource> {
    let existing = load_tool_list(path)?;
    let line = existing.sources.len() + existing.rejected.len() + 1;
    let source = ToolSource::parse(line, locator)?;
    if existing
        .sources
        .iter()
        .any(|listed| listed.name == source.name)
    {
        anyhow::bail!(
            "tool '{}' is already listed in {}",
            source.name,
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let needs_header = !path.exists();
    let needs_newline = !needs_header
        && fs::read(path)
            .map(|bytes| bytes.last().is_some_and(|last| *last != b'\n'))
            .unwrap_or(false);

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open tool list: {}", path.display()))?;
    let mut entry = String::new();
    if needs_header {
        entry.push_str(TOOL_LIST_HEADER);
    }
    if needs_newline {
        entry.push('\n');
    }
    entry.push_str(locator.trim());
    entry.push('\n');
    file.write_all(entry.as_bytes())
        .with_context(|| format!("failed to append tool list: {}", path.display()))?;

    Ok(source)
}

fn derive_tool_name(kind: ToolSourceKind, locator: &str) -> String {
    let segment = last_segment(locator);
    match kind {
        ToolSourceKind::Git | ToolSourceKind::Gist => {
            segment.strip_suffix(".git").unwrap_or(segment).to_string()
        }
        ToolSourceKind::Url => Path::new(segment)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default(),
    }
}

fn last_segment(locator: &str) -> &str {
    let without_query = locator.split(['?', '#']).next().unwrap_or(locator);
    let trimmed = without_query.trim_end_matches('/');
    trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed)
}

fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.starts_with('-')
}
