use std::collections::HashSet;
use std::time::Duration;

use provkit_core::{close_matches, CommandLine, CommandRunner};

use crate::CodeHostHit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    PackageIndex,
    CodeHost,
}

impl CandidateSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PackageIndex => "pkg",
            Self::CodeHost => "repo",
        }
    }
}

/// A real package or repository offered in place of an unresolved token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub source: CandidateSource,
    /// Installable package name or repository `owner/name`.
    pub identifier: String,
    /// Package-manager name or clone URL.
    pub locator: String,
}

impl Candidate {
    pub fn package(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: CandidateSource::PackageIndex,
            locator: name.clone(),
            identifier: name,
        }
    }

    pub fn code_host(hit: CodeHostHit) -> Self {
        Self {
            source: CandidateSource::CodeHost,
            identifier: hit.full_name,
            locator: hit.html_url,
        }
    }
}

pub trait PackageSearch {
    /// Distinct identifiers in first-seen order; empty on any failure.
    fn search_package(&self, name: &str) -> Vec<String>;
}

/// Queries the external package index through `<manager> search <name>`.
pub struct PackageIndex<R> {
    runner: R,
    manager: String,
    timeout: Duration,
}

impl<R: CommandRunner> PackageIndex<R> {
    pub fn new(runner: R, manager: impl Into<String>, timeout: Duration) -> Self {
        Self {
            runner,
            manager: manager.into(),
            timeout,
        }
    }
}

impl<R: CommandRunner> PackageSearch for PackageIndex<R> {
    fn search_package(&self, name: &str) -> Vec<String> {
        let command = CommandLine::new(&self.manager).arg("search").arg(name);
        match self.runner.run(&command, self.timeout) {
            Ok(output) => parse_search_output(&output.stdout),
            Err(err) => {
                tracing::debug!("package search for '{name}' failed: {err}");
                Vec::new()
            }
        }
    }
}

/// One identifier per result line: the first field, minus an apt-style
/// `/suite` suffix. Indented description lines and progress lines such as
/// `Sorting...` are skipped.
pub fn parse_search_output(stdout: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut identifiers = Vec::new();

    for line in stdout.lines() {
        if line.starts_with(char::is_whitespace) {
            continue;
        }
        let Some(first) = line.split_whitespace().next() else {
            continue;
        };
        if first.ends_with("...") {
            continue;
        }
        let identifier = first.split('/').next().unwrap_or(first);
        if identifier.is_empty() {
            continue;
        }
        if seen.insert(identifier.to_string()) {
            identifiers.push(identifier.to_string());
        }
    }

    identifiers
}

pub fn choose_best(name: &str, candidates: &[String], cutoff: f64) -> Option<String> {
    close_matches(name, candidates.iter().map(String::as_str), 1, cutoff)
        .into_iter()
        .next()
}
