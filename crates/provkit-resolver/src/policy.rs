//! Decides, per resolution mode, how a requested command becomes the command
//! that is finally executed.
//!
//! Operator involvement is modelled as a suspension: [`ResolutionPolicy::prepare`]
//! either returns a ready command or a [`PendingDecision`] carrying what the
//! operator must decide. The driver answers through [`ResolutionPolicy::confirm`]
//! or [`ResolutionPolicy::select`], which resume the walk where it stopped.

use std::collections::BTreeMap;
use std::ops::Range;

use provkit_core::{
    is_control_operator, takes_redirect_target, AuditLog, CommandLine, EngineConfig,
    ResolutionMode,
};

use crate::{
    choose_best, is_correctable, record_correction, Candidate, CandidateSource, CodeHostSearch,
    PackageSearch, Selection, TokenCorrector,
};

/// The command to run, if any, plus repositories the operator chose to clone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedCommand {
    pub command: Option<CommandLine>,
    pub clones: Vec<Candidate>,
}

impl PreparedCommand {
    pub fn ready(command: CommandLine) -> Self {
        Self {
            command: Some(command),
            clones: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Ready(PreparedCommand),
    Pending(PendingDecision),
}

#[derive(Debug, Clone)]
pub enum PendingDecision {
    Confirm(PendingConfirmation),
    Select(PendingSelection),
}

/// Ask mode: the corrected command waits for a yes/no.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConfirmation {
    pub original: CommandLine,
    pub proposed: CommandLine,
}

/// Interactive mode: one package token waits for a menu selection.
#[derive(Debug, Clone)]
pub struct PendingSelection {
    pub token: String,
    pub candidates: Vec<Candidate>,
    walk: InteractiveWalk,
}

pub struct ResolutionPolicy<'a> {
    mode: ResolutionMode,
    package_cutoff: f64,
    package_managers: &'a [String],
    corrector: &'a TokenCorrector,
    packages: &'a dyn PackageSearch,
    code_host: &'a dyn CodeHostSearch,
    audit: &'a AuditLog,
}

impl<'a> ResolutionPolicy<'a> {
    pub fn new(
        config: &'a EngineConfig,
        corrector: &'a TokenCorrector,
        packages: &'a dyn PackageSearch,
        code_host: &'a dyn CodeHostSearch,
        audit: &'a AuditLog,
    ) -> Self {
        Self {
            mode: config.mode,
            package_cutoff: config.package_cutoff,
            package_managers: &config.package_managers,
            corrector,
            packages,
            code_host,
            audit,
        }
    }

    pub fn mode(&self) -> ResolutionMode {
        self.mode
    }

    /// Blank input resolves to nothing to run.
    pub fn prepare(&self, raw: &str) -> Resolution {
        match CommandLine::parse(raw) {
            Some(command) => self.prepare_command(command),
            None => Resolution::Ready(PreparedCommand::default()),
        }
    }

    pub fn prepare_command(&self, original: CommandLine) -> Resolution {
        // Ask mode records the correction only once the operator accepts it.
        let corrected = match self.mode {
            ResolutionMode::Ask => self.corrector.correct_command(&original),
            ResolutionMode::Silent | ResolutionMode::Interactive => {
                self.corrector.correct_and_record(&original, self.audit)
            }
        };
        match self.mode {
            ResolutionMode::Ask if corrected != original => {
                Resolution::Pending(PendingDecision::Confirm(PendingConfirmation {
                    original,
                    proposed: corrected,
                }))
            }
            ResolutionMode::Silent | ResolutionMode::Ask => {
                Resolution::Ready(self.resolve_silently(corrected))
            }
            ResolutionMode::Interactive => {
                let walk = InteractiveWalk::start(corrected, self.package_managers);
                self.walk(walk)
            }
        }
    }

    pub fn confirm(&self, pending: PendingConfirmation, accepted: bool) -> PreparedCommand {
        let command = if accepted {
            record_correction(self.audit, &pending.original, &pending.proposed);
            pending.proposed
        } else {
            self.audit.record(&format!(
                "[autocorrect] declined, keeping: {}",
                pending.original
            ));
            pending.original
        };
        self.resolve_silently(command)
    }

    pub fn select(&self, pending: PendingSelection, selection: &Selection) -> Resolution {
        let PendingSelection {
            token,
            candidates,
            mut walk,
        } = pending;
        walk.apply_selection(&token, &candidates, selection, self.audit);
        walk.next += 1;
        self.walk(walk)
    }

    fn resolve_silently(&self, command: CommandLine) -> PreparedCommand {
        let mut tokens = command.clone().into_tokens();
        for position in package_positions(&tokens, self.package_managers) {
            let token = tokens[position].clone();
            let hits = self.packages.search_package(&token);
            if hits.iter().any(|hit| *hit == token) {
                continue;
            }
            if let Some(best) = choose_best(&token, &hits, self.package_cutoff) {
                tokens[position] = best;
            }
        }

        let fixed = CommandLine::from_tokens(tokens).unwrap_or_else(|| command.clone());
        if fixed != command {
            self.audit.record(&format!("[pkg-fix] {command} -> {fixed}"));
            tracing::info!("package names fixed: `{command}` -> `{fixed}`");
        }
        PreparedCommand::ready(fixed)
    }

    fn walk(&self, mut walk: InteractiveWalk) -> Resolution {
        while let Some(&position) = walk.package_positions.get(walk.next) {
            let token = walk.tokens[position].clone();
            let hits = self.packages.search_package(&token);
            if hits.iter().any(|hit| *hit == token) {
                walk.next += 1;
                continue;
            }

            let mut candidates: Vec<Candidate> = hits.into_iter().map(Candidate::package).collect();
            candidates.extend(
                self.code_host
                    .search_code_host(&token)
                    .into_iter()
                    .map(Candidate::code_host),
            );
            if candidates.is_empty() {
                tracing::debug!("no candidates for '{token}', passing it through");
                walk.next += 1;
                continue;
            }

            return Resolution::Pending(PendingDecision::Select(PendingSelection {
                token,
                candidates,
                walk,
            }));
        }

        Resolution::Ready(walk.finish())
    }
}

#[derive(Debug, Clone)]
struct InteractiveWalk {
    tokens: Vec<String>,
    package_positions: Vec<usize>,
    next: usize,
    // Token position -> identifiers replacing it. An empty list removes it.
    replacements: BTreeMap<usize, Vec<String>>,
    clones: Vec<Candidate>,
}

impl InteractiveWalk {
    fn start(command: CommandLine, package_managers: &[String]) -> Self {
        let tokens = command.into_tokens();
        let package_positions = package_positions(&tokens, package_managers);
        Self {
            tokens,
            package_positions,
            next: 0,
            replacements: BTreeMap::new(),
            clones: Vec::new(),
        }
    }

    fn apply_selection(
        &mut self,
        token: &str,
        candidates: &[Candidate],
        selection: &Selection,
        audit: &AuditLog,
    ) {
        let Some(&position) = self.package_positions.get(self.next) else {
            return;
        };
        if selection.is_empty() {
            audit.record(&format!("[select] {token}: no selection, keeping it"));
            return;
        }

        let mut packages = Vec::new();
        let mut repositories = Vec::new();
        for index in selection.indices() {
            let Some(candidate) = index.checked_sub(1).and_then(|slot| candidates.get(slot)) else {
                continue;
            };
            match candidate.source {
                CandidateSource::PackageIndex => packages.push(candidate.identifier.clone()),
                CandidateSource::CodeHost => {
                    repositories.push(candidate.identifier.clone());
                    self.clones.push(candidate.clone());
                }
            }
        }

        audit.record(&format!(
            "[select] {token} -> packages [{}] repositories [{}]",
            packages.join(", "),
            repositories.join(", ")
        ));
        self.replacements.insert(position, packages);
    }

    fn finish(self) -> PreparedCommand {
        let mut out: Vec<String> = Vec::new();
        for (segment_index, range) in segments(&self.tokens).into_iter().enumerate() {
            let mut positions = self
                .package_positions
                .iter()
                .filter(|position| range.contains(*position))
                .peekable();
            // A segment whose every package was swapped for a clone has
            // nothing left to install.
            let emptied = positions.peek().is_some()
                && positions.all(|position| {
                    self.replacements
                        .get(position)
                        .is_some_and(|replacement| replacement.is_empty())
                });
            if emptied {
                continue;
            }

            if segment_index > 0 && !out.is_empty() {
                out.push(self.tokens[range.start - 1].clone());
            }
            for index in range {
                match self.replacements.get(&index) {
                    Some(replacement) => out.extend(replacement.iter().cloned()),
                    None => out.push(self.tokens[index].clone()),
                }
            }
        }

        PreparedCommand {
            command: CommandLine::from_tokens(out),
            clones: self.clones,
        }
    }
}

fn segments(tokens: &[String]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for (index, token) in tokens.iter().enumerate() {
        if is_control_operator(token) {
            ranges.push(start..index);
            start = index + 1;
        }
    }
    ranges.push(start..tokens.len());
    ranges
}

/// Positions of package names in `<manager> ... install <names>` segments.
/// Flags, other uncorrectable tokens and redirection targets are skipped.
fn package_positions(tokens: &[String], package_managers: &[String]) -> Vec<usize> {
    let mut positions = Vec::new();
    for range in segments(tokens) {
        let Some(program) = tokens.get(range.start) else {
            continue;
        };
        if range.is_empty() || !package_managers.iter().any(|manager| manager == program) {
            continue;
        }
        let Some(install_at) = range.clone().find(|index| tokens[*index] == "install") else {
            continue;
        };
        positions.extend((install_at + 1..range.end).filter(|index| {
            is_correctable(&tokens[*index]) && !takes_redirect_target(&tokens[*index - 1])
        }));
    }
    positions
}
