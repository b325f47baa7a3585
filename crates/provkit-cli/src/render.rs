use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{HumanCount, ProgressBar, ProgressStyle};
use provkit_installer::{ItemOutcome, RunSummary, Snapshot};
use provkit_resolver::{Candidate, CandidateSource};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn resolve_output_style(stdout_is_tty: bool, _stderr_is_tty: bool) -> OutputStyle {
    if stdout_is_tty {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn current_output_style() -> OutputStyle {
    resolve_output_style(
        std::io::stdout().is_terminal(),
        std::io::stderr().is_terminal(),
    )
}

/// `[OK] message` badges in rich mode; the bare message otherwise.
pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

fn outcome_status(outcome: &ItemOutcome) -> &'static str {
    match outcome {
        ItemOutcome::Succeeded => "ok",
        ItemOutcome::Skipped(_) => "step",
        ItemOutcome::RolledBack(_) => "warn",
        ItemOutcome::Failed(_) | ItemOutcome::RollbackFailed(_) => "err",
    }
}

pub(crate) fn format_summary_lines(summary: &RunSummary, style: OutputStyle) -> Vec<String> {
    let mut lines = summary
        .items
        .iter()
        .map(|report| render_status_line(style, outcome_status(&report.outcome), &report.to_string()))
        .collect::<Vec<_>>();

    let failed = summary.count("failed") + summary.count("rollback-failed");
    let totals = format!(
        "{} item(s): {} succeeded, {} skipped, {} rolled back, {} failed",
        summary.items.len(),
        summary.count("succeeded"),
        summary.count("skipped"),
        summary.count("rolled-back"),
        failed
    );
    let status = if failed > 0 { "err" } else { "ok" };
    lines.push(render_status_line(style, status, &totals));
    lines
}

pub(crate) fn format_candidate_line(index: usize, candidate: &Candidate) -> String {
    match candidate.source {
        CandidateSource::PackageIndex => format!("{index:>3}) [pkg]  {}", candidate.identifier),
        CandidateSource::CodeHost => format!(
            "{index:>3}) [repo] {} ({})",
            candidate.identifier, candidate.locator
        ),
    }
}

pub(crate) fn format_snapshot_lines(tool: &str, snapshots: &[Snapshot]) -> Vec<String> {
    if snapshots.is_empty() {
        return vec![format!("no snapshots for {tool}")];
    }
    snapshots
        .iter()
        .rev()
        .map(|snapshot| {
            format!(
                "{}  {}",
                snapshot.created_at,
                snapshot.archive_path.display()
            )
        })
        .collect()
}

/// Tracks a setup run item by item. Rich output keeps a bar whose message
/// carries the running ok/failed tally; plain output prints nothing extra.
pub(crate) struct SetupProgress {
    style: OutputStyle,
    tally: SetupTally,
    progress_bar: Option<ProgressBar>,
    started_at: Instant,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct SetupTally {
    pub(crate) done: u64,
    pub(crate) total: u64,
    pub(crate) ok: u64,
    pub(crate) failed: u64,
}

impl SetupTally {
    pub(crate) fn new(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Counts one finished item. Skips and rollbacks are neither ok nor failed.
    pub(crate) fn record(&mut self, outcome: &RunSummary) {
        self.done = (self.done + 1).min(self.total);
        if outcome.has_failures() {
            self.failed += 1;
        } else if outcome.count("succeeded") > 0 {
            self.ok += 1;
        }
    }

    fn message(&self, item: &str) -> String {
        format!("{} ok, {} failed  {item}", self.ok, self.failed)
    }
}

impl SetupProgress {
    pub(crate) fn start(style: OutputStyle, total: u64) -> Self {
        let tally = SetupTally::new(total);
        let progress_bar = (style == OutputStyle::Rich).then(|| {
            let progress_bar = ProgressBar::new(total.max(1));
            if let Ok(bar_style) = ProgressStyle::with_template(
                "{spinner:.green} setup {pos}/{len} [{bar:24.green/white}] {wide_msg}",
            ) {
                progress_bar.set_style(bar_style.progress_chars("#>."));
            }
            progress_bar.set_message(tally.message("starting"));
            progress_bar.enable_steady_tick(Duration::from_millis(120));
            progress_bar
        });

        Self {
            style,
            tally,
            progress_bar,
            started_at: Instant::now(),
        }
    }

    /// Prints `line` above the bar so it is not overdrawn.
    pub(crate) fn println(&self, line: &str) {
        match &self.progress_bar {
            Some(progress_bar) => progress_bar.println(line),
            None => println!("{line}"),
        }
    }

    pub(crate) fn advance(&mut self, item: &str, outcome: &RunSummary) {
        self.tally.record(outcome);
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.set_position(self.tally.done);
            progress_bar.set_message(self.tally.message(item));
        }
    }

    pub(crate) fn finish(mut self) {
        let Some(progress_bar) = self.progress_bar.take() else {
            return;
        };
        progress_bar.finish_and_clear();
        if let Some(line) = render_setup_tally(self.style, &self.tally, self.started_at.elapsed()) {
            println!("{line}");
        }
    }
}

/// One-line recap after the bar clears, e.g. `setup 4/5: 3 ok, 1 failed (2.5s)`.
pub(crate) fn render_setup_tally(
    style: OutputStyle,
    tally: &SetupTally,
    elapsed: Duration,
) -> Option<String> {
    if style == OutputStyle::Plain {
        return None;
    }
    let color = if tally.failed > 0 {
        AnsiColor::Red
    } else {
        AnsiColor::Green
    };
    let counts = Style::new()
        .fg_color(Some(color.into()))
        .effects(Effects::BOLD);
    Some(format!(
        "setup {}/{}: {}{} ok, {} failed{} ({:.1}s)",
        HumanCount(tally.done),
        HumanCount(tally.total),
        counts.render(),
        tally.ok,
        tally.failed,
        counts.render_reset(),
        elapsed.as_secs_f64()
    ))
}
