use std::io::{BufRead, Write};

use provkit_core::CommandLine;
use provkit_installer::OperatorDecisions;
use provkit_resolver::{Candidate, Selection};

use crate::render::format_candidate_line;

/// Asks the operator on a line-oriented terminal. End of input declines a
/// correction and cancels a selection.
pub(crate) struct TerminalDecisions<I, O> {
    input: I,
    output: O,
}

impl<I: BufRead, O: Write> TerminalDecisions<I, O> {
    pub(crate) fn new(input: I, output: O) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, question: &str) -> Option<String> {
        // A broken prompt stream means nobody can answer.
        write!(self.output, "{question}").ok()?;
        self.output.flush().ok()?;
        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(answer.trim().to_string()),
        }
    }
}

impl<I: BufRead, O: Write> OperatorDecisions for TerminalDecisions<I, O> {
    fn confirm_correction(&mut self, original: &CommandLine, proposed: &CommandLine) -> bool {
        let _ = writeln!(self.output, "original:  {original}");
        let _ = writeln!(self.output, "corrected: {proposed}");
        match self.ask("Run the corrected command? [Y/n] ") {
            Some(answer) => {
                let answer = answer.to_ascii_lowercase();
                answer.is_empty() || answer == "y" || answer == "yes"
            }
            None => false,
        }
    }

    fn select_candidates(&mut self, token: &str, candidates: &[Candidate]) -> Selection {
        let _ = writeln!(self.output, "'{token}' was not found as written. Candidates:");
        for (offset, candidate) in candidates.iter().enumerate() {
            let _ = writeln!(self.output, "{}", format_candidate_line(offset + 1, candidate));
        }
        match self.ask("Select (e.g. 1,3-4; a = all; q or empty = keep as typed): ") {
            Some(answer) => Selection::parse(&answer, candidates.len()),
            None => Selection::none(),
        }
    }
}
