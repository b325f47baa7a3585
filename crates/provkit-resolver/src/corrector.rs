use provkit_core::{
    close_matches, is_control_operator, is_redirection, takes_redirect_target, AuditLog,
    CommandLine,
};

use crate::Vocabulary;

/// Fixes single mistyped tokens against a [`Vocabulary`].
#[derive(Debug, Clone)]
pub struct TokenCorrector {
    vocabulary: Vocabulary,
    cutoff: f64,
}

impl TokenCorrector {
    pub fn new(vocabulary: Vocabulary, cutoff: f64) -> Self {
        Self { vocabulary, cutoff }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn correct_token(&self, token: &str) -> String {
        if !is_correctable(token) {
            return token.to_string();
        }
        if let Some(fixed) = self.vocabulary.lookup(token) {
            return fixed.to_string();
        }

        close_matches(token, self.vocabulary.keys(), 1, self.cutoff)
            .first()
            .and_then(|best| self.vocabulary.lookup(best))
            .map(ToString::to_string)
            .unwrap_or_else(|| token.to_string())
    }

    /// Corrects the program name and every non-flag argument. The token after
    /// a control operator is treated as the next program name; the token after
    /// a redirection is a file name and is left alone.
    pub fn correct_command(&self, command: &CommandLine) -> CommandLine {
        let mut redirect_target = false;
        let corrected = command
            .tokens()
            .map(|token| {
                let fixed = if redirect_target {
                    token.to_string()
                } else {
                    self.correct_token(token)
                };
                redirect_target = takes_redirect_target(token);
                fixed
            })
            .collect::<Vec<_>>();
        CommandLine::from_tokens(corrected).unwrap_or_else(|| command.clone())
    }

    pub fn correct_and_record(&self, command: &CommandLine, audit: &AuditLog) -> CommandLine {
        let corrected = self.correct_command(command);
        if corrected != *command {
            record_correction(audit, command, &corrected);
        }
        corrected
    }
}

pub fn record_correction(audit: &AuditLog, original: &CommandLine, corrected: &CommandLine) {
    audit.record(&format!("[autocorrect] {original} -> {corrected}"));
    tracing::debug!("autocorrected `{original}` to `{corrected}`");
}

/// Flags, paths, assignments, shell variables, control operators and
/// redirections are passed through verbatim.
pub fn is_correctable(token: &str) -> bool {
    !(token.is_empty()
        || token.starts_with('-')
        || token.starts_with('$')
        || token.contains('/')
        || token.contains('=')
        || is_control_operator(token)
        || is_redirection(token))
}
