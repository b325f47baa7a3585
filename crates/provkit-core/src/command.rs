use std::fmt;

const CONTROL_OPERATORS: &[&str] = &["&&", "||", ";", "|"];
// Longest first so `>>` is not read as `>`.
const REDIRECTION_OPERATORS: &[&str] = &[
    "&>>", "<<<", "&>", ">>", ">&", ">|", "<<", "<&", "<>", ">", "<",
];

/// A command kept as program + ordered arguments until it reaches the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Splits on unquoted whitespace. Single and double quotes group words and
    /// are removed; a backslash outside single quotes escapes the next char.
    /// Returns `None` for blank input.
    pub fn parse(input: &str) -> Option<Self> {
        let tokens = split_words(input);
        let mut tokens = tokens.into_iter();
        let program = tokens.next()?;
        Some(Self {
            program,
            args: tokens.collect(),
        })
    }

    pub fn from_tokens(tokens: Vec<String>) -> Option<Self> {
        let mut tokens = tokens.into_iter();
        let program = tokens.next()?;
        Some(Self {
            program,
            args: tokens.collect(),
        })
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }

    pub fn into_tokens(self) -> Vec<String> {
        let mut tokens = Vec::with_capacity(self.args.len() + 1);
        tokens.push(self.program);
        tokens.extend(self.args);
        tokens
    }

    /// Serializes for `bash -c`. Control operators and redirections stay
    /// bare so chained commands and `> file` keep their meaning.
    pub fn to_shell_string(&self) -> String {
        self.tokens()
            .map(|token| {
                if is_control_operator(token) {
                    return token.to_string();
                }
                match split_redirection(token) {
                    Some((operator, "")) => operator.to_string(),
                    Some((operator, target)) => format!("{operator}{}", quote_word(target)),
                    None => quote_word(token),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell_string())
    }
}

pub fn is_control_operator(token: &str) -> bool {
    CONTROL_OPERATORS.contains(&token)
}

/// `>`, `2>>`, `2>&1`, `>/dev/null` and the other bash redirection forms.
pub fn is_redirection(token: &str) -> bool {
    split_redirection(token).is_some()
}

/// A bare redirection operator whose target is the next word.
pub fn takes_redirect_target(token: &str) -> bool {
    matches!(split_redirection(token), Some((_, "")))
}

/// Splits a redirection word into its operator (with any fd prefix) and an
/// attached target, which may be empty.
fn split_redirection(token: &str) -> Option<(&str, &str)> {
    let digits = token.len() - token.trim_start_matches(|ch: char| ch.is_ascii_digit()).len();
    let rest = &token[digits..];
    let operator = REDIRECTION_OPERATORS
        .iter()
        .find(|operator| rest.starts_with(**operator))?;
    if digits > 0 && operator.starts_with('&') {
        return None;
    }
    Some(token.split_at(digits + operator.len()))
}

fn is_safe_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || "_@%+=:,./-~".contains(ch)
}

fn quote_word(word: &str) -> String {
    if !word.is_empty() && word.chars().all(is_safe_char) {
        return word.to_string();
    }
    // Keep variable expansion working for `$HOME/tools` style arguments.
    if word.contains('$') && !word.contains(['"', '`', '\\']) {
        return format!("\"{word}\"");
    }
    format!("'{}'", word.replace('\'', "'\"'\"'"))
}

fn split_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        match quote {
            Some('\'') => {
                if ch == '\'' {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            Some(_) => match ch {
                '"' => quote = None,
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                _ => current.push(ch),
            },
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    in_word = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                    in_word = true;
                }
                ch if ch.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                _ => {
                    current.push(ch);
                    in_word = true;
                }
            },
        }
    }

    if in_word {
        words.push(current);
    }
    words
}
