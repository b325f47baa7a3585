use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Setup commands run by `provkit setup` when the config file names none.
pub const DEFAULT_SETUP_COMMANDS: &[&str] = &[
    "pkg update -y",
    "pkg upgrade -y",
    "apt update",
    "apt upgrade -y",
    "pkg install python -y",
    "pkg install python-pip -y",
    "pkg install git",
    "pkg install termux-api",
    "pkg install php",
    "pip install --upgrade pip",
    "pip install colorama",
    "pip install python-whois",
    "pip install tqdm pyfiglet requests",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    #[default]
    Silent,
    Ask,
    Interactive,
}

impl ResolutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Silent => "silent",
            Self::Ask => "ask",
            Self::Interactive => "interactive",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "silent" => Some(Self::Silent),
            "ask" => Some(Self::Ask),
            "interactive" => Some(Self::Interactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration, timeout: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
            timeout,
        }
    }

    pub fn single_attempt(timeout: Duration) -> Self {
        Self::new(1, Duration::ZERO, timeout)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Wait after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_backoff.saturating_mul(1_u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(4), Duration::from_secs(900))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeHostConfig {
    pub endpoint: String,
    pub per_page: u32,
    pub limit: usize,
    pub token: Option<String>,
    pub request_timeout: Duration,
}

impl Default for CodeHostConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.github.com/search/repositories".to_string(),
            per_page: 30,
            limit: 120,
            token: None,
            request_timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathsConfig {
    pub log_file: PathBuf,
    pub tools_dir: PathBuf,
    pub tool_list: PathBuf,
    pub backups_dir: PathBuf,
    pub maintenance_script: PathBuf,
}

impl PathsConfig {
    pub fn under_home(home: &Path) -> Self {
        Self {
            log_file: home.join("provkit-setup.log"),
            tools_dir: home.join("tools"),
            tool_list: home.join("tools-list.txt"),
            backups_dir: home.join("tool-backups"),
            maintenance_script: home.join("termux-self-update.sh"),
        }
    }
}

/// Process-wide settings, built once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub mode: ResolutionMode,
    pub token_cutoff: f64,
    pub package_cutoff: f64,
    pub retry: RetryPolicy,
    pub package_search_timeout: Duration,
    pub log_rotate_bytes: u64,
    pub snapshot_keep: usize,
    pub interpreter: Vec<String>,
    pub package_managers: Vec<String>,
    pub search_manager: String,
    pub index_refresh_command: String,
    pub setup_commands: Vec<String>,
    pub code_host: CodeHostConfig,
    pub paths: PathsConfig,
}

impl EngineConfig {
    pub fn with_home(home: &Path) -> Self {
        Self {
            mode: ResolutionMode::Silent,
            token_cutoff: 0.78,
            package_cutoff: 0.72,
            retry: RetryPolicy::default(),
            package_search_timeout: Duration::from_secs(20),
            log_rotate_bytes: 8_000_000,
            snapshot_keep: 5,
            interpreter: vec!["bash".to_string(), "-lc".to_string()],
            package_managers: vec!["pkg".to_string(), "apt".to_string()],
            search_manager: "pkg".to_string(),
            index_refresh_command: "pkg update -y".to_string(),
            setup_commands: DEFAULT_SETUP_COMMANDS
                .iter()
                .map(|command| command.to_string())
                .collect(),
            code_host: CodeHostConfig::default(),
            paths: PathsConfig::under_home(home),
        }
    }

    pub fn from_toml_str(input: &str, home: &Path) -> Result<Self> {
        let file: ConfigFile = toml::from_str(input).context("failed to parse provkit config")?;
        let mut config = Self::with_home(home);
        file.apply(&mut config, home)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path` when it exists, otherwise returns the defaults.
    pub fn load(path: &Path, home: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::with_home(home));
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        Self::from_toml_str(&content, home)
            .with_context(|| format!("failed loading config: {}", path.display()))
    }

    /// Applies `AUTO_CORRECT_MODE` and `GITHUB_TOKEN`. Called once, before the
    /// config is shared.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw_mode) = lookup("AUTO_CORRECT_MODE") {
            self.mode = ResolutionMode::parse(&raw_mode)
                .ok_or_else(|| anyhow!("invalid AUTO_CORRECT_MODE: '{raw_mode}'"))?;
        }
        if let Some(token) = lookup("GITHUB_TOKEN").filter(|token| !token.trim().is_empty()) {
            self.code_host.token = Some(token.trim().to_string());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, cutoff) in [
            ("token_cutoff", self.token_cutoff),
            ("package_cutoff", self.package_cutoff),
        ] {
            if !(0.0..=1.0).contains(&cutoff) {
                anyhow::bail!("{name} must be within 0.0..=1.0, got {cutoff}");
            }
        }
        if self.interpreter.is_empty() {
            anyhow::bail!("interpreter must name at least a program");
        }
        if self.code_host.per_page == 0 {
            anyhow::bail!("code_host.per_page must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    mode: Option<ResolutionMode>,
    token_cutoff: Option<f64>,
    package_cutoff: Option<f64>,
    max_retries: Option<u32>,
    base_backoff_secs: Option<u64>,
    command_timeout_secs: Option<u64>,
    package_search_timeout_secs: Option<u64>,
    log_rotate_bytes: Option<u64>,
    snapshot_keep: Option<usize>,
    interpreter: Option<Vec<String>>,
    package_managers: Option<Vec<String>>,
    search_manager: Option<String>,
    index_refresh_command: Option<String>,
    setup_commands: Option<Vec<String>>,
    code_host: CodeHostSection,
    paths: PathsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CodeHostSection {
    endpoint: Option<String>,
    per_page: Option<u32>,
    limit: Option<usize>,
    token: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PathsSection {
    log_file: Option<String>,
    tools_dir: Option<String>,
    tool_list: Option<String>,
    backups_dir: Option<String>,
    maintenance_script: Option<String>,
}

impl ConfigFile {
    fn apply(self, config: &mut EngineConfig, home: &Path) -> Result<()> {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(cutoff) = self.token_cutoff {
            config.token_cutoff = cutoff;
        }
        if let Some(cutoff) = self.package_cutoff {
            config.package_cutoff = cutoff;
        }
        if let Some(max_retries) = self.max_retries {
            config.retry.max_retries = max_retries;
        }
        if let Some(secs) = self.base_backoff_secs {
            config.retry.base_backoff = Duration::from_secs(secs);
        }
        if let Some(secs) = self.command_timeout_secs {
            config.retry.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.package_search_timeout_secs {
            config.package_search_timeout = Duration::from_secs(secs);
        }
        if let Some(bytes) = self.log_rotate_bytes {
            config.log_rotate_bytes = bytes;
        }
        if let Some(keep) = self.snapshot_keep {
            config.snapshot_keep = keep;
        }
        if let Some(interpreter) = self.interpreter {
            config.interpreter = interpreter;
        }
        if let Some(managers) = self.package_managers {
            config.package_managers = managers;
        }
        if let Some(manager) = self.search_manager {
            config.search_manager = manager;
        }
        if let Some(command) = self.index_refresh_command {
            config.index_refresh_command = command;
        }
        if let Some(commands) = self.setup_commands {
            config.setup_commands = commands;
        }

        let code_host = self.code_host;
        if let Some(endpoint) = code_host.endpoint {
            config.code_host.endpoint = endpoint;
        }
        if let Some(per_page) = code_host.per_page {
            config.code_host.per_page = per_page;
        }
        if let Some(limit) = code_host.limit {
            config.code_host.limit = limit;
        }
        if let Some(token) = code_host.token {
            config.code_host.token = Some(token);
        }
        if let Some(secs) = code_host.request_timeout_secs {
            config.code_host.request_timeout = Duration::from_secs(secs);
        }

        let paths = self.paths;
        for (value, slot) in [
            (paths.log_file, &mut config.paths.log_file),
            (paths.tools_dir, &mut config.paths.tools_dir),
            (paths.tool_list, &mut config.paths.tool_list),
            (paths.backups_dir, &mut config.paths.backups_dir),
            (paths.maintenance_script, &mut config.paths.maintenance_script),
        ] {
            if let Some(raw) = value {
                *slot = expand_home(&raw, home)?;
            }
        }

        Ok(())
    }
}

fn expand_home(raw: &str, home: &Path) -> Result<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        anyhow::bail!("config path must not be empty");
    }
    if trimmed == "~" {
        return Ok(home.to_path_buf());
    }
    if let Some(rest) = trimmed.strip_prefix("~/") {
        return Ok(home.join(rest));
    }
    Ok(PathBuf::from(trimmed))
}
