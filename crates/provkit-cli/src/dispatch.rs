use std::path::{Path, PathBuf};
use std::slice;

use anyhow::{anyhow, Context, Result};
use provkit_core::{AuditLog, CommandLine, EngineConfig, ResolutionMode, SystemCommandRunner};
use provkit_installer::{
    Executor, OperatorDecisions, Provisioner, RecoveryAction, RunSummary, SnapshotManager,
    ThreadSleeper, ToolLayout, ToolSync,
};
use provkit_registry::{add_tool, load_tool_list, ToolList};
use provkit_resolver::{
    choose_best, Candidate, CodeHostClient, CodeHostSearch, PackageIndex, PackageSearch,
    ResolutionPolicy, TokenCorrector, Vocabulary,
};

use crate::prompt::TerminalDecisions;
use crate::render::{
    current_output_style, format_candidate_line, format_snapshot_lines, format_summary_lines,
    render_status_line, OutputStyle, SetupProgress,
};
use crate::{Cli, Commands, ToolsCommands};

const CONFIG_RELATIVE_PATH: &str = ".config/provkit/config.toml";

/// Every long-lived engine component, built once from the final config.
struct Engine {
    config: EngineConfig,
    corrector: TokenCorrector,
    packages: PackageIndex<SystemCommandRunner>,
    code_host: CodeHostClient,
    executor: Executor,
    snapshots: SnapshotManager,
}

impl Engine {
    fn new(config: EngineConfig) -> Self {
        let audit = AuditLog::new(&config.paths.log_file, config.log_rotate_bytes);
        let runner = SystemCommandRunner::new(config.interpreter.clone());
        Self {
            corrector: TokenCorrector::new(Vocabulary::builtin(), config.token_cutoff),
            packages: PackageIndex::new(
                runner.clone(),
                config.search_manager.clone(),
                config.package_search_timeout,
            ),
            code_host: CodeHostClient::new(config.code_host.clone()),
            executor: Executor::new(
                runner,
                ThreadSleeper,
                audit.clone(),
                RecoveryAction::from_config(&config),
            ),
            snapshots: SnapshotManager::new(
                ToolLayout::from_paths(&config.paths),
                audit,
                config.snapshot_keep,
            ),
            config,
        }
    }

    fn policy(&self) -> ResolutionPolicy<'_> {
        ResolutionPolicy::new(
            &self.config,
            &self.corrector,
            &self.packages,
            &self.code_host,
            self.executor.audit(),
        )
    }

    fn provisioner(&self, dry_run: bool) -> Provisioner<'_, SystemCommandRunner, ThreadSleeper> {
        let tools = ToolSync::new(&self.executor, &self.snapshots, self.config.retry);
        Provisioner::new(self.policy(), tools, self.config.retry).with_dry_run(dry_run)
    }

    fn load_tools(&self) -> Result<ToolList> {
        load_tool_list(&self.config.paths.tool_list)
    }
}

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let home = user_home()?;
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(&home));
    let config = resolve_config(&cli, &config_path, &home, |key| std::env::var(key).ok())?;
    let style = current_output_style();
    let engine = Engine::new(config);

    match cli.command {
        Commands::Setup { skip_tools } => run_setup(&engine, style, cli.dry_run, skip_tools),
        Commands::Run { command } => {
            let raw = shell_command(command)?;
            ToolLayout::from_paths(&engine.config.paths).ensure_base_dirs()?;
            let provisioner = engine.provisioner(cli.dry_run);
            provisioner.start_run();
            let mut decisions = terminal_decisions();
            let summary = provisioner.run_command(&raw, &mut decisions);
            finish_summary(&summary, style, &engine.config.paths.log_file)
        }
        Commands::Correct { command } => {
            let original = CommandLine::from_tokens(command)
                .ok_or_else(|| anyhow!("no command given"))?;
            let corrected = engine.corrector.correct_command(&original);
            let status = if corrected == original { "step" } else { "ok" };
            println!(
                "{}",
                render_status_line(style, status, &corrected.to_shell_string())
            );
            Ok(())
        }
        Commands::Search { name } => {
            for line in search_lines(&engine, &name) {
                println!("{line}");
            }
            Ok(())
        }
        Commands::Tools { command } => run_tools_command(&engine, style, cli.dry_run, command),
        Commands::Snapshots { tool } => {
            let snapshots = engine.snapshots.list_snapshots(&tool)?;
            for line in format_snapshot_lines(&tool, &snapshots) {
                println!("{line}");
            }
            Ok(())
        }
        Commands::Rollback { tool } => {
            let restored = engine.snapshots.restore_latest(&tool)?;
            println!(
                "{}",
                render_status_line(
                    style,
                    "ok",
                    &format!("restored {tool} from {}", restored.archive_path.display())
                )
            );
            Ok(())
        }
        Commands::Config => {
            for line in format_config_lines(&engine.config, &config_path) {
                println!("{line}");
            }
            Ok(())
        }
    }
}

/// File first, then `AUTO_CORRECT_MODE`/`GITHUB_TOKEN`, then command-line
/// flags.
pub(crate) fn resolve_config<F>(
    cli: &Cli,
    config_path: &Path,
    home: &Path,
    lookup: F,
) -> Result<EngineConfig>
where
    F: Fn(&str) -> Option<String>,
{
    if cli.config.is_some() && !config_path.exists() {
        anyhow::bail!("config file not found: {}", config_path.display());
    }
    let mut config = EngineConfig::load(config_path, home)?;
    config.apply_env_overrides(lookup)?;
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }
    if let Some(retries) = cli.retries {
        config.retry.max_retries = retries;
    }
    Ok(config)
}

pub(crate) fn default_config_path(home: &Path) -> PathBuf {
    home.join(CONFIG_RELATIVE_PATH)
}

fn user_home() -> Result<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("HOME is not set; cannot locate provkit paths"))
}

/// Re-quotes argv words so the resolver sees the command the shell was given.
pub(crate) fn shell_command(words: Vec<String>) -> Result<String> {
    CommandLine::from_tokens(words)
        .map(|command| command.to_shell_string())
        .ok_or_else(|| anyhow!("no command given"))
}

fn terminal_decisions() -> impl OperatorDecisions {
    TerminalDecisions::new(std::io::stdin().lock(), std::io::stderr())
}

fn run_setup(engine: &Engine, style: OutputStyle, dry_run: bool, skip_tools: bool) -> Result<()> {
    ToolLayout::from_paths(&engine.config.paths).ensure_base_dirs()?;
    let provisioner = engine.provisioner(dry_run);
    provisioner.start_run();

    let tools = if skip_tools {
        ToolList::default()
    } else {
        engine.load_tools()?
    };
    for rejected in &tools.rejected {
        println!("{}", render_status_line(style, "warn", &rejected.to_string()));
    }

    // Prompts and a redrawn bar cannot share the terminal.
    let progress_style = match engine.config.mode {
        ResolutionMode::Silent => style,
        ResolutionMode::Ask | ResolutionMode::Interactive => OutputStyle::Plain,
    };
    let total = engine.config.setup_commands.len() + tools.sources.len();
    let mut progress = SetupProgress::start(progress_style, total as u64);
    let mut decisions = terminal_decisions();
    let mut summary = RunSummary::default();

    for raw in &engine.config.setup_commands {
        let outcome = provisioner.run_command(raw, &mut decisions);
        for line in format_item_lines(&outcome, style) {
            progress.println(&line);
        }
        progress.advance(raw, &outcome);
        summary.extend(outcome);
    }
    for source in &tools.sources {
        let outcome = provisioner.sync_tools(slice::from_ref(source));
        for line in format_item_lines(&outcome, style) {
            progress.println(&line);
        }
        progress.advance(&source.name, &outcome);
        summary.extend(outcome);
    }
    progress.finish();

    finish_summary(&summary, style, &engine.config.paths.log_file)
}

fn run_tools_command(
    engine: &Engine,
    style: OutputStyle,
    dry_run: bool,
    command: ToolsCommands,
) -> Result<()> {
    let list_path = &engine.config.paths.tool_list;
    match command {
        ToolsCommands::Sync => {
            let tools = engine.load_tools()?;
            for rejected in &tools.rejected {
                println!("{}", render_status_line(style, "warn", &rejected.to_string()));
            }
            ToolLayout::from_paths(&engine.config.paths).ensure_base_dirs()?;
            let provisioner = engine.provisioner(dry_run);
            provisioner.start_run();
            let summary = provisioner.sync_tools(&tools.sources);
            finish_summary(&summary, style, &engine.config.paths.log_file)
        }
        ToolsCommands::List => {
            let tools = engine.load_tools()?;
            if tools.sources.is_empty() {
                println!("No tools listed in {}", list_path.display());
            }
            for source in &tools.sources {
                println!("{} {} {}", source.name, source.kind.as_str(), source.locator);
            }
            for rejected in &tools.rejected {
                println!("{}", render_status_line(style, "warn", &rejected.to_string()));
            }
            Ok(())
        }
        ToolsCommands::Add { locator } => {
            let source = add_tool(list_path, &locator)
                .with_context(|| format!("failed to add tool to {}", list_path.display()))?;
            println!(
                "{}",
                render_status_line(
                    style,
                    "ok",
                    &format!("added {} ({})", source.name, source.kind.as_str())
                )
            );
            Ok(())
        }
    }
}

fn format_item_lines(summary: &RunSummary, style: OutputStyle) -> Vec<String> {
    let mut lines = format_summary_lines(summary, style);
    lines.pop();
    lines
}

fn finish_summary(summary: &RunSummary, style: OutputStyle, audit_log: &Path) -> Result<()> {
    for line in format_summary_lines(summary, style) {
        println!("{line}");
    }
    if summary.has_failures() {
        anyhow::bail!("some items failed; details in {}", audit_log.display());
    }
    Ok(())
}

fn search_lines(engine: &Engine, name: &str) -> Vec<String> {
    let hits = engine.packages.search_package(name);
    let mut lines = Vec::new();
    match choose_best(name, &hits, engine.config.package_cutoff) {
        Some(best) => lines.push(format!("best package match: {best}")),
        None => lines.push(format!("no close package match for {name}")),
    }

    let candidates = hits
        .into_iter()
        .map(Candidate::package)
        .chain(
            engine
                .code_host
                .search_code_host(name)
                .into_iter()
                .map(Candidate::code_host),
        )
        .collect::<Vec<_>>();
    lines.extend(
        candidates
            .iter()
            .enumerate()
            .map(|(offset, candidate)| format_candidate_line(offset + 1, candidate)),
    );
    lines
}

pub(crate) fn format_config_lines(config: &EngineConfig, config_path: &Path) -> Vec<String> {
    vec![
        format!("config: {}", config_path.display()),
        format!("mode: {}", config.mode.as_str()),
        format!(
            "retries: {} (backoff {}s, timeout {}s)",
            config.retry.max_retries,
            config.retry.base_backoff.as_secs(),
            config.retry.timeout.as_secs()
        ),
        format!("log: {}", config.paths.log_file.display()),
        format!("tools: {}", config.paths.tools_dir.display()),
        format!("tool list: {}", config.paths.tool_list.display()),
        format!("backups: {}", config.paths.backups_dir.display()),
        format!(
            "maintenance script: {}",
            config.paths.maintenance_script.display()
        ),
        format!("snapshots kept: {}", config.snapshot_keep),
        format!(
            "code host token: {}",
            if config.code_host.token.is_some() {
                "set"
            } else {
                "unset"
            }
        ),
    ]
}
