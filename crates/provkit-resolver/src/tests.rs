use super::*;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use provkit_core::{
    AuditLog, CommandLine, CommandOutput, CommandRunner, EngineConfig, ExecFailure,
    ResolutionMode,
};

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Default)]
struct FakePackages {
    results: HashMap<String, Vec<String>>,
    queries: RefCell<Vec<String>>,
}

impl FakePackages {
    fn with(mut self, name: &str, hits: &[&str]) -> Self {
        self.results.insert(
            name.to_string(),
            hits.iter().map(|hit| hit.to_string()).collect(),
        );
        self
    }
}

impl PackageSearch for FakePackages {
    fn search_package(&self, name: &str) -> Vec<String> {
        self.queries.borrow_mut().push(name.to_string());
        self.results.get(name).cloned().unwrap_or_default()
    }
}

#[derive(Default)]
struct FakeCodeHost {
    results: HashMap<String, Vec<CodeHostHit>>,
}

impl FakeCodeHost {
    fn with(mut self, query: &str, full_name: &str) -> Self {
        self.results
            .entry(query.to_string())
            .or_default()
            .push(hit(full_name));
        self
    }
}

impl CodeHostSearch for FakeCodeHost {
    fn search_code_host(&self, query: &str) -> Vec<CodeHostHit> {
        self.results.get(query).cloned().unwrap_or_default()
    }
}

struct ScriptedRunner {
    result: Result<CommandOutput, ExecFailure>,
    seen: RefCell<Vec<String>>,
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &CommandLine, _timeout: Duration) -> Result<CommandOutput, ExecFailure> {
        self.seen.borrow_mut().push(command.to_shell_string());
        self.result.clone()
    }
}

fn hit(full_name: &str) -> CodeHostHit {
    CodeHostHit {
        full_name: full_name.to_string(),
        html_url: format!("https://github.com/{full_name}"),
    }
}

fn corrector() -> TokenCorrector {
    TokenCorrector::new(Vocabulary::builtin(), 0.78)
}

fn parse(input: &str) -> CommandLine {
    CommandLine::parse(input).expect("command must parse")
}

fn prepare_ready(
    mode: ResolutionMode,
    packages: &FakePackages,
    code_host: &FakeCodeHost,
    audit: &AuditLog,
    raw: &str,
) -> PreparedCommand {
    let mut config = EngineConfig::with_home(&test_root());
    config.mode = mode;
    let corrector = corrector();
    let policy = ResolutionPolicy::new(&config, &corrector, packages, code_host, audit);
    match policy.prepare(raw) {
        Resolution::Ready(prepared) => prepared,
        Resolution::Pending(pending) => panic!("expected a ready command, got {pending:?}"),
    }
}

#[test]
fn correct_token_uses_typo_table_then_fuzzy_match() {
    let corrector = corrector();
    assert_eq!(corrector.correct_token("updata"), "update");
    assert_eq!(corrector.correct_token("nmpa"), "nmap");
    assert_eq!(corrector.correct_token("instll"), "install");
    assert_eq!(corrector.correct_token("wireshark"), "wireshark");
}

#[test]
fn correct_token_passes_uncorrectable_tokens_through() {
    let corrector = corrector();
    for token in ["-y", "--upgrade", "$HOME", "./instal", "instal=1", "&&", ""] {
        assert_eq!(corrector.correct_token(token), token);
        assert!(!is_correctable(token), "{token} should not be correctable");
    }
    assert!(is_correctable("nmap"));
}

#[test]
fn correct_command_only_touches_mistyped_tokens() {
    let corrected = corrector().correct_command(&parse("pkg install -y nmpa"));
    assert_eq!(corrected.to_shell_string(), "pkg install -y nmap");

    let corrected = corrector().correct_command(&parse("pkg updata && pkg upgarde -y"));
    assert_eq!(corrected.to_shell_string(), "pkg update && pkg upgrade -y");
}

#[test]
fn correct_command_is_a_fixed_point() {
    let corrector = corrector();
    let once = corrector.correct_command(&parse("pyhton -m pip instal colorama && gti clne x"));
    let twice = corrector.correct_command(&once);
    assert_eq!(once, twice);
}

#[test]
fn correct_command_leaves_unknown_commands_alone() {
    let command = parse("ls -la /data/data/com.termux/files");
    assert_eq!(corrector().correct_command(&command), command);
}

#[test]
fn correct_command_leaves_redirections_and_their_targets_alone() {
    let command = parse("gti clne repo > nmpa 2>&1");
    assert_eq!(
        corrector().correct_command(&command).to_shell_string(),
        "git clone repo > nmpa 2>&1"
    );
    assert!(!is_correctable(">>"));
    assert!(!is_correctable("2>&1"));
}

#[test]
fn correct_and_record_logs_only_changes() {
    let root = test_root();
    let audit = AuditLog::new(root.join("setup.log"), 1_000_000);
    let corrector = corrector();

    corrector.correct_and_record(&parse("pkg install git"), &audit);
    assert!(!audit.path().exists(), "unchanged command must not be logged");

    let corrected = corrector.correct_and_record(&parse("pkg instal nmpa"), &audit);
    assert_eq!(corrected.to_shell_string(), "pkg install nmap");
    let log = fs::read_to_string(audit.path()).expect("must read audit log");
    assert!(log.contains("[autocorrect] pkg instal nmpa -> pkg install nmap"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn choose_best_prefers_closest_candidate_above_cutoff() {
    let candidates = vec!["nmap".to_string(), "ncat".to_string()];
    assert_eq!(
        choose_best("nmpa", &candidates, 0.72),
        Some("nmap".to_string())
    );
    assert_eq!(choose_best("zzz", &[], 0.72), None);
    assert_eq!(choose_best("zzz", &candidates, 0.72), None);
}

#[test]
fn parse_search_output_takes_first_field_of_result_lines() {
    let stdout = "Sorting... Done\nFull Text Search... Done\n\
        nmap/stable 7.94 aarch64\n  Utility for network discovery\n\n\
        nmap-ncat/stable 7.94 aarch64\n  Netcat for the 21st century\n\
        nmap/stable 7.94 aarch64\n";
    assert_eq!(parse_search_output(stdout), vec!["nmap", "nmap-ncat"]);
    assert!(parse_search_output("").is_empty());
}

#[test]
fn package_index_runs_manager_search_and_swallows_failures() {
    let runner = ScriptedRunner {
        result: Ok(CommandOutput {
            stdout: "hydra/stable 9.5 aarch64\n".to_string(),
            stderr: String::new(),
        }),
        seen: RefCell::new(Vec::new()),
    };
    let index = PackageIndex::new(&runner, "pkg", Duration::from_secs(20));
    assert_eq!(index.search_package("hyrda"), vec!["hydra"]);
    assert_eq!(runner.seen.borrow().as_slice(), ["pkg search hyrda"]);

    let failing = ScriptedRunner {
        result: Err(ExecFailure::TimedOut {
            after: Duration::from_secs(20),
        }),
        seen: RefCell::new(Vec::new()),
    };
    let index = PackageIndex::new(&failing, "pkg", Duration::from_secs(20));
    assert!(index.search_package("hydra").is_empty());
}

#[test]
fn selection_parses_indices_ranges_and_keywords() {
    let selection = Selection::parse("1,3-4", 5);
    assert_eq!(selection.indices().collect::<Vec<_>>(), vec![1, 3, 4]);

    assert_eq!(Selection::parse("a", 3), Selection::all(3));
    assert_eq!(Selection::parse(" ALL ", 2), Selection::all(2));
    assert!(Selection::parse("q", 3).is_empty());
    assert!(Selection::parse("", 3).is_empty());
}

#[test]
fn selection_skips_out_of_range_and_garbage_parts() {
    let selection = Selection::parse("0,2,9,x,4-2,2-7", 4);
    assert_eq!(selection.indices().collect::<Vec<_>>(), vec![2, 3, 4]);
    assert!(selection.contains(3));
    assert!(!selection.contains(1));
}

#[test]
fn parse_search_page_skips_incomplete_items() {
    let body = r#"{
        "total_count": 3,
        "items": [
            {"full_name": "vanhauser-thc/thc-hydra", "html_url": "https://github.com/vanhauser-thc/thc-hydra"},
            {"full_name": "broken/item"},
            {"full_name": "acme/hydra-tools", "html_url": "https://github.com/acme/hydra-tools", "stargazers_count": 3}
        ]
    }"#;
    let hits = parse_search_page(body).expect("must parse page");
    assert_eq!(
        hits.iter().map(|hit| hit.full_name.as_str()).collect::<Vec<_>>(),
        vec!["vanhauser-thc/thc-hydra", "acme/hydra-tools"]
    );

    assert!(parse_search_page("{}").expect("must parse").is_empty());
    parse_search_page("<html>rate limited</html>").expect_err("must reject non-JSON");
}

#[test]
fn collect_pages_stops_on_short_page() {
    let mut requested = Vec::new();
    let hits = collect_pages(2, 10, |page| {
        requested.push(page);
        Ok(match page {
            1 => vec![hit("a/one"), hit("a/two")],
            2 => vec![hit("a/three")],
            _ => panic!("page {page} must not be requested"),
        })
    });
    assert_eq!(requested, vec![1, 2]);
    assert_eq!(hits.len(), 3);
}

#[test]
fn collect_pages_truncates_at_limit_and_dedups() {
    let hits = collect_pages(3, 4, |page| {
        Ok(vec![
            hit(&format!("p{page}/a")),
            hit("shared/repo"),
            hit(&format!("p{page}/b")),
        ])
    });
    assert_eq!(
        hits.iter().map(|hit| hit.full_name.as_str()).collect::<Vec<_>>(),
        vec!["p1/a", "shared/repo", "p1/b", "p2/a"]
    );
}

#[test]
fn collect_pages_keeps_hits_gathered_before_a_failure() {
    let hits = collect_pages(1, 10, |page| {
        if page == 3 {
            anyhow::bail!("403 rate limit exceeded");
        }
        Ok(vec![hit(&format!("repo/{page}"))])
    });
    assert_eq!(hits.len(), 2);
}

#[test]
fn silent_mode_substitutes_closest_package() {
    let root = test_root();
    let audit = AuditLog::new(root.join("setup.log"), 1_000_000);
    let packages = FakePackages::default().with("wireshrk", &["wireshark-gtk", "wireshark"]);

    let prepared = prepare_ready(
        ResolutionMode::Silent,
        &packages,
        &FakeCodeHost::default(),
        &audit,
        "pkg install -y wireshrk",
    );
    assert_eq!(
        prepared.command.expect("command").to_shell_string(),
        "pkg install -y wireshark"
    );
    assert!(prepared.clones.is_empty());
    let log = fs::read_to_string(audit.path()).expect("must read audit log");
    assert!(log.contains("[pkg-fix] pkg install -y wireshrk -> pkg install -y wireshark"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn silent_mode_leaves_redirection_targets_unsearched() {
    let root = test_root();
    let audit = AuditLog::new(root.join("setup.log"), 1_000_000);
    let packages = FakePackages::default().with("wireshrk", &["wireshark"]);

    let prepared = prepare_ready(
        ResolutionMode::Silent,
        &packages,
        &FakeCodeHost::default(),
        &audit,
        "pkg install wireshrk > wireshrk 2>&1",
    );
    assert_eq!(
        prepared.command.expect("command").to_shell_string(),
        "pkg install wireshark > wireshrk 2>&1"
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn silent_mode_keeps_token_that_is_itself_a_hit() {
    let root = test_root();
    let audit = AuditLog::new(root.join("setup.log"), 1_000_000);
    let packages = FakePackages::default().with("tshark", &["tshark-dev", "tshark"]);

    let prepared = prepare_ready(
        ResolutionMode::Silent,
        &packages,
        &FakeCodeHost::default(),
        &audit,
        "apt install tshark",
    );
    assert_eq!(
        prepared.command.expect("command").to_shell_string(),
        "apt install tshark"
    );
    assert!(!audit.path().exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn silent_mode_only_searches_install_arguments_of_package_managers() {
    let root = test_root();
    let audit = AuditLog::new(root.join("setup.log"), 1_000_000);
    let packages = FakePackages::default();

    prepare_ready(
        ResolutionMode::Silent,
        &packages,
        &FakeCodeHost::default(),
        &audit,
        "pip install colorama && pkg update -y && pkg install -y php",
    );
    assert_eq!(packages.queries.borrow().as_slice(), ["php"]);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn blank_input_prepares_nothing() {
    let root = test_root();
    let audit = AuditLog::new(root.join("setup.log"), 1_000_000);
    let prepared = prepare_ready(
        ResolutionMode::Interactive,
        &FakePackages::default(),
        &FakeCodeHost::default(),
        &audit,
        "   ",
    );
    assert_eq!(prepared, PreparedCommand::default());
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn ask_mode_waits_for_confirmation_of_a_correction() {
    let root = test_root();
    let audit = AuditLog::new(root.join("setup.log"), 1_000_000);
    let mut config = EngineConfig::with_home(&root);
    config.mode = ResolutionMode::Ask;
    let corrector = corrector();
    let packages = FakePackages::default().with("wireshrk", &["wireshark"]);
    let code_host = FakeCodeHost::default();
    let policy = ResolutionPolicy::new(&config, &corrector, &packages, &code_host, &audit);

    let Resolution::Pending(PendingDecision::Confirm(pending)) = policy.prepare("pkg instal wireshrk")
    else {
        panic!("expected a confirmation");
    };
    assert_eq!(pending.proposed.to_shell_string(), "pkg install wireshrk");
    assert!(
        !audit.path().exists(),
        "a proposal must not be logged before the operator answers"
    );

    let declined = policy.confirm(pending.clone(), false);
    assert_eq!(
        declined.command.expect("command").to_shell_string(),
        "pkg instal wireshrk"
    );
    let log = fs::read_to_string(audit.path()).expect("must read audit log");
    assert!(log.contains("[autocorrect] declined, keeping: pkg instal wireshrk"));
    assert!(!log.contains("[autocorrect] pkg instal wireshrk ->"));

    let accepted = policy.confirm(pending, true);
    assert_eq!(
        accepted.command.expect("command").to_shell_string(),
        "pkg install wireshark"
    );
    let log = fs::read_to_string(audit.path()).expect("must read audit log");
    assert!(log.contains("[autocorrect] pkg instal wireshrk -> pkg install wireshrk"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn ask_mode_without_corrections_is_ready_immediately() {
    let root = test_root();
    let audit = AuditLog::new(root.join("setup.log"), 1_000_000);
    let prepared = prepare_ready(
        ResolutionMode::Ask,
        &FakePackages::default(),
        &FakeCodeHost::default(),
        &audit,
        "pkg install git",
    );
    assert_eq!(
        prepared.command.expect("command").to_shell_string(),
        "pkg install git"
    );
    let _ = fs::remove_dir_all(&root);
}

fn interactive_fixture() -> (FakePackages, FakeCodeHost) {
    let packages = FakePackages::default().with("wireshrk", &["wireshark", "wireshark-gtk"]);
    let code_host = FakeCodeHost::default().with("wireshrk", "acme/wireshrk");
    (packages, code_host)
}

fn pending_selection(resolution: Resolution) -> PendingSelection {
    match resolution {
        Resolution::Pending(PendingDecision::Select(pending)) => pending,
        other => panic!("expected a selection, got {other:?}"),
    }
}

#[test]
fn interactive_mode_offers_packages_then_repositories() {
    let root = test_root();
    let audit = AuditLog::new(root.join("setup.log"), 1_000_000);
    let mut config = EngineConfig::with_home(&root);
    config.mode = ResolutionMode::Interactive;
    let corrector = corrector();
    let (packages, code_host) = interactive_fixture();
    let policy = ResolutionPolicy::new(&config, &corrector, &packages, &code_host, &audit);

    let pending = pending_selection(policy.prepare("pkg install -y wireshrk && echo done"));
    assert_eq!(pending.token, "wireshrk");
    assert_eq!(
        pending
            .candidates
            .iter()
            .map(|candidate| (candidate.source, candidate.identifier.as_str()))
            .collect::<Vec<_>>(),
        vec![
            (CandidateSource::PackageIndex, "wireshark"),
            (CandidateSource::PackageIndex, "wireshark-gtk"),
            (CandidateSource::CodeHost, "acme/wireshrk"),
        ]
    );

    let Resolution::Ready(prepared) = policy.select(pending, &Selection::parse("1,3", 3)) else {
        panic!("expected the walk to finish");
    };
    assert_eq!(
        prepared.command.expect("command").to_shell_string(),
        "pkg install -y wireshark && echo done"
    );
    assert_eq!(prepared.clones.len(), 1);
    assert_eq!(prepared.clones[0].locator, "https://github.com/acme/wireshrk");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn interactive_repository_only_choice_drops_the_install_segment() {
    let root = test_root();
    let audit = AuditLog::new(root.join("setup.log"), 1_000_000);
    let mut config = EngineConfig::with_home(&root);
    config.mode = ResolutionMode::Interactive;
    let corrector = corrector();
    let (packages, code_host) = interactive_fixture();
    let policy = ResolutionPolicy::new(&config, &corrector, &packages, &code_host, &audit);

    let pending = pending_selection(policy.prepare("pkg install -y wireshrk && echo done"));
    let Resolution::Ready(prepared) = policy.select(pending, &Selection::parse("3", 3)) else {
        panic!("expected the walk to finish");
    };
    assert_eq!(
        prepared.command.expect("command").to_shell_string(),
        "echo done"
    );
    assert_eq!(prepared.clones[0].identifier, "acme/wireshrk");

    let pending = pending_selection(policy.prepare("pkg install wireshrk"));
    let Resolution::Ready(prepared) = policy.select(pending, &Selection::parse("3", 3)) else {
        panic!("expected the walk to finish");
    };
    assert!(prepared.command.is_none());
    assert_eq!(prepared.clones.len(), 1);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn interactive_cancel_keeps_the_token() {
    let root = test_root();
    let audit = AuditLog::new(root.join("setup.log"), 1_000_000);
    let mut config = EngineConfig::with_home(&root);
    config.mode = ResolutionMode::Interactive;
    let corrector = corrector();
    let (packages, code_host) = interactive_fixture();
    let policy = ResolutionPolicy::new(&config, &corrector, &packages, &code_host, &audit);

    let pending = pending_selection(policy.prepare("pkg install wireshrk"));
    let Resolution::Ready(prepared) = policy.select(pending, &Selection::parse("q", 3)) else {
        panic!("expected the walk to finish");
    };
    assert_eq!(
        prepared.command.expect("command").to_shell_string(),
        "pkg install wireshrk"
    );
    assert!(prepared.clones.is_empty());
    let log = fs::read_to_string(audit.path()).expect("must read audit log");
    assert!(log.contains("[select] wireshrk: no selection, keeping it"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn interactive_walk_resumes_with_the_next_package() {
    let root = test_root();
    let audit = AuditLog::new(root.join("setup.log"), 1_000_000);
    let mut config = EngineConfig::with_home(&root);
    config.mode = ResolutionMode::Interactive;
    let corrector = corrector();
    let packages = FakePackages::default()
        .with("fooo", &["foo", "foo-utils"])
        .with("baar", &["bar"])
        .with("git", &["git", "git-lfs"]);
    let code_host = FakeCodeHost::default();
    let policy = ResolutionPolicy::new(&config, &corrector, &packages, &code_host, &audit);

    let first = pending_selection(policy.prepare("pkg install fooo git baar"));
    assert_eq!(first.token, "fooo");
    let second = pending_selection(policy.select(first, &Selection::parse("a", 2)));
    assert_eq!(second.token, "baar");
    let Resolution::Ready(prepared) = policy.select(second, &Selection::parse("1", 1)) else {
        panic!("expected the walk to finish");
    };
    assert_eq!(
        prepared.command.expect("command").to_shell_string(),
        "pkg install foo foo-utils git bar"
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn interactive_token_without_candidates_passes_through() {
    let root = test_root();
    let audit = AuditLog::new(root.join("setup.log"), 1_000_000);
    let prepared = prepare_ready(
        ResolutionMode::Interactive,
        &FakePackages::default(),
        &FakeCodeHost::default(),
        &audit,
        "pkg install zzzz",
    );
    assert_eq!(
        prepared.command.expect("command").to_shell_string(),
        "pkg install zzzz"
    );
    let _ = fs::remove_dir_all(&root);
}

fn test_root() -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after epoch")
        .as_nanos();
    let sequence = TEST_ROOT_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.push(format!(
        "provkit-resolver-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    path
}
