use super::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use provkit_core::EngineError;

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

#[test]
fn parse_recognizes_every_locator_prefix() {
    let list = parse_tool_list(
        "# header\n\
         \n\
         https://github.com/vanhauser-thc/thc-hydra.git\n\
         git+https://github.com/sqlmapproject/sqlmap\n\
         url+https://example.com/scripts/scan.sh?raw=1\n\
         gist+3b1f0c2d9e\n\
         gist+https://gist.github.com/someone/a1b2c3.git\n",
    );
    assert!(list.rejected.is_empty());
    let summary = list
        .sources
        .iter()
        .map(|source| (source.kind, source.name.as_str(), source.locator.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        summary,
        vec![
            (
                ToolSourceKind::Git,
                "thc-hydra",
                "https://github.com/vanhauser-thc/thc-hydra.git"
            ),
            (
                ToolSourceKind::Git,
                "sqlmap",
                "https://github.com/sqlmapproject/sqlmap"
            ),
            (
                ToolSourceKind::Url,
                "scan",
                "https://example.com/scripts/scan.sh?raw=1"
            ),
            (
                ToolSourceKind::Gist,
                "3b1f0c2d9e",
                "https://gist.github.com/3b1f0c2d9e.git"
            ),
            (
                ToolSourceKind::Gist,
                "a1b2c3",
                "https://gist.github.com/someone/a1b2c3.git"
            ),
        ]
    );
    assert_eq!(list.sources[2].download_file_name(), "scan.sh");
}

#[test]
fn parse_reports_invalid_lines_and_keeps_the_rest() {
    let list = parse_tool_list(
        "git+\n\
         https://github.com/owner/repo\n\
         url+not-a-url\n\
         https://github.com/owner/..\n\
         two words\n",
    );
    assert_eq!(list.sources.len(), 1);
    assert_eq!(list.sources[0].name, "repo");

    let lines = list
        .rejected
        .iter()
        .map(|err| match err {
            EngineError::InvalidToolSource { line, .. } => *line,
            other => panic!("unexpected error: {other}"),
        })
        .collect::<Vec<_>>();
    assert_eq!(lines, vec![1, 3, 4, 5]);
    assert_eq!(list.rejected[0].kind(), "invalid-tool-source");
}

#[test]
fn scp_style_locator_derives_repository_name() {
    let source = ToolSource::parse(1, "git@github.com:owner/tool.git").expect("must parse");
    assert_eq!(source.kind, ToolSourceKind::Git);
    assert_eq!(source.name, "tool");
    assert!(source.kind.is_checkout());
}

#[test]
fn load_missing_tool_list_is_empty() {
    let root = test_root();
    let list = load_tool_list(&root.join("tools-list.txt")).expect("missing list is empty");
    assert_eq!(list, ToolList::default());
}

#[test]
fn add_tool_creates_file_with_header_then_appends() {
    let root = test_root();
    let path = root.join("nested").join("tools-list.txt");

    let first = add_tool(&path, "https://github.com/owner/first").expect("must add first");
    assert_eq!(first.name, "first");
    add_tool(&path, "url+https://example.com/get.sh").expect("must add second");

    let content = fs::read_to_string(&path).expect("must read list");
    assert!(content.starts_with(TOOL_LIST_HEADER));
    assert!(content.ends_with("https://github.com/owner/first\nurl+https://example.com/get.sh\n"));

    let list = load_tool_list(&path).expect("must load list");
    assert_eq!(list.sources.len(), 2);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn add_tool_rejects_duplicates_and_invalid_locators() {
    let root = test_root();
    let path = root.join("tools-list.txt");
    fs::create_dir_all(&root).expect("must create root");
    fs::write(&path, "https://github.com/owner/tool").expect("must seed list");

    let err = add_tool(&path, "git+https://example.org/mirror/tool.git")
        .expect_err("duplicate name must fail");
    assert!(err.to_string().contains("already listed"));

    let err = add_tool(&path, "url+ftp-less").expect_err("invalid locator must fail");
    assert!(err.to_string().contains("is not a URL"));

    add_tool(&path, "https://github.com/owner/other").expect("must add");
    let content = fs::read_to_string(&path).expect("must read list");
    assert_eq!(
        content,
        "https://github.com/owner/tool\nhttps://github.com/owner/other\n"
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn git_commands_are_shallow_and_fast_forward_only() {
    let clone = clone_command(
        "https://github.com/owner/tool",
        Path::new("/data/home/tools/tool"),
    );
    assert_eq!(
        clone.to_shell_string(),
        "env GIT_TERMINAL_PROMPT=0 git -c core.autocrlf=false clone --depth 1 -- \
         https://github.com/owner/tool /data/home/tools/tool"
    );

    let pull = pull_command(Path::new("/data/home/tools/tool"));
    assert_eq!(
        pull.to_shell_string(),
        "env GIT_TERMINAL_PROMPT=0 git -c core.autocrlf=false -C /data/home/tools/tool pull --ff-only"
    );
}

#[test]
fn download_command_writes_into_the_tool_directory() {
    let command = download_command(
        "https://example.com/get.sh",
        Path::new("/data/home/tools/get/get.sh"),
    );
    assert_eq!(
        command.to_shell_string(),
        "curl -fsSL --create-dirs -o /data/home/tools/get/get.sh https://example.com/get.sh"
    );
}

#[test]
fn git_checkout_is_detected_by_dot_git() {
    let root = test_root();
    let tool = root.join("tool");
    fs::create_dir_all(&tool).expect("must create tool dir");
    assert!(!is_git_checkout(&tool));
    fs::create_dir_all(tool.join(".git")).expect("must create .git");
    assert!(is_git_checkout(&tool));

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
        "provkit-registry-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    path
}
