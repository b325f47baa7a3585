use std::path::Path;

use provkit_core::CommandLine;

pub const GIST_HOST: &str = "https://gist.github.com";

// git must never stop on a credential prompt; an unreachable or private remote
// has to fail so the executor can retry it.
fn base_git_command() -> CommandLine {
    CommandLine::new("env")
        .arg("GIT_TERMINAL_PROMPT=0")
        .arg("git")
        .args(["-c", "core.autocrlf=false"])
}

pub fn clone_command(location: &str, destination: &Path) -> CommandLine {
    base_git_command()
        .args(["clone", "--depth", "1", "--"])
        .arg(location)
        .arg(destination.to_string_lossy())
}

pub fn pull_command(repo_root: &Path) -> CommandLine {
    base_git_command()
        .arg("-C")
        .arg(repo_root.to_string_lossy())
        .args(["pull", "--ff-only"])
}

pub fn download_command(url: &str, destination_file: &Path) -> CommandLine {
    CommandLine::new("curl")
        .arg("-fsSL")
        .arg("--create-dirs")
        .arg("-o")
        .arg(destination_file.to_string_lossy())
        .arg(url)
}

pub fn is_git_checkout(dir: &Path) -> bool {
    dir.join(".git").exists()
}
