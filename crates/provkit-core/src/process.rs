use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::{CommandLine, ExecFailure};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_TAIL_CHARS: usize = 400;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs one external command to completion or until `timeout` elapses.
///
/// The engine never spawns processes directly; tests substitute scripted
/// runners through this seam.
pub trait CommandRunner {
    fn run(&self, command: &CommandLine, timeout: Duration) -> Result<CommandOutput, ExecFailure>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, command: &CommandLine, timeout: Duration) -> Result<CommandOutput, ExecFailure> {
        (**self).run(command, timeout)
    }
}

/// Hands the serialized command to a shell interpreter such as `bash -lc`.
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    interpreter: Vec<String>,
}

impl SystemCommandRunner {
    pub fn new(interpreter: Vec<String>) -> Self {
        Self { interpreter }
    }

    pub fn interpreter(&self) -> &[String] {
        &self.interpreter
    }
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::new(vec!["bash".to_string(), "-lc".to_string()])
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, command: &CommandLine, timeout: Duration) -> Result<CommandOutput, ExecFailure> {
        let Some((program, leading_args)) = self.interpreter.split_first() else {
            return Err(ExecFailure::Launch {
                reason: "no command interpreter configured".to_string(),
            });
        };

        let script = command.to_shell_string();
        tracing::trace!("exec: {program} {} {script}", leading_args.join(" "));
        let mut child = Command::new(program)
            .args(leading_args)
            .arg(&script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ExecFailure::Launch {
                reason: format!("{program}: {err}"),
            })?;

        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let started_at = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if started_at.elapsed() >= timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        // Readers are left detached; a surviving grandchild may
                        // still hold the pipes open.
                        return Err(ExecFailure::TimedOut { after: timeout });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err) => {
                    let _ = child.kill();
                    return Err(ExecFailure::Launch {
                        reason: format!("failed waiting on {program}: {err}"),
                    });
                }
            }
        };

        let stdout = join_reader(stdout_reader);
        let stderr = join_reader(stderr_reader);
        if status.success() {
            return Ok(CommandOutput { stdout, stderr });
        }

        Err(ExecFailure::NonZeroExit {
            code: status.code().unwrap_or(-1),
            stderr: stderr_tail(&stderr),
        })
    }
}

fn spawn_reader<S>(stream: Option<S>) -> Option<JoinHandle<String>>
where
    S: Read + Send + 'static,
{
    stream.map(|mut stream| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = stream.read_to_end(&mut buffer);
            String::from_utf8_lossy(&buffer).into_owned()
        })
    })
}

fn join_reader(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - STDERR_TAIL_CHARS).collect();
    format!("...{tail}")
}
