//! # Process Invoker
//!
//! Runs one external program with an argument vector and a wall-clock
//! deadline, capturing stdout and stderr separately.
//!
//! Every child is started in its own process group. When the deadline passes,
//! or when the future driving [`Invocation::run`] is dropped, the whole group
//! is killed, so helpers forked by the tool die with it. Output read before
//! the kill is kept and returned with [`InvocationOutcome::TimedOut`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use netprobe_common::InvocationOutcome;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

mod scope;

pub use scope::{ReleaseReport, StateScope};

const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);
const DEFAULT_OUTPUT_CAP: usize = 4 * 1024 * 1024;
/// How long to wait for pipe readers after the child is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

#[derive(Debug, Clone)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    deadline: Duration,
    accepted: Vec<i32>,
    output_cap: usize,
    privileged: bool,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            deadline: DEFAULT_DEADLINE,
            accepted: vec![0],
            output_cap: DEFAULT_OUTPUT_CAP,
            privileged: false,
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

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Exit codes that count as success. Defaults to `[0]`.
    pub fn accept_exit_codes(mut self, codes: &[i32]) -> Self {
        self.accepted = codes.to_vec();
        self
    }

    /// Maximum bytes kept per stream. Later output is read and discarded.
    pub fn output_cap(mut self, bytes: usize) -> Self {
        self.output_cap = bytes;
        self
    }

    /// Runs through `sudo -n` unless the current user is already root.
    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// The command as a user would type it, without any `sudo` prefix.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<&str>>()
            .join(" ")
    }

    fn argv(&self) -> (String, Vec<String>) {
        if self.privileged && !is_root::is_root() && locate("sudo").is_some() {
            let mut args: Vec<String> = vec!["-n".to_string(), self.program.clone()];
            args.extend(self.args.iter().cloned());
            ("sudo".to_string(), args)
        } else {
            (self.program.clone(), self.args.clone())
        }
    }

    pub async fn run(self) -> InvocationOutcome {
        // sudo hides a missing tool behind its own exit status
        if self.privileged && locate(&self.program).is_none() {
            return InvocationOutcome::ToolMissing {
                program: self.program,
            };
        }

        let (program, args) = self.argv();
        debug!(command = %self.command_line(), deadline = ?self.deadline, "spawning");

        let mut std_command = std::process::Command::new(&program);
        std_command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            std_command.process_group(0);
        }

        let mut command: Command = Command::from(std_command);
        command.kill_on_drop(true);

        let started: Instant = Instant::now();
        let mut child: Child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return InvocationOutcome::ToolMissing {
                    program: self.program,
                };
            }
            Err(e) => {
                return InvocationOutcome::ProcessError {
                    cause: format!("failed to start {}: {e}", self.program),
                    stdout: String::new(),
                    stderr: String::new(),
                };
            }
        };

        let mut group = GroupGuard::new(child.id());
        let stdout_buf: SharedBuffer = SharedBuffer::default();
        let stderr_buf: SharedBuffer = SharedBuffer::default();
        let readers: Vec<JoinHandle<()>> = [
            child.stdout.take().map(|pipe| spawn_reader(pipe, stdout_buf.clone(), self.output_cap)),
            child.stderr.take().map(|pipe| spawn_reader(pipe, stderr_buf.clone(), self.output_cap)),
        ]
        .into_iter()
        .flatten()
        .collect();

        let waited = tokio::time::timeout(self.deadline, child.wait()).await;

        match waited {
            Ok(Ok(status)) => {
                group.disarm();
                drain(readers).await;

                let stdout: String = snapshot(&stdout_buf);
                let stderr: String = snapshot(&stderr_buf);
                let exit_code: i32 = status.code().unwrap_or(-1);

                if self.accepted.contains(&exit_code) {
                    InvocationOutcome::Success {
                        stdout,
                        stderr,
                        exit_code,
                    }
                } else {
                    InvocationOutcome::ProcessError {
                        cause: exit_cause(&self.program, status.code(), &stderr),
                        stdout,
                        stderr,
                    }
                }
            }
            Ok(Err(e)) => {
                group.kill();
                InvocationOutcome::ProcessError {
                    cause: format!("failed waiting for {}: {e}", self.program),
                    stdout: snapshot(&stdout_buf),
                    stderr: snapshot(&stderr_buf),
                }
            }
            Err(_elapsed) => {
                warn!(program = %self.program, deadline = ?self.deadline, "deadline expired, killing process group");
                group.kill();
                if let Err(e) = child.kill().await {
                    debug!(program = %self.program, "kill after group kill: {e}");
                }
                drain(readers).await;

                InvocationOutcome::TimedOut {
                    stdout: snapshot(&stdout_buf),
                    stderr: snapshot(&stderr_buf),
                    after: started.elapsed(),
                }
            }
        }
    }
}

/// Kills the child's process group on drop unless disarmed.
struct GroupGuard {
    pgid: Option<u32>,
}

impl GroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; an already-gone group yields ESRCH.
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

fn spawn_reader<R>(mut pipe: R, buffer: SharedBuffer, cap: usize) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
                    let room: usize = cap.saturating_sub(buffer.len());
                    buffer.extend_from_slice(&chunk[..n.min(room)]);
                }
            }
        }
    })
}

async fn drain(readers: Vec<JoinHandle<()>>) {
    for reader in readers {
        let abort = reader.abort_handle();
        if tokio::time::timeout(DRAIN_GRACE, reader).await.is_err() {
            abort.abort();
        }
    }
}

fn snapshot(buffer: &SharedBuffer) -> String {
    let bytes = buffer.lock().unwrap_or_else(PoisonError::into_inner);
    String::from_utf8_lossy(&bytes).into_owned()
}

fn exit_cause(program: &str, code: Option<i32>, stderr: &str) -> String {
    let status: String = match code {
        Some(code) => format!("{program} exited with status {code}"),
        None => format!("{program} was terminated by a signal"),
    };
    match stderr.lines().map(str::trim).find(|line| !line.is_empty()) {
        Some(line) => format!("{status}: {line}"),
        None => status,
    }
}

/// Seam between probes and the operating system.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, invocation: Invocation) -> InvocationOutcome;
}

/// Spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl Runner for SystemRunner {
    async fn run(&self, invocation: Invocation) -> InvocationOutcome {
        invocation.run().await
    }
}

/// Finds `program` on `PATH`, the way a shell would.
pub fn locate(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = Path::new(program);
        return is_executable(path).then(|| path.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
