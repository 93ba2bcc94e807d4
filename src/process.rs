//! Process invocation with an optional wall-clock deadline.
//!
//! [`Invocation`] replaces shell strings: control decisions are made on the
//! structured [`ProcessOutcome`] instead of raw exit codes. Stdin is always
//! closed. On Unix the child leads its own process group. Once the direct
//! child is reaped the whole group is killed, so nothing it spawned outlives
//! the run, and a timeout reaches grandchildren too.

use crate::error::{HarnessError, Result};
use parking_lot::Mutex;
use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Upper bound on the sleep between two `try_wait` polls.
const POLL_CEILING: Duration = Duration::from_millis(20);

/// Minimum time left for the pipes to drain after the child is reaped.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// What happens to one output stream of the child.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Capture {
    /// Collect the stream into the outcome.
    #[default]
    Piped,
    /// Send the stream to the null device.
    Discard,
}

impl Capture {
    fn stdio(self) -> Stdio {
        match self {
            Self::Piped => Stdio::piped(),
            Self::Discard => Stdio::null(),
        }
    }
}

/// A program, its arguments and how to run it.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    stdout: Capture,
    stderr: Capture,
    timeout: Option<Duration>,
}

impl Invocation {
    /// Starts an invocation of `program` with both streams piped and no deadline.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            current_dir: None,
            stdout: Capture::Piped,
            stderr: Capture::Piped,
            timeout: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Sets stdout handling.
    #[must_use]
    pub const fn stdout(mut self, capture: Capture) -> Self {
        self.stdout = capture;
        self
    }

    /// Sets stderr handling.
    #[must_use]
    pub const fn stderr(mut self, capture: Capture) -> Self {
        self.stderr = capture;
        self
    }

    /// Kills the process (group) once `limit` of wall-clock time has passed.
    #[must_use]
    pub const fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Program as given, for diagnostics.
    #[must_use]
    pub fn program_display(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Full command line, lossily rendered, for logs.
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut line = self.program_display();
        for arg in &self.args {
            line.push(' ');
            let arg = arg.to_string_lossy();
            if arg.contains(char::is_whitespace) || arg.is_empty() {
                line.push('\'');
                line.push_str(&arg.replace('\'', r"'\''"));
                line.push('\'');
            } else {
                line.push_str(&arg);
            }
        }
        line
    }

    /// Runs to completion or until the deadline, whichever comes first.
    ///
    /// Only failure to spawn or wait is an error; a non-zero exit, a signal
    /// or a timeout are all reported through [`ProcessOutcome`].
    pub fn run(&self) -> Result<ProcessOutcome> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(self.stdout.stdio())
            .stderr(self.stderr.stdio());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        tracing::debug!(command = %self.command_line(), timeout = ?self.timeout, "spawning");
        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| self.process_error(source))?;
        let stdout = child.stdout.take().map(Drain::spawn);
        let stderr = child.stderr.take().map(Drain::spawn);

        let waited = match self.timeout {
            Some(limit) => wait_with_deadline(&mut child, started + limit),
            None => child.wait().map(|status| (status, false)),
        };
        let (status, timed_out) = match waited {
            Ok(waited) => waited,
            Err(source) => {
                terminate(&mut child);
                return Err(self.process_error(source));
            }
        };
        let elapsed = started.elapsed();
        // Background descendants would otherwise keep the pipes open.
        kill_group(&child);

        let drain_deadline = self
            .timeout
            .map(|limit| (started + limit).max(Instant::now()) + DRAIN_GRACE);
        let outcome = ProcessOutcome {
            exit_code: status.code(),
            signal: exit_signal(status),
            stdout: Drain::collect(stdout, drain_deadline),
            stderr: Drain::collect(stderr, drain_deadline),
            timed_out,
            elapsed,
        };
        tracing::debug!(
            program = %self.program_display(),
            status = %outcome.status_label(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "process finished"
        );
        Ok(outcome)
    }

    fn process_error(&self, source: std::io::Error) -> HarnessError {
        HarnessError::Process {
            program: self.program_display(),
            source,
        }
    }
}

/// Structured result of one [`Invocation::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code, absent when the process died from a signal.
    pub exit_code: Option<i32>,
    /// Terminating signal on Unix.
    pub signal: Option<i32>,
    /// Captured stdout (empty when discarded).
    pub stdout: Vec<u8>,
    /// Captured stderr (empty when discarded).
    pub stderr: Vec<u8>,
    /// True when the harness killed the process at the deadline.
    pub timed_out: bool,
    /// Wall-clock time from spawn to reap.
    pub elapsed: Duration,
}

impl ProcessOutcome {
    /// Exited on its own with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// `status N`, `signal N` or `timeout`.
    #[must_use]
    pub fn status_label(&self) -> String {
        if self.timed_out {
            return "timeout".to_string();
        }
        match (self.exit_code, self.signal) {
            (Some(code), _) => format!("status {code}"),
            (None, Some(signal)) => format!("signal {signal}"),
            (None, None) => "unknown status".to_string(),
        }
    }

    /// Stderr as lossy UTF-8, for error messages.
    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

fn wait_with_deadline(child: &mut Child, deadline: Instant) -> std::io::Result<(ExitStatus, bool)> {
    let mut backoff = Duration::from_millis(1);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        let now = Instant::now();
        if now >= deadline {
            tracing::debug!(pid = child.id(), "deadline reached, killing");
            terminate(child);
            let status = child.wait()?;
            return Ok((status, true));
        }
        thread::sleep(backoff.min(deadline - now));
        backoff = (backoff * 2).min(POLL_CEILING);
    }
}

fn terminate(child: &mut Child) {
    kill_group(child);
    let _ = child.kill();
}

/// SIGKILLs the process group led by `child`. The group may already be gone.
#[cfg(unix)]
fn kill_group(child: &Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if let Ok(raw) = i32::try_from(child.id()) {
        let _ = killpg(Pid::from_raw(raw), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}

/// Reader thread for one pipe. Bytes land in a shared buffer as they
/// arrive, so a drain that never reaches EOF still yields what was read.
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<()>,
}

impl Drain {
    fn spawn<R: Read + Send + 'static>(mut pipe: R) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let handle = thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink.lock().extend_from_slice(&chunk[..n]),
                }
            }
        });
        Self { buf, handle }
    }

    /// Waits for EOF, at most until `deadline`. A reader still blocked past
    /// the deadline is detached.
    fn collect(drain: Option<Self>, deadline: Option<Instant>) -> Vec<u8> {
        let Some(drain) = drain else {
            return Vec::new();
        };
        if let Some(deadline) = deadline {
            while !drain.handle.is_finished() && Instant::now() < deadline {
                thread::sleep(POLL_CEILING.min(deadline.saturating_duration_since(Instant::now())));
            }
            if !drain.handle.is_finished() {
                tracing::debug!("output pipe still open after the deadline, detaching reader");
                return std::mem::take(&mut *drain.buf.lock());
            }
        }
        let _ = drain.handle.join();
        std::mem::take(&mut *drain.buf.lock())
    }
}
