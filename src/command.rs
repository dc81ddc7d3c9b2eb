//! Command tokenization and child-process spawning.

use std::io::{BufReader, ChildStderr, ChildStdout};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use indexmap::IndexMap;
use nix::sys::signal::Signal;

use crate::error::ProcessManagerError;

/// Splits a command string on unquoted whitespace, honoring single and
/// double quotes. No backslash escapes, no environment expansion: a service
/// that needs shell semantics must invoke a shell explicitly as its first
/// token, e.g. `bash -c "..."`.
pub fn tokenize(cmd: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut has_token = false;

    for c in cmd.chars() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                has_token = true;
            }
            '"' if !in_single => {
                in_double = !in_double;
                has_token = true;
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        tokens.push(current);
    }

    tokens
}

/// Parses a POSIX signal name (`"SIGTERM"`, `"TERM"`, case-sensitive on the
/// canonical spelling) into a [`Signal`]. Unknown names fail with
/// `InvalidConfig`, since this is only ever called on configuration-sourced
/// strings.
pub fn parse_signal(name: &str) -> Result<Signal, ProcessManagerError> {
    let normalized = name.strip_prefix("SIG").unwrap_or(name);
    let signal = match normalized {
        "TERM" => Signal::SIGTERM,
        "KILL" => Signal::SIGKILL,
        "INT" => Signal::SIGINT,
        "HUP" => Signal::SIGHUP,
        "QUIT" => Signal::SIGQUIT,
        "USR1" => Signal::SIGUSR1,
        "USR2" => Signal::SIGUSR2,
        "ABRT" => Signal::SIGABRT,
        _ => {
            return Err(ProcessManagerError::InvalidConfig(format!(
                "unknown stop signal '{name}'"
            )))
        }
    };
    Ok(signal)
}

/// Sends a signal to `pid` by raw PID, independent of any owned [`Child`]
/// handle. A best-effort operation: `ESRCH` (already exited) is not an error.
pub fn send_signal(pid: u32, signal: Signal) -> Result<(), ProcessManagerError> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(ProcessManagerError::SamplerError(format!(
            "failed to signal pid {pid}: {e}"
        ))),
    }
}

/// Sends `SIGKILL` to `pid`, the hard-kill escalation signal.
pub fn send_hard_kill(pid: u32) -> Result<(), ProcessManagerError> {
    send_signal(pid, Signal::SIGKILL)
}

/// A running child process, along with the raw stdout/stderr handles for
/// the stream reader (component E) to consume.
pub struct SpawnedChild {
    pub pid: u32,
    child: Child,
    stdout: Option<BufReader<ChildStdout>>,
    stderr: Option<BufReader<ChildStderr>>,
}

impl SpawnedChild {
    /// Takes ownership of the stdout stream, for handing to a stream reader
    /// thread. Returns `None` if already taken.
    pub fn take_stdout(&mut self) -> Option<BufReader<ChildStdout>> {
        self.stdout.take()
    }

    /// Takes ownership of the stderr stream, for handing to a stream reader
    /// thread. Returns `None` if already taken.
    pub fn take_stderr(&mut self) -> Option<BufReader<ChildStderr>> {
        self.stderr.take()
    }

    /// Blocks until the child exits, returning its exit code (or a negative
    /// sentinel derived from the terminating signal number on POSIX).
    pub fn wait(&mut self) -> std::io::Result<Option<i32>> {
        let status = self.child.wait()?;
        Ok(exit_code_of(&status))
    }

    /// Non-blocking poll for exit, used by probe-timeout loops.
    pub fn try_wait(&mut self) -> std::io::Result<Option<i32>> {
        Ok(self.child.try_wait()?.and_then(|s| exit_code_of(&s)))
    }

    /// Hard-kills this child unconditionally (`SIGKILL`), for use where the
    /// caller already owns the `Child` (e.g. a healthcheck probe), rather
    /// than signaling by raw PID.
    pub fn kill_hard(&self) -> Result<(), ProcessManagerError> {
        send_hard_kill(self.pid)
    }
}

#[cfg(unix)]
fn exit_code_of(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|s| -s))
}

#[cfg(not(unix))]
fn exit_code_of(status: &std::process::ExitStatus) -> Option<i32> {
    status.code()
}

/// Tokenizes `cmd`, spawns it with the given working directory and merged
/// environment, and captures stdout/stderr via pipes. Stdin is closed.
pub fn spawn(
    service: &str,
    cmd: &str,
    cwd: &Path,
    env: &IndexMap<String, String>,
) -> Result<SpawnedChild, ProcessManagerError> {
    let tokens = tokenize(cmd);
    let (program, args) = tokens.split_first().ok_or_else(|| {
        ProcessManagerError::InvalidConfig(format!("empty command for service '{service}'"))
    })?;

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    command.env_clear();
    command.envs(std::env::vars());
    command.envs(env);

    let mut child = command
        .spawn()
        .map_err(|source| ProcessManagerError::SpawnError {
            service: service.to_string(),
            source,
        })?;

    let pid = child.id();
    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");

    Ok(SpawnedChild {
        pid,
        child,
        stdout: Some(BufReader::new(stdout)),
        stderr: Some(BufReader::new(stderr)),
    })
}
