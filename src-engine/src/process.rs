//! Supervised execution of external tools.
//!
//! ffmpeg and whisper-cli both report progress on their output streams while
//! running. This module spawns a tool, delivers its output line by line as it
//! arrives, keeps a bounded tail for error reports, and stops the child when
//! the run's cancellation token fires.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ProcessError;

/// How long a terminated child gets to exit before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(3);

/// Which output stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Result of a tool that ran to completion (successfully or not).
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    /// Last few characters of combined output
    pub tail: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Human-readable exit description, e.g. `ffmpeg exited with code 1`.
    pub fn describe_exit(&self, program: &str) -> String {
        match self.status.code() {
            Some(code) => format!("{} exited with code {}", program, code),
            None => format!("{} was terminated by a signal", program),
        }
    }
}

/// Splits a byte stream into lines on either `\n` or `\r`.
///
/// ffmpeg rewrites its status line in place with carriage returns, so both
/// count as terminators. Empty lines are skipped.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                self.take_line(&mut lines);
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Flush whatever is left after end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let mut lines = Vec::new();
        self.take_line(&mut lines);
        lines.pop()
    }

    fn take_line(&mut self, lines: &mut Vec<String>) {
        if self.pending.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        lines.push(line);
    }
}

/// Bounded buffer of the most recent output characters.
#[derive(Debug)]
pub struct OutputTail {
    limit: usize,
    text: String,
}

impl OutputTail {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            text: String::new(),
        }
    }

    pub fn push_line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');

        let excess = self.text.chars().count().saturating_sub(self.limit);
        if excess > 0 {
            let cut = self
                .text
                .char_indices()
                .nth(excess)
                .map(|(idx, _)| idx)
                .unwrap_or(self.text.len());
            self.text.drain(..cut);
        }
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

async fn pump<R>(mut reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::new();
    let mut buf = [0u8; 8192];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in splitter.push(&buf[..n]) {
                    if tx.send((stream, line)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                debug!("Output stream read error: {}", e);
                break;
            }
        }
    }

    if let Some(line) = splitter.finish() {
        let _ = tx.send((stream, line));
    }
}

/// Ask the child to exit, then wait for it.
///
/// On Unix this sends SIGTERM so the tool can clean up its own output, and
/// kills the child if it is still running after [`TERMINATE_GRACE`]. On
/// other platforms the child is killed outright.
async fn terminate(child: &mut Child, program: &str) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: pid belongs to a child we spawned and have not yet reaped
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc != 0 {
                warn!("Failed to send SIGTERM to {} (pid {})", program, pid);
                let _ = child.start_kill();
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = child.start_kill() {
            warn!("Failed to kill {}: {}", program, e);
        }
    }

    match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("Failed to reap {} after cancellation: {}", program, e),
        Err(_) => {
            warn!("{} ignored termination, killing it", program);
            if let Err(e) = child.kill().await {
                warn!("Failed to kill {}: {}", program, e);
            }
        }
    }
}

/// Build a command for an external tool with piped output and no stdin.
pub fn tool_command<I, S>(program: &Path, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(windows)]
    {
        // CREATE_NO_WINDOW
        command.creation_flags(0x0800_0000);
    }

    command
}

/// Run a command to completion, handing each output line to `on_line`.
///
/// Returns [`ProcessError::Cancelled`] if `token` fires first; the child has
/// been terminated and reaped by the time this returns.
pub async fn run_streaming<F>(
    mut command: Command,
    program: &str,
    token: &CancellationToken,
    tail_limit: usize,
    mut on_line: F,
) -> Result<ProcessOutput, ProcessError>
where
    F: FnMut(Stream, &str),
{
    if token.is_cancelled() {
        return Err(ProcessError::Cancelled);
    }

    debug!("Running {}: {:?}", program, command.as_std());

    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump(stdout, Stream::Stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump(stderr, Stream::Stderr, tx.clone()));
    }
    drop(tx);

    let mut tail = OutputTail::new(tail_limit);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Cancelling {}", program);
                terminate(&mut child, program).await;
                return Err(ProcessError::Cancelled);
            }
            next = rx.recv() => match next {
                Some((stream, line)) => {
                    tail.push_line(&line);
                    on_line(stream, &line);
                }
                None => break,
            }
        }
    }

    let status = tokio::select! {
        biased;
        _ = token.cancelled() => {
            terminate(&mut child, program).await;
            return Err(ProcessError::Cancelled);
        }
        status = child.wait() => status.map_err(|source| ProcessError::Wait {
            program: program.to_string(),
            source,
        })?,
    };

    debug!("{} finished with {}", program, status);

    Ok(ProcessOutput {
        status,
        tail: tail.into_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splitter_handles_cr_and_lf() {
        let mut splitter = LineSplitter::new();
        let mut lines = splitter.push(b"size=1 time=00:00:01.00\rsize=2 time=00:00:02.00\r\nDur");
        lines.extend(splitter.push(b"ation: 00:10:00.00\n"));
        assert_eq!(
            lines,
            vec![
                "size=1 time=00:00:01.00",
                "size=2 time=00:00:02.00",
                "Duration: 00:10:00.00"
            ]
        );
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_splitter_flushes_remainder() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.push(b"progress = 50%").is_empty());
        assert_eq!(splitter.finish().as_deref(), Some("progress = 50%"));
    }

    #[test]
    fn test_tail_keeps_most_recent_chars() {
        let mut tail = OutputTail::new(10);
        tail.push_line("first line");
        tail.push_line("last");
        let text = tail.into_string();
        assert_eq!(text.chars().count(), 10);
        assert!(text.ends_with("last\n"));
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        let mut tail = OutputTail::new(4);
        tail.push_line("héllo");
        assert_eq!(tail.into_string(), "llo\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_streaming_collects_both_streams() {
        let command = tool_command(
            Path::new("/bin/sh"),
            ["-c", "echo out1; echo err1 >&2; printf 'a\\rb\\n'; exit 3"],
        );
        let token = CancellationToken::new();
        let mut lines = Vec::new();

        let output = run_streaming(command, "sh", &token, 1000, |stream, line| {
            lines.push((stream, line.to_string()));
        })
        .await
        .expect("process runs");

        assert!(!output.success());
        assert_eq!(output.describe_exit("sh"), "sh exited with code 3");
        assert!(lines.contains(&(Stream::Stdout, "out1".to_string())));
        assert!(lines.contains(&(Stream::Stderr, "err1".to_string())));
        assert!(lines.contains(&(Stream::Stdout, "a".to_string())));
        assert!(lines.contains(&(Stream::Stdout, "b".to_string())));
        assert!(output.tail.contains("err1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_streaming_cancellation_terminates_child() {
        let command = tool_command(Path::new("/bin/sh"), ["-c", "echo started; sleep 30"]);
        let token = CancellationToken::new();
        let canceller = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let result = run_streaming(command, "sh", &token, 100, |_, _| {}).await;

        assert!(matches!(result, Err(ProcessError::Cancelled)));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_kills_child_ignoring_sigterm() {
        let command = tool_command(
            Path::new("/bin/sh"),
            ["-c", "trap '' TERM; echo started; exec sleep 30"],
        );
        let token = CancellationToken::new();
        let canceller = token.clone();

        let run = run_streaming(command, "sh", &token, 100, move |_, line| {
            if line == "started" {
                canceller.cancel();
            }
        });
        let result = tokio::time::timeout(std::time::Duration::from_secs(10), run)
            .await
            .expect("cancellation did not settle");

        assert!(matches!(result, Err(ProcessError::Cancelled)));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let command = tool_command(Path::new("/nonexistent/subforge-tool"), ["--version"]);
        let token = CancellationToken::new();
        let result = run_streaming(command, "subforge-tool", &token, 100, |_, _| {}).await;
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }
}
