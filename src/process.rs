//! Subprocess runner for jj
//!
//! Runs the binary either to completion (captured output, optional timeout) or
//! as a live stream of UTF-8 stdout chunks.

use crate::error::JjError;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const READ_BUFFER: usize = 8192;

/// Options for a single invocation
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub cwd: Option<PathBuf>,
    /// Added on top of the inherited environment
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

/// Captured result of a finished process
#[derive(Debug, Clone)]
pub struct ExecuteOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecuteOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// How a streamed process ended
#[derive(Debug, Clone)]
pub struct StreamExit {
    pub stderr: String,
    pub exit_code: i32,
}

/// A source of stdout text chunks.
///
/// Chunks never split a UTF-8 sequence but may split lines anywhere.
pub trait ChunkSource: Send {
    /// Next chunk, or `None` once stdout is exhausted.
    fn next_chunk(&mut self) -> Result<Option<String>, JjError>;

    /// Wait for the process and report stderr and the exit code.
    fn finish(self: Box<Self>) -> Result<StreamExit, JjError>;
}

/// Spawns one program (normally `jj`) with different argument vectors
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run to completion and capture output.
    ///
    /// With a timeout the child is killed on expiry and `JjError::TimedOut`
    /// is returned instead of a partial result.
    pub fn execute(&self, args: &[String], options: &ExecuteOptions) -> Result<ExecuteOutput, JjError> {
        let started = Instant::now();
        let mut child = self.spawn(args, options)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match options.timeout {
            None => child.wait()?,
            Some(limit) => match wait_until(&mut child, started + limit)? {
                Some(status) => status,
                None => {
                    if let Err(err) = child.kill() {
                        warn!(%err, "failed to kill timed out process");
                    }
                    let _ = child.wait();
                    return Err(JjError::TimedOut {
                        command: command_name(args),
                        after: limit,
                    });
                }
            },
        };

        let output = ExecuteOutput {
            stdout: collect(stdout),
            stderr: collect(stderr),
            exit_code: exit_code(status),
        };
        debug!(
            command = %command_name(args),
            exit_code = output.exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "process finished"
        );
        Ok(output)
    }

    /// Spawn and hand back stdout as a chunk stream.
    pub fn stream(&self, args: &[String], options: &ExecuteOptions) -> Result<ProcessChunks, JjError> {
        let mut child = self.spawn(args, options)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdout was not captured"))?;
        let stderr = drain(child.stderr.take());
        Ok(ProcessChunks {
            command: command_name(args),
            child,
            stdout,
            stderr,
            pending: Vec::new(),
        })
    }

    fn spawn(&self, args: &[String], options: &ExecuteOptions) -> Result<Child, JjError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        debug!(program = %self.program, ?args, "spawning");
        cmd.spawn().map_err(|source| JjError::Spawn {
            program: self.program.clone(),
            source,
        })
    }
}

/// Live stdout of a spawned process
pub struct ProcessChunks {
    command: String,
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<Vec<u8>>>,
    /// Bytes of an incomplete UTF-8 sequence carried to the next read
    pending: Vec<u8>,
}

impl ChunkSource for ProcessChunks {
    fn next_chunk(&mut self) -> Result<Option<String>, JjError> {
        let mut buf = [0u8; READ_BUFFER];
        loop {
            let n = match self.stdout.read(&mut buf) {
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };

            if n == 0 {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let rest = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                return Ok(Some(rest));
            }

            self.pending.extend_from_slice(&buf[..n]);
            let text = take_utf8_prefix(&mut self.pending);
            if !text.is_empty() {
                return Ok(Some(text));
            }
        }
    }

    fn finish(mut self: Box<Self>) -> Result<StreamExit, JjError> {
        let status = self.child.wait()?;
        let exit = StreamExit {
            stderr: collect(self.stderr.take()),
            exit_code: exit_code(status),
        };
        debug!(command = %self.command, exit_code = exit.exit_code, "stream finished");
        Ok(exit)
    }
}

/// Split off the longest valid UTF-8 prefix, keeping a trailing incomplete
/// sequence in `pending`. Invalid bytes in the middle are replaced.
pub(crate) fn take_utf8_prefix(pending: &mut Vec<u8>) -> String {
    let cut = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(err) if err.error_len().is_none() => err.valid_up_to(),
        Err(_) => pending.len(),
    };
    let rest = pending.split_off(cut);
    let text = String::from_utf8_lossy(pending).into_owned();
    *pending = rest;
    text
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn command_name(args: &[String]) -> String {
    args.first().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_prefix_keeps_incomplete_sequence() {
        let bytes = "héllo".as_bytes();
        // split inside the two-byte 'é'
        let mut pending = bytes[..2].to_vec();
        assert_eq!(take_utf8_prefix(&mut pending), "h");
        assert_eq!(pending, vec![0xC3]);

        pending.extend_from_slice(&bytes[2..]);
        assert_eq!(take_utf8_prefix(&mut pending), "éllo");
        assert!(pending.is_empty());
    }

    #[test]
    fn test_utf8_prefix_replaces_invalid_bytes() {
        let mut pending = vec![b'a', 0xFF, b'b'];
        assert_eq!(take_utf8_prefix(&mut pending), "a\u{FFFD}b");
        assert!(pending.is_empty());
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let runner = ProcessRunner::new("jjdeck-definitely-not-a-real-binary");
        let err = runner
            .execute(&["log".to_string()], &ExecuteOptions::default())
            .unwrap_err();
        assert!(matches!(err, JjError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_captures_output() {
        let runner = ProcessRunner::new("sh");
        let args = vec!["-c".to_string(), "printf out; printf err >&2; exit 3".to_string()];
        let output = runner.execute(&args, &ExecuteOptions::default()).unwrap();
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_timeout_kills_child() {
        let runner = ProcessRunner::new("sh");
        let args = vec!["-c".to_string(), "sleep 5".to_string()];
        let options = ExecuteOptions {
            timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let started = Instant::now();
        let err = runner.execute(&args, &options).unwrap_err();
        assert!(matches!(err, JjError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_stream_yields_all_stdout() {
        let runner = ProcessRunner::new("sh");
        let args = vec!["-c".to_string(), "printf 'a\\nb\\n'; printf 'c'".to_string()];
        let mut chunks: Box<dyn ChunkSource> =
            Box::new(runner.stream(&args, &ExecuteOptions::default()).unwrap());
        let mut text = String::new();
        while let Some(chunk) = chunks.next_chunk().unwrap() {
            text.push_str(&chunk);
        }
        let exit = chunks.finish().unwrap();
        assert_eq!(text, "a\nb\nc");
        assert_eq!(exit.exit_code, 0);
    }
}
