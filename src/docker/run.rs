use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One invocation of the docker CLI.
#[derive(Debug, Clone)]
pub struct DockerCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Bytes fed to the child's stdin, which is closed afterwards.
    pub stdin: Option<Vec<u8>>,
    /// The child is killed if it is still running at this instant.
    pub deadline: Option<Instant>,
}

impl DockerCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            stdin: None,
            deadline: None,
        }
    }

    pub fn stdin(mut self, bytes: Vec<u8>) -> Self {
        self.stdin = Some(bytes);
        self
    }

    pub fn deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Outcome of a docker CLI invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Both streams in arrival order.
    pub output: String,
    pub timed_out: bool,
}

/// Streamed output from a running docker command.
#[derive(Debug)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
    Done(CommandResult),
}

/// Spawn a docker command and return a channel that streams its output.
///
/// The caller receives [`OutputLine::Stdout`]/[`OutputLine::Stderr`] as they
/// arrive, followed by exactly one [`OutputLine::Done`] carrying the final
/// result.
pub fn spawn(cmd: DockerCommand) -> Result<Receiver<OutputLine>> {
    let mut command = Command::new(&cmd.program);
    // Own process group: a terminal Ctrl-C reaches only us, and the step in
    // flight finishes before the run notices the cancellation.
    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut command, 0);
    let mut child = command
        .args(&cmd.args)
        .stdin(if cmd.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| {
            format!(
                "failed to spawn `{}`: is it installed and on PATH?",
                cmd.program
            )
        })?;

    let stdout = child.stdout.take().context("child stdout was not piped")?;
    let stderr = child.stderr.take().context("child stderr was not piped")?;

    if let Some(bytes) = cmd.stdin {
        let mut stdin = child.stdin.take().context("child stdin was not piped")?;
        // Dropping the handle at the end of the thread closes the pipe.
        std::thread::spawn(move || {
            let _ = stdin.write_all(&bytes);
        });
    }

    let (tx, rx) = mpsc::channel();
    let deadline = cmd.deadline;
    std::thread::spawn(move || {
        supervise(child, stdout, stderr, tx, deadline);
    });

    Ok(rx)
}

/// Spawn a docker command and block until it finishes, handing each stdout
/// line to `on_stdout` as it arrives.
pub fn run(cmd: DockerCommand, mut on_stdout: impl FnMut(&str)) -> Result<CommandResult> {
    let rx = spawn(cmd)?;
    for line in rx {
        match line {
            OutputLine::Stdout(l) => on_stdout(&l),
            OutputLine::Stderr(_) => {}
            OutputLine::Done(result) => return Ok(result),
        }
    }
    anyhow::bail!("docker command ended without reporting a result")
}

#[derive(Default)]
struct Buffers {
    stdout: String,
    stderr: String,
    output: String,
}

/// Hand every line of `stream` to `f` until EOF. Invalid UTF-8 is replaced
/// rather than ending the read, so the pipe is always drained.
fn for_each_line(stream: impl Read, mut f: impl FnMut(String)) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                f(String::from_utf8_lossy(&buf).into_owned());
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

fn supervise(
    mut child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    tx: Sender<OutputLine>,
    deadline: Option<Instant>,
) {
    let bufs = Arc::new(Mutex::new(Buffers::default()));

    // --- reader threads ---------------------------------------------------
    let tx_out = tx.clone();
    let buf_out = bufs.clone();
    let stdout_handle = std::thread::spawn(move || {
        for_each_line(stdout, |l| {
            if let Ok(mut b) = buf_out.lock() {
                b.stdout.push_str(&l);
                b.stdout.push('\n');
                b.output.push_str(&l);
                b.output.push('\n');
            }
            // Receiver may be dropped; ignore send errors.
            let _ = tx_out.send(OutputLine::Stdout(l));
        });
    });

    let tx_err = tx.clone();
    let buf_err = bufs.clone();
    let stderr_handle = std::thread::spawn(move || {
        for_each_line(stderr, |l| {
            if let Ok(mut b) = buf_err.lock() {
                b.stderr.push_str(&l);
                b.stderr.push('\n');
                b.output.push_str(&l);
                b.output.push('\n');
            }
            let _ = tx_err.send(OutputLine::Stderr(l));
        });
    });

    // --- poll loop ---------------------------------------------------------
    let mut timed_out = false;
    let exit_status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {}
            Err(_) => break None,
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            timed_out = true;
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }

        std::thread::sleep(POLL_INTERVAL);
    };

    // --- finalize ----------------------------------------------------------
    let _ = stdout_handle.join();
    let _ = stderr_handle.join();

    let exit_code = exit_status.and_then(|s| s.code());
    let bufs = bufs
        .lock()
        .map(|mut b| std::mem::take(&mut *b))
        .unwrap_or_default();

    let _ = tx.send(OutputLine::Done(CommandResult {
        success: exit_code == Some(0),
        exit_code,
        stdout: bufs.stdout,
        stderr: bufs.stderr,
        output: bufs.output,
        timed_out,
    }));
}
