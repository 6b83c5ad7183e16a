//! Running one external process and capturing its output.
//!
//! Two reader threads drain the child's streams into one ordered channel;
//! the worker multiplexes channel receive, the wall-clock deadline, and the
//! cancellation token on a short tick.

use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, Command as Process, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::debug;
use wait_timeout::ChildExt;

use crate::cancel::CancelToken;
use crate::lines::{drain_reader, LineAccumulator};
use crate::model::{Command, EvaluationResult, Fault, Line, StreamKind, SENTINEL_EXIT_CODE};
use crate::policy::Validator;

/// How long one drain iteration waits for the next line before re-checking
/// the deadline and the cancellation token.
const DRAIN_TICK: Duration = Duration::from_millis(25);

/// Kills the child if it is still alive when the runner returns, on any path.
struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            debug!("killing leftover child process");
            let _ = self.0.kill();
            let _ = self.0.wait();
        }
    }
}

pub(crate) fn run_command(
    sandbox_root: &Path,
    requesting_file: &str,
    command: &Command,
    validator: &mut Validator,
    output_file: &Path,
    cancel: &CancelToken,
    quiet: bool,
) -> Result<EvaluationResult> {
    println!("\t{} {}", "Command:".bold(), command.argv.join(" "));

    if !validator.validate(requesting_file, &command.argv, cancel)? {
        println!("\t{}\n", "Forbidden".red());
        return Ok(EvaluationResult {
            lines: Vec::new(),
            exit_code: SENTINEL_EXIT_CODE,
            fault: Some(Fault::Forbidden),
            output: output_file.to_path_buf(),
            command: command.clone(),
        });
    }

    let (program, args) = command
        .argv
        .split_first()
        .context("Empty command vector")?;
    debug!(argv = ?command.argv, "spawning");
    let mut child = ChildGuard(
        Process::new(program)
            .args(args)
            .current_dir(sandbox_root.join(&command.working_dir))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn command `{}`", command.argv.join(" ")))?,
    );

    let start = Instant::now();
    let (tx, rx) = mpsc::channel();
    spawn_reader(child.0.stdout.take(), StreamKind::Out, tx.clone());
    spawn_reader(child.0.stderr.take(), StreamKind::Err, tx);

    feed_stdin(&mut child.0, &command.input)?;

    let mut lines = Vec::new();
    loop {
        cancel.check()?;
        if deadline_exceeded(start, command.timeout) {
            return Ok(timed_out(child, rx, lines, command, output_file, quiet));
        }
        match rx.recv_timeout(DRAIN_TICK) {
            Ok(line) => {
                echo(&line, quiet);
                lines.push(line);
            }
            Err(RecvTimeoutError::Timeout) => {}
            // Both reader threads finished: the streams are closed.
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // A child that closed its streams can still outrun the deadline.
    let status = loop {
        cancel.check()?;
        if let Some(status) = child
            .0
            .wait_timeout(DRAIN_TICK)
            .context("Failed to wait for command")?
        {
            break status;
        }
        if deadline_exceeded(start, command.timeout) {
            return Ok(timed_out(child, rx, lines, command, output_file, quiet));
        }
    };

    let exit_code = status.code().unwrap_or(SENTINEL_EXIT_CODE);
    println!("\tExited with code {exit_code}\n");
    Ok(EvaluationResult {
        lines,
        exit_code,
        fault: None,
        output: output_file.to_path_buf(),
        command: command.clone(),
    })
}

fn spawn_reader<R: Read + Send + 'static>(stream: Option<R>, kind: StreamKind, tx: Sender<Line>) {
    let Some(stream) = stream else {
        return;
    };
    thread::spawn(move || {
        let mut acc = LineAccumulator::new(|text| {
            let _ = tx.send(Line { stream: kind, text });
        });
        drain_reader(stream, &mut acc);
    });
}

/// Writes the input payload and closes the pipe, signalling end-of-input. A
/// child that exits without reading produces a broken pipe, not a fault.
fn feed_stdin(child: &mut Child, input: &str) -> Result<()> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };
    match stdin.write_all(input.as_bytes()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err).context("Failed to deliver command input"),
    }
}

fn deadline_exceeded(start: Instant, timeout: Option<Duration>) -> bool {
    timeout.is_some_and(|limit| start.elapsed() > limit)
}

/// Kills the child so the readers see end-of-stream, collects their flushed
/// partial lines, and packages everything captured so far.
fn timed_out(
    mut child: ChildGuard,
    rx: Receiver<Line>,
    mut lines: Vec<Line>,
    command: &Command,
    output_file: &Path,
    quiet: bool,
) -> EvaluationResult {
    let _ = child.0.kill();
    let _ = child.0.wait();
    while let Ok(line) = rx.recv_timeout(DRAIN_TICK) {
        echo(&line, quiet);
        lines.push(line);
    }
    let millis = command.timeout.map(|t| t.as_millis()).unwrap_or_default();
    println!("\tTime ({millis} ms) ran out\n");
    EvaluationResult {
        lines,
        exit_code: SENTINEL_EXIT_CODE,
        fault: Some(Fault::Timeout),
        output: output_file.to_path_buf(),
        command: command.clone(),
    }
}

fn echo(line: &Line, quiet: bool) {
    if quiet {
        return;
    }
    match line.stream {
        StreamKind::Out => println!("\t    {}", line.text),
        StreamKind::Err => println!("\t {} {}", "E:".red(), line.text),
    }
}
