//! Shared data model for calls, commands, and their results.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Exit code reported when there is no real one: forbidden commands,
/// timed-out commands, and children killed by a signal.
pub const SENTINEL_EXIT_CODE: i32 = i32::MAX;

/// One request to run a sequence of commands in an isolated setup, sourced
/// from one location in a host document.
#[derive(Debug, Clone)]
pub struct Call {
    /// Requesting document, `/`-separated, relative to the project root.
    pub requesting_file: String,
    /// Relative path to file content, materialized under the sandbox root
    /// before any command runs.
    pub setup: BTreeMap<String, String>,
    pub commands: Vec<Command>,
    /// Absolute destination for the aggregated result.
    pub output: PathBuf,
}

/// One external process invocation.
#[derive(Debug, Clone)]
pub struct Command {
    /// Working directory relative to the sandbox root; empty means the root.
    pub working_dir: String,
    /// The first element is the executable name the policy looks up.
    pub argv: Vec<String>,
    /// `None` discards the stream.
    pub output_spec: Option<StreamSpec>,
    pub error_spec: Option<StreamSpec>,
    /// Wall-clock budget; `None` is unbounded.
    pub timeout: Option<Duration>,
    /// Payload written to the child's stdin before any output is read.
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    pub format: OutputFormat,
    /// Hex color without the leading `#`; meaningful for `ConjoinedRaw`.
    pub color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Raw,
    List,
    ConjoinedRaw,
    ConjoinedList,
}

impl OutputFormat {
    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Raw => "raw",
            OutputFormat::List => "list",
            OutputFormat::ConjoinedRaw => "conjoined-raw",
            OutputFormat::ConjoinedList => "conjoined-list",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Out,
    Err,
}

/// One captured output line, in arrival order. Order within a stream is
/// exact; order across streams reflects the interleaving observed while
/// draining and is best-effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub stream: StreamKind,
    pub text: String,
}

/// Terminal condition recorded on a per-command result. Neither aborts the
/// call; later commands still run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Timeout,
    Forbidden,
}

/// Outcome of one command, created by the process runner and consumed once
/// by the result translator.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub lines: Vec<Line>,
    pub exit_code: i32,
    pub fault: Option<Fault>,
    pub output: PathBuf,
    pub command: Command,
}
