//! Shared builders for evaluation tests.

use std::path::PathBuf;
use std::time::Duration;

use escapement::model::{Call, Command, EvaluationResult, OutputFormat, StreamKind, StreamSpec};
use escapement::policy::{Safety, Validator};

pub fn allow_all() -> Validator {
    Validator::new([], [], [], Safety::Allow)
}

pub fn forbid_all() -> Validator {
    Validator::new([], [], [], Safety::Forbid)
}

/// A call requesting `commands` with the given setup files, writing its
/// (never materialized in these tests) aggregate to a scratch destination.
pub fn call(setup: &[(&str, &str)], commands: Vec<Command>) -> Call {
    Call {
        requesting_file: "doc.typ".to_string(),
        setup: setup
            .iter()
            .map(|(path, content)| (path.to_string(), content.to_string()))
            .collect(),
        commands,
        output: PathBuf::from("result.typ"),
    }
}

/// A command capturing both streams as line lists.
pub fn command(argv: &[&str]) -> Command {
    let spec = StreamSpec {
        format: OutputFormat::List,
        color: "000000".to_string(),
    };
    Command {
        working_dir: String::new(),
        argv: argv.iter().map(|s| s.to_string()).collect(),
        output_spec: Some(spec.clone()),
        error_spec: Some(spec),
        timeout: None,
        input: String::new(),
    }
}

pub fn sh(script: &str) -> Command {
    command(&["sh", "-c", script])
}

pub fn with_timeout(mut command: Command, millis: u64) -> Command {
    command.timeout = Some(Duration::from_millis(millis));
    command
}

pub fn stdout_lines(result: &EvaluationResult) -> Vec<&str> {
    side(result, StreamKind::Out)
}

pub fn stderr_lines(result: &EvaluationResult) -> Vec<&str> {
    side(result, StreamKind::Err)
}

fn side(result: &EvaluationResult, stream: StreamKind) -> Vec<&str> {
    result
        .lines
        .iter()
        .filter(|line| line.stream == stream)
        .map(|line| line.text.as_str())
        .collect()
}
