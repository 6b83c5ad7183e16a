//! Sandbox lifecycle, ordering, timeout, policy, and cancellation behavior.

use std::fs;

use escapement::cancel::{CancelToken, Interrupted};
use escapement::eval::{evaluate, evaluate_in};
use escapement::model::{Fault, SENTINEL_EXIT_CODE};
use tempfile::TempDir;

use super::helpers::*;

fn assert_empty(dir: &TempDir) {
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .expect("Failed to list scratch directory")
        .collect();
    assert!(leftovers.is_empty(), "sandbox left behind: {leftovers:?}");
}

#[test]
fn test_setup_files_are_materialized() {
    let call = call(&[("a.txt", "hi")], vec![command(&["cat", "a.txt"])]);
    let results = evaluate(&call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].exit_code, 0);
    assert_eq!(results[0].fault, None);
    assert_eq!(stdout_lines(&results[0]), vec!["hi"]);
}

#[test]
fn test_setup_creates_nested_directories_and_working_dir_applies() {
    let mut nested = command(&["cat", "a.txt"]);
    nested.working_dir = "sub/dir".to_string();
    let call = call(&[("sub/dir/a.txt", "nested")], vec![nested]);
    let results = evaluate(&call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(stdout_lines(&results[0]), vec!["nested"]);
}

#[test]
fn test_sandbox_is_removed_after_success() {
    let base = TempDir::new().unwrap();
    let call = call(&[("a.txt", "x")], vec![sh("ls")]);
    evaluate_in(base.path(), &call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    assert_empty(&base);
}

#[test]
fn test_sandbox_is_removed_after_timeout() {
    let base = TempDir::new().unwrap();
    let call = call(&[], vec![with_timeout(sh("sleep 5"), 100)]);
    let results =
        evaluate_in(base.path(), &call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(results[0].fault, Some(Fault::Timeout));
    assert_empty(&base);
}

#[test]
fn test_sandbox_is_removed_after_cancellation() {
    let base = TempDir::new().unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    let call = call(&[("a.txt", "x")], vec![sh("ls")]);
    let err = evaluate_in(base.path(), &call, &mut allow_all(), &cancel, true).unwrap_err();
    assert!(err.is::<Interrupted>());
    assert_empty(&base);
}

#[test]
fn test_sandbox_is_removed_after_spawn_failure() {
    let base = TempDir::new().unwrap();
    let call = call(&[], vec![command(&["escapement-no-such-binary"])]);
    let err =
        evaluate_in(base.path(), &call, &mut allow_all(), &CancelToken::new(), true).unwrap_err();
    assert!(err.to_string().contains("escapement-no-such-binary"));
    assert_empty(&base);
}

#[test]
fn test_commands_run_in_order_and_see_earlier_writes() {
    let call = call(
        &[],
        vec![sh("printf one > f.txt"), command(&["cat", "f.txt"])],
    );
    let results = evaluate(&call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].exit_code, 0);
    assert_eq!(stdout_lines(&results[1]), vec!["one"]);
}

#[test]
fn test_timeout_keeps_only_lines_produced_before_the_deadline() {
    let call = call(
        &[],
        vec![with_timeout(sh("echo started; sleep 5; echo done"), 300)],
    );
    let results = evaluate(&call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    let result = &results[0];
    assert_eq!(result.fault, Some(Fault::Timeout));
    assert_eq!(result.exit_code, SENTINEL_EXIT_CODE);
    assert_eq!(stdout_lines(result), vec!["started"]);
}

#[test]
fn test_call_proceeds_past_a_timed_out_command() {
    let call = call(
        &[],
        vec![with_timeout(sh("sleep 5"), 100), sh("echo after")],
    );
    let results = evaluate(&call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].fault, Some(Fault::Timeout));
    assert_eq!(results[1].fault, None);
    assert_eq!(stdout_lines(&results[1]), vec!["after"]);
}

#[test]
fn test_generous_timeout_does_not_fire() {
    let call = call(&[], vec![with_timeout(sh("echo quick"), 30_000)]);
    let results = evaluate(&call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(results[0].fault, None);
    assert_eq!(stdout_lines(&results[0]), vec!["quick"]);
}

#[test]
fn test_forbidden_command_is_recorded_without_running() {
    let base = TempDir::new().unwrap();
    let call = call(&[], vec![sh("printf ran > witness.txt"), sh("echo x")]);
    let results =
        evaluate_in(base.path(), &call, &mut forbid_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(results.len(), 2);
    for result in &results {
        assert_eq!(result.fault, Some(Fault::Forbidden));
        assert_eq!(result.exit_code, SENTINEL_EXIT_CODE);
        assert!(result.lines.is_empty());
    }
    // Nothing ran, so nothing was written anywhere under the scratch base.
    assert_empty(&base);
}

#[test]
fn test_stdin_payload_is_delivered_and_closed() {
    let mut cat = command(&["cat"]);
    cat.input = "ping\npong".to_string();
    let call = call(&[], vec![cat]);
    let results = evaluate(&call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(stdout_lines(&results[0]), vec!["ping", "pong"]);
}

#[test]
fn test_child_that_ignores_stdin_is_not_a_fault() {
    let mut echo = sh("echo ok");
    echo.input = "never read".to_string();
    let call = call(&[], vec![echo]);
    let results = evaluate(&call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(results[0].fault, None);
    assert_eq!(results[0].exit_code, 0);
}

#[test]
fn test_exit_code_is_captured() {
    let call = call(&[], vec![sh("exit 3")]);
    let results = evaluate(&call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(results[0].exit_code, 3);
    assert_eq!(results[0].fault, None);
}

#[test]
fn test_lines_are_tagged_with_their_stream() {
    let call = call(&[], vec![sh("echo out; echo err 1>&2")]);
    let results = evaluate(&call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(stdout_lines(&results[0]), vec!["out"]);
    assert_eq!(stderr_lines(&results[0]), vec!["err"]);
}

#[test]
fn test_trailing_partial_line_is_captured() {
    let call = call(&[], vec![sh("printf 'no newline'")]);
    let results = evaluate(&call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(stdout_lines(&results[0]), vec!["no newline"]);
}

#[test]
fn test_crlf_output_is_normalized() {
    let call = call(&[], vec![sh("printf 'a\\r\\nb\\r\\n'")]);
    let results = evaluate(&call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(stdout_lines(&results[0]), vec!["a", "b"]);
}
