//! Round-trips from real command output into Typst value syntax.

use escapement::cancel::CancelToken;
use escapement::eval::evaluate;
use escapement::format::format_result;
use escapement::model::{OutputFormat, StreamSpec};
use escapement::value::Value;

use super::helpers::*;

fn spec(format: OutputFormat) -> Option<StreamSpec> {
    Some(StreamSpec {
        format,
        color: "000000".to_string(),
    })
}

#[test]
fn test_cat_setup_file_round_trips_as_raw_stdout() {
    let mut cat = command(&["cat", "a.txt"]);
    cat.output_spec = spec(OutputFormat::Raw);
    cat.error_spec = None;
    let call = call(&[("a.txt", "hi")], vec![cat]);

    let results = evaluate(&call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(
        format_result(&results[0]).unwrap().repr(),
        "(error: none, output: (stdout: raw(\"hi\"), stderr: none), code: 0)"
    );
}

#[test]
fn test_conjoined_list_round_trips_in_order() {
    let mut echo = sh("echo a; echo b");
    echo.output_spec = spec(OutputFormat::ConjoinedList);
    echo.error_spec = spec(OutputFormat::ConjoinedList);
    let call = call(&[], vec![echo]);

    let results = evaluate(&call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(
        format_result(&results[0]).unwrap().repr(),
        "(error: none, output: ((file: \"out\", line: \"a\"), (file: \"out\", line: \"b\")), code: 0)"
    );
}

#[test]
fn test_conjoined_raw_tints_lines_with_the_stream_color() {
    let mut echo = sh("echo a");
    echo.output_spec = Some(StreamSpec {
        format: OutputFormat::ConjoinedRaw,
        color: "00ff00".to_string(),
    });
    echo.error_spec = Some(StreamSpec {
        format: OutputFormat::ConjoinedRaw,
        color: "ff0000".to_string(),
    });
    let call = call(&[], vec![echo]);

    let results = evaluate(&call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(
        format_result(&results[0]).unwrap().repr(),
        "(error: none, output: (text(fill: rgb(\"#00ff00\"), raw(\"a\")), linebreak()).join(), code: 0)"
    );
}

#[test]
fn test_timeout_formats_with_partial_output_and_no_code() {
    let call = call(
        &[],
        vec![with_timeout(sh("echo started; sleep 5"), 300)],
    );
    let results = evaluate(&call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(
        format_result(&results[0]).unwrap().repr(),
        "(error: \"timeout\", output: (stdout: (\"started\",), stderr: ()))"
    );
}

#[test]
fn test_forbidden_formats_to_the_error_alone() {
    let call = call(&[], vec![sh("echo x")]);
    let results = evaluate(&call, &mut forbid_all(), &CancelToken::new(), true).unwrap();
    assert_eq!(
        format_result(&results[0]).unwrap().repr(),
        "(error: \"forbidden\")"
    );
}

#[test]
fn test_whole_call_aggregates_into_an_array() {
    let mut first = sh("echo 1");
    first.output_spec = spec(OutputFormat::Raw);
    first.error_spec = None;
    let mut second = sh("echo 2");
    second.output_spec = spec(OutputFormat::Raw);
    second.error_spec = None;
    let call = call(&[], vec![first, second]);

    let results = evaluate(&call, &mut allow_all(), &CancelToken::new(), true).unwrap();
    let aggregated = Value::Array(
        results
            .iter()
            .map(|r| format_result(r).unwrap())
            .collect(),
    );
    assert_eq!(
        aggregated.repr(),
        "((error: none, output: (stdout: raw(\"1\"), stderr: none), code: 0), \
         (error: none, output: (stdout: raw(\"2\"), stderr: none), code: 0))"
    );
}
