//! Turning evaluation results back into the document's value format.

use crate::model::{EvaluationResult, Fault, OutputFormat, StreamKind, StreamSpec};
use crate::parse::MalformedQuery;
use crate::value::Value;

/// One per-command result record: a timeout carries its partial output, a
/// forbidden command carries nothing, and a success carries output and the
/// exit code.
pub fn format_result(result: &EvaluationResult) -> Result<Value, MalformedQuery> {
    Ok(match result.fault {
        Some(Fault::Timeout) => Value::Dict(vec![
            ("error".into(), Value::str("timeout")),
            ("output".into(), format_output(result)?),
        ]),
        Some(Fault::Forbidden) => Value::Dict(vec![("error".into(), Value::str("forbidden"))]),
        None => Value::Dict(vec![
            ("error".into(), Value::None),
            ("output".into(), format_output(result)?),
            ("code".into(), Value::Int(result.exit_code.into())),
        ]),
    })
}

fn format_output(result: &EvaluationResult) -> Result<Value, MalformedQuery> {
    let out_spec = result.command.output_spec.as_ref();
    let err_spec = result.command.error_spec.as_ref();

    if selects(out_spec, OutputFormat::ConjoinedList) || selects(err_spec, OutputFormat::ConjoinedList)
    {
        require_both(out_spec, err_spec, OutputFormat::ConjoinedList)?;
        return Ok(Value::Array(
            result
                .lines
                .iter()
                .map(|line| {
                    Value::Dict(vec![
                        (
                            "file".into(),
                            Value::str(match line.stream {
                                StreamKind::Out => "out",
                                StreamKind::Err => "err",
                            }),
                        ),
                        ("line".into(), Value::str(line.text.clone())),
                    ])
                })
                .collect(),
        ));
    }

    if selects(out_spec, OutputFormat::ConjoinedRaw) || selects(err_spec, OutputFormat::ConjoinedRaw)
    {
        require_both(out_spec, err_spec, OutputFormat::ConjoinedRaw)?;
        let mut pieces = Vec::with_capacity(result.lines.len() * 2);
        for line in &result.lines {
            let spec = match line.stream {
                StreamKind::Out => out_spec,
                StreamKind::Err => err_spec,
            };
            let fill = spec.map(|s| s.color.clone()).unwrap_or_default();
            pieces.push(Value::Text {
                fill,
                body: Box::new(Value::Raw(line.text.clone())),
            });
            pieces.push(Value::Linebreak);
        }
        return Ok(Value::Seq(pieces));
    }

    Ok(Value::Dict(vec![
        ("stdout".into(), format_single(result, out_spec, StreamKind::Out)?),
        ("stderr".into(), format_single(result, err_spec, StreamKind::Err)?),
    ]))
}

fn format_single(
    result: &EvaluationResult,
    spec: Option<&StreamSpec>,
    stream: StreamKind,
) -> Result<Value, MalformedQuery> {
    let side = || {
        result
            .lines
            .iter()
            .filter(move |line| line.stream == stream)
            .map(|line| line.text.as_str())
    };
    match spec.map(|s| s.format) {
        None => Ok(Value::None),
        Some(OutputFormat::Raw) => Ok(Value::Raw(side().collect::<Vec<_>>().join("\n"))),
        Some(OutputFormat::List) => Ok(Value::Array(side().map(Value::str).collect())),
        // Conjoined pairs are handled (and mismatches rejected) above.
        Some(other) => Err(MalformedQuery(format!(
            "`{}` should be the format of both output and error, if selected",
            other.name()
        ))),
    }
}

fn selects(spec: Option<&StreamSpec>, format: OutputFormat) -> bool {
    spec.is_some_and(|s| s.format == format)
}

fn require_both(
    out_spec: Option<&StreamSpec>,
    err_spec: Option<&StreamSpec>,
    format: OutputFormat,
) -> Result<(), MalformedQuery> {
    if selects(out_spec, format) && selects(err_spec, format) {
        Ok(())
    } else {
        Err(MalformedQuery(format!(
            "`{}` should be the format of both output and error, if selected",
            format.name()
        )))
    }
}
