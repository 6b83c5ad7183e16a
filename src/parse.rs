//! Turning a queried document record into a typed [`Call`].
//!
//! Every shape violation is a [`MalformedQuery`] naming the offending field,
//! raised before any sandbox exists or process runs.

use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::time::Duration;

use serde_json::Value as Json;
use thiserror::Error;

use crate::model::{Call, Command, OutputFormat, StreamSpec};

/// The queried record does not have the shape the tool expects. Processing
/// of the current document is skipped; the run continues.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MalformedQuery(pub String);

fn malformed(message: impl Into<String>) -> MalformedQuery {
    MalformedQuery(message.into())
}

/// Parses one request record queried from `requesting_file`.
pub fn parse_call(
    requesting_file: &Path,
    project_root: &Path,
    record: &Json,
) -> Result<Call, MalformedQuery> {
    let record = record
        .as_object()
        .ok_or_else(|| malformed("The queried record should be a dictionary"))?;

    let setup_value = record
        .get("setup")
        .ok_or_else(|| malformed("<setup> is expected to be present in the dictionary"))?;
    let setup_dict = setup_value
        .as_object()
        .ok_or_else(|| malformed("<setup> in the dictionary should be a dictionary"))?;
    let mut setup = BTreeMap::new();
    for (path, content) in setup_dict {
        let content = content
            .as_str()
            .ok_or_else(|| malformed("All the values in the `setup` dictionary should be `str`s"))?;
        if !is_confined(path) {
            return Err(malformed(format!(
                "Setup path `{path}` should be relative and stay inside the sandbox"
            )));
        }
        setup.insert(path.clone(), content.to_string());
    }

    let rel = requesting_file
        .strip_prefix(project_root)
        .unwrap_or(requesting_file);
    let self_path = format!("/{}", slash_path(rel));

    let output_template = record
        .get("output")
        .ok_or_else(|| malformed("<output> is expected to be present in the dictionary"))?
        .as_str()
        .ok_or_else(|| malformed("<output> in the dictionary should be a `str`"))?;
    let output = output_template.replace("$self", &self_path);
    let output = if let Some(anchored) = output.strip_prefix('/') {
        project_root.join(anchored)
    } else {
        requesting_file
            .parent()
            .unwrap_or(project_root)
            .join(&output)
    };

    let commands_value = record
        .get("commands")
        .ok_or_else(|| malformed("<commands> is expected to be present in the dictionary"))?
        .as_array()
        .ok_or_else(|| malformed("<commands> in the dictionary should be an array"))?;

    let mut commands = Vec::with_capacity(commands_value.len());
    for (index, entry) in commands_value.iter().enumerate() {
        commands.push(parse_command(index, entry)?);
    }

    Ok(Call {
        requesting_file: slash_path(rel),
        setup,
        commands,
        output,
    })
}

fn parse_command(index: usize, entry: &Json) -> Result<Command, MalformedQuery> {
    let dict = entry
        .as_object()
        .ok_or_else(|| malformed("All the values in the `commands` array should be dictionaries"))?;

    let working_dir = match dict.get("working-dir") {
        None => String::new(),
        Some(value) => value
            .as_str()
            .ok_or_else(|| {
                malformed(format!(
                    "Working directory for {index}-th command should be unspecified or be a `str`"
                ))
            })?
            .to_string(),
    };
    if Path::new(&working_dir).is_absolute() {
        return Err(malformed(format!(
            "Working directory for {index}-th command should be relative"
        )));
    }

    let argv_value = dict
        .get("command")
        .ok_or_else(|| {
            malformed(format!(
                "<command> for {index}-th command is expected to be present"
            ))
        })?
        .as_array()
        .ok_or_else(|| malformed(format!("<command> for {index}-th command should be an array")))?;
    let mut argv = Vec::with_capacity(argv_value.len());
    for part in argv_value {
        let part = part.as_str().ok_or_else(|| {
            malformed(format!(
                "All the values in the `command` array for {index}-th command should be `str`s"
            ))
        })?;
        argv.push(part.to_string());
    }
    if argv.is_empty() {
        return Err(malformed(format!(
            "The `command` array for {index}-th command should not be empty"
        )));
    }

    let output_spec = parse_stream_spec(dict, index, "output", "Output")?;
    let error_spec = parse_stream_spec(dict, index, "error", "Error")?;
    check_conjoined_pairing(index, output_spec.as_ref(), error_spec.as_ref())?;

    let timeout = match dict.get("timeout") {
        None | Some(Json::Null) => None,
        Some(value) => {
            let millis = value.as_i64().ok_or_else(|| {
                malformed(format!(
                    "Timeout for {index}-th command should be unspecified or be an `int`"
                ))
            })?;
            if millis < 0 {
                return Err(malformed(format!(
                    "Timeout for {index}-th command should be non-negative"
                )));
            }
            Some(Duration::from_millis(millis as u64))
        }
    };

    let input = match dict.get("input") {
        None => String::new(),
        Some(value) => value
            .as_str()
            .ok_or_else(|| {
                malformed(format!(
                    "Input for {index}-th command should be unspecified or be a `str`"
                ))
            })?
            .to_string(),
    };

    Ok(Command {
        working_dir,
        argv,
        output_spec,
        error_spec,
        timeout,
        input,
    })
}

fn parse_stream_spec(
    dict: &serde_json::Map<String, Json>,
    index: usize,
    name: &str,
    name_cap: &str,
) -> Result<Option<StreamSpec>, MalformedQuery> {
    let spec = match dict.get(&format!("{name}-spec")) {
        None | Some(Json::Null) => return Ok(None),
        Some(value) => value.as_object().ok_or_else(|| {
            malformed(format!(
                "{name_cap} spec for {index}-th command should be a dictionary or none"
            ))
        })?,
    };

    let format = spec
        .get("format")
        .and_then(Json::as_str)
        .ok_or_else(|| {
            malformed(format!(
                "{name_cap} spec for {index}-th command should have a `str` format"
            ))
        })?;
    let format = match format {
        "raw" => OutputFormat::Raw,
        "list" => OutputFormat::List,
        "conjoined-raw" => OutputFormat::ConjoinedRaw,
        "conjoined-list" => OutputFormat::ConjoinedList,
        _ => {
            return Err(malformed(format!(
                "{name_cap} format should be one of `raw`, `list`, `conjoined-raw`, `conjoined-list`"
            )))
        }
    };

    let color = spec
        .get("color")
        .and_then(Json::as_str)
        .ok_or_else(|| {
            malformed(format!(
                "{name_cap} spec for {index}-th command should have a `str` color"
            ))
        })?
        .to_string();

    Ok(Some(StreamSpec { format, color }))
}

/// A conjoined format merges both streams into one value, so selecting it
/// for one stream only leaves the other with nowhere to go.
fn check_conjoined_pairing(
    index: usize,
    output: Option<&StreamSpec>,
    error: Option<&StreamSpec>,
) -> Result<(), MalformedQuery> {
    for conjoined in [OutputFormat::ConjoinedList, OutputFormat::ConjoinedRaw] {
        let out_is = output.is_some_and(|s| s.format == conjoined);
        let err_is = error.is_some_and(|s| s.format == conjoined);
        if (out_is || err_is) && !(out_is && err_is) {
            return Err(malformed(format!(
                "`{}` should be the format of both output and error of {index}-th command, if selected",
                conjoined.name()
            )));
        }
    }
    Ok(())
}

fn is_confined(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty()
        && path.is_relative()
        && path
            .components()
            .all(|c| !matches!(c, Component::ParentDir | Component::RootDir))
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
