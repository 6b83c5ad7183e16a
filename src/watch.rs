//! The top-level loop: document discovery, per-file processing, watch mode.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use colored::Colorize;
use glob::glob;
use serde_json::Value as Json;

use crate::cancel::{CancelToken, Interrupted};
use crate::eval;
use crate::format::format_result;
use crate::lines::split_lines;
use crate::parse::{parse_call, MalformedQuery};
use crate::policy::Validator;
use crate::typst::{CompileError, Typst, TYPST_LIB};
use crate::value::Value;

/// Label under which the Typst-side library publishes the per-request keys.
const KEYS_LABEL: &str = "escapement-keys";

const SLEEP_SLICE: Duration = Duration::from_millis(100);

pub struct WatchConfig {
    /// The `.typ` file or directory to work on.
    pub root: PathBuf,
    /// Pause between watch iterations.
    pub delay: Duration,
    /// Process the document set once and exit.
    pub once: bool,
    /// The typst executable.
    pub exec: String,
    /// Do not echo command output lines.
    pub quiet: bool,
}

/// Discovers the document set once, then processes it either a single time
/// or in a loop until the cancellation token is set.
pub fn run(config: &WatchConfig, validator: &mut Validator, cancel: &CancelToken) -> Result<()> {
    let (project_root, files) = discover(&config.root)?;
    if files.is_empty() {
        println!("No .typ files under {}", config.root.display());
        return Ok(());
    }
    let typst = Typst::new(config.exec.clone());

    if config.once {
        return process_all(&typst, &project_root, &files, validator, cancel, config.quiet);
    }

    let mut iteration: u64 = 0;
    while !cancel.is_cancelled() {
        iteration += 1;
        println!("\n=== Iteration {iteration}\n");
        process_all(&typst, &project_root, &files, validator, cancel, config.quiet)?;
        sleep_cancellable(config.delay, cancel)?;
    }
    Ok(())
}

/// A file root is processed alone with its directory as the project root; a
/// directory root is scanned recursively for `.typ` documents.
pub fn discover(root: &Path) -> Result<(PathBuf, Vec<PathBuf>)> {
    if root.is_file() {
        let project_root = root
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        return Ok((project_root, vec![root.to_path_buf()]));
    }

    let pattern = root.join("**").join("*.typ");
    let mut files: Vec<PathBuf> = glob(&pattern.to_string_lossy())
        .context("Invalid document scan pattern")?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok((root.to_path_buf(), files))
}

/// Writes the Typst-side helper library, relative to the root's directory.
pub fn write_library(root: Option<&Path>, target: &str) -> Result<PathBuf> {
    let dir = match root {
        Some(path) if path.is_file() => path.parent().unwrap_or(Path::new(".")).to_path_buf(),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from("."),
    };
    let target = dir.join(target);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directories for {}", target.display()))?;
    }
    fs::write(&target, TYPST_LIB)
        .with_context(|| format!("Failed to write Typst library to {}", target.display()))?;
    println!(
        "{} Wrote Typst library to {}",
        "✓".green().bold(),
        target.display()
    );
    Ok(target)
}

fn process_all(
    typst: &Typst,
    project_root: &Path,
    files: &[PathBuf],
    validator: &mut Validator,
    cancel: &CancelToken,
    quiet: bool,
) -> Result<()> {
    for file in files {
        cancel.check()?;
        let display = file.strip_prefix(project_root).unwrap_or(file);
        println!("File: {}", display.display().to_string().cyan());
        if let Err(err) = process_file(typst, file, project_root, validator, cancel, quiet) {
            report_failure(err)?;
        }
    }
    Ok(())
}

fn process_file(
    typst: &Typst,
    file: &Path,
    project_root: &Path,
    validator: &mut Validator,
    cancel: &CancelToken,
    quiet: bool,
) -> Result<()> {
    let keys_value = single_match(typst.query(file, KEYS_LABEL, project_root)?, KEYS_LABEL)?;
    let keys = keys_value
        .as_array()
        .and_then(|keys| {
            keys.iter()
                .map(|key| key.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| {
            MalformedQuery(format!("<{KEYS_LABEL}> should hold an array of `str` keys"))
        })?;

    for key in keys {
        cancel.check()?;
        let record = single_match(typst.query(file, &key, project_root)?, &key)?;
        let call = parse_call(file, project_root, &record)?;
        let results = eval::evaluate(&call, validator, cancel, quiet)?;
        let formatted = results
            .iter()
            .map(format_result)
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(parent) = call.output.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create directories for {}", call.output.display())
            })?;
        }
        fs::write(&call.output, Value::Array(formatted).repr())
            .with_context(|| format!("Failed to write result to {}", call.output.display()))?;
    }
    Ok(())
}

fn single_match(matches: Vec<Json>, label: &str) -> Result<Json, MalformedQuery> {
    let mut matches = matches.into_iter();
    match (matches.next(), matches.next()) {
        (Some(value), None) => Ok(value),
        _ => Err(MalformedQuery(format!(
            "No value or multiple values by label <{label}>"
        ))),
    }
}

/// Interruption propagates; every other per-document failure is reported to
/// the console and the run continues with the next file.
fn report_failure(err: anyhow::Error) -> Result<()> {
    if err.is::<Interrupted>() {
        return Err(err);
    }
    if let Some(compile) = err.downcast_ref::<CompileError>() {
        println!("\t{}", "Compilation error".red());
        for line in split_lines(&compile.0) {
            println!("\t{line}");
        }
    } else if let Some(malformed) = err.downcast_ref::<MalformedQuery>() {
        println!("\t\t{malformed}");
    } else {
        println!("\t{} {err:#}", "I/O error:".red());
    }
    Ok(())
}

fn sleep_cancellable(delay: Duration, cancel: &CancelToken) -> Result<(), Interrupted> {
    let deadline = Instant::now() + delay;
    loop {
        cancel.check()?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}
