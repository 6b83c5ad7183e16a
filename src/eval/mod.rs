//! Call evaluation: sandbox lifecycle and in-order command execution.

pub mod runner;

use std::fs;
use std::path::{Component, Path};

use anyhow::{bail, Context, Result};
use tempfile::{Builder, TempDir};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::model::{Call, EvaluationResult};
use crate::policy::Validator;

const SANDBOX_PREFIX: &str = "escapement-";

/// Runs every command of `call` inside a fresh sandbox directory, strictly in
/// order. Command N may depend on the files command N-1 wrote.
///
/// Timeouts and policy denials are recorded per command and do not stop the
/// call; cancellation and I/O faults do. The sandbox is removed on every exit
/// path.
pub fn evaluate(
    call: &Call,
    validator: &mut Validator,
    cancel: &CancelToken,
    quiet: bool,
) -> Result<Vec<EvaluationResult>> {
    let sandbox = Builder::new()
        .prefix(SANDBOX_PREFIX)
        .tempdir()
        .context("Failed to create sandbox directory")?;
    run_in_sandbox(sandbox, call, validator, cancel, quiet)
}

/// Same as [`evaluate`], with the sandbox created under `base` instead of the
/// system temporary directory.
pub fn evaluate_in(
    base: &Path,
    call: &Call,
    validator: &mut Validator,
    cancel: &CancelToken,
    quiet: bool,
) -> Result<Vec<EvaluationResult>> {
    let sandbox = Builder::new()
        .prefix(SANDBOX_PREFIX)
        .tempdir_in(base)
        .with_context(|| format!("Failed to create sandbox directory under {}", base.display()))?;
    run_in_sandbox(sandbox, call, validator, cancel, quiet)
}

fn run_in_sandbox(
    sandbox: TempDir,
    call: &Call,
    validator: &mut Validator,
    cancel: &CancelToken,
    quiet: bool,
) -> Result<Vec<EvaluationResult>> {
    // The TempDir guard removes the directory tree however this returns.
    debug!(sandbox = %sandbox.path().display(), "created sandbox");
    materialize_setup(sandbox.path(), call)?;

    let mut results = Vec::with_capacity(call.commands.len());
    for command in &call.commands {
        cancel.check()?;
        results.push(runner::run_command(
            sandbox.path(),
            &call.requesting_file,
            command,
            validator,
            &call.output,
            cancel,
            quiet,
        )?);
    }
    debug!(sandbox = %sandbox.path().display(), "removing sandbox");
    Ok(results)
}

fn materialize_setup(root: &Path, call: &Call) -> Result<()> {
    for (path, content) in &call.setup {
        let rel = Path::new(path);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::RootDir))
        {
            bail!("Setup path `{path}` escapes the sandbox");
        }
        let target = root.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directories for setup file {path}"))?;
        }
        fs::write(&target, content)
            .with_context(|| format!("Failed to write setup file {path}"))?;
    }
    Ok(())
}
