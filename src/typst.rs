//! Querying the host documents through the `typst` CLI.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// The document failed to compile; carries the compiler's stderr verbatim.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CompileError(pub String);

/// One match returned by `typst query`. Only the metadata payload matters;
/// the function name and label are dropped.
#[derive(Debug, Deserialize)]
struct QueryMatch {
    value: serde_json::Value,
}

/// Thin wrapper around the `typst` executable.
#[derive(Debug, Clone)]
pub struct Typst {
    exec: String,
}

impl Typst {
    pub fn new(exec: impl Into<String>) -> Self {
        Self { exec: exec.into() }
    }

    /// Queries `file` for metadata published under `label` (without angle
    /// brackets), compiling with `--root` and the input flag the Typst-side
    /// library uses to suppress result rendering while we work.
    pub fn query(
        &self,
        file: &Path,
        label: &str,
        root: &Path,
    ) -> Result<Vec<serde_json::Value>> {
        debug!(file = %file.display(), label, "querying document");
        let output = Command::new(&self.exec)
            .arg("query")
            .arg("--root")
            .arg(root)
            .args(["--input", "escapement-working=true"])
            .arg(file)
            .arg(format!("<{label}>"))
            .output()
            .with_context(|| format!("Failed to run `{} query`", self.exec))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(CompileError(stderr).into());
        }

        let matches: Vec<QueryMatch> = serde_json::from_slice(&output.stdout)
            .context("Unexpected output shape from `typst query`")?;
        Ok(matches.into_iter().map(|m| m.value).collect())
    }
}

/// The Typst-side helper library, written to disk by `--init-lib`.
///
/// `escapement` publishes one labeled metadata record per request and reads
/// the result file back on recompilation; `finish-escapement` publishes the
/// key list this tool queries first.
pub const TYPST_LIB: &str = r#"#let escapement-keys = state("escapement-keys", 0)

#let escapement(
  setup: (:),
  ..commands,
  output-file: auto,
  handler: it => [#it],
  replacement: [`Missing information`],
) = {
  escapement-keys.display(key => {
    let file = if output-file == auto {
      "$self-" + str(key) + ".escapement"
    } else {
      output-file
    }
    [
      #metadata((
        setup: setup,
        commands: commands.pos(),
        output: file,
      )) #label("escapement-key-" + str(key))
    ]
    if sys.inputs.at("escapement-working", default: "false") == "true" {
      []
    } else {
      handler(eval(read(file)))
    }
  })
  escapement-keys.update(it => it + 1)
}

#let command(..entries, output: none, error: none) = (
  command: entries.pos(),
  output-spec: output,
  error-spec: error,
)

#let stream-format(format, color: "000000") = (
  format: format,
  color: color,
)

#let finish-escapement() = escapement-keys.display(it => [
  #metadata(
    range(it).map(jt => "escapement-key-" + str(jt)),
  ) <escapement-keys>
])

// Example:
//
// #escapement(
//   setup: ("a.txt": "hi"),
//   command("cat", "a.txt", output: stream-format("raw")),
//   handler: it => it.at(0).output.stdout,
// )
//
// #finish-escapement()
"#;
