//! The interactive safety policy.
//!
//! Every command is classified `Allow`, `Ask`, or `Forbid` before it may run.
//! The `Ask` path blocks on a console prompt; answers can grow the allow and
//! forbid sets for the rest of the run.

use std::collections::HashSet;
use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use colored::Colorize;

use crate::cancel::{CancelToken, Interrupted};

/// Resolved policy for one command name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Safety {
    Allow,
    Ask,
    Forbid,
}

/// Allow/ask/forbid sets seeded from the command line, shared across every
/// call in a run. Mutated only by answers to the interactive prompt.
#[derive(Debug)]
pub struct Validator {
    allowed: HashSet<String>,
    to_ask: HashSet<String>,
    forbidden: HashSet<String>,
    default: Safety,
}

impl Validator {
    pub fn new(
        allow: impl IntoIterator<Item = String>,
        ask: impl IntoIterator<Item = String>,
        forbid: impl IntoIterator<Item = String>,
        default: Safety,
    ) -> Self {
        Self {
            allowed: allow.into_iter().collect(),
            to_ask: ask.into_iter().collect(),
            forbidden: forbid.into_iter().collect(),
            default,
        }
    }

    /// First match wins: allow set, ask set, forbid set, then the run's
    /// default policy.
    fn resolve(&self, name: &str) -> Safety {
        if self.allowed.contains(name) {
            Safety::Allow
        } else if self.to_ask.contains(name) {
            Safety::Ask
        } else if self.forbidden.contains(name) {
            Safety::Forbid
        } else {
            self.default
        }
    }

    /// Decides whether `argv` may run on behalf of `requesting_file`.
    ///
    /// `Allow` and `Forbid` answer without side effects; `Ask` blocks on the
    /// console until the user answers. Fails only via [`Interrupted`].
    pub fn validate(
        &mut self,
        requesting_file: &str,
        argv: &[String],
        cancel: &CancelToken,
    ) -> Result<bool> {
        cancel.check()?;
        let name = argv.first().map(String::as_str).unwrap_or_default();
        match self.resolve(name) {
            Safety::Allow => Ok(true),
            Safety::Forbid => Ok(false),
            Safety::Ask => {
                let stdin = io::stdin();
                let mut input = stdin.lock();
                let mut output = io::stdout();
                self.confirm(requesting_file, argv, cancel, &mut input, &mut output)
            }
        }
    }

    /// The prompt loop, over injected handles so it can be driven by tests.
    ///
    /// `always` also records `argv[1..]` in the allow set, and `no` records
    /// them in the forbid set; both mirror how the run treats the whole
    /// vector as command names from then on.
    fn confirm(
        &mut self,
        requesting_file: &str,
        argv: &[String],
        cancel: &CancelToken,
        input: &mut impl BufRead,
        output: &mut impl Write,
    ) -> Result<bool> {
        let name = argv.first().map(String::as_str).unwrap_or_default();
        writeln!(
            output,
            "File {} asks to run command: {}",
            requesting_file.cyan(),
            argv.join(" ").bold()
        )
        .context("Failed to write safety prompt")?;

        loop {
            cancel.check()?;
            writeln!(
                output,
                "\tAllow to run? always/y/n/never/h (always/yes/no/never/help)"
            )?;
            output.flush()?;

            let mut line = String::new();
            let read = input
                .read_line(&mut line)
                .context("Failed to read safety prompt response")?;
            if read == 0 {
                // End of input: nobody can answer any more.
                return Err(Interrupted.into());
            }
            cancel.check()?;

            match line.trim() {
                "always" => {
                    self.allowed.extend(argv.iter().cloned());
                    return Ok(true);
                }
                "y" | "yes" => return Ok(true),
                "n" | "no" => {
                    self.forbidden.extend(argv.iter().cloned());
                    return Ok(false);
                }
                "never" => return Ok(false),
                "h" | "help" => {
                    writeln!(output, "always --- Yes, allow `{name}` to run from now on")?;
                    writeln!(output, "y(es) --- Allow, but this time only")?;
                    writeln!(output, "n(o)  --- Don't allow, but this time only")?;
                    writeln!(output, "never --- Never allow `{name}`")?;
                }
                _ => {
                    writeln!(output, "Invalid response, try again or type h to get help")?;
                }
            }
        }
    }
}
