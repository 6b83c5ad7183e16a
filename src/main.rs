use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use escapement::cancel::{CancelToken, Interrupted};
use escapement::policy::{Safety, Validator};
use escapement::watch::{self, WatchConfig};

#[derive(Parser)]
#[command(name = "escapement")]
#[command(about = "Run shell commands embedded in Typst documents", long_about = None)]
#[command(version)]
struct Cli {
    /// The root directory or the file to work on
    root: Option<PathBuf>,

    /// Write the Typst-side library to this file (relative to ROOT's
    /// directory) and exit
    #[arg(long, value_name = "FILE")]
    init_lib: Option<String>,

    /// The delay between iterations in milliseconds
    #[arg(short, long, value_name = "MS", default_value_t = 0)]
    delay: u64,

    /// Process only once
    #[arg(long)]
    once: bool,

    /// Commands to trust unquestioningly (unrecommended for `rm`, `mv` and
    /// other dangerous commands)
    #[arg(long, value_name = "CMD")]
    allow: Vec<String>,

    /// Commands to ask about each time
    #[arg(short, long, value_name = "CMD")]
    ask: Vec<String>,

    /// Commands that should not be allowed to run
    #[arg(short, long, value_name = "CMD")]
    forbid: Vec<String>,

    /// Allow all commands that are not mentioned in other arguments
    #[arg(long, conflicts_with_all = ["ask_each", "forbid_all"])]
    allow_all: bool,

    /// Ask about all commands that are not mentioned in other arguments
    /// (recommended)
    #[arg(long, conflicts_with = "forbid_all")]
    ask_each: bool,

    /// Forbid all commands that are not mentioned in other arguments (the
    /// default)
    #[arg(long)]
    forbid_all: bool,

    /// The typst executable
    #[arg(long, value_name = "PATH", default_value = "typst")]
    exec: String,

    /// Do not print the output of commands
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn default_safety(&self) -> Safety {
        if self.allow_all {
            Safety::Allow
        } else if self.ask_each {
            Safety::Ask
        } else {
            Safety::Forbid
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
        eprintln!("\nReceived SIGINT signal, shutting down...");
    })
    .context("Failed to set SIGINT handler")?;

    if let Some(ref target) = cli.init_lib {
        watch::write_library(cli.root.as_deref(), target)?;
        return Ok(());
    }

    let Some(ref root) = cli.root else {
        println!("No files provided");
        return Ok(());
    };

    which::which(&cli.exec)
        .with_context(|| format!("typst executable `{}` not found", cli.exec))?;

    let mut validator = Validator::new(
        cli.allow.clone(),
        cli.ask.clone(),
        cli.forbid.clone(),
        cli.default_safety(),
    );
    let config = WatchConfig {
        root: root.clone(),
        delay: Duration::from_millis(cli.delay),
        once: cli.once,
        exec: cli.exec.clone(),
        quiet: cli.quiet,
    };

    match watch::run(&config, &mut validator, &cancel) {
        Ok(()) => Ok(()),
        // SIGINT unwound the run; the sandboxes and children are already
        // released, so this is a normal exit.
        Err(err) if err.is::<Interrupted>() => {
            println!("{}", "Stopped".dimmed());
            Ok(())
        }
        Err(err) => Err(err),
    }
}
