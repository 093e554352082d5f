//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io::{self, Write};

use crate::commands;
use scoped_sync::output::{ColorChoice, OutputConfig, Stream};

const BIN_NAME: &str = "scoped-sync";

/// Scoped Sync - Synchronize a git checkout with a short-lived credential
#[derive(Parser, Debug)]
#[command(name = "scoped-sync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// When to style the summary with color and emoji
    #[arg(long, global = true, value_name = "WHEN", value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clone or update a repository using a temporary credential scope
    Sync(commands::sync::SyncArgs),

    /// Report the state of a local directory without changing it
    Inspect(commands::inspect::InspectArgs),

    /// Print a shell completion script to stdout
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);
        let output = OutputConfig::new(self.color);
        console::set_colors_enabled(output.enabled(Stream::Stdout));
        console::set_colors_enabled_stderr(output.enabled(Stream::Stderr));

        match self.command {
            Commands::Sync(args) => commands::sync::execute(args, &output),
            Commands::Inspect(args) => commands::inspect::execute(args, &output),
            Commands::Completions { shell } => {
                let mut stdout = io::stdout().lock();
                write_completions(shell, &mut stdout);
                stdout.flush()?;
                Ok(())
            }
        }
    }
}

fn write_completions(shell: Shell, out: &mut dyn Write) {
    clap_complete::generate(shell, &mut Cli::command(), BIN_NAME, out);
}

/// Initialize `env_logger`; `RUST_LOG` wins over `--log-level` when set.
fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}
