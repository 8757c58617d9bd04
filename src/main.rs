mod cli;
mod commands;
mod config;
mod engine;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config_path: Option<String>,
    pub state_path: Option<String>,
    pub url: Option<String>,
    pub auth: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config_path: cli.config,
        state_path: cli.state,
        url: cli.url,
        auth: cli.auth,
    };

    match cli.command {
        Command::Plan => commands::declarative::plan(&ctx),
        Command::Apply(args) => commands::declarative::apply(&ctx, args.yes),
        Command::Refresh => commands::declarative::refresh(&ctx),
        Command::Destroy(args) => commands::declarative::destroy(&ctx, args.yes),
        Command::Status(args) => commands::declarative::status(&ctx, args.show_secrets),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "grantsync", &mut io::stdout());
            Ok(())
        }
    }
}
