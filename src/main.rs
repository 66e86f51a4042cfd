//! Sable - a static site generator with incremental watch-mode rebuilds.

#![allow(dead_code)]

mod cli;
mod config;
mod core;
mod deps;
mod embed;
mod logger;
mod pool;
mod render;
mod tracker;
mod utils;
mod watch;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    match &cli.command {
        Commands::Build { build_args, watch } => {
            logger::set_verbose(build_args.verbose);
            cli::build::run(&cli, build_args, *watch)
        }
    }
}
