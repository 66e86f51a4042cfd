//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Sable static site generator CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Site root directory (where sable.toml lives)
    #[arg(short, long, default_value = ".", value_hint = clap::ValueHint::DirPath)]
    pub root: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build the site, then watch for changes and rebuild incrementally
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        build_args: BuildArgs,

        /// Enter watch mode after the full build
        #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false, default_value_t = true)]
        watch: bool,
    },
}

/// Shared build arguments
#[derive(clap::Args, Debug, Clone)]
pub struct BuildArgs {
    /// Number of render workers (default: host parallelism, minimum 2)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long)]
    pub verbose: bool,
}
