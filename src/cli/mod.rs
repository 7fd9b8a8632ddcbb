//! CLI module for couplingmap
//!
//! - Argument parsing (`args`)
//! - Runtime setup: logging and the thread pool (`setup`)

pub mod args;
pub mod setup;

pub use args::{Cli, Commands, OutputFormat};
pub use setup::{configure_thread_pool, init_tracing, LOG_ENV};

/// Parse CLI arguments using Clap
pub fn parse_args() -> Cli {
    use clap::Parser;
    Cli::parse()
}
