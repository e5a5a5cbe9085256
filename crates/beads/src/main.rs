//! Beads - a git-native issue tracker.

#![forbid(unsafe_code)]

use anyhow::Result;
use beads::cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();
    cli.execute()?;
    Ok(())
}
