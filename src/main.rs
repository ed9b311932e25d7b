//! limebag - command-line entry point

use clap::Parser;
use limebag::cli::{run, Cli};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "limebag=info".into()),
        )
        .init();

    run(Cli::parse())
}
