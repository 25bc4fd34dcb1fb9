//! `supnet`: manage a supplier network stored as plain-text records.

use clap::Parser;

mod cli;

fn main() -> anyhow::Result<()> {
    cli::Cli::parse().run()
}
