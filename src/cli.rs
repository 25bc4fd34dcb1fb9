use std::path::{Path, PathBuf};

mod admin;
mod product;
mod terminal;
mod unit;
mod validate;

use admin::Admin;
use clap::ArgAction;
use product::ProductCommand;
use supplynet::storage;
use terminal::Colorize;
use tracing::instrument;
use unit::UnitCommand;
use validate::Validate;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// The path to the root of the network directory
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);
        self.command.run(self.root)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Initialize a new network directory
    Init,

    /// Create, inspect and change network units
    #[command(subcommand)]
    Unit(UnitCommand),

    /// Create, inspect and change products
    #[command(subcommand)]
    Product(ProductCommand),

    /// Administrative actions that bypass the public update path
    #[command(subcommand)]
    Admin(Admin),

    /// Check the supplier hierarchy for cycles
    Validate(Validate),
}

impl Command {
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        match self {
            Self::Init => Init::run(&root)?,
            Self::Unit(command) => command.run(root)?,
            Self::Product(command) => command.run(root)?,
            Self::Admin(command) => command.run(root)?,
            Self::Validate(command) => command.run(root)?,
        }
        Ok(())
    }
}

struct Init;

impl Init {
    #[instrument]
    fn run(root: &Path) -> anyhow::Result<()> {
        storage::init(root)?;
        println!(
            "{}",
            format!("✅ Initialised network directory at {}", root.display()).success()
        );
        Ok(())
    }
}

/// Output format for read commands.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Pretty,
    Json,
}

/// Ask for confirmation unless `yes` is set. Exits with code 130 if declined.
fn confirm(prompt: &str, yes: bool) -> anyhow::Result<()> {
    if yes {
        return Ok(());
    }
    let proceed = dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?;
    if !proceed {
        println!("Cancelled");
        std::process::exit(130);
    }
    Ok(())
}

/// Print a service error and exit with code 1 for rejected requests.
///
/// Internal errors are returned to the caller instead.
fn report(error: supplynet::MutationError) -> anyhow::Result<()> {
    if error.is_client_error() {
        eprintln!("{} {error}", format!("[{}]", error.reason()).warning());
        std::process::exit(1);
    }
    Err(error.into())
}
