use std::path::PathBuf;

use clap::{Parser, Subcommand};
use supplynet::{Debt, UnitId, UnitService};
use tracing::instrument;

use super::{confirm, report, terminal::Colorize};

#[derive(Debug, Subcommand)]
pub enum Admin {
    /// Reset the debt of the given units to zero
    ClearDebt(ClearDebt),

    /// Overwrite the debt of a unit
    SetDebt(SetDebt),
}

impl Admin {
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let service = UnitService::open(root)?;
        match self {
            Self::ClearDebt(command) => command.run(&service),
            Self::SetDebt(command) => command.run(&service),
        }
    }
}

#[derive(Debug, Parser)]
pub struct ClearDebt {
    /// Units whose debt is cleared
    #[arg(required = true)]
    ids: Vec<UnitId>,

    /// Skip the confirmation prompt
    #[arg(long, short)]
    yes: bool,
}

impl ClearDebt {
    #[instrument(level = "debug", skip(service))]
    fn run(self, service: &UnitService) -> anyhow::Result<()> {
        confirm(
            &format!("Clear the debt of {} units?", self.ids.len()),
            self.yes,
        )?;

        match service.clear_debt(&self.ids) {
            Ok(cleared) => {
                println!("{}", format!("✅ Cleared debt of {cleared} units").success());
                Ok(())
            }
            Err(error) => report(error),
        }
    }
}

#[derive(Debug, Parser)]
pub struct SetDebt {
    /// The unit to change
    id: UnitId,

    /// The new amount, with at most two decimal places
    #[arg(allow_negative_numbers = true)]
    amount: Debt,
}

impl SetDebt {
    #[instrument(level = "debug", skip(service))]
    fn run(self, service: &UnitService) -> anyhow::Result<()> {
        match service.set_debt(self.id, self.amount) {
            Ok(unit) => {
                println!(
                    "{}",
                    format!("✅ Debt of unit {} is now {}", unit.id(), unit.debt()).success()
                );
                Ok(())
            }
            Err(error) => report(error),
        }
    }
}
