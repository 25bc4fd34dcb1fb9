use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::json;
use supplynet::{NewProduct, Product, ProductId, ProductPatch, UnitService};
use tracing::instrument;

use super::{OutputFormat, confirm, report, terminal::Colorize};

#[derive(Debug, Subcommand)]
pub enum ProductCommand {
    /// Create a new product
    Create(Create),

    /// Change fields of a product
    Update(Update),

    /// Show a product
    Show(Show),

    /// List all products
    List(List),

    /// Delete a product and remove it from every unit
    Delete(Delete),
}

impl ProductCommand {
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let service = UnitService::open(root)?;
        match self {
            Self::Create(command) => command.run(&service),
            Self::Update(command) => command.run(&service),
            Self::Show(command) => command.run(&service),
            Self::List(command) => command.run(&service),
            Self::Delete(command) => command.run(&service),
        }
    }
}

#[derive(Debug, Parser)]
pub struct Create {
    /// Product name
    name: String,

    /// Model designation
    #[arg(long)]
    model: String,

    /// Release date (YYYY-MM-DD)
    #[arg(long)]
    release_date: NaiveDate,
}

impl Create {
    #[instrument(level = "debug", skip(service))]
    fn run(self, service: &UnitService) -> anyhow::Result<()> {
        let new = NewProduct {
            name: self.name,
            model: self.model,
            release_date: self.release_date,
        };
        match service.create_product(new) {
            Ok(product) => {
                println!(
                    "{}",
                    format!("✅ Created product {} ({})", product.id(), product.name()).success()
                );
                Ok(())
            }
            Err(error) => report(error),
        }
    }
}

#[derive(Debug, Parser)]
pub struct Update {
    /// The product to change
    id: ProductId,

    /// New name
    #[arg(long)]
    name: Option<String>,

    /// New model designation
    #[arg(long)]
    model: Option<String>,

    /// New release date (YYYY-MM-DD)
    #[arg(long)]
    release_date: Option<NaiveDate>,
}

impl Update {
    #[instrument(level = "debug", skip(service))]
    fn run(self, service: &UnitService) -> anyhow::Result<()> {
        let patch = ProductPatch {
            name: self.name,
            model: self.model,
            release_date: self.release_date,
        };
        match service.update_product(self.id, &patch) {
            Ok(product) => {
                println!("{}", format!("✅ Updated product {}", product.id()).success());
                Ok(())
            }
            Err(error) => report(error),
        }
    }
}

#[derive(Debug, Parser)]
pub struct Show {
    /// The product to display
    id: ProductId,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "pretty")]
    output: OutputFormat,
}

impl Show {
    #[instrument(level = "debug", skip(service))]
    fn run(self, service: &UnitService) -> anyhow::Result<()> {
        let Some(product) = service.product(self.id) else {
            eprintln!("Product {} not found", self.id);
            std::process::exit(1);
        };

        match self.output {
            OutputFormat::Pretty => {
                println!("# {} {}\n", product.id(), product.name());
                println!("  Model:     {}", product.model());
                println!("  Released:  {}", product.release_date());
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&product_json(&product))?);
            }
        }
        Ok(())
    }
}

fn product_json(product: &Product) -> serde_json::Value {
    json!({
        "id": product.id().get(),
        "name": product.name(),
        "model": product.model(),
        "release_date": product.release_date().to_string(),
    })
}

#[derive(Debug, Parser)]
pub struct List {
    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "pretty")]
    output: OutputFormat,
}

impl List {
    #[instrument(level = "debug", skip(service))]
    fn run(self, service: &UnitService) -> anyhow::Result<()> {
        let products = service.products();
        match self.output {
            OutputFormat::Pretty => {
                if products.is_empty() {
                    println!("{}", "No products found".dim());
                }
                for product in &products {
                    println!(
                        "{:>5}  {:<30}  {:<20}  {}",
                        product.id(),
                        product.name(),
                        product.model(),
                        product.release_date()
                    );
                }
            }
            OutputFormat::Json => {
                let output: Vec<_> = products.iter().map(product_json).collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Parser)]
pub struct Delete {
    /// The product to delete
    id: ProductId,

    /// Skip the confirmation prompt
    #[arg(long, short)]
    yes: bool,
}

impl Delete {
    #[instrument(level = "debug", skip(service))]
    fn run(self, service: &UnitService) -> anyhow::Result<()> {
        let Some(product) = service.product(self.id) else {
            eprintln!("Product {} not found", self.id);
            std::process::exit(1);
        };

        confirm(
            &format!("Delete product {} ({})?", product.id(), product.name()),
            self.yes,
        )?;

        match service.delete_product(self.id) {
            Ok((_, carriers)) => {
                println!("{}", format!("✅ Deleted product {}", self.id).success());
                if !carriers.is_empty() {
                    println!(
                        "{}",
                        format!("Removed from {} units", carriers.len()).dim()
                    );
                }
                Ok(())
            }
            Err(error) => report(error),
        }
    }
}
