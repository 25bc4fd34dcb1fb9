use std::{collections::BTreeSet, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use supplynet::{
    NewUnit, ProductId, Unit, UnitDetails, UnitFilter, UnitId, UnitPatch, UnitService,
};
use tracing::instrument;

use super::{OutputFormat, confirm, report, terminal::Colorize};

#[derive(Debug, Subcommand)]
pub enum UnitCommand {
    /// Create a new unit
    Create(Create),

    /// Change fields or the supplier of a unit
    Update(Update),

    /// Show a unit with its level, supplier and clients
    Show(Show),

    /// List units, optionally filtered
    List(List),

    /// Delete a unit. Its clients become roots.
    Delete(Delete),

    /// Print the level of a unit
    Level(Level),

    /// Check whether a supplier assignment would create a cycle
    CheckCycle(CheckCycle),
}

impl UnitCommand {
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let service = UnitService::open(root)?;
        match self {
            Self::Create(command) => command.run(&service),
            Self::Update(command) => command.run(&service),
            Self::Show(command) => command.run(&service),
            Self::List(command) => command.run(&service),
            Self::Delete(command) => command.run(&service),
            Self::Level(command) => command.run(&service),
            Self::CheckCycle(command) => command.run(&service),
        }
    }
}

#[derive(Debug, Parser)]
pub struct Create {
    /// Display name
    name: String,

    #[command(flatten)]
    contacts: ContactArgs,

    /// Use this id instead of the next free one
    #[arg(long)]
    id: Option<UnitId>,

    /// Supplier of the new unit
    #[arg(long)]
    supplier: Option<UnitId>,

    /// Product carried by the unit (can be given multiple times)
    #[arg(long = "product", value_name = "ID")]
    products: Vec<ProductId>,
}

#[derive(Debug, Args)]
struct ContactArgs {
    /// Contact e-mail address
    #[arg(long)]
    email: String,

    /// Country
    #[arg(long)]
    country: String,

    /// City
    #[arg(long)]
    city: String,

    /// Street
    #[arg(long)]
    street: String,

    /// Building number
    #[arg(long)]
    building: String,
}

impl Create {
    #[instrument(level = "debug", skip(service))]
    fn run(self, service: &UnitService) -> anyhow::Result<()> {
        let new = NewUnit {
            id: self.id,
            name: self.name,
            email: self.contacts.email,
            country: self.contacts.country,
            city: self.contacts.city,
            street: self.contacts.street,
            building: self.contacts.building,
            products: self.products.into_iter().collect(),
            supplier: self.supplier,
        };

        match service.create_unit(new) {
            Ok(unit) => {
                println!(
                    "{}",
                    format!("✅ Created unit {} ({})", unit.id(), unit.name()).success()
                );
                Ok(())
            }
            Err(error) => report(error),
        }
    }
}

#[derive(Debug, Parser)]
pub struct Update {
    /// The unit to change
    id: UnitId,

    /// New display name
    #[arg(long)]
    name: Option<String>,

    /// New e-mail address
    #[arg(long)]
    email: Option<String>,

    /// New country
    #[arg(long)]
    country: Option<String>,

    /// New city
    #[arg(long)]
    city: Option<String>,

    /// New street
    #[arg(long)]
    street: Option<String>,

    /// New building number
    #[arg(long)]
    building: Option<String>,

    /// Replace the carried products (can be given multiple times)
    #[arg(long = "product", value_name = "ID", conflicts_with = "clear_products")]
    products: Vec<ProductId>,

    /// Remove every carried product
    #[arg(long)]
    clear_products: bool,

    /// New supplier
    #[arg(long, conflicts_with = "root_unit")]
    supplier: Option<UnitId>,

    /// Remove the supplier, making the unit a root
    #[arg(long)]
    root_unit: bool,
}

impl Update {
    fn patch(&self) -> UnitPatch {
        let products = if self.clear_products {
            Some(BTreeSet::new())
        } else if self.products.is_empty() {
            None
        } else {
            Some(self.products.iter().copied().collect())
        };

        let supplier = if self.root_unit {
            Some(None)
        } else {
            self.supplier.map(Some)
        };

        UnitPatch {
            name: self.name.clone(),
            email: self.email.clone(),
            country: self.country.clone(),
            city: self.city.clone(),
            street: self.street.clone(),
            building: self.building.clone(),
            products,
            supplier,
        }
    }

    #[instrument(level = "debug", skip(service))]
    fn run(self, service: &UnitService) -> anyhow::Result<()> {
        match service.update_unit(self.id, &self.patch()) {
            Ok(unit) => {
                println!("{}", format!("✅ Updated unit {}", unit.id()).success());
                Ok(())
            }
            Err(error) => report(error),
        }
    }
}

#[derive(Debug, Parser)]
pub struct Show {
    /// The unit to display
    id: UnitId,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "pretty")]
    output: OutputFormat,
}

impl Show {
    #[instrument(level = "debug", skip(service))]
    fn run(self, service: &UnitService) -> anyhow::Result<()> {
        let details = match service.unit_details(self.id) {
            Ok(details) => details,
            Err(supplynet::HierarchyError::UnitNotFound(id)) => {
                eprintln!("Unit {id} not found");
                std::process::exit(1);
            }
            Err(error) => return Err(error.into()),
        };

        match self.output {
            OutputFormat::Pretty => output_pretty(&details),
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&details_json(&details))?);
            }
        }
        Ok(())
    }
}

fn output_pretty(details: &UnitDetails) {
    let unit = &details.unit;
    let contacts = unit.contacts();

    println!("# {} {}\n", unit.id(), unit.name());

    println!("{}", "Hierarchy".dim());
    println!("  Level:     {}", details.level);
    match (unit.supplier(), &details.supplier_name) {
        (Some(id), Some(name)) => println!("  Supplier:  {id} ({name})"),
        _ => println!("  Supplier:  none"),
    }
    println!("  Debt:      {}", unit.debt());

    println!("\n{}", "Contacts".dim());
    println!("  E-mail:    {}", contacts.email.as_str());
    println!(
        "  Address:   {}, {}, {} {}",
        contacts.country.as_str(),
        contacts.city.as_str(),
        contacts.street.as_str(),
        contacts.building.as_str()
    );
    println!("  Created:   {}", unit.created());

    if !details.products.is_empty() {
        println!("\n{}", "Products".dim());
        for product in &details.products {
            println!(
                "  • {} {} ({}, {})",
                product.id(),
                product.name(),
                product.model(),
                product.release_date()
            );
        }
    }

    if !details.clients.is_empty() {
        println!("\n{}", "Clients".dim());
        for client in &details.clients {
            println!("  • {client}");
        }
    }
}

fn unit_json(unit: &Unit) -> serde_json::Value {
    let contacts = unit.contacts();
    json!({
        "id": unit.id().get(),
        "name": unit.name(),
        "email": contacts.email.as_str(),
        "country": contacts.country.as_str(),
        "city": contacts.city.as_str(),
        "street": contacts.street.as_str(),
        "building": contacts.building.as_str(),
        "products": unit.products().iter().map(|p| p.get()).collect::<Vec<_>>(),
        "supplier": unit.supplier().map(UnitId::get),
        "debt": unit.debt().to_string(),
        "created": unit.created().to_rfc3339(),
    })
}

fn details_json(details: &UnitDetails) -> serde_json::Value {
    let mut output = unit_json(&details.unit);
    output["level"] = json!(details.level);
    output["supplier_name"] = json!(details.supplier_name);
    output["clients"] = json!(details.clients.iter().map(|c| c.get()).collect::<Vec<_>>());
    output
}

#[derive(Debug, Parser)]
pub struct List {
    /// Only units in this country
    #[arg(long)]
    country: Option<String>,

    /// Only units in this city
    #[arg(long)]
    city: Option<String>,

    /// Search the name, city, country and e-mail
    #[arg(long, short)]
    search: Option<String>,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "pretty")]
    output: OutputFormat,
}

impl List {
    #[instrument(level = "debug", skip(service))]
    fn run(self, service: &UnitService) -> anyhow::Result<()> {
        let filter = UnitFilter {
            country: self.country,
            city: self.city,
            search: self.search,
        };
        let units = service.units(&filter);

        match self.output {
            OutputFormat::Pretty => {
                if units.is_empty() {
                    println!("{}", "No units found".dim());
                }
                for unit in &units {
                    let level = service
                        .level_of(unit.id())
                        .map_or_else(|_| "?".to_string(), |level| level.to_string());
                    let supplier = unit
                        .supplier()
                        .map_or_else(|| "-".to_string(), |s| s.to_string());
                    println!(
                        "{:>5}  {:<30}  level {:<3} supplier {:<5} {}, {}",
                        unit.id(),
                        unit.name(),
                        level,
                        supplier,
                        unit.contacts().city.as_str(),
                        unit.contacts().country.as_str(),
                    );
                }
            }
            OutputFormat::Json => {
                let output: Vec<_> = units
                    .iter()
                    .map(|unit| {
                        let mut value = unit_json(unit);
                        value["level"] = json!(service.level_of(unit.id()).ok());
                        value
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Parser)]
pub struct Delete {
    /// The unit to delete
    id: UnitId,

    /// Skip the confirmation prompt
    #[arg(long, short)]
    yes: bool,
}

impl Delete {
    #[instrument(level = "debug", skip(service))]
    fn run(self, service: &UnitService) -> anyhow::Result<()> {
        let Some(unit) = service.unit(self.id) else {
            eprintln!("Unit {} not found", self.id);
            std::process::exit(1);
        };

        confirm(&format!("Delete unit {} ({})?", unit.id(), unit.name()), self.yes)?;

        match service.delete_unit(self.id) {
            Ok((_, detached)) => {
                println!("{}", format!("✅ Deleted unit {}", self.id).success());
                if !detached.is_empty() {
                    let ids: Vec<_> = detached.iter().map(ToString::to_string).collect();
                    println!("{}", format!("Now roots: {}", ids.join(", ")).dim());
                }
                Ok(())
            }
            Err(error) => report(error),
        }
    }
}

#[derive(Debug, Parser)]
pub struct Level {
    /// The unit to inspect
    id: UnitId,
}

impl Level {
    #[instrument(level = "debug", skip(service))]
    fn run(self, service: &UnitService) -> anyhow::Result<()> {
        println!("{}", service.level_of(self.id)?);
        Ok(())
    }
}

#[derive(Debug, Parser)]
pub struct CheckCycle {
    /// The unit that would be changed
    id: UnitId,

    /// The proposed supplier. Omit to check making the unit a root.
    supplier: Option<UnitId>,
}

impl CheckCycle {
    #[instrument(level = "debug", skip(service))]
    fn run(self, service: &UnitService) -> anyhow::Result<()> {
        if service.would_create_cycle(self.id, self.supplier)? {
            println!("{}", "cycle: the assignment would be rejected".warning());
            std::process::exit(2);
        }
        println!("{}", "ok: no cycle".success());
        Ok(())
    }
}
