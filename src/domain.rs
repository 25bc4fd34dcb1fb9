//! Domain models for the supplier network.
//!
//! This module contains the core domain types including units, products,
//! the in-memory [`Network`] store and the hierarchy walks that keep the
//! supplier graph a forest.

mod config;
pub use config::Config;

mod debt;
pub use debt::{Debt, InvalidDebtError};

mod fields;
pub use fields::{FieldError, FieldProblem};

/// Supplier-chain walks: level calculation and the cycle check.
pub mod hierarchy;
pub use hierarchy::{HierarchyError, SupplierGraph};

mod id;
pub use id::{InvalidIdError, ProductId, UnitId};

mod network;
pub use network::Network;

mod product;
pub use product::{NewProduct, Product, ProductPatch};

mod unit;
pub use unit::{Contacts, NewUnit, Unit, UnitPatch};

mod unit_data;
pub use unit_data::UnitData;
