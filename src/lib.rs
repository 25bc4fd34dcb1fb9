//! Supplier network records with a cycle-safe hierarchy
//!
//! Network units (factories, retail chains, sole traders) form a forest: each
//! unit has at most one supplier, and a unit's level is its distance from the
//! root of its tree. Units and products are stored as YAML files in a
//! directory.
//!
//! All changes go through [`UnitService`], which refuses any supplier edge
//! that would close a loop.

pub mod domain;
pub use domain::{
    Debt, HierarchyError, NewProduct, NewUnit, Product, ProductId, ProductPatch, Unit, UnitId,
    UnitPatch,
};

/// Filesystem storage and directory management for units and products.
pub mod storage;
pub use storage::Directory;

pub mod service;
pub use service::{MutationError, UnitDetails, UnitFilter, UnitService, ValidationError};
