// Domain layer data structures for network units.
//
// This module contains the decomposed data structures used by the Network.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use non_empty_string::NonEmptyString;

use crate::domain::{Contacts, Debt, ProductId};

/// The core data of a unit, excluding identity and hierarchy information.
///
/// Identity (the id) and the supplier edge are stored separately in the
/// [`Network`](crate::domain::Network) structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitData {
    /// Display name of the unit.
    pub name: NonEmptyString,
    /// Contact and address details.
    pub contacts: Contacts,
    /// Products carried by the unit.
    pub products: BTreeSet<ProductId>,
    /// Amount owed to the supplier.
    pub debt: Debt,
    /// When the unit was created.
    pub created: DateTime<Utc>,
}
