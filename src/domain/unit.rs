use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use non_empty_string::NonEmptyString;

use crate::domain::{
    Debt, ProductId, UnitData, UnitId,
    fields::{self, Collector, FieldError},
};

const NAME_MAX: usize = 255;
const PLACE_MAX: usize = 100;
const BUILDING_MAX: usize = 50;

/// A node in the supplier network: a factory, a retail chain or a sole
/// trader.
///
/// A unit's position in the hierarchy is not stored here; `supplier` is a
/// snapshot of the edge held by the [`Network`](crate::domain::Network) at
/// the time the unit was read. The unit's level is derived on demand and is
/// never part of the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub(crate) id: UnitId,
    pub(crate) name: NonEmptyString,
    pub(crate) contacts: Contacts,
    pub(crate) products: BTreeSet<ProductId>,
    pub(crate) supplier: Option<UnitId>,
    pub(crate) debt: Debt,
    pub(crate) created: DateTime<Utc>,
}

/// Contact and address details of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contacts {
    /// E-mail address.
    pub email: NonEmptyString,
    /// Country.
    pub country: NonEmptyString,
    /// City.
    pub city: NonEmptyString,
    /// Street.
    pub street: NonEmptyString,
    /// Building number.
    pub building: NonEmptyString,
}

impl Unit {
    pub(crate) fn from_parts(id: UnitId, data: UnitData, supplier: Option<UnitId>) -> Self {
        Self {
            id,
            name: data.name,
            contacts: data.contacts,
            products: data.products,
            supplier,
            debt: data.debt,
            created: data.created,
        }
    }

    /// The unit's identifier.
    #[must_use]
    pub const fn id(&self) -> UnitId {
        self.id
    }

    /// The unit's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Contact and address details.
    #[must_use]
    pub const fn contacts(&self) -> &Contacts {
        &self.contacts
    }

    /// Products carried by the unit.
    #[must_use]
    pub const fn products(&self) -> &BTreeSet<ProductId> {
        &self.products
    }

    /// The unit's supplier, or `None` for a root of the hierarchy.
    #[must_use]
    pub const fn supplier(&self) -> Option<UnitId> {
        self.supplier
    }

    /// Amount owed to the supplier.
    #[must_use]
    pub const fn debt(&self) -> Debt {
        self.debt
    }

    /// When the unit was created.
    #[must_use]
    pub const fn created(&self) -> DateTime<Utc> {
        self.created
    }
}

/// The fields supplied when creating a unit.
///
/// Text fields are unvalidated; validation happens when the unit is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUnit {
    /// Identifier to use instead of the next free one.
    pub id: Option<UnitId>,
    /// Display name.
    pub name: String,
    /// E-mail address.
    pub email: String,
    /// Country.
    pub country: String,
    /// City.
    pub city: String,
    /// Street.
    pub street: String,
    /// Building number.
    pub building: String,
    /// Products carried by the unit.
    pub products: BTreeSet<ProductId>,
    /// Initial supplier.
    pub supplier: Option<UnitId>,
}

impl NewUnit {
    /// Validate the text fields and build the unit data, stamped with the
    /// current time and a zero debt.
    pub(crate) fn into_data(self) -> Result<UnitData, nonempty::NonEmpty<FieldError>> {
        let mut errors = Collector::default();
        let name = errors.check(fields::text("name", &self.name, NAME_MAX));
        let contacts = Contacts::collect(
            &mut errors,
            [
                &self.email,
                &self.country,
                &self.city,
                &self.street,
                &self.building,
            ],
        );
        errors.finish()?;

        match (name, contacts) {
            (Some(name), Some(contacts)) => Ok(UnitData {
                name,
                contacts,
                products: self.products,
                debt: Debt::ZERO,
                created: Utc::now(),
            }),
            _ => unreachable!("collector reported no errors"),
        }
    }
}

/// A partial update to a unit.
///
/// Fields left as `None` are kept as they are. `supplier` distinguishes
/// "leave the supplier alone" (`None`) from "make this unit a root"
/// (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitPatch {
    /// New display name.
    pub name: Option<String>,
    /// New e-mail address.
    pub email: Option<String>,
    /// New country.
    pub country: Option<String>,
    /// New city.
    pub city: Option<String>,
    /// New street.
    pub street: Option<String>,
    /// New building number.
    pub building: Option<String>,
    /// Replacement product set.
    pub products: Option<BTreeSet<ProductId>>,
    /// New supplier edge.
    #[allow(clippy::option_option)]
    pub supplier: Option<Option<UnitId>>,
}

impl UnitPatch {
    /// A patch that only reassigns the supplier.
    #[must_use]
    pub fn supplier(supplier: Option<UnitId>) -> Self {
        Self {
            supplier: Some(supplier),
            ..Self::default()
        }
    }

    /// Apply the non-hierarchy fields of the patch to a copy of `current`.
    ///
    /// All field errors are collected. Debt and creation time are always
    /// carried over unchanged.
    pub(crate) fn apply(
        &self,
        current: &UnitData,
    ) -> Result<UnitData, nonempty::NonEmpty<FieldError>> {
        let mut errors = Collector::default();

        let name = self.name.as_ref().map_or_else(
            || Some(current.name.clone()),
            |name| errors.check(fields::text("name", name, NAME_MAX)),
        );

        let existing = &current.contacts;
        let contacts = Contacts::collect(
            &mut errors,
            [
                self.email.as_deref().unwrap_or(existing.email.as_str()),
                self.country.as_deref().unwrap_or(existing.country.as_str()),
                self.city.as_deref().unwrap_or(existing.city.as_str()),
                self.street.as_deref().unwrap_or(existing.street.as_str()),
                self.building.as_deref().unwrap_or(existing.building.as_str()),
            ],
        );
        errors.finish()?;

        match (name, contacts) {
            (Some(name), Some(contacts)) => Ok(UnitData {
                name,
                contacts,
                products: self
                    .products
                    .clone()
                    .unwrap_or_else(|| current.products.clone()),
                debt: current.debt,
                created: current.created,
            }),
            _ => unreachable!("collector reported no errors"),
        }
    }
}

impl Contacts {
    /// Validate `[email, country, city, street, building]`.
    fn collect<S: AsRef<str>>(errors: &mut Collector, values: [S; 5]) -> Option<Self> {
        let [email, country, city, street, building] = values;
        let email = errors.check(fields::email("email", email.as_ref()));
        let country = errors.check(fields::text("country", country.as_ref(), PLACE_MAX));
        let city = errors.check(fields::text("city", city.as_ref(), PLACE_MAX));
        let street = errors.check(fields::text("street", street.as_ref(), PLACE_MAX));
        let building = errors.check(fields::text("building", building.as_ref(), BUILDING_MAX));

        Some(Self {
            email: email?,
            country: country?,
            city: city?,
            street: street?,
            building: building?,
        })
    }
}
