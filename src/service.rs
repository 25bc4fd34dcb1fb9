//! Mutation orchestration for the supplier network.
//!
//! [`UnitService`] is the single entry point for changing units and
//! products. Every write takes the exclusive lock, validates the request
//! against the current [`Network`], commits it, and flushes the touched
//! records to disk before releasing the lock. The cycle check and the edge
//! write therefore always see the same state.
//!
//! Reads take the shared lock and compute derived values, such as a unit's
//! level, freshly from the current graph.

use std::{path::PathBuf, sync::Arc};

use nonempty::NonEmpty;
use parking_lot::RwLock;
use tracing::instrument;

use crate::{
    domain::{
        Debt, FieldError, HierarchyError, Network, NewProduct, NewUnit, Product, ProductId,
        ProductPatch, SupplierGraph, Unit, UnitId, UnitPatch, hierarchy,
    },
    storage::{Directory, DirectoryLoadError, FlushError, directory::Checkpoint},
};

/// A handle to a supplier network directory, safe to share between threads.
///
/// Cloning the handle is cheap; all clones operate on the same directory.
#[derive(Debug, Clone)]
pub struct UnitService {
    directory: Arc<RwLock<Directory>>,
}

impl UnitService {
    /// Open the directory at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be loaded.
    pub fn open(root: PathBuf) -> Result<Self, DirectoryLoadError> {
        Ok(Self::from_directory(Directory::new(root)?))
    }

    /// Wrap an already loaded directory.
    #[must_use]
    pub fn from_directory(directory: Directory) -> Self {
        Self {
            directory: Arc::new(RwLock::new(directory)),
        }
    }

    /// Run a read-only closure against a consistent view of the network.
    #[must_use]
    pub fn read<R>(&self, f: impl FnOnce(&Network) -> R) -> R {
        f(self.directory.read().network())
    }

    /// Create a unit.
    ///
    /// The id is taken from the draft if given, otherwise the next free id
    /// is used. If the draft names a supplier, the edge is checked for
    /// cycles against the would-be id before anything is written.
    ///
    /// # Errors
    ///
    /// - [`ValidationError`] if a field is invalid, the id is taken, a
    ///   product does not exist, or the supplier edge would close a loop
    /// - [`MutationError::SupplierNotFound`] if the supplier does not exist
    /// - [`MutationError::IdsExhausted`] if no id is given and the largest
    ///   possible id has already been used
    /// - [`MutationError::Persist`] if the record cannot be written
    #[instrument(skip(self, new), fields(name = %new.name))]
    pub fn create_unit(&self, new: NewUnit) -> Result<Unit, MutationError> {
        let mut directory = self.directory.write();
        let network = directory.network();

        let (requested, supplier) = (new.id, new.supplier);
        let data = new.into_data().map_err(ValidationError::Fields)?;
        let id = match requested {
            Some(id) if network.contains_unit(id) => {
                return Err(ValidationError::DuplicateId(id).into());
            }
            Some(id) => id,
            None => network.next_unit_id().ok_or(MutationError::IdsExhausted)?,
        };
        check_products(network, data.products.iter().copied())?;
        check_supplier(network, id, supplier)?;

        let checkpoint = directory.checkpoint();
        directory.insert_unit(id, data, supplier);
        persist(&mut directory, checkpoint)?;

        tracing::info!(unit = %id, supplier = ?supplier, "created unit");
        fetch_unit(&directory, id)
    }

    /// Apply a partial update to a unit.
    ///
    /// The update is all-or-nothing. Every field is validated and, if the
    /// supplier changes, the cycle check is run before anything is
    /// written. A rejected update leaves the unit untouched. Re-assigning
    /// the current supplier is a no-op for the hierarchy and never fails
    /// the cycle check.
    ///
    /// # Errors
    ///
    /// - [`MutationError::UnitNotFound`] if the unit does not exist
    /// - [`ValidationError::CyclicSupplierReference`] if the new supplier is
    ///   the unit itself or one of its descendants
    /// - [`ValidationError`] for invalid fields or unknown products
    /// - [`MutationError::SupplierNotFound`] if the supplier does not exist
    /// - [`MutationError::Persist`] if the record cannot be written
    #[instrument(skip(self, patch))]
    pub fn update_unit(&self, id: UnitId, patch: &UnitPatch) -> Result<Unit, MutationError> {
        let mut directory = self.directory.write();
        let network = directory.network();

        let current = network
            .unit_data(id)
            .ok_or(MutationError::UnitNotFound(id))?;
        let current_supplier = network.supplier_of(id).flatten();

        let data = patch.apply(current).map_err(ValidationError::Fields)?;
        if patch.products.is_some() {
            check_products(network, data.products.iter().copied())?;
        }

        let supplier_change = patch.supplier.filter(|&s| s != current_supplier);
        if let Some(supplier) = supplier_change {
            check_supplier(network, id, supplier)?;
        }

        let data_changed = data != *current;
        if !data_changed && supplier_change.is_none() {
            tracing::debug!(unit = %id, "update changes nothing");
            return fetch_unit(&directory, id);
        }

        let checkpoint = directory.checkpoint();
        if data_changed {
            directory.replace_unit_data(id, data);
        }
        if let Some(supplier) = supplier_change {
            directory.set_supplier(id, supplier)?;
        }
        persist(&mut directory, checkpoint)?;

        tracing::info!(unit = %id, supplier = ?supplier_change, "updated unit");
        fetch_unit(&directory, id)
    }

    /// Point a unit at a new supplier, or make it a root with `None`.
    ///
    /// # Errors
    ///
    /// See [`UnitService::update_unit`].
    pub fn set_supplier(
        &self,
        id: UnitId,
        supplier: Option<UnitId>,
    ) -> Result<Unit, MutationError> {
        self.update_unit(id, &UnitPatch::supplier(supplier))
    }

    /// Delete a unit. Its clients lose their supplier and become roots.
    ///
    /// Returns the deleted unit and the ids of the detached clients.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::UnitNotFound`] if the unit does not exist,
    /// or [`MutationError::Persist`] if the change cannot be written.
    #[instrument(skip(self))]
    pub fn delete_unit(&self, id: UnitId) -> Result<(Unit, Vec<UnitId>), MutationError> {
        let mut directory = self.directory.write();
        let checkpoint = directory.checkpoint();
        let removed = directory
            .remove_unit(id)
            .ok_or(MutationError::UnitNotFound(id))?;
        persist(&mut directory, checkpoint)?;
        drop(directory);

        tracing::info!(unit = %id, detached = removed.1.len(), "deleted unit");
        Ok(removed)
    }

    /// Create a product with the next free id.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Fields`] if a field is invalid,
    /// [`MutationError::IdsExhausted`] if every product id has been used, or
    /// [`MutationError::Persist`] if the record cannot be written.
    #[instrument(skip(self, new), fields(name = %new.name))]
    pub fn create_product(&self, new: NewProduct) -> Result<Product, MutationError> {
        let mut directory = self.directory.write();
        let id = directory
            .network()
            .next_product_id()
            .ok_or(MutationError::IdsExhausted)?;
        let product = new.into_product(id).map_err(ValidationError::Fields)?;

        let checkpoint = directory.checkpoint();
        directory.insert_product(product.clone());
        persist(&mut directory, checkpoint)?;
        drop(directory);

        tracing::info!(product = %id, "created product");
        Ok(product)
    }

    /// Apply a partial update to a product.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::ProductNotFound`] if the product does not
    /// exist, [`ValidationError::Fields`] if a field is invalid, or
    /// [`MutationError::Persist`] if the record cannot be written.
    #[instrument(skip(self, patch))]
    pub fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, MutationError> {
        let mut directory = self.directory.write();
        let current = directory
            .network()
            .product(id)
            .ok_or(MutationError::ProductNotFound(id))?;
        let product = patch.apply(current).map_err(ValidationError::Fields)?;
        if product == *current {
            return Ok(product);
        }

        let checkpoint = directory.checkpoint();
        directory.replace_product(product.clone());
        persist(&mut directory, checkpoint)?;
        drop(directory);

        tracing::info!(product = %id, "updated product");
        Ok(product)
    }

    /// Delete a product and remove it from every unit that carries it.
    ///
    /// Returns the deleted product and the ids of the units that carried it.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::ProductNotFound`] if the product does not
    /// exist, or [`MutationError::Persist`] if the change cannot be written.
    #[instrument(skip(self))]
    pub fn delete_product(&self, id: ProductId) -> Result<(Product, Vec<UnitId>), MutationError> {
        let mut directory = self.directory.write();
        let checkpoint = directory.checkpoint();
        let removed = directory
            .remove_product(id)
            .ok_or(MutationError::ProductNotFound(id))?;
        persist(&mut directory, checkpoint)?;
        drop(directory);

        tracing::info!(product = %id, carriers = removed.1.len(), "deleted product");
        Ok(removed)
    }

    /// Reset the debt of every listed unit to zero.
    ///
    /// This is an administrative action and bypasses the public update
    /// path. Either every unit is cleared or, if any id is unknown, none is.
    /// Returns the number of units whose debt changed.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::UnitNotFound`] for the first unknown id, or
    /// [`MutationError::Persist`] if the change cannot be written.
    #[instrument(skip(self))]
    pub fn clear_debt(&self, ids: &[UnitId]) -> Result<usize, MutationError> {
        let mut directory = self.directory.write();
        if let Some(&missing) = ids.iter().find(|&&id| !directory.network().contains_unit(id)) {
            return Err(MutationError::UnitNotFound(missing));
        }

        let checkpoint = directory.checkpoint();
        let cleared = ids
            .iter()
            .filter(|&&id| directory.set_debt(id, Debt::ZERO).is_some_and(|d| !d.is_zero()))
            .count();
        persist(&mut directory, checkpoint)?;
        drop(directory);

        tracing::info!(cleared, "cleared debt");
        Ok(cleared)
    }

    /// Overwrite the debt of a unit.
    ///
    /// This is an administrative action and bypasses the public update
    /// path.
    ///
    /// # Errors
    ///
    /// - [`MutationError::UnitNotFound`] if the unit does not exist
    /// - [`ValidationError::DebtTooLarge`] if the amount has more digits
    ///   than the directory configuration allows
    /// - [`MutationError::Persist`] if the change cannot be written
    #[instrument(skip(self, debt), fields(debt = %debt))]
    pub fn set_debt(&self, id: UnitId, debt: Debt) -> Result<Unit, MutationError> {
        let mut directory = self.directory.write();
        let max_digits = directory.config().max_debt_digits();
        if debt.digits() > u32::from(max_digits) {
            return Err(ValidationError::DebtTooLarge { debt, max_digits }.into());
        }

        let checkpoint = directory.checkpoint();
        let previous = directory
            .set_debt(id, debt)
            .ok_or(MutationError::UnitNotFound(id))?;
        persist(&mut directory, checkpoint)?;

        tracing::info!(unit = %id, %previous, "set debt");
        fetch_unit(&directory, id)
    }

    /// Whether making `supplier` the supplier of `unit` would create a
    /// cycle. See [`hierarchy::would_create_cycle`].
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::SupplierNotFound`] if the supplier does not
    /// exist, or [`HierarchyError::Corrupted`] if the stored hierarchy
    /// already loops.
    pub fn would_create_cycle(
        &self,
        unit: UnitId,
        supplier: Option<UnitId>,
    ) -> Result<bool, HierarchyError> {
        self.read(|network| hierarchy::would_create_cycle(network, unit, supplier))
    }

    /// The level of a unit, computed from the current graph.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::UnitNotFound`] if the unit does not exist,
    /// or [`HierarchyError::Corrupted`] if its chain loops.
    pub fn level_of(&self, unit: UnitId) -> Result<usize, HierarchyError> {
        self.read(|network| hierarchy::level_of(network, unit))
    }

    /// Look up a unit.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<Unit> {
        self.read(|network| network.unit(id))
    }

    /// A unit together with the values derived from its neighbourhood.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::UnitNotFound`] if the unit does not exist,
    /// or [`HierarchyError::Corrupted`] if its chain loops.
    pub fn unit_details(&self, id: UnitId) -> Result<UnitDetails, HierarchyError> {
        self.read(|network| {
            let unit = network.unit(id).ok_or(HierarchyError::UnitNotFound(id))?;
            let level = hierarchy::level_of(network, id)?;
            let supplier_name = unit
                .supplier()
                .and_then(|s| network.unit(s))
                .map(|s| s.name().to_string());
            let mut clients: Vec<_> = network.clients(id).collect();
            clients.sort();
            let products = unit
                .products()
                .iter()
                .filter_map(|&p| network.product(p).cloned())
                .collect();

            Ok(UnitDetails {
                unit,
                level,
                supplier_name,
                clients,
                products,
            })
        })
    }

    /// All units matching the filter, in id order.
    #[must_use]
    pub fn units(&self, filter: &UnitFilter) -> Vec<Unit> {
        self.read(|network| network.units().filter(|u| filter.matches(u)).collect())
    }

    /// Look up a product.
    #[must_use]
    pub fn product(&self, id: ProductId) -> Option<Product> {
        self.read(|network| network.product(id).cloned())
    }

    /// All products, in id order.
    #[must_use]
    pub fn products(&self) -> Vec<Product> {
        self.read(|network| network.products().cloned().collect())
    }
}

/// A unit with its level, supplier name, clients and products resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDetails {
    /// The unit itself.
    pub unit: Unit,
    /// Number of supplier edges between the unit and its root.
    pub level: usize,
    /// Name of the supplier, if any.
    pub supplier_name: Option<String>,
    /// Units supplied by this one, in id order.
    pub clients: Vec<UnitId>,
    /// Products carried by the unit.
    pub products: Vec<Product>,
}

/// Criteria for listing units. Empty criteria match every unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitFilter {
    /// Only units in exactly this country.
    pub country: Option<String>,
    /// Only units in exactly this city.
    pub city: Option<String>,
    /// Case-insensitive substring of the name, city, country or e-mail.
    pub search: Option<String>,
}

impl UnitFilter {
    /// Whether a unit satisfies every criterion.
    #[must_use]
    pub fn matches(&self, unit: &Unit) -> bool {
        let contacts = unit.contacts();
        if self
            .country
            .as_deref()
            .is_some_and(|country| contacts.country.as_str() != country)
        {
            return false;
        }
        if self
            .city
            .as_deref()
            .is_some_and(|city| contacts.city.as_str() != city)
        {
            return false;
        }

        self.search.as_deref().is_none_or(|term| {
            let term = term.to_lowercase();
            [
                unit.name(),
                contacts.city.as_str(),
                contacts.country.as_str(),
                contacts.email.as_str(),
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&term))
        })
    }
}

/// A request that was well-formed but not acceptable.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The supplier edge would close a loop in the hierarchy.
    #[error("cyclic supplier reference: unit {unit} cannot be supplied by {supplier}")]
    CyclicSupplierReference {
        /// The unit being updated or created.
        unit: UnitId,
        /// The rejected supplier.
        supplier: UnitId,
    },

    /// One or more fields hold invalid values.
    #[error("invalid fields: {}", join(.0.iter()))]
    Fields(NonEmpty<FieldError>),

    /// A unit with the requested id already exists.
    #[error("unit {0} already exists")]
    DuplicateId(UnitId),

    /// The unit references products that do not exist.
    #[error("unknown products: {}", join(.0.iter()))]
    UnknownProducts(Vec<ProductId>),

    /// The debt has more significant digits than allowed.
    #[error("debt {debt} has more than {max_digits} digits")]
    DebtTooLarge {
        /// The rejected amount.
        debt: Debt,
        /// The configured limit.
        max_digits: u8,
    },
}

/// Errors returned by [`UnitService`] mutations.
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    /// The unit does not exist.
    #[error("unit {0} not found")]
    UnitNotFound(UnitId),

    /// The requested supplier does not exist.
    #[error("supplier {0} not found")]
    SupplierNotFound(UnitId),

    /// The product does not exist.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// Every id up to `u64::MAX` has been handed out.
    #[error("no free ids left")]
    IdsExhausted,

    /// The request was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The stored hierarchy is inconsistent.
    #[error(transparent)]
    Hierarchy(HierarchyError),

    /// The change could not be written to disk. It has been rolled back in
    /// memory, and the touched records rewritten to match where possible.
    #[error(transparent)]
    Persist(#[from] FlushError),
}

impl MutationError {
    /// A stable, machine-readable code for the error.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::UnitNotFound(_) => "UnitNotFound",
            Self::SupplierNotFound(_) => "SupplierNotFound",
            Self::ProductNotFound(_) => "ProductNotFound",
            Self::IdsExhausted => "IdsExhausted",
            Self::Validation(error) => match error {
                ValidationError::CyclicSupplierReference { .. } => "CyclicSupplierReference",
                ValidationError::Fields(_) => "InvalidFields",
                ValidationError::DuplicateId(_) => "DuplicateId",
                ValidationError::UnknownProducts(_) => "UnknownProduct",
                ValidationError::DebtTooLarge { .. } => "DebtTooLarge",
            },
            Self::Hierarchy(_) => "CorruptedHierarchy",
            Self::Persist(_) => "PersistFailed",
        }
    }

    /// Whether the error was caused by the request rather than by the
    /// state of the system.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::IdsExhausted | Self::Hierarchy(_) | Self::Persist(_)
        )
    }
}

impl From<HierarchyError> for MutationError {
    fn from(error: HierarchyError) -> Self {
        match error {
            HierarchyError::UnitNotFound(id) => Self::UnitNotFound(id),
            HierarchyError::SupplierNotFound(id) => Self::SupplierNotFound(id),
            HierarchyError::Corrupted { .. } => Self::Hierarchy(error),
        }
    }
}

fn join<T: ToString>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn check_products(
    network: &Network,
    products: impl IntoIterator<Item = ProductId>,
) -> Result<(), ValidationError> {
    let unknown: Vec<_> = products
        .into_iter()
        .filter(|&p| !network.contains_product(p))
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::UnknownProducts(unknown))
    }
}

/// The one place a supplier edge is checked before it is written.
fn check_supplier(
    network: &Network,
    unit: UnitId,
    supplier: Option<UnitId>,
) -> Result<(), MutationError> {
    let Some(supplier) = supplier else {
        return Ok(());
    };
    if !network.contains_unit(supplier) {
        return Err(MutationError::SupplierNotFound(supplier));
    }
    if hierarchy::would_create_cycle(network, unit, Some(supplier))? {
        tracing::warn!(unit = %unit, supplier = %supplier, "rejected cyclic supplier reference");
        return Err(ValidationError::CyclicSupplierReference { unit, supplier }.into());
    }
    Ok(())
}

/// Flush the changes made since `checkpoint`. On failure the directory is
/// rolled back to it.
fn persist(directory: &mut Directory, checkpoint: Checkpoint) -> Result<(), MutationError> {
    directory.commit(checkpoint).map_err(|error| {
        tracing::error!("{error}");
        MutationError::Persist(error)
    })?;
    Ok(())
}

fn fetch_unit(directory: &Directory, id: UnitId) -> Result<Unit, MutationError> {
    directory
        .network()
        .unit(id)
        .ok_or(MutationError::UnitNotFound(id))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use super::*;

    fn setup() -> (TempDir, UnitService) {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let service = UnitService::open(tmp.path().to_path_buf()).unwrap();
        (tmp, service)
    }

    fn draft(name: &str, supplier: Option<UnitId>) -> NewUnit {
        NewUnit {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
            country: "Russia".to_string(),
            city: "Moscow".to_string(),
            street: "Tverskaya".to_string(),
            building: "1".to_string(),
            supplier,
            ..NewUnit::default()
        }
    }

    /// F (root), R (supplied by F), I (supplied by R)
    fn factory_retail_trader(service: &UnitService) -> (UnitId, UnitId, UnitId) {
        let f = service.create_unit(draft("Factory", None)).unwrap().id();
        let r = service.create_unit(draft("Retail", Some(f))).unwrap().id();
        let i = service.create_unit(draft("Trader", Some(r))).unwrap().id();
        (f, r, i)
    }

    #[test]
    fn levels_follow_the_chain() {
        let (_tmp, service) = setup();
        let (f, r, i) = factory_retail_trader(&service);

        assert_eq!(service.level_of(f).unwrap(), 0);
        assert_eq!(service.level_of(r).unwrap(), 1);
        assert_eq!(service.level_of(i).unwrap(), 2);
    }

    #[test]
    fn root_cannot_be_supplied_by_its_descendant() {
        let (tmp, service) = setup();
        let (f, _, i) = factory_retail_trader(&service);
        let on_disk = std::fs::read_to_string(tmp.path().join("units/1.yaml")).unwrap();

        let error = service.set_supplier(f, Some(i)).unwrap_err();

        assert_eq!(error.reason(), "CyclicSupplierReference");
        assert!(error.is_client_error());
        assert!(error.to_string().contains("cyclic supplier reference"));
        assert_eq!(service.level_of(f).unwrap(), 0);
        assert_eq!(service.unit(f).unwrap().supplier(), None);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("units/1.yaml")).unwrap(),
            on_disk
        );
    }

    #[test]
    fn self_supply_is_rejected() {
        let (_tmp, service) = setup();
        let (f, _, _) = factory_retail_trader(&service);
        let error = service.set_supplier(f, Some(f)).unwrap_err();
        assert_eq!(error.reason(), "CyclicSupplierReference");
    }

    #[test]
    fn reassigning_current_supplier_is_a_no_op() {
        let (_tmp, service) = setup();
        let (_, r, i) = factory_retail_trader(&service);
        let before = service.unit(i).unwrap();

        let after = service.set_supplier(i, Some(r)).unwrap();

        assert_eq!(after, before);
        assert_eq!(service.level_of(i).unwrap(), 2);
    }

    #[test]
    fn clearing_the_supplier_makes_a_root() {
        let (_tmp, service) = setup();
        let (_, _, i) = factory_retail_trader(&service);
        service.set_supplier(i, None).unwrap();
        assert_eq!(service.level_of(i).unwrap(), 0);
    }

    #[test]
    fn rejected_update_changes_no_field() {
        let (_tmp, service) = setup();
        let (f, _, i) = factory_retail_trader(&service);
        let before = service.unit(f).unwrap();

        let patch = UnitPatch {
            name: Some("Renamed".to_string()),
            supplier: Some(Some(i)),
            ..UnitPatch::default()
        };
        service.update_unit(f, &patch).unwrap_err();

        assert_eq!(service.unit(f).unwrap(), before);
    }

    #[test]
    fn invalid_field_blocks_supplier_change() {
        let (_tmp, service) = setup();
        let (f, _, i) = factory_retail_trader(&service);

        let patch = UnitPatch {
            email: Some("nope".to_string()),
            supplier: Some(None),
            ..UnitPatch::default()
        };
        let error = service.update_unit(i, &patch).unwrap_err();

        assert_eq!(error.reason(), "InvalidFields");
        assert_eq!(service.level_of(i).unwrap(), 2);
        assert_eq!(service.level_of(f).unwrap(), 0);
    }

    #[test]
    fn unknown_supplier_is_reported() {
        let (_tmp, service) = setup();
        let (f, _, _) = factory_retail_trader(&service);
        let missing = UnitId::try_from(99).unwrap();

        let error = service.set_supplier(f, Some(missing)).unwrap_err();
        assert!(matches!(error, MutationError::SupplierNotFound(id) if id == missing));
    }

    #[test]
    fn create_with_taken_id_is_rejected() {
        let (_tmp, service) = setup();
        let (f, _, _) = factory_retail_trader(&service);

        let mut new = draft("Clone", None);
        new.id = Some(f);
        let error = service.create_unit(new).unwrap_err();
        assert_eq!(error.reason(), "DuplicateId");
    }

    #[test]
    fn create_with_chosen_id_runs_the_cycle_check() {
        let (_tmp, service) = setup();
        let (_, _, i) = factory_retail_trader(&service);

        let mut new = draft("Leaf", Some(i));
        new.id = Some(UnitId::try_from(10).unwrap());
        let created = service.create_unit(new).unwrap();

        assert_eq!(created.id().get(), 10);
        assert_eq!(service.level_of(created.id()).unwrap(), 3);
    }

    #[test]
    fn unknown_products_are_rejected() {
        let (_tmp, service) = setup();
        let mut new = draft("Shop", None);
        new.products.insert(ProductId::MIN);

        let error = service.create_unit(new).unwrap_err();
        assert_eq!(error.reason(), "UnknownProduct");
    }

    #[test]
    fn deleting_a_supplier_detaches_clients() {
        let (_tmp, service) = setup();
        let (_, r, i) = factory_retail_trader(&service);

        let (_, detached) = service.delete_unit(r).unwrap();

        assert_eq!(detached, [i]);
        assert_eq!(service.level_of(i).unwrap(), 0);
        assert!(service.unit(r).is_none());
    }

    #[test]
    fn deleting_a_product_unlinks_it() {
        let (_tmp, service) = setup();
        let product = service
            .create_product(NewProduct {
                name: "Смартфон".to_string(),
                model: "S-1".to_string(),
                release_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            })
            .unwrap();
        let mut new = draft("Shop", None);
        new.products.insert(product.id());
        let shop = service.create_unit(new).unwrap();

        let (_, carriers) = service.delete_product(product.id()).unwrap();

        assert_eq!(carriers, [shop.id()]);
        assert!(service.unit(shop.id()).unwrap().products().is_empty());
    }

    #[test]
    fn update_product_keeps_untouched_fields() {
        let (_tmp, service) = setup();
        let product = service
            .create_product(NewProduct {
                name: "Пылесос".to_string(),
                model: "P-2".to_string(),
                release_date: NaiveDate::from_ymd_opt(2020, 2, 2).unwrap(),
            })
            .unwrap();

        let patch = ProductPatch {
            model: Some("P-3".to_string()),
            ..ProductPatch::default()
        };
        let updated = service.update_product(product.id(), &patch).unwrap();

        assert_eq!(updated.name(), "Пылесос");
        assert_eq!(updated.model(), "P-3");
    }

    #[test]
    fn clear_debt_is_all_or_nothing() {
        let (_tmp, service) = setup();
        let (f, r, _) = factory_retail_trader(&service);
        service.set_debt(f, Debt::from_cents(10_000)).unwrap();
        service.set_debt(r, Debt::from_cents(250)).unwrap();

        let missing = UnitId::try_from(42).unwrap();
        let error = service.clear_debt(&[f, missing]).unwrap_err();
        assert_eq!(error.reason(), "UnitNotFound");
        assert_eq!(service.unit(f).unwrap().debt(), Debt::from_cents(10_000));

        assert_eq!(service.clear_debt(&[f, r]).unwrap(), 2);
        assert!(service.unit(f).unwrap().debt().is_zero());
        assert!(service.unit(r).unwrap().debt().is_zero());
    }

    #[test]
    fn set_debt_respects_digit_limit() {
        let (_tmp, service) = setup();
        let (f, _, _) = factory_retail_trader(&service);

        let too_large = "12345678901.00".parse().unwrap();
        let error = service.set_debt(f, too_large).unwrap_err();
        assert_eq!(error.reason(), "DebtTooLarge");

        let fits = "1234567890.99".parse().unwrap();
        assert_eq!(service.set_debt(f, fits).unwrap().debt(), fits);
    }

    #[test]
    fn public_update_never_touches_debt() {
        let (_tmp, service) = setup();
        let (f, _, _) = factory_retail_trader(&service);
        service.set_debt(f, Debt::from_cents(999)).unwrap();

        let patch = UnitPatch {
            city: Some("Kazan".to_string()),
            ..UnitPatch::default()
        };
        let updated = service.update_unit(f, &patch).unwrap();
        assert_eq!(updated.debt(), Debt::from_cents(999));
    }

    #[test]
    fn details_resolve_neighbourhood() {
        let (_tmp, service) = setup();
        let (f, r, i) = factory_retail_trader(&service);

        let details = service.unit_details(r).unwrap();

        assert_eq!(details.level, 1);
        assert_eq!(details.supplier_name.as_deref(), Some("Factory"));
        assert_eq!(details.clients, [i]);
        assert_eq!(service.unit_details(f).unwrap().supplier_name, None);
    }

    #[test]
    fn filter_by_country_city_and_search() {
        let (_tmp, service) = setup();
        factory_retail_trader(&service);
        let mut abroad = draft("Shenzhen Works", None);
        abroad.country = "China".to_string();
        abroad.city = "Shenzhen".to_string();
        service.create_unit(abroad).unwrap();

        let china = UnitFilter {
            country: Some("China".to_string()),
            ..UnitFilter::default()
        };
        assert_eq!(service.units(&china).len(), 1);

        let moscow = UnitFilter {
            city: Some("Moscow".to_string()),
            ..UnitFilter::default()
        };
        assert_eq!(service.units(&moscow).len(), 3);

        let search = UnitFilter {
            search: Some("RETAIL".to_string()),
            ..UnitFilter::default()
        };
        assert_eq!(service.units(&search).len(), 1);

        assert_eq!(service.units(&UnitFilter::default()).len(), 4);
    }

    #[test]
    fn changes_survive_reopening() {
        let (tmp, service) = setup();
        let (f, _, i) = factory_retail_trader(&service);
        service.set_supplier(i, Some(f)).unwrap();

        let reopened = UnitService::open(tmp.path().to_path_buf()).unwrap();
        assert_eq!(reopened.level_of(i).unwrap(), 1);
    }

    #[test]
    fn exhausted_unit_ids_are_an_error() {
        let (_tmp, service) = setup();
        let mut last = draft("Last", None);
        last.id = Some(UnitId::try_from(u64::MAX).unwrap());
        service.create_unit(last).unwrap();

        let error = service.create_unit(draft("Overflow", None)).unwrap_err();

        assert!(matches!(error, MutationError::IdsExhausted));
        assert_eq!(error.reason(), "IdsExhausted");
        assert!(!error.is_client_error());
        assert_eq!(service.units(&UnitFilter::default()).len(), 1);
    }

    #[test]
    fn deleting_the_newest_unit_keeps_its_id_retired() {
        let (_tmp, service) = setup();
        let (_, _, i) = factory_retail_trader(&service);
        service.delete_unit(i).unwrap();

        let next = service.create_unit(draft("Newcomer", None)).unwrap();
        assert_eq!(next.id().get(), i.get() + 1);
    }

    #[test]
    fn failed_create_leaves_no_unit_behind() {
        let (tmp, service) = setup();
        let f = service.create_unit(draft("Factory", None)).unwrap().id();
        let before = service.read(Network::clone);
        std::fs::create_dir_all(tmp.path().join("units/2.yaml")).unwrap();

        let error = service.create_unit(draft("Retail", Some(f))).unwrap_err();

        assert_eq!(error.reason(), "PersistFailed");
        assert!(!error.is_client_error());
        assert!(service.unit(UnitId::try_from(2).unwrap()).is_none());
        assert_eq!(service.read(Network::clone), before);
    }

    #[test]
    fn failed_update_leaves_the_unit_unchanged() {
        let (tmp, service) = setup();
        let (f, _, _) = factory_retail_trader(&service);
        let before = service.unit(f).unwrap();
        let path = tmp.path().join("units/1.yaml");
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir_all(&path).unwrap();

        let patch = UnitPatch {
            city: Some("Kazan".to_string()),
            ..UnitPatch::default()
        };
        let error = service.update_unit(f, &patch).unwrap_err();

        assert!(matches!(error, MutationError::Persist(_)));
        assert_eq!(service.unit(f).unwrap(), before);
    }
}
