//! In-memory store for the supplier network
//!
//! The [`Network`] knows nothing about the filesystem. It stores units in a
//! decomposed format: record data lives in a map keyed by id, while supplier
//! relationships live only in a directed graph.

use std::collections::BTreeMap;

use petgraph::{
    Direction,
    algo::{is_cyclic_directed, tarjan_scc},
    graphmap::DiGraphMap,
};
use tracing::instrument;

use crate::domain::{
    Debt, Product, ProductId, Unit, UnitData, UnitId,
    hierarchy::{HierarchyError, SupplierGraph},
};

/// An in-memory representation of the supplier network.
///
/// Units are stored as separate components:
/// - Record data: `BTreeMap<UnitId, UnitData>`, ordered by id
/// - Relationships: `DiGraphMap<UnitId, ()>`, edges point from a unit to its
///   supplier. This is the sole source of truth for supplier relationships.
///
/// Every unit has at most one outgoing edge. [`Network::set_supplier`] is
/// the only way to change an edge after a unit is inserted, and it trusts
/// its caller to have run the cycle check first.
///
/// New ids continue from the highest id ever inserted into this network, so
/// removing the newest record does not free its id for reuse.
#[derive(Debug, Default, Clone)]
pub struct Network {
    units: BTreeMap<UnitId, UnitData>,
    products: BTreeMap<ProductId, Product>,
    graph: DiGraphMap<UnitId, ()>,
    highest_unit: Option<UnitId>,
    highest_product: Option<ProductId>,
}

// Id high-water marks are not compared.
impl PartialEq for Network {
    fn eq(&self, other: &Self) -> bool {
        self.units == other.units
            && self.products == other.products
            && self
                .units
                .keys()
                .all(|&id| self.supplier_of(id) == other.supplier_of(id))
    }
}

impl Network {
    /// Creates a new network with pre-allocated capacity for the given number
    /// of units.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            units: BTreeMap::new(),
            products: BTreeMap::new(),
            graph: DiGraphMap::with_capacity(capacity, capacity),
            highest_unit: None,
            highest_product: None,
        }
    }

    /// Inserts a unit into the network.
    ///
    /// The supplier edge is added as given, without a cycle check. Callers
    /// loading persisted state are expected to verify the result with
    /// [`Network::cycles`].
    ///
    /// # Panics
    ///
    /// Panics if a unit with the same id already exists.
    pub fn insert_unit(&mut self, id: UnitId, data: UnitData, supplier: Option<UnitId>) {
        assert!(!self.units.contains_key(&id), "Duplicate unit id: {id}");

        // Add node to graph (if it doesn't already exist from being referenced as a
        // supplier)
        self.graph.add_node(id);
        if let Some(supplier) = supplier {
            self.graph.add_edge(id, supplier, ());
        }
        self.units.insert(id, data);
        self.highest_unit = self.highest_unit.max(Some(id));
    }

    /// Inserts a product into the network.
    ///
    /// # Panics
    ///
    /// Panics if a product with the same id already exists.
    pub fn insert_product(&mut self, product: Product) {
        let id = product.id;
        assert!(!self.products.contains_key(&id), "Duplicate product id: {id}");
        self.products.insert(id, product);
        self.highest_product = self.highest_product.max(Some(id));
    }

    /// Retrieves a unit by id as an owned [`Unit`].
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<Unit> {
        let data = self.units.get(&id)?;
        Some(Unit::from_parts(id, data.clone(), self.supplier(id)))
    }

    pub(crate) fn unit_data(&self, id: UnitId) -> Option<&UnitData> {
        self.units.get(&id)
    }

    /// Whether a unit with the given id exists.
    #[must_use]
    pub fn contains_unit(&self, id: UnitId) -> bool {
        self.units.contains_key(&id)
    }

    /// Retrieves a product by id.
    #[must_use]
    pub fn product(&self, id: ProductId) -> Option<&Product> {
        self.products.get(&id)
    }

    /// Whether a product with the given id exists.
    #[must_use]
    pub fn contains_product(&self, id: ProductId) -> bool {
        self.products.contains_key(&id)
    }

    /// Returns an iterator over all units, in id order.
    pub fn units(&self) -> impl Iterator<Item = Unit> + '_ {
        self.units
            .iter()
            .map(|(&id, data)| Unit::from_parts(id, data.clone(), self.supplier(id)))
    }

    /// Returns an iterator over all products, in id order.
    pub fn products(&self) -> impl Iterator<Item = &Product> + '_ {
        self.products.values()
    }

    /// Number of products.
    #[must_use]
    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    /// Get all units supplied by the given unit.
    pub fn clients(&self, id: UnitId) -> impl Iterator<Item = UnitId> + '_ {
        // Incoming edges are from clients
        if self.graph.contains_node(id) {
            Some(self.graph.neighbors_directed(id, Direction::Incoming))
        } else {
            None
        }
        .into_iter()
        .flatten()
    }

    fn supplier(&self, id: UnitId) -> Option<UnitId> {
        if self.graph.contains_node(id) {
            self.graph.neighbors_directed(id, Direction::Outgoing).next()
        } else {
            None
        }
    }

    /// Point a unit at a new supplier, or make it a root.
    ///
    /// This is the only sanctioned way to change a supplier edge. It does not
    /// check for cycles: the caller must have consulted
    /// [`would_create_cycle`](crate::domain::hierarchy::would_create_cycle)
    /// against this same state first.
    ///
    /// Returns the previous supplier.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::UnitNotFound`] if the unit is unknown, or
    /// [`HierarchyError::SupplierNotFound`] if the new supplier is unknown.
    #[instrument(level = "debug", skip(self))]
    pub fn set_supplier(
        &mut self,
        id: UnitId,
        supplier: Option<UnitId>,
    ) -> Result<Option<UnitId>, HierarchyError> {
        if !self.units.contains_key(&id) {
            return Err(HierarchyError::UnitNotFound(id));
        }
        if let Some(supplier) = supplier {
            if !self.units.contains_key(&supplier) {
                return Err(HierarchyError::SupplierNotFound(supplier));
            }
        }

        let previous = self.supplier(id);
        if previous == supplier {
            return Ok(previous);
        }
        if let Some(previous) = previous {
            self.graph.remove_edge(id, previous);
        }
        if let Some(supplier) = supplier {
            self.graph.add_edge(id, supplier, ());
        }

        Ok(previous)
    }

    /// Replace the record data of a unit, leaving its supplier edge alone.
    ///
    /// Returns the previous data, or `None` if the unit does not exist (in
    /// which case nothing is inserted).
    pub(crate) fn replace_unit_data(&mut self, id: UnitId, data: UnitData) -> Option<UnitData> {
        let slot = self.units.get_mut(&id)?;
        Some(std::mem::replace(slot, data))
    }

    /// Overwrite the debt of a unit.
    ///
    /// Returns the previous debt, or `None` if the unit does not exist.
    pub fn set_debt(&mut self, id: UnitId, debt: Debt) -> Option<Debt> {
        let data = self.units.get_mut(&id)?;
        Some(std::mem::replace(&mut data.debt, debt))
    }

    /// Replace a product record.
    ///
    /// Returns the previous record, or `None` if the product does not exist.
    pub(crate) fn replace_product(&mut self, product: Product) -> Option<Product> {
        let slot = self.products.get_mut(&product.id)?;
        Some(std::mem::replace(slot, product))
    }

    /// Remove a unit and all of its relationships from the network.
    ///
    /// Clients of the removed unit lose their supplier and become roots.
    /// Returns the removed unit and the ids of the detached clients.
    pub fn remove_unit(&mut self, id: UnitId) -> Option<(Unit, Vec<UnitId>)> {
        let unit = self.unit(id)?;
        let clients: Vec<_> = self.clients(id).collect();

        self.units.remove(&id);
        self.graph.remove_node(id);

        Some((unit, clients))
    }

    /// Remove a product, dropping it from every unit that carries it.
    ///
    /// Returns the removed product and the ids of the units that carried it.
    pub fn remove_product(&mut self, id: ProductId) -> Option<(Product, Vec<UnitId>)> {
        let product = self.products.remove(&id)?;
        let carriers = self
            .units
            .iter_mut()
            .filter_map(|(&unit, data)| data.products.remove(&id).then_some(unit))
            .collect();
        Some((product, carriers))
    }

    /// Returns the next free unit id.
    ///
    /// This is one greater than the highest id ever inserted, so ids of
    /// deleted units are not recycled. Returns `None` once `u64::MAX` has
    /// been used.
    #[must_use]
    pub fn next_unit_id(&self) -> Option<UnitId> {
        self.highest_unit.map_or(Some(UnitId::MIN), UnitId::next)
    }

    /// Returns the next free product id, or `None` once `u64::MAX` has been
    /// used.
    #[must_use]
    pub fn next_product_id(&self) -> Option<ProductId> {
        self.highest_product
            .map_or(Some(ProductId::MIN), ProductId::next)
    }

    /// Determine whether the supplier graph contains any cycles.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Return all cycles in the supplier graph as sorted sets of unit ids.
    #[must_use]
    pub fn cycles(&self) -> Vec<Vec<UnitId>> {
        let mut cycles = Vec::new();

        for component in tarjan_scc(&self.graph) {
            if component.len() > 1 {
                let mut ids = component;
                ids.sort();
                cycles.push(ids);
                continue;
            }

            let Some(&node) = component.first() else {
                continue;
            };

            if self.graph.contains_edge(node, node) {
                cycles.push(vec![node]);
            }
        }

        cycles.sort();
        cycles
    }

    /// Supplier references that point at units which do not exist.
    ///
    /// Returns `(unit, missing supplier)` pairs.
    #[must_use]
    pub fn dangling_suppliers(&self) -> Vec<(UnitId, UnitId)> {
        self.units
            .keys()
            .filter_map(|&id| {
                let supplier = self.supplier(id)?;
                (!self.units.contains_key(&supplier)).then_some((id, supplier))
            })
            .collect()
    }

    /// Product references that point at products which do not exist.
    ///
    /// Returns `(unit, missing product)` pairs.
    #[must_use]
    pub fn dangling_products(&self) -> Vec<(UnitId, ProductId)> {
        self.units
            .iter()
            .flat_map(|(&id, data)| {
                data.products
                    .iter()
                    .filter(|product| !self.products.contains_key(product))
                    .map(move |&product| (id, product))
            })
            .collect()
    }
}

impl SupplierGraph for Network {
    fn supplier_of(&self, unit: UnitId) -> Option<Option<UnitId>> {
        self.units
            .contains_key(&unit)
            .then(|| self.supplier(unit))
    }

    fn unit_count(&self) -> usize {
        self.units.len()
    }
}
