//! Walks over the supplier hierarchy.
//!
//! Every unit has at most one supplier, so the ancestors of a unit form a
//! single chain ending at a root. Both the level calculation and the cycle
//! check follow that chain with an explicit loop. The walk keeps a visited
//! set and is bounded by the number of units, so a graph that has been
//! corrupted by some out-of-band edit is reported instead of looping
//! forever.

use std::collections::HashSet;

use thiserror::Error;

use crate::domain::UnitId;

/// Read access to the supplier edges of a hierarchy.
pub trait SupplierGraph {
    /// Look up the supplier of a unit.
    ///
    /// Returns `None` if the unit is unknown, `Some(None)` for a root.
    #[allow(clippy::option_option)]
    fn supplier_of(&self, unit: UnitId) -> Option<Option<UnitId>>;

    /// Total number of units in the hierarchy.
    fn unit_count(&self) -> usize;
}

/// Errors raised while walking the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    /// The unit the walk was asked about does not exist.
    #[error("unit {0} not found")]
    UnitNotFound(UnitId),

    /// The proposed supplier does not exist.
    #[error("supplier {0} not found")]
    SupplierNotFound(UnitId),

    /// The supplier chain loops back on itself.
    ///
    /// This cannot happen while every edge change goes through the cycle
    /// check; seeing it means the stored hierarchy was modified behind the
    /// store's back.
    #[error("supplier hierarchy is corrupted: chain starting at {start} revisits unit {revisited}")]
    Corrupted {
        /// Where the walk started.
        start: UnitId,
        /// The unit that was reached twice.
        revisited: UnitId,
    },
}

/// An iterator over the ancestors of a unit, nearest supplier first.
///
/// The unit the walk starts from is not yielded. The iterator yields an
/// error and then stops if the chain references an unknown unit or
/// revisits a unit.
#[derive(Debug)]
pub struct Ancestors<'a, G: ?Sized> {
    graph: &'a G,
    start: UnitId,
    next: Option<UnitId>,
    visited: HashSet<UnitId>,
    failed: bool,
}

impl<'a, G: SupplierGraph + ?Sized> Ancestors<'a, G> {
    /// Walk the ancestors of `unit`.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::UnitNotFound`] if `unit` is unknown.
    pub fn new(graph: &'a G, unit: UnitId) -> Result<Self, HierarchyError> {
        let supplier = graph
            .supplier_of(unit)
            .ok_or(HierarchyError::UnitNotFound(unit))?;

        Ok(Self {
            graph,
            start: unit,
            next: supplier,
            visited: HashSet::from([unit]),
            failed: false,
        })
    }

    /// Walk the chain that begins at `first` itself.
    ///
    /// Unlike [`Ancestors::new`], `first` is yielded. `first` must exist;
    /// no check is made here.
    fn from_first(graph: &'a G, first: UnitId) -> Self {
        Self {
            graph,
            start: first,
            next: Some(first),
            visited: HashSet::new(),
            failed: false,
        }
    }
}

impl<G: SupplierGraph + ?Sized> Iterator for Ancestors<'_, G> {
    type Item = Result<UnitId, HierarchyError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let current = self.next?;

        // Never take more steps than there are units.
        if !self.visited.insert(current) || self.visited.len() > self.graph.unit_count() + 1 {
            self.failed = true;
            tracing::error!(
                start = %self.start,
                revisited = %current,
                "supplier hierarchy contains a cycle"
            );
            return Some(Err(HierarchyError::Corrupted {
                start: self.start,
                revisited: current,
            }));
        }

        let Some(supplier) = self.graph.supplier_of(current) else {
            self.failed = true;
            return Some(Err(HierarchyError::UnitNotFound(current)));
        };
        self.next = supplier;
        Some(Ok(current))
    }
}

/// Compute the level of a unit: the number of supplier edges between it and
/// its root. Roots are at level 0.
///
/// # Errors
///
/// Returns [`HierarchyError::UnitNotFound`] if the unit is unknown, or
/// [`HierarchyError::Corrupted`] if its supplier chain loops.
pub fn level_of<G: SupplierGraph + ?Sized>(
    graph: &G,
    unit: UnitId,
) -> Result<usize, HierarchyError> {
    Ancestors::new(graph, unit)?.try_fold(0, |level, ancestor| ancestor.map(|_| level + 1))
}

/// Decide whether making `proposed` the supplier of `unit` would close a
/// loop in the hierarchy.
///
/// Removing a supplier (`proposed == None`) never creates a cycle. Otherwise
/// the chain starting at `proposed` is followed to its root; if `unit`
/// appears anywhere on it, including as `proposed` itself, the edge would
/// create a cycle.
///
/// `unit` does not have to exist yet, which allows the check to run for a
/// unit that is about to be created with a caller-chosen id.
///
/// # Errors
///
/// Returns [`HierarchyError::SupplierNotFound`] if `proposed` is unknown,
/// or [`HierarchyError::Corrupted`] if the chain above `proposed` already
/// loops without passing through `unit`.
pub fn would_create_cycle<G: SupplierGraph + ?Sized>(
    graph: &G,
    unit: UnitId,
    proposed: Option<UnitId>,
) -> Result<bool, HierarchyError> {
    let Some(proposed) = proposed else {
        return Ok(false);
    };
    if proposed == unit {
        return Ok(true);
    }
    if graph.supplier_of(proposed).is_none() {
        return Err(HierarchyError::SupplierNotFound(proposed));
    }

    for ancestor in Ancestors::from_first(graph, proposed) {
        if ancestor? == unit {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    /// A bare edge map, able to represent graphs the real store would
    /// refuse to build.
    #[derive(Debug, Default)]
    struct Edges(HashMap<UnitId, Option<UnitId>>);

    impl Edges {
        fn with(edges: &[(u64, Option<u64>)]) -> Self {
            Self(
                edges
                    .iter()
                    .map(|&(unit, supplier)| (id(unit), supplier.map(id)))
                    .collect(),
            )
        }
    }

    impl SupplierGraph for Edges {
        fn supplier_of(&self, unit: UnitId) -> Option<Option<UnitId>> {
            self.0.get(&unit).copied()
        }

        fn unit_count(&self) -> usize {
            self.0.len()
        }
    }

    fn id(value: u64) -> UnitId {
        UnitId::try_from(value).unwrap()
    }

    /// F(1) <- R(2) <- I(3), plus a separate root 4.
    fn chain() -> Edges {
        Edges::with(&[(1, None), (2, Some(1)), (3, Some(2)), (4, None)])
    }

    #[test_case(1, 0; "root")]
    #[test_case(2, 1; "retailer")]
    #[test_case(3, 2; "sole trader")]
    #[test_case(4, 0; "separate root")]
    fn levels_follow_the_chain(unit: u64, expected: usize) {
        assert_eq!(level_of(&chain(), id(unit)).unwrap(), expected);
    }

    #[test]
    fn level_is_supplier_level_plus_one() {
        let graph = chain();
        for unit in [2, 3] {
            let supplier = graph.supplier_of(id(unit)).unwrap().unwrap();
            assert_eq!(
                level_of(&graph, id(unit)).unwrap(),
                level_of(&graph, supplier).unwrap() + 1
            );
        }
    }

    #[test]
    fn level_of_unknown_unit_fails() {
        assert_eq!(
            level_of(&chain(), id(99)),
            Err(HierarchyError::UnitNotFound(id(99)))
        );
    }

    #[test]
    fn level_of_dangling_supplier_fails() {
        let graph = Edges::with(&[(1, Some(7))]);
        assert_eq!(
            level_of(&graph, id(1)),
            Err(HierarchyError::UnitNotFound(id(7)))
        );
    }

    #[test]
    fn level_terminates_on_corrupted_graph() {
        let graph = Edges::with(&[(1, Some(2)), (2, Some(3)), (3, Some(1)), (4, Some(1))]);
        assert!(matches!(
            level_of(&graph, id(4)),
            Err(HierarchyError::Corrupted { start, revisited })
                if start == id(4) && revisited == id(1)
        ));
    }

    #[test]
    fn level_terminates_on_self_loop() {
        let graph = Edges::with(&[(1, Some(1))]);
        assert!(matches!(
            level_of(&graph, id(1)),
            Err(HierarchyError::Corrupted { .. })
        ));
    }

    #[test]
    fn self_reference_is_a_cycle() {
        for unit in 1..=4 {
            assert!(would_create_cycle(&chain(), id(unit), Some(id(unit))).unwrap());
        }
    }

    #[test]
    fn becoming_a_root_is_never_a_cycle() {
        for unit in 1..=4 {
            assert!(!would_create_cycle(&chain(), id(unit), None).unwrap());
        }
    }

    #[test]
    fn attaching_root_below_its_descendant_is_a_cycle() {
        assert!(would_create_cycle(&chain(), id(1), Some(id(3))).unwrap());
        assert!(would_create_cycle(&chain(), id(1), Some(id(2))).unwrap());
        assert!(would_create_cycle(&chain(), id(2), Some(id(3))).unwrap());
    }

    #[test]
    fn moving_within_the_forest_is_allowed() {
        assert!(!would_create_cycle(&chain(), id(3), Some(id(1))).unwrap());
        assert!(!would_create_cycle(&chain(), id(1), Some(id(4))).unwrap());
        assert!(!would_create_cycle(&chain(), id(4), Some(id(3))).unwrap());
    }

    #[test]
    fn new_unit_with_fresh_id_never_cycles() {
        assert!(!would_create_cycle(&chain(), id(50), Some(id(3))).unwrap());
    }

    #[test]
    fn unknown_supplier_is_reported() {
        assert_eq!(
            would_create_cycle(&chain(), id(1), Some(id(42))),
            Err(HierarchyError::SupplierNotFound(id(42)))
        );
    }

    #[test]
    fn guard_terminates_on_corrupted_chain() {
        let graph = Edges::with(&[(1, Some(2)), (2, Some(1)), (3, None)]);
        assert!(matches!(
            would_create_cycle(&graph, id(3), Some(id(1))),
            Err(HierarchyError::Corrupted { .. })
        ));
    }

    #[test]
    fn guard_detects_unit_on_existing_loop() {
        // The unit is itself on the corrupted loop; pointing it anywhere on
        // the loop is still a cycle.
        let graph = Edges::with(&[(1, Some(2)), (2, Some(1))]);
        assert!(would_create_cycle(&graph, id(1), Some(id(2))).unwrap());
    }

    #[test]
    fn ancestors_are_nearest_first() {
        let ancestors: Vec<_> = Ancestors::new(&chain(), id(3))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ancestors, [id(2), id(1)]);
    }
}
