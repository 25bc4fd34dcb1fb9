//! End-to-end checks of the supplier hierarchy through [`UnitService`].

use std::{sync::Barrier, thread};

use supplynet::{MutationError, NewUnit, UnitId, UnitPatch, UnitService, ValidationError};
use tempfile::TempDir;

fn setup() -> (TempDir, UnitService) {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let service = UnitService::open(tmp.path().to_path_buf()).unwrap();
    (tmp, service)
}

fn create(service: &UnitService, name: &str, supplier: Option<UnitId>) -> UnitId {
    service
        .create_unit(NewUnit {
            name: name.to_string(),
            email: format!("{}@network.example", name.to_lowercase()),
            country: "Belarus".to_string(),
            city: "Minsk".to_string(),
            street: "Nezavisimosti".to_string(),
            building: "4".to_string(),
            supplier,
            ..NewUnit::default()
        })
        .unwrap()
        .id()
}

/// A (supplied by B) → B (supplied by C) → C (root)
fn chain(service: &UnitService) -> (UnitId, UnitId, UnitId) {
    let c = create(service, "C", None);
    let b = create(service, "B", Some(c));
    let a = create(service, "A", Some(b));
    (a, b, c)
}

#[test]
fn level_is_one_more_than_the_supplier() {
    let (_tmp, service) = setup();
    let (a, b, c) = chain(&service);

    assert_eq!(service.level_of(c).unwrap(), 0);
    for (unit, supplier) in [(a, b), (b, c)] {
        assert_eq!(
            service.level_of(unit).unwrap(),
            service.level_of(supplier).unwrap() + 1
        );
    }
}

#[test]
fn self_and_empty_suppliers() {
    let (_tmp, service) = setup();
    let (a, _, c) = chain(&service);

    for unit in [a, c] {
        assert!(service.would_create_cycle(unit, Some(unit)).unwrap());
        assert!(!service.would_create_cycle(unit, None).unwrap());
    }
}

#[test]
fn closing_the_chain_is_rejected_and_nothing_changes() {
    let (tmp, service) = setup();
    let (a, b, c) = chain(&service);
    let snapshot = service.read(|network| network.clone());

    let error = service.set_supplier(c, Some(a)).unwrap_err();

    assert!(matches!(
        error,
        MutationError::Validation(ValidationError::CyclicSupplierReference { unit, supplier })
            if unit == c && supplier == a
    ));
    assert_eq!(service.read(|network| network.clone()), snapshot);
    assert_eq!(service.level_of(a).unwrap(), 2);
    assert_eq!(service.level_of(b).unwrap(), 1);

    let reopened = UnitService::open(tmp.path().to_path_buf()).unwrap();
    assert_eq!(reopened.read(|network| network.clone()), snapshot);
}

#[test]
fn every_descendant_is_rejected_as_a_supplier() {
    let (_tmp, service) = setup();
    let (a, b, c) = chain(&service);

    assert!(service.would_create_cycle(c, Some(a)).unwrap());
    assert!(service.would_create_cycle(c, Some(b)).unwrap());
    assert!(service.would_create_cycle(b, Some(a)).unwrap());
    assert!(!service.would_create_cycle(a, Some(c)).unwrap());
}

#[test]
fn keeping_the_current_supplier_is_idempotent() {
    let (_tmp, service) = setup();
    let (a, b, _) = chain(&service);

    let patch = UnitPatch {
        supplier: Some(Some(b)),
        city: Some("Minsk".to_string()),
        ..UnitPatch::default()
    };
    for _ in 0..3 {
        service.update_unit(a, &patch).unwrap();
        assert_eq!(service.level_of(a).unwrap(), 2);
    }
}

#[test]
fn removing_the_supplier_always_succeeds() {
    let (_tmp, service) = setup();
    let (a, b, c) = chain(&service);

    for unit in [a, b, c] {
        service.set_supplier(unit, None).unwrap();
        assert_eq!(service.level_of(unit).unwrap(), 0);
    }
}

#[test]
fn factory_retail_trader_scenario() {
    let (_tmp, service) = setup();
    let f = create(&service, "Factory", None);
    let r = create(&service, "Retail", Some(f));
    let i = create(&service, "Trader", Some(r));

    assert_eq!(
        [f, r, i].map(|unit| service.level_of(unit).unwrap()),
        [0, 1, 2]
    );

    let error = service.set_supplier(f, Some(i)).unwrap_err();
    assert_eq!(error.reason(), "CyclicSupplierReference");
    assert_eq!(service.level_of(f).unwrap(), 0);
}

#[test]
fn moving_a_subtree_recomputes_levels() {
    let (_tmp, service) = setup();
    let (a, b, _) = chain(&service);
    let other_root = create(&service, "D", None);

    service.set_supplier(b, Some(other_root)).unwrap();

    assert_eq!(service.level_of(b).unwrap(), 1);
    assert_eq!(service.level_of(a).unwrap(), 2);
}

#[test]
fn unknown_units_are_reported() {
    let (_tmp, service) = setup();
    let (a, _, _) = chain(&service);
    let missing = UnitId::try_from(500).unwrap();

    assert!(service.level_of(missing).is_err());
    assert!(service.would_create_cycle(a, Some(missing)).is_err());
    assert_eq!(
        service.set_supplier(missing, None).unwrap_err().reason(),
        "UnitNotFound"
    );
}

/// Two writers each try to make the other's root its supplier. Without a
/// shared lock both checks could pass against the same state and together
/// close a loop. Exactly one must win.
#[test]
fn concurrent_conflicting_assignments_keep_the_forest() {
    for _ in 0..20 {
        let (_tmp, service) = setup();
        let x = create(&service, "X", None);
        let y = create(&service, "Y", None);
        let barrier = Barrier::new(2);

        let results = thread::scope(|scope| {
            let first = scope.spawn(|| {
                barrier.wait();
                service.set_supplier(x, Some(y))
            });
            let second = scope.spawn(|| {
                barrier.wait();
                service.set_supplier(y, Some(x))
            });
            [first.join().unwrap(), second.join().unwrap()]
        });

        let accepted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(accepted, 1);
        assert!(!service.read(|network| network.has_cycles()));

        let levels = [x, y].map(|unit| service.level_of(unit).unwrap());
        assert!(levels == [1, 0] || levels == [0, 1]);
    }
}

#[test]
fn concurrent_readers_see_a_consistent_graph() {
    let (_tmp, service) = setup();
    let (a, b, c) = chain(&service);

    thread::scope(|scope| {
        scope.spawn(|| {
            for _ in 0..50 {
                service.set_supplier(b, None).unwrap();
                service.set_supplier(b, Some(c)).unwrap();
            }
        });
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..50 {
                    let level = service.level_of(a).unwrap();
                    assert!(level == 1 || level == 2);
                }
            });
        }
    });
}
