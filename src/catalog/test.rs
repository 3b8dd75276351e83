use super::{union_by_encoding, Catalog, CatalogError, CpuModel, Event};

fn event(name: &'static str, encoding: u64) -> Event {
    Event {
        name,
        description: "",
        encoding,
    }
}

fn encodings(events: &[Event]) -> Vec<u64> {
    events.iter().map(|e| e.encoding).collect()
}

#[test]
fn union_deduplicates_by_encoding() {
    let a = vec![event("x", 3), event("y", 1)];
    let b = vec![event("z", 1), event("w", 2)];

    let union = union_by_encoding(&a, &b);
    assert_eq!(encodings(&union), vec![1, 2, 3]);
    // The representative of a shared encoding comes from the first operand.
    assert_eq!(union[0].name, "y");
}

#[test]
fn union_is_commutative_and_associative_by_encoding() {
    let a = vec![event("a", 1), event("b", 2)];
    let b = vec![event("c", 2), event("d", 3)];
    let c = vec![event("e", 3), event("f", 4)];

    let ab = union_by_encoding(&a, &b);
    let ba = union_by_encoding(&b, &a);
    assert_eq!(encodings(&ab), encodings(&ba));

    let ab_c = union_by_encoding(&union_by_encoding(&a, &b), &c);
    let a_bc = union_by_encoding(&a, &union_by_encoding(&b, &c));
    assert_eq!(encodings(&ab_c), encodings(&a_bc));
}

// Encoding sets {A,B,C,D}, {A,E,F,G}, {A,H,I} with budget 7: the smallest
// group {A,H,I} merges with {A,E,F,G} (union 6), then {A,B,C,D} against the
// merged group would be 9 > 7, so two groups remain.
#[test]
fn adaptive_grouping_merges_smallest_first() {
    let mut catalog = Catalog::new(
        vec![event("fixed", 0x100)],
        vec![
            vec![event("a", 1), event("b", 2), event("c", 3), event("d", 4)],
            vec![event("a", 1), event("e", 5), event("f", 6), event("g", 7)],
            vec![event("a", 1), event("h", 8), event("i", 9)],
        ],
    );

    catalog.adaptive_grouping(7);

    assert_eq!(catalog.group_count(), 2);
    assert_eq!(encodings(&catalog.groups()[0]), vec![1, 2, 3, 4]);
    assert_eq!(encodings(&catalog.groups()[1]), vec![1, 5, 6, 7, 8, 9]);
}

#[test]
fn adaptive_grouping_is_a_fixed_point() {
    let mut once = Catalog::new(
        vec![event("fixed", 0x100)],
        vec![
            vec![event("a", 1), event("b", 2)],
            vec![event("c", 3), event("d", 4)],
            vec![event("e", 5), event("f", 6)],
        ],
    );
    once.adaptive_grouping(4);

    let mut twice = Catalog::new(vec![event("fixed", 0x100)], once.groups().to_vec());
    twice.adaptive_grouping(4);

    let once_sets: Vec<Vec<u64>> = once.groups().iter().map(|g| encodings(g)).collect();
    let twice_sets: Vec<Vec<u64>> = twice.groups().iter().map(|g| encodings(g)).collect();
    assert_eq!(once_sets, twice_sets);
}

#[test]
fn adaptive_grouping_respects_budget() {
    let mut catalog = Catalog::new(
        vec![event("fixed", 0x100)],
        vec![
            vec![event("a", 1), event("b", 2)],
            vec![event("c", 3), event("d", 4)],
            vec![event("e", 5), event("f", 6)],
        ],
    );
    catalog.adaptive_grouping(4);

    for group in catalog.groups() {
        assert!(group.len() <= 4);
    }
    // No remaining pair may still fit: {a,b,c,d} and {e,f} union to 6 > 4.
    assert_eq!(catalog.group_count(), 2);
}

#[test]
fn single_group_is_left_alone() {
    let mut catalog = Catalog::new(
        vec![event("fixed", 0x100)],
        vec![vec![event("a", 1), event("b", 2)]],
    );
    catalog.adaptive_grouping(10);
    assert_eq!(catalog.group_count(), 1);
}

#[test]
fn validate_rejects_degenerate_catalogs() {
    let empty_fixed = Catalog::new(vec![], vec![vec![event("a", 1)]]);
    assert_eq!(empty_fixed.validate(), Err(CatalogError::NoFixedEvents));

    let no_groups = Catalog::new(vec![event("fixed", 0x100)], vec![]);
    assert_eq!(no_groups.validate(), Err(CatalogError::NoGroups));

    let empty_group = Catalog::new(
        vec![event("fixed", 0x100)],
        vec![vec![event("a", 1)], vec![]],
    );
    assert_eq!(empty_group.validate(), Err(CatalogError::EmptyGroup(1)));
}

#[test]
fn event_slots_cover_fixed_then_schedulable() {
    let catalog = Catalog::new(
        vec![event("fixed0", 0x100), event("fixed1", 0x101)],
        vec![vec![event("a", 1), event("b", 2)]],
    );

    assert_eq!(catalog.events_in_group(0), 4);
    assert_eq!(catalog.event(0, 0).unwrap().name, "fixed0");
    assert_eq!(catalog.event(0, 1).unwrap().name, "fixed1");
    assert_eq!(catalog.event(0, 2).unwrap().name, "a");
    assert_eq!(catalog.event(0, 3).unwrap().name, "b");
    assert!(catalog.event(0, 4).is_none());
    assert!(catalog.event(1, 0).is_none());
}

#[test]
fn shipped_catalogs_are_valid() {
    for model in [CpuModel::Oryon, CpuModel::CortexX4] {
        let catalog = Catalog::for_model(model);
        assert_eq!(catalog.validate(), Ok(()));
    }
}
