//! Integration tests for the relationship engine: two-sided bookkeeping,
//! cycle rejection, and on-disk stability of failed mutations.

mod common;

use beads::domain::{DependencyType, IssueFilter};
use beads::error::Error;
use common::{create_issue, new_store, raw_bytes};

// ========== S2: cycle rejection ==========

#[test]
fn cycle_rejection_leaves_files_untouched() {
    let (_dir, store) = new_store();
    let a = create_issue(&store, "A");
    let b = create_issue(&store, "B");

    store
        .add_dependency(&a.id, &b.id, DependencyType::Blocks)
        .unwrap();

    let a_before = raw_bytes(&store, &a.id);
    let b_before = raw_bytes(&store, &b.id);

    let err = store
        .add_dependency(&b.id, &a.id, DependencyType::Blocks)
        .unwrap_err();
    assert!(matches!(err, Error::Cycle { .. }));

    // The failed call must not have written either side.
    assert_eq!(raw_bytes(&store, &a.id), a_before);
    assert_eq!(raw_bytes(&store, &b.id), b_before);
}

#[test]
fn long_chain_cycle_is_caught() {
    let (_dir, store) = new_store();
    let issues: Vec<_> = (0..5)
        .map(|n| create_issue(&store, &format!("Link {n}")))
        .collect();

    for pair in issues.windows(2) {
        store
            .add_dependency(&pair[0].id, &pair[1].id, DependencyType::Blocks)
            .unwrap();
    }

    let err = store
        .add_dependency(&issues[4].id, &issues[0].id, DependencyType::Blocks)
        .unwrap_err();
    assert!(matches!(err, Error::Cycle { .. }));
}

// ========== Two-sided bookkeeping ==========

#[test]
fn every_edge_is_mirrored() {
    let (_dir, store) = new_store();
    let a = create_issue(&store, "A");
    let b = create_issue(&store, "B");
    let c = create_issue(&store, "C");

    store
        .add_dependency(&a.id, &b.id, DependencyType::Blocks)
        .unwrap();
    store
        .add_dependency(&a.id, &c.id, DependencyType::Related)
        .unwrap();
    store
        .add_dependency(&b.id, &c.id, DependencyType::Tracks)
        .unwrap();

    // Invariant: A.dependencies has {B, T} iff B.dependents has {A, T}.
    let all = [&a.id, &b.id, &c.id];
    for id in all {
        let issue = store.get(id).unwrap();
        for dep in &issue.dependencies {
            let other = store.get(&dep.id).unwrap();
            assert!(
                other
                    .dependents
                    .iter()
                    .any(|d| d.id == *id && d.dep_type == dep.dep_type),
                "missing mirror of {id} -> {}",
                dep.id
            );
        }
        for dep in &issue.dependents {
            let other = store.get(&dep.id).unwrap();
            assert!(
                other
                    .dependencies
                    .iter()
                    .any(|d| d.id == *id && d.dep_type == dep.dep_type),
                "missing mirror of {} -> {id}",
                dep.id
            );
        }
    }
}

#[test]
fn remove_dependency_clears_both_sides() {
    let (_dir, store) = new_store();
    let a = create_issue(&store, "A");
    let b = create_issue(&store, "B");

    store
        .add_dependency(&a.id, &b.id, DependencyType::Until)
        .unwrap();
    store.remove_dependency(&a.id, &b.id).unwrap();

    let a_after = store.get(&a.id).unwrap();
    let b_after = store.get(&b.id).unwrap();
    assert!(a_after.dependencies.is_empty());
    assert!(b_after.dependents.is_empty());
}

#[test]
fn all_dependency_types_round_trip_through_disk() {
    let (_dir, store) = new_store();
    let types = [
        DependencyType::Blocks,
        DependencyType::Tracks,
        DependencyType::Related,
        DependencyType::DiscoveredFrom,
        DependencyType::Until,
        DependencyType::CausedBy,
        DependencyType::Validates,
        DependencyType::RelatesTo,
        DependencyType::Supersedes,
    ];

    let hub = create_issue(&store, "Hub");
    for (n, dep_type) in types.iter().enumerate() {
        let spoke = create_issue(&store, &format!("Spoke {n}"));
        store.add_dependency(&hub.id, &spoke.id, *dep_type).unwrap();
    }

    let hub_after = store.get(&hub.id).unwrap();
    let stored: Vec<DependencyType> = hub_after.dependencies.iter().map(|d| d.dep_type).collect();
    assert_eq!(stored, types);
}

#[test]
fn dependency_edges_survive_status_moves() {
    let (_dir, store) = new_store();
    let a = create_issue(&store, "A");
    let b = create_issue(&store, "B");

    store
        .add_dependency(&a.id, &b.id, DependencyType::Blocks)
        .unwrap();
    store.close(&b.id, None).unwrap();

    // B moved to closed/; the edge is still on both sides.
    let a_after = store.get(&a.id).unwrap();
    let b_after = store.get(&b.id).unwrap();
    assert!(a_after.has_dependency(&b.id));
    assert!(b_after.has_dependent(&a.id));

    // And removal still works across sections.
    store.remove_dependency(&a.id, &b.id).unwrap();
    assert!(store.get(&a.id).unwrap().dependencies.is_empty());
}

#[test]
fn listing_is_unaffected_by_relationship_edges() {
    let (_dir, store) = new_store();
    let a = create_issue(&store, "A");
    let b = create_issue(&store, "B");
    store
        .add_dependency(&a.id, &b.id, DependencyType::Blocks)
        .unwrap();

    let listed = store.list(&IssueFilter::default()).unwrap();
    assert_eq!(listed.len(), 2);
}
