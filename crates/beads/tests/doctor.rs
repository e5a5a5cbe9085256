//! Integration tests for the doctor and crash recovery.

mod common;

use beads::config::StoreConfig;
use beads::domain::{DepRef, DependencyType, Status};
use beads::store::paths::Section;
use beads::store::{ProblemKind, Store};
use common::{create_issue, new_store, path_in, write_raw};
use std::fs;

// ========== Clean store ==========

#[test]
fn clean_store_reports_nothing() {
    let (_dir, store) = new_store();
    let a = create_issue(&store, "A");
    let b = create_issue(&store, "B");
    store
        .add_dependency(&a.id, &b.id, DependencyType::Blocks)
        .unwrap();
    store.close(&b.id, None).unwrap();

    let problems = store.doctor(false).unwrap();
    assert!(problems.is_empty(), "unexpected problems: {problems:?}");
}

// ========== S5: asymmetric dependency repair ==========

#[test]
fn asymmetric_dependency_is_reported_and_repaired() {
    let (_dir, store) = new_store();
    let a = create_issue(&store, "A");
    let b = create_issue(&store, "B");

    // Hand-edit A to depend on B without updating B's side.
    let mut a_edit = store.get(&a.id).unwrap();
    a_edit
        .dependencies
        .push(DepRef::new(&b.id, DependencyType::Blocks));
    write_raw(&store, Section::Open, &a_edit);

    let report = store.doctor(false).unwrap();
    assert!(report
        .iter()
        .any(|p| p.kind == ProblemKind::AsymmetricDependency && !p.fixed));

    let repair = store.doctor(true).unwrap();
    assert!(repair
        .iter()
        .any(|p| p.kind == ProblemKind::AsymmetricDependency && p.fixed));

    let b_after = store.get(&b.id).unwrap();
    assert!(b_after
        .dependents
        .iter()
        .any(|d| d.id == a.id && d.dep_type == DependencyType::Blocks));

    // Idempotence: a second fixing run reports zero problems.
    assert!(store.doctor(true).unwrap().is_empty());
}

#[test]
fn asymmetric_parent_child_is_repaired() {
    let (_dir, store) = new_store();
    let parent = create_issue(&store, "P");
    let child = create_issue(&store, "C");

    // Hand-wire only the child's half of the relationship.
    let mut child_edit = store.get(&child.id).unwrap();
    child_edit.parent = Some(parent.id.clone());
    child_edit
        .dependencies
        .push(DepRef::new(&parent.id, DependencyType::ParentChild));
    write_raw(&store, Section::Open, &child_edit);

    let repair = store.doctor(true).unwrap();
    assert!(repair
        .iter()
        .any(|p| p.kind == ProblemKind::AsymmetricParentChild && p.fixed));

    let parent_after = store.get(&parent.id).unwrap();
    assert!(parent_after
        .dependents
        .iter()
        .any(|d| d.id == child.id && d.dep_type == DependencyType::ParentChild));

    assert!(store.doctor(true).unwrap().is_empty());
}

// ========== S6: crash recovery ==========

#[test]
fn backup_is_restored_on_reopen() {
    let (dir, store) = new_store();
    let issue = create_issue(&store, "Crashy");
    let path = path_in(&store, Section::Open, &issue.id);

    // Simulate a crash between the backup write and the final cleanup:
    // intact pre-image in the backup, torn primary.
    let pre_image = fs::read(&path).unwrap();
    fs::write(path.with_file_name(format!("{}.json.backup", issue.id)), &pre_image).unwrap();
    fs::write(&path, b"{\"torn").unwrap();
    drop(store);

    let store = Store::open(&dir.path().join(".beads")).unwrap();
    let recovered = store.get(&issue.id).unwrap();
    assert_eq!(recovered.title, "Crashy");

    let problems = store.doctor(false).unwrap();
    assert!(problems.is_empty(), "unexpected problems: {problems:?}");
}

// ========== Orphaned transient files ==========

#[test]
fn orphaned_temp_file_is_removed() {
    let (_dir, store) = new_store();
    let tmp = Section::Open
        .dir(store.root())
        .join(".bd-dead.json.tmp.999-0");
    fs::write(&tmp, b"half-written").unwrap();

    let repair = store.doctor(true).unwrap();
    assert!(repair
        .iter()
        .any(|p| p.kind == ProblemKind::OrphanedTempFile && p.fixed));
    assert!(!tmp.exists());
}

#[test]
fn orphaned_sidecar_lock_is_removed() {
    let (_dir, store) = new_store();
    let lock = Section::Open.dir(store.root()).join("bd-gone.lock");
    fs::write(&lock, b"").unwrap();

    let repair = store.doctor(true).unwrap();
    assert!(repair
        .iter()
        .any(|p| p.kind == ProblemKind::OrphanedLockFile && p.fixed));
    assert!(!lock.exists());
}

#[test]
fn live_sidecar_lock_is_not_orphaned() {
    let (_dir, store) = new_store();
    let issue = create_issue(&store, "Locked");
    store.modify(&issue.id, |i| i.priority = beads::domain::Priority::LOW).unwrap();

    // The issue exists, so its sidecar is not an orphan.
    let problems = store.doctor(false).unwrap();
    assert!(problems.is_empty(), "unexpected problems: {problems:?}");
}

// ========== Location mismatch ==========

#[test]
fn misplaced_file_is_moved() {
    let (_dir, store) = new_store();
    let issue = create_issue(&store, "Misfiled");

    // Hand-move the file into closed/ without changing its content.
    let open_path = path_in(&store, Section::Open, &issue.id);
    let closed_path = path_in(&store, Section::Closed, &issue.id);
    fs::rename(&open_path, &closed_path).unwrap();

    let report = store.doctor(false).unwrap();
    assert!(report
        .iter()
        .any(|p| p.kind == ProblemKind::LocationMismatch && !p.fixed));

    let repair = store.doctor(true).unwrap();
    assert!(repair.iter().any(|p| p.kind == ProblemKind::LocationMismatch));
    assert!(open_path.is_file());
    assert!(!closed_path.exists());

    assert!(store.doctor(true).unwrap().is_empty());
}

// ========== Duplicates ==========

#[test]
fn duplicate_keeps_the_copy_matching_its_content() {
    let (_dir, store) = new_store();
    let issue = create_issue(&store, "Twinned");
    store.close(&issue.id, None).unwrap();

    // Plant a stale copy in open/ claiming to still be open.
    let mut stale = store.get(&issue.id).unwrap();
    stale.status = Status::Open;
    stale.closed_at = None;
    write_raw(&store, Section::Open, &stale);

    let repair = store.doctor(true).unwrap();
    assert!(repair
        .iter()
        .any(|p| p.kind == ProblemKind::DuplicateIssue && p.fixed));

    // Exactly one copy remains. Both copies matched their directories, so
    // the lookup-order winner (open/) survives.
    let copies: usize = Section::LOOKUP_ORDER
        .iter()
        .filter(|s| path_in(&store, **s, &issue.id).is_file())
        .count();
    assert_eq!(copies, 1);

    assert!(store.doctor(true).unwrap().is_empty());
}

// ========== Broken references ==========

#[test]
fn broken_parent_and_dependency_refs_are_cleared() {
    let (_dir, store) = new_store();
    let issue = create_issue(&store, "Dangling");

    let mut edit = store.get(&issue.id).unwrap();
    edit.parent = Some("bd-vanished".to_string());
    edit.dependencies
        .push(DepRef::new("bd-vanished", DependencyType::ParentChild));
    edit.dependents
        .push(DepRef::new("bd-also-gone", DependencyType::Blocks));
    write_raw(&store, Section::Open, &edit);

    let repair = store.doctor(true).unwrap();
    assert!(repair
        .iter()
        .any(|p| p.kind == ProblemKind::BrokenParentRef && p.fixed));
    assert!(repair
        .iter()
        .any(|p| p.kind == ProblemKind::BrokenDependencyRef && p.fixed));

    let after = store.get(&issue.id).unwrap();
    assert!(after.parent.is_none());
    assert!(after.dependencies.is_empty());
    assert!(after.dependents.is_empty());

    assert!(store.doctor(true).unwrap().is_empty());
}

// ========== Malformed files ==========

#[test]
fn malformed_json_is_report_only() {
    let (_dir, store) = new_store();
    let path = Section::Open.dir(store.root()).join("bd-mangled.json");
    fs::write(&path, b"{ not json").unwrap();

    let repair = store.doctor(true).unwrap();
    assert!(repair
        .iter()
        .any(|p| p.kind == ProblemKind::MalformedJson && !p.fixed));
    // The file is left for a human to look at.
    assert!(path.is_file());
}

// ========== Tombstone immutability ==========

#[test]
fn doctor_never_edits_tombstone_content() {
    let (_dir, store) = new_store();
    let issue = create_issue(&store, "Dead");
    store.create_tombstone(&issue.id, "qa", "done").unwrap();

    // Give the tombstone a dangling dependency by hand.
    let mut edit = store.get(&issue.id).unwrap();
    edit.dependencies
        .push(DepRef::new("bd-vanished", DependencyType::Blocks));
    write_raw(&store, Section::Deleted, &edit);
    let before = common::raw_bytes(&store, &issue.id);

    let repair = store.doctor(true).unwrap();
    assert!(repair
        .iter()
        .any(|p| p.kind == ProblemKind::BrokenDependencyRef && !p.fixed));
    assert_eq!(common::raw_bytes(&store, &issue.id), before);
}

// ========== Cycle reporting ==========

#[test]
fn hand_made_cycle_is_reported() {
    let (_dir, store) = new_store();
    let a = create_issue(&store, "A");
    let b = create_issue(&store, "B");

    // Wire a blocks-cycle directly on disk, bypassing the engine.
    let mut a_edit = store.get(&a.id).unwrap();
    a_edit.dependencies.push(DepRef::new(&b.id, DependencyType::Blocks));
    a_edit.dependents.push(DepRef::new(&b.id, DependencyType::Blocks));
    write_raw(&store, Section::Open, &a_edit);

    let mut b_edit = store.get(&b.id).unwrap();
    b_edit.dependencies.push(DepRef::new(&a.id, DependencyType::Blocks));
    b_edit.dependents.push(DepRef::new(&a.id, DependencyType::Blocks));
    write_raw(&store, Section::Open, &b_edit);

    let report = store.doctor(false).unwrap();
    assert!(report
        .iter()
        .any(|p| p.kind == ProblemKind::DependencyCycle && !p.fixed));
}

// ========== Mixed sweep ==========

#[test]
fn doctor_handles_many_problems_in_one_pass() {
    let (_dir, store) = new_store();
    let a = create_issue(&store, "A");
    let b = create_issue(&store, "B");

    // Asymmetric edge + orphan temp + orphan lock, all at once.
    let mut a_edit = store.get(&a.id).unwrap();
    a_edit
        .dependencies
        .push(DepRef::new(&b.id, DependencyType::Validates));
    write_raw(&store, Section::Open, &a_edit);
    fs::write(
        Section::Closed.dir(store.root()).join(".x.json.tmp.1-1"),
        b"",
    )
    .unwrap();
    fs::write(Section::Open.dir(store.root()).join("bd-ghost.lock"), b"").unwrap();

    let repair = store.doctor(true).unwrap();
    assert_eq!(repair.len(), 3);
    assert!(repair.iter().all(|p| p.fixed));

    assert!(store.doctor(true).unwrap().is_empty());
}

// ========== Stale lock sweep at open ==========

#[test]
fn open_sweeps_stale_sidecar_locks() {
    let (dir, store) = new_store();
    let lock = Section::Open.dir(store.root()).join("bd-stale.lock");
    fs::write(&lock, b"").unwrap();
    drop(store);

    let _store = Store::open(&dir.path().join(".beads")).unwrap();
    assert!(!lock.exists());
}

#[test]
fn open_preserves_configuration() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = StoreConfig::new("proj");
    config.max_depth = 2;
    let store = Store::init(&dir.path().join(".beads"), config).unwrap();
    drop(store);

    let store = Store::open(&dir.path().join(".beads")).unwrap();
    assert_eq!(store.prefix(), "proj");
    assert_eq!(store.config().max_depth, 2);
}
