//! Common test utilities shared across integration tests.

use beads::config::StoreConfig;
use beads::domain::{Issue, NewIssue};
use beads::store::paths::{issue_path, Section};
use beads::store::Store;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Create a fresh store under a temp directory.
///
/// The `TempDir` must be kept alive for the duration of the test; dropping
/// it removes the store.
pub fn new_store() -> (TempDir, Store) {
    let dir = TempDir::new().expect("create temp dir");
    let store =
        Store::init(&dir.path().join(".beads"), StoreConfig::new("bd")).expect("init store");
    (dir, store)
}

/// Create an issue with the given title and defaults everywhere else.
pub fn create_issue(store: &Store, title: &str) -> Issue {
    store
        .create(NewIssue {
            title: title.to_string(),
            ..Default::default()
        })
        .expect("create issue")
}

/// The on-disk path of an issue in the given section.
#[allow(dead_code)] // not every suite inspects paths directly
pub fn path_in(store: &Store, section: Section, id: &str) -> PathBuf {
    issue_path(store.root(), section, id)
}

/// Read an issue's raw file bytes from whichever section holds it.
#[allow(dead_code)]
pub fn raw_bytes(store: &Store, id: &str) -> Vec<u8> {
    for section in Section::LOOKUP_ORDER {
        let path = path_in(store, section, id);
        if path.is_file() {
            return fs::read(path).expect("read issue file");
        }
    }
    panic!("no file on disk for {id}");
}

/// Overwrite an issue's file with the given value, bypassing the store.
///
/// Used to simulate hand edits and crash states the doctor must handle.
#[allow(dead_code)]
pub fn write_raw(store: &Store, section: Section, issue: &Issue) {
    let path = path_in(store, section, &issue.id);
    let mut bytes = serde_json::to_vec_pretty(issue).expect("serialize issue");
    bytes.push(b'\n');
    fs::write(path, bytes).expect("write issue file");
}
