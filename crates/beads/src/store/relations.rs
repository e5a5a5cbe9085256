//! Relationship engine: typed dependency edges between issues.
//!
//! Every edge is recorded on both endpoints (`A.dependencies` holds
//! `{B, T}` iff `B.dependents` holds `{A, T}`), and the graph restricted to
//! any single type must stay acyclic. Mutations here pre-check the cycle
//! condition optimistically, acquire the sorted sidecar lock set, re-check
//! under the locks (the graph may have changed in between), and only then
//! write both sides.
//!
//! Parent-child edges carry extra bookkeeping: the child's `parent` field
//! mirrors the edge, an issue has at most one parent, and attaching a new
//! parent detaches the old one on both sides.

use super::paths;
use super::Store;
use crate::domain::{DepRef, DependencyType, Issue};
use crate::error::{Error, Result};
use chrono::Utc;
use std::collections::{HashSet, VecDeque};

/// Attempts to stabilize the lock set under concurrent reparenting before
/// giving up.
const MAX_LOCK_RETRIES: usize = 8;

impl Store {
    /// Add a typed dependency edge `from -> to`.
    ///
    /// Edges are deduplicated by target id: adding an edge to an issue that
    /// `from` already depends on is a no-op and the existing entry's type is
    /// preserved, whatever type the caller passed. For `parent-child`, a
    /// prior parent different from `to` is detached on both sides and the
    /// child's `parent` mirror is updated.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if either issue does not exist
    /// - [`Error::Cycle`] if `from == to` or the edge would close a cycle
    ///   within this dependency type
    pub fn add_dependency(
        &self,
        from_id: &str,
        to_id: &str,
        dep_type: DependencyType,
    ) -> Result<()> {
        self.check_cancelled()?;

        if from_id == to_id {
            return Err(cycle_error(from_id, to_id, dep_type));
        }
        if paths::find_issue_file(self.root(), to_id).is_none() {
            return Err(Error::NotFound(to_id.to_string()));
        }

        // Optimistic pre-check before any lock: cheap rejection for the
        // common case, re-verified under the lock set below.
        let (from_issue, _) = self.read_required(from_id)?;
        self.check_cycle(from_id, to_id, dep_type)?;

        let mut displaced = displaced_parent(&from_issue, to_id, dep_type);

        for _ in 0..MAX_LOCK_RETRIES {
            let mut lock_ids = vec![from_id, to_id];
            if let Some(p) = displaced.as_deref() {
                lock_ids.push(p);
            }
            let locks = self.lock_issue_set(&lock_ids)?;

            let (mut from_cur, _) = self.read_required(from_id)?;
            let (mut to_cur, _) = self.read_required(to_id)?;

            // The lock set was derived from an unlocked read; if another
            // mutator reparented `from` in the window, the displaced parent
            // we locked is the wrong issue. Recompute and go again.
            let current_displaced = displaced_parent(&from_cur, to_id, dep_type);
            if current_displaced != displaced {
                displaced = current_displaced;
                drop(locks);
                continue;
            }

            self.check_cycle(from_id, to_id, dep_type)?;

            let existing = from_cur
                .dependencies
                .iter()
                .find(|d| d.id == to_id)
                .map(|d| d.dep_type);
            let final_type = existing.unwrap_or(dep_type);
            let wires_parent =
                dep_type == DependencyType::ParentChild && final_type == DependencyType::ParentChild;

            if wires_parent {
                if let Some(old_parent_id) = displaced.as_deref() {
                    self.detach_parent_side(old_parent_id, from_id)?;
                    from_cur
                        .dependencies
                        .retain(|d| !(d.dep_type == DependencyType::ParentChild && d.id != to_id));
                }
                from_cur.parent = Some(to_id.to_string());
            }

            if existing.is_none() {
                from_cur.dependencies.push(DepRef::new(to_id, final_type));
            }
            if !to_cur.has_dependent(from_id) {
                to_cur.dependents.push(DepRef::new(from_id, final_type));
            }

            let now = Utc::now();
            from_cur.updated_at = now;
            to_cur.updated_at = now;
            self.write_issue_in_place(&from_cur)?;
            self.write_issue_in_place(&to_cur)?;

            drop(locks);
            return Ok(());
        }

        Err(Error::Validation(format!(
            "concurrent reparenting of {from_id} kept invalidating the lock set"
        )))
    }

    /// Remove the edge between `from` and `to`, whatever its type.
    ///
    /// Clears both sides; if the removed edge was parent-child the child's
    /// `parent` mirror is cleared too. Removing an edge that does not exist
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if either issue does not exist.
    pub fn remove_dependency(&self, from_id: &str, to_id: &str) -> Result<()> {
        self.check_cancelled()?;

        let locks = self.lock_issue_set(&[from_id, to_id])?;

        let (mut from_cur, _) = self.read_required(from_id)?;
        let (mut to_cur, _) = self.read_required(to_id)?;

        let had_dependency = from_cur.has_dependency(to_id);
        let had_dependent = to_cur.has_dependent(from_id);
        let clears_parent = from_cur.parent.as_deref() == Some(to_id);

        if !had_dependency && !had_dependent && !clears_parent {
            return Ok(());
        }

        let now = Utc::now();

        if had_dependency || clears_parent {
            from_cur.dependencies.retain(|d| d.id != to_id);
            if clears_parent {
                from_cur.parent = None;
            }
            from_cur.updated_at = now;
            self.write_issue_in_place(&from_cur)?;
        }
        if had_dependent {
            to_cur.dependents.retain(|d| d.id != from_id);
            to_cur.updated_at = now;
            self.write_issue_in_place(&to_cur)?;
        }

        drop(locks);
        Ok(())
    }

    /// Fail if edge `from -> to` of `dep_type` would close a cycle.
    ///
    /// For `parent-child` this walks the `parent` mirror upward from `to`
    /// (the ancestor chain is depth-bounded, and a visited set guards
    /// against malformed loops). For every other type it is a BFS over the
    /// on-disk `dependencies` graph restricted to that type, starting at
    /// `to` and failing if `from` is reachable.
    fn check_cycle(&self, from_id: &str, to_id: &str, dep_type: DependencyType) -> Result<()> {
        if dep_type == DependencyType::ParentChild {
            let mut visited = HashSet::new();
            let mut current = Some(to_id.to_string());
            while let Some(cur) = current {
                if cur == from_id {
                    return Err(cycle_error(from_id, to_id, dep_type));
                }
                if !visited.insert(cur.clone()) {
                    break;
                }
                current = self.try_read(&cur).and_then(|issue| issue.parent);
            }
            return Ok(());
        }

        let mut visited: HashSet<String> = HashSet::from([to_id.to_string()]);
        let mut queue: VecDeque<String> = VecDeque::from([to_id.to_string()]);
        while let Some(cur) = queue.pop_front() {
            if cur == from_id {
                return Err(cycle_error(from_id, to_id, dep_type));
            }
            let Some(issue) = self.try_read(&cur) else {
                continue;
            };
            for dep in issue.dependencies.iter().filter(|d| d.dep_type == dep_type) {
                if visited.insert(dep.id.clone()) {
                    queue.push_back(dep.id.clone());
                }
            }
        }
        Ok(())
    }

    /// Remove `child`'s parent-child entry from the displaced parent's
    /// dependents. The old parent may already be gone; the doctor picks up
    /// whatever a missing side leaves behind.
    fn detach_parent_side(&self, old_parent_id: &str, child_id: &str) -> Result<()> {
        if paths::find_issue_file(self.root(), old_parent_id).is_none() {
            return Ok(());
        }
        let (mut old_parent, _) = self.read_required(old_parent_id)?;
        let before = old_parent.dependents.len();
        old_parent
            .dependents
            .retain(|d| !(d.id == child_id && d.dep_type == DependencyType::ParentChild));
        if old_parent.dependents.len() != before {
            old_parent.updated_at = Utc::now();
            self.write_issue_in_place(&old_parent)?;
        }
        Ok(())
    }

    fn try_read(&self, issue_id: &str) -> Option<Issue> {
        let file = paths::find_issue_file(self.root(), issue_id)?;
        super::read_issue_at(&file.path).ok()
    }
}

/// The parent that would be displaced by wiring `from` under `to`, derived
/// from both the `parent` mirror and any existing parent-child entry so an
/// inconsistent pre-state still yields the right lock target.
fn displaced_parent(from_issue: &Issue, to_id: &str, dep_type: DependencyType) -> Option<String> {
    if dep_type != DependencyType::ParentChild {
        return None;
    }
    from_issue
        .dependencies
        .iter()
        .find(|d| d.dep_type == DependencyType::ParentChild)
        .map(|d| d.id.clone())
        .or_else(|| from_issue.parent.clone())
        .filter(|p| p != to_id)
}

fn cycle_error(from_id: &str, to_id: &str, dep_type: DependencyType) -> Error {
    Error::Cycle {
        from: from_id.to_string(),
        to: to_id.to_string(),
        dep_type,
    }
}

#[cfg(test)]
mod tests {
    use crate::config::StoreConfig;
    use crate::domain::{DependencyType, NewIssue};
    use crate::error::Error;
    use crate::store::Store;
    use tempfile::TempDir;

    fn new_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::init(&dir.path().join(".beads"), StoreConfig::new("bd")).unwrap();
        (dir, store)
    }

    fn create(store: &Store, title: &str) -> String {
        store
            .create(NewIssue {
                title: title.to_string(),
                ..Default::default()
            })
            .unwrap()
            .id
    }

    #[test]
    fn edge_is_recorded_on_both_sides() {
        let (_dir, store) = new_store();
        let a = create(&store, "A");
        let b = create(&store, "B");

        store.add_dependency(&a, &b, DependencyType::Blocks).unwrap();

        let a_issue = store.get(&a).unwrap();
        let b_issue = store.get(&b).unwrap();
        assert_eq!(a_issue.dependency_ids(Some(DependencyType::Blocks)), vec![b.as_str()]);
        assert_eq!(b_issue.dependent_ids(Some(DependencyType::Blocks)), vec![a.as_str()]);
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let (_dir, store) = new_store();
        let a = create(&store, "A");

        let err = store
            .add_dependency(&a, &a, DependencyType::Blocks)
            .unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }));
    }

    #[test]
    fn two_hop_cycle_is_rejected() {
        let (_dir, store) = new_store();
        let a = create(&store, "A");
        let b = create(&store, "B");
        let c = create(&store, "C");

        store.add_dependency(&a, &b, DependencyType::Blocks).unwrap();
        store.add_dependency(&b, &c, DependencyType::Blocks).unwrap();

        let err = store
            .add_dependency(&c, &a, DependencyType::Blocks)
            .unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }));
    }

    #[test]
    fn cycles_are_per_type() {
        let (_dir, store) = new_store();
        let a = create(&store, "A");
        let b = create(&store, "B");

        store.add_dependency(&a, &b, DependencyType::Blocks).unwrap();
        // The reverse edge under a different type is not a cycle.
        store
            .add_dependency(&b, &a, DependencyType::Related)
            .unwrap();

        let b_issue = store.get(&b).unwrap();
        assert!(b_issue.has_dependency(&a));
    }

    #[test]
    fn duplicate_add_preserves_existing_type() {
        let (_dir, store) = new_store();
        let a = create(&store, "A");
        let b = create(&store, "B");

        store.add_dependency(&a, &b, DependencyType::Blocks).unwrap();
        store
            .add_dependency(&a, &b, DependencyType::Related)
            .unwrap();

        let a_issue = store.get(&a).unwrap();
        assert_eq!(a_issue.dependencies.len(), 1);
        assert_eq!(a_issue.dependencies[0].dep_type, DependencyType::Blocks);
    }

    #[test]
    fn parent_child_sets_parent_mirror() {
        let (_dir, store) = new_store();
        let parent = create(&store, "P");
        let child = create(&store, "C");

        store
            .add_dependency(&child, &parent, DependencyType::ParentChild)
            .unwrap();

        let child_issue = store.get(&child).unwrap();
        let parent_issue = store.get(&parent).unwrap();
        assert_eq!(child_issue.parent.as_deref(), Some(parent.as_str()));
        assert_eq!(parent_issue.children(), vec![child.as_str()]);
    }

    #[test]
    fn parent_cycle_via_ancestor_walk() {
        let (_dir, store) = new_store();
        let a = create(&store, "A");
        let b = create(&store, "B");
        let c = create(&store, "C");

        store
            .add_dependency(&b, &a, DependencyType::ParentChild)
            .unwrap();
        store
            .add_dependency(&c, &b, DependencyType::ParentChild)
            .unwrap();

        // a is an ancestor of c; making a a child of c closes the loop.
        let err = store
            .add_dependency(&a, &c, DependencyType::ParentChild)
            .unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }));
    }

    #[test]
    fn reparenting_detaches_old_parent() {
        let (_dir, store) = new_store();
        let p1 = create(&store, "P1");
        let p2 = create(&store, "P2");
        let child = create(&store, "C");

        store
            .add_dependency(&child, &p1, DependencyType::ParentChild)
            .unwrap();
        store
            .add_dependency(&child, &p2, DependencyType::ParentChild)
            .unwrap();

        let child_issue = store.get(&child).unwrap();
        let p1_issue = store.get(&p1).unwrap();
        let p2_issue = store.get(&p2).unwrap();

        assert_eq!(child_issue.parent.as_deref(), Some(p2.as_str()));
        assert!(p1_issue.children().is_empty());
        assert_eq!(p2_issue.children(), vec![child.as_str()]);
        // Single parent-child entry only.
        assert_eq!(
            child_issue
                .dependency_ids(Some(DependencyType::ParentChild))
                .len(),
            1
        );
    }

    #[test]
    fn remove_clears_both_sides_and_parent() {
        let (_dir, store) = new_store();
        let parent = create(&store, "P");
        let child = create(&store, "C");

        store
            .add_dependency(&child, &parent, DependencyType::ParentChild)
            .unwrap();
        store.remove_dependency(&child, &parent).unwrap();

        let child_issue = store.get(&child).unwrap();
        let parent_issue = store.get(&parent).unwrap();
        assert!(child_issue.parent.is_none());
        assert!(child_issue.dependencies.is_empty());
        assert!(parent_issue.dependents.is_empty());
    }

    #[test]
    fn remove_missing_edge_is_noop() {
        let (_dir, store) = new_store();
        let a = create(&store, "A");
        let b = create(&store, "B");

        store.remove_dependency(&a, &b).unwrap();
    }

    #[test]
    fn add_to_missing_issue_is_not_found() {
        let (_dir, store) = new_store();
        let a = create(&store, "A");

        let err = store
            .add_dependency(&a, "bd-none", DependencyType::Blocks)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
