//! Offline consistency scan and repair.
//!
//! The doctor walks all four sections, classifies every file, and checks
//! the loaded issues against the store invariants: two-sided relationship
//! bookkeeping, the parent mirror, location/content agreement, and
//! referential integrity. With `fix = true` it repairs what it safely can;
//! unreadable or malformed files and dependency cycles are report-only.
//!
//! The scan is a single pass over in-memory state; each changed issue is
//! written exactly once at the end. Tombstone *content* is never mutated
//! (a tombstone is an audit record), though a misplaced file may still be
//! moved to the directory its content maps to.

use super::paths::{self, Section};
use super::{to_json_bytes, Store};
use crate::domain::{DepRef, DependencyType, Issue};
use crate::error::Result;
use beads_fs::FileLock;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// Classification of a single doctor finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    /// An abandoned in-flight temp file (`*.tmp.*`).
    OrphanedTempFile,

    /// A sidecar lock whose issue file no longer exists.
    OrphanedLockFile,

    /// A data file that could not be read.
    UnreadableFile,

    /// A data file that is not valid issue JSON.
    MalformedJson,

    /// The same issue id present in more than one section.
    DuplicateIssue,

    /// A file whose section disagrees with its content.
    LocationMismatch,

    /// `parent` points at an id that does not exist.
    BrokenParentRef,

    /// A dependency or dependent entry points at an id that does not exist.
    BrokenDependencyRef,

    /// An edge recorded on one endpoint but not the other.
    AsymmetricDependency,

    /// A parent-child link missing its mirror on the other endpoint.
    AsymmetricParentChild,

    /// A dependency cycle within a single edge type.
    DependencyCycle,
}

impl ProblemKind {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrphanedTempFile => "orphaned_temp_file",
            Self::OrphanedLockFile => "orphaned_lock_file",
            Self::UnreadableFile => "unreadable_file",
            Self::MalformedJson => "malformed_json",
            Self::DuplicateIssue => "duplicate_issue",
            Self::LocationMismatch => "location_mismatch",
            Self::BrokenParentRef => "broken_parent_ref",
            Self::BrokenDependencyRef => "broken_dependency_ref",
            Self::AsymmetricDependency => "asymmetric_dependency",
            Self::AsymmetricParentChild => "asymmetric_parent_child",
            Self::DependencyCycle => "dependency_cycle",
        }
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One doctor finding, possibly repaired.
#[derive(Debug, Clone, Serialize)]
pub struct Problem {
    /// What kind of inconsistency this is.
    pub kind: ProblemKind,

    /// The issue the finding is about, when one is identifiable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,

    /// The file the finding is about, when one is identifiable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Human-readable description.
    pub detail: String,

    /// Whether the repair was applied in this run.
    pub fixed: bool,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.detail)?;
        if self.fixed {
            write!(f, " (fixed)")?;
        }
        Ok(())
    }
}

/// One loaded issue during the scan.
struct Record {
    issue: Issue,
    section: Section,
    path: PathBuf,
    /// Content changed and needs a rewrite.
    dirty: bool,
    /// The section the content maps to (move target when it differs).
    target: Section,
}

impl Record {
    fn new(issue: Issue, section: Section, path: PathBuf) -> Self {
        Self {
            target: Section::for_issue(issue.status, issue.ephemeral),
            issue,
            section,
            path,
            dirty: false,
        }
    }

    /// Tombstone content is immutable to the doctor.
    fn content_frozen(&self) -> bool {
        self.target == Section::Deleted
    }
}

impl Store {
    /// Scan the store for inconsistencies, optionally repairing them.
    ///
    /// Returns every finding in scan order; with `fix = true` each
    /// repairable finding is applied and marked `fixed`. A second run after
    /// a fixing run reports nothing.
    ///
    /// # Errors
    ///
    /// Returns an error only for environmental failures (a section
    /// directory that cannot be listed, or a failed repair write);
    /// per-file problems become findings, not errors.
    pub fn doctor(&self, fix: bool) -> Result<Vec<Problem>> {
        self.check_cancelled()?;

        let mut problems = Vec::new();
        let mut records: BTreeMap<String, Record> = BTreeMap::new();

        self.scan_files(fix, &mut problems, &mut records)?;
        check_locations(fix, &mut problems, &records);
        check_references(fix, &mut problems, &mut records);
        check_symmetry(fix, &mut problems, &mut records);
        check_cycles(&mut problems, &records);

        if fix {
            self.apply_repairs(&records)?;
        }

        Ok(problems)
    }

    /// Walk every section: collect transient orphans, load parseable
    /// issues, and resolve duplicate ids.
    fn scan_files(
        &self,
        fix: bool,
        problems: &mut Vec<Problem>,
        records: &mut BTreeMap<String, Record>,
    ) -> Result<()> {
        let mut duplicates: Vec<Record> = Vec::new();

        for section in Section::LOOKUP_ORDER {
            let dir = section.dir(self.root());
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                let path = entry.path();

                if name.contains(".tmp.") {
                    let fixed = fix && fs::remove_file(&path).is_ok();
                    problems.push(Problem {
                        kind: ProblemKind::OrphanedTempFile,
                        issue_id: None,
                        path: Some(path),
                        detail: format!("abandoned temp file {name}"),
                        fixed,
                    });
                    continue;
                }

                if let Some(lock_id) = name.strip_suffix(".lock") {
                    if paths::find_issue_file(self.root(), lock_id).is_none() {
                        let fixed = fix && remove_unheld_lock(&path);
                        problems.push(Problem {
                            kind: ProblemKind::OrphanedLockFile,
                            issue_id: Some(lock_id.to_string()),
                            path: Some(path),
                            detail: format!("sidecar lock for nonexistent issue {lock_id}"),
                            fixed,
                        });
                    }
                    continue;
                }

                let Some(issue_id) = paths::id_from_file_name(&name) else {
                    continue;
                };

                let bytes = match beads_fs::read_locked(&path) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        problems.push(Problem {
                            kind: ProblemKind::UnreadableFile,
                            issue_id: Some(issue_id.to_string()),
                            path: Some(path),
                            detail: format!("cannot read {name}: {e}"),
                            fixed: false,
                        });
                        continue;
                    }
                };
                let issue: Issue = match serde_json::from_slice(&bytes) {
                    Ok(issue) => issue,
                    Err(e) => {
                        problems.push(Problem {
                            kind: ProblemKind::MalformedJson,
                            issue_id: Some(issue_id.to_string()),
                            path: Some(path),
                            detail: format!("cannot parse {name}: {e}"),
                            fixed: false,
                        });
                        continue;
                    }
                };

                let record = Record::new(issue, section, path);
                if records.contains_key(issue_id) {
                    duplicates.push(record);
                } else {
                    records.insert(issue_id.to_string(), record);
                }
            }
        }

        // Duplicate resolution: keep the copy whose section matches its
        // content, drop the rest. Sections are visited in lookup order, so
        // the record already in the map is the lookup-order winner; it
        // yields only to a later copy that is the one in the right place.
        for later in duplicates {
            let issue_id = later.issue.id.clone();
            let keep_later = records.get(&issue_id).is_some_and(|current| {
                current.section != current.target && later.section == later.target
            });

            let doomed_path = if keep_later {
                records.insert(issue_id.clone(), later).map(|r| r.path)
            } else {
                Some(later.path)
            };

            if let Some(doomed) = doomed_path {
                let fixed = fix && fs::remove_file(&doomed).is_ok();
                problems.push(Problem {
                    kind: ProblemKind::DuplicateIssue,
                    issue_id: Some(issue_id),
                    path: Some(doomed),
                    detail: "same issue id present in more than one directory".to_string(),
                    fixed,
                });
            }
        }

        Ok(())
    }

    /// Write every changed or misplaced issue exactly once.
    fn apply_repairs(&self, records: &BTreeMap<String, Record>) -> Result<()> {
        for record in records.values() {
            let moved = record.section != record.target;
            if !record.dirty && !moved {
                continue;
            }

            let target_path = paths::issue_path(self.root(), record.target, &record.issue.id);
            beads_fs::write_atomic(&target_path, &to_json_bytes(&record.issue)?)?;
            if moved && record.path != target_path {
                fs::remove_file(&record.path)?;
            }
            tracing::debug!(issue = %record.issue.id, "doctor rewrote issue");
        }
        Ok(())
    }
}

/// Flag files whose section disagrees with their content; the move itself
/// happens in the final write phase.
fn check_locations(fix: bool, problems: &mut Vec<Problem>, records: &BTreeMap<String, Record>) {
    for record in records.values() {
        if record.section != record.target {
            problems.push(Problem {
                kind: ProblemKind::LocationMismatch,
                issue_id: Some(record.issue.id.clone()),
                path: Some(record.path.clone()),
                detail: format!(
                    "{} is in {}/ but its state maps to {}/",
                    record.issue.id,
                    record.section.dir_name(),
                    record.target.dir_name()
                ),
                fixed: fix,
            });
        }
    }
}

/// Drop references to ids that no longer exist.
fn check_references(fix: bool, problems: &mut Vec<Problem>, records: &mut BTreeMap<String, Record>) {
    let known: HashSet<String> = records.keys().cloned().collect();

    for record in records.values_mut() {
        let fixable = fix && !record.content_frozen();
        let issue_id = record.issue.id.clone();

        if let Some(parent) = record.issue.parent.clone() {
            if !known.contains(&parent) {
                if fixable {
                    record.issue.parent = None;
                    record
                        .issue
                        .dependencies
                        .retain(|d| !(d.dep_type == DependencyType::ParentChild && d.id == parent));
                    record.dirty = true;
                }
                problems.push(Problem {
                    kind: ProblemKind::BrokenParentRef,
                    issue_id: Some(issue_id.clone()),
                    path: Some(record.path.clone()),
                    detail: format!("{issue_id} has nonexistent parent {parent}"),
                    fixed: fixable,
                });
            }
        }

        let path = record.path.clone();
        let mut dropped_entries = false;
        for (field, entries) in [
            ("dependency", &mut record.issue.dependencies),
            ("dependent", &mut record.issue.dependents),
        ] {
            let broken: Vec<String> = entries
                .iter()
                .filter(|d| !known.contains(&d.id))
                .map(|d| d.id.clone())
                .collect();
            if broken.is_empty() {
                continue;
            }
            if fixable {
                entries.retain(|d| known.contains(&d.id));
                dropped_entries = true;
            }
            for target in broken {
                problems.push(Problem {
                    kind: ProblemKind::BrokenDependencyRef,
                    issue_id: Some(issue_id.clone()),
                    path: Some(path.clone()),
                    detail: format!("{issue_id} has {field} entry for nonexistent {target}"),
                    fixed: fixable,
                });
            }
        }
        if dropped_entries {
            record.dirty = true;
        }
    }
}

/// Restore two-sided bookkeeping and the parent mirror.
fn check_symmetry(fix: bool, problems: &mut Vec<Problem>, records: &mut BTreeMap<String, Record>) {
    // Findings are collected first; applying them needs mutable access to
    // the opposite endpoint.
    let mut missing_dependents: Vec<(String, DepRef)> = Vec::new();
    let mut missing_dependencies: Vec<(String, DepRef)> = Vec::new();
    let mut missing_parent_mirror: Vec<(String, String)> = Vec::new();
    let mut missing_parent_field: Vec<(String, String)> = Vec::new();

    for record in records.values() {
        let issue = &record.issue;

        for dep in &issue.dependencies {
            let Some(other) = records.get(&dep.id) else {
                continue; // broken ref, already handled
            };
            if !other.issue.has_dependent(&issue.id) {
                missing_dependents.push((dep.id.clone(), DepRef::new(&issue.id, dep.dep_type)));
            }
        }

        for dep in &issue.dependents {
            let Some(other) = records.get(&dep.id) else {
                continue;
            };
            if !other.issue.has_dependency(&issue.id) {
                missing_dependencies.push((dep.id.clone(), DepRef::new(&issue.id, dep.dep_type)));
            }
        }

        if let Some(parent) = &issue.parent {
            if let Some(parent_record) = records.get(parent) {
                if !parent_record.issue.has_dependent(&issue.id) {
                    missing_parent_mirror.push((parent.clone(), issue.id.clone()));
                }
            }
        }

        for child_id in issue.children() {
            if let Some(child) = records.get(child_id) {
                if child.issue.parent.is_none() {
                    missing_parent_field.push((child_id.to_string(), issue.id.clone()));
                }
            }
        }
    }

    for (owner, entry) in missing_dependents {
        let Some(record) = records.get_mut(&owner) else {
            continue;
        };
        let fixed = fix && !record.content_frozen();
        problems.push(Problem {
            kind: ProblemKind::AsymmetricDependency,
            issue_id: Some(owner.clone()),
            path: Some(record.path.clone()),
            detail: format!(
                "{} depends on {owner} but {owner} does not list it as a dependent",
                entry.id
            ),
            fixed,
        });
        if fixed && !record.issue.has_dependent(&entry.id) {
            record.issue.dependents.push(entry);
            record.dirty = true;
        }
    }

    for (owner, entry) in missing_dependencies {
        let Some(record) = records.get_mut(&owner) else {
            continue;
        };
        let fixed = fix && !record.content_frozen();
        problems.push(Problem {
            kind: ProblemKind::AsymmetricDependency,
            issue_id: Some(owner.clone()),
            path: Some(record.path.clone()),
            detail: format!(
                "{} lists {owner} as a dependent but {owner} has no dependency on it",
                entry.id
            ),
            fixed,
        });
        if fixed && !record.issue.has_dependency(&entry.id) {
            record.issue.dependencies.push(entry);
            record.dirty = true;
        }
    }

    for (parent_id, child_id) in missing_parent_mirror {
        let Some(record) = records.get_mut(&parent_id) else {
            continue;
        };
        let fixed = fix && !record.content_frozen();
        problems.push(Problem {
            kind: ProblemKind::AsymmetricParentChild,
            issue_id: Some(parent_id.clone()),
            path: Some(record.path.clone()),
            detail: format!("{child_id} names {parent_id} as parent but the parent side is missing"),
            fixed,
        });
        if fixed && !record.issue.has_dependent(&child_id) {
            record
                .issue
                .dependents
                .push(DepRef::new(child_id, DependencyType::ParentChild));
            record.dirty = true;
        }
    }

    for (child_id, parent_id) in missing_parent_field {
        let Some(record) = records.get_mut(&child_id) else {
            continue;
        };
        let fixed = fix && !record.content_frozen();
        problems.push(Problem {
            kind: ProblemKind::AsymmetricParentChild,
            issue_id: Some(child_id.clone()),
            path: Some(record.path.clone()),
            detail: format!("{parent_id} lists {child_id} as child but the child has no parent set"),
            fixed,
        });
        if fixed {
            record.issue.parent = Some(parent_id.clone());
            if !record.issue.has_dependency(&parent_id) {
                record
                    .issue
                    .dependencies
                    .push(DepRef::new(parent_id, DependencyType::ParentChild));
            }
            record.dirty = true;
        }
    }
}

/// Per-type cycle scan over the loaded graph; report-only.
fn check_cycles(problems: &mut Vec<Problem>, records: &BTreeMap<String, Record>) {
    let mut types: Vec<DependencyType> = records
        .values()
        .flat_map(|r| r.issue.dependencies.iter().map(|d| d.dep_type))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    types.sort_unstable_by_key(|t| t.as_str());

    for dep_type in types {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

        for id in records.keys() {
            nodes.insert(id.as_str(), graph.add_node(id.as_str()));
        }
        for record in records.values() {
            for dep in record
                .issue
                .dependencies
                .iter()
                .filter(|d| d.dep_type == dep_type)
            {
                if let (Some(&source), Some(&target)) = (
                    nodes.get(record.issue.id.as_str()),
                    nodes.get(dep.id.as_str()),
                ) {
                    graph.add_edge(source, target, ());
                }
            }
        }

        for scc in tarjan_scc(&graph) {
            let is_cycle =
                scc.len() > 1 || (scc.len() == 1 && graph.contains_edge(scc[0], scc[0]));
            if !is_cycle {
                continue;
            }
            let mut members: Vec<&str> = scc.iter().map(|&n| graph[n]).collect();
            members.sort_unstable();
            problems.push(Problem {
                kind: ProblemKind::DependencyCycle,
                issue_id: Some(members[0].to_string()),
                path: None,
                detail: format!("{dep_type} cycle between {}", members.join(", ")),
                fixed: false,
            });
        }
    }
}

/// Remove a lock file only when no live holder exists; a held flock makes
/// the non-blocking acquisition fail and the file is left alone.
fn remove_unheld_lock(path: &std::path::Path) -> bool {
    match FileLock::exclusive(path, Some(std::time::Duration::ZERO)) {
        Ok(mut lock) => {
            lock.set_remove_on_drop(true);
            true
        }
        Err(_) => false,
    }
}
