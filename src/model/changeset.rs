use serde::Serialize;
use std::cmp::Ordering;
use std::ffi::OsString;
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::git::commands;
use crate::git::path::RepoPath;
use crate::model::record::{ChangeRecord, RecordSet};

/// Immutable view of one generation of the change set
#[derive(Debug, Default)]
pub struct Snapshot {
    generation: u64,
    records: RecordSet,
}

impl Snapshot {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn records(&self) -> &[ChangeRecord] {
        self.records.as_slice()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a record by path (records are path-sorted)
    pub fn get(&self, path: &RepoPath) -> Option<&ChangeRecord> {
        let records = self.records.as_slice();
        records
            .binary_search_by(|r| r.path.cmp(path))
            .ok()
            .map(|i| &records[i])
    }
}

/// Paths that differ between two consecutive generations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSetDiff {
    pub added: Vec<RepoPath>,
    pub removed: Vec<RepoPath>,
    pub status_changed: Vec<RepoPath>,
}

impl ChangeSetDiff {
    /// Compare two path-sorted record slices in a single merge pass
    pub fn between(old: &[ChangeRecord], new: &[ChangeRecord]) -> Self {
        let mut diff = ChangeSetDiff::default();
        let (mut i, mut j) = (0, 0);

        while i < old.len() && j < new.len() {
            match old[i].path.cmp(&new[j].path) {
                Ordering::Less => {
                    diff.removed.push(old[i].path.clone());
                    i += 1;
                }
                Ordering::Greater => {
                    diff.added.push(new[j].path.clone());
                    j += 1;
                }
                Ordering::Equal => {
                    if !old[i].same_status(&new[j]) {
                        diff.status_changed.push(new[j].path.clone());
                    }
                    i += 1;
                    j += 1;
                }
            }
        }

        diff.removed.extend(old[i..].iter().map(|r| r.path.clone()));
        diff.added.extend(new[j..].iter().map(|r| r.path.clone()));
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.status_changed.is_empty()
    }
}

/// Status category used to filter queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Staged,
    Unstaged,
    Untracked,
    Conflicted,
}

impl StatusFilter {
    pub fn matches(self, record: &ChangeRecord) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Staged => record.is_staged(),
            StatusFilter::Unstaged => {
                record.has_worktree_changes() && !record.is_untracked() && !record.is_conflicted()
            }
            StatusFilter::Untracked => record.is_untracked(),
            StatusFilter::Conflicted => record.is_conflicted(),
        }
    }
}

/// Filtered, restartable view pinned to one snapshot
///
/// Holding a `Query` keeps its generation alive, so iterating it after the
/// model has moved on still yields the records it was created against.
#[derive(Debug, Clone)]
pub struct Query {
    snapshot: Arc<Snapshot>,
    filter: StatusFilter,
}

impl Query {
    pub fn generation(&self) -> u64 {
        self.snapshot.generation
    }

    pub fn filter(&self) -> StatusFilter {
        self.filter
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeRecord> + '_ {
        let filter = self.filter;
        self.snapshot.records().iter().filter(move |r| filter.matches(r))
    }
}

/// Direction of an index mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Stage,
    Unstage,
}

/// A stage/unstage request validated against a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub kind: MutationKind,
    pub record: ChangeRecord,
    /// Generation the request was validated against
    pub generation: u64,
}

impl Mutation {
    /// Command line (after global args) that applies this mutation
    pub fn args(&self) -> Vec<OsString> {
        match self.kind {
            MutationKind::Stage => commands::stage_args(&self.record),
            MutationKind::Unstage => commands::unstage_args(&self.record),
        }
    }
}

/// The authoritative change set for one repository
///
/// The current snapshot is replaced wholesale on each refresh; readers clone
/// the `Arc` and never observe a partially built generation.
#[derive(Debug, Default)]
pub struct ChangeSetModel {
    snapshot: Arc<Snapshot>,
}

impl ChangeSetModel {
    /// Empty model at generation 0
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot.generation
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Install a new generation and return what changed since the last one
    pub fn replace(&mut self, records: RecordSet) -> ChangeSetDiff {
        let diff = ChangeSetDiff::between(self.snapshot.records(), records.as_slice());
        self.snapshot = Arc::new(Snapshot {
            generation: self.snapshot.generation + 1,
            records,
        });
        diff
    }

    pub fn query(&self, filter: StatusFilter) -> Query {
        Query {
            snapshot: self.snapshot(),
            filter,
        }
    }

    pub fn stage(&self, path: &RepoPath) -> CoreResult<Mutation> {
        self.plan(MutationKind::Stage, path)
    }

    pub fn unstage(&self, path: &RepoPath) -> CoreResult<Mutation> {
        self.plan(MutationKind::Unstage, path)
    }

    /// Stage a record with worktree changes, otherwise unstage it
    pub fn toggle(&self, path: &RepoPath) -> CoreResult<Mutation> {
        let record = self.lookup(path)?;
        let kind = if record.has_worktree_changes() {
            MutationKind::Stage
        } else {
            MutationKind::Unstage
        };
        self.plan(kind, path)
    }

    fn plan(&self, kind: MutationKind, path: &RepoPath) -> CoreResult<Mutation> {
        let record = self.lookup(path)?.clone();
        Ok(Mutation {
            kind,
            record,
            generation: self.generation(),
        })
    }

    fn lookup(&self, path: &RepoPath) -> CoreResult<&ChangeRecord> {
        self.snapshot
            .get(path)
            .ok_or_else(|| CoreError::NotFound(path.clone()))
    }
}
