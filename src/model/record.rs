use serde::Serialize;

use crate::error::ParseError;
use crate::git::path::RepoPath;

/// Classification of one side (index or worktree) of a status record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FileStatus {
    Unmodified,
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    Untracked,
    Conflicted,
    /// Raw status byte git emitted that this engine does not know
    Unknown(u8),
}

impl FileStatus {
    /// Map a single porcelain status character
    pub fn from_code(code: u8) -> Self {
        match code {
            b' ' | b'.' => FileStatus::Unmodified,
            b'M' | b'T' => FileStatus::Modified,
            b'A' => FileStatus::Added,
            b'D' => FileStatus::Deleted,
            b'R' => FileStatus::Renamed,
            b'C' => FileStatus::Copied,
            b'?' => FileStatus::Untracked,
            b'U' => FileStatus::Conflicted,
            other => FileStatus::Unknown(other),
        }
    }

    /// Porcelain status byte, exactly as git writes it
    pub fn byte(self) -> u8 {
        match self {
            FileStatus::Unmodified => b' ',
            FileStatus::Added => b'A',
            FileStatus::Modified => b'M',
            FileStatus::Deleted => b'D',
            FileStatus::Renamed => b'R',
            FileStatus::Copied => b'C',
            FileStatus::Untracked => b'?',
            FileStatus::Conflicted => b'U',
            FileStatus::Unknown(b) => b,
        }
    }

    /// Porcelain character for display; bytes above 0x7f show as Latin-1
    pub fn code(self) -> char {
        char::from(self.byte())
    }

    /// Whether the record carries an origin path (rename or copy)
    pub fn has_origin(self) -> bool {
        matches!(self, FileStatus::Renamed | FileStatus::Copied)
    }
}

/// One changed path in the working tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    pub path: RepoPath,
    pub previous_path: Option<RepoPath>,
    pub index_status: FileStatus,
    pub worktree_status: FileStatus,
}

impl ChangeRecord {
    pub fn new(path: impl Into<RepoPath>, index_status: FileStatus, worktree_status: FileStatus) -> Self {
        Self {
            path: path.into(),
            previous_path: None,
            index_status,
            worktree_status,
        }
    }

    pub fn with_previous_path(mut self, previous: impl Into<RepoPath>) -> Self {
        self.previous_path = Some(previous.into());
        self
    }

    /// True when the index holds a change for this path
    ///
    /// Untracked and unmerged entries are not staged even though their index
    /// column is not blank.
    pub fn is_staged(&self) -> bool {
        matches!(
            self.index_status,
            FileStatus::Added
                | FileStatus::Modified
                | FileStatus::Deleted
                | FileStatus::Renamed
                | FileStatus::Copied
        )
    }

    /// True when the working tree differs from the index
    pub fn has_worktree_changes(&self) -> bool {
        self.worktree_status != FileStatus::Unmodified
    }

    pub fn is_untracked(&self) -> bool {
        self.index_status == FileStatus::Untracked
    }

    pub fn is_conflicted(&self) -> bool {
        self.index_status == FileStatus::Conflicted || self.worktree_status == FileStatus::Conflicted
    }

    pub fn is_unmodified(&self) -> bool {
        self.index_status == FileStatus::Unmodified && self.worktree_status == FileStatus::Unmodified
    }

    /// Same classification as `other`, ignoring the path
    pub fn same_status(&self, other: &ChangeRecord) -> bool {
        self.index_status == other.index_status
            && self.worktree_status == other.worktree_status
            && self.previous_path == other.previous_path
    }
}

/// A path-sorted, duplicate-free list of records
///
/// This is the only input `ChangeSetModel::replace` accepts, so every
/// installed snapshot is ordered and unique by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet(Vec<ChangeRecord>);

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort records by path and reject duplicates
    ///
    /// Records that are unmodified on both sides are dropped: absence already
    /// means unmodified.
    pub fn from_records(mut records: Vec<ChangeRecord>) -> Result<Self, ParseError> {
        records.retain(|r| !r.is_unmodified());
        records.sort_by(|a, b| a.path.cmp(&b.path));

        if let Some(pair) = records.windows(2).find(|w| w[0].path == w[1].path) {
            return Err(ParseError::DuplicatePath(pair[1].path.clone()));
        }

        Ok(Self(records))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeRecord> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[ChangeRecord] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<ChangeRecord> {
        self.0
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a ChangeRecord;
    type IntoIter = std::slice::Iter<'a, ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
