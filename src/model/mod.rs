pub mod changeset;
pub mod record;

pub use changeset::{
    ChangeSetDiff, ChangeSetModel, Mutation, MutationKind, Query, Snapshot, StatusFilter,
};
pub use record::{ChangeRecord, FileStatus, RecordSet};
