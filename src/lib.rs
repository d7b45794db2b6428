pub mod audit;
pub mod config;
pub mod context;
pub mod error;
pub mod git;
pub mod model;

// Re-export commonly used types for convenience
pub use config::Config;
pub use context::{Event, MutationOutcome, RepoState, RepositoryContext, ScanOutcome};
pub use error::{CoreError, CoreResult, GitError, ParseError};
pub use git::{CommandOutput, CommandRunner, GitExecutor, GitVersion, RepoPath};
pub use model::{ChangeRecord, ChangeSetDiff, ChangeSetModel, FileStatus, StatusFilter};
