use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::config::settings::ConfigError;
use crate::git::path::RepoPath;

/// Errors produced while decoding status output
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Duplicate path in status output: {0}")]
    DuplicatePath(RepoPath),

    #[error("Status output truncated at byte {offset}")]
    Truncated { offset: usize },

    #[error("Malformed status record at byte {offset}: {reason}")]
    MalformedRecord { offset: usize, reason: String },
}

/// Errors from launching the version-control tool
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to spawn {program}: {source}")]
    SpawnFailure {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Git command timed out after {0:?}")]
    Timeout(Duration),

    #[error("No git executable configured")]
    ToolNotConfigured,

    #[error("Failed to parse git output: {0}")]
    ParseError(String),

    #[error("Git version {0} is too old. Minimum required: 2.18")]
    GitVersionTooOld(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Top-level error for status engine operations
///
/// Refresh failures (`Spawn`, `Parse`, `Timeout`, `CommandFailed`) are carried
/// into the context's `Error` state. `NotFound`, `Busy` and `NoRepository` are
/// only ever returned to the caller of a single request.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Spawn failure: {0}")]
    Spawn(GitError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Path not present in current status: {0}")]
    NotFound(RepoPath),

    #[error("Repository is busy")]
    Busy,

    #[error("No repository is ready")]
    NoRepository,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("No git executable configured")]
    ToolNotConfigured,

    #[error("git {command} exited with {exit_code:?}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<GitError> for CoreError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::Timeout(limit) => CoreError::Timeout(limit),
            GitError::ToolNotConfigured => CoreError::ToolNotConfigured,
            other => CoreError::Spawn(other),
        }
    }
}

/// Result type for git operations
pub type GitResult<T> = std::result::Result<T, GitError>;

/// Result type for status engine operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;
