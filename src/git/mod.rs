pub mod commands;
pub mod executor;
pub mod parser;
pub mod path;
pub mod version;

// Re-export commonly used types
pub use executor::{CommandOutput, CommandRunner, GitExecutor};
pub use parser::{parse_status, write_status};
pub use path::RepoPath;
pub use version::GitVersion;
