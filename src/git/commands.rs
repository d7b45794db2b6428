use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::settings::{StatusConfig, UntrackedFiles};
use crate::error::{GitError, GitResult};
use crate::model::record::ChangeRecord;

/// Arguments for the machine-readable status query
pub fn status_args(config: &StatusConfig) -> Vec<OsString> {
    let untracked = match config.untracked_files {
        UntrackedFiles::All => "--untracked-files=all",
        UntrackedFiles::Normal => "--untracked-files=normal",
        UntrackedFiles::No => "--untracked-files=no",
    };
    let renames = if config.detect_renames {
        "--renames"
    } else {
        "--no-renames"
    };

    ["status", "--porcelain=v1", "-z", untracked, renames]
        .into_iter()
        .map(OsString::from)
        .collect()
}

/// Stage the whole file, including deletions
pub fn stage_args(record: &ChangeRecord) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["--literal-pathspecs", "add", "-A", "--"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(record.path.to_os_string());
    args
}

/// Reset the index entry back to HEAD; renames reset both sides
pub fn unstage_args(record: &ChangeRecord) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["--literal-pathspecs", "reset", "-q", "--"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(record.path.to_os_string());
    if record.index_status.has_origin()
        && let Some(previous) = &record.previous_path
    {
        args.push(previous.to_os_string());
    }
    args
}

/// Render arguments for logs and error messages
pub fn display_args(args: &[OsString]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Find the working tree root by walking up from `start_path`
pub fn discover_root<P: AsRef<Path>>(start_path: P) -> GitResult<PathBuf> {
    let mut current = start_path.as_ref().to_path_buf();

    loop {
        if current.join(".git").exists() {
            return Ok(current);
        }

        if !current.pop() {
            return Err(GitError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no git repository above {}", start_path.as_ref().display()),
            )));
        }
    }
}
