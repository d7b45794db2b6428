#![allow(dead_code)]

use async_trait::async_trait;
use stagehand::config::StatusConfig;
use stagehand::context::{Event, RepoState};
use stagehand::error::{GitError, GitResult};
use stagehand::{CommandOutput, CommandRunner, RepositoryContext};
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::runtime::Handle;
use tokio::sync::{Notify, mpsc};

/// Limit reported by `FakeGit` when a repository is set to time out
pub const FAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Helper to create a test git repository
pub fn create_test_repo() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let repo_path = temp_dir.path().to_path_buf();

    git(&repo_path, &["init", "-q"]);
    git(&repo_path, &["config", "user.name", "Test User"]);
    git(&repo_path, &["config", "user.email", "test@example.com"]);
    git(&repo_path, &["config", "commit.gpgsign", "false"]);

    (temp_dir, repo_path)
}

/// Run git in `repo_path`, panicking on failure
pub fn git(repo_path: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Helper to create a commit
pub fn create_commit(repo_path: &Path, file: &str, content: &str, message: &str) {
    fs::write(repo_path.join(file), content).expect("Failed to write file");
    git(repo_path, &["add", "--", file]);
    git(repo_path, &["commit", "-q", "-m", message]);
}

/// Drain everything currently queued on an event channel
pub fn drain(events: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

pub fn states(events: &[Event]) -> Vec<RepoState> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::StateChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}

#[derive(Debug, Default)]
struct FakeRepo {
    /// path -> (index, worktree) status characters
    entries: BTreeMap<Vec<u8>, (u8, u8)>,
    /// verbatim status output, overriding `entries`
    raw_status: Option<Vec<u8>>,
    gate: Option<Arc<Notify>>,
    unavailable: bool,
    timed_out: bool,
}

/// In-memory stand-in for the git binary
///
/// Understands `status`, `add` and `reset` well enough to exercise the
/// context's refresh and mutation paths deterministically.
#[derive(Debug, Default)]
pub struct FakeGit {
    repos: Mutex<HashMap<PathBuf, FakeRepo>>,
    calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
}

impl FakeGit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn context(self: &Arc<Self>) -> RepositoryContext {
        RepositoryContext::new(
            Arc::clone(self) as Arc<dyn CommandRunner>,
            StatusConfig::default(),
            Handle::current(),
        )
    }

    pub fn add_repo(&self, repo: &str) {
        self.repos
            .lock()
            .unwrap()
            .entry(PathBuf::from(repo))
            .or_default();
    }

    pub fn set_entry(&self, repo: &str, path: &str, xy: &str) {
        let code = xy.as_bytes();
        self.repos
            .lock()
            .unwrap()
            .entry(PathBuf::from(repo))
            .or_default()
            .entries
            .insert(path.as_bytes().to_vec(), (code[0], code[1]));
    }

    pub fn remove_entry(&self, repo: &str, path: &str) {
        if let Some(state) = self.repos.lock().unwrap().get_mut(Path::new(repo)) {
            state.entries.remove(path.as_bytes());
        }
    }

    pub fn set_raw_status(&self, repo: &str, raw: Option<&[u8]>) {
        self.repos
            .lock()
            .unwrap()
            .entry(PathBuf::from(repo))
            .or_default()
            .raw_status = raw.map(|r| r.to_vec());
    }

    pub fn set_unavailable(&self, repo: &str, unavailable: bool) {
        self.repos
            .lock()
            .unwrap()
            .entry(PathBuf::from(repo))
            .or_default()
            .unavailable = unavailable;
    }

    pub fn set_timed_out(&self, repo: &str, timed_out: bool) {
        self.repos
            .lock()
            .unwrap()
            .entry(PathBuf::from(repo))
            .or_default()
            .timed_out = timed_out;
    }

    /// Make commands for `repo` wait on the returned gate
    pub fn hold(&self, repo: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.repos
            .lock()
            .unwrap()
            .entry(PathBuf::from(repo))
            .or_default()
            .gate = Some(Arc::clone(&gate));
        gate
    }

    /// Stop gating new commands; commands already waiting stay blocked
    pub fn clear_gate(&self, repo: &str) {
        if let Some(state) = self.repos.lock().unwrap().get_mut(Path::new(repo)) {
            state.gate = None;
        }
    }

    pub fn release(&self, repo: &str) {
        let gate = self
            .repos
            .lock()
            .unwrap()
            .get_mut(Path::new(repo))
            .and_then(|state| state.gate.take());
        if let Some(gate) = gate {
            gate.notify_one();
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Yield until `count` commands have been issued
    pub async fn settle(&self, count: usize) {
        while self.calls.lock().unwrap().len() < count {
            tokio::task::yield_now().await;
        }
    }

    fn ok(stdout: Vec<u8>) -> CommandOutput {
        CommandOutput {
            exit_code: Some(0),
            stdout,
            stderr: Vec::new(),
        }
    }

    fn fatal(message: &str) -> CommandOutput {
        CommandOutput {
            exit_code: Some(128),
            stdout: Vec::new(),
            stderr: message.as_bytes().to_vec(),
        }
    }

    fn status(state: &FakeRepo) -> Vec<u8> {
        if let Some(raw) = &state.raw_status {
            return raw.clone();
        }
        let mut out = Vec::new();
        for (path, (x, y)) in &state.entries {
            out.extend_from_slice(&[*x, *y, b' ']);
            out.extend_from_slice(path);
            out.push(0);
        }
        out
    }

    fn add(state: &mut FakeRepo, path: &[u8]) -> bool {
        let Some(&(x, y)) = state.entries.get(path) else {
            return false;
        };
        let next = match (x, y) {
            (b'?', b'?') => Some((b'A', b' ')),
            (_, b' ') => Some((x, y)),
            (b'A', b'D') => None,
            (_, b'D') => Some((b'D', b' ')),
            (b' ', _) => Some((y, b' ')),
            _ => Some((x, b' ')),
        };
        match next {
            Some(code) => state.entries.insert(path.to_vec(), code),
            None => state.entries.remove(path),
        };
        true
    }

    fn reset(state: &mut FakeRepo, path: &[u8]) {
        let Some(&(x, y)) = state.entries.get(path) else {
            return;
        };
        let next = match (x, y) {
            (b' ', _) => Some((x, y)),
            (b'A', b'D') => None,
            (b'A', _) => Some((b'?', b'?')),
            (_, b' ') => Some((b' ', x)),
            _ => Some((b' ', y)),
        };
        match next {
            Some(code) => state.entries.insert(path.to_vec(), code),
            None => state.entries.remove(path),
        };
    }
}

#[async_trait]
impl CommandRunner for FakeGit {
    async fn run(&self, repo_path: &Path, args: &[OsString]) -> GitResult<CommandOutput> {
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        self.calls
            .lock()
            .unwrap()
            .push((repo_path.to_path_buf(), args.clone()));

        let gate = self
            .repos
            .lock()
            .unwrap()
            .get(repo_path)
            .and_then(|state| state.gate.clone());
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut repos = self.repos.lock().unwrap();
        let Some(state) = repos.get_mut(repo_path) else {
            return Ok(Self::fatal("fatal: not a git repository"));
        };
        if state.unavailable {
            return Err(GitError::SpawnFailure {
                program: "git".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "git not found"),
            });
        }
        if state.timed_out {
            return Err(GitError::Timeout(FAKE_TIMEOUT));
        }

        let paths: Vec<&[u8]> = args
            .iter()
            .skip_while(|a| a.as_str() != "--")
            .skip(1)
            .map(|a| a.as_bytes())
            .collect();

        if args.iter().any(|a| a == "status") {
            Ok(Self::ok(Self::status(state)))
        } else if args.iter().any(|a| a == "add") {
            for path in &paths {
                if !Self::add(state, path) {
                    return Ok(Self::fatal("fatal: pathspec did not match any files"));
                }
            }
            Ok(Self::ok(Vec::new()))
        } else if args.iter().any(|a| a == "reset") {
            for path in &paths {
                Self::reset(state, path);
            }
            Ok(Self::ok(Vec::new()))
        } else {
            Ok(Self::fatal("fatal: unsupported command"))
        }
    }
}
