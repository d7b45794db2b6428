//! Repository context: the single entry point the UI talks to.
//!
//! A context owns at most one repository and one live `ChangeSetModel`.
//! Requests return immediately with a handle; the git process and parsing
//! run on the runtime's workers. Every scan carries a token, and a result
//! whose token is no longer current is dropped without touching the model.

pub mod events;

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::settings::{Config, StatusConfig};
use crate::error::{CoreError, CoreResult};
use crate::git::commands::{self, display_args};
use crate::git::executor::{CommandRunner, GitExecutor};
use crate::git::parser::parse_status;
use crate::git::path::RepoPath;
use crate::model::changeset::{ChangeSetDiff, ChangeSetModel, Mutation, Query, Snapshot, StatusFilter};
use crate::model::record::RecordSet;

pub use events::{Change, Event, Notification, RepoState};

use events::Subscribers;

/// Result of one status scan
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    /// Installed as a new generation
    Applied { generation: u64, diff: ChangeSetDiff },
    /// Moved the context to `Error`; the previous snapshot is kept
    Failed(Arc<CoreError>),
    /// Superseded by a newer request and ignored
    Discarded,
}

/// Result of a stage/unstage request
#[derive(Debug, Clone)]
pub enum MutationOutcome {
    /// Mutation succeeded and the status was re-queried
    Applied(ScanOutcome),
    /// Git refused the mutation; the status was re-queried anyway
    Rejected {
        error: Arc<CoreError>,
        refresh: ScanOutcome,
    },
    /// Git could not be run (spawn failure or timeout); context is in `Error`
    Failed(Arc<CoreError>),
    /// The repository was switched or closed before completion
    Discarded,
}

/// Pending scan started by `open` or `refresh`
#[derive(Debug)]
pub struct ScanHandle {
    token: u64,
    task: JoinHandle<ScanOutcome>,
}

impl ScanHandle {
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Wait for the scan to complete
    pub async fn wait(self) -> ScanOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => ScanOutcome::Discarded,
        }
    }
}

/// Pending stage/unstage request
#[derive(Debug)]
pub struct MutationHandle {
    task: JoinHandle<MutationOutcome>,
}

impl MutationHandle {
    pub async fn wait(self) -> MutationOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => MutationOutcome::Discarded,
        }
    }
}

struct Inner {
    state: RepoState,
    repository: Option<PathBuf>,
    model: ChangeSetModel,
    stale: bool,
    last_error: Option<Arc<CoreError>>,
    /// Bumped for every scan request; only the latest may install results
    token: u64,
    /// Bumped for every open/close; orphans mutations of the old repository
    epoch: u64,
    /// Repositories with a stage/unstage still running, orphaned or not
    mutating: HashSet<PathBuf>,
    subscribers: Subscribers,
}

impl Inner {
    fn transition(&mut self, state: RepoState) {
        debug!(from = ?self.state, to = ?state, "repository state transition");
        self.state = state;
        self.subscribers.publish(Event::StateChanged {
            state,
            stale: self.stale,
            error: self.last_error.clone(),
        });
    }

    /// Forget the current repository and start a fresh epoch
    fn reset(&mut self, repository: Option<PathBuf>) {
        self.epoch += 1;
        self.token += 1;
        self.repository = repository;
        self.model = ChangeSetModel::new();
        self.stale = false;
        self.last_error = None;
        self.subscribers
            .publish(Event::RepositoryChanged(self.repository.clone()));
    }
}

struct Shared {
    runner: Arc<dyn CommandRunner>,
    status: StatusConfig,
    runtime: Handle,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn query_status(&self, repo: &Path) -> CoreResult<RecordSet> {
        let args = commands::status_args(&self.status);
        let output = self.runner.run(repo, &args).await?;

        if !output.success() {
            return Err(CoreError::CommandFailed {
                command: display_args(&args),
                exit_code: output.exit_code,
                stderr: output.stderr_lossy(),
            });
        }

        Ok(parse_status(&output.stdout)?)
    }

    async fn scan(&self, repo: PathBuf, token: u64) -> ScanOutcome {
        let result = self.query_status(&repo).await;
        self.complete_scan(token, result)
    }

    fn complete_scan(&self, token: u64, result: CoreResult<RecordSet>) -> ScanOutcome {
        let mut inner = self.lock();

        if inner.token != token {
            debug!(token, current = inner.token, "discarding stale scan result");
            return ScanOutcome::Discarded;
        }

        match result {
            Ok(records) => {
                let diff = inner.model.replace(records);
                let generation = inner.model.generation();
                inner.stale = false;
                inner.last_error = None;

                let change = if generation == 1 {
                    Change::Full(inner.model.snapshot())
                } else {
                    Change::Diff(diff.clone())
                };
                inner.subscribers.publish(Event::ModelUpdated(Notification {
                    state: RepoState::Ready,
                    generation,
                    change,
                }));
                inner.transition(RepoState::Ready);

                ScanOutcome::Applied { generation, diff }
            }
            Err(err) => {
                warn!(error = %err, "status scan failed; keeping previous snapshot");
                let err = Arc::new(err);
                inner.stale = true;
                inner.last_error = Some(Arc::clone(&err));
                inner.transition(RepoState::Error);
                ScanOutcome::Failed(err)
            }
        }
    }

    async fn apply_mutation(&self, repo: PathBuf, epoch: u64, mutation: Mutation) -> MutationOutcome {
        let args = mutation.args();
        let result = self.runner.run(&repo, &args).await;

        let (token, rejection, orphaned) = {
            let mut inner = self.lock();
            inner.mutating.remove(&repo);

            if inner.epoch != epoch {
                if inner.repository.as_ref() != Some(&repo) {
                    debug!(path = %mutation.record.path, "discarding mutation for a closed repository");
                    return MutationOutcome::Discarded;
                }
                // reopened while the mutation ran: the index moved under the new snapshot
                debug!(path = %mutation.record.path, "re-scanning after orphaned mutation");
                inner.token += 1;
                inner.transition(RepoState::Scanning);
                (inner.token, None, true)
            } else {
                let rejection = match result {
                    Ok(output) if output.success() => None,
                    Ok(output) => Some(Arc::new(CoreError::CommandFailed {
                        command: display_args(&args),
                        exit_code: output.exit_code,
                        stderr: output.stderr_lossy(),
                    })),
                    Err(err) => {
                        let err = Arc::new(CoreError::from(err));
                        warn!(error = %err, path = %mutation.record.path, "mutation could not run");
                        inner.stale = true;
                        inner.last_error = Some(Arc::clone(&err));
                        inner.transition(RepoState::Error);
                        return MutationOutcome::Failed(err);
                    }
                };

                // re-read ground truth rather than patching the record locally
                inner.token += 1;
                inner.transition(RepoState::Scanning);
                (inner.token, rejection, false)
            }
        };

        let refresh = self.scan(repo, token).await;
        if orphaned {
            return MutationOutcome::Discarded;
        }
        match rejection {
            None => MutationOutcome::Applied(refresh),
            Some(error) => MutationOutcome::Rejected { error, refresh },
        }
    }
}

/// Coordinates refreshes, repository switches and index mutations
#[derive(Clone)]
pub struct RepositoryContext {
    shared: Arc<Shared>,
}

impl RepositoryContext {
    /// Create an empty context that runs work on `runtime`
    pub fn new(runner: Arc<dyn CommandRunner>, status: StatusConfig, runtime: Handle) -> Self {
        let inner = Inner {
            state: RepoState::Empty,
            repository: None,
            model: ChangeSetModel::new(),
            stale: false,
            last_error: None,
            token: 0,
            epoch: 0,
            mutating: HashSet::new(),
            subscribers: Subscribers::default(),
        };

        Self {
            shared: Arc::new(Shared {
                runner,
                status,
                runtime,
                inner: Mutex::new(inner),
            }),
        }
    }

    /// Create a context backed by the configured git executable
    pub fn from_config(config: &Config, runtime: Handle) -> CoreResult<Self> {
        let executor = GitExecutor::from_config(config)?;
        Ok(Self::new(Arc::new(executor), config.status.clone(), runtime))
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Event> {
        self.shared.lock().subscribers.subscribe()
    }

    pub fn state(&self) -> RepoState {
        self.shared.lock().state
    }

    pub fn repository(&self) -> Option<PathBuf> {
        self.shared.lock().repository.clone()
    }

    /// Whether the visible snapshot predates a failed refresh
    pub fn is_stale(&self) -> bool {
        self.shared.lock().stale
    }

    pub fn last_error(&self) -> Option<Arc<CoreError>> {
        self.shared.lock().last_error.clone()
    }

    pub fn generation(&self) -> u64 {
        self.shared.lock().model.generation()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.shared.lock().model.snapshot()
    }

    pub fn query(&self, filter: StatusFilter) -> Query {
        self.shared.lock().model.query(filter)
    }

    /// Switch to `path` and start scanning it
    ///
    /// Any scan still running for the previous repository completes
    /// unobserved. A mutation still running keeps its repository busy until
    /// it exits, and if that repository is the one now open, a fresh scan
    /// follows it.
    pub fn open<P: Into<PathBuf>>(&self, path: P) -> ScanHandle {
        let path = path.into();
        let token = {
            let mut inner = self.shared.lock();
            info!(repo = %path.display(), "opening repository");
            inner.reset(Some(path.clone()));
            inner.transition(RepoState::Scanning);
            inner.token
        };
        self.spawn_scan(path, token)
    }

    /// Re-scan the current repository
    ///
    /// A refresh issued while a scan is running supersedes it.
    pub fn refresh(&self) -> CoreResult<ScanHandle> {
        let (repo, token) = {
            let mut inner = self.shared.lock();
            let repo = inner.repository.clone().ok_or(CoreError::NoRepository)?;
            inner.token += 1;
            inner.transition(RepoState::Scanning);
            (repo, inner.token)
        };
        Ok(self.spawn_scan(repo, token))
    }

    /// Drop the current repository and return to `Empty`
    pub fn close(&self) {
        let mut inner = self.shared.lock();
        if inner.repository.is_none() {
            return;
        }
        info!("closing repository");
        inner.reset(None);
        inner.transition(RepoState::Empty);
    }

    pub fn stage(&self, path: &RepoPath) -> CoreResult<MutationHandle> {
        self.mutate(path, ChangeSetModel::stage)
    }

    pub fn unstage(&self, path: &RepoPath) -> CoreResult<MutationHandle> {
        self.mutate(path, ChangeSetModel::unstage)
    }

    /// Stage if the path has worktree changes, otherwise unstage
    pub fn toggle(&self, path: &RepoPath) -> CoreResult<MutationHandle> {
        self.mutate(path, ChangeSetModel::toggle)
    }

    fn mutate(
        &self,
        path: &RepoPath,
        plan: fn(&ChangeSetModel, &RepoPath) -> CoreResult<Mutation>,
    ) -> CoreResult<MutationHandle> {
        let (repo, epoch, mutation) = {
            let mut inner = self.shared.lock();
            match inner.state {
                RepoState::Ready => {}
                RepoState::Scanning => return Err(CoreError::Busy),
                RepoState::Empty | RepoState::Error => return Err(CoreError::NoRepository),
            }
            let repo = inner.repository.clone().ok_or(CoreError::NoRepository)?;
            if inner.mutating.contains(&repo) {
                return Err(CoreError::Busy);
            }

            let mutation = plan(&inner.model, path)?;
            inner.mutating.insert(repo.clone());
            (repo, inner.epoch, mutation)
        };

        debug!(path = %path, kind = ?mutation.kind, "starting index mutation");
        let shared = Arc::clone(&self.shared);
        let task = self
            .shared
            .runtime
            .spawn(async move { shared.apply_mutation(repo, epoch, mutation).await });
        Ok(MutationHandle { task })
    }

    fn spawn_scan(&self, repo: PathBuf, token: u64) -> ScanHandle {
        debug!(repo = %repo.display(), token, "starting status scan");
        let shared = Arc::clone(&self.shared);
        let task = self
            .shared
            .runtime
            .spawn(async move { shared.scan(repo, token).await });
        ScanHandle { token, task }
    }
}

impl fmt::Debug for RepositoryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("RepositoryContext")
            .field("state", &inner.state)
            .field("repository", &inner.repository)
            .field("generation", &inner.model.generation())
            .field("stale", &inner.stale)
            .finish()
    }
}
