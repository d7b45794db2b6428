use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::audit::AuditLogger;
use crate::config::settings::Config;
use crate::error::{GitError, GitResult};
use crate::git::commands::display_args;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Raw result of one git invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was ended by a signal
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Runs one version-control command against a repository
///
/// Implementations forward the exit code without interpreting it. Only a
/// failure to start the process (or to finish in time) is an error.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, repo_path: &Path, args: &[OsString]) -> GitResult<CommandOutput>;
}

/// Spawns the configured git binary
#[derive(Debug, Clone)]
pub struct GitExecutor {
    program: PathBuf,
    global_args: Vec<OsString>,
    timeout: Duration,
    permits: Arc<Semaphore>,
    audit: Option<Arc<AuditLogger>>,
}

impl GitExecutor {
    /// Create an executor for the given git binary with default limits
    pub fn new<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            global_args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            permits: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT)),
            audit: None,
        }
    }

    /// Build an executor from configuration
    ///
    /// Fails with `ToolNotConfigured` when no executable is set.
    pub fn from_config(config: &Config) -> GitResult<Self> {
        let program = config
            .git
            .executable
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(GitError::ToolNotConfigured)?;

        let mut executor = Self::new(program)
            .with_global_args(config.git.global_args.iter().map(OsString::from))
            .with_timeout(Duration::from_secs(config.git.timeout_seconds))
            .with_max_concurrent(config.git.max_concurrent_commands);

        if config.logging.log_commands {
            let logger = match &config.logging.audit_log {
                Some(path) => AuditLogger::with_path(path)?,
                None => AuditLogger::new()?,
            };
            executor = executor.with_audit_logger(logger);
        }

        Ok(executor)
    }

    pub fn with_global_args<I: IntoIterator<Item = OsString>>(mut self, args: I) -> Self {
        self.global_args = args.into_iter().collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrent(mut self, limit: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    pub fn with_audit_logger(mut self, logger: AuditLogger) -> Self {
        self.audit = Some(Arc::new(logger));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn audit(&self, repo_path: &Path, args: &[OsString], outcome: &str, elapsed: Duration) {
        if let Some(logger) = &self.audit
            && let Err(e) = logger.log_command(&display_args(args), repo_path, outcome, elapsed)
        {
            warn!(error = %e, "failed to write audit log entry");
        }
    }
}

#[async_trait]
impl CommandRunner for GitExecutor {
    async fn run(&self, repo_path: &Path, args: &[OsString]) -> GitResult<CommandOutput> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| GitError::IoError(std::io::Error::other("executor pool closed")))?;

        let started = Instant::now();
        let mut command = Command::new(&self.program);
        command
            .args(&self.global_args)
            .args(args)
            .current_dir(repo_path)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_OPTIONAL_LOCKS", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.audit(repo_path, args, "spawn-failed", started.elapsed());
                return Err(GitError::SpawnFailure {
                    program: self.program.display().to_string(),
                    source,
                });
            }
        };

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let output = CommandOutput {
                    exit_code: output.status.code(),
                    stdout: output.stdout,
                    stderr: output.stderr,
                };
                let elapsed = started.elapsed();
                debug!(
                    repo = %repo_path.display(),
                    command = %display_args(args),
                    exit_code = ?output.exit_code,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "git command finished"
                );
                let outcome = match output.exit_code {
                    Some(code) => format!("exit:{code}"),
                    None => "signal".to_string(),
                };
                self.audit(repo_path, args, &outcome, elapsed);
                Ok(output)
            }
            Ok(Err(e)) => Err(GitError::IoError(e)),
            Err(_) => {
                warn!(
                    repo = %repo_path.display(),
                    command = %display_args(args),
                    timeout = ?self.timeout,
                    "git command timed out"
                );
                self.audit(repo_path, args, "timeout", started.elapsed());
                Err(GitError::Timeout(self.timeout))
            }
        }
    }
}
