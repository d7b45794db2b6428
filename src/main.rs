use clap::{Parser, Subcommand, ValueEnum};
use stagehand::context::{Change, Event, MutationOutcome, ScanOutcome};
use stagehand::git::commands::discover_root;
use stagehand::model::Query;
use stagehand::{Config, CoreError, GitVersion, RepoPath, RepositoryContext, StatusFilter};
use std::error::Error;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{Level, debug};

#[derive(Debug, Parser)]
#[command(name = "stagehand", about = "Inspect and stage working tree changes")]
struct Cli {
    /// Config file (defaults to ~/.config/stagehand/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Repository directory or any directory inside it
    #[arg(short = 'C', long, default_value = ".")]
    repo: PathBuf,

    /// Print the change set as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the current change set
    Status {
        #[arg(long, value_enum, default_value_t = FilterArg::All)]
        filter: FilterArg,
    },
    /// Stage a whole file
    Stage { path: OsString },
    /// Move a file's staged changes back to the working tree
    Unstage { path: OsString },
    /// Stage a file with worktree changes, otherwise unstage it
    Toggle { path: OsString },
    /// Re-scan periodically and print what changed
    Watch {
        #[arg(long, default_value_t = 2)]
        interval_secs: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FilterArg {
    All,
    Staged,
    Unstaged,
    Untracked,
    Conflicted,
}

impl From<FilterArg> for StatusFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => StatusFilter::All,
            FilterArg::Staged => StatusFilter::Staged,
            FilterArg::Unstaged => StatusFilter::Unstaged,
            FilterArg::Untracked => StatusFilter::Untracked,
            FilterArg::Conflicted => StatusFilter::Conflicted,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(config.logging.level.parse::<Level>().unwrap_or(Level::INFO))
        .with_writer(std::io::stderr)
        .init();

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Explicit file, else the default file if present, else built-in defaults
fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn Error>> {
    if let Some(path) = path {
        return Ok(Config::load_from(path)?);
    }

    let default_path = Config::config_path()?;
    if default_path.exists() {
        Ok(Config::load_from(default_path)?)
    } else {
        Ok(Config::default_config())
    }
}

async fn run(cli: Cli, config: Config) -> Result<(), Box<dyn Error>> {
    let executable = config
        .git
        .executable
        .clone()
        .ok_or(CoreError::ToolNotConfigured)?;
    let version = check_git_version(executable).await?;
    debug!(%version, "git version");

    let root = discover_root(&cli.repo)?;
    let ctx = RepositoryContext::from_config(&config, Handle::current())?;
    let mut events = ctx.subscribe();

    if let ScanOutcome::Failed(err) = ctx.open(&root).wait().await {
        return Err(format!("failed to read status of {}: {}", root.display(), err).into());
    }

    let command = cli.command.unwrap_or(Command::Status {
        filter: FilterArg::All,
    });

    match command {
        Command::Status { filter } => print_query(&ctx.query(filter.into()), cli.json)?,
        Command::Stage { path } => mutate(&ctx, ctx.stage(&repo_path(path))?.wait().await, cli.json)?,
        Command::Unstage { path } => {
            mutate(&ctx, ctx.unstage(&repo_path(path))?.wait().await, cli.json)?
        }
        Command::Toggle { path } => mutate(&ctx, ctx.toggle(&repo_path(path))?.wait().await, cli.json)?,
        Command::Watch { interval_secs } => {
            print_query(&ctx.query(StatusFilter::All), cli.json)?;
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        ctx.refresh()?;
                    }
                    Some(event) = events.recv() => print_event(&event),
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    Ok(())
}

/// Check the tool version on the blocking pool; `detect` waits on a child process
async fn check_git_version(executable: PathBuf) -> Result<GitVersion, Box<dyn Error>> {
    let version = tokio::task::spawn_blocking(move || GitVersion::validate(&executable)).await??;
    Ok(version)
}

fn mutate(ctx: &RepositoryContext, outcome: MutationOutcome, json: bool) -> Result<(), Box<dyn Error>> {
    match outcome {
        MutationOutcome::Applied(_) => print_query(&ctx.query(StatusFilter::All), json),
        MutationOutcome::Rejected { error, .. } => {
            print_query(&ctx.query(StatusFilter::All), json)?;
            Err(format!("git refused the change: {}", error).into())
        }
        MutationOutcome::Failed(error) => Err(error.to_string().into()),
        MutationOutcome::Discarded => Err("repository changed before the request finished".into()),
    }
}

fn print_query(query: &Query, json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        let records: Vec<_> = query.iter().collect();
        let doc = serde_json::json!({
            "generation": query.generation(),
            "records": records,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    for record in query.iter() {
        match &record.previous_path {
            Some(previous) => println!(
                "{}{} {} <- {}",
                record.index_status.code(),
                record.worktree_status.code(),
                record.path,
                previous
            ),
            None => println!(
                "{}{} {}",
                record.index_status.code(),
                record.worktree_status.code(),
                record.path
            ),
        }
    }
    Ok(())
}

fn print_event(event: &Event) {
    match event {
        Event::ModelUpdated(notification) => match &notification.change {
            Change::Full(snapshot) => {
                println!("generation {}: {} changed paths", notification.generation, snapshot.len())
            }
            Change::Diff(diff) if !diff.is_empty() => {
                println!("generation {}:", notification.generation);
                for path in &diff.added {
                    println!("  + {}", path);
                }
                for path in &diff.removed {
                    println!("  - {}", path);
                }
                for path in &diff.status_changed {
                    println!("  ~ {}", path);
                }
            }
            Change::Diff(_) => {}
        },
        Event::StateChanged {
            error: Some(error), ..
        } => eprintln!("status refresh failed: {}", error),
        _ => {}
    }
}

#[cfg(unix)]
fn repo_path(arg: OsString) -> RepoPath {
    use std::os::unix::ffi::OsStringExt;
    RepoPath::from_bytes(arg.into_vec())
}

#[cfg(not(unix))]
fn repo_path(arg: OsString) -> RepoPath {
    RepoPath::from(arg.to_string_lossy().into_owned())
}
