mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fob_core::{BranchSwitch, Repository};
use output::{
    AddOutput, BranchInfo, BranchOutput, CommitInfo, CommitOutput, GcOutput, InitOutput,
    LogOutput, OutputWriter, PushOutput, VerifyOutput,
};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit code for failures without a more specific class.
const EXIT_FAILURE: u8 = 1;
/// Missing or already existing repository.
const EXIT_REPOSITORY: u8 = 3;
/// No current branch, unknown branch or invalid branch name.
const EXIT_BRANCH: u8 = 4;
/// Push rejected because histories diverged.
const EXIT_DIVERGED: u8 = 5;
/// Corrupt or inconsistent repository data.
const EXIT_CORRUPT: u8 = 6;

/// Fob - a minimal local version control system
#[derive(Parser)]
#[command(name = "fob")]
#[command(about = "Minimal local version control on a BLAKE3 commit graph", long_about = None)]
#[command(version)]
struct Cli {
    /// Working tree root (defaults to the current directory)
    #[arg(short, long, global = true, env = "FOB_ROOT")]
    root: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a repository in the working tree
    Init,

    /// Stage files; directories (including `.`) are added recursively
    Add {
        /// Paths to stage, relative to the working tree root
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Record the staged files as a new commit on the current branch
    Commit {
        /// Commit message
        #[arg(required_unless_present = "message_flag")]
        message: Option<String>,

        /// Commit message (alternative to the positional form)
        #[arg(short = 'm', long = "message", id = "message_flag", conflicts_with = "message")]
        message_flag: Option<String>,
    },

    /// Show history of the current branch, newest first
    Log {
        /// List every stored commit instead
        #[arg(long)]
        all: bool,
    },

    /// Switch to a branch, creating it from the current one if needed
    ///
    /// Without a name, show the current branch and list all branches.
    Branch {
        /// Branch name
        name: Option<String>,
    },

    /// Push a branch to another repository directory
    Push {
        /// Destination directory (defaults to <root>/.fob_remote)
        remote: Option<PathBuf>,

        /// Branch to push (defaults to the current branch)
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Remove commits and blobs unreachable from any branch or the index
    Gc {
        /// Dry run - show what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Check every commit, blob and branch head for consistency
    Verify,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let output = OutputWriter::new(cli.json);
    let root = cli.root.unwrap_or_else(|| PathBuf::from("."));
    debug!(root = %root.display(), "resolved working tree");

    let result = match cli.command {
        Commands::Init => cmd_init(&root, &output),
        Commands::Add { paths } => cmd_add(&root, &paths, &output),
        Commands::Commit {
            message,
            message_flag,
        } => cmd_commit(&root, message.or(message_flag).unwrap_or_default(), &output),
        Commands::Log { all } => cmd_log(&root, all, &output),
        Commands::Branch { name } => cmd_branch(&root, name.as_deref(), &output),
        Commands::Push { remote, branch } => {
            cmd_push(&root, remote.as_deref(), branch.as_deref(), &output)
        }
        Commands::Gc { dry_run } => cmd_gc(&root, dry_run, &output),
        Commands::Verify => cmd_verify(&root, &output),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            let code = result_code(&err);
            output.write_error(&err, code);
            ExitCode::from(code)
        }
    }
}

/// Log to stderr, filtered by `FOB_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("FOB_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Map the underlying core error to a process exit code.
fn result_code(err: &anyhow::Error) -> u8 {
    use fob_core::Error;

    let Some(core) = err.chain().find_map(|e| e.downcast_ref::<Error>()) else {
        return EXIT_FAILURE;
    };

    match core {
        Error::NotARepository { .. } | Error::AlreadyInitialized { .. } => EXIT_REPOSITORY,
        Error::NoCurrentBranch
        | Error::BranchNotFound { .. }
        | Error::InvalidBranchName { .. } => EXIT_BRANCH,
        Error::DivergentHistory { .. } => EXIT_DIVERGED,
        Error::CorruptState { .. }
        | Error::CorruptedObject { .. }
        | Error::ObjectNotFound { .. }
        | Error::CommitNotFound { .. }
        | Error::InvalidConfig { .. }
        | Error::UnsupportedAlgorithm { .. } => EXIT_CORRUPT,
        _ => EXIT_FAILURE,
    }
}

fn open(root: &Path) -> Result<Repository> {
    Repository::open(root)
        .with_context(|| format!("Failed to open repository at {}", root.display()))
}

fn cmd_init(root: &Path, output: &OutputWriter) -> Result<u8> {
    let repo = Repository::init(root)
        .with_context(|| format!("Failed to initialize repository at {}", root.display()))?;

    let root_display = repo.work_tree().unwrap_or(repo.dir()).display().to_string();
    let algorithm = repo.config().algorithm.as_str().to_string();
    let branch = repo.config().initial_branch.clone();

    let data = InitOutput {
        success: true,
        result_code: 0,
        root: root_display.clone(),
        algorithm: algorithm.clone(),
        branch: branch.clone(),
    };

    output.write(&data, || {
        format!(
            "Initialized empty fob repository in {}\nAlgorithm: {}\nBranch: {}\n",
            repo.dir().display(),
            algorithm,
            branch
        )
    })?;
    Ok(0)
}

fn cmd_add(root: &Path, paths: &[PathBuf], output: &OutputWriter) -> Result<u8> {
    let repo = open(root)?;
    let report = repo.add(paths).context("Failed to stage files")?;

    let data = AddOutput::from(&report);
    output.write(&data, || {
        let mut text = String::new();
        if report.recovered_corrupt_index {
            text.push_str("warning: index was corrupt and has been reset\n");
        }
        for staged in &report.staged {
            let _ = writeln!(text, "{} {}", staged.hash.short(), staged.path);
        }
        for skipped in &report.skipped {
            let _ = writeln!(text, "skipped {} ({})", skipped.path, skipped.reason);
        }
        let _ = writeln!(text, "Staged {} file(s)", report.staged.len());
        text
    })?;
    Ok(0)
}

fn cmd_commit(root: &Path, message: String, output: &OutputWriter) -> Result<u8> {
    let repo = open(root)?;
    let outcome = repo.commit(&message).context("Failed to commit")?;

    let data = CommitOutput::from(&outcome);
    output.write(&data, || {
        let mut text = String::new();
        if outcome.recovered_corrupt_index {
            text.push_str("warning: index was corrupt and has been reset\n");
        }
        let _ = writeln!(
            text,
            "[{} {}] {}",
            outcome.branch,
            outcome.commit.id.short(),
            outcome.commit.summary()
        );
        let _ = writeln!(text, "{} file(s)", outcome.commit.files.len());
        text
    })?;
    Ok(0)
}

fn cmd_log(root: &Path, all: bool, output: &OutputWriter) -> Result<u8> {
    let repo = open(root)?;
    let (branch, commits) = if all {
        (None, repo.log_all().context("Failed to list commits")?)
    } else {
        let branch = repo.current_branch()?;
        (branch, repo.log().context("Failed to read history")?)
    };

    let data = LogOutput {
        success: true,
        result_code: 0,
        branch,
        commits: commits.iter().map(CommitInfo::from).collect(),
    };

    output.write(&data, || {
        if commits.is_empty() {
            return "No commits\n".to_string();
        }
        let mut text = String::new();
        for commit in &commits {
            let _ = writeln!(text, "commit {}", commit.id);
            if let Some(parent) = &commit.parent {
                let _ = writeln!(text, "Parent: {}", parent);
            }
            let _ = writeln!(text, "Date:   {}", commit.timestamp.to_rfc3339());
            let _ = writeln!(text, "Files:  {}", commit.files.len());
            let _ = writeln!(text, "\n    {}\n", commit.message);
        }
        text
    })?;
    Ok(0)
}

fn cmd_branch(root: &Path, name: Option<&str>, output: &OutputWriter) -> Result<u8> {
    let repo = open(root)?;

    let action = match name {
        Some(name) => {
            let (_, switch) = repo
                .branch(name)
                .with_context(|| format!("Failed to switch to branch {}", name))?;
            Some(match switch {
                BranchSwitch::Created => "created",
                BranchSwitch::Switched => "switched",
            })
        }
        None => None,
    };

    let table = repo.branches().context("Failed to read branches")?;
    let current = table.current().map(str::to_string);
    let branches: Vec<BranchInfo> = table
        .list()
        .iter()
        .map(|b| BranchInfo::new(b, current.as_deref()))
        .collect();

    let data = BranchOutput {
        success: true,
        result_code: 0,
        current: current.clone(),
        action: action.map(str::to_string),
        branches: branches.clone(),
    };

    output.write(&data, || {
        let mut text = String::new();
        match (action, name) {
            (Some("created"), Some(name)) => {
                let _ = writeln!(text, "Switched to a new branch '{}'", name);
            }
            (Some(_), Some(name)) => {
                let _ = writeln!(text, "Switched to branch '{}'", name);
            }
            _ => {
                match &current {
                    Some(current) => {
                        let _ = writeln!(text, "On branch {}", current);
                    }
                    None => text.push_str("No current branch\n"),
                }
                for branch in &branches {
                    let marker = if branch.current { '*' } else { ' ' };
                    let head = branch
                        .head
                        .map(|h| h.short())
                        .unwrap_or_else(|| "(no commits)".to_string());
                    let _ = writeln!(text, "{} {} {}", marker, branch.name, head);
                }
            }
        }
        text
    })?;
    Ok(0)
}

fn cmd_push(
    root: &Path,
    remote: Option<&Path>,
    branch: Option<&str>,
    output: &OutputWriter,
) -> Result<u8> {
    let repo = open(root)?;
    let remote = remote.map_or_else(|| repo.default_remote(), Path::to_path_buf);

    let report = repo
        .push(&remote, branch)
        .with_context(|| format!("Failed to push to {}", remote.display()))?;

    let data = PushOutput::new(remote.display().to_string(), &report);
    output.write(&data, || {
        if report.up_to_date {
            return format!("Everything up-to-date ({})\n", report.branch);
        }
        let old = report
            .old_head
            .map(|h| h.short())
            .unwrap_or_else(|| "(new branch)".to_string());
        let new = report
            .new_head
            .map(|h| h.short())
            .unwrap_or_else(|| "(no commits)".to_string());
        format!(
            "To {}\n   {} -> {}  {}\n{} commit(s), {} blob(s) copied\n",
            remote.display(),
            old,
            new,
            report.branch,
            report.commits_copied,
            report.blobs_copied
        )
    })?;
    Ok(0)
}

fn cmd_gc(root: &Path, dry_run: bool, output: &OutputWriter) -> Result<u8> {
    let repo = open(root)?;
    let stats = repo.gc(dry_run).context("Garbage collection failed")?;

    let data = GcOutput::new(dry_run, &stats);
    output.write(&data, || {
        let verb = if dry_run { "Would delete" } else { "Deleted" };
        format!(
            "{} {} commit(s) and {} blob(s), {} bytes\n",
            verb, stats.commits_deleted, stats.blobs_deleted, stats.bytes_freed
        )
    })?;
    Ok(0)
}

fn cmd_verify(root: &Path, output: &OutputWriter) -> Result<u8> {
    let repo = open(root)?;
    let report = repo.verify().context("Verification failed")?;

    let code = if report.is_clean() { 0 } else { EXIT_CORRUPT };
    let data = VerifyOutput::new(&report, code);
    output.write(&data, || {
        let mut text = String::new();
        for problem in &report.problems {
            let _ = writeln!(text, "{}", problem);
        }
        let _ = writeln!(
            text,
            "Checked {} commit(s) and {} blob(s): {} problem(s)",
            report.commits_checked,
            report.blobs_checked,
            report.problems.len()
        );
        text
    })?;
    Ok(code)
}
