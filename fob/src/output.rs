//! Output formatting for CLI commands.
//!
//! Provides abstraction layer for outputting results in text or JSON format.

use anyhow::Result;
use chrono::{DateTime, Utc};
use fob_core::{
    AddReport, Branch, Commit, CommitOutcome, GcStats, Hash, PushReport, VerifyReport,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    /// Create a new OutputWriter.
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Write output using the configured format.
    ///
    /// The `text_fn` closure is called only in text mode to generate the
    /// human-readable output.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write an error message to stderr.
    ///
    /// In JSON mode, writes a JSON error object with success=false.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `init` command.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub root: String,
    pub algorithm: String,
    pub branch: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StagedEntry {
    pub path: String,
    pub hash: Hash,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: String,
}

/// Output for `add` command.
#[derive(Debug, Serialize)]
pub struct AddOutput {
    pub success: bool,
    pub result_code: u8,
    pub staged: Vec<StagedEntry>,
    pub skipped: Vec<SkippedEntry>,
    pub recovered_corrupt_index: bool,
}

impl From<&AddReport> for AddOutput {
    fn from(report: &AddReport) -> Self {
        Self {
            success: true,
            result_code: 0,
            staged: report
                .staged
                .iter()
                .map(|s| StagedEntry {
                    path: s.path.clone(),
                    hash: s.hash,
                })
                .collect(),
            skipped: report
                .skipped
                .iter()
                .map(|s| SkippedEntry {
                    path: s.path.clone(),
                    reason: s.reason.to_string(),
                })
                .collect(),
            recovered_corrupt_index: report.recovered_corrupt_index,
        }
    }
}

/// A commit as shown by `commit` and `log`.
#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    pub id: Hash,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub parent: Option<Hash>,
    pub files: BTreeMap<String, Hash>,
}

impl From<&Commit> for CommitInfo {
    fn from(commit: &Commit) -> Self {
        Self {
            id: commit.id,
            message: commit.message.clone(),
            timestamp: commit.timestamp,
            parent: commit.parent,
            files: commit.files.clone(),
        }
    }
}

/// Output for `commit` command.
#[derive(Debug, Serialize)]
pub struct CommitOutput {
    pub success: bool,
    pub result_code: u8,
    pub branch: String,
    pub commit: CommitInfo,
    pub recovered_corrupt_index: bool,
}

impl From<&CommitOutcome> for CommitOutput {
    fn from(outcome: &CommitOutcome) -> Self {
        Self {
            success: true,
            result_code: 0,
            branch: outcome.branch.clone(),
            commit: CommitInfo::from(&outcome.commit),
            recovered_corrupt_index: outcome.recovered_corrupt_index,
        }
    }
}

/// Output for `log` command.
#[derive(Debug, Serialize)]
pub struct LogOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub commits: Vec<CommitInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchInfo {
    pub name: String,
    pub head: Option<Hash>,
    pub parent: Option<String>,
    pub current: bool,
}

impl BranchInfo {
    pub fn new(branch: &Branch, current: Option<&str>) -> Self {
        Self {
            name: branch.name.clone(),
            head: branch.head,
            parent: branch.parent_branch.clone(),
            current: current == Some(branch.name.as_str()),
        }
    }
}

/// Output for `branch` command.
#[derive(Debug, Serialize)]
pub struct BranchOutput {
    pub success: bool,
    pub result_code: u8,
    pub current: Option<String>,
    /// Set when a name was given: "created" or "switched".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub branches: Vec<BranchInfo>,
}

/// Output for `push` command.
#[derive(Debug, Serialize)]
pub struct PushOutput {
    pub success: bool,
    pub result_code: u8,
    pub remote: String,
    pub branch: String,
    pub old_head: Option<Hash>,
    pub new_head: Option<Hash>,
    pub commits_copied: usize,
    pub blobs_copied: usize,
    pub up_to_date: bool,
}

impl PushOutput {
    pub fn new(remote: String, report: &PushReport) -> Self {
        Self {
            success: true,
            result_code: 0,
            remote,
            branch: report.branch.clone(),
            old_head: report.old_head,
            new_head: report.new_head,
            commits_copied: report.commits_copied,
            blobs_copied: report.blobs_copied,
            up_to_date: report.up_to_date,
        }
    }
}

/// Output for `gc` command.
#[derive(Debug, Serialize)]
pub struct GcOutput {
    pub success: bool,
    pub result_code: u8,
    pub dry_run: bool,
    pub commits_deleted: usize,
    pub blobs_deleted: usize,
    pub bytes_freed: u64,
}

impl GcOutput {
    pub fn new(dry_run: bool, stats: &GcStats) -> Self {
        Self {
            success: true,
            result_code: 0,
            dry_run,
            commits_deleted: stats.commits_deleted,
            blobs_deleted: stats.blobs_deleted,
            bytes_freed: stats.bytes_freed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProblemInfo {
    pub subject: String,
    pub message: String,
}

/// Output for `verify` command.
#[derive(Debug, Serialize)]
pub struct VerifyOutput {
    pub success: bool,
    pub result_code: u8,
    pub commits_checked: usize,
    pub blobs_checked: usize,
    pub problems: Vec<ProblemInfo>,
}

impl VerifyOutput {
    pub fn new(report: &VerifyReport, result_code: u8) -> Self {
        Self {
            success: report.is_clean(),
            result_code,
            commits_checked: report.commits_checked,
            blobs_checked: report.blobs_checked,
            problems: report
                .problems
                .iter()
                .map(|p| ProblemInfo {
                    subject: p.subject.clone(),
                    message: p.message.clone(),
                })
                .collect(),
        }
    }
}
