//! Repository integrity check.

use crate::error::Result;
use crate::repo::Repository;
use std::fmt;
use tracing::warn;

/// One integrity problem found by [`Repository::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    /// What is affected, e.g. `commit 1a2b3c4d5e` or `branch main`.
    pub subject: String,
    pub message: String,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub commits_checked: usize,
    pub blobs_checked: usize,
    pub problems: Vec<Problem>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }

    fn problem(&mut self, subject: String, message: impl Into<String>) {
        let message = message.into();
        warn!(%subject, %message, "integrity problem");
        self.problems.push(Problem { subject, message });
    }
}

impl Repository {
    /// Rehash every commit and blob and check every reference between them.
    ///
    /// Read-only; problems are collected rather than returned as errors.
    pub fn verify(&self) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();

        for hash in self.store().list()? {
            report.blobs_checked += 1;
            if let Err(e) = self.store().get(&hash) {
                report.problem(format!("blob {}", hash.short()), e.to_string());
            }
        }

        for id in self.commits().list_ids()? {
            report.commits_checked += 1;
            let subject = format!("commit {}", id.short());

            let commit = match self.commits().get_commit(&id) {
                Ok(commit) => commit,
                Err(e) => {
                    report.problem(subject, e.to_string());
                    continue;
                }
            };

            if let Some(parent) = &commit.parent
                && !self.commits().contains(parent)
            {
                report.problem(subject.clone(), format!("missing parent {}", parent));
            }
            for (path, hash) in &commit.files {
                if !self.store().contains(hash) {
                    report.problem(subject.clone(), format!("missing blob {} for {}", hash, path));
                }
            }
        }

        for branch in self.branches()?.list() {
            if let Some(head) = &branch.head
                && !self.commits().contains(head)
            {
                report.problem(
                    format!("branch {}", branch.name),
                    format!("head {} does not exist", head),
                );
            }
        }

        let loaded = self.index()?;
        if loaded.recovered_corrupt {
            report.problem("index".to_string(), "index.json is not valid JSON");
        }
        for hash in loaded.index.hashes() {
            if !self.store().contains(hash) {
                report.problem("index".to_string(), format!("missing staged blob {}", hash));
            }
        }

        Ok(report)
    }
}
