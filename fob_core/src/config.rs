//! Repository configuration stored in `.fob/config`.
//!
//! The file is a list of `key=value` lines; blank lines and lines starting
//! with `#` are ignored, as are unknown keys:
//!
//! ```text
//! version=1
//! algo=blake3-256
//! initial_branch=main
//! binary=stage
//! ```

use crate::atomic::write_atomic;
use crate::branch::validate_branch_name;
use crate::error::{Error, Result};
use crate::hash::Algorithm;
use std::fs;
use std::path::Path;

/// Name of the config file inside the repository directory.
pub const CONFIG_FILE: &str = "config";

/// Only supported config format version.
const CONFIG_VERSION: &str = "1";

/// Branch created by `init` unless configured otherwise.
pub const DEFAULT_INITIAL_BRANCH: &str = "main";

/// How `add` treats content that is not valid UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinaryPolicy {
    /// Stage raw bytes for every file.
    #[default]
    Stage,
    /// Skip files whose content is not valid UTF-8 and report them.
    Skip,
}

impl BinaryPolicy {
    /// Returns the string representation used in the config file.
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryPolicy::Stage => "stage",
            BinaryPolicy::Skip => "skip",
        }
    }

    /// Parse a policy from its config value.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "stage" => Ok(BinaryPolicy::Stage),
            "skip" => Ok(BinaryPolicy::Skip),
            _ => Err(Error::invalid_config(format!(
                "Unknown binary policy: {} (expected 'stage' or 'skip')",
                s
            ))),
        }
    }
}

/// Parsed repository configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub algorithm: Algorithm,
    pub initial_branch: String,
    pub binary: BinaryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Blake3,
            initial_branch: DEFAULT_INITIAL_BRANCH.to_string(),
            binary: BinaryPolicy::default(),
        }
    }
}

impl Config {
    /// Load the config file from a repository directory.
    pub fn load(repo_dir: &Path) -> Result<Self> {
        let path = repo_dir.join(CONFIG_FILE);
        let content = fs::read_to_string(&path).map_err(Error::file_io("read", &path))?;
        Self::parse(&content)
    }

    /// Write the config file into a repository directory.
    pub fn save(&self, repo_dir: &Path) -> Result<()> {
        write_atomic(&repo_dir.join(CONFIG_FILE), self.render().as_bytes())
    }

    /// Render the config in its on-disk form.
    pub fn render(&self) -> String {
        format!(
            "version={}\nalgo={}\ninitial_branch={}\nbinary={}\n",
            CONFIG_VERSION,
            self.algorithm.as_str(),
            self.initial_branch,
            self.binary.as_str()
        )
    }

    /// Parse config file content.
    pub fn parse(content: &str) -> Result<Self> {
        let mut version = None;
        let mut config = Config::default();
        let mut algo = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim();
                match key.trim() {
                    "version" => version = Some(value),
                    "algo" => algo = Some(value),
                    "initial_branch" => {
                        validate_branch_name(value)?;
                        config.initial_branch = value.to_string();
                    }
                    "binary" => config.binary = BinaryPolicy::parse(value)?,
                    _ => {}
                }
            }
        }

        if version != Some(CONFIG_VERSION) {
            return Err(Error::invalid_config(format!(
                "Unsupported config version: {:?}",
                version
            )));
        }

        let algo = algo.ok_or_else(|| Error::invalid_config("Missing algo in config"))?;
        config.algorithm = Algorithm::parse(algo)?;

        Ok(config)
    }
}
