//! Git-backed change detection.
//!
//! Compares `HEAD` against a base commit and sorts every changed path into
//! the created, updated, and deleted lists of a [`ChangeSet`].

use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::error::{ConfigError, GitError, Result, StackshiftError};

use super::types::ChangeSet;

/// Change detector for a local git repository.
#[derive(Debug)]
pub struct GitDiff {
    /// Repository working directory.
    repo: PathBuf,
    /// Only paths matching this expression are kept.
    filter: Option<Regex>,
}

impl GitDiff {
    /// Creates a detector for the repository at `repo`.
    #[must_use]
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            filter: None,
        }
    }

    /// Restricts detection to paths matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is not a valid regular expression.
    pub fn with_filter(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidFilter {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        self.filter = Some(regex);
        Ok(self)
    }

    /// Returns the repository path.
    #[must_use]
    pub fn repo(&self) -> &Path {
        &self.repo
    }

    /// Diffs `HEAD` against `base`, defaulting to the first parent of `HEAD`.
    ///
    /// A repository whose `HEAD` has no parent is treated as entirely new:
    /// every tracked file is reported as created.
    ///
    /// # Errors
    ///
    /// Returns an error if git fails or its output cannot be parsed.
    pub fn diff(&self, base: Option<&str>) -> Result<ChangeSet> {
        let head = self.git(&["rev-parse", "HEAD"])?;
        debug!("Deploying HEAD commit {head}");

        if base.is_none() && !self.head_has_parent()? {
            info!("No previous commits found, treating every file as created");
            return self.initial_commit();
        }

        let base = base.unwrap_or("HEAD^");
        debug!("Diffing against base commit {base}");

        let output = self.git_raw(&["diff", "--name-status", "--no-renames", "-z", base, "HEAD"])?;
        let changes = parse_name_status(&output, self.filter.as_ref())?;

        info!("Detected changes: {changes}");
        Ok(changes)
    }

    /// Returns true if `HEAD` has at least one parent commit.
    fn head_has_parent(&self) -> Result<bool> {
        let output = self.git(&["rev-list", "--parents", "-n", "1", "HEAD"])?;
        Ok(output.split_whitespace().count() > 1)
    }

    /// Lists every file of the initial commit as created.
    fn initial_commit(&self) -> Result<ChangeSet> {
        let output = self.git_raw(&["ls-tree", "-r", "-z", "--name-only", "HEAD"])?;
        let created = output
            .split('\0')
            .filter(|path| !path.is_empty())
            .filter(|path| self.filter.as_ref().is_none_or(|f| f.is_match(path)))
            .map(String::from)
            .collect();

        Ok(ChangeSet::created_only(created)?)
    }

    /// Runs git in the repository and returns its trimmed stdout.
    fn git(&self, args: &[&str]) -> Result<String> {
        Ok(self.git_raw(args)?.trim().to_string())
    }

    /// Runs git in the repository and returns its stdout unchanged.
    fn git_raw(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .output()
            .map_err(|e| GitError::CommandFailed {
                args: args.join(" "),
                message: e.to_string(),
            })?;

        if output.status.success() {
            String::from_utf8(output.stdout).map_err(|e| {
                StackshiftError::Git(GitError::CommandFailed {
                    args: args.join(" "),
                    message: format!("output is not valid UTF-8: {e}"),
                })
            })
        } else {
            Err(StackshiftError::Git(GitError::CommandFailed {
                args: args.join(" "),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }))
        }
    }
}

/// Parses `git diff --name-status -z` output into a change set.
///
/// Each entry is a status field followed by a path field, both terminated by
/// a NUL byte. Paths are taken verbatim.
///
/// # Errors
///
/// Returns an error on an unknown status letter, a status without a path, or
/// a path reported more than once.
pub fn parse_name_status(output: &str, filter: Option<&Regex>) -> Result<ChangeSet> {
    let mut created = Vec::new();
    let mut updated = Vec::new();
    let mut deleted = Vec::new();

    let mut fields = output.split('\0').filter(|field| !field.is_empty());
    let mut entry = 0;
    while let Some(status) = fields.next() {
        entry += 1;
        let Some(path) = fields.next() else {
            return Err(StackshiftError::Git(GitError::UnexpectedOutput {
                line: entry,
                message: format!("status '{status}' has no path"),
            }));
        };

        if filter.is_some_and(|f| !f.is_match(path)) {
            continue;
        }

        let path = path.to_string();
        match status.chars().next() {
            Some('A') => created.push(path),
            Some('M' | 'T') => updated.push(path),
            Some('D') => deleted.push(path),
            _ => {
                return Err(StackshiftError::Git(GitError::UnexpectedOutput {
                    line: entry,
                    message: format!("unsupported change status '{status}'"),
                }));
            }
        }
    }

    Ok(ChangeSet::new(created, updated, deleted)?)
}
