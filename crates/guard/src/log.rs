//! Append-only JSONL decision log
//!
//! The audit trail for everything the guard ever decided. Writes are
//! append-only; the file is never rewritten.

use crate::decision::AuthorizationDecision;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Append-only JSONL log of authorization decisions, one per line
pub struct DecisionLog {
    path: PathBuf,
    file: Option<File>,
}

impl DecisionLog {
    /// Open (or create) a log at the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Create an in-memory log (for testing); appends are validated but
    /// not stored
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            file: None,
        }
    }

    /// Append one decision
    pub fn append(&mut self, decision: &AuthorizationDecision) -> Result<(), LogError> {
        let json = serde_json::to_string(decision)?;

        if let Some(ref mut file) = self.file {
            writeln!(file, "{}", json)?;
            file.flush()?;
        }

        Ok(())
    }

    /// Read every decision ever logged
    pub fn read_all(&self) -> Result<Vec<AuthorizationDecision>, LogError> {
        self.read_from(0)
    }

    /// Read decisions starting at a line offset (for checkpointed replay)
    pub fn read_from(&self, start_line: usize) -> Result<Vec<AuthorizationDecision>, LogError> {
        if self.file.is_none() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut decisions = Vec::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if i < start_line || line.trim().is_empty() {
                continue;
            }
            decisions.push(serde_json::from_str(&line)?);
        }

        Ok(decisions)
    }

    /// Current number of lines (for checkpointing)
    pub fn line_count(&self) -> Result<usize, LogError> {
        if self.file.is_none() {
            return Ok(0);
        }

        let file = File::open(&self.path)?;
        Ok(BufReader::new(file).lines().count())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_in_memory(&self) -> bool {
        self.file.is_none()
    }
}
