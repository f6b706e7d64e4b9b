//! Candidate key list loaded from a newline-delimited file.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyListError {
    #[error("key file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read key file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Ordered, duplicate-free list of keys still to be tried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateKeys {
    keys: Vec<String>,
}

impl CandidateKeys {
    /// One key per line. Lines are trimmed, blanks skipped, and repeats dropped keeping the
    /// first occurrence.
    pub fn parse(content: &str) -> Self {
        content.lines().collect()
    }

    pub fn load(path: &Path) -> Result<Self, KeyListError> {
        if !path.is_file() {
            return Err(KeyListError::NotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path).map_err(|source| KeyListError::Io { path: path.to_path_buf(), source })?;
        Ok(Self::parse(&String::from_utf8_lossy(&bytes)))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.keys.iter()
    }

    pub fn contains(&self, key: &str) -> bool {
        let key = key.trim();
        self.keys.iter().any(|k| k == key)
    }

    /// Drop `key` (exact match after trimming). Returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        let key = key.trim();
        let before = self.keys.len();
        self.keys.retain(|k| k != key);
        self.keys.len() != before
    }
}

impl<S: AsRef<str>> FromIterator<S> for CandidateKeys {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for item in iter {
            let key = item.as_ref().trim();
            if key.is_empty() {
                continue;
            }
            if seen.insert(key.to_string()) {
                keys.push(key.to_string());
            }
        }
        CandidateKeys { keys }
    }
}

impl<'a> IntoIterator for &'a CandidateKeys {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}
