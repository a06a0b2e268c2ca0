use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::error::ConfigError;
use crate::path::{normalize_path, PathKind};
use crate::verdict::SecurityVerdict;

/// Which collection a rule lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    File,
    Directory,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Directory => f.write_str("directory"),
        }
    }
}

/// Shared behavior of file and directory rules.
pub trait PathRule {
    /// Collection this rule type belongs to.
    const KIND: RuleKind;

    /// Normalized relative path.
    fn path(&self) -> &str;

    /// Transport requirement for requests matching this rule.
    fn security(&self) -> SecurityVerdict;
}

/// A rule for a single resource, matched by exact path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRule {
    path: String,
    security: SecurityVerdict,
}

impl FileRule {
    pub fn new(path: &str, security: SecurityVerdict) -> Self {
        Self {
            path: normalize_path(path, PathKind::File),
            security,
        }
    }
}

impl PathRule for FileRule {
    const KIND: RuleKind = RuleKind::File;

    fn path(&self) -> &str {
        &self.path
    }

    fn security(&self) -> SecurityVerdict {
        self.security
    }
}

/// A rule for a directory, optionally covering everything nested below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRule {
    path: String,
    security: SecurityVerdict,
    recurse: bool,
}

impl DirectoryRule {
    pub fn new(path: &str, security: SecurityVerdict, recurse: bool) -> Self {
        Self {
            path: normalize_path(path, PathKind::Directory),
            security,
            recurse,
        }
    }

    /// Whether the rule also applies to nested directories.
    pub fn recurse(&self) -> bool {
        self.recurse
    }

    /// Returns `true` if this rule applies to the normalized
    /// `directory_path`.
    ///
    /// Recursive rules match by plain string prefix, so a recursive `admin`
    /// rule also covers `administration`.
    pub fn matches(&self, directory_path: &str) -> bool {
        (self.recurse && directory_path.starts_with(self.path.as_str()))
            || directory_path == self.path
    }
}

impl PathRule for DirectoryRule {
    const KIND: RuleKind = RuleKind::Directory;

    fn path(&self) -> &str {
        &self.path
    }

    fn security(&self) -> SecurityVerdict {
        self.security
    }
}

/// An insertion-ordered set of rules with unique normalized paths.
#[derive(Debug, Clone)]
pub struct RuleCollection<R> {
    rules: Vec<R>,
    index: HashMap<String, usize>,
}

impl<R> Default for RuleCollection<R> {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<R: PathRule> RuleCollection<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `rule`, rejecting a path that is already present.
    pub fn insert(&mut self, rule: R) -> Result<(), ConfigError> {
        match self.index.entry(rule.path().to_string()) {
            Entry::Occupied(slot) => Err(ConfigError::DuplicateRule {
                kind: R::KIND,
                path: slot.key().clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(self.rules.len());
                self.rules.push(rule);
                Ok(())
            }
        }
    }

    /// Exact lookup by an already-normalized path.
    pub fn get(&self, normalized_path: &str) -> Option<&R> {
        self.index.get(normalized_path).map(|&i| &self.rules[i])
    }

    /// Rules in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'a, R: PathRule> IntoIterator for &'a RuleCollection<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
