//! Structured credential store.
//!
//! Credentials travel through the charm as a [`CredentialStore`]. They are
//! written to disk as `export KEY=VALUE` lines for operators, and read back
//! with the dotenv parser when a standalone action needs them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ToolError;

/// Ordered set of credential variables (`OS_USERNAME`, `OS_PASSWORD`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialStore {
    vars: BTreeMap<String, String>,
}

impl CredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `KEY=VALUE` / `export KEY=VALUE` lines.
    ///
    /// Comments and blank lines are skipped. Quoting follows dotenv rules.
    pub fn parse(content: &str) -> Result<Self, ToolError> {
        let mut store = Self::new();
        for item in dotenvy::from_read_iter(content.as_bytes()) {
            let (key, value) = item?;
            store.vars.insert(key, value);
        }
        Ok(store)
    }

    /// Load and parse a credentials file.
    pub async fn load(path: &Path) -> Result<Self, ToolError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ToolError::Io(format!("Failed to read credentials {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Set a variable.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Set a variable, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Get a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns true if no variables are set.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate over variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Borrow the variables as an environment map.
    pub fn as_env(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// One `export KEY=VALUE` line per variable.
    ///
    /// Values outside the shell-safe character set are single-quoted, so
    /// the file can be both sourced by a shell and read back with [`parse`].
    ///
    /// [`parse`]: CredentialStore::parse
    pub fn export_lines(&self) -> Vec<String> {
        self.vars
            .iter()
            .map(|(key, value)| format!("export {}={}", key, quote(value)))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CredentialStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

fn quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:@%+,".contains(c));
    if safe {
        return value.to_string();
    }
    // Close the quote, emit an escaped quote, reopen.
    format!("'{}'", value.replace('\'', r"'\''"))
}
