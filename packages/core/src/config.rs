//! Runtime configuration
//!
//! Defaults, optionally overridden by a JSON file and then by `FOLIO_*`
//! environment variables. Binaries layer their own flags on top.

use crate::hierarchy::{HierarchyConfig, OrphanPolicy, DEFAULT_MAX_DEPTH};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_DB_PATH: &str = "FOLIO_DB_PATH";
pub const ENV_MAX_DEPTH: &str = "FOLIO_MAX_DEPTH";
pub const ENV_ORPHAN_POLICY: &str = "FOLIO_ORPHAN_POLICY";
pub const ENV_PANDOC: &str = "FOLIO_PANDOC";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolioConfig {
    /// libsql database file
    pub db_path: PathBuf,
    /// Number of allowed chapter levels
    pub max_depth: usize,
    /// What deleting a chapter does to its children
    pub orphan_policy: OrphanPolicy,
    /// Converter executable used for EPUB/PDF export
    pub pandoc_path: String,
}

impl Default for FolioConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/folio.db"),
            max_depth: DEFAULT_MAX_DEPTH,
            orphan_policy: OrphanPolicy::default(),
            pandoc_path: "pandoc".to_string(),
        }
    }
}

impl FolioConfig {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env(|key| std::env::var(key).ok())
    }

    /// `path` (when given) overridden by the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path)?.merge_env(|key| std::env::var(key).ok()),
            None => Self::from_env(),
        }
    }

    /// Read a JSON config file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse config file: {}", path.display()))
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value
    pub fn merge_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.db_path = PathBuf::from(path);
        }
        if let Some(depth) = lookup(ENV_MAX_DEPTH) {
            self.max_depth = depth
                .trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer, got '{}'", ENV_MAX_DEPTH, depth))?;
        }
        if let Some(policy) = lookup(ENV_ORPHAN_POLICY) {
            self.orphan_policy = policy
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .with_context(|| format!("invalid {}", ENV_ORPHAN_POLICY))?;
        }
        if let Some(pandoc) = lookup(ENV_PANDOC) {
            self.pandoc_path = pandoc;
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            anyhow::bail!("max_depth must be at least 1");
        }
        Ok(())
    }

    pub fn hierarchy(&self) -> HierarchyConfig {
        HierarchyConfig::with_max_depth(self.max_depth)
    }
}
