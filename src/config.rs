//! Project layout and configuration.
//!
//! A project is a directory. Its public directory (the tree that gets served
//! and compiled) is located by convention:
//!
//! ```text
//! myproject/                     myproject/
//! ├── site.toml                  ├── _site.toml
//! └── public/      ← public      ├── index.md     ← public = myproject/
//!     ├── index.md               └── ...
//!     └── ...
//! ```
//!
//! With a `public/` directory the configuration lives beside it in
//! `site.toml`. Without one the project root is published directly, so the
//! configuration file takes a leading underscore to keep it private.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All keys are optional.
//!
//! ignore = ["drafts"]          # Extra paths (relative to public) never compiled
//!
//! [globals]                    # Values available to layouts as {{ name }}
//! title = "My Site"
//!
//! # Any other keys are preserved and echoed in the build report.
//! ```
//!
//! `globals` is internal: layouts see it, build reports never include it.

use crate::resolve::IgnoreRules;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Configuration file name for projects with a `public/` directory.
pub const CONFIG_FILENAME: &str = "site.toml";

/// Configuration file name for projects published from their root.
pub const ROOT_CONFIG_FILENAME: &str = "_site.toml";

/// Conventional public directory name.
pub const PUBLIC_DIR: &str = "public";

const GLOBALS_KEY: &str = "globals";
const IGNORE_KEY: &str = "ignore";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Project not found: {0}")]
    MissingProject(PathBuf),
}

/// Declared project configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Template variables. Never published.
    pub globals: toml::Table,
    /// Extra ignored paths, relative to the public directory.
    pub ignore: Vec<String>,
    /// Everything else, preserved verbatim.
    #[serde(flatten)]
    pub extra: toml::Table,
}

impl ProjectConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ProjectConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Ignore entries must stay inside the public directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for entry in &self.ignore {
            let path = Path::new(entry);
            if entry.is_empty() {
                return Err(ConfigError::Validation("ignore entries must not be empty".into()));
            }
            if path.is_absolute() || path.components().any(|c| c == Component::ParentDir) {
                return Err(ConfigError::Validation(format!(
                    "ignore entry must be a relative path inside the project: {entry}"
                )));
            }
        }
        Ok(())
    }

    /// The configuration as published in build reports: everything except
    /// `globals`.
    pub fn public_table(&self) -> toml::Table {
        let mut table = self.extra.clone();
        table.remove(GLOBALS_KEY);
        if !self.ignore.is_empty() {
            table.insert(
                IGNORE_KEY.to_string(),
                toml::Value::Array(
                    self.ignore
                        .iter()
                        .map(|entry| toml::Value::String(entry.clone()))
                        .collect(),
                ),
            );
        }
        table
    }
}

/// Load a configuration file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<ProjectConfig, ConfigError> {
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }
    let content = fs::read_to_string(path)?;
    ProjectConfig::from_toml(&content)
}

/// A loaded project: canonical root, public directory and configuration.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub public_dir: PathBuf,
    pub config_path: PathBuf,
    pub config: ProjectConfig,
}

impl Project {
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let root = match root.canonicalize() {
            Ok(root) if root.is_dir() => root,
            Ok(_) => return Err(ConfigError::MissingProject(root.to_path_buf())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::MissingProject(root.to_path_buf()));
            }
            Err(err) => return Err(err.into()),
        };

        let public = root.join(PUBLIC_DIR);
        let (public_dir, config_path) = if public.is_dir() {
            (public, root.join(CONFIG_FILENAME))
        } else {
            (root.clone(), root.join(ROOT_CONFIG_FILENAME))
        };
        let config = load_config(&config_path)?;

        tracing::debug!(
            root = %root.display(),
            public = %public_dir.display(),
            "loaded project"
        );
        Ok(Self {
            root,
            public_dir,
            config_path,
            config,
        })
    }

    /// Ignore rules for this project: the configured entries plus `extra`.
    pub fn ignore_rules(&self, extra: &[String]) -> IgnoreRules {
        IgnoreRules::with_prefixes(extra.iter().chain(&self.config.ignore).map(PathBuf::from))
    }
}
