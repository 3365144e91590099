//! Processor and renderer traits plus shared types.
//!
//! A [`Processor`] turns one source format into one output format. A
//! [`Renderer`] is what the cache and the batch compiler call: given a source
//! path it returns the rendered body, its content type, and every path it read
//! while rendering. [`SiteRenderer`](super::SiteRenderer) is the production
//! renderer; tests substitute a mock.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RenderError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("No processor registered for {}", .0.display())]
    NoProcessor(PathBuf),
    #[error("Failed to render {}: {message}", path.display())]
    Failed { path: PathBuf, message: String },
}

impl RenderError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub fn failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Failed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// The source (or dependency) path the error is about.
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. } | Self::NoProcessor(path) | Self::Failed { path, .. } => path,
        }
    }
}

/// Output of a single processor run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compiled {
    pub body: Vec<u8>,
    /// Every file read while compiling, other than the source itself.
    pub dependencies: BTreeSet<PathBuf>,
}

/// Output of a [`Renderer`]: compiled bytes tagged with their content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub body: Vec<u8>,
    pub content_type: String,
    pub dependencies: BTreeSet<PathBuf>,
}

/// Inputs shared by every processor invocation in a project.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Public directory; includes and layouts never resolve above it.
    pub root: &'a Path,
    /// Template variables from the project config.
    pub globals: &'a toml::Table,
}

/// One source format. Implementations are registered in a
/// [`Registry`](super::Registry); registration order is resolution priority.
pub trait Processor: Send + Sync {
    /// Extension (without dot) of the files this processor reads.
    fn source_extension(&self) -> &str;

    /// Extension (without dot) of the files it produces.
    fn output_extension(&self) -> &str;

    fn render(&self, ctx: &RenderContext<'_>, source: &Path) -> Result<Compiled, RenderError>;
}

/// Render capability consumed by the cache and the batch compiler.
pub trait Renderer: Send + Sync {
    fn render(&self, source: &Path) -> Result<Rendered, RenderError>;
}

/// Read a source or dependency file, mapping failures to [`RenderError::Io`].
pub(crate) fn read_text(path: &Path) -> Result<String, RenderError> {
    std::fs::read_to_string(path).map_err(|e| RenderError::io(path, e))
}
