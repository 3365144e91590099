//! Shared test utilities for the sitepress test suite.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_tree(tmp.path(), &[("index.md", "# Home"), ("_layout.html", "{{ yield }}")]);
//!
//! let site = setup_fixtures();
//! let public = site.path().join("public");
//! ```

use crate::render::{Compiled, Processor, RenderContext, RenderError};
use std::path::Path;
use tempfile::TempDir;

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/site/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Write `(relative path, content)` pairs under `root`, creating directories.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
    }
}

// =========================================================================
// Processors
// =========================================================================

/// Processor that upper-cases its source. Used to exercise the registry
/// with arbitrary extensions.
pub struct TestProcessor {
    source: String,
    output: String,
}

impl TestProcessor {
    pub fn new(source: &str, output: &str) -> Self {
        Self {
            source: source.to_string(),
            output: output.to_string(),
        }
    }
}

impl Processor for TestProcessor {
    fn source_extension(&self) -> &str {
        &self.source
    }

    fn output_extension(&self) -> &str {
        &self.output
    }

    fn render(&self, _ctx: &RenderContext<'_>, source: &Path) -> Result<Compiled, RenderError> {
        let content =
            std::fs::read_to_string(source).map_err(|e| RenderError::io(source, e))?;
        Ok(Compiled {
            body: content.to_uppercase().into_bytes(),
            dependencies: Default::default(),
        })
    }
}
