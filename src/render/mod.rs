//! Rendering: the processor table and the site renderer.
//!
//! | Piece | Role |
//! |---|---|
//! | [`Processor`] | one source format → one output format |
//! | [`Registry`] | ordered extension table; order is resolution priority |
//! | [`Renderer`] | what the cache and compiler call |
//! | [`SiteRenderer`] | production renderer dispatching through a registry |
//!
//! New formats are added by registering another [`Processor`], never by
//! matching on extension strings elsewhere in the crate.

mod include;
mod markdown;
pub mod processor;

pub use include::IncludeProcessor;
pub use markdown::{LAYOUT_FILENAME, MarkdownProcessor, apply_layout, markdown_to_html};
pub use processor::{Compiled, Processor, RenderContext, RenderError, Rendered, Renderer};

use std::path::{Path, PathBuf};
use std::sync::Arc;

const CONTENT_TYPES: &[(&str, &str)] = &[
    ("html", "text/html; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("js", "application/javascript; charset=utf-8"),
    ("json", "application/json; charset=utf-8"),
    ("xml", "application/xml; charset=utf-8"),
    ("txt", "text/plain; charset=utf-8"),
    ("svg", "image/svg+xml"),
];

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type for an output extension, with charset for text formats.
pub fn content_type_for(extension: &str) -> &'static str {
    CONTENT_TYPES
        .iter()
        .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
        .map(|(_, ty)| *ty)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// Ordered table of registered processors.
#[derive(Clone, Default)]
pub struct Registry {
    processors: Vec<Arc<dyn Processor>>,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in processors, in priority order: Markdown, then includes.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(MarkdownProcessor);
        registry.register(IncludeProcessor);
        registry
    }

    /// Append a processor. Later registrations have lower priority.
    pub fn register(&mut self, processor: impl Processor + 'static) {
        self.processors.push(Arc::new(processor));
    }

    pub fn processors(&self) -> impl Iterator<Item = &dyn Processor> {
        self.processors.iter().map(|p| p.as_ref())
    }

    /// The processor that compiles `path`, chosen by its extension.
    pub fn for_source(&self, path: &Path) -> Option<&dyn Processor> {
        let ext = path.extension()?.to_str()?;
        self.processors()
            .find(|p| p.source_extension().eq_ignore_ascii_case(ext))
    }

    /// Registration index of the processor that compiles `path`. Lower wins
    /// when two sources produce the same output.
    pub fn priority(&self, path: &Path) -> Option<usize> {
        let ext = path.extension()?.to_str()?;
        self.processors()
            .position(|p| p.source_extension().eq_ignore_ascii_case(ext))
    }

    pub fn is_compilable(&self, path: &Path) -> bool {
        self.for_source(path).is_some()
    }

    /// True when some processor produces files with this extension.
    pub fn produces(&self, extension: &str) -> bool {
        self.processors()
            .any(|p| p.output_extension().eq_ignore_ascii_case(extension))
    }

    /// Map a source path to its output path (`about.md` → `about.html`).
    pub fn output_path(&self, source: &Path) -> Option<PathBuf> {
        let processor = self.for_source(source)?;
        Some(source.with_extension(processor.output_extension()))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.processors()
                    .map(|p| format!("{}→{}", p.source_extension(), p.output_extension())),
            )
            .finish()
    }
}

/// Renders project sources through a [`Registry`].
pub struct SiteRenderer {
    root: PathBuf,
    registry: Arc<Registry>,
    globals: toml::Table,
}

impl SiteRenderer {
    pub fn new(root: impl Into<PathBuf>, registry: Arc<Registry>, globals: toml::Table) -> Self {
        Self {
            root: root.into(),
            registry,
            globals,
        }
    }
}

impl Renderer for SiteRenderer {
    fn render(&self, source: &Path) -> Result<Rendered, RenderError> {
        let processor = self
            .registry
            .for_source(source)
            .ok_or_else(|| RenderError::NoProcessor(source.to_path_buf()))?;
        let ctx = RenderContext {
            root: &self.root,
            globals: &self.globals,
        };
        let compiled = processor.render(&ctx, source)?;
        tracing::debug!(
            source = %source.display(),
            dependencies = compiled.dependencies.len(),
            "rendered"
        );
        Ok(Rendered {
            body: compiled.body,
            content_type: content_type_for(processor.output_extension()).to_string(),
            dependencies: compiled.dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{TestProcessor, write_tree};
    use tempfile::TempDir;

    #[test]
    fn standard_registry_order() {
        let registry = Registry::standard();
        let exts: Vec<&str> = registry.processors().map(|p| p.source_extension()).collect();
        assert_eq!(exts, vec!["md", "shtml"]);
    }

    #[test]
    fn for_source_matches_extension_case_insensitively() {
        let registry = Registry::standard();
        assert!(registry.is_compilable(Path::new("a/b/README.MD")));
        assert!(registry.is_compilable(Path::new("nav.shtml")));
        assert!(!registry.is_compilable(Path::new("style.css")));
        assert!(!registry.is_compilable(Path::new("Makefile")));
    }

    #[test]
    fn first_registered_processor_wins_for_duplicate_extension() {
        let mut registry = Registry::empty();
        registry.register(TestProcessor::new("tpl", "html"));
        registry.register(TestProcessor::new("tpl", "css"));
        assert_eq!(
            registry.output_path(Path::new("x.tpl")),
            Some(PathBuf::from("x.html"))
        );
    }

    #[test]
    fn priority_follows_registration_order() {
        let registry = Registry::standard();
        assert_eq!(registry.priority(Path::new("about.md")), Some(0));
        assert_eq!(registry.priority(Path::new("about.shtml")), Some(1));
        assert_eq!(registry.priority(Path::new("about.html")), None);
    }

    #[test]
    fn output_path_preserves_directories() {
        let registry = Registry::standard();
        assert_eq!(
            registry.output_path(Path::new("blog/2026/post.md")),
            Some(PathBuf::from("blog/2026/post.html"))
        );
        assert_eq!(registry.output_path(Path::new("logo.png")), None);
    }

    #[test]
    fn content_types_carry_charset_for_text() {
        assert_eq!(content_type_for("html"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("CSS"), "text/css; charset=utf-8");
        assert_eq!(content_type_for("svg"), "image/svg+xml");
        assert_eq!(content_type_for("bin"), "application/octet-stream");
    }

    #[test]
    fn site_renderer_dispatches_and_sets_content_type() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("about.md", "# About")]);
        let renderer = SiteRenderer::new(
            tmp.path(),
            Arc::new(Registry::standard()),
            toml::Table::new(),
        );

        let out = renderer.render(&tmp.path().join("about.md")).unwrap();
        assert_eq!(out.content_type, "text/html; charset=utf-8");
        assert!(String::from_utf8(out.body).unwrap().contains("<h1>About</h1>"));
    }

    #[test]
    fn site_renderer_rejects_unregistered_source() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("logo.png", "png")]);
        let renderer = SiteRenderer::new(
            tmp.path(),
            Arc::new(Registry::standard()),
            toml::Table::new(),
        );

        let err = renderer.render(&tmp.path().join("logo.png")).unwrap_err();
        assert!(matches!(err, RenderError::NoProcessor(_)));
    }
}
