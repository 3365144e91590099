//! Request path → source file resolution.
//!
//! A request such as `/about` could be satisfied by `about.md`,
//! `about.shtml`, `about/index.md`, ... The resolver builds the ordered
//! candidate list for a request and returns the first candidate that exists
//! and is not ignored.
//!
//! ## Candidate lists
//!
//! Candidate generation is a pure function of the normalized request path
//! and the [`Registry`]. With the standard registry (`md`, then `shtml`):
//!
//! ```text
//! /             → index.md, index.shtml
//! /blog/        → blog/index.md, blog/index.shtml
//! /about        → about.md, about.shtml, about/index.md, about/index.shtml
//! /about.html   → about.md, about.shtml
//! /about.md     → (none: sources are never served by their own name)
//! /logo.png     → (none: static fallback's concern)
//! ```
//!
//! Only the existence checks touch the filesystem, in list order, stopping at
//! the first hit.
//!
//! ## Ignored paths
//!
//! A candidate is skipped when any of its segments starts with `.` or `_`
//! (dotfiles, partials, layouts), equals the vendor directory name, or falls
//! under one of the configured ignore prefixes.

use crate::render::Registry;
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directory name excluded from rendering by default.
pub const VENDOR_DIR: &str = "vendor";

/// Base name of directory index files.
pub const INDEX_NAME: &str = "index";

/// Normalize a request URL to an absolute, decoded path.
///
/// Strips the query string and fragment, percent-decodes, collapses repeated
/// separators, and folds `.`/`..` segments without ever climbing above `/`.
/// A trailing separator is preserved because it marks a directory request.
pub fn normalize_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let decoded = percent_decode_str(path).decode_utf8_lossy();

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let trailing = decoded.ends_with('/')
        || decoded.ends_with("/.")
        || decoded.ends_with("/..")
        || decoded.is_empty();
    let mut normalized = format!("/{}", segments.join("/"));
    if trailing && !segments.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// Ordered candidate source files (relative to the public root) for a
/// normalized request path.
pub fn candidates(normalized: &str, registry: &Registry) -> Vec<PathBuf> {
    let rel = normalized.trim_start_matches('/');

    if rel.is_empty() || rel.ends_with('/') {
        let base = format!("{rel}{INDEX_NAME}");
        return with_extensions(&[base], registry.processors().map(|p| p.source_extension()));
    }

    let file_name = rel.rsplit('/').next().unwrap_or(rel);
    match file_name.rsplit_once('.') {
        // Leading-dot names such as ".well-known" have no extension.
        Some((stem, ext)) if !stem.is_empty() => {
            if registry.produces(ext) {
                let base = rel[..rel.len() - ext.len() - 1].to_string();
                let sources = registry
                    .processors()
                    .filter(|p| p.output_extension().eq_ignore_ascii_case(ext))
                    .map(|p| p.source_extension());
                with_extensions(&[base], sources)
            } else {
                Vec::new()
            }
        }
        _ => {
            let bases = [rel.to_string(), format!("{rel}/{INDEX_NAME}")];
            with_extensions(&bases, registry.processors().map(|p| p.source_extension()))
        }
    }
}

fn with_extensions<'a>(bases: &[String], extensions: impl Iterator<Item = &'a str>) -> Vec<PathBuf> {
    let extensions: Vec<&str> = extensions.collect();
    bases
        .iter()
        .flat_map(|base| {
            extensions
                .iter()
                .map(move |ext| PathBuf::from(format!("{base}.{ext}")))
        })
        .collect()
}

/// Paths excluded from resolution and compilation.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    vendor_dir: String,
    prefixes: Vec<PathBuf>,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self {
            vendor_dir: VENDOR_DIR.to_string(),
            prefixes: Vec::new(),
        }
    }
}

impl IgnoreRules {
    /// Rules with extra relative path prefixes to ignore.
    pub fn with_prefixes<I, P>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// True for dotfiles and underscore partials anywhere in the path.
    /// These are never published, by rendering or by static serving.
    pub fn is_private(&self, rel: &Path) -> bool {
        rel.components().any(|c| {
            let name = c.as_os_str().to_string_lossy();
            name.starts_with('.') || name.starts_with('_')
        })
    }

    pub fn is_ignored(&self, rel: &Path) -> bool {
        self.is_private(rel)
            || rel
                .components()
                .any(|c| c.as_os_str() == self.vendor_dir.as_str())
            || self.prefixes.iter().any(|prefix| rel.starts_with(prefix))
    }
}

/// Resolves request paths against one public directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    registry: Arc<Registry>,
    ignore: IgnoreRules,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>, registry: Arc<Registry>, ignore: IgnoreRules) -> Self {
        Self {
            root: root.into(),
            registry,
            ignore,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn ignore(&self) -> &IgnoreRules {
        &self.ignore
    }

    /// Absolute path of the source file answering `url`, or `None` when no
    /// candidate exists. `None` is not an error: the request belongs to
    /// whatever handler comes next.
    pub fn resolve(&self, url: &str) -> Option<PathBuf> {
        let normalized = normalize_url(url);
        candidates(&normalized, &self.registry)
            .into_iter()
            .filter(|rel| !self.ignore.is_ignored(rel))
            .map(|rel| self.root.join(rel))
            .find(|path| path.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{TestProcessor, write_tree};
    use tempfile::TempDir;

    fn rels(list: Vec<PathBuf>) -> Vec<String> {
        list.into_iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect()
    }

    // =========================================================================
    // normalize_url
    // =========================================================================

    #[test]
    fn normalize_strips_query_and_fragment() {
        assert_eq!(normalize_url("/about?x=1#top"), "/about");
        assert_eq!(normalize_url("/about#top?x"), "/about");
    }

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(normalize_url("//blog///post"), "/blog/post");
        assert_eq!(normalize_url("/blog//"), "/blog/");
    }

    #[test]
    fn normalize_handles_root_and_empty() {
        assert_eq!(normalize_url("/"), "/");
        assert_eq!(normalize_url(""), "/");
        assert_eq!(normalize_url("?q"), "/");
    }

    #[test]
    fn normalize_decodes_percent_escapes() {
        assert_eq!(normalize_url("/my%20page"), "/my page");
    }

    #[test]
    fn normalize_never_climbs_above_root() {
        assert_eq!(normalize_url("/../../etc/passwd"), "/etc/passwd");
        assert_eq!(normalize_url("/a/b/../c"), "/a/c");
        assert_eq!(normalize_url("/a/%2e%2e/b"), "/b");
        assert_eq!(normalize_url("/a/.."), "/");
    }

    // =========================================================================
    // candidates
    // =========================================================================

    #[test]
    fn directory_request_tries_index_variants() {
        let registry = Registry::standard();
        assert_eq!(
            rels(candidates("/", &registry)),
            vec!["index.md", "index.shtml"]
        );
        assert_eq!(
            rels(candidates("/blog/", &registry)),
            vec!["blog/index.md", "blog/index.shtml"]
        );
    }

    #[test]
    fn extensionless_request_tries_file_then_index() {
        let registry = Registry::standard();
        assert_eq!(
            rels(candidates("/about", &registry)),
            vec![
                "about.md",
                "about.shtml",
                "about/index.md",
                "about/index.shtml"
            ]
        );
    }

    #[test]
    fn output_extension_request_maps_to_producing_sources() {
        let mut registry = Registry::standard();
        registry.register(TestProcessor::new("less", "css"));
        assert_eq!(
            rels(candidates("/about.html", &registry)),
            vec!["about.md", "about.shtml"]
        );
        assert_eq!(
            rels(candidates("/css/main.css", &registry)),
            vec!["css/main.less"]
        );
    }

    #[test]
    fn source_and_unknown_extensions_yield_nothing() {
        let registry = Registry::standard();
        assert!(candidates("/about.md", &registry).is_empty());
        assert!(candidates("/logo.png", &registry).is_empty());
    }

    #[test]
    fn dotted_directory_names_keep_their_extension_logic() {
        let registry = Registry::standard();
        assert_eq!(
            rels(candidates("/v1.2/notes", &registry))[0],
            "v1.2/notes.md"
        );
    }

    #[test]
    fn candidate_order_follows_registration_order() {
        let mut first = Registry::empty();
        first.register(TestProcessor::new("jade", "html"));
        first.register(TestProcessor::new("html", "html"));
        assert_eq!(
            &rels(candidates("/about", &first))[..2],
            &["about.jade", "about.html"]
        );
    }

    // =========================================================================
    // IgnoreRules
    // =========================================================================

    #[test]
    fn private_paths_are_dot_and_underscore_segments() {
        let rules = IgnoreRules::default();
        assert!(rules.is_private(Path::new(".git/config")));
        assert!(rules.is_private(Path::new("blog/_layout.html")));
        assert!(rules.is_private(Path::new("_partials/nav.html")));
        assert!(!rules.is_private(Path::new("blog/post.md")));
    }

    #[test]
    fn vendor_and_prefixes_are_ignored() {
        let rules = IgnoreRules::with_prefixes(["drafts", "assets/raw"]);
        assert!(rules.is_ignored(Path::new("vendor/lib.md")));
        assert!(rules.is_ignored(Path::new("docs/vendor/lib.md")));
        assert!(rules.is_ignored(Path::new("drafts/wip.md")));
        assert!(rules.is_ignored(Path::new("assets/raw/x.md")));
        assert!(!rules.is_ignored(Path::new("assets/rawness.md")));
        assert!(!rules.is_ignored(Path::new("vendors.md")));
    }

    // =========================================================================
    // PathResolver
    // =========================================================================

    fn resolver(root: &Path, registry: Registry) -> PathResolver {
        PathResolver::new(root, Arc::new(registry), IgnoreRules::default())
    }

    #[test]
    fn resolves_first_existing_candidate() {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[("about.shtml", "s"), ("about/index.md", "m")],
        );
        let r = resolver(tmp.path(), Registry::standard());
        assert_eq!(r.resolve("/about"), Some(tmp.path().join("about.shtml")));
        assert_eq!(r.resolve("/about/"), Some(tmp.path().join("about/index.md")));
    }

    #[test]
    fn higher_priority_extension_wins() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("about.jade", "j"), ("about.html", "h")]);
        let mut registry = Registry::empty();
        registry.register(TestProcessor::new("jade", "html"));
        registry.register(TestProcessor::new("html", "html"));

        let r = resolver(tmp.path(), registry);
        assert_eq!(r.resolve("/about"), Some(tmp.path().join("about.jade")));
        assert_eq!(r.resolve("/about.html"), Some(tmp.path().join("about.jade")));
    }

    #[test]
    fn miss_returns_none() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("logo.png", "png")]);
        let r = resolver(tmp.path(), Registry::standard());
        assert_eq!(r.resolve("/about"), None);
        assert_eq!(r.resolve("/logo.png"), None);
    }

    #[test]
    fn ignored_candidates_are_skipped() {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[
                ("_layout.md", "l"),
                ("vendor/readme.md", "v"),
                ("drafts/post.md", "d"),
            ],
        );
        let r = PathResolver::new(
            tmp.path(),
            Arc::new(Registry::standard()),
            IgnoreRules::with_prefixes(["drafts"]),
        );
        assert_eq!(r.resolve("/_layout"), None);
        assert_eq!(r.resolve("/vendor/readme"), None);
        assert_eq!(r.resolve("/drafts/post"), None);
    }

    #[test]
    fn directory_named_like_candidate_is_not_a_hit() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("weird.md")).unwrap();
        write_tree(tmp.path(), &[("weird/index.md", "i")]);
        let r = resolver(tmp.path(), Registry::standard());
        assert_eq!(r.resolve("/weird"), Some(tmp.path().join("weird/index.md")));
    }
}
