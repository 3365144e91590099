//! # Sitepress
//!
//! Serve a directory of source files as a website, or compile it to a static
//! tree. A request such as `/about` is resolved to exactly one source file
//! (`about.md`, `about.shtml`, `about/index.md`, ...), rendered on demand and
//! cached until the file or anything it was built from changes.
//!
//! # Architecture
//!
//! Two front ends share one resolution and rendering core:
//!
//! ```text
//! serve     request ─▶ Mount ─▶ PathResolver ─▶ RenderCache ─▶ Renderer
//!                        │ declined                  ▲
//!                        ▼                           │ ChangeEvent
//!                      static files ─▶ 404     SourceWatcher
//!
//! compile   Project ─▶ guard ─▶ scan ─▶ compile phase ─▶ copy phase ─▶ BuildReport
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`guard`] | Pure predicates keeping compile output from swallowing the project |
//! | [`resolve`] | Request path → ordered candidates → first existing source |
//! | [`render`] | Processor registry, built-in Markdown and include processors, [`render::SiteRenderer`] |
//! | [`cache`] | Render cache: dependency invalidation, single-flight, stats |
//! | [`event`] | `ChangeEvent`, the cache's only input from the filesystem |
//! | [`watch`] | `notify` adapter producing change events |
//! | [`scan`] | Public directory enumeration: compilable vs pass-through |
//! | [`compile`] | Batch compiler with a bounded rayon pool and fail-fast phases |
//! | [`config`] | Project layout (`public/` or root) and `site.toml` loading |
//! | [`handler`] | One request in, one response (or a decline) out; URL mounts |
//! | [`server`] | The axum pipeline: render, static fallback, 404 |
//! | [`output`] | CLI output formatting for compile reports |
//!
//! # Design Decisions
//!
//! ## Declared Dependencies, Not Inferred Ones
//!
//! The cache knows nothing about Markdown layouts or include syntax. Each
//! render returns the set of paths it read, and the cache drops an entry when
//! a change event names its source or any of those paths. The set is
//! replaced on every render, so a page that stops including a partial stops
//! depending on it.
//!
//! ## Extension Table as Priority
//!
//! The [`render::Registry`] is an ordered list. Registration order decides
//! which source wins when `about.md` and `about.shtml` both exist, and the
//! same table decides what the compiler renders and what it copies. Adding a
//! format means registering a processor, nothing else.
//!
//! ## Underscore Means Private
//!
//! Any path segment starting with `_` or `.` is never published: not served,
//! not rendered by URL, not copied. Layouts, partials and `_site.toml` live
//! next to the pages that use them.
//!
//! ## Guard Before Mutation
//!
//! Compiling into `..` from a project would delete the project. The guard
//! runs on normalized paths before the output directory is touched, and the
//! only parent-directory output it allows is for a project whose own name
//! starts with `_` (so clearing the output leaves it alone).

pub mod cache;
pub mod compile;
pub mod config;
pub mod event;
pub mod guard;
pub mod handler;
pub mod output;
pub mod render;
pub mod resolve;
pub mod scan;
pub mod server;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;

/// Version stamp for reports and `--version`: the package version on a
/// release tag, `dev@<hash>` otherwise.
pub fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            static STAMP: std::sync::OnceLock<String> = std::sync::OnceLock::new();
            STAMP.get_or_init(|| format!("dev@{hash}"))
        }
    }
}
