//! Source tree enumeration for batch compilation.
//!
//! Walks a public directory and splits its files into two disjoint sets:
//!
//! | Set | Contents | Fate |
//! |---|---|---|
//! | compilable | a registered processor claims the extension | rendered |
//! | pass-through | everything else, plus ignored/vendor files | copied verbatim |
//!
//! Dotfiles and underscore-prefixed files or directories (partials, layouts,
//! `_site.toml`) belong to neither set: they are never published. Files under
//! an ignored path are never compiled, even if a processor claims them, so a
//! `vendor/` directory ships exactly as written.
//!
//! The walk is sorted by file name, so two scans of the same tree produce
//! identical lists.

use crate::render::Registry;
use crate::resolve::IgnoreRules;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Public directory not found: {0}")]
    MissingRoot(PathBuf),
}

/// Files found under a public directory, as paths relative to it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SourceTree {
    pub compilable: Vec<PathBuf>,
    pub pass_through: Vec<PathBuf>,
}

impl SourceTree {
    pub fn len(&self) -> usize {
        self.compilable.len() + self.pass_through.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Enumerate `root`, classifying every publishable file.
///
/// `skip` names a directory to leave out entirely, typically an output
/// directory placed inside the tree being scanned.
pub fn scan(
    root: &Path,
    registry: &Registry,
    ignore: &IgnoreRules,
    skip: Option<&Path>,
) -> Result<SourceTree, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::MissingRoot(root.to_path_buf()));
    }

    let mut tree = SourceTree::default();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path() == root || !(is_private(e) || skip == Some(e.path())));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel = rel.to_path_buf();

        if ignore.is_ignored(&rel) || !registry.is_compilable(&rel) {
            tree.pass_through.push(rel);
        } else {
            tree.compilable.push(rel);
        }
    }

    tracing::debug!(
        root = %root.display(),
        compilable = tree.compilable.len(),
        pass_through = tree.pass_through.len(),
        "scanned source tree"
    );
    Ok(tree)
}

fn is_private(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.') || name.starts_with('_'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{setup_fixtures, write_tree};
    use tempfile::TempDir;

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    fn sample_tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[
                ("index.md", "# Home"),
                ("about.md", "# About"),
                ("nav.shtml", "nav"),
                ("css/main.css", "body {}"),
                ("robots.txt", "User-agent: *"),
                ("_layout.html", "{{ yield }}"),
                ("_partials/footer.html", "footer"),
                (".git/HEAD", "ref"),
                (".DS_Store", ""),
                ("vendor/lib.js", "lib"),
                ("vendor/README.md", "# vendored"),
            ],
        );
        tmp
    }

    #[test]
    fn classifies_compilable_and_pass_through() {
        let tmp = sample_tree();
        let tree = scan(
            tmp.path(),
            &Registry::standard(),
            &IgnoreRules::default(),
            None,
        )
        .unwrap();

        assert_eq!(names(&tree.compilable), vec!["about.md", "index.md", "nav.shtml"]);
        assert_eq!(
            names(&tree.pass_through),
            vec!["css/main.css", "robots.txt", "vendor/README.md", "vendor/lib.js"]
        );
    }

    #[test]
    fn private_files_are_never_listed() {
        let tmp = sample_tree();
        let tree = scan(
            tmp.path(),
            &Registry::standard(),
            &IgnoreRules::default(),
            None,
        )
        .unwrap();

        let all: Vec<String> = names(&tree.compilable)
            .into_iter()
            .chain(names(&tree.pass_through))
            .collect();
        assert!(all.iter().all(|n| !n.contains("_layout") && !n.contains(".git")));
        assert!(!all.iter().any(|n| n.starts_with("_partials")));
        assert_eq!(tree.len(), 7);
    }

    #[test]
    fn ignored_prefix_is_copied_not_compiled() {
        let tmp = sample_tree();
        write_tree(tmp.path(), &[("drafts/wip.md", "# WIP")]);
        let tree = scan(
            tmp.path(),
            &Registry::standard(),
            &IgnoreRules::with_prefixes(["drafts"]),
            None,
        )
        .unwrap();

        assert!(!names(&tree.compilable).contains(&"drafts/wip.md".to_string()));
        assert!(names(&tree.pass_through).contains(&"drafts/wip.md".to_string()));
    }

    #[test]
    fn skip_directory_is_left_out() {
        let tmp = sample_tree();
        write_tree(tmp.path(), &[("www/index.html", "old output")]);
        let skip = tmp.path().join("www");
        let tree = scan(
            tmp.path(),
            &Registry::standard(),
            &IgnoreRules::default(),
            Some(&skip),
        )
        .unwrap();

        assert!(!names(&tree.pass_through).iter().any(|n| n.starts_with("www")));
    }

    #[test]
    fn root_with_underscore_name_is_still_walked() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("_project");
        write_tree(&root, &[("index.md", "# Home")]);
        let tree = scan(&root, &Registry::standard(), &IgnoreRules::default(), None).unwrap();
        assert_eq!(names(&tree.compilable), vec!["index.md"]);
    }

    #[test]
    fn fixture_site_classification() {
        let tmp = setup_fixtures();
        let tree = scan(
            &tmp.path().join("public"),
            &Registry::standard(),
            &IgnoreRules::with_prefixes(["drafts"]),
            None,
        )
        .unwrap();

        assert_eq!(
            names(&tree.compilable),
            vec![
                "about.md",
                "blog/first-post.md",
                "blog/index.md",
                "index.md",
                "nav.shtml"
            ]
        );
        assert_eq!(
            names(&tree.pass_through),
            vec![
                "css/main.css",
                "drafts/idea.md",
                "robots.txt",
                "vendor/CHANGES.md",
                "vendor/lib.js"
            ]
        );
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let result = scan(
            &tmp.path().join("nope"),
            &Registry::standard(),
            &IgnoreRules::default(),
            None,
        );
        assert!(matches!(result, Err(ScanError::MissingRoot(_))));
    }
}
