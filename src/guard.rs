//! Output path guard for batch compiles.
//!
//! A compile clears its output directory before writing, so pointing it at
//! the project itself (or anything containing the project) would delete the
//! sources being compiled. These predicates decide, from the two paths alone,
//! whether a destination is safe.
//!
//! ```text
//! collides("/foo/bar/myproject", "/output")      → false
//! collides("/foo/bar/myproject", "/foo/bar")     → true   (ancestor)
//! allows("/foo/bar/_myproject", "/foo/bar")      → true   (marker, one level up)
//! allows("/foo/bar/_myproject", "/foo")          → false  (two levels up)
//! ```
//!
//! Both predicates are pure: they compare path components and never touch
//! the filesystem. Trailing separators are irrelevant because [`Path`]
//! comparison is component-wise.

use std::path::{Component, Path, PathBuf};

/// Leading character that opts a project directory into compiling into its
/// own parent.
pub const GUARD_MARKER: char = '_';

/// True when `output` equals `project` or is one of its ancestors.
pub fn collides(project: impl AsRef<Path>, output: impl AsRef<Path>) -> bool {
    let project = project.as_ref();
    let output = output.as_ref();
    project == output || project.starts_with(output)
}

/// True when compiling `project` into `output` is permitted.
///
/// Non-colliding destinations are always allowed. The one colliding
/// destination that is allowed is the direct parent of a project whose
/// directory name starts with [`GUARD_MARKER`].
pub fn allows(project: impl AsRef<Path>, output: impl AsRef<Path>) -> bool {
    let project = project.as_ref();
    let output = output.as_ref();
    if !collides(project, output) {
        return true;
    }
    let marked = project
        .file_name()
        .map(|name| name.to_string_lossy().starts_with(GUARD_MARKER))
        .unwrap_or(false);
    marked && project.parent() == Some(output)
}

/// Lexically normalize a path: drop `.` components and fold `..` into the
/// preceding component. `..` never climbs above the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let climbs = matches!(
                    out.components().next_back(),
                    None | Some(Component::ParentDir)
                );
                if climbs {
                    out.push("..");
                } else {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
