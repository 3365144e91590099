//! Server-side includes (`.shtml` → `.html`).
//!
//! Expands the two classic include directives, recursively:
//!
//! ```text
//! <!--#include file="_nav.html" -->        relative to the including file
//! <!--#include virtual="/_footer.html" --> relative to the public root
//! ```
//!
//! Every file pulled in at any depth is declared as a dependency, so the
//! cache can invalidate a page when a nested partial changes without knowing
//! anything about include syntax.

use super::processor::{Compiled, Processor, RenderContext, RenderError, read_text};
use crate::guard::normalize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const DIRECTIVE_OPEN: &str = "<!--#include";
const DIRECTIVE_CLOSE: &str = "-->";
const MAX_DEPTH: usize = 16;

#[derive(Debug, Default, Clone, Copy)]
pub struct IncludeProcessor;

impl Processor for IncludeProcessor {
    fn source_extension(&self) -> &str {
        "shtml"
    }

    fn output_extension(&self) -> &str {
        "html"
    }

    fn render(&self, ctx: &RenderContext<'_>, source: &Path) -> Result<Compiled, RenderError> {
        let mut dependencies = BTreeSet::new();
        let mut stack = vec![source.to_path_buf()];
        let body = expand(ctx.root, source, &mut stack, &mut dependencies)?;
        Ok(Compiled {
            body: body.into_bytes(),
            dependencies,
        })
    }
}

fn expand(
    root: &Path,
    file: &Path,
    stack: &mut Vec<PathBuf>,
    dependencies: &mut BTreeSet<PathBuf>,
) -> Result<String, RenderError> {
    let content = read_text(file)?;
    let mut out = String::with_capacity(content.len());
    let mut rest = content.as_str();

    while let Some(start) = rest.find(DIRECTIVE_OPEN) {
        let Some(len) = rest[start..].find(DIRECTIVE_CLOSE) else {
            return Err(RenderError::failed(file, "unterminated include directive"));
        };
        out.push_str(&rest[..start]);
        let directive = &rest[start + DIRECTIVE_OPEN.len()..start + len];
        let target = include_target(root, file, directive)?;

        if stack.contains(&target) {
            return Err(RenderError::failed(
                file,
                format!("include cycle through {}", target.display()),
            ));
        }
        if stack.len() >= MAX_DEPTH {
            return Err(RenderError::failed(file, "includes nested too deeply"));
        }

        dependencies.insert(target.clone());
        stack.push(target.clone());
        out.push_str(&expand(root, &target, stack, dependencies)?);
        stack.pop();

        rest = &rest[start + len + DIRECTIVE_CLOSE.len()..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Resolve a directive's `file=` or `virtual=` attribute to an absolute path
/// inside `root`.
fn include_target(root: &Path, file: &Path, directive: &str) -> Result<PathBuf, RenderError> {
    let (base, value) = if let Some(value) = attribute(directive, "file") {
        (file.parent().unwrap_or(root), value)
    } else if let Some(value) = attribute(directive, "virtual") {
        (root, value.trim_start_matches('/'))
    } else {
        return Err(RenderError::failed(
            file,
            format!("include directive needs file= or virtual=: {}", directive.trim()),
        ));
    };

    let target = normalize(&base.join(value));
    if !target.starts_with(root) {
        return Err(RenderError::failed(
            file,
            format!("include escapes the public directory: {value}"),
        ));
    }
    Ok(target)
}

fn attribute<'a>(directive: &'a str, name: &str) -> Option<&'a str> {
    let pattern = format!("{name}=\"");
    let start = directive.find(&pattern)? + pattern.len();
    let len = directive[start..].find('"')?;
    Some(&directive[start..start + len])
}
