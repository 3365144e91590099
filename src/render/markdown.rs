//! Markdown pages wrapped in layouts.
//!
//! A page is converted with `pulldown-cmark` and then wrapped in the nearest
//! `_layout.html`, searching the page's directory first and walking up to the
//! public root. Every layout path probed is reported as a dependency: editing
//! the layout in use, or creating a closer one, invalidates the page.
//!
//! Layout placeholders:
//!
//! | Placeholder | Value |
//! |---|---|
//! | `{{ yield }}` | the rendered page body |
//! | `{{ title }}` | text of the page's first `# ` heading |
//! | `{{ name }}` | `name` from the project's `[globals]` table |
//!
//! Unknown placeholders render as the empty string.

use super::processor::{Compiled, Processor, RenderContext, RenderError, read_text};
use pulldown_cmark::{Options, Parser, html as md_html};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const LAYOUT_FILENAME: &str = "_layout.html";

#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownProcessor;

impl Processor for MarkdownProcessor {
    fn source_extension(&self) -> &str {
        "md"
    }

    fn output_extension(&self) -> &str {
        "html"
    }

    fn render(&self, ctx: &RenderContext<'_>, source: &Path) -> Result<Compiled, RenderError> {
        let content = read_text(source)?;
        let body = markdown_to_html(&content);

        let probed = layout_candidates(ctx.root, source);
        let layout_path = probed.iter().find(|path| path.is_file()).cloned();
        let dependencies: BTreeSet<PathBuf> = match &layout_path {
            Some(found) => {
                let closer = probed.iter().take_while(|p| *p != found);
                closer.chain([found]).cloned().collect()
            }
            None => probed.iter().cloned().collect(),
        };
        let html = match layout_path {
            Some(layout_path) => {
                let layout = read_text(&layout_path)?;
                let title = page_title(&content).unwrap_or_default();
                apply_layout(&layout, &body, &title, ctx.globals)
            }
            None => body,
        };

        Ok(Compiled {
            body: html.into_bytes(),
            dependencies,
        })
    }
}

pub fn markdown_to_html(content: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS;
    let parser = Parser::new_ext(content, options);
    let mut html = String::new();
    md_html::push_html(&mut html, parser);
    html
}

/// Title from the first `# heading` line.
fn page_title(content: &str) -> Option<String> {
    content
        .lines()
        .find(|line| line.starts_with("# "))
        .map(|line| line.trim_start_matches("# ").trim().to_string())
}

/// Layout paths from the page's directory up to `root`, nearest first.
fn layout_candidates(root: &Path, source: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    let mut dir = source.parent();
    while let Some(current) = dir {
        if !current.starts_with(root) {
            break;
        }
        candidates.push(current.join(LAYOUT_FILENAME));
        if current == root {
            break;
        }
        dir = current.parent();
    }
    candidates
}

/// Substitute `{{ key }}` placeholders in a layout.
pub fn apply_layout(layout: &str, body: &str, title: &str, globals: &toml::Table) -> String {
    let mut out = String::with_capacity(layout.len() + body.len());
    let mut rest = layout;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start..].find("}}") else {
            break;
        };
        out.push_str(&rest[..start]);
        let key = rest[start + 2..start + len].trim();
        match key {
            "yield" => out.push_str(body),
            "title" => out.push_str(title),
            _ => {
                if let Some(value) = globals.get(key) {
                    out.push_str(&global_to_string(value));
                }
            }
        }
        rest = &rest[start + len + 2..];
    }
    out.push_str(rest);
    out
}

fn global_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
