//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Compile
//!
//! ```text
//! Compiled 3 pages, copied 5 files → /home/me/site/www
//!     Version: dev@1a2b3c4
//! Config
//!     ignore = ["drafts"]
//!     name = "demo"
//! ```
//!
//! The `Config` block lists the published configuration (no `globals`) in
//! key order and is omitted when empty. `--json` prints the whole report as
//! JSON instead.
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::compile::BuildReport;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 page`, `2 pages`.
fn count(n: usize, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {plural}")
    }
}

pub fn format_compile_output(report: &BuildReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Compiled {}, copied {} → {}",
            count(report.compiled, "page", "pages"),
            count(report.copied, "file", "files"),
            report.output.display()
        ),
        format!("{}Version: {}", indent(1), report.version),
    ];

    if !report.config.is_empty() {
        lines.push("Config".to_string());
        let mut keys: Vec<&String> = report.config.keys().collect();
        keys.sort();
        for key in keys {
            lines.push(format!("{}{} = {}", indent(1), key, report.config[key]));
        }
    }
    lines
}

pub fn print_compile_output(report: &BuildReport) {
    for line in format_compile_output(report) {
        println!("{}", line);
    }
}

pub fn format_compile_json(report: &BuildReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn report(config: &str) -> BuildReport {
        BuildReport {
            output: PathBuf::from("/site/www"),
            version: "dev@abc1234".to_string(),
            config: toml::from_str(config).unwrap(),
            compiled: 3,
            copied: 1,
        }
    }

    #[test]
    fn count_pluralizes() {
        assert_eq!(count(0, "page", "pages"), "0 pages");
        assert_eq!(count(1, "page", "pages"), "1 page");
        assert_eq!(count(2, "file", "files"), "2 files");
    }

    #[test]
    fn indent_levels() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2), "        ");
    }

    #[test]
    fn compile_summary_without_config() {
        let lines = format_compile_output(&report(""));
        assert_eq!(
            lines,
            vec![
                "Compiled 3 pages, copied 1 file → /site/www".to_string(),
                "    Version: dev@abc1234".to_string(),
            ]
        );
    }

    #[test]
    fn compile_summary_lists_config_sorted() {
        let lines = format_compile_output(&report("name = \"demo\"\nignore = [\"drafts\"]"));
        assert_eq!(lines[2], "Config");
        assert_eq!(lines[3], "    ignore = [\"drafts\"]");
        assert_eq!(lines[4], "    name = \"demo\"");
    }

    #[test]
    fn json_report_has_all_fields() {
        let json = format_compile_json(&report("name = \"demo\"")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["output"], "/site/www");
        assert_eq!(value["version"], "dev@abc1234");
        assert_eq!(value["config"]["name"], "demo");
        assert_eq!(value["compiled"], 3);
        assert_eq!(value["copied"], 1);
    }
}
