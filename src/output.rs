//! Renders the core's typed results as text or JSON for the `lsp-cli`
//! binary. An external collaborator: nothing in `lsp::client` depends on
//! this module.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::lsp::types::{Diagnostic, DocumentSymbolsResult, Hover, Location};
use crate::lsp::uri::uri_to_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// `line`/`character` from the wire are zero-based; text output is
/// one-based for human readers. JSON output stays zero-based, matching the
/// wire values it's showing.
fn location_line(uri: &str, line: u32, character: u32) -> String {
    format!(
        "{}:{}:{}",
        uri_to_path(uri).display(),
        line + 1,
        character + 1
    )
}

pub fn format_locations(locations: &[Location], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(locations).unwrap_or_default(),
        OutputFormat::Text => {
            if locations.is_empty() {
                return "no results".to_string();
            }
            locations
                .iter()
                .map(|loc| location_line(&loc.uri, loc.range.start.line, loc.range.start.character))
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

pub fn format_hover(hover: &Hover, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(hover).unwrap_or_default(),
        OutputFormat::Text => strip_code_fences(&hover.text()),
    }
}

/// Strips leading/trailing ``` fences (with an optional language tag) so
/// markdown hover text reads cleanly in a plain terminal.
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.trim_start_matches(|c: char| c.is_alphanumeric());
        let rest = rest.strip_prefix('\n').unwrap_or(rest);
        if let Some(body) = rest.strip_suffix("```") {
            return body.trim().to_string();
        }
    }
    trimmed.to_string()
}

pub fn format_document_symbols(result: &DocumentSymbolsResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => match result {
            DocumentSymbolsResult::Hierarchical(v) => {
                serde_json::to_string_pretty(v).unwrap_or_default()
            }
            DocumentSymbolsResult::Flat(v) => serde_json::to_string_pretty(v).unwrap_or_default(),
        },
        OutputFormat::Text => match result {
            DocumentSymbolsResult::Hierarchical(symbols) => {
                let mut out = String::new();
                for symbol in symbols {
                    write_symbol_tree(&mut out, symbol, 0);
                }
                if out.is_empty() {
                    "no symbols".to_string()
                } else {
                    out.trim_end().to_string()
                }
            }
            DocumentSymbolsResult::Flat(symbols) => {
                if symbols.is_empty() {
                    return "no symbols".to_string();
                }
                symbols
                    .iter()
                    .map(|s| {
                        format!(
                            "{}  {} ({})",
                            location_line(
                                &s.location.uri,
                                s.location.range.start.line,
                                s.location.range.start.character
                            ),
                            s.name,
                            s.kind.name()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        },
    }
}

fn write_symbol_tree(out: &mut String, symbol: &crate::lsp::types::DocumentSymbol, depth: usize) {
    let _ = writeln!(
        out,
        "{}{} ({})",
        "  ".repeat(depth),
        symbol.name,
        symbol.kind.name()
    );
    for child in &symbol.children {
        write_symbol_tree(out, child, depth + 1);
    }
}

pub fn format_diagnostics(uri: &str, diagnostics: &[Diagnostic], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(diagnostics).unwrap_or_default(),
        OutputFormat::Text => {
            if diagnostics.is_empty() {
                return "no diagnostics".to_string();
            }
            diagnostics
                .iter()
                .map(|d| diagnostic_line(uri, d))
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

pub fn format_all_diagnostics(
    all: &HashMap<String, Vec<Diagnostic>>,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(all).unwrap_or_default(),
        OutputFormat::Text => {
            let mut uris: Vec<&String> = all.keys().collect();
            uris.sort();
            let mut out = Vec::new();
            for uri in uris {
                for d in &all[uri] {
                    out.push(diagnostic_line(uri, d));
                }
            }
            if out.is_empty() {
                "no diagnostics".to_string()
            } else {
                out.join("\n")
            }
        }
    }
}

fn diagnostic_line(uri: &str, d: &Diagnostic) -> String {
    let severity = d.severity.map(|s| s.name()).unwrap_or("unknown");
    format!(
        "{}: {}: {}",
        location_line(uri, d.range.start.line, d.range.start.character),
        severity,
        d.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::types::{Position, Range};
    use serde_json::json;

    #[test]
    fn empty_locations_render_no_results_in_text_mode() {
        assert_eq!(format_locations(&[], OutputFormat::Text), "no results");
    }

    #[test]
    fn location_text_is_one_indexed_path_line_col() {
        let loc = Location {
            uri: "file:///proj/main.rs".to_string(),
            range: Range {
                start: Position::new(4, 7),
                end: Position::new(4, 10),
            },
        };
        assert_eq!(
            format_locations(&[loc], OutputFormat::Text),
            "/proj/main.rs:5:8"
        );
    }

    #[test]
    fn strips_fenced_code_block() {
        assert_eq!(strip_code_fences("```rust\nfn main() {}\n```"), "fn main() {}");
        assert_eq!(strip_code_fences("plain hover text"), "plain hover text");
    }

    #[test]
    fn diagnostic_line_falls_back_to_unknown_severity() {
        let d: Diagnostic = serde_json::from_value(json!({
            "range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 1}},
            "message": "boom"
        }))
        .unwrap();
        assert_eq!(diagnostic_line("file:///a.rs", &d), "/a.rs:1:1: unknown: boom");
    }
}
