//! The typed protocol model: wire-shape record definitions for positions,
//! ranges, locations, symbols, diagnostics, and hovers, plus the
//! speculative-decode normalizers that collapse LSP's polymorphic response
//! shapes into one client-facing type.
//!
//! URIs here are plain `String`s rather than `lsp_types::Uri` — see
//! [`crate::lsp::uri`] for why.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::rpc::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub uri: String,
    pub range: Range,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationLink {
    #[serde(rename = "originSelectionRange")]
    #[allow(dead_code)]
    pub origin_selection_range: Option<Range>,
    #[serde(rename = "targetUri")]
    pub target_uri: String,
    #[allow(dead_code)]
    #[serde(rename = "targetRange")]
    pub target_range: Range,
    #[serde(rename = "targetSelectionRange")]
    pub target_selection_range: Range,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextDocumentIdentifier {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextDocumentItem {
    pub uri: String,
    #[serde(rename = "languageId")]
    pub language_id: String,
    pub version: i32,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", rename_all = "snake_case")]
pub enum SymbolKind {
    File = 1,
    Module = 2,
    Namespace = 3,
    Package = 4,
    Class = 5,
    Method = 6,
    Property = 7,
    Field = 8,
    Constructor = 9,
    Enum = 10,
    Interface = 11,
    Function = 12,
    Variable = 13,
    Constant = 14,
    String = 15,
    Number = 16,
    Boolean = 17,
    Array = 18,
    Object = 19,
    Key = 20,
    Null = 21,
    EnumMember = 22,
    Struct = 23,
    Event = 24,
    Operator = 25,
    TypeParameter = 26,
}

impl SymbolKind {
    /// The textual name formatters render, e.g. `"function"`.
    pub fn name(&self) -> &'static str {
        match self {
            SymbolKind::File => "file",
            SymbolKind::Module => "module",
            SymbolKind::Namespace => "namespace",
            SymbolKind::Package => "package",
            SymbolKind::Class => "class",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
            SymbolKind::Field => "field",
            SymbolKind::Constructor => "constructor",
            SymbolKind::Enum => "enum",
            SymbolKind::Interface => "interface",
            SymbolKind::Function => "function",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::String => "string",
            SymbolKind::Number => "number",
            SymbolKind::Boolean => "boolean",
            SymbolKind::Array => "array",
            SymbolKind::Object => "object",
            SymbolKind::Key => "key",
            SymbolKind::Null => "null",
            SymbolKind::EnumMember => "enum_member",
            SymbolKind::Struct => "struct",
            SymbolKind::Event => "event",
            SymbolKind::Operator => "operator",
            SymbolKind::TypeParameter => "type_parameter",
        }
    }
}

impl TryFrom<u8> for SymbolKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use SymbolKind::*;
        Ok(match value {
            1 => File,
            2 => Module,
            3 => Namespace,
            4 => Package,
            5 => Class,
            6 => Method,
            7 => Property,
            8 => Field,
            9 => Constructor,
            10 => Enum,
            11 => Interface,
            12 => Function,
            13 => Variable,
            14 => Constant,
            15 => String,
            16 => Number,
            17 => Boolean,
            18 => Array,
            19 => Object,
            20 => Key,
            21 => Null,
            22 => EnumMember,
            23 => Struct,
            24 => Event,
            25 => Operator,
            26 => TypeParameter,
            other => return Err(format!("unknown SymbolKind {other}")),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSymbol {
    pub name: String,
    #[serde(default)]
    pub detail: Option<String>,
    pub kind: SymbolKind,
    pub range: Range,
    #[serde(rename = "selectionRange")]
    pub selection_range: Range,
    #[serde(default)]
    pub children: Vec<DocumentSymbol>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInformation {
    pub name: String,
    pub kind: SymbolKind,
    pub location: Location,
}

/// `documentSymbol` may return either shape; exactly one variant is
/// populated so callers don't need to guess which.
#[derive(Debug, Clone)]
pub enum DocumentSymbolsResult {
    Hierarchical(Vec<DocumentSymbol>),
    Flat(Vec<SymbolInformation>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", rename_all = "snake_case")]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticSeverity::Error => "error",
            DiagnosticSeverity::Warning => "warning",
            DiagnosticSeverity::Information => "info",
            DiagnosticSeverity::Hint => "hint",
        }
    }
}

impl TryFrom<u8> for DiagnosticSeverity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => DiagnosticSeverity::Error,
            2 => DiagnosticSeverity::Warning,
            3 => DiagnosticSeverity::Information,
            4 => DiagnosticSeverity::Hint,
            other => return Err(format!("unknown DiagnosticSeverity {other}")),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub range: Range,
    #[serde(default)]
    pub severity: Option<DiagnosticSeverity>,
    #[serde(default)]
    pub source: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishDiagnosticsParams {
    pub uri: String,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceSymbolParams {
    pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MarkupContent {
    #[allow(dead_code)]
    kind: String,
    value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hover {
    pub contents: Value,
    #[serde(default)]
    pub range: Option<Range>,
}

impl Hover {
    /// Extracts the hover text, trying (in order) markup-content shape
    /// `{kind, value}`, a plain string, an array of strings/markup-contents
    /// joined by newline, and finally the raw JSON as a last resort.
    pub fn text(&self) -> String {
        hover_contents_text(&self.contents)
    }
}

fn hover_contents_text(contents: &Value) -> String {
    if let Ok(markup) = serde_json::from_value::<MarkupContent>(contents.clone()) {
        return markup.value;
    }
    if let Some(s) = contents.as_str() {
        return s.to_string();
    }
    if let Some(items) = contents.as_array() {
        return items
            .iter()
            .map(hover_contents_text)
            .collect::<Vec<_>>()
            .join("\n");
    }
    contents.to_string()
}

/// Normalizes the four interchangeable shapes `definition`/`implementation`
/// may respond with: `null`, a single `Location`, a `Location[]`, or a
/// `LocationLink[]`. Tries each in the order the spec prescribes, since both
/// `Location[]` and `LocationLink[]` are JSON arrays and the more permissive
/// shape must be tried first in a way that only matches when elements carry
/// top-level `uri` fields.
pub fn normalize_locations(result: &Value) -> Result<Vec<Location>, ProtocolError> {
    if result.is_null() {
        return Ok(Vec::new());
    }
    if let Ok(locations) = serde_json::from_value::<Vec<Location>>(result.clone()) {
        return Ok(locations);
    }
    if let Ok(location) = serde_json::from_value::<Location>(result.clone()) {
        if !location.uri.is_empty() {
            return Ok(vec![location]);
        }
    }
    if let Ok(links) = serde_json::from_value::<Vec<LocationLink>>(result.clone()) {
        return Ok(links
            .into_iter()
            .map(|link| Location {
                uri: link.target_uri,
                range: link.target_selection_range,
            })
            .collect());
    }
    Err(ProtocolError::UnexpectedShape(format!(
        "unexpected location response shape: {result}"
    )))
}

/// Normalizes the `documentSymbol` response. Tries `DocumentSymbol[]`
/// first; if it decodes and the first element carries a usable `name` or a
/// non-zero range, the hierarchical form wins. Otherwise falls back to
/// `SymbolInformation[]`.
pub fn normalize_document_symbols(
    result: &Value,
) -> Result<DocumentSymbolsResult, ProtocolError> {
    if let Ok(hierarchical) = serde_json::from_value::<Vec<DocumentSymbol>>(result.clone()) {
        if let Some(first) = hierarchical.first() {
            let has_range = first.range.end.line > 0 || first.range.end.character > 0;
            if !first.name.is_empty() || has_range {
                return Ok(DocumentSymbolsResult::Hierarchical(hierarchical));
            }
        } else {
            // Empty array: ambiguous between the two shapes, but an empty
            // hierarchical result is as valid an answer as an empty flat one.
            return Ok(DocumentSymbolsResult::Hierarchical(hierarchical));
        }
    }

    let flat: Vec<SymbolInformation> = serde_json::from_value(result.clone()).map_err(|_| {
        ProtocolError::UnexpectedShape(format!("unexpected document symbol response shape: {result}"))
    })?;
    Ok(DocumentSymbolsResult::Flat(flat))
}
