//! USDA (ASCII) file parser.
//!
//! This module provides line-by-line parsing of USDA text files into a
//! [`Layer`]. It reads what the packaging and export paths need and keeps
//! anything else verbatim or skips it.
//!
//! # Supported Syntax
//!
//! - Layer metadata: `defaultPrim`, `doc`, `metersPerUnit`, `upAxis`, `subLayers`
//! - `def|over|class [Type] "Name" ( metadata ) { ... }`
//! - Prim metadata: `kind`, `references`, `payload` (with list ops)
//! - Attributes: `[uniform] type name [= value]`, multi-line arrays
//!
//! Relationships, time samples, variant sets and attribute metadata are
//! skipped. Asset paths (`@...@`) can also be scanned and rewritten
//! without a full parse, see [`scan_asset_paths`] and [`rewrite_asset_paths`].

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use mythica_math::{DVec3, Vec3};
use thiserror::Error;

use super::types::*;
use super::writer::format_asset;

/// Errors that can occur during USDA parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unexpected end of file")]
    UnexpectedEof,

    #[error("Invalid number format: {0}")]
    InvalidNumber(String),

    #[error("Unclosed block starting at line {0}")]
    UnclosedBlock(usize),

    #[error("Malformed value: {0}")]
    InvalidValue(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// On-disk layer encodings, detected from the first bytes of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerFormat {
    /// `#usda` text
    Usda,
    /// `PXR-USDC` binary crate
    Usdc,
    /// Not a USD layer (textures, audio, ...)
    Other,
}

/// Detect the encoding of a layer from its contents.
pub fn detect_layer_format(bytes: &[u8]) -> LayerFormat {
    if bytes.starts_with(b"#usda") {
        LayerFormat::Usda
    } else if bytes.starts_with(b"PXR-USDC") {
        LayerFormat::Usdc
    } else {
        LayerFormat::Other
    }
}

// ============================================================================
// Lexing
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SegmentKind {
    Code,
    Quoted,
    /// Inner literal of an `@...@` or `@@@...@@@` asset path
    Asset,
    Comment,
}

#[derive(Clone, Copy, Debug)]
struct Segment {
    kind: SegmentKind,
    start: usize,
    end: usize,
}

/// Split text into code, string, asset path and comment regions.
///
/// All delimiters are ASCII, so every boundary is a char boundary.
fn segments(text: &str) -> Vec<Segment> {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut out = Vec::new();
    let mut code_start = 0;
    let mut i = 0;

    fn flush(out: &mut Vec<Segment>, start: usize, end: usize) {
        if end > start {
            out.push(Segment {
                kind: SegmentKind::Code,
                start,
                end,
            });
        }
    }

    while i < len {
        match bytes[i] {
            q @ (b'"' | b'\'') => {
                flush(&mut out, code_start, i);
                let triple = bytes[i..].starts_with(&[q, q, q]);
                let mut j = i + if triple { 3 } else { 1 };
                let end = loop {
                    if j >= len {
                        break len;
                    }
                    if bytes[j] == b'\\' {
                        j += 2;
                        continue;
                    }
                    if triple {
                        if bytes[j..].starts_with(&[q, q, q]) {
                            break j + 3;
                        }
                    } else if bytes[j] == q {
                        break j + 1;
                    }
                    j += 1;
                };
                out.push(Segment {
                    kind: SegmentKind::Quoted,
                    start: i,
                    end,
                });
                i = end;
                code_start = i;
            }
            b'@' => {
                flush(&mut out, code_start, i);
                let (delim, literal_start): (&[u8], usize) = if bytes[i..].starts_with(b"@@@") {
                    (b"@@@", i + 3)
                } else {
                    (b"@", i + 1)
                };
                let literal_end = (literal_start..len)
                    .find(|&k| bytes[k..].starts_with(delim))
                    .unwrap_or(len);
                out.push(Segment {
                    kind: SegmentKind::Asset,
                    start: literal_start,
                    end: literal_end,
                });
                i = (literal_end + delim.len()).min(len);
                code_start = i;
            }
            b'#' => {
                flush(&mut out, code_start, i);
                let end = (i..len).find(|&k| bytes[k] == b'\n').unwrap_or(len);
                out.push(Segment {
                    kind: SegmentKind::Comment,
                    start: i,
                    end,
                });
                i = end;
                code_start = i;
            }
            _ => i += 1,
        }
    }
    flush(&mut out, code_start, len);

    out
}

/// Characters outside strings, asset paths and comments, with byte offsets.
fn code_chars(text: &str) -> Vec<(usize, char)> {
    segments(text)
        .into_iter()
        .filter(|s| s.kind == SegmentKind::Code)
        .flat_map(|s| {
            text[s.start..s.end]
                .char_indices()
                .map(move |(i, c)| (s.start + i, c))
        })
        .collect()
}

/// Net count of open `(` and `[` in code.
fn bracket_depth(text: &str) -> i32 {
    code_chars(text).iter().fold(0, |depth, &(_, c)| match c {
        '(' | '[' => depth + 1,
        ')' | ']' => depth - 1,
        _ => depth,
    })
}

/// Net count of open `{` in code.
fn brace_depth(text: &str) -> i32 {
    code_chars(text).iter().fold(0, |depth, &(_, c)| match c {
        '{' => depth + 1,
        '}' => depth - 1,
        _ => depth,
    })
}

/// Byte offset of the bracket closing the group that opens at the start of `text`.
fn matching_close(text: &str) -> Option<usize> {
    let mut depth = 0;
    for (i, c) in code_chars(text) {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split at separators that sit outside strings and brackets.
fn split_top_level<'a>(text: &'a str, separators: &[char]) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut depth = 0;
    let mut start = 0;
    for (i, c) in code_chars(text) {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c if depth == 0 && separators.contains(&c) => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Byte offset of the first top-level `=`.
fn find_assignment(text: &str) -> Option<usize> {
    let mut depth = 0;
    for (i, c) in code_chars(text) {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            '=' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

// ============================================================================
// Asset path scanning
// ============================================================================

/// Where an asset path was authored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetContext {
    SubLayer,
    Reference,
    Payload,
    /// An `asset` or `asset[]` valued attribute
    Attribute,
    Other,
}

/// An asset path literal found in a layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetPathRef {
    /// The path between the `@` delimiters, verbatim
    pub literal: String,

    /// 1-based line of the literal
    pub line: usize,

    pub context: AssetContext,
}

/// Find every asset path literal in USDA text.
pub fn scan_asset_paths(content: &str) -> Vec<AssetPathRef> {
    let segs = segments(content);
    let mut found = Vec::new();

    for (index, seg) in segs.iter().enumerate() {
        if seg.kind != SegmentKind::Asset {
            continue;
        }

        let line = content[..seg.start].matches('\n').count() + 1;
        found.push(AssetPathRef {
            literal: content[seg.start..seg.end].to_string(),
            line,
            context: asset_context(content, &segs[..index]),
        });
    }

    found
}

/// Classify an asset path by the statement whose `=` precedes it.
fn asset_context(content: &str, preceding: &[Segment]) -> AssetContext {
    for seg in preceding.iter().rev() {
        if seg.kind != SegmentKind::Code {
            continue;
        }
        let code = &content[seg.start..seg.end];
        let Some(eq) = code.rfind('=') else {
            continue;
        };

        let line_start = content[..seg.start + eq].rfind('\n').map_or(0, |i| i + 1);
        let key = &content[line_start..seg.start + eq];
        let words: Vec<&str> = key.split_whitespace().collect();

        return if words.contains(&"subLayers") {
            AssetContext::SubLayer
        } else if words.contains(&"references") {
            AssetContext::Reference
        } else if words.contains(&"payload") || words.contains(&"payloads") {
            AssetContext::Payload
        } else if words.iter().any(|w| *w == "asset" || *w == "asset[]") {
            AssetContext::Attribute
        } else {
            AssetContext::Other
        };
    }

    AssetContext::Other
}

/// Replace asset path literals found in `replacements`, leaving the rest
/// of the text untouched.
pub fn rewrite_asset_paths(content: &str, replacements: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(content.len());
    let mut cursor = 0;

    for seg in segments(content) {
        if seg.kind != SegmentKind::Asset {
            continue;
        }
        if let Some(replacement) = replacements.get(&content[seg.start..seg.end]) {
            let delim = if content[..seg.start].ends_with("@@@") { 3 } else { 1 };
            out.push_str(&content[cursor..seg.start - delim]);
            out.push_str(&format_asset(replacement));
            cursor = (seg.end + delim).min(content.len());
        }
    }
    out.push_str(&content[cursor..]);

    out
}

// ============================================================================
// Layer parsing
// ============================================================================

/// USDA file parser.
pub struct UsdaParser {
    lines: VecDeque<(usize, String)>,
    current_line: usize,
}

impl UsdaParser {
    /// Create a new parser from file contents.
    pub fn new(content: &str) -> Self {
        let lines: VecDeque<_> = content
            .lines()
            .enumerate()
            .map(|(i, s)| (i + 1, s.to_string()))
            .collect();

        Self {
            lines,
            current_line: 0,
        }
    }

    /// Parse the USDA content into a layer.
    pub fn parse(&mut self) -> ParseResult<Layer> {
        let mut layer = Layer::new();

        // Header comment lines, then optional layer metadata
        if let Some((line_num, line)) = self.next_significant_line() {
            let trimmed = line.trim().to_string();
            if trimmed.starts_with('(') {
                let (block, rest) = self.collect_group(&trimmed, line_num)?;
                if !rest.is_empty() {
                    return Err(self.error(format!("Unexpected text after layer metadata: {}", rest)));
                }
                let body = inner(&block)
                    .ok_or_else(|| self.error(format!("Malformed layer metadata: {}", block)))?;
                layer.metadata = self.parse_layer_metadata(body)?;
            } else {
                self.lines.push_front((line_num, line));
            }
        }

        while let Some((line_num, line)) = self.next_significant_line() {
            let trimmed = line.trim();
            if starts_with_specifier(trimmed) {
                let prim = self.parse_prim(trimmed, line_num)?;
                layer.root_prims.push(prim);
            } else {
                return Err(ParseError::Parse {
                    line: line_num,
                    message: format!("Expected prim definition, found: {}", trimmed),
                });
            }
        }

        Ok(layer)
    }

    /// Pop the next non-blank, non-comment line.
    fn next_significant_line(&mut self) -> Option<(usize, String)> {
        while let Some((num, line)) = self.lines.pop_front() {
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                self.current_line = num;
                return Some((num, line));
            }
        }
        None
    }

    fn error(&self, message: String) -> ParseError {
        ParseError::Parse {
            line: self.current_line,
            message,
        }
    }

    /// Collect a bracketed group that opens at the start of `first`, pulling
    /// more lines as needed. Returns the group and the text after it.
    fn collect_group(&mut self, first: &str, start_line: usize) -> ParseResult<(String, String)> {
        let mut text = first.to_string();
        loop {
            if let Some(end) = matching_close(&text) {
                let rest = text[end + 1..].trim().to_string();
                text.truncate(end + 1);
                return Ok((text, rest));
            }
            match self.lines.pop_front() {
                Some((num, line)) => {
                    self.current_line = num;
                    text.push('\n');
                    text.push_str(&line);
                }
                None => return Err(ParseError::UnclosedBlock(start_line)),
            }
        }
    }

    /// Collect a statement spanning lines until its brackets balance.
    fn collect_statement(&mut self, first: &str, start_line: usize) -> ParseResult<String> {
        let mut text = first.to_string();
        while bracket_depth(&text) > 0 {
            match self.lines.pop_front() {
                Some((num, line)) => {
                    self.current_line = num;
                    text.push('\n');
                    text.push_str(&line);
                }
                None => return Err(ParseError::UnclosedBlock(start_line)),
            }
        }
        Ok(text)
    }

    fn parse_layer_metadata(&self, content: &str) -> ParseResult<LayerMetadata> {
        let mut metadata = LayerMetadata::default();

        for entry in metadata_entries(content) {
            let Some(eq) = find_assignment(entry) else {
                // Bare strings in the metadata block are the layer doc
                if entry.starts_with('"') || entry.starts_with('\'') {
                    metadata.doc = Some(unquote(entry));
                }
                continue;
            };
            let key = entry[..eq].trim();
            let value = entry[eq + 1..].trim();

            match key {
                "defaultPrim" => metadata.default_prim = Some(unquote(value)),
                "doc" => metadata.doc = Some(unquote(value)),
                "upAxis" => metadata.up_axis = Some(unquote(value)),
                "metersPerUnit" => metadata.meters_per_unit = Some(parse_number(value)?),
                "subLayers" => {
                    metadata.sub_layers = parse_arcs(value)?
                        .into_iter()
                        .map(|arc| arc.asset_path)
                        .collect();
                }
                _ => log::trace!("Ignoring layer metadata: {}", key),
            }
        }

        Ok(metadata)
    }

    /// Parse a prim whose declaration line is `decl`.
    fn parse_prim(&mut self, decl: &str, start_line: usize) -> ParseResult<PrimSpec> {
        let (specifier, type_name, name, rest) = parse_prim_declaration(decl)
            .ok_or_else(|| ParseError::Parse {
                line: start_line,
                message: format!("Invalid prim declaration: {}", decl),
            })?;

        let mut prim = PrimSpec::new(name, type_name.as_deref());
        prim.specifier = specifier;

        let mut rest = rest;

        // Metadata may start on the next line
        if rest.is_empty() {
            if let Some((num, line)) = self.next_significant_line() {
                if line.trim().starts_with('(') {
                    rest = line.trim().to_string();
                } else {
                    self.lines.push_front((num, line));
                }
            }
        }

        if rest.starts_with('(') {
            let (block, after) = self.collect_group(&rest, start_line)?;
            let body = inner(&block)
                .ok_or_else(|| self.error(format!("Malformed prim metadata: {}", block)))?;
            self.apply_prim_metadata(&mut prim, body)?;
            rest = after;
        }

        if rest.is_empty() {
            self.expect_opening_brace(start_line)?;
        } else if let Some(body) = rest.strip_prefix('{') {
            let body = body.trim();
            if let Some(inline_body) = body.strip_suffix('}') {
                // Whole prim on one line: def Xform "A" { double3 xformOp:translate = (0, 0, 0) }
                for statement in split_top_level(inline_body, &[';', '\n']) {
                    let statement = statement.trim();
                    if !statement.is_empty() {
                        if let Some(attribute) = parse_attribute(statement)? {
                            prim.set_attribute(attribute);
                        }
                    }
                }
                return Ok(prim);
            }
            if !body.is_empty() {
                return Err(self.error(format!("Unexpected text after '{{': {}", body)));
            }
        } else {
            return Err(ParseError::Parse {
                line: start_line,
                message: format!("Expected '{{' after prim declaration, found: {}", rest),
            });
        }

        self.parse_prim_body(&mut prim, start_line)?;
        Ok(prim)
    }

    /// Expect and consume an opening brace on its own line.
    fn expect_opening_brace(&mut self, start_line: usize) -> ParseResult<()> {
        match self.next_significant_line() {
            Some((_, line)) if line.trim() == "{" => Ok(()),
            Some((num, line)) => Err(ParseError::Parse {
                line: num,
                message: format!("Expected opening brace, found: {}", line.trim()),
            }),
            None => Err(ParseError::UnclosedBlock(start_line)),
        }
    }

    /// Skip a block (consume until matching closing brace).
    fn skip_block(&mut self, start_line: usize, opening: &str) -> ParseResult<()> {
        let mut depth = brace_depth(opening);

        while depth > 0 {
            match self.lines.pop_front() {
                Some((num, line)) => {
                    self.current_line = num;
                    depth += brace_depth(&line);
                }
                None => return Err(ParseError::UnclosedBlock(start_line)),
            }
        }

        Ok(())
    }

    /// Parse attributes and child prims until the closing brace.
    fn parse_prim_body(&mut self, prim: &mut PrimSpec, start_line: usize) -> ParseResult<()> {
        loop {
            let (line_num, line) = match self.next_significant_line() {
                Some(x) => x,
                None => return Err(ParseError::UnclosedBlock(start_line)),
            };

            let trimmed = line.trim();

            if trimmed == "}" {
                return Ok(());
            }

            // Check for child prim FIRST
            if starts_with_specifier(trimmed) {
                let child = self.parse_prim(trimmed, line_num)?;
                prim.children.push(child);
                continue;
            }

            // timeSamples, variantSets and other nested blocks
            if brace_depth(trimmed) > 0 {
                log::trace!("Skipping block at line {}: {}", line_num, trimmed);
                self.skip_block(line_num, trimmed)?;
                continue;
            }

            let statement = self.collect_statement(trimmed, line_num)?;
            if let Some(attribute) = parse_attribute(&statement)? {
                prim.set_attribute(attribute);
            }
        }
    }

    fn apply_prim_metadata(&self, prim: &mut PrimSpec, content: &str) -> ParseResult<()> {
        for entry in metadata_entries(content) {
            let Some(eq) = find_assignment(entry) else {
                continue;
            };
            let mut words = entry[..eq].split_whitespace().collect::<Vec<_>>();
            let value = entry[eq + 1..].trim();

            let Some(key) = words.pop() else {
                return Err(self.error(format!("Missing metadata key: {}", entry)));
            };
            let op = match words.first().copied() {
                Some("prepend") => ListOp::Prepend,
                Some("append") => ListOp::Append,
                Some("delete") | Some("add") | Some("reorder") => {
                    log::trace!("Ignoring {} list edit on {}", words[0], key);
                    continue;
                }
                _ => ListOp::Explicit,
            };

            match key {
                "references" => {
                    prim.references = parse_arcs(value)?;
                    prim.reference_op = op;
                }
                "payload" | "payloads" => {
                    prim.payloads = parse_arcs(value)?;
                    prim.payload_op = op;
                }
                "kind" => prim.kind = Some(unquote(value)),
                _ => log::trace!("Ignoring prim metadata: {}", key),
            }
        }
        Ok(())
    }
}

/// Inner text of a `(...)`, `[...]` or `{...}` group.
fn inner(group: &str) -> Option<&str> {
    let group = group.trim();
    let close = match group.chars().next()? {
        '(' => ')',
        '[' => ']',
        '{' => '}',
        _ => return None,
    };
    group[1..].strip_suffix(close)
}

fn metadata_entries(content: &str) -> Vec<&str> {
    split_top_level(content, &['\n', ';'])
        .into_iter()
        .map(str::trim)
        .filter(|e| !e.is_empty() && !e.starts_with('#'))
        .collect()
}

fn starts_with_specifier(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .and_then(Specifier::from_keyword)
        .is_some()
}

/// Split `def Type "Name" rest` into its parts.
fn parse_prim_declaration(line: &str) -> Option<(Specifier, Option<String>, String, String)> {
    let line = line.trim();
    let keyword_end = line.find(char::is_whitespace)?;
    let specifier = Specifier::from_keyword(&line[..keyword_end])?;
    let rest = line[keyword_end..].trim_start();

    let (type_name, rest) = if rest.starts_with('"') {
        (None, rest)
    } else {
        let type_end = rest.find(|c: char| c.is_whitespace() || c == '"')?;
        (Some(rest[..type_end].to_string()), rest[type_end..].trim_start())
    };

    let after_quote = rest.strip_prefix('"')?;
    let name_end = after_quote.find('"')?;
    let name = after_quote[..name_end].to_string();
    let rest = after_quote[name_end + 1..].trim().to_string();

    Some((specifier, type_name, name, rest))
}

/// Parse `@a@</P>` or `[@a@, @b@]` into arcs.
fn parse_arcs(value: &str) -> ParseResult<Vec<Reference>> {
    let value = value.trim();
    if value == "None" {
        return Ok(Vec::new());
    }
    let list = if value.starts_with('[') {
        inner(value).ok_or_else(|| ParseError::InvalidValue(value.to_string()))?
    } else {
        value
    };

    let mut arcs = Vec::new();
    for item in split_top_level(list, &[',']) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let segs = segments(item);
        let asset_path = segs
            .iter()
            .find(|s| s.kind == SegmentKind::Asset)
            .map(|s| item[s.start..s.end].to_string())
            .unwrap_or_default();

        let prim_path = code_chars(item)
            .iter()
            .find(|(_, c)| *c == '<')
            .and_then(|&(open, _)| {
                let close = item[open..].find('>')?;
                Some(item[open + 1..open + close].to_string())
            });

        arcs.push(Reference {
            asset_path,
            prim_path,
        });
    }
    Ok(arcs)
}

/// Parse an attribute statement. Relationships, connections and other
/// property kinds return `None`.
fn parse_attribute(statement: &str) -> ParseResult<Option<Attribute>> {
    let (decl, value_text) = match find_assignment(statement) {
        Some(eq) => (&statement[..eq], Some(statement[eq + 1..].trim())),
        None => (statement, None),
    };

    let mut words: Vec<&str> = decl.split_whitespace().collect();
    let mut variability = Variability::Varying;

    // Qualifiers before the type name
    while let Some(&word) = words.first() {
        match word {
            "custom" | "varying" => {
                words.remove(0);
            }
            "uniform" => {
                variability = Variability::Uniform;
                words.remove(0);
            }
            _ => break,
        }
    }

    let [type_name, name] = words[..] else {
        return Ok(None);
    };
    if type_name == "rel" || name.contains('.') {
        return Ok(None);
    }

    let value = match value_text {
        Some(text) => Some(parse_value(type_name, leading_value(text))?),
        None => None,
    };

    Ok(Some(Attribute {
        name: name.to_string(),
        type_name: type_name.to_string(),
        variability,
        value,
    }))
}

/// The value itself, without trailing attribute metadata or comments.
fn leading_value(text: &str) -> &str {
    let text = text.trim();
    if text.starts_with('(') || text.starts_with('[') {
        return match matching_close(text) {
            Some(end) => &text[..=end],
            None => text,
        };
    }

    let segs = segments(text);
    match segs.first() {
        Some(seg) if seg.kind == SegmentKind::Quoted => &text[..seg.end],
        Some(seg) if seg.kind == SegmentKind::Asset => {
            let close = segs.get(1).map_or(text.len(), |s| s.start);
            let end = text[seg.end..close]
                .find(|c: char| c != '@')
                .map_or(close, |i| seg.end + i);
            &text[..end]
        }
        _ => text.split_whitespace().next().unwrap_or_default(),
    }
}

fn parse_value(type_name: &str, text: &str) -> ParseResult<Value> {
    let value = match type_name {
        "bool" => Value::Bool(matches!(text, "true" | "1")),
        "int" | "int64" | "uint" | "uint64" | "uchar" => Value::Int(
            text.parse()
                .map_err(|_| ParseError::InvalidNumber(text.to_string()))?,
        ),
        "float" | "half" => Value::Float(parse_number(text)? as f32),
        "double" | "timecode" => Value::Double(parse_number(text)?),
        "double3" | "point3d" | "vector3d" | "normal3d" | "color3d" => {
            let [x, y, z] = parse_tuple3(text)?;
            Value::Double3(DVec3::new(x, y, z))
        }
        "float3" | "point3f" | "vector3f" | "normal3f" | "color3f" | "half3" => {
            let [x, y, z] = parse_tuple3(text)?;
            Value::Float3(Vec3::new(x as f32, y as f32, z as f32))
        }
        "token" => Value::Token(unquote(text)),
        "string" => Value::String(unquote(text)),
        "asset" => match asset_literal(text) {
            Some(path) => Value::Asset(path),
            None => Value::Raw(text.to_string()),
        },
        "int[]" => Value::IntArray(
            list_items(text)?
                .into_iter()
                .map(|item| {
                    item.parse()
                        .map_err(|_| ParseError::InvalidNumber(item.to_string()))
                })
                .collect::<ParseResult<_>>()?,
        ),
        "token[]" | "string[]" => {
            Value::TokenArray(list_items(text)?.into_iter().map(unquote).collect())
        }
        "point3f[]" | "float3[]" | "vector3f[]" | "normal3f[]" | "color3f[]" => Value::Point3fArray(
            list_items(text)?
                .into_iter()
                .map(|item| {
                    parse_tuple3(item).map(|[x, y, z]| Vec3::new(x as f32, y as f32, z as f32))
                })
                .collect::<ParseResult<_>>()?,
        ),
        _ => Value::Raw(text.to_string()),
    };
    Ok(value)
}

/// Items of a `[a, b, c]` list.
fn list_items(text: &str) -> ParseResult<Vec<&str>> {
    let body = match inner(text) {
        Some(body) if text.trim_start().starts_with('[') => body,
        _ => return Err(ParseError::InvalidValue(text.to_string())),
    };
    Ok(split_top_level(body, &[','])
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect())
}

/// The literal of a single `@...@` or `@@@...@@@` asset value.
fn asset_literal(text: &str) -> Option<String> {
    let text = text.trim();
    let seg = segments(text).into_iter().next()?;
    (seg.kind == SegmentKind::Asset).then(|| text[seg.start..seg.end].to_string())
}

fn parse_tuple3(text: &str) -> ParseResult<[f64; 3]> {
    let text = text.trim();
    if !text.starts_with('(') {
        return Err(ParseError::InvalidNumber(text.to_string()));
    }
    let body = inner(text).ok_or_else(|| ParseError::InvalidNumber(text.to_string()))?;
    let parts: Vec<&str> = split_top_level(body, &[',']);
    match parts[..] {
        [x, y, z] => Ok([parse_number(x)?, parse_number(y)?, parse_number(z)?]),
        _ => Err(ParseError::InvalidNumber(text.to_string())),
    }
}

fn parse_number(text: &str) -> ParseResult<f64> {
    let text = text.trim();
    text.parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber(text.to_string()))
}

/// Strip quotes from a string or token and resolve escapes.
fn unquote(text: &str) -> String {
    let text = text.trim();
    let body = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|q| {
            if text.len() >= 2 * q.len() {
                text.strip_prefix(q)?.strip_suffix(q)
            } else {
                None
            }
        })
        .unwrap_or(text);

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse USDA content (convenience function).
pub fn parse_usda(content: &str) -> ParseResult<Layer> {
    let mut parser = UsdaParser::new(content);
    parser.parse()
}

/// Read and parse a USDA file.
pub fn read_usda<P: AsRef<Path>>(path: P) -> ParseResult<Layer> {
    let content = std::fs::read_to_string(path)?;
    parse_usda(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference_and_translate() {
        let usda = r#"#usda 1.0

def Xform "Root" (
    prepend references = @/assets/model.usd@
)
{
    double3 xformOp:translate = (1, 2, 3)
    uniform token[] xformOpOrder = ["xformOp:translate"]
}
"#;

        let layer = parse_usda(usda).unwrap();
        assert_eq!(layer.root_prims.len(), 1);

        let root = &layer.root_prims[0];
        assert_eq!(root.name, "Root");
        assert_eq!(root.type_name.as_deref(), Some("Xform"));
        assert_eq!(root.reference_op, ListOp::Prepend);
        assert_eq!(root.references, vec![Reference::new("/assets/model.usd")]);

        let translate = root.attribute("xformOp:translate").unwrap();
        assert_eq!(translate.value, Some(Value::Double3(DVec3::new(1.0, 2.0, 3.0))));

        let order = root.attribute("xformOpOrder").unwrap();
        assert_eq!(order.variability, Variability::Uniform);
        assert_eq!(
            order.value,
            Some(Value::TokenArray(vec!["xformOp:translate".to_string()]))
        );
    }

    #[test]
    fn test_parse_layer_metadata() {
        let usda = r#"#usda 1.0
(
    defaultPrim = "World"
    doc = """Exported
scene"""
    metersPerUnit = 0.01
    subLayers = [
        @./base.usda@,
        @../shared/lights.usda@
    ]
    upAxis = "Z"
)

def Xform "World"
{
}
"#;

        let layer = parse_usda(usda).unwrap();
        assert_eq!(layer.metadata.default_prim.as_deref(), Some("World"));
        assert_eq!(layer.metadata.doc.as_deref(), Some("Exported\nscene"));
        assert_eq!(layer.metadata.meters_per_unit, Some(0.01));
        assert_eq!(layer.metadata.up_axis.as_deref(), Some("Z"));
        assert_eq!(
            layer.metadata.sub_layers,
            vec!["./base.usda".to_string(), "../shared/lights.usda".to_string()]
        );
    }

    #[test]
    fn test_parse_nested_prims_and_arrays() {
        let usda = r#"#usda 1.0

def Xform "World" (
    kind = "assembly"
)
{
    def BasisCurves "Curve"
    {
        int[] curveVertexCounts = [3]
        point3f[] points = [
            (0, 0, 0),
            (1, 0.5, 0),
            (2, 0, -1)
        ]
        uniform token type = "cubic"
        rel material:binding = </World/Looks/Red>
        float3 xformOp:scale.timeSamples = {
            0: (1, 1, 1),
        }
    }

    def "Child" (references = [@a.usda@</A>, @b.usda@])
    {
    }
}
"#;

        let layer = parse_usda(usda).unwrap();
        let world = &layer.root_prims[0];
        assert_eq!(world.kind.as_deref(), Some("assembly"));
        assert_eq!(world.children.len(), 2);

        let curve = world.child("Curve").unwrap();
        assert_eq!(
            curve.attribute("curveVertexCounts").unwrap().value,
            Some(Value::IntArray(vec![3]))
        );
        assert_eq!(
            curve.attribute("points").unwrap().value,
            Some(Value::Point3fArray(vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.5, 0.0),
                Vec3::new(2.0, 0.0, -1.0),
            ]))
        );
        assert_eq!(
            curve.attribute("type").unwrap().value,
            Some(Value::Token("cubic".to_string()))
        );
        assert!(curve.attribute("material:binding").is_none());
        assert_eq!(curve.attributes.len(), 3);

        let child = world.child("Child").unwrap();
        assert!(child.type_name.is_none());
        assert_eq!(child.reference_op, ListOp::Explicit);
        assert_eq!(
            child.references,
            vec![
                Reference::new("a.usda").with_prim_path("/A"),
                Reference::new("b.usda"),
            ]
        );
    }

    #[test]
    fn test_parse_inline_prim() {
        let usda = "#usda 1.0\ndef Xform \"A\" { double3 xformOp:translate = (0, 0, 5) }\n";
        let layer = parse_usda(usda).unwrap();
        let prim = &layer.root_prims[0];
        assert_eq!(
            prim.attribute("xformOp:translate").unwrap().value,
            Some(Value::Double3(DVec3::new(0.0, 0.0, 5.0)))
        );
    }

    #[test]
    fn test_parse_non_finite_double3() {
        let usda = "#usda 1.0\ndef Xform \"A\"\n{\n    double3 xformOp:translate = (nan, inf, -inf)\n}\n";
        let layer = parse_usda(usda).unwrap();
        let Some(Value::Double3(v)) = layer.root_prims[0]
            .attribute("xformOp:translate")
            .and_then(|a| a.value.clone())
        else {
            panic!("expected double3");
        };
        assert!(v.x.is_nan());
        assert_eq!(v.y, f64::INFINITY);
        assert_eq!(v.z, f64::NEG_INFINITY);
    }

    #[test]
    fn test_unclosed_prim() {
        let usda = "#usda 1.0\ndef Xform \"A\"\n{\n    double x = 1\n";
        assert!(matches!(parse_usda(usda), Err(ParseError::UnclosedBlock(2))));
    }

    #[test]
    fn test_invalid_number() {
        let usda = "#usda 1.0\ndef Xform \"A\"\n{\n    double3 xformOp:translate = (1, two, 3)\n}\n";
        assert!(matches!(parse_usda(usda), Err(ParseError::InvalidNumber(_))));
    }

    #[test]
    fn test_scan_asset_paths() {
        let usda = r#"#usda 1.0
(
    subLayers = [@./base.usda@]
)

def Xform "Root" (
    prepend payload = @./heavy.usdc@
    prepend references = @./model.usda@</Model>
)
{
    # @not_an_asset.usda@ in a comment
    string note = "@also_not@"
    asset inputs:file = @textures/albedo.png@
}
"#;

        let refs = scan_asset_paths(usda);
        let found: Vec<(&str, AssetContext, usize)> = refs
            .iter()
            .map(|r| (r.literal.as_str(), r.context, r.line))
            .collect();
        assert_eq!(
            found,
            vec![
                ("./base.usda", AssetContext::SubLayer, 3),
                ("./heavy.usdc", AssetContext::Payload, 7),
                ("./model.usda", AssetContext::Reference, 8),
                ("textures/albedo.png", AssetContext::Attribute, 13),
            ]
        );
    }

    #[test]
    fn test_rewrite_asset_paths() {
        let usda = "def \"A\" (\n    references = [@/abs/model.usda@</M>, @keep.usda@]\n)\n{\n}\n";
        let mut map = HashMap::new();
        map.insert("/abs/model.usda".to_string(), "external/model.usda".to_string());

        let rewritten = rewrite_asset_paths(usda, &map);
        assert_eq!(
            rewritten,
            "def \"A\" (\n    references = [@external/model.usda@</M>, @keep.usda@]\n)\n{\n}\n"
        );
    }

    #[test]
    fn test_triple_delimited_asset_paths() {
        let usda = r#"#usda 1.0

def Xform "Root" (
    prepend references = @@@/data/user@host/scene.usd@@@
)
{
    asset inputs:file = @@@tex@2x.png@@@
}
"#;

        let layer = parse_usda(usda).unwrap();
        let root = &layer.root_prims[0];
        assert_eq!(root.references, vec![Reference::new("/data/user@host/scene.usd")]);
        assert_eq!(
            root.attribute("inputs:file").unwrap().value,
            Some(Value::Asset("tex@2x.png".to_string()))
        );
    }

    #[test]
    fn test_rewrite_switches_delimiters() {
        let usda = "def \"A\" (\n    references = @@@a@b.usda@@@\n)\n{\n    asset f = @/abs/t.png@\n}\n";
        let mut map = HashMap::new();
        map.insert("a@b.usda".to_string(), "plain.usda".to_string());
        map.insert("/abs/t.png".to_string(), "external/t@1.png".to_string());

        let rewritten = rewrite_asset_paths(usda, &map);
        assert_eq!(
            rewritten,
            "def \"A\" (\n    references = @plain.usda@\n)\n{\n    asset f = @@@external/t@1.png@@@\n}\n"
        );
    }

    #[test]
    fn test_malformed_values_are_errors() {
        for value in ["int[] a = é", "token[] t = é", "int[] a = [1, 2", "double3 d = (1, 2, é"] {
            let usda = format!("#usda 1.0\ndef Xform \"A\"\n{{\n    {}\n}}\n", value);
            assert!(parse_usda(&usda).is_err(), "{}", value);
        }

        let usda = "#usda 1.0\ndef \"A\" (\n    references = [@a.usda@] é\n)\n{\n}\n";
        assert!(matches!(parse_usda(usda), Err(ParseError::InvalidValue(_))));
    }

    #[test]
    fn test_inner_requires_matching_brackets() {
        assert_eq!(inner("[1, 2]"), Some("1, 2"));
        assert_eq!(inner(" (x) "), Some("x"));
        assert_eq!(inner("é"), None);
        assert_eq!(inner("[é"), None);
        assert_eq!(inner(""), None);
    }

    #[test]
    fn test_detect_layer_format() {
        assert_eq!(detect_layer_format(b"#usda 1.0\n"), LayerFormat::Usda);
        assert_eq!(detect_layer_format(b"PXR-USDC\0\0"), LayerFormat::Usdc);
        assert_eq!(detect_layer_format(b"\x89PNG"), LayerFormat::Other);
    }
}
