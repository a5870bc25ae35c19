use crate::error::{AppError, Result};
use crate::modifier::{Modifier, ModifierOptions};
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

/// Structural filter: parses a file into a flat member list, applies
/// name/regex/visibility filters and optional stripping, then re-renders.
/// The per-language parser is pluggable; a Rust parser is built in.
pub struct StructuralFilter {
    parsers: Vec<Arc<dyn MemberParser>>,
}

/// One top-level member of a parsed file.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub kind: MemberKind,
    pub visibility: Visibility,
    pub body: String,
    pub attributes: Vec<String>,
    pub docs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Function,
    Struct,
    Enum,
    Union,
    Trait,
    Impl,
    Module,
    TypeAlias,
    Const,
    Static,
    Macro,
    Use,
    Other,
}

impl MemberKind {
    /// Glue members carry no meaningful name and are never name-filtered.
    fn is_glue(&self) -> bool {
        matches!(self, MemberKind::Use | MemberKind::Other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Crate,
    Private,
}

impl Visibility {
    fn label(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Crate => "crate",
            Visibility::Private => "private",
        }
    }
}

/// Language-specific collaborator: splits a file into members and renders a
/// member list back to text.
pub trait MemberParser: Send + Sync {
    fn language(&self) -> &'static str;
    fn supports(&self, extension: &str) -> bool;
    fn parse(&self, content: &str) -> Result<Vec<Member>>;
    fn render(&self, members: &[Member]) -> String;
}

#[derive(Debug, Deserialize, Default)]
struct StructuralConfig {
    #[serde(default)]
    include_names: Vec<String>,
    #[serde(default)]
    exclude_names: Vec<String>,
    #[serde(default)]
    include_pattern: Option<String>,
    #[serde(default)]
    exclude_pattern: Option<String>,
    /// Allowed visibilities (`public`, `crate`, `private`); empty = all.
    #[serde(default)]
    visibility: Vec<String>,
    #[serde(default)]
    strip_bodies: bool,
    #[serde(default)]
    strip_docs: bool,
    #[serde(default)]
    strip_attributes: bool,
    /// Selects the parser when several are registered.
    #[serde(default)]
    language: Option<String>,
}

impl StructuralFilter {
    pub fn new() -> Self {
        StructuralFilter {
            parsers: vec![Arc::new(RustMemberParser)],
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn MemberParser>) -> Self {
        self.parsers.push(parser);
        self
    }

    fn parser_for(&self, config: &StructuralConfig) -> Result<&Arc<dyn MemberParser>> {
        match &config.language {
            Some(language) => self
                .parsers
                .iter()
                .find(|p| p.language() == language)
                .ok_or_else(|| {
                    AppError::Config(format!("No structural parser for language \"{}\"", language))
                }),
            None => self
                .parsers
                .first()
                .ok_or_else(|| AppError::Config("No structural parsers registered".to_string())),
        }
    }
}

impl Default for StructuralFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Modifier for StructuralFilter {
    fn supports(&self, extension: &str) -> bool {
        self.parsers.iter().any(|p| p.supports(extension))
    }

    fn modify(&self, content: &str, options: &ModifierOptions) -> Result<String> {
        let config: StructuralConfig =
            serde_json::from_value(serde_json::to_value(options).map_err(|e| {
                AppError::Config(format!("Invalid structural filter options: {}", e))
            })?)
            .map_err(|e| AppError::Config(format!("Invalid structural filter options: {}", e)))?;

        let include_regex = config
            .include_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| AppError::Regex(e.to_string()))?;
        let exclude_regex = config
            .exclude_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| AppError::Regex(e.to_string()))?;

        let parser = self.parser_for(&config)?;
        let members = parser.parse(content)?;

        let mut kept: Vec<Member> = Vec::new();
        for mut member in members {
            if !member.kind.is_glue() {
                if !config.visibility.is_empty()
                    && !config
                        .visibility
                        .iter()
                        .any(|v| v == member.visibility.label())
                {
                    continue;
                }
                if member_excluded(&member, &config.exclude_names, exclude_regex.as_ref()) {
                    continue;
                }
                let has_includes =
                    !config.include_names.is_empty() || include_regex.is_some();
                if has_includes
                    && !member_included(&member, &config.include_names, include_regex.as_ref())
                {
                    continue;
                }
            }

            if config.strip_docs {
                member.docs.clear();
            }
            if config.strip_attributes {
                member.attributes.clear();
            }
            if config.strip_bodies {
                member.body = strip_function_bodies(&member.body);
            }
            kept.push(member);
        }

        Ok(parser.render(&kept))
    }
}

fn member_included(member: &Member, names: &[String], regex: Option<&Regex>) -> bool {
    names.iter().any(|n| n == &member.name)
        || regex.is_some_and(|r| r.is_match(&member.name))
}

fn member_excluded(member: &Member, names: &[String], regex: Option<&Regex>) -> bool {
    names.iter().any(|n| n == &member.name)
        || regex.is_some_and(|r| r.is_match(&member.name))
}

/// Replaces the brace block after each `fn` signature with `{ ... }`. Works
/// on nested members too, so impl and trait blocks keep their signatures.
fn strip_function_bodies(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < bytes.len() {
        if let Some(sig_end) = function_body_start(text, i) {
            out.push_str(&text[i..=sig_end]);
            // sig_end points at the opening brace.
            let mut depth = 1usize;
            let mut j = sig_end + 1;
            let mut in_string = false;
            while j < bytes.len() && depth > 0 {
                let c = bytes[j] as char;
                match c {
                    '"' if !in_string => in_string = true,
                    '"' if in_string && bytes[j - 1] != b'\\' => in_string = false,
                    '{' if !in_string => depth += 1,
                    '}' if !in_string => depth -= 1,
                    _ => {}
                }
                j += 1;
            }
            out.push_str(" ... }");
            i = j;
        } else {
            break;
        }
    }
    out.push_str(&text[i.min(text.len())..]);
    out
}

/// Finds the next `fn` signature at or after `from` and returns the byte
/// index of its opening brace, if any.
fn function_body_start(text: &str, from: usize) -> Option<usize> {
    static FN_SIG: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| {
        Regex::new(r"\bfn\s+\w+").unwrap()
    });
    let found = FN_SIG.find(&text[from..])?;
    let sig_start = from + found.start();
    let rest = &text[sig_start..];
    let mut depth = 0i32;
    for (offset, c) in rest.char_indices() {
        match c {
            '(' | '<' | '[' => depth += 1,
            ')' | '>' | ']' => depth -= 1,
            '{' if depth <= 0 => return Some(sig_start + offset),
            ';' if depth <= 0 => {
                // Bodyless signature (trait method); continue past it.
                return function_body_start(text, sig_start + offset + 1);
            }
            _ => {}
        }
    }
    None
}

/// Built-in top-level parser for Rust-like files. Brace balancing is
/// line-oriented and does not understand raw strings with braces.
pub struct RustMemberParser;

static ITEM_START: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| {
    Regex::new(
        r#"^(?P<vis>pub(?:\s*\([^)]*\))?\s+)?(?:(?:const|async|unsafe|extern\s+"[^"]*")\s+)*(?P<kw>fn|struct|enum|union|trait|impl|mod|type|const|static|macro_rules!|use)\b\s*(?P<name>[A-Za-z_][A-Za-z0-9_]*)?"#,
    )
    .unwrap()
});

impl MemberParser for RustMemberParser {
    fn language(&self) -> &'static str {
        "rust"
    }

    fn supports(&self, extension: &str) -> bool {
        extension == "rs"
    }

    fn parse(&self, content: &str) -> Result<Vec<Member>> {
        let lines: Vec<&str> = content.lines().collect();
        let mut members: Vec<Member> = Vec::new();
        let mut docs: Vec<String> = Vec::new();
        let mut attributes: Vec<String> = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            let trimmed = line.trim_start();

            if trimmed.is_empty() {
                i += 1;
                continue;
            }
            if trimmed.starts_with("///") || trimmed.starts_with("//!") {
                docs.push(line.to_string());
                i += 1;
                continue;
            }
            if trimmed.starts_with("#[") || trimmed.starts_with("#![") {
                attributes.push(line.to_string());
                i += 1;
                continue;
            }

            if let Some(caps) = ITEM_START.captures(trimmed) {
                let keyword = caps.name("kw").map(|m| m.as_str()).unwrap_or_default();
                let end = item_end(&lines, i);
                let body = lines[i..=end].join("\n");
                let visibility = match caps.name("vis").map(|m| m.as_str().trim()) {
                    Some(v) if v.starts_with("pub(") || v.starts_with("pub (") => Visibility::Crate,
                    Some(_) => Visibility::Public,
                    None => Visibility::Private,
                };
                let name = if keyword == "impl" {
                    impl_name(trimmed)
                } else {
                    caps.name("name")
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default()
                };
                members.push(Member {
                    name,
                    kind: keyword_kind(keyword),
                    visibility,
                    body,
                    attributes: std::mem::take(&mut attributes),
                    docs: std::mem::take(&mut docs),
                });
                i = end + 1;
                continue;
            }

            // Anything unrecognized at the top level is kept as glue.
            members.push(Member {
                name: String::new(),
                kind: MemberKind::Other,
                visibility: Visibility::Private,
                body: line.to_string(),
                attributes: std::mem::take(&mut attributes),
                docs: std::mem::take(&mut docs),
            });
            i += 1;
        }

        Ok(members)
    }

    fn render(&self, members: &[Member]) -> String {
        let mut blocks: Vec<String> = Vec::new();
        for member in members {
            let mut block = String::new();
            for doc in &member.docs {
                block.push_str(doc);
                block.push('\n');
            }
            for attr in &member.attributes {
                block.push_str(attr);
                block.push('\n');
            }
            block.push_str(&member.body);
            blocks.push(block);
        }
        let mut out = blocks.join("\n\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

fn keyword_kind(keyword: &str) -> MemberKind {
    match keyword {
        "fn" => MemberKind::Function,
        "struct" => MemberKind::Struct,
        "enum" => MemberKind::Enum,
        "union" => MemberKind::Union,
        "trait" => MemberKind::Trait,
        "impl" => MemberKind::Impl,
        "mod" => MemberKind::Module,
        "type" => MemberKind::TypeAlias,
        "const" => MemberKind::Const,
        "static" => MemberKind::Static,
        "macro_rules!" => MemberKind::Macro,
        "use" => MemberKind::Use,
        _ => MemberKind::Other,
    }
}

fn impl_name(line: &str) -> String {
    let after = line.trim_start().trim_start_matches("unsafe ");
    let after = after.strip_prefix("impl").unwrap_or(after);
    after
        .split('{')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Index of the last line of the item starting at `start`: the line closing
/// its brace block, or the first line ending in `;` when no block opens.
fn item_end(lines: &[&str], start: usize) -> usize {
    let mut depth = 0i64;
    let mut seen_brace = false;
    for (offset, line) in lines[start..].iter().enumerate() {
        for c in line.chars() {
            match c {
                '{' => {
                    depth += 1;
                    seen_brace = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if seen_brace && depth <= 0 {
            return start + offset;
        }
        if !seen_brace && line.trim_end().ends_with(';') {
            return start + offset;
        }
    }
    lines.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"use std::fmt;

/// A public thing.
#[derive(Debug)]
pub struct Widget {
    count: u32,
}

impl Widget {
    pub fn count(&self) -> u32 {
        self.count
    }
}

fn private_helper() -> u32 {
    42
}

pub fn entry() {
    private_helper();
}
"#;

    fn options(values: serde_json::Value) -> ModifierOptions {
        match values {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn parser_finds_top_level_members() {
        let members = RustMemberParser.parse(SAMPLE).unwrap();
        let names: Vec<(&str, MemberKind)> = members
            .iter()
            .map(|m| (m.name.as_str(), m.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("std", MemberKind::Use),
                ("Widget", MemberKind::Struct),
                ("Widget", MemberKind::Impl),
                ("private_helper", MemberKind::Function),
                ("entry", MemberKind::Function),
            ]
        );
        assert_eq!(members[1].visibility, Visibility::Public);
        assert_eq!(members[1].docs, vec!["/// A public thing."]);
        assert_eq!(members[1].attributes, vec!["#[derive(Debug)]"]);
        assert_eq!(members[3].visibility, Visibility::Private);
    }

    #[test]
    fn visibility_filter_keeps_public_members() {
        let filter = StructuralFilter::new();
        let out = filter
            .modify(SAMPLE, &options(json!({"visibility": ["public"]})))
            .unwrap();
        assert!(out.contains("pub struct Widget"));
        assert!(out.contains("pub fn entry"));
        assert!(!out.contains("fn private_helper"));
        // Glue members survive visibility filtering.
        assert!(out.contains("use std::fmt;"));
    }

    #[test]
    fn exclude_by_name_wins_over_include() {
        let filter = StructuralFilter::new();
        let out = filter
            .modify(
                SAMPLE,
                &options(json!({
                    "include_pattern": ".*",
                    "exclude_names": ["entry"]
                })),
            )
            .unwrap();
        assert!(!out.contains("pub fn entry"));
        assert!(out.contains("fn private_helper"));
    }

    #[test]
    fn strip_docs_and_attributes() {
        let filter = StructuralFilter::new();
        let out = filter
            .modify(
                SAMPLE,
                &options(json!({"strip_docs": true, "strip_attributes": true})),
            )
            .unwrap();
        assert!(!out.contains("/// A public thing."));
        assert!(!out.contains("#[derive(Debug)]"));
        assert!(out.contains("pub struct Widget"));
    }

    #[test]
    fn strip_bodies_keeps_signatures() {
        let filter = StructuralFilter::new();
        let out = filter
            .modify(SAMPLE, &options(json!({"strip_bodies": true})))
            .unwrap();
        assert!(out.contains("pub fn count(&self) -> u32 { ... }"));
        assert!(out.contains("pub fn entry() { ... }"));
        assert!(!out.contains("private_helper();"));
    }

    #[test]
    fn unknown_language_is_configuration_error() {
        let filter = StructuralFilter::new();
        let result = filter.modify(SAMPLE, &options(json!({"language": "cobol"})));
        assert!(result.is_err());
    }

    #[test]
    fn include_names_select_exact_members() {
        let filter = StructuralFilter::new();
        let out = filter
            .modify(SAMPLE, &options(json!({"include_names": ["Widget"]})))
            .unwrap();
        assert!(out.contains("pub struct Widget"));
        assert!(out.contains("impl Widget"));
        assert!(!out.contains("fn private_helper"));
    }
}
