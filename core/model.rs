use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// One compiled output artifact: an ordered list of sources plus the
/// destination the concatenated text is written to. Materialized by the
/// external configuration layer and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Document {
    pub description: String,
    pub output_path: PathBuf,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Fields shared by every source kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceCommon {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub modifiers: Vec<ModifierRef>,
}

/// A declarative pointer to one body of content. The tagged enum replaces
/// the string-keyed kind dispatch of the original design: dispatch is an
/// exhaustive match, so routing a source to the wrong fetcher is
/// unrepresentable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    File(FileSource),
    Url(UrlSource),
    Text(TextSource),
    Package(PackageSource),
    GitDiff(GitDiffSource),
    Tree(TreeSource),
}

impl Source {
    pub fn kind(&self) -> SourceKind {
        match self {
            Source::File(_) => SourceKind::File,
            Source::Url(_) => SourceKind::Url,
            Source::Text(_) => SourceKind::Text,
            Source::Package(_) => SourceKind::Package,
            Source::GitDiff(_) => SourceKind::GitDiff,
            Source::Tree(_) => SourceKind::Tree,
        }
    }

    pub fn common(&self) -> &SourceCommon {
        match self {
            Source::File(s) => &s.common,
            Source::Url(s) => &s.common,
            Source::Text(s) => &s.common,
            Source::Package(s) => &s.common,
            Source::GitDiff(s) => &s.common,
            Source::Tree(s) => &s.common,
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.common().description.as_deref()
    }

    pub fn modifiers(&self) -> &[ModifierRef] {
        &self.common().modifiers
    }
}

/// Discriminator for `Source`, kept addressable by its config-layer kind
/// string so new kinds stay declarable without touching the dispatcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    File,
    Url,
    Text,
    Package,
    GitDiff,
    Tree,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::File => "file",
            SourceKind::Url => "url",
            SourceKind::Text => "text",
            SourceKind::Package => "package",
            SourceKind::GitDiff => "git_diff",
            SourceKind::Tree => "tree",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(SourceKind::File),
            "url" => Ok(SourceKind::Url),
            "text" => Ok(SourceKind::Text),
            "package" => Ok(SourceKind::Package),
            "git_diff" | "gitdiff" => Ok(SourceKind::GitDiff),
            "tree" => Ok(SourceKind::Tree),
            other => Err(AppError::Config(format!("Unknown source kind: {}", other))),
        }
    }
}

/// Files matched under directories and/or listed explicitly, emitted with
/// `// Path:` headers and run through the modifier chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileSource {
    #[serde(flatten)]
    pub common: SourceCommon,
    #[serde(default)]
    pub directories: Vec<PathBuf>,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub filter: FilterSpec,
    /// Prefix the content with a rendered tree view of the match set.
    #[serde(default)]
    pub include_tree: bool,
    #[serde(default)]
    pub tree_options: TreeOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UrlSource {
    #[serde(flatten)]
    pub common: SourceCommon,
    #[serde(default)]
    pub urls: Vec<String>,
    /// Header values may reference environment variables as `${NAME}`.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Restrict extraction to elements matching this CSS selector.
    #[serde(default)]
    pub selector: Option<String>,
    /// Reduce HTML responses to readable text.
    #[serde(default)]
    pub clean_html: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TextSource {
    #[serde(flatten)]
    pub common: SourceCommon,
    pub content: String,
}

/// Workspace members resolved from a root manifest + lock file, each
/// delegated to the file fetcher behind a metadata block.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PackageSource {
    #[serde(flatten)]
    pub common: SourceCommon,
    /// Directory containing the root manifest and lock file.
    #[serde(default)]
    pub root: PathBuf,
    /// Glob patterns against package names; empty selects every package.
    #[serde(default)]
    pub name: Vec<String>,
    #[serde(default)]
    pub filter: FilterSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GitDiffSource {
    #[serde(flatten)]
    pub common: SourceCommon,
    #[serde(default)]
    pub repository: PathBuf,
    pub from: String,
    #[serde(default = "default_head")]
    pub to: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TreeSource {
    #[serde(flatten)]
    pub common: SourceCommon,
    #[serde(default)]
    pub directories: Vec<PathBuf>,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub filter: FilterSpec,
    #[serde(default)]
    pub options: TreeOptions,
}

/// Filter predicates for file matching. Every populated field must hold
/// (AND); multiple patterns inside one field are alternatives (OR).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FilterSpec {
    /// Glob patterns against the file name only.
    #[serde(default)]
    pub name: Vec<String>,
    /// Glob patterns against the path relative to the base path.
    #[serde(default)]
    pub path: Vec<String>,
    /// Exclusion globs; exclusion always wins over inclusion.
    #[serde(default)]
    pub not_path: Vec<String>,
    /// Regex patterns matched against file content (a plain substring is a
    /// valid regex).
    #[serde(default)]
    pub contains: Vec<String>,
    #[serde(default)]
    pub not_contains: Vec<String>,
    /// Size comparator, e.g. `"> 10K"` or `"<= 1MB"`.
    #[serde(default)]
    pub size: Option<String>,
    /// Modification-date comparator, e.g. `"since yesterday"` or
    /// `"before 2024-01-01"`.
    #[serde(default)]
    pub date: Option<String>,
    /// Cap on the returned file list; 0 = unlimited. The tree view is
    /// always rendered over the full match set.
    #[serde(default)]
    pub max_files: usize,
    #[serde(default)]
    pub ignore_unreadable_dirs: bool,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        *self == FilterSpec::default()
    }
}

/// Rendering options for the tree view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TreeOptions {
    #[serde(default)]
    pub show_size: bool,
    #[serde(default)]
    pub show_last_modified: bool,
    #[serde(default)]
    pub show_char_count: bool,
    /// When false only directories are rendered.
    #[serde(default = "default_true")]
    pub include_files: bool,
    /// Maximum rendered depth; 0 = unlimited.
    #[serde(default)]
    pub max_depth: usize,
}

impl Default for TreeOptions {
    fn default() -> Self {
        TreeOptions {
            show_size: false,
            show_last_modified: false,
            show_char_count: false,
            include_files: true,
            max_depth: 0,
        }
    }
}

/// Reference to a named modifier plus its free-form options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModifierRef {
    pub identifier: String,
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

/// One failed source, recorded in encounter order.
#[derive(Debug)]
pub struct SourceError {
    pub source: Source,
    pub cause: AppError,
}

/// Append-only, ordered collection of per-source failures attached to an
/// otherwise successful partial compile.
#[derive(Debug, Default)]
pub struct ErrorCollection {
    entries: Vec<SourceError>,
}

impl ErrorCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: Source, cause: AppError) {
        self.entries.push(SourceError { source, cause });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceError> {
        self.entries.iter()
    }
}

/// Result of compiling one document.
#[derive(Debug, Default)]
pub struct CompiledDocument {
    pub content: String,
    pub errors: ErrorCollection,
}

impl CompiledDocument {
    /// The empty result of a skipped document.
    pub fn skipped() -> Self {
        CompiledDocument::default()
    }
}

fn default_true() -> bool {
    true
}

fn default_head() -> String {
    "HEAD".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_round_trips_through_strings() {
        for kind in [
            SourceKind::File,
            SourceKind::Url,
            SourceKind::Text,
            SourceKind::Package,
            SourceKind::GitDiff,
            SourceKind::Tree,
        ] {
            assert_eq!(kind.as_str().parse::<SourceKind>().unwrap(), kind);
        }
        assert!("ftp".parse::<SourceKind>().is_err());
    }

    #[test]
    fn source_deserializes_from_tagged_toml() {
        let toml_str = r#"
            kind = "text"
            description = "greeting"
            content = "hello"
        "#;
        let source: Source = toml::from_str(toml_str).unwrap();
        assert_eq!(source.kind(), SourceKind::Text);
        assert_eq!(source.description(), Some("greeting"));
        match source {
            Source::Text(t) => assert_eq!(t.content, "hello"),
            other => panic!("expected text source, got {:?}", other),
        }
    }

    #[test]
    fn filter_spec_defaults_are_empty() {
        let spec: FilterSpec = toml::from_str("").unwrap();
        assert!(spec.is_empty());
        assert_eq!(spec.max_files, 0);
        assert!(!spec.ignore_unreadable_dirs);
    }

    #[test]
    fn tree_options_default_to_including_files() {
        let opts = TreeOptions::default();
        assert!(opts.include_files);
        assert_eq!(opts.max_depth, 0);
    }
}
