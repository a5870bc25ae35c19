use crate::client::{GitRunner, HttpClient, RepoCache};
use crate::compile::CancelToken;
use crate::error::Result;
use crate::model::Source;
use crate::modifier::ModifierRegistry;
use std::path::Path;

pub mod file;
pub mod git_diff;
pub mod package;
pub mod text;
pub mod tree;
pub mod url;

/// Everything a fetcher may need, passed explicitly so fetchers stay
/// stateless and reentrant across concurrently compiling documents.
pub struct FetchContext<'a> {
    pub base_path: &'a Path,
    pub registry: &'a ModifierRegistry,
    pub http: &'a dyn HttpClient,
    pub git: &'a dyn GitRunner,
    pub repo_cache: &'a RepoCache,
    pub cancel: &'a CancelToken,
}

/// Dispatches a source to its fetcher. The match is exhaustive over the
/// sealed `Source` enum, so a kind/fetcher mismatch cannot occur.
pub fn fetch_source(source: &Source, ctx: &FetchContext) -> Result<String> {
    log::debug!(
        "Fetching {} source{}",
        source.kind(),
        source
            .description()
            .map(|d| format!(" \"{}\"", d))
            .unwrap_or_default()
    );
    match source {
        Source::File(s) => file::fetch(s, ctx),
        Source::Url(s) => url::fetch(s, ctx),
        Source::Text(s) => text::fetch(s),
        Source::Package(s) => package::fetch(s, ctx),
        Source::GitDiff(s) => git_diff::fetch(s, ctx),
        Source::Tree(s) => tree::fetch(s, ctx),
    }
}

pub(crate) fn resolve(path: &Path, base_path: &Path) -> std::path::PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_path.join(path)
    }
}
