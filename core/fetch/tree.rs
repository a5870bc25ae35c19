use crate::error::Result;
use crate::fetch::FetchContext;
use crate::matcher;
use crate::model::TreeSource;

/// Emits only the rendered structural visualization of the match set, no
/// file content.
pub(crate) fn fetch(source: &TreeSource, ctx: &FetchContext) -> Result<String> {
    let result = matcher::find(
        &source.filter,
        &source.directories,
        &source.files,
        ctx.base_path,
        &source.options,
    )?;
    Ok(result.tree_view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CommandGitRunner, RepoCache, ReqwestClient};
    use crate::compile::CancelToken;
    use crate::model::{SourceCommon, TreeOptions};
    use crate::modifier::ModifierRegistry;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn tree_source_emits_structure_without_content() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn x() {}\n").unwrap();

        let registry = ModifierRegistry::new();
        let http = ReqwestClient::new().unwrap();
        let git = CommandGitRunner::new();
        let repo_cache = RepoCache::new();
        let cancel = CancelToken::new();
        let ctx = FetchContext {
            base_path: dir.path(),
            registry: &registry,
            http: &http,
            git: &git,
            repo_cache: &repo_cache,
            cancel: &cancel,
        };

        let source = TreeSource {
            common: SourceCommon::default(),
            directories: vec![PathBuf::from(".")],
            files: vec![],
            filter: Default::default(),
            options: TreeOptions::default(),
        };
        let out = fetch(&source, &ctx).unwrap();
        assert!(out.contains("└── lib.rs") || out.contains("├── lib.rs"));
        assert!(!out.contains("pub fn x()"));
    }
}
