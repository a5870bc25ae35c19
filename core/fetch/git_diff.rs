use crate::error::{AppError, Result};
use crate::fetch::{FetchContext, resolve};
use crate::model::GitDiffSource;

/// Materializes the diff between two revisions. Repository validity is
/// memoized in the context's `RepoCache`, shared across sources and
/// concurrently compiling documents.
pub(crate) fn fetch(source: &GitDiffSource, ctx: &FetchContext) -> Result<String> {
    let repo = resolve(&source.repository, ctx.base_path);
    let valid = ctx
        .repo_cache
        .validate(&repo, || ctx.git.is_repository(&repo))?;
    if !valid {
        return Err(AppError::Git(format!(
            "Not a git repository: {}",
            repo.display()
        )));
    }
    log::debug!(
        "Materializing diff {}..{} in {}",
        source.from,
        source.to,
        repo.display()
    );
    ctx.git.diff(&repo, &source.from, &source.to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{GitRunner, HttpClient, HttpResponse, RepoCache};
    use crate::compile::CancelToken;
    use crate::model::SourceCommon;
    use crate::modifier::ModifierRegistry;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoHttp;
    impl HttpClient for NoHttp {
        fn get(&self, url: &str, _headers: &[(String, String)]) -> Result<HttpResponse> {
            Err(AppError::Http(format!("unexpected request to {}", url)))
        }
    }

    struct FakeGit {
        valid: bool,
        validations: AtomicUsize,
    }

    impl FakeGit {
        fn new(valid: bool) -> Self {
            FakeGit {
                valid,
                validations: AtomicUsize::new(0),
            }
        }
    }

    impl GitRunner for FakeGit {
        fn is_repository(&self, _path: &Path) -> Result<bool> {
            self.validations.fetch_add(1, Ordering::SeqCst);
            Ok(self.valid)
        }
        fn diff(&self, _path: &Path, from: &str, to: &str) -> Result<String> {
            Ok(format!("diff of {}..{}\n", from, to))
        }
    }

    fn source() -> GitDiffSource {
        GitDiffSource {
            common: SourceCommon::default(),
            repository: PathBuf::from("repo"),
            from: "v1".to_string(),
            to: "HEAD".to_string(),
        }
    }

    fn ctx<'a>(
        git: &'a FakeGit,
        http: &'a NoHttp,
        registry: &'a ModifierRegistry,
        repo_cache: &'a RepoCache,
        cancel: &'a CancelToken,
    ) -> FetchContext<'a> {
        FetchContext {
            base_path: Path::new("/base"),
            registry,
            http,
            git,
            repo_cache,
            cancel,
        }
    }

    #[test]
    fn diff_is_returned_for_valid_repositories() {
        let git = FakeGit::new(true);
        let http = NoHttp;
        let registry = ModifierRegistry::new();
        let repo_cache = RepoCache::new();
        let cancel = CancelToken::new();
        let ctx = ctx(&git, &http, &registry, &repo_cache, &cancel);
        let out = fetch(&source(), &ctx).unwrap();
        assert_eq!(out, "diff of v1..HEAD\n");
    }

    #[test]
    fn invalid_repository_is_an_error() {
        let git = FakeGit::new(false);
        let http = NoHttp;
        let registry = ModifierRegistry::new();
        let repo_cache = RepoCache::new();
        let cancel = CancelToken::new();
        let ctx = ctx(&git, &http, &registry, &repo_cache, &cancel);
        assert!(fetch(&source(), &ctx).is_err());
    }

    #[test]
    fn validation_is_cached_across_fetches() {
        let git = FakeGit::new(true);
        let http = NoHttp;
        let registry = ModifierRegistry::new();
        let repo_cache = RepoCache::new();
        let cancel = CancelToken::new();
        let ctx = ctx(&git, &http, &registry, &repo_cache, &cancel);
        fetch(&source(), &ctx).unwrap();
        fetch(&source(), &ctx).unwrap();
        assert_eq!(git.validations.load(Ordering::SeqCst), 1);
    }
}
