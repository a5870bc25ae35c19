use crate::client::{
    CommandGitRunner, Filesystem, GitRunner, HttpClient, RepoCache, ReqwestClient, StdFilesystem,
};
use crate::error::{AppError, Result};
use crate::fetch::{self, FetchContext};
use crate::model::{CompiledDocument, Document, ErrorCollection};
use crate::modifier::ModifierRegistry;
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Run-level cancellation signal. Cloning shares the flag; in-flight
/// compiles observe it between sources and inside multi-item fetchers.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AppError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Shared, reentrant state for one compile run. Collaborators are injected
/// once at construction; nothing in the engine reaches for globals.
pub struct CompileContext {
    pub base_path: PathBuf,
    pub registry: ModifierRegistry,
    http: Arc<dyn HttpClient>,
    git: Arc<dyn GitRunner>,
    fs: Arc<dyn Filesystem>,
    repo_cache: RepoCache,
    cancel: CancelToken,
}

impl CompileContext {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        Ok(CompileContext {
            base_path: base_path.into(),
            registry: ModifierRegistry::new(),
            http: Arc::new(ReqwestClient::new()?),
            git: Arc::new(CommandGitRunner::new()),
            fs: Arc::new(StdFilesystem),
            repo_cache: RepoCache::new(),
            cancel: CancelToken::new(),
        })
    }

    pub fn with_http(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = http;
        self
    }

    pub fn with_git(mut self, git: Arc<dyn GitRunner>) -> Self {
        self.git = git;
        self
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_registry(mut self, registry: ModifierRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn fetch_context(&self) -> FetchContext<'_> {
        FetchContext {
            base_path: &self.base_path,
            registry: &self.registry,
            http: self.http.as_ref(),
            git: self.git.as_ref(),
            repo_cache: &self.repo_cache,
            cancel: &self.cancel,
        }
    }
}

/// Compiler state for one document. `Skip` and `Done` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileState {
    Skip,
    Compiling,
    Done,
}

/// Compiles one document: fetches its sources in declared order, isolates
/// per-source failures as inline `Error:` markers plus recorded
/// `SourceError`s, normalizes the text and writes it to the resolved output
/// path. Only write-side failures and cancellation are returned as errors.
pub fn compile(document: &Document, ctx: &CompileContext) -> Result<CompiledDocument> {
    let output_path = if document.output_path.is_absolute() {
        document.output_path.clone()
    } else {
        ctx.base_path.join(&document.output_path)
    };

    if !document.overwrite && ctx.fs.exists(&output_path) {
        log::info!(
            "Document \"{}\" -> {:?}: output exists and overwrite is off",
            document.description,
            CompileState::Skip
        );
        return Ok(CompiledDocument::skipped());
    }

    let mut state = CompileState::Compiling;
    log::info!(
        "Document \"{}\" -> {:?} ({} sources)",
        document.description,
        state,
        document.sources.len()
    );

    let fetch_ctx = ctx.fetch_context();
    let mut content = format!("## DOCUMENT: {}\n\n", document.description);
    let mut errors = ErrorCollection::new();

    for source in &document.sources {
        ctx.cancel.check()?;
        if let Some(description) = source.description() {
            content.push_str("SOURCE: ");
            content.push_str(description);
            content.push('\n');
        }
        match fetch::fetch_source(source, &fetch_ctx) {
            Ok(text) => content.push_str(&text),
            Err(AppError::Cancelled) => return Err(AppError::Cancelled),
            Err(e) => {
                log::warn!(
                    "Source {}{} failed: {}",
                    source.kind(),
                    source
                        .description()
                        .map(|d| format!(" \"{}\"", d))
                        .unwrap_or_default(),
                    e
                );
                content.push_str("Error: ");
                content.push_str(&e.to_string());
                content.push('\n');
                errors.push(source.clone(), e);
            }
        }
        while content.ends_with('\n') {
            content.pop();
        }
        content.push_str("\n\n---\n\n");
    }

    let normalized = normalize_blank_lines(&content);

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            ctx.fs.ensure_dir(parent)?;
        }
    }
    ctx.fs.write(&output_path, &normalized)?;

    state = CompileState::Done;
    log::info!(
        "Document \"{}\" -> {:?} ({} bytes, {} source errors)",
        document.description,
        state,
        normalized.len(),
        errors.len()
    );
    Ok(CompiledDocument {
        content: normalized,
        errors,
    })
}

/// Compiles independent documents in parallel. Within each document the
/// source order stays strictly sequential; there is no cross-document
/// transaction, so documents written before a failure stay written.
pub fn compile_all(documents: &[Document], ctx: &CompileContext) -> Vec<Result<CompiledDocument>> {
    documents
        .par_iter()
        .map(|document| compile(document, ctx))
        .collect()
}

/// Strips lines that contain only whitespace down to empty lines.
pub(crate) fn normalize_blank_lines(text: &str) -> String {
    text.split('\n')
        .map(|line| if line.trim().is_empty() { "" } else { line })
        .collect::<Vec<_>>()
        .join("\n")
}
