pub mod client;
pub mod compile;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod matcher;
pub mod model;
pub mod modifier;
pub mod tree;

pub use client::{
    CommandGitRunner, Filesystem, GitRunner, HttpClient, HttpResponse, RepoCache, ReqwestClient,
    StdFilesystem,
};
pub use compile::{CancelToken, CompileContext, CompileState, compile, compile_all};
pub use error::{AppError, Result};
pub use matcher::{FinderResult, MatchedFile};
pub use model::{
    CompiledDocument, Document, ErrorCollection, FileSource, FilterSpec, GitDiffSource,
    ModifierRef, PackageSource, Source, SourceCommon, SourceError, SourceKind, TextSource,
    TreeOptions, TreeSource, UrlSource,
};
pub use modifier::{Modifier, ModifierOptions, ModifierRegistry};
