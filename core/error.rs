use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// Errors produced by the compilation engine.
///
/// Variants fall into three groups with different propagation rules:
/// configuration errors (`Config`, `Glob`, `Regex`, `Filter`, `Selector`)
/// and fetch errors (`Http`, `HttpStatus`, `Git`, `FileRead`, `DataLoading`)
/// are recorded per source and never abort a document, while write-side
/// errors (`FileWrite`, `DirCreation`, `Io`) and `Cancelled` propagate to
/// the caller of `compile`.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Glob Pattern Error: {0}")]
    Glob(String),

    #[error("Regex Pattern Error: {0}")]
    Regex(String),

    #[error("Filter Error: {0}")]
    Filter(String),

    #[error("CSS Selector Error: {0}")]
    Selector(String),

    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File Read Error: Path '{path}', Error: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File Write Error: Path '{path}', Error: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory Creation Error: Path '{path}', Error: {source}")]
    DirCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Walk Error: {0}")]
    Walk(String),

    #[error("Ignore Error: {0}")]
    Ignore(#[from] ignore::Error),

    #[error("HTTP Error: {0}")]
    Http(String),

    #[error("HTTP status code {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Git Error: {0}")]
    Git(String),

    #[error("Data Loading Error: {0}")]
    DataLoading(String),

    #[error("Manifest Error: {0}")]
    Manifest(String),

    #[error("Duration Parsing Error: {0}")]
    DurationParse(String),

    #[error("Compilation cancelled")]
    Cancelled,
}

impl From<globset::Error> for AppError {
    fn from(err: globset::Error) -> Self {
        AppError::Glob(format!("Globset error: {}", err))
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        AppError::Regex(err.to_string())
    }
}

impl From<walkdir::Error> for AppError {
    fn from(err: walkdir::Error) -> Self {
        AppError::Walk(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Http(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Manifest(err.to_string())
    }
}

impl From<parse_duration::parse::Error> for AppError {
    fn from(err: parse_duration::parse::Error) -> Self {
        AppError::DurationParse(err.to_string())
    }
}
