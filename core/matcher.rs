use crate::error::{AppError, Result};
use crate::filter::{ContentFilter, DatePredicate, SizePredicate};
use crate::model::{FilterSpec, TreeOptions};
use crate::tree;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// One matched file: absolute path plus its path relative to the base.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedFile {
    pub path: PathBuf,
    pub relative_path: PathBuf,
}

/// Output of a matching run. `tree_view` is always rendered over the full
/// match set, even when `max_files` truncated the returned list.
#[derive(Debug, Default)]
pub struct FinderResult {
    pub files: Vec<MatchedFile>,
    pub tree_view: String,
}

/// Selects files under `directories` plus the explicit `files`, deduplicated
/// and ordered by full path ascending. All populated predicates of `spec`
/// must hold; see `FilterSpec` for the per-field semantics.
pub fn find(
    spec: &FilterSpec,
    directories: &[PathBuf],
    files: &[PathBuf],
    base_path: &Path,
    tree_options: &TreeOptions,
) -> Result<FinderResult> {
    log::debug!(
        "Matching files under {} directories and {} explicit files (base: {})",
        directories.len(),
        files.len(),
        base_path.display()
    );

    let name_set = build_glob_set(&spec.name)?;
    let path_set = build_glob_set(&spec.path)?;
    let not_path_set = build_glob_set(&spec.not_path)?;
    let size_pred = spec.size.as_deref().map(SizePredicate::parse).transpose()?;
    let date_pred = spec.date.as_deref().map(DatePredicate::parse).transpose()?;
    let contains = ContentFilter::compile(&spec.contains)?;
    let not_contains = ContentFilter::compile(&spec.not_contains)?;

    // BTreeSet both deduplicates overlapping roots and yields the ascending
    // path order the output contract requires.
    let mut candidates: BTreeSet<PathBuf> = BTreeSet::new();

    for dir in directories {
        let root = resolve(dir, base_path);
        // Symlinked directories are not followed, so the walk cannot cycle.
        let walker = WalkBuilder::new(&root)
            .standard_filters(false)
            .follow_links(false)
            .build();
        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_some_and(|ft| ft.is_file()) {
                        candidates.insert(entry.into_path());
                    }
                }
                Err(e) => {
                    if spec.ignore_unreadable_dirs {
                        log::warn!("Skipping unreadable path under {}: {}", root.display(), e);
                    } else {
                        return Err(AppError::Ignore(e));
                    }
                }
            }
        }
    }

    for file in files {
        let path = resolve(file, base_path);
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => {
                candidates.insert(path);
            }
            Ok(_) => {
                log::warn!("Explicit file is not a regular file: {}", path.display());
            }
            Err(e) => {
                if spec.ignore_unreadable_dirs {
                    log::warn!("Skipping unreadable explicit file {}: {}", path.display(), e);
                } else {
                    return Err(AppError::FileRead { path, source: e });
                }
            }
        }
    }

    log::debug!("Enumerated {} candidate files", candidates.len());

    let mut matched: Vec<MatchedFile> = Vec::new();
    for path in candidates {
        let relative_path =
            pathdiff::diff_paths(&path, base_path).unwrap_or_else(|| path.clone());

        if !spec.name.is_empty() {
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
            let matches_name = name.as_deref().is_some_and(|n| name_set.is_match(n));
            if !matches_name {
                continue;
            }
        }
        if !spec.path.is_empty() && !path_set.is_match(&relative_path) {
            continue;
        }
        // Exclusion always wins over inclusion.
        if not_path_set.is_match(&relative_path) {
            continue;
        }

        if size_pred.is_some() || date_pred.is_some() {
            let meta = match fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    if spec.ignore_unreadable_dirs {
                        log::warn!("Cannot stat {}: {}", path.display(), e);
                        continue;
                    }
                    return Err(AppError::FileRead { path, source: e });
                }
            };
            if let Some(pred) = &size_pred {
                if !pred.matches(meta.len()) {
                    continue;
                }
            }
            if let Some(pred) = &date_pred {
                match meta.modified() {
                    Ok(mtime) if pred.matches(mtime) => {}
                    Ok(_) => continue,
                    Err(e) => {
                        log::warn!("No modification time for {}: {}", path.display(), e);
                        continue;
                    }
                }
            }
        }

        if !contains.is_empty() || !not_contains.is_empty() {
            let bytes = match fs::read(&path) {
                Ok(b) => b,
                Err(e) => {
                    if spec.ignore_unreadable_dirs {
                        log::warn!("Cannot read {}: {}", path.display(), e);
                        continue;
                    }
                    return Err(AppError::FileRead { path, source: e });
                }
            };
            let content = String::from_utf8_lossy(&bytes);
            if !contains.is_empty() && !contains.matches(&content) {
                continue;
            }
            if not_contains.matches(&content) {
                continue;
            }
        }

        matched.push(MatchedFile {
            path,
            relative_path,
        });
    }

    log::debug!("{} files matched all predicates", matched.len());

    // Render the tree over the complete match set before any truncation.
    let relative_strings: Vec<String> = matched
        .iter()
        .map(|f| f.relative_path.to_string_lossy().into_owned())
        .collect();
    let tree_view = tree::render(&relative_strings, base_path, tree_options);

    if spec.max_files > 0 && matched.len() > spec.max_files {
        log::debug!(
            "Truncating returned file list from {} to {}",
            matched.len(),
            spec.max_files
        );
        matched.truncate(spec.max_files);
    }

    Ok(FinderResult {
        files: matched,
        tree_view,
    })
}

fn resolve(path: &Path, base_path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_path.join(path)
    }
}

/// Builds a glob set from patterns; a trailing slash on a pattern matches
/// the whole subtree.
pub(crate) fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern_str in patterns {
        let mut processed = pattern_str.trim().to_string();
        if processed.ends_with('/') && processed.len() > 1 {
            processed.push_str("**");
        }
        let glob = Glob::new(&processed).map_err(|e| {
            AppError::Glob(format!("Invalid glob pattern \"{}\": {}", pattern_str, e))
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| AppError::Glob(e.to_string()))
}
