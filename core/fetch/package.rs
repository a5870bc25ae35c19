use crate::error::{AppError, Result};
use crate::fetch::{FetchContext, file, resolve};
use crate::matcher;
use crate::model::{FileSource, PackageSource, SourceCommon};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A resolved workspace member: manifest metadata plus its directory.
#[derive(Debug)]
struct PackageInfo {
    name: String,
    dir: PathBuf,
    version: Option<String>,
    authors: Vec<String>,
    license: Option<String>,
    homepage: Option<String>,
}

/// Resolves the root manifest and lock file to the set of installed
/// packages, filters them by name pattern, and delegates each package's
/// source directory to the file fetcher behind a metadata block. A failure
/// on one package is recorded inline and does not abort the others.
pub(crate) fn fetch(source: &PackageSource, ctx: &FetchContext) -> Result<String> {
    let root = resolve(&source.root, ctx.base_path);
    let manifest_path = root.join("Cargo.toml");
    let manifest_text = fs::read_to_string(&manifest_path).map_err(|e| AppError::FileRead {
        path: manifest_path.clone(),
        source: e,
    })?;
    let manifest: toml::Value = toml::from_str(&manifest_text)?;
    let lock_versions = read_lock_versions(&root);
    let name_set = matcher::build_glob_set(&source.name)?;

    let mut out = String::new();
    for member_dir in member_dirs(&root, &manifest) {
        let (info, parse_error) = match read_package(&member_dir, &lock_versions) {
            Ok(Some(info)) => (info, None),
            Ok(None) => continue,
            Err(e) => {
                let fallback = member_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| member_dir.display().to_string());
                (
                    PackageInfo {
                        name: fallback,
                        dir: member_dir.clone(),
                        version: None,
                        authors: Vec::new(),
                        license: None,
                        homepage: None,
                    },
                    Some(e),
                )
            }
        };

        if !source.name.is_empty() && !name_set.is_match(&info.name) {
            log::trace!("Package {} filtered out by name patterns", info.name);
            continue;
        }

        out.push_str("PACKAGE: ");
        out.push_str(&info.name);
        out.push('\n');
        if let Some(version) = &info.version {
            out.push_str(&format!("Version: {}\n", version));
        }
        if !info.authors.is_empty() {
            out.push_str(&format!("Authors: {}\n", info.authors.join(", ")));
        }
        if let Some(license) = &info.license {
            out.push_str(&format!("License: {}\n", license));
        }
        if let Some(homepage) = &info.homepage {
            out.push_str(&format!("Homepage: {}\n", homepage));
        }

        if let Some(e) = parse_error {
            log::warn!("Skipping content of package {}: {}", info.name, e);
            out.push_str(&format!("Error: {}\n\n", e));
            continue;
        }

        match fetch_package_content(source, &info, ctx) {
            Ok(content) => out.push_str(&content),
            Err(e) => {
                log::warn!("Fetching package {} failed: {}", info.name, e);
                out.push_str(&format!("Error: {}\n", e));
            }
        }
        out.push('\n');
    }
    Ok(out)
}

fn fetch_package_content(
    source: &PackageSource,
    info: &PackageInfo,
    ctx: &FetchContext,
) -> Result<String> {
    let src_dir = info.dir.join("src");
    let content_dir = if src_dir.is_dir() { src_dir } else { info.dir.clone() };
    let delegated = FileSource {
        common: SourceCommon {
            modifiers: source.common.modifiers.clone(),
            ..Default::default()
        },
        directories: vec![content_dir],
        files: vec![],
        filter: source.filter.clone(),
        include_tree: false,
        tree_options: Default::default(),
    };
    file::fetch(&delegated, ctx)
}

/// Expands workspace member patterns to concrete directories containing a
/// manifest; a root `[package]` section counts as a member too. The result
/// is sorted for cross-run reproducibility.
fn member_dirs(root: &Path, manifest: &toml::Value) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    if manifest.get("package").is_some() {
        dirs.push(root.to_path_buf());
    }

    let patterns: Vec<String> = manifest
        .get("workspace")
        .and_then(|w| w.get("members"))
        .and_then(|m| m.as_array())
        .map(|members| {
            members
                .iter()
                .filter_map(|m| m.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    if !patterns.is_empty() {
        match matcher::build_glob_set(&patterns) {
            Ok(member_set) => {
                for entry in WalkDir::new(root)
                    .min_depth(1)
                    .max_depth(5)
                    .into_iter()
                    .filter_map(|e| e.ok())
                {
                    if !entry.file_type().is_dir() {
                        continue;
                    }
                    let Ok(relative) = entry.path().strip_prefix(root) else {
                        continue;
                    };
                    if member_set.is_match(relative) && entry.path().join("Cargo.toml").is_file() {
                        dirs.push(entry.path().to_path_buf());
                    }
                }
            }
            Err(e) => log::warn!("Invalid workspace member patterns: {}", e),
        }
    }

    dirs.sort();
    dirs.dedup();
    dirs
}

/// Reads one member manifest. Returns `Ok(None)` for manifests without a
/// `[package]` section (virtual workspace roots).
fn read_package(
    dir: &Path,
    lock_versions: &HashMap<String, String>,
) -> Result<Option<PackageInfo>> {
    let manifest_path = dir.join("Cargo.toml");
    let text = fs::read_to_string(&manifest_path).map_err(|e| AppError::FileRead {
        path: manifest_path.clone(),
        source: e,
    })?;
    let manifest: toml::Value = toml::from_str(&text)?;
    let Some(package) = manifest.get("package") else {
        return Ok(None);
    };
    let Some(name) = package.get("name").and_then(|n| n.as_str()) else {
        return Err(AppError::Manifest(format!(
            "Manifest {} has no package name",
            manifest_path.display()
        )));
    };

    // Workspace-inherited fields are not strings; the lock file is the
    // fallback for versions.
    let version = package
        .get("version")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| lock_versions.get(name).cloned());
    let authors = package
        .get("authors")
        .and_then(|a| a.as_array())
        .map(|authors| {
            authors
                .iter()
                .filter_map(|a| a.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let license = package
        .get("license")
        .and_then(|l| l.as_str())
        .map(str::to_string);
    let homepage = package
        .get("homepage")
        .and_then(|h| h.as_str())
        .map(str::to_string);

    Ok(Some(PackageInfo {
        name: name.to_string(),
        dir: dir.to_path_buf(),
        version,
        authors,
        license,
        homepage,
    }))
}

fn read_lock_versions(root: &Path) -> HashMap<String, String> {
    let lock_path = root.join("Cargo.lock");
    let Ok(text) = fs::read_to_string(&lock_path) else {
        log::debug!("No lock file at {}", lock_path.display());
        return HashMap::new();
    };
    let Ok(lock) = text.parse::<toml::Value>() else {
        log::warn!("Unparseable lock file at {}", lock_path.display());
        return HashMap::new();
    };
    lock.get("package")
        .and_then(|p| p.as_array())
        .map(|packages| {
            packages
                .iter()
                .filter_map(|p| {
                    let name = p.get("name")?.as_str()?;
                    let version = p.get("version")?.as_str()?;
                    Some((name.to_string(), version.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CommandGitRunner, RepoCache, ReqwestClient};
    use crate::compile::CancelToken;
    use crate::modifier::ModifierRegistry;
    use tempfile::TempDir;

    struct Harness {
        registry: ModifierRegistry,
        http: ReqwestClient,
        git: CommandGitRunner,
        repo_cache: RepoCache,
        cancel: CancelToken,
    }

    impl Harness {
        fn new() -> Self {
            Harness {
                registry: ModifierRegistry::new(),
                http: ReqwestClient::new().unwrap(),
                git: CommandGitRunner::new(),
                repo_cache: RepoCache::new(),
                cancel: CancelToken::new(),
            }
        }

        fn ctx<'a>(&'a self, base: &'a Path) -> FetchContext<'a> {
            FetchContext {
                base_path: base,
                registry: &self.registry,
                http: &self.http,
                git: &self.git,
                repo_cache: &self.repo_cache,
                cancel: &self.cancel,
            }
        }
    }

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("Cargo.toml"),
            "[workspace]\nmembers = [\"crates/*\"]\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("Cargo.lock"),
            "[[package]]\nname = \"alpha\"\nversion = \"1.2.3\"\n\n[[package]]\nname = \"beta\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();

        for (name, license) in [("alpha", "MIT"), ("beta", "Apache-2.0")] {
            let pkg = dir.path().join("crates").join(name);
            fs::create_dir_all(pkg.join("src")).unwrap();
            fs::write(
                pkg.join("Cargo.toml"),
                format!(
                    "[package]\nname = \"{}\"\nauthors = [\"Dev One\"]\nlicense = \"{}\"\nhomepage = \"https://example.com/{}\"\n",
                    name, license, name
                ),
            )
            .unwrap();
            fs::write(pkg.join("src/lib.rs"), format!("pub fn {}() {{}}\n", name)).unwrap();
        }
        dir
    }

    fn source(root: &Path, name: &[&str]) -> PackageSource {
        PackageSource {
            common: SourceCommon::default(),
            root: root.to_path_buf(),
            name: name.iter().map(|n| n.to_string()).collect(),
            filter: Default::default(),
        }
    }

    #[test]
    fn emits_metadata_and_delegated_content_per_package() {
        let ws = workspace();
        let harness = Harness::new();
        let out = fetch(&source(ws.path(), &[]), &harness.ctx(ws.path())).unwrap();

        let alpha = out.find("PACKAGE: alpha").unwrap();
        let beta = out.find("PACKAGE: beta").unwrap();
        assert!(alpha < beta);
        assert!(out.contains("Version: 1.2.3"));
        assert!(out.contains("Authors: Dev One"));
        assert!(out.contains("License: MIT"));
        assert!(out.contains("Homepage: https://example.com/alpha"));
        assert!(out.contains("pub fn alpha() {}"));
        assert!(out.contains("pub fn beta() {}"));
    }

    #[test]
    fn name_patterns_filter_packages() {
        let ws = workspace();
        let harness = Harness::new();
        let out = fetch(&source(ws.path(), &["alp*"]), &harness.ctx(ws.path())).unwrap();
        assert!(out.contains("PACKAGE: alpha"));
        assert!(!out.contains("PACKAGE: beta"));
    }

    #[test]
    fn broken_member_manifest_is_isolated() {
        let ws = workspace();
        let broken = ws.path().join("crates/broken");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("Cargo.toml"), "not [valid toml").unwrap();

        let harness = Harness::new();
        let out = fetch(&source(ws.path(), &[]), &harness.ctx(ws.path())).unwrap();
        assert!(out.contains("PACKAGE: broken"));
        assert!(out.contains("Error:"));
        // The healthy packages still contribute.
        assert!(out.contains("pub fn alpha() {}"));
        assert!(out.contains("pub fn beta() {}"));
    }

    #[test]
    fn missing_root_manifest_is_fatal_for_the_source() {
        let dir = TempDir::new().unwrap();
        let harness = Harness::new();
        assert!(fetch(&source(dir.path(), &[]), &harness.ctx(dir.path())).is_err());
    }
}
