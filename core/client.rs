use crate::error::{AppError, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Response body limit, matching what a context artifact can usefully hold.
const MAX_BODY_SIZE: u64 = 5 * 1024 * 1024;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

/// HTTP collaborator consumed by the url fetcher. Implementations carry
/// their own timeout; no retry policy lives in this crate.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse>;
}

pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(ReqwestClient { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse> {
        log::debug!("GET {}", url);
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send()?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if let Some(length) = response.content_length() {
            if length > MAX_BODY_SIZE {
                return Err(AppError::Http(format!(
                    "Response too large: {} bytes (max: {} bytes)",
                    length, MAX_BODY_SIZE
                )));
            }
        }
        let body = response.text()?;
        log::trace!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Process collaborator for git operations.
pub trait GitRunner: Send + Sync {
    fn is_repository(&self, path: &Path) -> Result<bool>;
    fn diff(&self, path: &Path, from: &str, to: &str) -> Result<String>;
}

/// Runs the `git` binary, bounded by a wall-clock timeout.
pub struct CommandGitRunner {
    timeout: Duration,
}

impl CommandGitRunner {
    pub fn new() -> Self {
        CommandGitRunner {
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        CommandGitRunner { timeout }
    }

    fn run(&self, path: &Path, args: &[&str]) -> Result<std::process::Output> {
        log::debug!("Running git {:?} in {}", args, path.display());
        let mut child = Command::new("git")
            .arg("-C")
            .arg(path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AppError::Git(format!("Failed to spawn git: {}", e)))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(AppError::Git(format!(
                            "git {:?} timed out after {:?}",
                            args, self.timeout
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
                Err(e) => return Err(AppError::Git(format!("Failed to wait for git: {}", e))),
            }
        }
        child
            .wait_with_output()
            .map_err(|e| AppError::Git(format!("Failed to collect git output: {}", e)))
    }
}

impl Default for CommandGitRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl GitRunner for CommandGitRunner {
    fn is_repository(&self, path: &Path) -> Result<bool> {
        let output = self.run(path, &["rev-parse", "--is-inside-work-tree"])?;
        Ok(output.status.success()
            && String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    fn diff(&self, path: &Path, from: &str, to: &str) -> Result<String> {
        let range = format!("{}..{}", from, to);
        let output = self.run(path, &["diff", &range])?;
        if !output.status.success() {
            return Err(AppError::Git(format!(
                "git diff {} failed: {}",
                range,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Filesystem collaborator for the compiler's write side.
pub trait Filesystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn write(&self, path: &Path, content: &str) -> Result<()>;
    fn ensure_dir(&self, path: &Path) -> Result<()>;
}

pub struct StdFilesystem;

impl Filesystem for StdFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|e| AppError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        fs::write(path, content).map_err(|e| AppError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn ensure_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|e| AppError::DirCreation {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Caller-owned, synchronized memoization of repository validation. One
/// instance lives on the compile context and is shared by concurrent
/// document compilations; there is deliberately no process-wide cache.
#[derive(Default)]
pub struct RepoCache {
    inner: Mutex<HashMap<PathBuf, bool>>,
}

impl RepoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached validity for `path`, computing it with `check`
    /// on first use. The lock is not held while `check` runs.
    pub fn validate<F>(&self, path: &Path, check: F) -> Result<bool>
    where
        F: FnOnce() -> Result<bool>,
    {
        let cached = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .copied();
        if let Some(valid) = cached {
            return Ok(valid);
        }
        let valid = check()?;
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.to_path_buf(), valid);
        Ok(valid)
    }
}
