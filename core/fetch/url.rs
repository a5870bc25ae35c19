use crate::error::{AppError, Result};
use crate::fetch::FetchContext;
use crate::model::UrlSource;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::env;

/// Fetches each URL independently: a failure on one URL becomes an inline
/// `Error:` marker while the remaining URLs still fetch. Output always
/// carries matching `URL:` / `END OF URL:` delimiters per URL.
pub(crate) fn fetch(source: &UrlSource, ctx: &FetchContext) -> Result<String> {
    let headers: Vec<(String, String)> = source
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), interpolate(value)))
        .collect();

    let mut out = String::new();
    for url in &source.urls {
        ctx.cancel.check()?;
        out.push_str("URL: ");
        out.push_str(url);
        out.push('\n');
        match fetch_one(source, url, &headers, ctx) {
            Ok(text) => {
                out.push_str(&text);
                if !text.ends_with('\n') {
                    out.push('\n');
                }
            }
            Err(e) => {
                log::warn!("Fetching {} failed: {}", url, e);
                out.push_str("Error: ");
                out.push_str(&e.to_string());
                out.push('\n');
            }
        }
        out.push_str("END OF URL: ");
        out.push_str(url);
        out.push_str("\n\n");
    }
    Ok(out)
}

fn fetch_one(
    source: &UrlSource,
    url: &str,
    headers: &[(String, String)],
    ctx: &FetchContext,
) -> Result<String> {
    let response = ctx.http.get(&interpolate(url), headers)?;
    if !(200..300).contains(&response.status) {
        return Err(AppError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    let is_html = response.content_type.contains("text/html")
        || response.content_type.contains("application/xhtml");

    let text = if let Some(selector) = &source.selector {
        extract_selection(&response.body, selector, source.clean_html)?
    } else if source.clean_html && is_html {
        html_to_text(&response.body)
    } else {
        response.body
    };

    let extension = content_type_extension(&response.content_type);
    ctx.registry
        .apply_chain(&source.common.modifiers, &extension, text)
}

/// Replaces `${NAME}` references with the named environment variable,
/// leaving unknown references untouched.
pub(crate) fn interpolate(value: &str) -> String {
    static VAR: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());
    VAR.replace_all(value, |caps: &regex::Captures| {
        env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

/// Extension-like token derived from the response content type, used to
/// gate modifier applicability.
fn content_type_extension(content_type: &str) -> String {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    essence
        .rsplit('/')
        .next()
        .unwrap_or("")
        .trim_start_matches("x-")
        .to_string()
}

fn extract_selection(body: &str, selector: &str, clean: bool) -> Result<String> {
    let selector = Selector::parse(selector)
        .map_err(|e| AppError::Selector(format!("Invalid selector \"{}\": {}", selector, e)))?;
    let document = Html::parse_document(body);
    let mut parts: Vec<String> = Vec::new();
    for element in document.select(&selector) {
        if clean {
            let texts = collect_element_text(element);
            parts.push(collapse_whitespace(&texts.join(" ")));
        } else {
            parts.push(element.html());
        }
    }
    Ok(parts.join("\n"))
}

const SKIP_TAGS: [&str; 4] = ["script", "style", "noscript", "svg"];

/// Reduces an HTML document to its readable text, dropping script/style
/// subtrees and collapsing whitespace.
pub(crate) fn html_to_text(html: &str) -> String {
    static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
    let document = Html::parse_document(html);

    let texts = match document.select(&BODY).next() {
        Some(body) => collect_element_text(body),
        None => collect_element_text(document.root_element()),
    };
    collapse_whitespace(&texts.join(" "))
}

fn collect_element_text(element: ElementRef) -> Vec<String> {
    if SKIP_TAGS.contains(&element.value().name()) {
        return Vec::new();
    }
    let mut parts = Vec::new();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    parts.extend(collect_element_text(child_el));
                }
            }
            _ => {}
        }
    }
    parts
}

fn collapse_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut previous_blank = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !previous_blank {
                result.push(' ');
            }
            previous_blank = true;
        } else {
            result.push(ch);
            previous_blank = false;
        }
    }
    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CommandGitRunner, HttpClient, HttpResponse, RepoCache};
    use crate::compile::CancelToken;
    use crate::model::{SourceCommon, UrlSource};
    use crate::modifier::ModifierRegistry;
    use std::collections::BTreeMap;

    struct FakeHttp {
        responses: BTreeMap<String, HttpResponse>,
    }

    impl FakeHttp {
        fn new(pairs: &[(&str, u16, &str)]) -> Self {
            let responses = pairs
                .iter()
                .map(|(url, status, body)| {
                    (
                        url.to_string(),
                        HttpResponse {
                            status: *status,
                            content_type: "text/html".to_string(),
                            body: body.to_string(),
                        },
                    )
                })
                .collect();
            FakeHttp { responses }
        }
    }

    impl HttpClient for FakeHttp {
        fn get(&self, url: &str, _headers: &[(String, String)]) -> crate::error::Result<HttpResponse> {
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| AppError::Http(format!("connection refused: {}", url)))
        }
    }

    struct Harness {
        registry: ModifierRegistry,
        http: FakeHttp,
        git: CommandGitRunner,
        repo_cache: RepoCache,
        cancel: CancelToken,
    }

    impl Harness {
        fn new(http: FakeHttp) -> Self {
            Harness {
                registry: ModifierRegistry::new(),
                http,
                git: CommandGitRunner::new(),
                repo_cache: RepoCache::new(),
                cancel: CancelToken::new(),
            }
        }

        fn ctx<'a>(&'a self, base: &'a std::path::Path) -> FetchContext<'a> {
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

    fn source(urls: &[&str]) -> UrlSource {
        UrlSource {
            common: SourceCommon::default(),
            urls: urls.iter().map(|u| u.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn partial_failure_yields_inline_error_marker() {
        let harness = Harness::new(FakeHttp::new(&[
            ("http://a", 404, "not found"),
            ("http://b", 200, "content of b"),
        ]));
        let out = fetch(&source(&["http://a", "http://b"]), &harness.ctx(std::path::Path::new("."))).unwrap();
        assert!(out.contains("Error: HTTP status code 404"));
        assert!(out.contains("content of b"));
    }

    #[test]
    fn every_url_gets_matching_delimiters() {
        let harness = Harness::new(FakeHttp::new(&[("http://a", 200, "aaa")]));
        let out = fetch(
            &source(&["http://a", "http://down"]),
            &harness.ctx(std::path::Path::new(".")),
        )
        .unwrap();
        for url in ["http://a", "http://down"] {
            assert!(out.contains(&format!("URL: {}\n", url)));
            assert!(out.contains(&format!("END OF URL: {}\n", url)));
        }
        assert!(out.contains("Error: HTTP Error: connection refused"));
    }

    #[test]
    fn selector_extracts_matching_elements() {
        let html = "<html><body><h1>Title</h1><p class=\"x\">first</p><p>other</p></body></html>";
        let harness = Harness::new(FakeHttp::new(&[("http://a", 200, html)]));
        let mut src = source(&["http://a"]);
        src.selector = Some("p.x".to_string());
        src.clean_html = true;
        let out = fetch(&src, &harness.ctx(std::path::Path::new("."))).unwrap();
        assert!(out.contains("first"));
        assert!(!out.contains("Title"));
        assert!(!out.contains("other"));
    }

    #[test]
    fn clean_html_strips_scripts() {
        let html = "<html><body><script>var x;</script><p>Visible</p></body></html>";
        let harness = Harness::new(FakeHttp::new(&[("http://a", 200, html)]));
        let mut src = source(&["http://a"]);
        src.clean_html = true;
        let out = fetch(&src, &harness.ctx(std::path::Path::new("."))).unwrap();
        assert!(out.contains("Visible"));
        assert!(!out.contains("var x;"));
    }

    #[test]
    fn interpolate_reads_environment() {
        unsafe { std::env::set_var("DOCWEAVE_TEST_TOKEN", "tok123") };
        assert_eq!(
            interpolate("Bearer ${DOCWEAVE_TEST_TOKEN}"),
            "Bearer tok123"
        );
        assert_eq!(interpolate("${DOCWEAVE_UNSET_VAR}"), "${DOCWEAVE_UNSET_VAR}");
    }

    #[test]
    fn content_type_extension_maps_subtypes() {
        assert_eq!(content_type_extension("text/html; charset=utf-8"), "html");
        assert_eq!(content_type_extension("application/json"), "json");
        assert_eq!(content_type_extension(""), "");
    }
}
