//! Web search executor backed by DuckDuckGo's HTML endpoint.
//!
//! The HTML endpoint needs no API key. Responses are scraped with a pair of
//! tolerant regexes rather than a full DOM parser; DuckDuckGo's markup has
//! kept the `result__a` / `result__snippet` class names stable for years.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ExecutorError;
use crate::policy::CanonicalArg;
use crate::policy::ValidatedDirective;

use super::{wrong_argument, Executor};

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

static RESULT_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#)
        .expect("result link regex")
});

static SNIPPET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)class="result__snippet"[^>]*>(.*?)</a>"#).expect("snippet regex")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));

// ---------------------------------------------------------------------------
// SearchExecutor
// ---------------------------------------------------------------------------

/// Executor for the web search capability.
#[derive(Debug, Clone)]
pub struct SearchExecutor {
    client: reqwest::Client,
    max_results: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SearchHit {
    title: String,
    snippet: String,
    url: String,
}

impl SearchExecutor {
    pub fn new(max_results: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            max_results,
        }
    }

    async fn fetch(&self, query: &str) -> Result<String, ExecutorError> {
        let response = self
            .client
            .get(SEARCH_ENDPOINT)
            .query(&[("q", query)])
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ExecutorError::Failed(
                        "Error: No internet connection or search service unavailable.".to_string(),
                    )
                } else {
                    ExecutorError::Http(e)
                }
            })?;

        // DuckDuckGo answers rate-limited scrapes with 202 or 429.
        let status = response.status();
        if status.as_u16() == 202 || status.as_u16() == 429 {
            return Err(ExecutorError::Failed(
                "Error: Search rate limited. Please try again in a moment.".to_string(),
            ));
        }
        response
            .error_for_status()
            .map_err(ExecutorError::Http)?
            .text()
            .await
            .map_err(ExecutorError::Http)
    }
}

#[async_trait]
impl Executor for SearchExecutor {
    fn name(&self) -> &'static str {
        "search"
    }

    async fn execute(&self, directive: &ValidatedDirective) -> Result<String, ExecutorError> {
        let CanonicalArg::Text(query) = directive.arg() else {
            return Err(wrong_argument(self.name()));
        };
        log::info!("searching the web for {query:?}");
        let html = self.fetch(query).await?;
        let hits = parse_results(&html, self.max_results);
        if hits.is_empty() {
            return Ok(format!("No results found for: {query}"));
        }
        Ok(format_results(&hits))
    }
}

// ---------------------------------------------------------------------------
// Scraping helpers
// ---------------------------------------------------------------------------

fn parse_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let snippets: Vec<String> = SNIPPET_RE
        .captures_iter(html)
        .map(|c| clean_fragment(&c[1]))
        .collect();

    RESULT_LINK_RE
        .captures_iter(html)
        .take(max_results)
        .enumerate()
        .map(|(i, caps)| SearchHit {
            title: clean_fragment(&caps[2]),
            snippet: snippets.get(i).cloned().unwrap_or_default(),
            url: decode_redirect(&caps[1]),
        })
        .filter(|hit| !hit.title.is_empty())
        .collect()
}

fn format_results(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[Result {}]\nTitle: {}\nSummary: {}\nURL: {}",
                i + 1,
                hit.title,
                hit.snippet,
                hit.url
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Strip tags, decode the handful of entities DuckDuckGo emits, and collapse
/// whitespace runs.
fn clean_fragment(fragment: &str) -> String {
    let without_tags = TAG_RE.replace_all(fragment, " ");
    let decoded = without_tags
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Result links go through `duckduckgo.com/l/?uddg=<encoded>`; pull out the
/// real destination when present.
fn decode_redirect(href: &str) -> String {
    let absolute = if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        href.to_string()
    };
    if let Ok(url) = reqwest::Url::parse(&absolute) {
        for (key, value) in url.query_pairs() {
            if key == "uddg" {
                return value.into_owned();
            }
        }
    }
    absolute
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
        <div class="result results_links results_links_deep web-result">
          <a rel="nofollow" class="result__a"
             href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F&amp;rut=abc">
            Rust Programming <b>Language</b>
          </a>
          <a class="result__snippet" href="#">A language empowering everyone
            to build reliable &amp; efficient software.</a>
        </div>
        <div class="result">
          <a rel="nofollow" class="result__a" href="https://doc.rust-lang.org/book/">
            The Rust Book
          </a>
          <a class="result__snippet" href="#">Learn Rust from first principles.</a>
        </div>
    "##;

    #[test]
    fn parses_titles_snippets_and_decoded_urls() {
        let hits = parse_results(SAMPLE, 3);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Rust Programming Language");
        assert_eq!(
            hits[0].snippet,
            "A language empowering everyone to build reliable & efficient software."
        );
        assert_eq!(hits[0].url, "https://www.rust-lang.org/");
        assert_eq!(hits[1].url, "https://doc.rust-lang.org/book/");
    }

    #[test]
    fn respects_the_result_cap() {
        let hits = parse_results(SAMPLE, 1);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn empty_page_yields_no_hits() {
        assert!(parse_results("<html><body>nothing here</body></html>", 3).is_empty());
    }

    #[test]
    fn formats_numbered_result_blocks() {
        let hits = vec![
            SearchHit {
                title: "One".to_string(),
                snippet: "first".to_string(),
                url: "https://one.example".to_string(),
            },
            SearchHit {
                title: "Two".to_string(),
                snippet: "second".to_string(),
                url: "https://two.example".to_string(),
            },
        ];
        let text = format_results(&hits);
        assert!(text.starts_with("[Result 1]\nTitle: One\nSummary: first\nURL: https://one.example"));
        assert!(text.contains("\n\n[Result 2]\n"));
    }

    #[test]
    fn clean_fragment_decodes_entities() {
        assert_eq!(
            clean_fragment("a &amp; b &#x27;c&#x27;   <b>bold</b>"),
            "a & b 'c' bold"
        );
    }

    #[test]
    fn decode_redirect_handles_direct_links() {
        assert_eq!(
            decode_redirect("https://example.com/page"),
            "https://example.com/page"
        );
    }
}
