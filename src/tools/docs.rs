//! Documentation retrieval for API-backed tools.
//!
//! [`HttpDocRetriever`] guesses where a service keeps its documentation,
//! probes the guesses concurrently, ranks the ones that answer and scrapes
//! the best three into plain text. It never fails: an empty result just
//! means nothing usable was found.

use std::sync::LazyLock;

use async_trait::async_trait;
use futures::StreamExt;
use rand::seq::SliceRandom;
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};

use crate::config::DocsConfig;
use crate::llm::retry::retry_backoff_delay;

/// Pages returned per service.
pub const MAX_DOC_PAGES: usize = 3;

const SEARCH_ENGINE_HOSTS: &[&str] = &["google", "bing", "duckduckgo", "yahoo", "baidu"];

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0 Safari/537.36",
];

/// One scraped documentation page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocPage {
    pub url: String,
    pub content: String,
}

/// Finds documentation text for a named service.
#[async_trait]
pub trait DocRetriever: Send + Sync {
    /// Up to [`MAX_DOC_PAGES`] pages, best first. Empty is a valid answer.
    async fn find_docs(&self, service: &str) -> Vec<DocPage>;
}

/// Serves fixed pages. Useful offline and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDocRetriever {
    pages: Vec<DocPage>,
}

impl StaticDocRetriever {
    pub fn new(pages: Vec<DocPage>) -> Self {
        Self { pages }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocRetriever for StaticDocRetriever {
    async fn find_docs(&self, _service: &str) -> Vec<DocPage> {
        self.pages.iter().take(MAX_DOC_PAGES).cloned().collect()
    }
}

/// Probes and scrapes documentation sites over HTTP.
pub struct HttpDocRetriever {
    client: Client,
    config: DocsConfig,
}

impl HttpDocRetriever {
    pub fn new(config: DocsConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client, config })
    }

    /// Probe one candidate; returns the final URL when it answers.
    async fn probe(&self, url: String) -> Option<String> {
        let head = self
            .client
            .head(&url)
            .header("User-Agent", random_user_agent())
            .send()
            .await;

        let response = match head {
            Ok(r) if accepted_status(r.status()) => r,
            _ => self
                .client
                .get(&url)
                .header("User-Agent", random_user_agent())
                .send()
                .await
                .map_err(|e| tracing::debug!("Probe failed for {}: {}", url, e))
                .ok()
                .filter(|r| accepted_status(r.status()))?,
        };

        let final_url = response.url().clone();
        let host = final_url.host_str()?.to_lowercase();
        if SEARCH_ENGINE_HOSTS.iter().any(|s| host.contains(s)) {
            return None;
        }
        tracing::debug!("Found documentation candidate {}", final_url);
        Some(final_url.to_string())
    }

    /// Fetch a page with retries on timeouts and connection errors.
    async fn scrape(&self, url: &str) -> Option<DocPage> {
        for attempt in 1..=self.config.max_retries {
            let timeout = self.config.timeout * attempt;
            tracing::debug!(url, attempt, ?timeout, "Scraping documentation");

            let result = self
                .client
                .get(url)
                .header("User-Agent", random_user_agent())
                .timeout(timeout)
                .send()
                .await
                .and_then(|r| r.error_for_status());

            match result {
                Ok(response) => {
                    let html = match response.text().await {
                        Ok(html) => html,
                        Err(e) => {
                            tracing::debug!("Failed to read {}: {}", url, e);
                            return None;
                        }
                    };
                    let content = html_to_text(&html);
                    return (!content.is_empty()).then(|| DocPage {
                        url: url.to_string(),
                        content,
                    });
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    tracing::warn!("Transient error scraping {}: {}", url, e);
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(retry_backoff_delay(attempt - 1)).await;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to scrape {}: {}", url, e);
                    return None;
                }
            }
        }
        None
    }
}

#[async_trait]
impl DocRetriever for HttpDocRetriever {
    async fn find_docs(&self, service: &str) -> Vec<DocPage> {
        let normalized = normalize_service(service);
        if normalized.is_empty() {
            return Vec::new();
        }

        let found: Vec<String> = futures::stream::iter(candidate_urls(&normalized))
            .map(|url| self.probe(url))
            .buffer_unordered(self.config.probe_concurrency.max(1))
            .filter_map(|found| async move { found })
            .collect()
            .await;

        let ranked = rank_urls(found, &normalized);
        tracing::info!(service, candidates = ranked.len(), "Ranked documentation URLs");

        let mut pages = Vec::new();
        for url in ranked.into_iter().take(MAX_DOC_PAGES) {
            if let Some(page) = self.scrape(&url).await {
                pages.push(page);
            }
        }
        pages
    }
}

fn accepted_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 200 | 301 | 302)
}

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Lowercase, spaces removed, underscores as dashes.
pub fn normalize_service(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .replace(' ', "")
        .replace('_', "-")
}

/// Likely documentation locations for a normalized service name.
pub fn candidate_urls(normalized: &str) -> Vec<String> {
    let n = normalized;
    let dotted = n.replace('-', ".");
    let underscored = n.replace('-', "_");
    let query = urlencoding::encode(n);

    let mut urls = vec![
        format!("https://www.{n}.com/docs"),
        format!("https://www.{n}.com/documentation"),
        format!("https://{n}.com/documentation"),
        format!("https://www.{n}.co/documentation"),
        format!("https://docs.{n}.com"),
        format!("https://developer.{n}.com"),
        format!("https://api.{n}.com/documentation"),
        format!("https://www.{n}.org/docs"),
        format!("https://www.{n}.io/docs"),
        format!("https://docs.{n}.io"),
        format!("https://dev.{n}.com"),
        format!("https://developers.{n}.com"),
        format!("https://{n}.dev"),
        format!("https://{n}.com/api"),
        format!("https://{n}.readthedocs.io"),
        format!("https://pypi.org/project/{n}"),
        format!("https://pypi.org/project/python-{n}"),
        format!("https://github.com/search?q={query}+api+python"),
        format!("https://rapidapi.com/search/{query}"),
    ];
    if dotted != n {
        urls.push(format!("https://www.{dotted}.com/docs"));
    }
    if underscored != n {
        urls.push(format!("https://pypi.org/project/{underscored}"));
    }
    urls
}

/// Relevance of a documentation URL; higher is better.
pub fn score_url(url: &str, normalized: &str) -> i32 {
    let lower = url.to_lowercase();
    let host = reqwest::Url::parse(&lower)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();

    let mut score = 0;
    if host.contains(normalized) {
        score += 100;
    }
    if ["/docs", "/documentation", "/api"]
        .iter()
        .any(|p| lower.contains(p))
    {
        score += 50;
    }
    if lower.contains("github.com/search") {
        score -= 30;
    }
    if lower.contains("pypi.org") {
        score -= 10;
    }
    if lower.contains("rapidapi.com") {
        score -= 20;
    }
    score
}

/// Deduplicate and sort by score, keeping discovery order among ties.
fn rank_urls(mut urls: Vec<String>, normalized: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    urls.retain(|u| seen.insert(u.clone()));
    urls.sort_by_key(|u| std::cmp::Reverse(score_url(u, normalized)));
    urls
}

static MAIN_CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("main, article").expect("valid main selector"));
static CODE_BLOCKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("pre, code").expect("valid code selector"));
static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("valid body selector"));

/// Elements whose text never belongs in documentation.
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "svg", "nav", "footer", "header", "template",
];

/// Elements that end a line of text.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "li", "pre", "tr", "section", "table", "ul",
    "ol", "dt", "dd", "blockquote",
];

/// Minimum text a main/article region needs before it is trusted.
const MIN_MAIN_CHARS: usize = 200;

/// Extract readable text from an HTML page.
///
/// Prefers `<main>`/`<article>` regions, then `<pre>`/`<code>` blocks that
/// look like Python, then the whole body.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let main = outermost(document.select(&MAIN_CONTENT), &["main", "article"])
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    if main.chars().count() >= MIN_MAIN_CHARS {
        return main;
    }

    let code: Vec<String> = outermost(document.select(&CODE_BLOCKS), &["pre", "code"])
        .map(element_text)
        .filter(|t| {
            let lower = t.to_lowercase();
            lower.contains("import") || lower.contains("python") || lower.contains("requests")
        })
        .collect();
    if !code.is_empty() {
        return code.join("\n\n");
    }

    let body = document
        .select(&BODY)
        .next()
        .map(element_text)
        .unwrap_or_else(|| element_text(document.root_element()));
    if body.is_empty() { main } else { body }
}

/// Drop matches nested inside another element of the same kinds.
fn outermost<'a>(
    matches: impl Iterator<Item = ElementRef<'a>>,
    names: &'a [&'a str],
) -> impl Iterator<Item = ElementRef<'a>> {
    matches.filter(move |el| {
        !el.ancestors()
            .filter_map(|node| node.value().as_element())
            .any(|e| names.contains(&e.name()))
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(element, &mut raw);

    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0;
    for line in raw.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            blank_run += 1;
            if blank_run == 1 && !out.is_empty() {
                out.push('\n');
            }
            continue;
        }
        blank_run = 0;
        out.push_str(&line);
        out.push('\n');
    }
    out.trim().to_string()
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_ELEMENTS.contains(&name) {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                }
                if BLOCK_ELEMENTS.contains(&name) {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Concatenate pages for a prompt, capped at `max_chars` characters.
pub fn combine_pages(pages: &[DocPage], max_chars: usize) -> String {
    let combined = pages
        .iter()
        .map(|p| format!("Source: {}\n{}", p.url, p.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    match combined.char_indices().nth(max_chars) {
        Some((idx, _)) => combined[..idx].to_string(),
        None => combined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_service() {
        assert_eq!(normalize_service("Open Weather_Map"), "openweather-map");
        assert_eq!(normalize_service("  CoinGecko "), "coingecko");
    }

    #[test]
    fn test_candidate_urls() {
        let urls = candidate_urls("alpha-vantage");
        assert!(urls.contains(&"https://docs.alpha-vantage.com".to_string()));
        assert!(urls.contains(&"https://www.alpha.vantage.com/docs".to_string()));
        assert!(urls.contains(&"https://pypi.org/project/alpha_vantage".to_string()));

        let plain = candidate_urls("coingecko");
        assert_eq!(plain.len(), 19);
    }

    #[test]
    fn test_scoring_prefers_official_docs() {
        let n = "openweathermap";
        assert_eq!(score_url("https://openweathermap.org/api", n), 150);
        assert_eq!(score_url("https://docs.openweathermap.io", n), 100);
        assert_eq!(score_url("https://pypi.org/project/openweathermap", n), -10);
        assert_eq!(
            score_url("https://github.com/search?q=openweathermap+api+python", n),
            -30
        );

        let ranked = rank_urls(
            vec![
                "https://pypi.org/project/openweathermap".to_string(),
                "https://openweathermap.org/api".to_string(),
                "https://openweathermap.org/api".to_string(),
                "https://rapidapi.com/search/openweathermap".to_string(),
            ],
            n,
        );
        assert_eq!(
            ranked,
            vec![
                "https://openweathermap.org/api".to_string(),
                "https://pypi.org/project/openweathermap".to_string(),
                "https://rapidapi.com/search/openweathermap".to_string(),
            ]
        );
    }

    #[test]
    fn test_html_prefers_main_content() {
        let filler = "Call the endpoint with your key. ".repeat(10);
        let html = format!(
            "<html><head><style>body{{}}</style></head><body><nav>Home | Pricing</nav>\
             <main><h1>Current weather</h1><p>{filler}</p><pre>GET /data/2.5/weather?q=London&amp;appid=KEY</pre></main>\
             <footer>(c) 2024</footer><script>track()</script></body></html>"
        );
        let text = html_to_text(&html);
        assert!(text.starts_with("Current weather"));
        assert!(text.contains("q=London&appid=KEY"));
        assert!(!text.contains("Pricing"));
        assert!(!text.contains("track()"));
        assert!(!text.contains("(c) 2024"));
    }

    #[test]
    fn test_html_falls_back_to_code_then_body() {
        let html = "<body><div>Intro</div><pre>import requests\nrequests.get(url)</pre></body>";
        assert_eq!(html_to_text(html), "import requests\nrequests.get(url)");

        let html = "<body><div>Just &lt;text&gt;</div><p>More</p></body>";
        assert_eq!(html_to_text(html), "Just <text>\nMore");
    }

    #[test]
    fn test_html_keeps_nested_article_content() {
        let filler = "Authenticate every request with the appid parameter. ".repeat(5);
        let html = format!(
            "<body><article><h1>Guide</h1><article><p>Inner example</p></article>\
             <p>Closing notes: {filler}</p></article></body>"
        );
        let text = html_to_text(&html);
        assert!(text.starts_with("Guide"));
        assert_eq!(text.matches("Inner example").count(), 1);
        assert!(text.contains("Closing notes"));
    }

    #[test]
    fn test_combine_pages_truncates_on_chars() {
        let pages = vec![
            DocPage {
                url: "https://a".to_string(),
                content: "ééé".to_string(),
            },
            DocPage {
                url: "https://b".to_string(),
                content: "second".to_string(),
            },
        ];
        let all = combine_pages(&pages, 10_000);
        assert_eq!(all, "Source: https://a\nééé\n\nSource: https://b\nsecond");
        let cut = combine_pages(&pages, 20);
        assert_eq!(cut.chars().count(), 20);
    }

    #[tokio::test]
    async fn test_static_retriever_caps_pages() {
        let page = DocPage {
            url: "https://x".to_string(),
            content: "c".to_string(),
        };
        let retriever = StaticDocRetriever::new(vec![page; 5]);
        assert_eq!(retriever.find_docs("x").await.len(), MAX_DOC_PAGES);
        assert!(StaticDocRetriever::empty().find_docs("x").await.is_empty());
    }
}
