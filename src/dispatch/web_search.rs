//! Web search engines with a resilience cascade.
//!
//! Engines: DuckDuckGo (zero-config, lite HTML scraping) and Brave Search
//! (API key required). The cascade tries the configured primary engine, then
//! each fallback in priority order; on continued emptiness it drops the site
//! filter, and finally retries the whole engine set with a simplified query
//! (years, recency words, and pricing/benchmark/release-date phrases
//! stripped). Every fallback step appends a human-readable note to the
//! output instead of failing the call -- the search tool itself never errors
//! hard.
//!
//! Rate-limited request spacing prevents upstream providers from blocking us.

use std::sync::Mutex;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

/// A single search result with title, URL, and snippet.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Clone, Debug)]
pub enum SearchEngine {
    DuckDuckGo,
    Brave { api_key: String },
}

impl SearchEngine {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DuckDuckGo => "duckduckgo",
            Self::Brave { .. } => "brave",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    /// Engines in priority order; index 0 is the primary.
    pub engines: Vec<SearchEngine>,
    /// Minimum seconds between requests to the same engine.
    pub rate_limit_secs: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            engines: vec![SearchEngine::DuckDuckGo],
            rate_limit_secs: 1.0,
        }
    }
}

/// Run the full resilience cascade and render the outcome as text.
///
/// Never returns an error: an exhausted cascade yields a "no results"
/// message carrying the accumulated fallback notes.
pub async fn resilient_search(
    config: &SearchConfig,
    query: &str,
    site: Option<&str>,
    count: usize,
) -> String {
    let mut notes: Vec<String> = Vec::new();

    if config.engines.is_empty() {
        return "Error: no search engines configured".to_string();
    }

    // Pass 1: as asked, with site filter if any.
    if let Some(results) = try_engines(config, query, site, count, &mut notes).await {
        return render(&results, &notes);
    }

    // Pass 2: drop the site filter.
    if site.is_some() {
        notes.push("retried without the site filter".to_string());
        if let Some(results) = try_engines(config, query, None, count, &mut notes).await {
            return render(&results, &notes);
        }
    }

    // Pass 3: simplified query, no site filter.
    let simplified = simplify_query(query);
    if simplified != query {
        notes.push(format!("retried with simplified query \"{simplified}\""));
        if let Some(results) = try_engines(config, &simplified, None, count, &mut notes).await {
            return render(&results, &notes);
        }
    }

    render(&[], &notes)
}

/// Try each configured engine in priority order. Returns the first non-empty
/// result set; provider errors and empty sets become notes.
async fn try_engines(
    config: &SearchConfig,
    query: &str,
    site: Option<&str>,
    count: usize,
    notes: &mut Vec<String>,
) -> Option<Vec<SearchResult>> {
    let effective = match site {
        Some(site) => format!("site:{site} {query}"),
        None => query.to_string(),
    };

    for engine in &config.engines {
        let outcome = match engine {
            SearchEngine::DuckDuckGo => {
                enforce_rate_limit(&DDG_LAST_REQUEST, config.rate_limit_secs).await;
                search_duckduckgo(&effective, count).await
            }
            SearchEngine::Brave { api_key } => {
                enforce_rate_limit(&BRAVE_LAST_REQUEST, config.rate_limit_secs).await;
                search_brave(&effective, count, api_key).await
            }
        };

        match outcome {
            Ok(results) if !results.is_empty() => return Some(results),
            Ok(_) => notes.push(format!("{} returned no results", engine.name())),
            Err(e) => notes.push(format!("{} failed: {e}", engine.name())),
        }
    }

    None
}

fn render(results: &[SearchResult], notes: &[String]) -> String {
    let mut out = String::new();

    if results.is_empty() {
        out.push_str("No results found.");
    } else {
        for (i, r) in results.iter().enumerate() {
            out.push_str(&format!("{}. {}\n   {}\n", i + 1, r.title, r.url));
            if !r.snippet.is_empty() {
                out.push_str(&format!("   {}\n", r.snippet));
            }
        }
    }

    if !notes.is_empty() {
        out.push_str(&format!("\n[search notes: {}]", notes.join("; ")));
    }

    out
}

/// Strip over-specific phrasing that commonly produces empty result sets:
/// four-digit years, recency adjectives, and pricing/benchmark/release-date
/// phrases. Whitespace is re-collapsed afterwards.
pub fn simplify_query(query: &str) -> String {
    // Compiled per call; search frequency makes caching irrelevant.
    let patterns = [
        r"\b(19|20)\d{2}\b",
        r"(?i)\b(latest|current|recent|newest)\b",
        r"(?i)\brelease\s+date\b",
        r"(?i)\b(price|prices|pricing|cost|costs)\b",
        r"(?i)\b(benchmark|benchmarks)\b",
    ];

    let mut out = query.to_string();
    for pattern in patterns {
        if let Ok(re) = Regex::new(pattern) {
            out = re.replace_all(&out, " ").into_owned();
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Search DuckDuckGo via the lite HTML endpoint and parse result links,
/// titles, and snippets from the table-based layout.
async fn search_duckduckgo(query: &str, count: usize) -> Result<Vec<SearchResult>, String> {
    let client = reqwest::Client::builder()
        .user_agent("Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0")
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|e| format!("failed to build client: {e}"))?;

    let resp = client
        .get("https://lite.duckduckgo.com/lite/")
        .query(&[("q", query)])
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;

    let html = resp
        .text()
        .await
        .map_err(|e| format!("failed to read response: {e}"))?;

    Ok(parse_ddg_lite_html(&html, count))
}

/// Parse DuckDuckGo Lite HTML into results. Result rows contain an
/// `a.result-link` with URL and title, followed by a `td.result-snippet`.
fn parse_ddg_lite_html(html: &str, count: usize) -> Vec<SearchResult> {
    use scraper::{Html, Selector};

    let document = Html::parse_document(html);

    let link_selector = Selector::parse("a.result-link").unwrap();
    let snippet_selector = Selector::parse("td.result-snippet").unwrap();

    let links: Vec<_> = document.select(&link_selector).collect();
    let snippets: Vec<_> = document.select(&snippet_selector).collect();

    let mut results = Vec::new();

    for (i, link) in links.iter().enumerate() {
        if results.len() >= count {
            break;
        }

        let title = link.text().collect::<String>().trim().to_string();
        let url = link.value().attr("href").unwrap_or("").trim().to_string();

        if title.is_empty() || url.is_empty() {
            continue;
        }

        let snippet = snippets
            .get(i)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        results.push(SearchResult { title, url, snippet });
    }

    results
}

/// Search using the Brave Search REST API.
async fn search_brave(
    query: &str,
    count: usize,
    api_key: &str,
) -> Result<Vec<SearchResult>, String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|e| format!("failed to build client: {e}"))?;

    let resp = client
        .get("https://api.search.brave.com/res/v1/web/search")
        .header("X-Subscription-Token", api_key)
        .header("Accept", "application/json")
        .query(&[("q", query), ("count", &count.to_string())])
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;

    let status = resp.status();
    if status.as_u16() == 401 {
        return Err("API key is invalid or expired".to_string());
    }
    if status.as_u16() == 429 {
        return Err("rate limit exceeded".to_string());
    }
    if !status.is_success() {
        return Err(format!("HTTP {status}"));
    }

    let body: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| format!("failed to parse response: {e}"))?;

    let empty_vec = vec![];
    let results = body["web"]["results"]
        .as_array()
        .unwrap_or(&empty_vec)
        .iter()
        .take(count)
        .filter_map(|r| {
            Some(SearchResult {
                title: r["title"].as_str()?.to_string(),
                url: r["url"].as_str()?.to_string(),
                snippet: r["description"].as_str().unwrap_or("").to_string(),
            })
        })
        .collect();

    Ok(results)
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

static DDG_LAST_REQUEST: Mutex<Option<std::time::Instant>> = Mutex::new(None);
static BRAVE_LAST_REQUEST: Mutex<Option<std::time::Instant>> = Mutex::new(None);

/// Wait if necessary to enforce a minimum interval between requests,
/// then update the last-request timestamp.
async fn enforce_rate_limit(tracker: &Mutex<Option<std::time::Instant>>, min_secs: f64) {
    let min_interval = Duration::from_secs_f64(min_secs);

    let remaining = {
        let guard = tracker.lock().unwrap();
        guard.and_then(|last| {
            let elapsed = last.elapsed();
            if elapsed < min_interval {
                Some(min_interval - elapsed)
            } else {
                None
            }
        })
    };

    if let Some(wait) = remaining {
        tokio::time::sleep(wait).await;
    }

    let mut guard = tracker.lock().unwrap();
    *guard = Some(std::time::Instant::now());
}
