//! HTTP fetch for retrieving and extracting web page content.
//!
//! Fetches a URL via HTTP GET and returns the content as markdown (via
//! `htmd`), raw HTML, or JSON passthrough. Errors come back as `Error: ...`
//! strings, matching the dispatcher's inline-error convention.

use std::time::Duration;

/// Fetch a URL and return its content.
///
/// `format` is `"markdown"` (HTML converted via `htmd`) or `"html"` (raw).
/// JSON responses are returned as-is regardless of `format`. Content longer
/// than `max_length` characters is truncated with a summary suffix.
pub async fn fetch_url(url: &str, format: &str, max_length: Option<usize>) -> String {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::limited(10))
        .user_agent("Mozilla/5.0 (compatible; conductor/0.1)")
        .build()
    {
        Ok(c) => c,
        Err(e) => return format!("Error: web_fetch failed to build client: {e}"),
    };

    let response = match client.get(url).send().await {
        Ok(r) => r,
        Err(e) => return format!("Error: web_fetch: {e}"),
    };

    let status = response.status();
    if !status.is_success() {
        return format!("Error: web_fetch: HTTP {status}");
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = match response.text().await {
        Ok(t) => t,
        Err(e) => return format!("Error: web_fetch failed to read body: {e}"),
    };

    // JSON responses: return as-is (no conversion).
    if content_type.contains("application/json") {
        return maybe_truncate(&body, max_length);
    }

    let output = if content_type.contains("text/html") && format == "markdown" {
        htmd::convert(&body).unwrap_or(body)
    } else {
        body
    };

    maybe_truncate(&output, max_length)
}

/// Truncate content to `max_length` characters if specified, appending a
/// summary line showing the truncation point and total original length.
fn maybe_truncate(content: &str, max_length: Option<usize>) -> String {
    let Some(limit) = max_length else {
        return content.to_string();
    };
    if content.len() <= limit {
        return content.to_string();
    }
    // Back off to a char boundary so the slice never splits a multibyte
    // character.
    let mut cut = limit;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}...\n[truncated at {} chars, total {}]",
        &content[..cut],
        limit,
        content.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_within_limit() {
        assert_eq!(maybe_truncate("hello world", Some(100)), "hello world");
    }

    #[test]
    fn truncate_at_limit() {
        let result = maybe_truncate("hello world", Some(5));
        assert!(result.starts_with("hello"));
        assert!(result.contains("[truncated at 5 chars, total 11]"));
    }

    #[test]
    fn truncate_none_returns_full() {
        assert_eq!(maybe_truncate("hello world", None), "hello world");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        // 4 chars, 12 bytes; a cut at byte 10 falls inside the last char.
        let result = maybe_truncate("日本語字", Some(10));
        assert!(result.starts_with("日本語..."));
        assert!(result.contains("[truncated at 10 chars, total 12]"));
    }
}
