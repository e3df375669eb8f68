//! Append-only log of pages where pagination detection found nothing,
//! kept for offline analysis of missed UI patterns.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use eventscout_common::content_hash;

/// How many trailing log entries to scan for duplicates.
const DEDUP_SCAN_LINES: usize = 100;

/// Cap on candidate href patterns stored per record.
const MAX_URL_PATTERNS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub timestamp: String,
    pub url: String,
    pub domain: String,
    pub content_hash: String,
    pub content_length: usize,
    /// Per-strategy confidences at the time of failure.
    pub strategies: Vec<StrategyAttempt>,
    pub signals: PageSignals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub strategy: String,
    pub confidence: f32,
}

/// Bounded diagnostic sample of a page, never its full content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSignals {
    pub has_numbered_links: bool,
    pub has_next_prev_text: bool,
    pub has_client_calendar: bool,
    pub has_load_more: bool,
    pub url_patterns: Vec<String>,
}

/// Extract the pagination-relevant signals from a page.
pub fn page_signals(html: &str) -> PageSignals {
    let document = Html::parse_document(html);
    let anchor_selector = Selector::parse("a[href]").expect("valid selector");
    let lowered = html.to_lowercase();

    let mut has_numbered_links = false;
    let mut url_patterns = Vec::new();
    for anchor in document.select(&anchor_selector) {
        let text: String = anchor.text().collect::<Vec<_>>().join("");
        let text = text.trim();
        if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
            has_numbered_links = true;
        }
        if url_patterns.len() < MAX_URL_PATTERNS {
            if let Some(href) = anchor.value().attr("href") {
                if ["/page/", "?page=", "/calendar/", "/events/"]
                    .iter()
                    .any(|p| href.contains(p))
                {
                    url_patterns.push(href.to_string());
                }
            }
        }
    }

    let has_load_more = [".load-more", ".show-more", "[data-load-more]"]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .any(|selector| document.select(&selector).next().is_some());

    PageSignals {
        has_numbered_links,
        has_next_prev_text: ["next", "previous", "more events", "load more"]
            .iter()
            .any(|w| lowered.contains(w)),
        has_client_calendar: ["fullcalendar", "calendar.js", "datepicker"]
            .iter()
            .any(|w| lowered.contains(w)),
        has_load_more,
        url_patterns,
    }
}

/// JSONL failure log. Write failures are absorbed: diagnostics must never
/// break a crawl.
pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one failure record unless an identical (url, content-hash)
    /// pair was logged recently.
    pub fn record(&self, url: &str, html: &str, strategies: Vec<StrategyAttempt>) {
        let hash = content_hash(html);
        if self.is_duplicate(url, &hash) {
            debug!(url, "Skipping duplicate pagination failure");
            return;
        }

        let record = FailureRecord {
            timestamp: Utc::now().to_rfc3339(),
            url: url.to_string(),
            domain: Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_default(),
            content_hash: hash,
            content_length: html.len(),
            strategies,
            signals: page_signals(html),
        };

        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(url, error = %e, "Failed to serialize failure record");
                return;
            }
        };

        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{line}"));
        match appended {
            Ok(()) => info!(url, domain = %record.domain, "Logged pagination failure"),
            Err(e) => warn!(url, error = %e, "Failed to write pagination failure"),
        }
    }

    fn is_duplicate(&self, url: &str, hash: &str) -> bool {
        let Ok(contents) = std::fs::read_to_string(&self.path) else {
            return false;
        };
        let lines: Vec<&str> = contents.lines().collect();
        let recent = lines.len().saturating_sub(DEDUP_SCAN_LINES);
        lines[recent..].iter().any(|line| {
            serde_json::from_str::<FailureRecord>(line)
                .map(|record| record.url == url && record.content_hash == hash)
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log(name: &str) -> FailureLog {
        let path = std::env::temp_dir().join(format!("eventscout-{name}-{}.jsonl", std::process::id()));
        let _ = std::fs::remove_file(&path);
        FailureLog::new(path)
    }

    fn attempts() -> Vec<StrategyAttempt> {
        vec![StrategyAttempt {
            strategy: "markup".into(),
            confidence: 0.0,
        }]
    }

    #[test]
    fn records_deduplicate_by_url_and_content() {
        let log = temp_log("dedup");
        let html = "<html><body><a href='/page/2'>2</a></body></html>";

        log.record("https://example.org/events", html, attempts());
        log.record("https://example.org/events", html, attempts());
        log.record("https://example.org/events", "<html>changed</html>", attempts());

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
        let _ = std::fs::remove_file(log.path());
    }

    #[test]
    fn signals_capture_page_shape() {
        let html = r#"<html><body>
            <script src="fullcalendar.min.js"></script>
            <a href="/events/?page=2">2</a>
            <a href="/events/?page=3">3</a>
            <button class="load-more">Load more</button>
        </body></html>"#;
        let signals = page_signals(html);
        assert!(signals.has_numbered_links);
        assert!(signals.has_next_prev_text);
        assert!(signals.has_client_calendar);
        assert!(signals.has_load_more);
        assert_eq!(signals.url_patterns.len(), 2);
    }

    #[test]
    fn url_patterns_are_capped() {
        let mut html = String::from("<html><body>");
        for i in 0..30 {
            html.push_str(&format!(r#"<a href="/page/{i}">p{i}</a>"#));
        }
        html.push_str("</body></html>");
        let signals = page_signals(&html);
        assert_eq!(signals.url_patterns.len(), MAX_URL_PATTERNS);
    }
}
