//! Markup heuristics: ranked pattern families over the raw document.

use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use eventscout_common::{PaginationResult, ScoutError, StrategyKind};

use super::{dedup_resolved, PageContext, PaginationStrategy};

/// Explicit next-page relations. The most reliable signal a page can give.
const REL_NEXT_SELECTORS: &[&str] = &["a[rel='next']", "link[rel='next']"];
const REL_NEXT_CONFIDENCE: f32 = 0.95;

/// Visible next-page text and symbols, ranked.
const NEXT_TEXT_PATTERNS: &[(&str, f32)] = &[
    ("Next", 0.8),
    ("›", 0.75),
    ("→", 0.75),
    (">>", 0.75),
];

/// Class conventions shared across pagination widgets and CMS themes.
const CLASS_SELECTORS: &[&str] = &[
    ".pagination a:last-child",
    ".pager-next a",
    ".next a",
    ".page-next a",
    ".views-more-link a",
    ".pager-item--next a",
    ".load-more",
    ".show-more",
    "[data-load-more]",
];
const CLASS_CONFIDENCE: f32 = 0.75;

/// Bare page-number links beyond page 1, the second-chance heuristic.
const NUMBERED_CONFIDENCE: f32 = 0.9;

/// A unique match is trusted as-is; a handful slightly less; a crowd of
/// matches is probably a false positive family.
fn ambiguity_discount(matches: usize) -> f32 {
    match matches {
        0 | 1 => 1.0,
        2 | 3 => 0.9,
        _ => 0.6,
    }
}

pub struct MarkupStrategy;

#[async_trait]
impl PaginationStrategy for MarkupStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Markup
    }

    async fn attempt(&self, page: &PageContext<'_>) -> Result<Option<PaginationResult>, ScoutError> {
        Ok(scan_markup(page.html, page.url))
    }
}

fn scan_markup(html: &str, page_url: &str) -> Option<PaginationResult> {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let total_pages = estimate_total_pages(&document);
    let current_page = detect_current_page(&document);

    if let Some((urls, pattern, confidence)) = match_pattern_families(&document, base.as_ref()) {
        return Some(PaginationResult {
            next_urls: urls,
            strategy: StrategyKind::Markup,
            confidence,
            total_pages,
            current_page,
            pattern,
        });
    }

    let numbered = numbered_page_links(&document, base.as_ref());
    if !numbered.is_empty() {
        return Some(PaginationResult {
            next_urls: numbered,
            strategy: StrategyKind::Markup,
            confidence: NUMBERED_CONFIDENCE,
            total_pages,
            current_page: current_page.or(Some(1)),
            pattern: "numbered_pagination".to_string(),
        });
    }

    None
}

/// Try the ranked families in order; the first family with matches wins.
fn match_pattern_families(
    document: &Html,
    base: Option<&Url>,
) -> Option<(Vec<String>, String, f32)> {
    for selector in REL_NEXT_SELECTORS {
        let urls = select_hrefs(document, selector, base);
        if !urls.is_empty() {
            let confidence = REL_NEXT_CONFIDENCE * ambiguity_discount(urls.len());
            return Some((urls, selector.to_string(), confidence));
        }
    }

    let anchor_selector = Selector::parse("a[href]").expect("valid selector");
    for (needle, base_confidence) in NEXT_TEXT_PATTERNS {
        let lowered_needle = needle.to_lowercase();
        let mut hrefs = Vec::new();
        for anchor in document.select(&anchor_selector) {
            let text: String = anchor.text().collect::<Vec<_>>().join(" ");
            if !text.to_lowercase().contains(&lowered_needle) {
                continue;
            }
            if let Some(href) = anchor.value().attr("href") {
                hrefs.push(href.to_string());
            }
        }
        let urls = dedup_resolved(hrefs.iter().map(String::as_str), base);
        if !urls.is_empty() {
            let confidence = base_confidence * ambiguity_discount(urls.len());
            return Some((urls, format!("a:contains('{needle}')"), confidence));
        }
    }

    for selector in CLASS_SELECTORS {
        let urls = select_hrefs(document, selector, base);
        if !urls.is_empty() {
            let confidence = CLASS_CONFIDENCE * ambiguity_discount(urls.len());
            return Some((urls, selector.to_string(), confidence));
        }
    }

    None
}

fn select_hrefs(document: &Html, selector: &str, base: Option<&Url>) -> Vec<String> {
    let Ok(parsed) = Selector::parse(selector) else {
        return Vec::new();
    };
    let hrefs: Vec<String> = document
        .select(&parsed)
        .filter_map(|el| el.value().attr("href"))
        .map(str::to_string)
        .collect();
    dedup_resolved(hrefs.iter().map(String::as_str), base)
}

/// Links whose entire visible text is a page number greater than 1.
/// Page 1 is skipped: it is usually the page being viewed.
fn numbered_page_links(document: &Html, base: Option<&Url>) -> Vec<String> {
    let anchor_selector = Selector::parse("a[href]").expect("valid selector");
    let mut hrefs = Vec::new();
    for anchor in document.select(&anchor_selector) {
        let text: String = anchor.text().collect::<Vec<_>>().join("");
        let text = text.trim();
        if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let Ok(number) = text.parse::<u32>() else {
            continue;
        };
        if number <= 1 {
            continue;
        }
        if let Some(href) = anchor.value().attr("href") {
            hrefs.push(href.to_string());
        }
    }
    dedup_resolved(hrefs.iter().map(String::as_str), base)
}

fn estimate_total_pages(document: &Html) -> Option<u32> {
    let selector = Selector::parse(".pagination a, .pager a, .page-numbers a").expect("valid selector");
    document
        .select(&selector)
        .filter_map(|el| {
            let text: String = el.text().collect::<Vec<_>>().join("");
            text.trim().parse::<u32>().ok()
        })
        .max()
}

fn detect_current_page(document: &Html) -> Option<u32> {
    const CURRENT_SELECTORS: &[&str] = &[
        ".pagination .active",
        ".pagination .current",
        ".pager .is-active",
        ".page-numbers.current",
    ];
    for selector in CURRENT_SELECTORS {
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };
        if let Some(element) = document.select(&parsed).next() {
            let text: String = element.text().collect::<Vec<_>>().join("");
            if let Ok(number) = text.trim().parse::<u32>() {
                return Some(number);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn attempt(html: &str) -> Option<PaginationResult> {
        MarkupStrategy
            .attempt(&PageContext {
                url: "https://example.org/events",
                html,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn rel_next_wins_at_highest_confidence() {
        let html = r#"<html><body>
            <a href="/events?page=2" rel="next">More</a>
            <a href="/archive">more stuff</a>
        </body></html>"#;
        let result = attempt(html).await.unwrap();
        assert_eq!(result.next_urls, vec!["https://example.org/events?page=2"]);
        assert!((result.confidence - 0.95).abs() < 1e-6);
        assert_eq!(result.pattern, "a[rel='next']");
        assert_eq!(result.strategy, StrategyKind::Markup);
    }

    #[tokio::test]
    async fn next_text_fires_below_threshold() {
        let html = r#"<html><body><a href="/events/p2">Next page</a></body></html>"#;
        let result = attempt(html).await.unwrap();
        assert_eq!(result.next_urls, vec!["https://example.org/events/p2"]);
        assert!((result.confidence - 0.8).abs() < 1e-6);
        assert_eq!(result.pattern, "a:contains('Next')");
    }

    #[tokio::test]
    async fn many_matches_discount_confidence() {
        let html = r#"<html><body>
            <a href="/a">Next</a><a href="/b">Next</a>
            <a href="/c">Next</a><a href="/d">Next</a>
        </body></html>"#;
        let result = attempt(html).await.unwrap();
        assert_eq!(result.next_urls.len(), 4);
        assert!((result.confidence - 0.8 * 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn class_patterns_fire_when_no_text_matches() {
        let html = r#"<html><body>
            <div class="pager-next"><a href="/events?page=5">➔➔</a></div>
        </body></html>"#;
        let result = attempt(html).await.unwrap();
        assert_eq!(result.next_urls, vec!["https://example.org/events?page=5"]);
        assert!((result.confidence - 0.75).abs() < 1e-6);
        assert_eq!(result.pattern, ".pager-next a");
    }

    #[tokio::test]
    async fn bare_numbered_links_fire_the_second_chance() {
        let html = r#"<html><body>
            <a href="/calendar/2">2</a>
            <a href="/calendar/3">3</a>
            <a href="/calendar/4">4</a>
            <a href="/calendar/5">5</a>
        </body></html>"#;
        let result = attempt(html).await.unwrap();
        assert_eq!(
            result.next_urls,
            vec![
                "https://example.org/calendar/2",
                "https://example.org/calendar/3",
                "https://example.org/calendar/4",
                "https://example.org/calendar/5",
            ]
        );
        assert!((result.confidence - 0.9).abs() < 1e-6);
        assert_eq!(result.pattern, "numbered_pagination");
        assert_eq!(result.current_page, Some(1));
    }

    #[tokio::test]
    async fn page_one_links_are_ignored() {
        let html = r#"<html><body><a href="/calendar/1">1</a></body></html>"#;
        assert!(attempt(html).await.is_none());
    }

    #[tokio::test]
    async fn numbered_urls_deduplicate() {
        let html = r#"<html><body>
            <a href="/calendar/2">2</a>
            <a href="/calendar/2">2</a>
        </body></html>"#;
        let result = attempt(html).await.unwrap();
        assert_eq!(result.next_urls, vec!["https://example.org/calendar/2"]);
    }

    #[tokio::test]
    async fn total_and_current_pages_come_from_pagination_widgets() {
        let html = r#"<html><body>
            <div class="pagination">
                <span class="current">3</span>
                <a href="/p/1">1</a><a href="/p/4" rel="next">4</a>
                <a href="/p/9">9</a>
            </div>
        </body></html>"#;
        let result = attempt(html).await.unwrap();
        assert_eq!(result.total_pages, Some(9));
        assert_eq!(result.current_page, Some(3));
    }

    #[tokio::test]
    async fn silent_pages_yield_nothing() {
        let html = r#"<html><body><p>No pagination anywhere here.</p></body></html>"#;
        assert!(attempt(html).await.is_none());
    }
}
