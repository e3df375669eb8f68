//! Frame navigation: next-month controls inside embedded calendar widgets.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use eventscout_common::{PaginationResult, ScoutError, StrategyKind};

use super::{dedup_resolved, PageContext, PaginationStrategy};
use crate::calendar::{bump_month_params, find_calendar_iframe};
use crate::fetch::PageFetcher;

/// Exact navigation vocabulary, tried before any markup pattern.
const NAV_TEXT_TERMS: &[&str] = &["next month", "next", "›", "→", ">>", "forward"];
const NAV_TEXT_CONFIDENCE: f32 = 0.85;

/// Anchor text longer than this is content, not a control.
const MAX_CONTROL_TEXT: usize = 50;

/// Markup patterns for calendar navigation controls; the `fc-` entries
/// cover FullCalendar-based widgets.
const NAV_MARKUP_SELECTORS: &[&str] = &[
    "a[title*='next']",
    "a[title*='Next']",
    "button[title*='next']",
    ".next-month",
    ".calendar-next",
    ".fc-next-button",
    ".fc-button-next",
    "[data-action='next']",
    ".month-next",
    ".nav-next",
];
const NAV_MARKUP_CONFIDENCE: f32 = 0.85;
const NAV_DATA_URL_CONFIDENCE: f32 = 0.8;
const NAV_MONTH_PARAM_CONFIDENCE: f32 = 0.75;

pub struct FrameStrategy {
    fetcher: Arc<dyn PageFetcher>,
}

impl FrameStrategy {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl PaginationStrategy for FrameStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Frame
    }

    async fn attempt(&self, page: &PageContext<'_>) -> Result<Option<PaginationResult>, ScoutError> {
        let Some(frame_url) = find_calendar_iframe(page.html, page.url) else {
            return Ok(None);
        };

        debug!(frame = %frame_url, "Probing calendar iframe for navigation");
        let frame_html = match self.fetcher.fetch(&frame_url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(frame = %frame_url, error = %e, "Calendar iframe fetch failed");
                return Ok(None);
            }
        };

        Ok(scan_frame(&frame_html, &frame_url))
    }
}

fn scan_frame(html: &str, frame_url: &str) -> Option<PaginationResult> {
    let document = Html::parse_document(html);
    let base = Url::parse(frame_url).ok();

    // Exact vocabulary first.
    let anchor_selector = Selector::parse("a[href]").expect("valid selector");
    for term in NAV_TEXT_TERMS {
        let mut hrefs = Vec::new();
        for anchor in document.select(&anchor_selector) {
            let text: String = anchor.text().collect::<Vec<_>>().join(" ");
            let text = text.trim();
            if text.len() >= MAX_CONTROL_TEXT || !text.to_lowercase().contains(term) {
                continue;
            }
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if href.starts_with("javascript:") {
                continue;
            }
            hrefs.push(href.to_string());
        }
        let urls = dedup_resolved(hrefs.iter().map(String::as_str), base.as_ref());
        if !urls.is_empty() {
            return Some(frame_result(urls, format!("frame:text:{term}"), NAV_TEXT_CONFIDENCE));
        }
    }

    // Then attribute/markup patterns.
    for selector in NAV_MARKUP_SELECTORS {
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };
        for control in document.select(&parsed) {
            let element = control.value();

            if let Some(href) = element.attr("href") {
                if !href.starts_with("javascript:") {
                    let urls = dedup_resolved(std::iter::once(href), base.as_ref());
                    if !urls.is_empty() {
                        return Some(frame_result(
                            urls,
                            format!("frame:{selector}"),
                            NAV_MARKUP_CONFIDENCE,
                        ));
                    }
                }
            }

            if let Some(data_url) = element.attr("data-url") {
                let urls = dedup_resolved(std::iter::once(data_url), base.as_ref());
                if !urls.is_empty() {
                    return Some(frame_result(
                        urls,
                        format!("frame:{selector}[data-url]"),
                        NAV_DATA_URL_CONFIDENCE,
                    ));
                }
            }

            // Script-driven month navigation: the URL itself carries the
            // month state, so synthesize the next month.
            let onclick = element.attr("onclick").unwrap_or_default();
            if onclick.to_lowercase().contains("month") {
                if let Some(next) = bump_month_params(frame_url) {
                    return Some(frame_result(
                        vec![next],
                        "frame:month_params".to_string(),
                        NAV_MONTH_PARAM_CONFIDENCE,
                    ));
                }
            }
        }
    }

    None
}

fn frame_result(next_urls: Vec<String>, pattern: String, confidence: f32) -> PaginationResult {
    PaginationResult {
        next_urls,
        strategy: StrategyKind::Frame,
        confidence,
        total_pages: None,
        current_page: None,
        pattern,
    }
}
