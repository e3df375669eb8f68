//! Rendered-DOM heuristics: controls that only exist after scripts run.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use eventscout_common::{PaginationResult, ScoutError, StrategyKind};

use super::{dedup_resolved, PageContext, PaginationStrategy};
use crate::render::PageRenderer;

/// Controls worth probing in a rendered DOM.
const CONTROL_SELECTORS: &[&str] = &["[data-next]", ".next-page", ".load-more-btn", "a[href]", "button"];

/// Control text that marks a next/load-more affordance.
const CONTROL_TEXT_TERMS: &[&str] = &["next", "load more", "show more"];

/// Fixed confidence: a rendered-only control is real but we cannot tell
/// how far it leads.
const RENDERED_CONFIDENCE: f32 = 0.7;

pub struct RenderedStrategy {
    renderer: Arc<dyn PageRenderer>,
}

impl RenderedStrategy {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl PaginationStrategy for RenderedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Rendered
    }

    async fn attempt(&self, page: &PageContext<'_>) -> Result<Option<PaginationResult>, ScoutError> {
        let rendered = match self.renderer.render(page.url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(url = page.url, error = %e, "Render failed");
                return Ok(None);
            }
        };

        let raw_hrefs = harvest_hrefs(page.html);
        Ok(scan_rendered(&rendered, page.url, &raw_hrefs))
    }
}

/// Every href reachable in the raw markup, used to ignore controls that
/// the markup strategy already had a chance at.
fn harvest_hrefs(html: &str) -> HashSet<String> {
    let document = Html::parse_document(html);
    let anchor_selector = Selector::parse("[href]").expect("valid selector");
    document
        .select(&anchor_selector)
        .filter_map(|el| el.value().attr("href"))
        .map(str::to_string)
        .collect()
}

fn scan_rendered(
    rendered: &str,
    page_url: &str,
    raw_hrefs: &HashSet<String>,
) -> Option<PaginationResult> {
    let document = Html::parse_document(rendered);
    let base = Url::parse(page_url).ok();

    for selector in CONTROL_SELECTORS {
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };

        let mut hrefs = Vec::new();
        for control in document.select(&parsed) {
            let element = control.value();
            let text: String = control.text().collect::<Vec<_>>().join(" ");
            let lowered = text.trim().to_lowercase();

            // Generic anchors/buttons must at least read like a control;
            // the dedicated selectors already imply it.
            let explicit = !matches!(*selector, "a[href]" | "button");
            if !explicit && !CONTROL_TEXT_TERMS.iter().any(|t| lowered.contains(t)) {
                continue;
            }

            let target = element
                .attr("href")
                .or_else(|| element.attr("data-url"))
                .or_else(|| element.attr("data-next-url"));
            let Some(target) = target else {
                continue;
            };
            if target.starts_with("javascript:") || raw_hrefs.contains(target) {
                continue;
            }
            hrefs.push(target.to_string());
        }

        let urls = dedup_resolved(hrefs.iter().map(String::as_str), base.as_ref());
        if !urls.is_empty() {
            debug!(url = page_url, selector, count = urls.len(), "Rendered-only control found");
            return Some(PaginationResult {
                next_urls: urls,
                strategy: StrategyKind::Rendered,
                confidence: RENDERED_CONFIDENCE,
                total_pages: None,
                current_page: None,
                pattern: format!("rendered:{selector}"),
            });
        }
    }

    None
}
