//! Model fallback: classify candidate links when every heuristic failed.

use std::sync::Arc;

use ai_client::{AiClientError, CompletionBackend};
use async_trait::async_trait;
use schemars::JsonSchema;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use eventscout_common::{PaginationResult, ScoutError, StrategyKind};

use super::{dedup_resolved, PageContext, PaginationStrategy};

/// Candidate links handed to the classifier. Enough for any sane
/// pagination widget, small enough to keep the prompt bounded.
const MAX_CANDIDATE_LINKS: usize = 20;

#[derive(Debug, Serialize)]
struct CandidateLink {
    text: String,
    href: String,
    classes: String,
    full_url: String,
}

/// The classifier's required output shape.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PaginationAnalysis {
    /// URLs that lead to further pages of the same listing.
    pub next_urls: Vec<String>,
    /// 0.0–1.0; 0.8 and above is high confidence.
    pub confidence: f32,
    pub current_page: Option<u32>,
    pub total_pages: Option<u32>,
    /// One line on what was recognized.
    pub reasoning: String,
}

const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You classify links from an event listing page to find pagination.

Look for:
- Links with text like "Next", "More", "→", "›", ">>"
- Numbered pagination (2, 3, 4, ...)
- "Load More" or "Show More" controls
- Calendar navigation (next month)

Ignore social media links, navigation menus, footers, and unrelated
content links. Return an empty next_urls list when the page has no
pagination."#;

pub struct ModelStrategy {
    backend: Arc<dyn CompletionBackend>,
}

impl ModelStrategy {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl PaginationStrategy for ModelStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Model
    }

    async fn attempt(&self, page: &PageContext<'_>) -> Result<Option<PaginationResult>, ScoutError> {
        let links = candidate_link_sample(page.html, page.url);
        if links.is_empty() {
            return Ok(None);
        }

        let links_json =
            serde_json::to_string_pretty(&links).unwrap_or_else(|_| "[]".to_string());
        let user_prompt = format!(
            "Current URL: {}\n\nLinks found on the page:\n{links_json}",
            page.url
        );

        let analysis: PaginationAnalysis =
            match ai_client::extract(self.backend.as_ref(), CLASSIFIER_SYSTEM_PROMPT, &user_prompt)
                .await
            {
                Ok(analysis) => analysis,
                Err(AiClientError::QuotaExhausted { status, message }) => {
                    return Err(ScoutError::QuotaExhausted(format!("status {status}: {message}")));
                }
                Err(e) => {
                    warn!(url = page.url, error = %e, "Model pagination classification failed");
                    return Ok(None);
                }
            };

        let base = Url::parse(page.url).ok();
        let next_urls = dedup_resolved(analysis.next_urls.iter().map(String::as_str), base.as_ref());
        if next_urls.is_empty() {
            debug!(url = page.url, reasoning = %analysis.reasoning, "Model found no pagination");
            return Ok(None);
        }

        Ok(Some(PaginationResult {
            next_urls,
            strategy: StrategyKind::Model,
            confidence: analysis.confidence.clamp(0.0, 1.0),
            total_pages: analysis.total_pages,
            current_page: analysis.current_page,
            pattern: format!("model:{}", analysis.reasoning),
        }))
    }
}

/// A bounded sample of the page's links with the attributes the
/// classifier needs.
fn candidate_link_sample(html: &str, page_url: &str) -> Vec<CandidateLink> {
    let document = Html::parse_document(html);
    let anchor_selector = Selector::parse("a[href]").expect("valid selector");
    let base = Url::parse(page_url).ok();

    let mut links = Vec::new();
    for anchor in document.select(&anchor_selector) {
        if links.len() >= MAX_CANDIDATE_LINKS {
            break;
        }
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let text: String = anchor.text().collect::<Vec<_>>().join(" ");
        let full_url = match &base {
            Some(base) => base.join(href).map(|u| u.to_string()).unwrap_or_default(),
            None => href.to_string(),
        };
        links.push(CandidateLink {
            text: text.trim().to_string(),
            href: href.to_string(),
            classes: anchor.value().attr("class").unwrap_or("").to_string(),
            full_url,
        });
    }
    links
}
