//! Top-level page event crawler.
//!
//! Structured data is tried first; pages without it go through the
//! candidate/model path. The crawl is driven by an explicit worklist
//! (treated as a stack, so traversal is depth-first) with a visited set
//! and per-entry depth budget threaded through one `CrawlState`: no
//! recursion, no shared mutable state between branches.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use ai_client::{CompletionBackend, OpenAiClient};
use eventscout_common::{Config, EventRecord, PaginationResult, ScoutError};

use crate::calendar::{find_calendar_iframe, CalendarResolver};
use crate::candidates::{candidate_links, detect_candidates};
use crate::extractor::CandidateExtractor;
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::hints::{NoHints, SelectorHints};
use crate::normalizer::extract_structured_events;
use crate::pagination::{FailureLog, PaginationEngine};
use crate::render::{BrowserlessRenderer, PageRenderer};

/// Default recursion budget for link and frame backoff.
pub const DEFAULT_MAX_DEPTH: u32 = 2;

/// At most this many pagination URLs are followed per page.
const MAX_PAGINATION_FOLLOWS: usize = 5;

/// State for exactly one crawl invocation. Never persisted, never shared
/// across invocations.
pub struct CrawlState {
    /// URLs fetched in this invocation. Guarantees fetch-at-most-once and
    /// termination on cyclic page graphs.
    pub visited: HashSet<String>,
    seen_ids: HashSet<String>,
    events: Vec<EventRecord>,
}

impl CrawlState {
    fn new() -> Self {
        Self {
            visited: HashSet::new(),
            seen_ids: HashSet::new(),
            events: Vec::new(),
        }
    }

    /// Accumulate records, collapsing duplicates by external identifier.
    fn absorb(&mut self, records: Vec<EventRecord>) {
        for record in records {
            if self.seen_ids.insert(record.external_id.clone()) {
                self.events.push(record);
            }
        }
    }
}

/// One worklist entry.
struct PageJob {
    url: String,
    depth: u32,
    follow_pagination: bool,
}

pub struct PageCrawler {
    fetcher: Arc<dyn PageFetcher>,
    backend: Option<Arc<dyn CompletionBackend>>,
    hints: Arc<dyn SelectorHints>,
    pagination: PaginationEngine,
}

impl PageCrawler {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        renderer: Option<Arc<dyn PageRenderer>>,
        backend: Option<Arc<dyn CompletionBackend>>,
        hints: Arc<dyn SelectorHints>,
        failure_log: FailureLog,
    ) -> Self {
        let pagination =
            PaginationEngine::new(fetcher.clone(), renderer, backend.clone(), failure_log);
        Self {
            fetcher,
            backend,
            hints,
            pagination,
        }
    }

    /// Assemble a crawler from environment configuration. Model and
    /// renderer backends join only when configured.
    pub fn from_config(config: &Config) -> Self {
        let backend: Option<Arc<dyn CompletionBackend>> =
            config.openai_api_key.as_deref().map(|key| {
                let mut client = OpenAiClient::new(key, &config.openai_model);
                if let Some(base_url) = config.openai_api_url.as_deref() {
                    client = client.with_base_url(base_url);
                }
                Arc::new(client) as Arc<dyn CompletionBackend>
            });
        let renderer: Option<Arc<dyn PageRenderer>> =
            config.browserless_url.as_deref().map(|base_url| {
                Arc::new(BrowserlessRenderer::new(
                    base_url,
                    config.browserless_token.as_deref(),
                )) as Arc<dyn PageRenderer>
            });

        Self::new(
            Arc::new(HttpFetcher::new()),
            renderer,
            backend,
            Arc::new(NoHints),
            FailureLog::new(config.failure_log_path.clone()),
        )
    }

    /// Collect events starting from `url` with the default depth budget.
    pub async fn collect_events(&self, url: &str) -> Result<Vec<EventRecord>, ScoutError> {
        self.collect_events_with_depth(url, DEFAULT_MAX_DEPTH).await
    }

    /// Collect events with an explicit depth budget.
    pub async fn collect_events_with_depth(
        &self,
        url: &str,
        max_depth: u32,
    ) -> Result<Vec<EventRecord>, ScoutError> {
        let mut state = CrawlState::new();
        let mut worklist = vec![PageJob {
            url: url.to_string(),
            depth: max_depth,
            follow_pagination: true,
        }];

        while let Some(job) = worklist.pop() {
            if job.depth == 0 {
                debug!(url = %job.url, "Depth budget exhausted");
                continue;
            }
            if !state.visited.insert(job.url.clone()) {
                debug!(url = %job.url, "Already visited");
                continue;
            }

            // One absorption boundary per URL: a failed page contributes
            // zero events and never aborts its siblings.
            match self.process_page(&job, &mut state).await {
                Ok(followups) => {
                    for followup in followups.into_iter().rev() {
                        worklist.push(followup);
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(url = %job.url, error = %e, "Page contributed no events"),
            }
        }

        info!(
            url,
            events = state.events.len(),
            visited = state.visited.len(),
            "Crawl complete"
        );
        Ok(state.events)
    }

    /// Expose pagination discovery for callers that already hold a page.
    pub async fn detect_pagination(
        &self,
        url: &str,
        html: &str,
    ) -> Result<PaginationResult, ScoutError> {
        self.pagination.detect(url, html).await
    }

    /// Process one page through its phases: fetch, structured or
    /// candidate extraction, month merge, pagination, frame backoff.
    async fn process_page(
        &self,
        job: &PageJob,
        state: &mut CrawlState,
    ) -> Result<Vec<PageJob>, ScoutError> {
        let mut followups = Vec::new();

        debug!(url = %job.url, depth = job.depth, phase = "fetching", "Processing page");
        let html = self.fetcher.fetch(&job.url).await?;

        // Structured data first: cheapest and most reliable.
        let mut page_events = extract_structured_events(&html, &job.url);
        if !page_events.is_empty() {
            debug!(url = %job.url, count = page_events.len(), "Structured events found");
        } else if let Some(backend) = &self.backend {
            followups.extend(
                self.extract_candidates(backend.as_ref(), job, &html, &mut page_events)
                    .await?,
            );
        } else {
            debug!(url = %job.url, "No structured data and no model backend configured");
        }

        // Month-paged calendars merge additively with whatever the page
        // itself produced.
        let resolver = CalendarResolver::new(self.fetcher.as_ref());
        page_events.extend(resolver.resolve_months(&job.url, &mut state.visited).await);

        if job.follow_pagination && job.depth > 1 {
            debug!(url = %job.url, phase = "following_pagination", "Consulting pagination engine");
            let outcome = self.pagination.detect(&job.url, &html).await?;
            for next_url in outcome.next_urls.iter().take(MAX_PAGINATION_FOLLOWS) {
                followups.push(PageJob {
                    url: next_url.clone(),
                    // One level only, and never chase pagination from a
                    // pagination child.
                    depth: (job.depth - 1).min(1),
                    follow_pagination: false,
                });
            }
        }

        if page_events.is_empty() {
            debug!(url = %job.url, phase = "following_iframe", "Probing for calendar iframe");
            if let Some(frame_url) = find_calendar_iframe(&html, &job.url) {
                followups.push(PageJob {
                    url: frame_url,
                    depth: job.depth - 1,
                    follow_pagination: job.follow_pagination,
                });
            }
        }

        debug!(url = %job.url, phase = "done", events = page_events.len(), "Page processed");
        state.absorb(page_events);
        Ok(followups)
    }

    /// Candidate detection, context extraction, model dispatch, and link
    /// backoff for one page without structured data.
    async fn extract_candidates(
        &self,
        backend: &dyn CompletionBackend,
        job: &PageJob,
        html: &str,
        page_events: &mut Vec<EventRecord>,
    ) -> Result<Vec<PageJob>, ScoutError> {
        debug!(url = %job.url, phase = "extracting_candidates", "Scanning for candidate blocks");
        let hint_selectors = self
            .hints
            .selectors_for(&domain_of(&job.url))
            .await
            .unwrap_or_default();
        let blocks = detect_candidates(html, &hint_selectors);

        debug!(url = %job.url, phase = "dispatching", candidates = blocks.len(), "Dispatching candidates to model");
        let extractor = CandidateExtractor::new(backend);
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let mut followups = Vec::new();

        for block in &blocks {
            match extractor.extract(block, &job.url, &today).await {
                Ok(Some(record)) => page_events.push(record),
                Ok(None) if job.depth > 1 => {
                    // Link backoff: a candidate that yields nothing may
                    // still link to a page that does.
                    debug!(url = %job.url, phase = "following_links", "Candidate yielded no event, harvesting links");
                    for link in candidate_links(&block.html, &job.url) {
                        followups.push(PageJob {
                            url: link,
                            depth: job.depth - 1,
                            follow_pagination: false,
                        });
                    }
                }
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(url = %job.url, error = %e, "Candidate discarded"),
            }
        }
        Ok(followups)
    }
}

fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_extraction_is_lossy_but_safe() {
        assert_eq!(domain_of("https://Example.ORG/events"), "example.org");
        assert_eq!(domain_of("not a url"), "");
    }

    #[test]
    fn crawl_state_deduplicates_by_external_id() {
        let mut state = CrawlState::new();
        let record = EventRecord {
            external_id: "example.org:abc".into(),
            title: "One".into(),
            description: String::new(),
            location: Default::default(),
            organizer: None,
            start: None,
            end: None,
            url: "https://example.org".into(),
            status: None,
            attendance_mode: None,
            tags: vec![],
        };
        state.absorb(vec![record.clone(), record.clone()]);
        state.absorb(vec![record]);
        assert_eq!(state.events.len(), 1);
    }
}
