//! Pagination discovery: a fixed cascade of detection strategies sharing
//! one confidence threshold.
//!
//! Strategy order is frame navigation, markup heuristics, rendered-DOM
//! probing, then the model fallback. The first result clearing the
//! threshold short-circuits the cascade; otherwise the attempted strategy
//! with the most candidate links wins; a page where nothing fires is
//! logged for offline analysis.

pub mod failure;
mod frame;
mod markup;
mod model;
mod rendered;

pub use failure::{FailureLog, FailureRecord, PageSignals, StrategyAttempt};
pub use frame::FrameStrategy;
pub use markup::MarkupStrategy;
pub use model::{ModelStrategy, PaginationAnalysis};
pub use rendered::RenderedStrategy;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use ai_client::CompletionBackend;
use eventscout_common::{PaginationResult, ScoutError, StrategyKind};

use crate::fetch::PageFetcher;
use crate::render::PageRenderer;

/// A strategy wins outright only above this confidence.
pub const CONFIDENCE_THRESHOLD: f32 = 0.8;

/// One page as the strategies see it.
pub struct PageContext<'a> {
    pub url: &'a str,
    pub html: &'a str,
}

/// One interchangeable detection strategy.
///
/// `Ok(None)` means the strategy found nothing, including any internal
/// fetch/render/model failure, which it absorbs itself. Only quota
/// exhaustion may surface as an error.
#[async_trait]
pub trait PaginationStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;
    async fn attempt(&self, page: &PageContext<'_>) -> Result<Option<PaginationResult>, ScoutError>;
}

pub struct PaginationEngine {
    strategies: Vec<Box<dyn PaginationStrategy>>,
    failure_log: FailureLog,
}

impl PaginationEngine {
    /// Assemble the cascade. The rendered and model strategies join only
    /// when their backends are configured.
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        renderer: Option<Arc<dyn PageRenderer>>,
        backend: Option<Arc<dyn CompletionBackend>>,
        failure_log: FailureLog,
    ) -> Self {
        let mut strategies: Vec<Box<dyn PaginationStrategy>> = vec![
            Box::new(FrameStrategy::new(fetcher)),
            Box::new(MarkupStrategy),
        ];
        if let Some(renderer) = renderer {
            strategies.push(Box::new(RenderedStrategy::new(renderer)));
        }
        if let Some(backend) = backend {
            strategies.push(Box::new(ModelStrategy::new(backend)));
        }
        Self {
            strategies,
            failure_log,
        }
    }

    /// Run the cascade over one page.
    pub async fn detect(&self, url: &str, html: &str) -> Result<PaginationResult, ScoutError> {
        let page = PageContext { url, html };
        let mut attempts = Vec::new();
        let mut candidates: Vec<PaginationResult> = Vec::new();

        for strategy in &self.strategies {
            let kind = strategy.kind();
            match strategy.attempt(&page).await? {
                Some(result) => {
                    debug!(
                        url,
                        strategy = kind.as_str(),
                        confidence = result.confidence,
                        links = result.next_urls.len(),
                        pattern = %result.pattern,
                        "Strategy produced a result"
                    );
                    attempts.push(StrategyAttempt {
                        strategy: kind.as_str().to_string(),
                        confidence: result.confidence,
                    });
                    if result.confidence > CONFIDENCE_THRESHOLD && !result.next_urls.is_empty() {
                        info!(
                            url,
                            strategy = kind.as_str(),
                            confidence = result.confidence,
                            pattern = %result.pattern,
                            "Pagination detected"
                        );
                        return Ok(result);
                    }
                    candidates.push(result);
                }
                None => attempts.push(StrategyAttempt {
                    strategy: kind.as_str().to_string(),
                    confidence: 0.0,
                }),
            }
        }

        // No strategy cleared the bar: take whichever surfaced the most
        // candidate links.
        let best = candidates
            .into_iter()
            .filter(|r| !r.next_urls.is_empty())
            .max_by_key(|r| r.next_urls.len());
        match best {
            Some(result) => {
                info!(
                    url,
                    strategy = result.strategy.as_str(),
                    confidence = result.confidence,
                    "Pagination selected below threshold"
                );
                Ok(result)
            }
            None => {
                self.failure_log.record(url, html, attempts);
                Ok(PaginationResult::none())
            }
        }
    }
}

/// Resolve hrefs against a base, drop the unresolvable, and deduplicate
/// while preserving order.
pub(crate) fn dedup_resolved<'a>(
    hrefs: impl Iterator<Item = &'a str>,
    base: Option<&Url>,
) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut urls = Vec::new();
    for href in hrefs {
        let href = href.trim();
        if href.is_empty() {
            continue;
        }
        let resolved = if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else {
            match base.and_then(|b| b.join(href).ok()) {
                Some(u) => u.to_string(),
                None => continue,
            }
        };
        if seen.insert(resolved.clone()) {
            urls.push(resolved);
        }
    }
    urls
}
