pub mod calendar;
pub mod candidates;
pub mod crawler;
pub mod extractor;
pub mod fetch;
pub mod hints;
pub mod normalizer;
pub mod pagination;
pub mod render;

pub use crawler::{CrawlState, PageCrawler, DEFAULT_MAX_DEPTH};
pub use fetch::{HttpFetcher, PageFetcher};
pub use hints::{NoHints, SelectorHints};
pub use pagination::{FailureLog, PaginationEngine, CONFIDENCE_THRESHOLD};
pub use render::{BrowserlessRenderer, PageRenderer};
