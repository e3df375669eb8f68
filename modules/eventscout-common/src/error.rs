use thiserror::Error;

/// Failure taxonomy for one crawl invocation.
///
/// Everything except `QuotaExhausted` is recovered at the smallest scope
/// that produced it (one structured block, one candidate, one URL) and
/// converts into "contributes zero events". `QuotaExhausted` propagates:
/// retrying against a rate-limited or unfunded model account is futile.
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Model quota exhausted: {0}")]
    QuotaExhausted(String),
}

impl ScoutError {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Only quota exhaustion is allowed to abort a crawl.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::QuotaExhausted(_))
    }
}
