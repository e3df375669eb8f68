use async_trait::async_trait;

/// Hints collaborator (consumed only): previously-discovered candidate
/// selectors for a domain, cached by an external service. When supplied
/// they seed the front of the candidate selector list.
///
/// A lookup failure is the same as no hints; implementations absorb their
/// own errors.
#[async_trait]
pub trait SelectorHints: Send + Sync {
    async fn selectors_for(&self, domain: &str) -> Option<Vec<String>>;
}

/// Default when no hints service is configured.
pub struct NoHints;

#[async_trait]
impl SelectorHints for NoHints {
    async fn selectors_for(&self, _domain: &str) -> Option<Vec<String>> {
        None
    }
}
