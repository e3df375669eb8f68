use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// One normalized calendar event.
///
/// Records are created fresh per call and handed to the caller;
/// persistence is an external collaborator's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Deterministic identifier deduplicating the same real-world event
    /// across repeated scrapes. Either a native id/url from the source or
    /// a `host:hex16` digest over (host, title, start).
    pub external_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: EventLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    /// Start timestamp, ISO 8601 with explicit offset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<FixedOffset>>,
    /// End timestamp. Never precedes `start` when both are present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<FixedOffset>>,
    /// Canonical URL for the event.
    pub url: String,
    /// Event status tag, e.g. `EventCancelled`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Attendance mode tag, e.g. `OnlineEventAttendanceMode`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance_mode: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Event location: either the source's structured place object preserved
/// verbatim, or a flattened human-readable string. `Text` is listed
/// first so untagged deserialization only falls through to `Structured`
/// for non-string values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventLocation {
    Text(String),
    Structured(serde_json::Value),
}

impl Default for EventLocation {
    fn default() -> Self {
        EventLocation::Text(String::new())
    }
}

impl EventLocation {
    pub fn is_empty(&self) -> bool {
        match self {
            EventLocation::Structured(v) => v.is_null(),
            EventLocation::Text(s) => s.is_empty(),
        }
    }
}

/// Which pagination-detection strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Frame,
    Markup,
    Rendered,
    Model,
    None,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Frame => "frame",
            StrategyKind::Markup => "markup",
            StrategyKind::Rendered => "rendered",
            StrategyKind::Model => "model",
            StrategyKind::None => "none",
        }
    }
}

/// Outcome of pagination discovery for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationResult {
    /// Ordered, deduplicated URLs of subsequent listing pages.
    pub next_urls: Vec<String>,
    pub strategy: StrategyKind,
    /// Scalar in [0,1] used to order and tie-break strategies. Not a
    /// calibrated probability.
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<u32>,
    /// Which pattern inside the strategy matched, for diagnostics.
    pub pattern: String,
}

impl PaginationResult {
    /// Empty result: no pagination found.
    pub fn none() -> Self {
        Self {
            next_urls: Vec::new(),
            strategy: StrategyKind::None,
            confidence: 0.0,
            total_pages: None,
            current_page: Some(1),
            pattern: "none".to_string(),
        }
    }
}

/// Derive a stable external identifier from event metadata.
///
/// The digest covers (source host, title, normalized start) so that
/// re-scraping an unchanged event always lands on the same id, while a
/// rescheduled event gets a new one.
pub fn derive_external_id(page_url: &str, title: &str, start: &str) -> String {
    let host = Url::parse(page_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    let digest = Sha256::digest(format!("{host}|{title}|{start}").as_bytes());
    format!("{host}:{}", &hex::encode(digest)[..16])
}

/// Short content digest for deduplicating failure records.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(digest)[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_id_is_deterministic() {
        let a = derive_external_id("https://example.org/events", "Book Club", "2025-03-01T00:00:00+00:00");
        let b = derive_external_id("https://example.org/events", "Book Club", "2025-03-01T00:00:00+00:00");
        assert_eq!(a, b);
        assert!(a.starts_with("example.org:"));
        assert_eq!(a.len(), "example.org:".len() + 16);
    }

    #[test]
    fn external_id_changes_with_start() {
        let a = derive_external_id("https://example.org/events", "Book Club", "2025-03-01T00:00:00+00:00");
        let b = derive_external_id("https://example.org/events", "Book Club", "2025-03-08T00:00:00+00:00");
        assert_ne!(a, b);
    }

    #[test]
    fn external_id_survives_unparseable_url() {
        let id = derive_external_id("not a url", "Thing", "2025-01-01");
        assert!(id.starts_with(':'));
        assert_eq!(id.len(), 17);
    }

    #[test]
    fn content_hash_is_short_and_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_eq!(content_hash("abc").len(), 12);
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }

    #[test]
    fn event_record_timestamps_serialize_with_offset() {
        let record = EventRecord {
            external_id: "example.org:abcd".into(),
            title: "Concert".into(),
            description: String::new(),
            location: EventLocation::Text("Main Hall".into()),
            organizer: None,
            start: Some("2025-03-01T19:00:00+00:00".parse().unwrap()),
            end: None,
            url: "https://example.org/concert".into(),
            status: None,
            attendance_mode: None,
            tags: vec![],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["start"], "2025-03-01T19:00:00+00:00");
        assert!(json.get("end").is_none());
    }
}
