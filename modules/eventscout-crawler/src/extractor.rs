//! Model-based structured extraction for one candidate block.

use ai_client::{AiClientError, CompletionBackend};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use eventscout_common::{derive_external_id, EventLocation, EventRecord, ScoutError};

use crate::candidates::{detail_link, CandidateBlock};
use crate::normalizer::parse_timestamp;

/// What the model returns for one candidate block.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedEvent {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    /// ISO 8601 start, e.g. `2025-06-01T18:00:00-05:00`.
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub url: Option<String>,
    /// Categories, event types, and keywords.
    pub tags: Vec<String>,
}

/// Wrapper making the no-event sentinel expressible under a strict
/// schema: `event` is null for fragments without a current or future
/// event.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CandidateExtraction {
    pub event: Option<ExtractedEvent>,
}

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract a single calendar event from a fragment of webpage text.

Rules:
- Fill only the fields defined by the schema.
- Normalize dates and times to ISO 8601; include a UTC offset when the
  text implies one, and use YYYY-MM-DD when only a day is given.
- Only extract events that are current or future relative to the date you
  are given. For past events, or fragments that do not describe one
  specific event, return null for the event field.
- Extract categories, event types, and keywords as tags."#;

/// Titles the model produces when it extracted nothing real.
const JUNK_TITLES: &[&str] = &["unable to extract", "page not found", "error loading"];

pub struct CandidateExtractor<'a> {
    backend: &'a dyn CompletionBackend,
}

impl<'a> CandidateExtractor<'a> {
    pub fn new(backend: &'a dyn CompletionBackend) -> Self {
        Self { backend }
    }

    /// Extract an event from one candidate block.
    ///
    /// `Ok(None)` covers every non-fatal miss: the model's null sentinel,
    /// a junk or empty title, and non-conforming output. Only quota
    /// exhaustion surfaces as an error.
    pub async fn extract(
        &self,
        block: &CandidateBlock,
        page_url: &str,
        current_date: &str,
    ) -> Result<Option<EventRecord>, ScoutError> {
        let user_prompt = format!(
            "Today is {current_date}.\nPage URL: {page_url}\n\nFragment:\n{}",
            block.prompt_text()
        );

        let extraction: CandidateExtraction =
            match ai_client::extract(self.backend, EXTRACTION_SYSTEM_PROMPT, &user_prompt).await {
                Ok(extraction) => extraction,
                Err(AiClientError::QuotaExhausted { status, message }) => {
                    return Err(ScoutError::QuotaExhausted(format!("status {status}: {message}")));
                }
                Err(e) => {
                    warn!(url = page_url, error = %e, "Candidate extraction failed");
                    return Ok(None);
                }
            };

        let Some(event) = extraction.event else {
            debug!(url = page_url, "Model reported no current event in fragment");
            return Ok(None);
        };

        let title = event.title.trim().to_string();
        if title.is_empty() {
            return Ok(None);
        }
        let lowered = title.to_lowercase();
        if JUNK_TITLES.iter().any(|junk| lowered.contains(junk)) {
            warn!(url = page_url, title, "Filtered junk extraction");
            return Ok(None);
        }

        let start = event.start_time.as_deref().and_then(|v| parse_timestamp(v, false));
        let mut end = event.end_time.as_deref().and_then(|v| parse_timestamp(v, true));
        if let (Some(s), Some(e)) = (start, end) {
            if e < s {
                end = None;
            }
        }

        // A detail link inside the block beats whatever the model guessed.
        let url = detail_link(&block.html, page_url)
            .or(event.url)
            .unwrap_or_else(|| page_url.to_string());

        let start_key = start.map(|s| s.to_rfc3339()).unwrap_or_default();
        Ok(Some(EventRecord {
            external_id: derive_external_id(page_url, &title, &start_key),
            title,
            description: event.description.unwrap_or_default(),
            location: event
                .location
                .map(EventLocation::Text)
                .unwrap_or_default(),
            organizer: None,
            start,
            end,
            url,
            status: None,
            attendance_mode: None,
            tags: event.tags,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct CannedBackend {
        response: serde_json::Value,
    }

    #[async_trait]
    impl CompletionBackend for CannedBackend {
        async fn structured(
            &self,
            _system: &str,
            _user: &str,
            _schema_name: &str,
            _schema: serde_json::Value,
        ) -> Result<serde_json::Value, AiClientError> {
            Ok(self.response.clone())
        }
    }

    struct QuotaBackend;

    #[async_trait]
    impl CompletionBackend for QuotaBackend {
        async fn structured(
            &self,
            _system: &str,
            _user: &str,
            _schema_name: &str,
            _schema: serde_json::Value,
        ) -> Result<serde_json::Value, AiClientError> {
            Err(AiClientError::QuotaExhausted {
                status: 429,
                message: "rate limited".into(),
            })
        }
    }

    fn block(html: &str) -> CandidateBlock {
        CandidateBlock {
            text: "Concert on June 1 at 7:00 PM".into(),
            html: html.into(),
            context: vec![],
        }
    }

    #[tokio::test]
    async fn converts_model_output_into_a_record() {
        let backend = CannedBackend {
            response: serde_json::json!({
                "event": {
                    "title": "Community Concert",
                    "description": "An evening of music",
                    "location": "Main Street Theater",
                    "start_time": "2025-06-01T19:00:00-05:00",
                    "end_time": "2025-06-01T21:00:00-05:00",
                    "url": null,
                    "tags": ["music", "free"]
                }
            }),
        };
        let extractor = CandidateExtractor::new(&backend);
        let record = extractor
            .extract(&block("<div></div>"), "https://example.org/events", "2025-05-20")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(record.title, "Community Concert");
        assert_eq!(record.url, "https://example.org/events");
        assert_eq!(record.start.unwrap().to_rfc3339(), "2025-06-01T19:00:00-05:00");
        assert!(record.external_id.starts_with("example.org:"));
        assert_eq!(record.tags, vec!["music", "free"]);
    }

    #[tokio::test]
    async fn null_sentinel_yields_nothing() {
        let backend = CannedBackend {
            response: serde_json::json!({ "event": null }),
        };
        let extractor = CandidateExtractor::new(&backend);
        let result = extractor
            .extract(&block("<div></div>"), "https://example.org", "2025-05-20")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn nonconforming_output_is_treated_as_no_event() {
        let backend = CannedBackend {
            response: serde_json::json!({ "unexpected": true }),
        };
        let extractor = CandidateExtractor::new(&backend);
        let result = extractor
            .extract(&block("<div></div>"), "https://example.org", "2025-05-20")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn quota_exhaustion_propagates() {
        let extractor = CandidateExtractor::new(&QuotaBackend);
        let err = extractor
            .extract(&block("<div></div>"), "https://example.org", "2025-05-20")
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn detail_link_overrides_model_url() {
        let backend = CannedBackend {
            response: serde_json::json!({
                "event": {
                    "title": "Workshop",
                    "description": null,
                    "location": null,
                    "start_time": "2025-06-02",
                    "end_time": null,
                    "url": "https://example.org/wrong",
                    "tags": []
                }
            }),
        };
        let extractor = CandidateExtractor::new(&backend);
        let record = extractor
            .extract(
                &block(r#"<div><a href="/events/42">Event details</a></div>"#),
                "https://example.org/list",
                "2025-05-20",
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.url, "https://example.org/events/42");
    }
}
