//! Candidate-block detection: find document fragments that plausibly
//! describe events, before any model confirmation.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Ordered selector families: explicit event/calendar containers first,
/// generic containers last. Domain hints, when present, are tried before
/// all of these.
pub const CANDIDATE_SELECTORS: &[&str] = &[
    "article[class*='calendar']",
    "div[class*='calendar-item']",
    "div[class*='event-item']",
    ".views-row",
    ".node-event",
    "[class*='event']",
    "[class*='calendar']",
    "[class*='schedule']",
    "[class*='program']",
    "[class*='activity']",
    "[id*='event']",
    "[id*='calendar']",
    "[id*='schedule']",
    "article",
    "section",
    "li",
];

/// Text-size bounds for a plausible single-event fragment. Anything
/// smaller is a label; anything larger is a page container.
const MIN_TEXT_LEN: usize = 50;
const MAX_TEXT_LEN: usize = 5000;

/// How many preceding siblings to inspect for a shared date header.
const CONTEXT_SIBLINGS: usize = 3;

/// A fragment judged plausibly event-bearing.
#[derive(Debug, Clone)]
pub struct CandidateBlock {
    /// Clean text with script/style content stripped.
    pub text: String,
    /// Outer HTML of the originating node, kept for link backoff and
    /// detail-link matching.
    pub html: String,
    /// Date-bearing preceding-sibling texts, in document order.
    pub context: Vec<String>,
}

impl CandidateBlock {
    /// Text handed to the model: recovered date headers first, then the
    /// fragment itself.
    pub fn prompt_text(&self) -> String {
        if self.context.is_empty() {
            self.text.clone()
        } else {
            format!("{}\n{}", self.context.join("\n"), self.text)
        }
    }
}

/// Matches tokens that suggest a date or time: numeric dates, clock
/// times, month and weekday names, ordinal day suffixes.
fn datetime_token_pattern() -> Regex {
    Regex::new(
        r"(?ix)
        \b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b |
        \b\d{1,2}:\d{2}(\s*(am|pm))?\b |
        \b(january|february|march|april|may|june|july|august|september|october|november|december)\b |
        \b(jan|feb|mar|apr|jun|jul|aug|sep|oct|nov|dec)\b |
        \b(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b |
        \b(mon|tue|wed|thu|fri|sat|sun)\b |
        \b\d{1,2}(st|nd|rd|th)\b",
    )
    .expect("valid regex")
}

/// Scan a document for candidate blocks.
///
/// Elements are accepted when a selector family matches, the text carries
/// a date/time token, and the text length is within bounds. Nested
/// matches collapse to the outermost element.
pub fn detect_candidates(html: &str, hint_selectors: &[String]) -> Vec<CandidateBlock> {
    let document = Html::parse_document(html);
    let token_re = datetime_token_pattern();

    let mut matched: Vec<ElementRef> = Vec::new();
    let selectors = hint_selectors
        .iter()
        .map(String::as_str)
        .chain(CANDIDATE_SELECTORS.iter().copied());

    for selector in selectors {
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&parsed) {
            if matches!(element.value().name(), "body" | "html") {
                continue;
            }
            if matched.iter().any(|m| m.id() == element.id()) {
                continue;
            }
            let text = visible_text(&element);
            let len = text.trim().len();
            if !(MIN_TEXT_LEN..=MAX_TEXT_LEN).contains(&len) {
                continue;
            }
            if !token_re.is_match(&text) {
                continue;
            }
            matched.push(element);
        }
    }

    matched
        .iter()
        .filter(|element| {
            // Outermost wins: drop anything nested inside another match.
            !matched
                .iter()
                .any(|other| other.id() != element.id() && is_ancestor_of(other, element))
        })
        .map(|element| build_block(element, &token_re))
        .collect()
}

fn is_ancestor_of(ancestor: &ElementRef, element: &ElementRef) -> bool {
    element.ancestors().any(|node| node.id() == ancestor.id())
}

fn build_block(element: &ElementRef, token_re: &Regex) -> CandidateBlock {
    let mut context = Vec::new();
    let mut inspected = 0;
    for sibling in element.prev_siblings() {
        let Some(sibling) = ElementRef::wrap(sibling) else {
            continue;
        };
        if inspected >= CONTEXT_SIBLINGS {
            break;
        }
        inspected += 1;
        let text = visible_text(&sibling);
        let text = text.trim();
        if !text.is_empty() && token_re.is_match(text) {
            context.push(text.to_string());
        }
    }
    context.reverse();

    CandidateBlock {
        text: visible_text(element).trim().to_string(),
        html: element.html(),
        context,
    }
}

/// Text content with script/style/noscript subtrees stripped.
fn visible_text(element: &ElementRef) -> String {
    let mut segments = Vec::new();
    collect_text(element, &mut segments);
    segments.join("\n")
}

fn collect_text(element: &ElementRef, out: &mut Vec<String>) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            if matches!(child_element.value().name(), "script" | "style" | "noscript") {
                continue;
            }
            collect_text(&child_element, out);
        } else if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        }
    }
}

/// Links inside one candidate block, resolved and deduplicated. Used for
/// link backoff when the block yields no event.
pub fn candidate_links(block_html: &str, base_url: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(block_html);
    let anchor_selector = Selector::parse("a[href]").expect("valid selector");
    let base = Url::parse(base_url).ok();

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();
    for anchor in fragment.select(&anchor_selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(resolved) = resolve_link(href, base.as_ref()) else {
            continue;
        };
        if seen.insert(resolved.clone()) {
            links.push(resolved);
        }
    }
    links
}

/// The most event-specific link inside a block: "event details"-style
/// anchors win, then any navigable link. Supplies the canonical URL ahead
/// of the model's answer.
pub fn detail_link(block_html: &str, base_url: &str) -> Option<String> {
    let fragment = Html::parse_fragment(block_html);
    let anchor_selector = Selector::parse("a[href]").expect("valid selector");
    let base = Url::parse(base_url).ok();

    let mut fallback = None;
    for anchor in fragment.select(&anchor_selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(resolved) = resolve_link(href, base.as_ref()) else {
            continue;
        };
        let text: String = anchor.text().collect::<Vec<_>>().join(" ").to_lowercase();
        if (text.contains("event") && text.contains("detail"))
            || text.contains("event website")
            || href.contains("/node/")
        {
            return Some(resolved);
        }
        fallback.get_or_insert(resolved);
    }
    fallback
}

fn resolve_link(href: &str, base: Option<&Url>) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    base.and_then(|b| b.join(href).ok()).map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<html><body>
        <div class="event-listing">
            <h2>Community Concert</h2>
            <p>Join us for an evening of music on January 15th, 2025 at 7:00 PM</p>
            <p>Location: Main Street Theater</p>
            <a href="/concert">More details</a>
        </div>
        <div class="news-item">
            <p>This is just news content without any temporal references in it at all, padded to be long enough.</p>
        </div>
        <script>console.log("January should not leak from here");</script>
    </body></html>"#;

    #[test]
    fn detects_blocks_with_datetime_tokens() {
        let blocks = detect_candidates(LISTING, &[]);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].text.contains("Community Concert"));
    }

    #[test]
    fn strips_script_content() {
        let html = r#"<html><body><div class="event-block">
            <p>Gallery opening Friday May 2 at 6:00 PM, refreshments provided for all attendees.</p>
            <script>var when = "Friday";</script>
        </div></body></html>"#;
        let blocks = detect_candidates(html, &[]);
        assert_eq!(blocks.len(), 1);
        assert!(!blocks[0].text.contains("var when"));
    }

    #[test]
    fn rejects_blocks_outside_length_bounds() {
        let tiny = r#"<html><body><div class="event">May 2</div></body></html>"#;
        assert!(detect_candidates(tiny, &[]).is_empty());

        let huge = format!(
            r#"<html><body><div class="event">January 15 {}</div></body></html>"#,
            "x".repeat(6000)
        );
        assert!(detect_candidates(&huge, &[]).is_empty());
    }

    #[test]
    fn collapses_nested_matches_to_outermost() {
        let html = r#"<html><body>
            <div class="calendar-item">
                <article class="event-item">
                    <p>Saturday March 8, 2:00 PM seed starting workshop in the greenhouse, all levels welcome.</p>
                </article>
            </div>
        </body></html>"#;
        let blocks = detect_candidates(html, &[]);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].html.contains("calendar-item") || blocks[0].html.contains("event-item"));
        // The outer container is the one kept.
        assert!(blocks[0].html.starts_with("<div"));
    }

    #[test]
    fn captures_date_bearing_preceding_siblings() {
        let html = r#"<html><body>
            <h3>Saturday, June 7</h3>
            <div class="views-row">
                <p>Morning bird walk at the reservoir, 8:00 AM sharp. Binoculars available to borrow.</p>
            </div>
        </body></html>"#;
        let blocks = detect_candidates(html, &[]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].context, vec!["Saturday, June 7"]);
        assert!(blocks[0].prompt_text().starts_with("Saturday, June 7"));
    }

    #[test]
    fn hint_selectors_seed_detection() {
        let html = r#"<html><body>
            <div class="cp-item">
                <p>Board meeting Tuesday at 6:30 PM in the community room, agenda posted at the door.</p>
            </div>
        </body></html>"#;
        assert!(detect_candidates(html, &[]).is_empty());

        let hints = vec![".cp-item".to_string()];
        let blocks = detect_candidates(html, &hints);
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn candidate_links_resolve_and_dedup() {
        let html = r##"<div>
            <a href="/a">One</a>
            <a href="/a">One again</a>
            <a href="https://other.example.com/b">Two</a>
            <a href="mailto:x@example.org">Mail</a>
            <a href="#anchor">Jump</a>
        </div>"##;
        let links = candidate_links(html, "https://example.org/events");
        assert_eq!(
            links,
            vec!["https://example.org/a", "https://other.example.com/b"]
        );
    }

    #[test]
    fn detail_link_prefers_event_detail_anchors() {
        let html = r#"<div>
            <a href="/share">Share this</a>
            <a href="/events/42">Event details</a>
        </div>"#;
        let link = detail_link(html, "https://example.org");
        assert_eq!(link.as_deref(), Some("https://example.org/events/42"));

        let plain = r#"<div><a href="/somewhere">Read more</a></div>"#;
        let link = detail_link(plain, "https://example.org");
        assert_eq!(link.as_deref(), Some("https://example.org/somewhere"));
    }
}
