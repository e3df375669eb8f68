//! Normalizes structured event objects embedded in pages into
//! [`EventRecord`]s.
//!
//! Accepts the three shapes structured data ships in (a single event
//! object, an array of them, or a graph container) and reconciles the
//! mixed date/time encodings found in the wild into timestamps with
//! explicit offsets. A malformed block is skipped; it never aborts the
//! rest of the page.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use eventscout_common::{derive_external_id, EventLocation, EventRecord, ScoutError};

/// Extract and normalize every structured event in a document.
pub fn extract_structured_events(html: &str, page_url: &str) -> Vec<EventRecord> {
    let document = Html::parse_document(html);
    let script_selector =
        Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector");
    let base = Url::parse(page_url).ok();

    let mut records = Vec::new();
    for script in document.select(&script_selector) {
        let raw: String = script.text().collect();
        let data: Value = match serde_json::from_str(raw.trim()) {
            Ok(v) => v,
            Err(e) => {
                debug!(url = page_url, error = %e, "Skipping unparseable structured data block");
                continue;
            }
        };

        for item in event_objects(&data) {
            match normalize_event(item, &document, page_url, base.as_ref()) {
                Ok(record) => records.push(record),
                Err(e) => warn!(url = page_url, error = %e, "Skipping malformed event block"),
            }
        }
    }
    records
}

/// Collect event objects from a structured data blob: a bare event, an
/// array of them, or a graph container.
fn event_objects(data: &Value) -> Vec<&Value> {
    match data {
        Value::Array(items) => items.iter().filter(|v| is_event(v)).collect(),
        Value::Object(map) => {
            if is_event(data) {
                vec![data]
            } else if let Some(Value::Array(graph)) = map.get("@graph") {
                graph.iter().filter(|v| is_event(v)).collect()
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

fn is_event(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t == "Event",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("Event")),
        _ => false,
    }
}

fn normalize_event(
    item: &Value,
    document: &Html,
    page_url: &str,
    base: Option<&Url>,
) -> Result<EventRecord, ScoutError> {
    let title = item
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ScoutError::Parse("event block has no name".to_string()))?;

    let start_raw = combine_date_time(item.get("startDate"), item.get("startTime"));
    let start = start_raw.as_deref().and_then(|v| parse_timestamp(v, false));
    let start_was_date_only = start_raw.as_deref().map(date_only).unwrap_or(false);

    let end_raw = combine_date_time(item.get("endDate"), item.get("endTime"));
    let mut end = end_raw.as_deref().and_then(|v| parse_timestamp(v, true));
    if end.is_none() {
        let duration = item
            .get("duration")
            .and_then(Value::as_str)
            .and_then(parse_iso_duration);
        end = match (start, duration) {
            (Some(start), Some(duration)) => Some(start + duration),
            // With nothing better to go on, a date-only event runs to the
            // end of its day.
            (Some(_), None) if start_was_date_only => {
                start_raw.as_deref().and_then(|v| parse_timestamp(v, true))
            }
            _ => None,
        };
    }
    if let (Some(s), Some(e)) = (start, end) {
        if e < s {
            debug!(url = page_url, title, "Dropping end timestamp that precedes start");
            end = None;
        }
    }

    let url = item
        .get("url")
        .and_then(Value::as_str)
        .map(|href| resolve_href(href, base))
        .or_else(|| find_title_anchor(document, title, base))
        .unwrap_or_else(|| page_url.to_string());

    let start_key = start.map(|s| s.to_rfc3339()).unwrap_or_default();
    let external_id = item
        .get("@id")
        .and_then(Value::as_str)
        .or_else(|| item.get("url").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| derive_external_id(page_url, title, &start_key));

    Ok(EventRecord {
        external_id,
        title: title.to_string(),
        description: item
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        location: normalize_location(item.get("location")),
        organizer: normalize_organizer(item.get("organizer")),
        start,
        end,
        url,
        status: item.get("eventStatus").and_then(trailing_tag),
        attendance_mode: item.get("eventAttendanceMode").and_then(trailing_tag),
        tags: normalize_keywords(item.get("keywords")),
    })
}

/// Join separate date and time-of-day fields into one parseable string.
fn combine_date_time(date: Option<&Value>, time: Option<&Value>) -> Option<String> {
    let date = date.and_then(Value::as_str).map(str::trim)?;
    if date.is_empty() {
        return None;
    }
    match time.and_then(Value::as_str).map(str::trim) {
        Some(time) if date_only(date) && !time.is_empty() => Some(format!("{date}T{time}")),
        _ => Some(date.to_string()),
    }
}

fn date_only(value: &str) -> bool {
    !value.contains('T')
}

/// Parse a date or datetime string into a timestamp with explicit offset.
///
/// Datetimes without an offset are taken as UTC. A date-only value lands
/// on start-of-day, or 23:59:59 when `end_of_day` is set.
pub(crate) fn parse_timestamp(value: &str, end_of_day: bool) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if value.contains('T') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt);
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return Some(naive.and_utc().fixed_offset());
            }
        }
        return None;
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59).expect("valid time")
    } else {
        NaiveTime::MIN
    };
    Some(date.and_time(time).and_utc().fixed_offset())
}

/// Parse an ISO 8601 duration of the `P[nD][T[nH][nM][nS]]` family.
fn parse_iso_duration(value: &str) -> Option<Duration> {
    let re = regex::Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$")
        .expect("valid regex");
    let caps = re.captures(value.trim())?;

    let part = |i: usize| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .unwrap_or(0)
    };
    let (days, hours, minutes, seconds) = (part(1), part(2), part(3), part(4));
    if days == 0 && hours == 0 && minutes == 0 && seconds == 0 {
        return None;
    }
    Some(
        Duration::days(days)
            + Duration::hours(hours)
            + Duration::minutes(minutes)
            + Duration::seconds(seconds),
    )
}

/// Location precedence: typed place object (kept verbatim) > name >
/// address > plain string > empty. Arrays use their first entry.
fn normalize_location(value: Option<&Value>) -> EventLocation {
    match value {
        Some(Value::Array(items)) => normalize_location(items.first()),
        Some(Value::String(s)) => EventLocation::Text(s.trim().to_string()),
        Some(object @ Value::Object(map)) => {
            if map.contains_key("@type") {
                return EventLocation::Structured(object.clone());
            }
            if let Some(name) = map.get("name").and_then(Value::as_str) {
                if !name.trim().is_empty() {
                    return EventLocation::Text(name.trim().to_string());
                }
            }
            if let Some(address) = map.get("address") {
                let flat = flatten_address(address);
                if !flat.is_empty() {
                    return EventLocation::Text(flat);
                }
            }
            EventLocation::default()
        }
        _ => EventLocation::default(),
    }
}

fn flatten_address(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Object(map) => ["streetAddress", "addressLocality", "addressRegion", "postalCode"]
            .iter()
            .filter_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    }
}

fn normalize_organizer(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::Array(items)) => normalize_organizer(items.first()),
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Object(map)) => map
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

/// Reduce a vocabulary URL like `https://schema.org/EventCancelled` to its
/// trailing tag.
fn trailing_tag(value: &Value) -> Option<String> {
    value
        .as_str()
        .and_then(|s| s.trim_end_matches('/').rsplit('/').next())
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

fn normalize_keywords(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn resolve_href(href: &str, base: Option<&Url>) -> String {
    match base {
        Some(base) => base
            .join(href.trim())
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string()),
        None => href.to_string(),
    }
}

/// Find an anchor whose visible text contains the event title
/// (case-insensitively) and resolve it against the page base.
fn find_title_anchor(document: &Html, title: &str, base: Option<&Url>) -> Option<String> {
    let anchor_selector = Selector::parse("a[href]").expect("valid selector");
    let needle = title.to_lowercase();

    for anchor in document.select(&anchor_selector) {
        let text: String = anchor.text().collect::<Vec<_>>().join(" ");
        if !text.to_lowercase().contains(&needle) {
            continue;
        }
        let href = anchor.value().attr("href").unwrap_or("").trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }
        return Some(resolve_href(href, base));
    }
    None
}
