//! Embedded-calendar handling: iframe detection, month-paged calendar URL
//! enumeration, and the recency window applied to merged calendar events.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use eventscout_common::EventRecord;

use crate::fetch::PageFetcher;
use crate::normalizer::extract_structured_events;

/// Vocabulary marking an iframe or URL as a calendar/event system.
/// The tail entries are hosted library-calendar vendors.
pub const CALENDAR_KEYWORDS: &[&str] = &[
    "calendar",
    "event",
    "schedule",
    "booking",
    "libcal",
    "springshare",
    "assabet",
    "evanced",
];

/// How far back a merged calendar event may be dated and still be kept.
const TRAILING_WINDOW_DAYS: i64 = 7;

/// How many month variants to enumerate, current month included.
const MONTH_SPAN: u32 = 2;

/// Find the first iframe whose resolved source looks like a calendar.
pub fn find_calendar_iframe(html: &str, base_url: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let frame_selector = Selector::parse("iframe[src]").expect("valid selector");
    let base = Url::parse(base_url).ok()?;

    for frame in document.select(&frame_selector) {
        let src = match frame.value().attr("src") {
            Some(src) if !src.trim().is_empty() => src.trim(),
            _ => continue,
        };
        let resolved = match base.join(src) {
            Ok(u) => u,
            Err(_) => continue,
        };
        let lowered = resolved.as_str().to_lowercase();
        if CALENDAR_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            debug!(frame = %resolved, "Found calendar iframe");
            return Some(resolved.to_string());
        }
    }
    None
}

/// Does this URL's path look like a month-pageable calendar?
pub fn is_calendar_url(page_url: &str) -> bool {
    Url::parse(page_url)
        .map(|u| {
            let path = u.path().to_lowercase();
            CALENDAR_KEYWORDS.iter().any(|k| path.contains(k))
        })
        .unwrap_or(false)
}

/// Enumerate the month-variant URLs for a calendar page: the current and
/// next month, `month=`/`year=` query parameters updated in place or
/// appended. The page's own URL is excluded.
pub fn month_variant_urls(page_url: &str, today: NaiveDate) -> Vec<String> {
    if !is_calendar_url(page_url) {
        return Vec::new();
    }
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };

    let mut variants = Vec::new();
    let mut month = today;
    for _ in 0..MONTH_SPAN {
        let variant = with_month_params(&base, month.month(), month.year());
        if variant != page_url && !variants.contains(&variant) {
            variants.push(variant);
        }
        month = match month.checked_add_months(Months::new(1)) {
            Some(next) => next,
            None => break,
        };
    }
    variants
}

/// Rewrite the `month`/`year` query parameters, appending them when absent.
fn with_month_params(url: &Url, month: u32, year: i32) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut saw_month = false;
    let mut saw_year = false;
    for (key, value) in pairs.iter_mut() {
        if key == "month" {
            *value = month.to_string();
            saw_month = true;
        } else if key == "year" {
            *value = year.to_string();
            saw_year = true;
        }
    }
    if !saw_month {
        pairs.push(("month".to_string(), month.to_string()));
    }
    if !saw_year {
        pairs.push(("year".to_string(), year.to_string()));
    }

    let mut variant = url.clone();
    variant
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    variant.to_string()
}

/// Advance an existing `month=` parameter by one, rolling the year over.
/// Used for script-driven month navigation where only the URL carries
/// state. Returns nothing when the URL has no month parameter.
pub fn bump_month_params(url_str: &str) -> Option<String> {
    let url = Url::parse(url_str).ok()?;
    let month: u32 = url
        .query_pairs()
        .find(|(k, _)| k == "month")
        .and_then(|(_, v)| v.parse().ok())?;
    let year: i32 = url
        .query_pairs()
        .find(|(k, _)| k == "year")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or_else(|| Utc::now().year());

    let (next_month, next_year) = if month >= 12 { (1, year + 1) } else { (month + 1, year) };
    Some(with_month_params(&url, next_month, next_year))
}

/// Keep events dated within the trailing window or later; events without a
/// parseable date are always kept.
pub fn within_recent_window(record: &EventRecord, now: DateTime<Utc>) -> bool {
    match record.start {
        None => true,
        Some(start) => start >= (now - Duration::days(TRAILING_WINDOW_DAYS)).fixed_offset(),
    }
}

/// Month-paged calendar resolution: fetch each month variant of a calendar
/// URL, normalize its structured events, and window the merge.
pub struct CalendarResolver<'a> {
    fetcher: &'a dyn PageFetcher,
}

impl<'a> CalendarResolver<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher) -> Self {
        Self { fetcher }
    }

    /// Fetch and normalize the month variants of `page_url`, honoring the
    /// crawl-wide fetch-once guarantee via `visited`.
    pub async fn resolve_months(
        &self,
        page_url: &str,
        visited: &mut HashSet<String>,
    ) -> Vec<EventRecord> {
        let today = Utc::now().date_naive();
        let mut merged = Vec::new();

        for variant in month_variant_urls(page_url, today) {
            if !visited.insert(variant.clone()) {
                continue;
            }
            match self.fetcher.fetch(&variant).await {
                Ok(html) => {
                    let events = extract_structured_events(&html, &variant);
                    debug!(url = %variant, count = events.len(), "Month variant normalized");
                    merged.extend(events);
                }
                Err(e) => warn!(url = %variant, error = %e, "Month variant fetch failed"),
            }
        }

        let now = Utc::now();
        merged.retain(|record| within_recent_window(record, now));
        merged
    }
}
