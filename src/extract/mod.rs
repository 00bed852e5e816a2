//! Channel metadata extraction.
//!
//! Everything here operates on a [`PageSnapshot`] captured once per page,
//! so the heuristics are pure text/markup scans that unit-test without a
//! browser. The platform's About page renders stats as loose text rather
//! than a stable DOM, hence the regex tables.

pub mod email;

use std::collections::BTreeMap;

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use scraper::{Html, Selector};

use crate::browser::PageHandle;

const TITLE_SUFFIX: &str = " - YouTube";
const DESCRIPTION_LIMIT: usize = 500;
const SOCIAL_LABEL_LIMIT: usize = 100;

const SOCIAL_DOMAINS: &[&str] = &[
    "twitter",
    "instagram",
    "twitch",
    "facebook",
    "tiktok",
    "linkedin",
];

const KNOWN_COUNTRIES: &[&str] = &[
    "United States",
    "United Kingdom",
    "Canada",
    "Australia",
    "Germany",
    "France",
    "Spain",
    "Italy",
    "Netherlands",
    "Japan",
    "India",
    "Brazil",
];

static HANDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/@([^/]+)").expect("valid handle regex"));

static SUBSCRIBER_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    build_regexes(&[
        r"([\d,.]+[KkMm]?\s*subscribers?)",
        r"(\d+[\d,.]*[KkMm]?\s*subscribers?)",
    ])
});

static VIDEO_COUNT_RES: Lazy<Vec<Regex>> =
    Lazy::new(|| build_regexes(&[r"(\d+[\d,]*\s*videos?)", r"([\d,.]+\s*videos?)"]));

static VIEW_COUNT_RES: Lazy<Vec<Regex>> =
    Lazy::new(|| build_regexes(&[r"([\d,]+\s*views?)", r"(\d+[\d,]*\s*views?)"]));

static JOINED_RES: Lazy<Vec<Regex>> =
    Lazy::new(|| build_regexes(&[r"(Joined\s+\w+\s+\d+,?\s*\d{4})", r"(Joined.*?\d{4})"]));

static DESCRIPTION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("#description-container, #description").expect("valid description selector")
});

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("valid link selector"));

fn build_regexes(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .unwrap_or_else(|err| panic!("invalid extraction regex `{pattern}`: {err}"))
        })
        .collect()
}

/// Point-in-time read of the three page views the heuristics need.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub title: Option<String>,
    pub body_text: String,
    pub content: String,
}

impl PageSnapshot {
    /// Capture the current page state. Unreadable views come back empty;
    /// extraction then simply finds less.
    pub async fn capture(page: &dyn PageHandle) -> Self {
        Self {
            title: page.title().await,
            body_text: page.body_text().await.unwrap_or_default(),
            content: page.content().await.unwrap_or_default(),
        }
    }
}

/// Non-gated channel metadata. Every field populates independently; a miss
/// leaves the field empty rather than failing the extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelMetadata {
    pub channel_name: String,
    pub subscribers: String,
    pub video_count: String,
    pub total_views: String,
    pub joined_date: String,
    pub country: String,
    pub description: String,
    pub social_links: BTreeMap<String, String>,
}

/// Channel handle from a channel URL (`/@handle` segment), empty if absent.
pub fn handle_from_url(url: &str) -> String {
    HANDLE_RE
        .captures(url)
        .map(|captures| captures[1].to_string())
        .unwrap_or_default()
}

/// Normalize any channel URL to its About page.
pub fn about_url(channel_url: &str) -> String {
    let trimmed = channel_url.trim_end_matches('/');
    if let Some(base) = trimmed.strip_suffix("/featured") {
        return format!("{base}/about");
    }
    if trimmed.ends_with("/about") {
        return trimmed.to_string();
    }
    format!("{trimmed}/about")
}

/// Extract all non-gated metadata from a snapshot.
pub fn extract_metadata(snapshot: &PageSnapshot) -> ChannelMetadata {
    // Stats usually sit in the markup, but a partially rendered page can
    // have them only in the visible text. Try both.
    let views = [snapshot.content.as_str(), snapshot.body_text.as_str()];
    let mut metadata = ChannelMetadata {
        channel_name: channel_name(snapshot.title.as_deref()),
        subscribers: first_capture_in(&SUBSCRIBER_RES, &views),
        video_count: first_capture_in(&VIDEO_COUNT_RES, &views),
        total_views: first_capture_in(&VIEW_COUNT_RES, &views),
        joined_date: first_capture_in(&JOINED_RES, &views),
        country: country(&views),
        ..ChannelMetadata::default()
    };

    let document = Html::parse_document(&snapshot.content);
    metadata.description = description(&document);
    metadata.social_links = social_links(&document);

    info!(
        "metadata: name `{}`, {}, {}, {}",
        metadata.channel_name,
        field_or(&metadata.subscribers, "no subscriber count"),
        field_or(&metadata.video_count, "no video count"),
        field_or(&metadata.total_views, "no view count"),
    );
    metadata
}

fn field_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}

fn channel_name(title: Option<&str>) -> String {
    match title {
        Some(title) if title.ends_with(TITLE_SUFFIX) => title
            .trim_end_matches(TITLE_SUFFIX)
            .trim()
            .to_string(),
        Some(title) => title.trim().to_string(),
        None => String::new(),
    }
}

fn first_capture_in(patterns: &[Regex], views: &[&str]) -> String {
    views
        .iter()
        .find_map(|text| {
            patterns
                .iter()
                .find_map(|pattern| pattern.captures(text))
                .map(|captures| captures[1].trim().to_string())
        })
        .unwrap_or_default()
}

fn country(views: &[&str]) -> String {
    KNOWN_COUNTRIES
        .iter()
        .find(|country| views.iter().any(|text| text.contains(*country)))
        .map(|country| country.to_string())
        .unwrap_or_default()
}

fn description(document: &Html) -> String {
    let Some(container) = document.select(&DESCRIPTION_SELECTOR).next() else {
        return String::new();
    };
    let text = container.text().collect::<Vec<_>>().join(" ");
    let trimmed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    trimmed.chars().take(DESCRIPTION_LIMIT).collect()
}

/// Social links keyed by their visible label; on duplicate labels the last
/// one wins.
fn social_links(document: &Html) -> BTreeMap<String, String> {
    let mut links = BTreeMap::new();
    for anchor in document.select(&LINK_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let lowered = href.to_lowercase();
        if !SOCIAL_DOMAINS.iter().any(|domain| lowered.contains(domain)) {
            continue;
        }

        let text = anchor.text().collect::<Vec<_>>().join(" ");
        let mut label = text.trim().to_string();
        if label.is_empty() {
            label = anchor
                .value()
                .attr("aria-label")
                .unwrap_or(href)
                .trim()
                .to_string();
        }
        if label.is_empty() || label.len() >= SOCIAL_LABEL_LIMIT {
            continue;
        }
        links.insert(label, href.to_string());
    }
    links
}

/// Accept-button heuristics for the consent interstitial, tried in order.
const CONSENT_ACCEPT_SELECTORS: &[&str] = &["[aria-label*=\"Accept\"]"];

const CONSENT_BUTTON_SCAN: &str = r#"(() => {
    const labels = ['Accept all', 'Reject all'];
    const buttons = document.querySelectorAll('button');
    for (const label of labels) {
        for (const button of buttons) {
            if ((button.innerText || '').trim().startsWith(label)) {
                button.click();
                return label;
            }
        }
    }
    return null;
})()"#;

/// Dismiss the consent dialog when it appears. Failure to match any accept
/// heuristic is logged and tolerated; extraction proceeds regardless.
pub async fn resolve_consent_dialog(page: &dyn PageHandle) {
    let on_consent_host = page
        .current_url()
        .await
        .is_some_and(|url| url.contains("consent."));
    let has_consent_text = page
        .content()
        .await
        .map(|markup| markup.contains("Before you continue"))
        .unwrap_or(false);

    if !on_consent_host && !has_consent_text {
        return;
    }

    info!("consent dialog detected, attempting to dismiss");

    if let Ok(value) = page.evaluate(CONSENT_BUTTON_SCAN).await {
        if let Some(label) = value.as_str() {
            debug!("consent dismissed via `{label}` button");
            page.settle(std::time::Duration::from_secs(2)).await;
            return;
        }
    }

    for selector in CONSENT_ACCEPT_SELECTORS {
        if page.click(selector).await {
            debug!("consent dismissed via `{selector}`");
            page.settle(std::time::Duration::from_secs(2)).await;
            return;
        }
    }

    log::warn!("could not dismiss consent dialog automatically");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_is_taken_from_url() {
        assert_eq!(
            handle_from_url("https://www.youtube.com/@NetworkChuck"),
            "NetworkChuck"
        );
        assert_eq!(
            handle_from_url("https://www.youtube.com/@NetworkChuck/videos"),
            "NetworkChuck"
        );
        assert_eq!(handle_from_url("https://www.youtube.com/watch?v=abc"), "");
    }

    #[test]
    fn about_url_normalization() {
        assert_eq!(
            about_url("https://www.youtube.com/@chan"),
            "https://www.youtube.com/@chan/about"
        );
        assert_eq!(
            about_url("https://www.youtube.com/@chan/"),
            "https://www.youtube.com/@chan/about"
        );
        assert_eq!(
            about_url("https://www.youtube.com/@chan/featured"),
            "https://www.youtube.com/@chan/about"
        );
        assert_eq!(
            about_url("https://www.youtube.com/@chan/about"),
            "https://www.youtube.com/@chan/about"
        );
    }

    #[test]
    fn channel_name_strips_platform_suffix() {
        assert_eq!(channel_name(Some("NetworkChuck - YouTube")), "NetworkChuck");
        assert_eq!(channel_name(Some("Plain Title")), "Plain Title");
        assert_eq!(channel_name(None), "");
    }

    #[test]
    fn stats_are_scanned_from_markup() {
        let snapshot = PageSnapshot {
            title: Some("NetworkChuck - YouTube".to_string()),
            body_text: String::new(),
            content: "5.04M subscribers \u{2022} 553 videos \u{2022} 367,524,086 views \
                      Joined Apr 27, 2014 United States"
                .to_string(),
        };
        let metadata = extract_metadata(&snapshot);
        assert_eq!(metadata.channel_name, "NetworkChuck");
        assert_eq!(metadata.subscribers, "5.04M subscribers");
        assert_eq!(metadata.video_count, "553 videos");
        assert_eq!(metadata.total_views, "367,524,086 views");
        assert_eq!(metadata.joined_date, "Joined Apr 27, 2014");
        assert_eq!(metadata.country, "United States");
    }

    #[test]
    fn missing_stats_leave_fields_empty() {
        let metadata = extract_metadata(&PageSnapshot::default());
        assert_eq!(metadata, ChannelMetadata::default());
    }

    #[test]
    fn description_is_collected_and_truncated() {
        let long = "x".repeat(600);
        let snapshot = PageSnapshot {
            content: format!("<div id=\"description-container\">  {long}  </div>"),
            ..PageSnapshot::default()
        };
        let metadata = extract_metadata(&snapshot);
        assert_eq!(metadata.description.len(), DESCRIPTION_LIMIT);
    }

    #[test]
    fn social_links_filter_by_domain_and_label_length() {
        let snapshot = PageSnapshot {
            content: r#"
                <a href="https://twitter.com/networkchuck">Twitter</a>
                <a href="https://instagram.com/networkchuck" aria-label="Instagram"> </a>
                <a href="https://www.youtube.com/@other">Not social</a>
            "#
            .to_string(),
            ..PageSnapshot::default()
        };
        let metadata = extract_metadata(&snapshot);
        assert_eq!(
            metadata.social_links.get("Twitter").map(String::as_str),
            Some("https://twitter.com/networkchuck")
        );
        assert_eq!(
            metadata.social_links.get("Instagram").map(String::as_str),
            Some("https://instagram.com/networkchuck")
        );
        assert_eq!(metadata.social_links.len(), 2);
    }

    #[test]
    fn duplicate_social_labels_last_write_wins() {
        let snapshot = PageSnapshot {
            content: r#"
                <a href="https://twitter.com/old">Profile</a>
                <a href="https://instagram.com/new">Profile</a>
            "#
            .to_string(),
            ..PageSnapshot::default()
        };
        let metadata = extract_metadata(&snapshot);
        assert_eq!(
            metadata.social_links.get("Profile").map(String::as_str),
            Some("https://instagram.com/new")
        );
    }

    #[tokio::test]
    async fn consent_dialog_dismissed_via_button_scan() {
        use crate::browser::testing::FakePage;
        let page = FakePage::new()
            .with_url("https://consent.youtube.com/m?continue=x")
            .with_eval("Accept all", serde_json::json!("Accept all"));
        resolve_consent_dialog(&page).await;
        assert_eq!(page.evaluated.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_consent_dialog_is_a_no_op() {
        use crate::browser::testing::FakePage;
        let page = FakePage::new()
            .with_url("https://www.youtube.com/@chan/about")
            .with_content("<html><body>About</body></html>");
        resolve_consent_dialog(&page).await;
        assert!(page.evaluated.lock().unwrap().is_empty());
        assert!(page.clicks.lock().unwrap().is_empty());
    }
}
