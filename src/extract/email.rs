//! Gated email extraction.
//!
//! Once the challenge is out of the way the revealed address can surface in
//! several places depending on how much of the About modal re-rendered, so
//! the extractor works through three progressively deeper views of the page
//! and stops at the first hit.

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use crate::browser::PageHandle;

/// Rendered when the platform requires an authenticated session before it
/// will even show the challenge.
pub const SIGN_IN_MARKER: &str = "Sign in to see email address";

/// Lowercased fragments that mark an address as platform boilerplate rather
/// than a creator contact.
const EXCLUDED_FRAGMENTS: &[&str] = &[
    "noreply@",
    "no-reply@",
    "example@",
    "test@",
    "@example.",
    "@youtube",
    "@google",
    "support@",
    "privacy@",
    "copyright@",
];

/// Page regions the reveal modal conventionally renders into.
const CONTAINER_SELECTORS: &[&str] = &[
    r#"[role="dialog"]"#,
    "ytd-about-channel-renderer",
    "#content-container",
    "yt-formatted-string",
];

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9][A-Za-z0-9._%+-]*@[A-Za-z0-9][A-Za-z0-9.-]*\.[A-Za-z]{2,}\b")
        .expect("valid email regex")
});

/// Heuristic scan that clicks the "view email address" gate control. The
/// control carries no stable id, so this walks candidate elements by their
/// visible label.
const GATE_CLICK_SCAN: &str = r#"(() => {
    const candidates = document.querySelectorAll('button, tp-yt-paper-button, yt-button-renderer, a');
    for (const el of candidates) {
        const label = ((el.innerText || '') + ' ' + (el.getAttribute('aria-label') || '')).toLowerCase();
        if (label.includes('view email') || label.includes('email address')) {
            el.click();
            return true;
        }
    }
    return false;
})()"#;

/// Pulls creator contact addresses out of post-challenge page state.
pub struct EmailExtractor {
    excluded: Vec<String>,
}

impl Default for EmailExtractor {
    fn default() -> Self {
        Self {
            excluded: EXCLUDED_FRAGMENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EmailExtractor {
    /// First address in `text` that is not platform boilerplate.
    pub fn first_valid_email(&self, text: &str) -> Option<String> {
        EMAIL_RE
            .find_iter(text)
            .map(|m| m.as_str())
            .find(|candidate| {
                let lowered = candidate.to_lowercase();
                !self.excluded.iter().any(|fragment| lowered.contains(fragment))
            })
            .map(str::to_string)
    }

    /// Search the page for a revealed address: visible text first, then the
    /// reveal-modal containers, then the decoded raw markup. Unreadable
    /// views are skipped, not fatal.
    pub async fn find_email(&self, page: &dyn PageHandle) -> Option<String> {
        if let Ok(text) = page.body_text().await {
            if let Some(email) = self.first_valid_email(&text) {
                info!("email found in visible page text");
                return Some(email);
            }
        }

        let markup = page.content().await.ok()?;

        if let Some(email) = self.search_containers(&markup) {
            info!("email found in reveal container");
            return Some(email);
        }

        let decoded = html_escape::decode_html_entities(&markup);
        if let Some(email) = self.first_valid_email(&decoded) {
            info!("email found in raw markup");
            return Some(email);
        }

        debug!("no email present on page");
        None
    }

    fn search_containers(&self, markup: &str) -> Option<String> {
        let document = Html::parse_document(markup);
        for raw in CONTAINER_SELECTORS {
            let Ok(selector) = Selector::parse(raw) else {
                continue;
            };
            for element in document.select(&selector) {
                let text = element.text().collect::<Vec<_>>().join(" ");
                if let Some(email) = self.first_valid_email(&text) {
                    return Some(email);
                }
            }
        }
        None
    }
}

/// Whether the page is refusing to show the gate without a signed-in
/// session.
pub async fn sign_in_required(page: &dyn PageHandle) -> bool {
    let in_text = page
        .body_text()
        .await
        .map(|text| text.contains(SIGN_IN_MARKER))
        .unwrap_or(false);
    if in_text {
        return true;
    }
    page.content()
        .await
        .map(|markup| markup.contains(SIGN_IN_MARKER))
        .unwrap_or(false)
}

/// Try to click the email gate control. Returns whether anything was
/// clicked.
pub async fn click_email_gate(page: &dyn PageHandle) -> bool {
    match page.evaluate(GATE_CLICK_SCAN).await {
        Ok(value) => value.as_bool().unwrap_or(false),
        Err(err) => {
            debug!("gate click scan failed: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakePage;

    #[test]
    fn boilerplate_addresses_are_skipped() {
        let extractor = EmailExtractor::default();
        assert_eq!(
            extractor.first_valid_email("Contact: press@example.com or john.doe@acme.org"),
            Some("john.doe@acme.org".to_string())
        );
    }

    #[test]
    fn all_boilerplate_yields_none() {
        let extractor = EmailExtractor::default();
        assert_eq!(
            extractor.first_valid_email("noreply@site.com support@site.com test@foo.io"),
            None
        );
    }

    #[test]
    fn exclusion_is_case_insensitive() {
        let extractor = EmailExtractor::default();
        assert_eq!(extractor.first_valid_email("NoReply@Site.com"), None);
    }

    #[test]
    fn plus_and_dots_in_local_part_accepted() {
        let extractor = EmailExtractor::default();
        assert_eq!(
            extractor.first_valid_email("reach me at first.last+biz@my-domain.co.uk today"),
            Some("first.last+biz@my-domain.co.uk".to_string())
        );
    }

    #[tokio::test]
    async fn visible_text_wins_over_markup() {
        let page = FakePage::new()
            .with_body_text("business: visible@creator.tv")
            .with_content("<div>hidden@creator.tv</div>");
        let email = EmailExtractor::default().find_email(&page).await;
        assert_eq!(email, Some("visible@creator.tv".to_string()));
    }

    #[tokio::test]
    async fn container_markup_is_searched_when_text_is_clean() {
        let page = FakePage::new()
            .with_body_text("nothing here")
            .with_content(r#"<div role="dialog">reach us: biz@creator.tv</div>"#);
        let email = EmailExtractor::default().find_email(&page).await;
        assert_eq!(email, Some("biz@creator.tv".to_string()));
    }

    #[tokio::test]
    async fn entity_encoded_markup_is_decoded() {
        let page = FakePage::new()
            .with_body_text("")
            .with_content("<span>contact&#64;creator.tv</span>");
        let email = EmailExtractor::default().find_email(&page).await;
        assert_eq!(email, Some("contact@creator.tv".to_string()));
    }

    #[tokio::test]
    async fn no_email_anywhere_returns_none() {
        let page = FakePage::new()
            .with_body_text("About this channel")
            .with_content("<html><body>About this channel</body></html>");
        assert_eq!(EmailExtractor::default().find_email(&page).await, None);
    }

    #[tokio::test]
    async fn sign_in_marker_detected_in_text() {
        let page = FakePage::new().with_body_text("Sign in to see email address");
        assert!(sign_in_required(&page).await);
    }

    #[tokio::test]
    async fn gate_click_reports_result() {
        let page = FakePage::new().with_eval("view email", serde_json::json!(true));
        assert!(click_email_gate(&page).await);
        assert!(!click_email_gate(&FakePage::new()).await);
    }
}
