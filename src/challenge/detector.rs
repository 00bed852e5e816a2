//! Detects whether an interactive challenge has been injected into a page.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::browser::PageHandle;

/// Embedded frame labeled with the provider's name.
const FRAME_TITLE_SELECTOR: &str = r#"iframe[title*="reCAPTCHA"]"#;
/// Embedded frame served from the provider's domain.
const FRAME_SRC_SELECTOR: &str = r#"iframe[src*="recaptcha"]"#;
/// Conventional widget container marker.
const CONTAINER_SELECTOR: &str = r#".g-recaptcha, [class*="recaptcha"]"#;
/// Marker string for the raw-markup channel.
const MARKUP_MARKER: &str = "recaptcha";

static SITE_KEY_ATTRIBUTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"data-sitekey="([^"]+)""#).expect("valid site key regex"));

static SITE_KEY_FALLBACK_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"sitekey["\s:]+([A-Za-z0-9_-]{40,})"#,
        r#""sitekey"\s*:\s*"([^"]+)""#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid site key fallback regex"))
    .collect()
});

/// Heuristic challenge presence check across several signal channels.
///
/// No single selector is reliable, so the detector ORs four redundant
/// channels and short-circuits on the first positive. A channel that cannot
/// be evaluated counts as negative rather than aborting the others;
/// `detect` itself never fails.
#[derive(Debug, Default, Clone)]
pub struct ChallengeDetector;

impl ChallengeDetector {
    pub fn new() -> Self {
        Self
    }

    pub async fn detect(&self, page: &dyn PageHandle) -> bool {
        if page.exists(FRAME_TITLE_SELECTOR).await {
            debug!("challenge detected via frame title");
            return true;
        }

        if page.exists(FRAME_SRC_SELECTOR).await {
            debug!("challenge detected via frame source");
            return true;
        }

        if page.exists(CONTAINER_SELECTOR).await {
            debug!("challenge detected via container marker");
            return true;
        }

        match page.content().await {
            Ok(markup) if markup.to_lowercase().contains(MARKUP_MARKER) => {
                debug!("challenge detected in raw markup");
                true
            }
            Ok(_) => false,
            Err(err) => {
                debug!("raw markup channel unavailable: {err}");
                false
            }
        }
    }
}

/// Pull the challenge site key out of the page markup.
///
/// Tries the conventional widget attribute first, then looser script-embedded
/// patterns; the key is wherever the platform's current experiment put it.
pub fn find_site_key(markup: &str) -> Option<String> {
    if let Some(captures) = SITE_KEY_ATTRIBUTE_RE.captures(markup) {
        return Some(captures[1].to_string());
    }

    SITE_KEY_FALLBACK_RES
        .iter()
        .find_map(|pattern| pattern.captures(markup))
        .map(|captures| captures[1].to_string())
}
