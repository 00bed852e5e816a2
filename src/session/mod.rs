//! Persisted-session model and browser cookie import.
//!
//! The scraper consumes a storage state (cookies plus per-origin state)
//! saved to a JSON file so a batch can reuse an authenticated session
//! without logging in again. Cookies exported from a browser extension use
//! a slightly different shape; [`import_browser_cookies`] converts them.

use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::browser::BrowserHandle;
use crate::config::PLATFORM_BASE_URL;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("session file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialized browsing session: cookies plus per-origin local state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageState {
    pub cookies: Vec<SessionCookie>,
    #[serde(default)]
    pub origins: Vec<serde_json::Value>,
}

/// One cookie in the persisted session format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    #[serde(rename = "httpOnly")]
    pub http_only: bool,
    /// Unix timestamp. Absent for session cookies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    #[serde(rename = "sameSite", skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

/// One cookie as exported by browser extensions. Extra export-only fields
/// (`hostOnly`, `session`, `storeId`, ...) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserExportCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    #[serde(rename = "httpOnly")]
    pub http_only: bool,
    #[serde(rename = "expirationDate")]
    pub expiration_date: Option<f64>,
    #[serde(rename = "sameSite")]
    pub same_site: Option<String>,
}

/// Convert a flat browser cookie export into a storage state.
///
/// `expirationDate` is truncated to whole seconds; `sameSite` values are
/// normalized (`no_restriction` becomes `None`, anything else non-empty is
/// capitalized).
pub fn import_browser_cookies(cookies: &[BrowserExportCookie]) -> StorageState {
    let converted = cookies
        .iter()
        .map(|cookie| SessionCookie {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            secure: cookie.secure,
            http_only: cookie.http_only,
            expires: cookie
                .expiration_date
                .filter(|stamp| *stamp != 0.0)
                .map(|stamp| stamp as i64),
            same_site: cookie
                .same_site
                .as_deref()
                .filter(|value| !value.is_empty())
                .map(normalize_same_site),
        })
        .collect();

    StorageState {
        cookies: converted,
        origins: Vec::new(),
    }
}

fn normalize_same_site(value: &str) -> String {
    if value == "no_restriction" {
        return "None".to_string();
    }
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

impl StorageState {
    /// Load a storage state from a JSON session file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let state: StorageState = serde_json::from_str(&raw)?;
        info!(
            "loaded session with {} cookies from {}",
            state.cookies.len(),
            path.as_ref().display()
        );
        state.warn_expired();
        Ok(state)
    }

    /// Save the storage state to a JSON session file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), raw)?;
        info!(
            "saved session with {} cookies to {}",
            self.cookies.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    /// Import cookies from a browser-export JSON file and persist the
    /// converted storage state.
    pub fn import_from_export_file(
        export_path: impl AsRef<Path>,
        session_path: impl AsRef<Path>,
    ) -> Result<Self, SessionError> {
        let raw = std::fs::read_to_string(export_path.as_ref())?;
        let export: Vec<BrowserExportCookie> = serde_json::from_str(&raw)?;
        let state = import_browser_cookies(&export);
        state.save(session_path)?;
        Ok(state)
    }

    fn warn_expired(&self) {
        let now = chrono::Utc::now().timestamp();
        let expired = self
            .cookies
            .iter()
            .filter(|cookie| cookie.expires.is_some_and(|expires| expires < now))
            .count();
        if expired > 0 {
            warn!("{expired} of {} session cookies have expired", self.cookies.len());
        }
    }
}

/// Signed-in state is detectable by the avatar control in the page chrome.
const AVATAR_SELECTOR: &str = "#avatar-btn";

/// Check whether the loaded session actually produces a signed-in state by
/// visiting the platform home page and probing for the account avatar.
pub async fn verify_session(browser: &dyn BrowserHandle, timeout: Duration) -> bool {
    let page = match browser.new_page().await {
        Ok(page) => page,
        Err(err) => {
            warn!("could not open a page to verify the session: {err}");
            return false;
        }
    };

    let signed_in = match page.navigate(PLATFORM_BASE_URL, timeout).await {
        Ok(()) => {
            page.settle(Duration::from_secs(2)).await;
            page.exists(AVATAR_SELECTOR).await
        }
        Err(err) => {
            warn!("session verification navigation failed: {err}");
            false
        }
    };
    page.close().await;

    if signed_in {
        info!("session verified: signed-in state detected");
    } else {
        warn!("session cookies did not produce a signed-in state");
    }
    signed_in
}

#[cfg(test)]
mod tests {
    use super::*;

    fn export_cookie(name: &str, same_site: Option<&str>, expiration: Option<f64>) -> BrowserExportCookie {
        BrowserExportCookie {
            name: name.to_string(),
            value: "v".to_string(),
            domain: ".youtube.com".to_string(),
            path: "/".to_string(),
            secure: true,
            http_only: false,
            expiration_date: expiration,
            same_site: same_site.map(str::to_string),
        }
    }

    #[test]
    fn no_restriction_maps_to_none() {
        let state = import_browser_cookies(&[export_cookie(
            "SID",
            Some("no_restriction"),
            Some(1_800_000_000.0),
        )]);
        let cookie = &state.cookies[0];
        assert_eq!(cookie.name, "SID");
        assert_eq!(cookie.same_site.as_deref(), Some("None"));
        assert_eq!(cookie.expires, Some(1_800_000_000));
    }

    #[test]
    fn same_site_values_are_capitalized() {
        for (raw, expected) in [("lax", "Lax"), ("strict", "Strict"), ("LAX", "Lax")] {
            let state = import_browser_cookies(&[export_cookie("c", Some(raw), None)]);
            assert_eq!(state.cookies[0].same_site.as_deref(), Some(expected));
        }
    }

    #[test]
    fn empty_same_site_is_dropped() {
        let state = import_browser_cookies(&[export_cookie("c", Some(""), None)]);
        assert_eq!(state.cookies[0].same_site, None);
    }

    #[test]
    fn fractional_expiration_is_truncated() {
        let state = import_browser_cookies(&[export_cookie("c", None, Some(1_801_086_567.389))]);
        assert_eq!(state.cookies[0].expires, Some(1_801_086_567));
    }

    #[test]
    fn storage_state_round_trips_through_json() {
        let state = import_browser_cookies(&[export_cookie(
            "LOGIN_INFO",
            Some("no_restriction"),
            Some(1_795_296_573.4),
        )]);
        let raw = serde_json::to_string(&state).unwrap();
        assert!(raw.contains("\"httpOnly\""));
        assert!(raw.contains("\"sameSite\":\"None\""));
        let parsed: StorageState = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.cookies, state.cookies);
        assert!(parsed.origins.is_empty());
    }

    #[tokio::test]
    async fn verify_session_checks_the_avatar_control() {
        use std::sync::Mutex;

        use async_trait::async_trait;

        use crate::browser::testing::FakePage;
        use crate::browser::{PageError, PageHandle};

        struct OnePageBrowser {
            pages: Mutex<Vec<FakePage>>,
        }

        #[async_trait]
        impl BrowserHandle for OnePageBrowser {
            async fn new_page(&self) -> Result<Box<dyn PageHandle>, PageError> {
                self.pages
                    .lock()
                    .unwrap()
                    .pop()
                    .map(|page| Box::new(page) as Box<dyn PageHandle>)
                    .ok_or_else(|| PageError::NewPage("no pages left".to_string()))
            }

            async fn close(&self) {}
        }

        let signed_in = OnePageBrowser {
            pages: Mutex::new(vec![FakePage::new().with_selector("#avatar-btn", true)]),
        };
        assert!(verify_session(&signed_in, Duration::from_secs(1)).await);

        let signed_out = OnePageBrowser {
            pages: Mutex::new(vec![FakePage::new()]),
        };
        assert!(!verify_session(&signed_out, Duration::from_secs(1)).await);

        let no_pages = OnePageBrowser {
            pages: Mutex::new(Vec::new()),
        };
        assert!(!verify_session(&no_pages, Duration::from_secs(1)).await);
    }

    #[test]
    fn save_and_load_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let state = import_browser_cookies(&[export_cookie("SID", Some("lax"), None)]);
        state.save(&path).unwrap();
        let loaded = StorageState::load(&path).unwrap();
        assert_eq!(loaded.cookies, state.cookies);
    }
}
