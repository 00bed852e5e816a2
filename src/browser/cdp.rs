//! Chromiumoxide-backed implementation of the browser boundary.
//!
//! Owns the CDP browser process for the lifetime of a batch, spawns the
//! event-handler task, and hands out one fresh page per profile with the
//! persisted session cookies and user-agent override already applied.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, CookieSameSite, SetCookiesParams, SetUserAgentOverrideParams, TimeSinceEpoch,
};
use chromiumoxide::Page;
use futures::StreamExt;
use log::{debug, warn};
use tokio::sync::Mutex;

use crate::session::{SessionCookie, StorageState};

use super::{BrowserHandle, PageError, PageHandle};

/// Script used to wait for the DOM instead of a blind fixed delay.
const READY_STATE_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

/// Browser process settings.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub user_agent: String,
    pub viewport: (u32, u32),
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            viewport: (1280, 720),
        }
    }
}

/// Long-lived CDP browser shared across a whole batch.
pub struct CdpBrowser {
    browser: Mutex<Browser>,
    options: LaunchOptions,
    session: Option<StorageState>,
}

impl CdpBrowser {
    /// Launch the browser process. A saved storage state, when provided, is
    /// replayed into every page this browser creates.
    pub async fn launch(
        options: LaunchOptions,
        session: Option<StorageState>,
    ) -> Result<Self, PageError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(options.viewport.0, options.viewport.1)
            .args(vec![
                "--disable-blink-features=AutomationControlled",
                "--disable-dev-shm-usage",
                "--no-first-run",
                "--no-default-browser-check",
            ]);

        // with_head means NOT headless, confusingly
        if !options.headless {
            builder = builder.with_head();
        }

        let config = builder
            .build()
            .map_err(PageError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| PageError::Launch(err.to_string()))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!("CDP handler event error: {err}");
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            options,
            session,
        })
    }

    async fn prepare_page(&self, page: &Page) {
        if let Err(err) = page
            .execute(SetUserAgentOverrideParams::new(
                self.options.user_agent.clone(),
            ))
            .await
        {
            warn!("could not override user agent: {err}");
        }

        let Some(session) = &self.session else {
            return;
        };

        let params: Vec<CookieParam> = session.cookies.iter().filter_map(cookie_param).collect();

        if params.is_empty() {
            return;
        }

        let count = params.len();
        match page.execute(SetCookiesParams::new(params)).await {
            Ok(_) => debug!("applied {count} session cookies"),
            Err(err) => warn!("failed to inject session cookies: {err}"),
        }
    }
}

/// Translate a stored cookie into its CDP parameter. Expiry and sameSite
/// must survive the trip so the restored session behaves like the original:
/// Chrome rejects `SameSite=None` cookies whose attribute got lost, and a
/// cookie stripped of its expiry turns into a session cookie.
fn cookie_param(cookie: &SessionCookie) -> Option<CookieParam> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .domain(cookie.domain.clone())
        .path(cookie.path.clone())
        .secure(cookie.secure)
        .http_only(cookie.http_only);
    if let Some(expires) = cookie.expires {
        builder = builder.expires(TimeSinceEpoch::new(expires as f64));
    }
    if let Some(same_site) = cookie.same_site.as_deref().and_then(cookie_same_site) {
        builder = builder.same_site(same_site);
    }
    builder
        .build()
        .map_err(|err| warn!("skipping cookie {}: {err}", cookie.name))
        .ok()
}

fn cookie_same_site(value: &str) -> Option<CookieSameSite> {
    match value.to_ascii_lowercase().as_str() {
        "strict" => Some(CookieSameSite::Strict),
        "lax" => Some(CookieSameSite::Lax),
        "none" | "no_restriction" => Some(CookieSameSite::None),
        other => {
            debug!("unrecognized sameSite value `{other}`");
            None
        }
    }
}

#[async_trait]
impl BrowserHandle for CdpBrowser {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>, PageError> {
        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .map_err(|err| PageError::NewPage(err.to_string()))?
        };

        self.prepare_page(&page).await;
        Ok(Box::new(CdpPage { page }))
    }

    async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(err) = browser.close().await {
            warn!("browser close failed: {err}");
        }
    }
}

/// One browser tab.
pub struct CdpPage {
    page: Page,
}

#[async_trait]
impl PageHandle for CdpPage {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), PageError> {
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| PageError::Navigation {
                url: url.to_string(),
                reason: format!("timed out after {timeout:?}"),
            })?
            .map_err(|err| PageError::Navigation {
                url: url.to_string(),
                reason: err.to_string(),
            })?;

        // Timeout on the readiness wait is tolerated: extraction proceeds
        // with whatever rendered.
        match tokio::time::timeout(timeout, self.page.evaluate(READY_STATE_SCRIPT)).await {
            Ok(Ok(result)) => {
                let state: String = result
                    .into_value()
                    .unwrap_or_else(|_| "unknown".to_string());
                debug!("page ready state: {state}");
            }
            Ok(Err(err)) => debug!("could not check ready state: {err}"),
            Err(_) => warn!("timed out waiting for page ready state"),
        }

        Ok(())
    }

    async fn current_url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }

    async fn title(&self) -> Option<String> {
        self.page.get_title().await.ok().flatten()
    }

    async fn content(&self) -> Result<String, PageError> {
        self.page
            .content()
            .await
            .map_err(|err| PageError::Read(err.to_string()))
    }

    async fn body_text(&self) -> Result<String, PageError> {
        let result = self
            .page
            .evaluate("document.body ? document.body.innerText : ''")
            .await
            .map_err(|err| PageError::Read(err.to_string()))?;
        result
            .into_value::<String>()
            .map_err(|err| PageError::Read(err.to_string()))
    }

    async fn exists(&self, selector: &str) -> bool {
        let script = format!(
            "!!document.querySelector({})",
            serde_json::Value::String(selector.to_string())
        );
        match self.page.evaluate(script).await {
            Ok(result) => result.into_value::<bool>().unwrap_or(false),
            Err(err) => {
                debug!("existence check for `{selector}` failed: {err}");
                false
            }
        }
    }

    async fn click(&self, selector: &str) -> bool {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (el) {{ el.click(); return true; }} return false; }})()",
            serde_json::Value::String(selector.to_string())
        );
        match self.page.evaluate(script).await {
            Ok(result) => result.into_value::<bool>().unwrap_or(false),
            Err(err) => {
                debug!("click on `{selector}` failed: {err}");
                false
            }
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, PageError> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(|err| PageError::Evaluate(err.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn close(&self) {
        if let Err(err) = self.page.clone().close().await {
            debug!("page close failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie() -> SessionCookie {
        SessionCookie {
            name: "__Secure-3PSID".to_string(),
            value: "abc".to_string(),
            domain: ".youtube.com".to_string(),
            path: "/".to_string(),
            secure: true,
            http_only: true,
            expires: Some(1_924_992_000),
            same_site: Some("None".to_string()),
        }
    }

    #[test]
    fn cookie_param_carries_expiry_and_same_site() {
        let param = cookie_param(&cookie()).unwrap();
        assert_eq!(
            param.expires.map(|t| *t.inner()),
            Some(1_924_992_000.0)
        );
        assert_eq!(param.same_site, Some(CookieSameSite::None));
        assert_eq!(param.secure, Some(true));
        assert_eq!(param.http_only, Some(true));
    }

    #[test]
    fn session_cookie_without_expiry_stays_a_session_cookie() {
        let param = cookie_param(&SessionCookie {
            expires: None,
            same_site: Some("Lax".to_string()),
            ..cookie()
        })
        .unwrap();
        assert!(param.expires.is_none());
        assert_eq!(param.same_site, Some(CookieSameSite::Lax));
    }

    #[test]
    fn same_site_values_normalize_case_insensitively() {
        assert_eq!(cookie_same_site("strict"), Some(CookieSameSite::Strict));
        assert_eq!(cookie_same_site("lax"), Some(CookieSameSite::Lax));
        assert_eq!(cookie_same_site("no_restriction"), Some(CookieSameSite::None));
        assert_eq!(cookie_same_site("unspecified"), None);
    }
}
