//! Per-channel scrape orchestration.
//!
//! [`ProfileScraper::scrape_channel`] drives one channel end to end:
//! navigate to the About page, clear the consent interstitial, extract
//! open metadata, then work the email gate (challenge detection, remote
//! solving, token injection) when the controls are present. Failures never
//! propagate out of a scrape; whatever was extracted before the failure
//! ships in the outcome next to the error.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use url::Url;

use crate::browser::{BrowserHandle, PageHandle};
use crate::captcha::{CaptchaSolver, ChallengeDescriptor};
use crate::challenge::{ChallengeDetector, SolutionInjector, find_site_key};
use crate::config::ScraperConfig;
use crate::extract::email::{EmailExtractor, click_email_gate, sign_in_required};
use crate::extract::{self, PageSnapshot};
use crate::record::ProfileRecord;

// Render-settling pauses, tuned against the live page. The platform
// re-renders the About modal asynchronously after every interaction.
const POST_NAVIGATION_WAIT: Duration = Duration::from_secs(3);
const PRE_CHECK_WAIT: Duration = Duration::from_secs(2);
const POST_GATE_CLICK_WAIT: Duration = Duration::from_secs(5);
const PRE_DETECT_WAIT: Duration = Duration::from_secs(2);
const POST_INJECTION_WAIT: Duration = Duration::from_secs(8);
const NO_CHALLENGE_WAIT: Duration = Duration::from_secs(3);

/// What went wrong during a scrape. Attached to the outcome, never thrown.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("could not open a page: {0}")]
    Page(String),
    #[error("challenge could not be submitted: {0}")]
    ChallengeSubmission(String),
    #[error("challenge solving produced no token")]
    ChallengeTimeout,
}

/// Result of one channel scrape. The record is always present; partial
/// extraction with an error alongside is a normal outcome.
#[derive(Debug)]
pub struct ScrapeOutcome {
    pub record: ProfileRecord,
    pub error: Option<ScrapeError>,
}

impl ScrapeOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

pub struct ProfileScraper {
    browser: Arc<dyn BrowserHandle>,
    solver: Option<Arc<dyn CaptchaSolver>>,
    config: ScraperConfig,
    detector: ChallengeDetector,
    injector: SolutionInjector,
    extractor: EmailExtractor,
}

/// Assembles a [`ProfileScraper`] from its collaborators.
pub struct ProfileScraperBuilder {
    browser: Arc<dyn BrowserHandle>,
    solver: Option<Arc<dyn CaptchaSolver>>,
    config: ScraperConfig,
}

impl ProfileScraperBuilder {
    pub fn new(browser: Arc<dyn BrowserHandle>) -> Self {
        Self {
            browser,
            solver: None,
            config: ScraperConfig::default(),
        }
    }

    pub fn solver(mut self, solver: Arc<dyn CaptchaSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn config(mut self, config: ScraperConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> ProfileScraper {
        ProfileScraper {
            browser: self.browser,
            solver: self.solver,
            config: self.config,
            detector: ChallengeDetector::default(),
            injector: SolutionInjector::default(),
            extractor: EmailExtractor::default(),
        }
    }
}

impl ProfileScraper {
    pub fn builder(browser: Arc<dyn BrowserHandle>) -> ProfileScraperBuilder {
        ProfileScraperBuilder::new(browser)
    }

    /// Scrape one channel. The page is always closed before returning,
    /// whatever happened on it.
    pub async fn scrape_channel(&self, channel_url: &str) -> ScrapeOutcome {
        let target = extract::about_url(channel_url);
        let handle = extract::handle_from_url(channel_url);
        let mut record = ProfileRecord::started(channel_url, &handle);

        info!("scraping {target}");

        let page = match self.browser.new_page().await {
            Ok(page) => page,
            Err(err) => {
                return ScrapeOutcome {
                    record,
                    error: Some(ScrapeError::Page(err.to_string())),
                };
            }
        };

        let error = self.scrape_on_page(page.as_ref(), &target, &mut record).await;
        page.close().await;

        if let Some(err) = &error {
            warn!("{channel_url}: {err}");
        }
        ScrapeOutcome { record, error }
    }

    async fn scrape_on_page(
        &self,
        page: &dyn PageHandle,
        target: &str,
        record: &mut ProfileRecord,
    ) -> Option<ScrapeError> {
        // A load timeout is recorded but tolerated: extraction proceeds
        // with whatever rendered.
        let mut first_error = None;
        if let Err(err) = page.navigate(target, self.config.navigation_timeout).await {
            first_error = Some(ScrapeError::Navigation {
                url: target.to_string(),
                reason: err.to_string(),
            });
        }
        page.settle(POST_NAVIGATION_WAIT).await;

        extract::resolve_consent_dialog(page).await;
        page.settle(PRE_CHECK_WAIT).await;

        let snapshot = PageSnapshot::capture(page).await;
        record.apply_metadata(extract::extract_metadata(&snapshot));

        let (email, email_error) = self.reveal_email(page).await;
        record.email = email;
        first_error.or(email_error)
    }

    /// Work the email gate: pre-visible address, gate click, challenge
    /// solving, then extraction regardless of which path was taken.
    async fn reveal_email(&self, page: &dyn PageHandle) -> (Option<String>, Option<ScrapeError>) {
        if sign_in_required(page).await {
            warn!("page requires a signed-in session to reveal the email gate");
            return (None, None);
        }

        if let Ok(text) = page.body_text().await {
            if let Some(email) = self.extractor.first_valid_email(&text) {
                info!("email already visible without challenge");
                return (Some(email), None);
            }
        }

        if !click_email_gate(page).await {
            debug!("no email gate control on page");
            return (self.extractor.find_email(page).await, None);
        }
        page.settle(POST_GATE_CLICK_WAIT).await;
        page.settle(PRE_DETECT_WAIT).await;

        let mut error = None;
        if self.detector.detect(page).await {
            error = self.solve_challenge(page).await;
        } else {
            debug!("gate opened without a challenge");
            page.settle(NO_CHALLENGE_WAIT).await;
        }

        (self.extractor.find_email(page).await, error)
    }

    async fn solve_challenge(&self, page: &dyn PageHandle) -> Option<ScrapeError> {
        let Some(solver) = &self.solver else {
            warn!("challenge present but no solving service is configured");
            return None;
        };

        let markup = page.content().await.unwrap_or_default();
        let Some(site_key) = find_site_key(&markup) else {
            return Some(ScrapeError::ChallengeSubmission(
                "site key not found in page markup".to_string(),
            ));
        };

        let raw_url = page.current_url().await.unwrap_or_default();
        let page_url = match Url::parse(&raw_url) {
            Ok(url) => url,
            Err(err) => {
                return Some(ScrapeError::ChallengeSubmission(format!(
                    "page URL `{raw_url}` is not absolute: {err}"
                )));
            }
        };

        let descriptor = ChallengeDescriptor { site_key, page_url };
        match solver.solve(&descriptor).await {
            Some(token) => {
                let report = self.injector.inject(page, token).await;
                if !report.any_strategy_fired() {
                    warn!("token obtained but no injection strategy took effect");
                }
                page.settle(POST_INJECTION_WAIT).await;
                None
            }
            None => Some(ScrapeError::ChallengeTimeout),
        }
    }
}
