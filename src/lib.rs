//! # tubescraper-rs
//!
//! Scrapes video-platform channel About pages: public metadata plus the
//! contact email hidden behind a human-verification challenge.
//!
//! The interesting part is the email gate. Revealing the address requires
//! clicking a gate control, which may raise a reCAPTCHA. The scraper
//! detects the challenge, ships it to an external solving service, injects
//! the returned token back into the page and then extracts whatever the
//! page reveals.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tubescraper_rs::browser::{BrowserHandle, CdpBrowser, LaunchOptions};
//! use tubescraper_rs::scraper::ProfileScraper;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let browser = Arc::new(CdpBrowser::launch(LaunchOptions::default(), None).await?);
//!     let scraper = ProfileScraper::builder(browser.clone() as Arc<dyn BrowserHandle>).build();
//!     let outcome = scraper
//!         .scrape_channel("https://www.youtube.com/@NetworkChuck")
//!         .await;
//!     println!("email: {:?}", outcome.record.email);
//!     browser.close().await;
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod browser;
pub mod captcha;
pub mod challenge;
pub mod config;
pub mod export;
pub mod extract;
pub mod record;
pub mod scraper;
pub mod session;

pub use crate::batch::{BatchRunner, BatchSummary};
pub use crate::browser::{BrowserHandle, CdpBrowser, LaunchOptions, PageError, PageHandle};
pub use crate::captcha::{
    CaptchaConfig,
    CaptchaError,
    CaptchaSolver,
    ChallengeDescriptor,
    SolutionToken,
    TwoCaptchaClient,
};
pub use crate::challenge::{ChallengeDetector, InjectionReport, SolutionInjector};
pub use crate::config::ScraperConfig;
pub use crate::export::{DataExporter, ExportError};
pub use crate::extract::ChannelMetadata;
pub use crate::extract::email::EmailExtractor;
pub use crate::record::ProfileRecord;
pub use crate::scraper::{ProfileScraper, ProfileScraperBuilder, ScrapeError, ScrapeOutcome};
pub use crate::session::{
    SessionCookie, SessionError, StorageState, import_browser_cookies, verify_session,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
