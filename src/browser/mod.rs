//! Browser collaborator boundary.
//!
//! The scraper core never talks to a rendering engine directly. It drives
//! pages through the [`PageHandle`] trait, whose probing operations return
//! `Option`/`bool` instead of raising: on a live page a selector may or may
//! not match, and absence is a normal answer, not an error. The production
//! implementation lives in [`cdp`] on top of chromiumoxide.

pub mod cdp;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use cdp::{CdpBrowser, LaunchOptions};

/// Errors surfaced by the browser boundary.
///
/// Only operations whose failure the caller must distinguish from "nothing
/// there" return this; element lookups fold their failures into a negative
/// answer.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("page creation failed: {0}")]
    NewPage(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("page read failed: {0}")]
    Read(String),
    #[error("script evaluation failed: {0}")]
    Evaluate(String),
}

/// A single browser tab the scraper can drive.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate and wait for the DOM to be ready, up to `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), PageError>;

    /// Current page URL, if the page still has one.
    async fn current_url(&self) -> Option<String>;

    /// Document title.
    async fn title(&self) -> Option<String>;

    /// Raw page markup, including DOM not currently laid out.
    async fn content(&self) -> Result<String, PageError>;

    /// Visible rendered text of the page body.
    async fn body_text(&self) -> Result<String, PageError>;

    /// Whether at least one element matches the selector. Query failures
    /// count as "no match".
    async fn exists(&self, selector: &str) -> bool;

    /// Click the first element matching the selector. Returns whether a
    /// click actually happened.
    async fn click(&self, selector: &str) -> bool;

    /// Evaluate a script in the page and return its JSON result.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, PageError>;

    /// Give page scripts time to react before the next read.
    async fn settle(&self, wait: Duration) {
        tokio::time::sleep(wait).await;
    }

    /// Close the tab. Best-effort; a tab that is already gone is fine.
    async fn close(&self);
}

/// Long-lived browsing context producing one fresh [`PageHandle`] per
/// profile.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>, PageError>;

    /// Shut the underlying browser process down.
    async fn close(&self);
}
