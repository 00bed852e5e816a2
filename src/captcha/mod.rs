//! Captcha solving-service integration.
//!
//! The scraper never solves challenges itself; it delegates to an external
//! asynchronous solving service through the [`CaptchaSolver`] trait so the
//! orchestrator stays agnostic of vendor-specific details. The 2Captcha
//! adapter lives in [`twocaptcha`].

pub mod twocaptcha;

pub use twocaptcha::{ReqwestSolverTransport, SolverTransport, TwoCaptchaClient};

use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Controls solving behaviour: total wall-clock budget and poll cadence.
#[derive(Debug, Clone)]
pub struct CaptchaConfig {
    /// Overall budget for one challenge, submission included.
    pub timeout: Duration,
    /// Wait before the first poll; challenges are never solved instantly.
    pub initial_wait: Duration,
    /// Cadence of subsequent polls.
    pub poll_interval: Duration,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            initial_wait: Duration::from_secs(5),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Challenge parameters lifted from the gated page. Solutions are bound to
/// the exact page URL they were solved for.
#[derive(Debug, Clone)]
pub struct ChallengeDescriptor {
    pub site_key: String,
    pub page_url: Url,
}

impl ChallengeDescriptor {
    pub fn new(site_key: impl Into<String>, page_url: Url) -> Self {
        Self {
            site_key: site_key.into(),
            page_url,
        }
    }
}

/// Where a submitted job currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Ready,
    Failed,
    TimedOut,
}

/// A challenge accepted by the solving service, tracked until it reaches a
/// terminal status.
#[derive(Debug, Clone)]
pub struct ChallengeJob {
    pub id: String,
    pub submitted_at: Instant,
    pub status: JobStatus,
}

impl ChallengeJob {
    fn new(id: String) -> Self {
        Self {
            id,
            submitted_at: Instant::now(),
            status: JobStatus::Pending,
        }
    }
}

/// Opaque solved-challenge token. Single-use and origin-bound: it must be
/// injected into the page it was solved for and never held beyond that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionToken(String);

impl SolutionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Errors surfaced by the solving-service client.
#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("captcha solver misconfigured: {0}")]
    Configuration(String),
    #[error("solving service rejected the submission: {0}")]
    Submission(String),
    #[error("solving service transport failed: {0}")]
    Transport(String),
    #[error("no solving result within {0:?}")]
    Timeout(Duration),
}

/// Shared interface implemented by solving-service vendors. Every method is
/// total: transport failures degrade to "no usable result" so the profile
/// scrape can continue without solving infrastructure.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Submit, poll to a terminal state, and return the token if one was
    /// produced within the configured timeout.
    async fn solve(&self, challenge: &ChallengeDescriptor) -> Option<SolutionToken>;

    /// Account balance; informational only, `0.0` on any error.
    async fn balance(&self) -> f64;
}
